//! Recording coordinator
//!
//! Owns the single live sink graph, rebuilds it whenever the negotiated
//! codecs change, and routes timestamped frames into it.

use super::state::{RecorderConfig, SessionState};
use super::timeline::{self, Timeline};
use crate::sink::topology;
use crate::sink::types::{
    AudioCodec, Completion, EndpointId, GraphLayout, MediaBuffer, VideoCodec,
};
use crate::sink::{SinkGraph, SinkGraphFactory};
use std::path::{Path, PathBuf};

/// A live recording: one sink graph and the timeline feeding it
struct Session {
    graph: Box<dyn SinkGraph>,
    layout: GraphLayout,
    location: PathBuf,
    timeline: Timeline,
}

/// Records one mirroring connection into a sequence of MP4 files
pub struct MuxRecorder {
    config: RecorderConfig,
    factory: Box<dyn SinkGraphFactory>,

    /// Current state of the session
    state: SessionState,

    /// Live session, if any
    session: Option<Session>,

    /// Incremented for every graph built; part of each output filename
    session_counter: u32,

    /// Codecs negotiated by the sender
    audio_codec: AudioCodec,
    video_codec: VideoCodec,
}

impl MuxRecorder {
    /// Create a recorder. Nothing is built until a codec is negotiated.
    /// An invalid config leaves the recorder inactive.
    pub fn new(mut config: RecorderConfig, factory: Box<dyn SinkGraphFactory>) -> Self {
        if let Err(e) = config.validate() {
            tracing::error!("Invalid recorder config, recording disabled: {}", e);
            config.audio_enabled = false;
            config.video_enabled = false;
        }

        if !config.is_active() {
            tracing::info!("Both audio and video recording are disabled: nothing to record");
        } else if !config.audio_enabled {
            tracing::info!("Audio recording is disabled: video only will be recorded");
        } else if !config.video_enabled {
            tracing::info!("Video recording is disabled: audio only will be recorded");
        }
        if config.is_active() {
            tracing::info!("Mux recorder initialized: {}", config.output_template);
        }

        Self {
            config,
            factory,
            state: SessionState::Idle,
            session: None,
            session_counter: 0,
            audio_codec: AudioCodec::default(),
            video_codec: VideoCodec::default(),
        }
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of graphs built so far
    pub fn session_counter(&self) -> u32 {
        self.session_counter
    }

    /// Output file of the live session
    pub fn output_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.location.as_path())
    }

    /// Layout of the live session
    pub fn layout(&self) -> Option<GraphLayout> {
        self.session.as_ref().map(|s| s.layout)
    }

    /// Timeline of the live session
    pub fn timeline(&self) -> Option<&Timeline> {
        self.session.as_ref().map(|s| &s.timeline)
    }

    /// Codecs the next graph will be built with
    pub fn negotiated_codecs(&self) -> (VideoCodec, AudioCodec) {
        (self.video_codec, self.audio_codec)
    }

    /// Layout a graph built right now would have
    fn desired_layout(&self) -> GraphLayout {
        GraphLayout {
            video: self.config.video_enabled.then_some(self.video_codec),
            audio: self.config.audio_enabled.then_some(self.audio_codec),
        }
    }

    /// Audio format reported by the sender. ALAC starts a recording
    /// immediately; AAC waits for the video codec.
    pub fn choose_audio_codec(&mut self, codec: AudioCodec) {
        if !self.config.audio_enabled {
            return;
        }
        self.audio_codec = codec;

        if self.session.as_ref().is_some_and(|s| s.layout.audio != Some(codec)) {
            tracing::debug!("Audio codec changed to {}, recreating sink graph", codec.tag());
            self.teardown();
        }
        if codec == AudioCodec::Alac {
            self.start();
        }
    }

    /// Video codec reported by the sender. Always (re)starts a recording.
    pub fn choose_video_codec(&mut self, is_hevc: bool) {
        if !self.config.is_active() {
            return;
        }
        let codec = VideoCodec::from_hevc(is_hevc);
        self.video_codec = codec;

        if self.config.video_enabled
            && self.session.as_ref().is_some_and(|s| s.layout.video != Some(codec))
        {
            tracing::debug!("Video codec changed to {}, recreating sink graph", codec.tag());
            self.teardown();
        }
        tracing::debug!("Mux recorder video codec: h265={}", is_hevc);
        self.start();
    }

    /// Deliver one encoded video access unit
    pub fn push_video(&mut self, data: &[u8], timestamp: u64) {
        if !self.config.video_enabled {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.layout.has_video() {
            return;
        }

        let buffer = match MediaBuffer::copy_from(data) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("Dropping video frame: {}", e);
                return;
            }
        };
        let pts = session.timeline.stamp_video(timestamp);

        if let Err(e) = session.graph.push(EndpointId::Video, buffer.with_timestamp(pts)) {
            tracing::warn!("Dropping video frame at {}: {}", pts, e);
        }
    }

    /// Deliver one encoded audio frame
    pub fn push_audio(&mut self, data: &[u8], timestamp: u64) {
        if !self.config.audio_enabled {
            return;
        }
        let format = self.config.audio_format;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.layout.has_audio() {
            return;
        }

        let buffer = match MediaBuffer::copy_from(data) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("Dropping audio frame: {}", e);
                return;
            }
        };
        let stamp = session
            .timeline
            .stamp_audio(timestamp, session.layout.has_video());

        if let Some(gap) = stamp.silence {
            match timeline::silence_buffer(gap, &format) {
                Ok(silence) => {
                    let len = silence.len();
                    match session.graph.push(EndpointId::Audio, silence) {
                        Ok(()) => tracing::debug!(
                            "Inserted {:.2} seconds of silence ({} bytes) before audio",
                            gap as f64 / 1e9,
                            len
                        ),
                        Err(e) => tracing::warn!("Dropping silence padding: {}", e),
                    }
                }
                Err(e) => tracing::warn!("Dropping silence padding: {}", e),
            }
        }

        if let Err(e) = session
            .graph
            .push(EndpointId::Audio, buffer.with_timestamp(stamp.pts))
        {
            tracing::warn!("Dropping audio frame at {}: {}", stamp.pts, e);
        }
    }

    /// Flush and close the live recording. Safe to call when idle.
    pub fn stop(&mut self) {
        if self.teardown() {
            // The next connection negotiates its codecs from scratch
            self.audio_codec = AudioCodec::default();
            self.video_codec = VideoCodec::default();
        }
    }

    /// Stop and release the recorder
    pub fn destroy(mut self) {
        self.stop();
        tracing::debug!("Mux recorder destroyed");
    }

    /// Build a graph for the negotiated codecs unless one already matches
    fn start(&mut self) {
        let layout = self.desired_layout();
        if self.session.as_ref().is_some_and(|s| s.layout == layout) {
            tracing::debug!("Mux recorder already running");
            return;
        }
        self.teardown();

        self.session_counter += 1;
        let location = topology::output_path(
            &self.config.output_template,
            self.session_counter,
            &layout,
        );

        let plan = match topology::plan(&layout, &self.config.audio_format, location.clone()) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Mux pipeline error: {}", e);
                return;
            }
        };
        tracing::debug!("Created mux pipeline: {}", plan);

        match self.factory.build(&plan) {
            Ok(graph) => {
                self.session = Some(Session {
                    graph,
                    layout,
                    location,
                    timeline: Timeline::new(),
                });
                self.state = SessionState::Running;
                tracing::info!("Started recording to: {}", plan.location.display());
            }
            Err(e) => {
                tracing::error!("Mux pipeline error: {}", e);
            }
        }
    }

    /// Flush and release the live graph. Returns whether one existed.
    fn teardown(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        self.state = SessionState::Stopped;

        for endpoint in session.layout.endpoints() {
            if let Err(e) = session.graph.end_of_stream(endpoint) {
                tracing::warn!("Failed to signal end-of-stream on {:?}: {}", endpoint, e);
            }
        }

        let timeout = self.config.flush_timeout();
        match session.graph.wait_for_completion(timeout) {
            Completion::EndOfStream => {
                tracing::debug!("Sink graph drained");
            }
            Completion::Error(message) => {
                tracing::warn!("Sink graph reported an error while draining: {}", message);
            }
            Completion::TimedOut => {
                tracing::warn!(
                    "Sink graph did not drain within {:?}, forcing shutdown",
                    timeout
                );
            }
        }

        session.graph.halt();
        let location = session.location;
        drop(session.graph);

        self.state = SessionState::Idle;
        tracing::info!("Stopped recording: {}", location.display());
        true
    }
}

impl Drop for MuxRecorder {
    fn drop(&mut self) {
        self.teardown();
    }
}
