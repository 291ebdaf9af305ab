//! GStreamer sink engine
//!
//! Builds `appsrc → queue → parser → mp4mux → filesink` graphs from a
//! [`GraphPlan`] with the native element API. The pipeline runs on
//! GStreamer's streaming threads; this module only pushes buffers, sends
//! end-of-stream and waits on the bus.

use super::types::{
    AudioCodec, Completion, EndpointId, GraphPlan, MediaBuffer, SinkError, StreamParams,
};
use super::{SinkGraph, SinkGraphFactory};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::time::Duration;

/// Factory for GStreamer-backed graphs
#[derive(Debug, Default)]
pub struct GstSinkFactory {
    initialized: bool,
}

impl GstSinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_initialized(&mut self) -> Result<(), SinkError> {
        if !self.initialized {
            gst::init().map_err(|e| SinkError::Engine(format!("gst::init failed: {}", e)))?;
            self.initialized = true;
        }
        Ok(())
    }
}

fn caps_for(params: &StreamParams) -> gst::Caps {
    match params {
        StreamParams::Video { codec } => gst::Caps::builder(codec.media_type())
            .field("stream-format", "byte-stream")
            .field("alignment", "au")
            .build(),
        StreamParams::Audio {
            codec,
            sample_rate,
            channels,
            codec_data,
        } => {
            let mut builder = gst::Caps::builder(codec.media_type());
            if *codec == AudioCodec::AacEld {
                builder = builder.field("mpegversion", 4i32);
            }
            builder
                .field("channels", *channels as i32)
                .field("rate", *sample_rate as i32)
                .field("stream-format", "raw")
                .field("codec_data", gst::Buffer::from_slice(codec_data.clone()))
                .build()
        }
    }
}

/// Nanoseconds as a clock time. `u64::MAX` is GStreamer's "none" value and
/// has no clock time.
fn clock_time(nanos: u64) -> Option<gst::ClockTime> {
    (nanos != u64::MAX).then(|| gst::ClockTime::from_nseconds(nanos))
}

fn make_element(factory_name: &str) -> Result<gst::Element, SinkError> {
    gst::ElementFactory::make(factory_name)
        .build()
        .map_err(|e| SinkError::Construction(format!("Failed to create {}: {}", factory_name, e)))
}

impl SinkGraphFactory for GstSinkFactory {
    fn build(&mut self, plan: &GraphPlan) -> Result<Box<dyn SinkGraph>, SinkError> {
        self.ensure_initialized()?;

        let pipeline = gst::Pipeline::new();
        let muxer = gst::ElementFactory::make("mp4mux")
            .name("mux")
            .build()
            .map_err(|e| SinkError::Construction(format!("Failed to create mp4mux: {}", e)))?;
        let filesink = gst::ElementFactory::make("filesink")
            .name("filesink")
            .property("location", plan.location.to_string_lossy().to_string())
            .build()
            .map_err(|e| SinkError::Construction(format!("Failed to create filesink: {}", e)))?;

        pipeline
            .add_many([&muxer, &filesink])
            .map_err(|e| SinkError::Construction(format!("Failed to add elements: {}", e)))?;
        muxer
            .link(&filesink)
            .map_err(|_| SinkError::Construction("Failed to link mp4mux to filesink".to_string()))?;

        let mut sources = Vec::with_capacity(plan.branches.len());
        for branch in &plan.branches {
            let appsrc = gst_app::AppSrc::builder()
                .name(branch.endpoint.name())
                .caps(&caps_for(&branch.params))
                .format(gst::Format::Time)
                .is_live(true)
                .build();

            let mut chain: Vec<gst::Element> = vec![appsrc.clone().upcast()];
            for stage in &branch.stages {
                chain.push(make_element(stage.factory_name())?);
            }

            pipeline
                .add_many(chain.iter())
                .map_err(|e| SinkError::Construction(format!("Failed to add elements: {}", e)))?;
            gst::Element::link_many(chain.iter()).map_err(|e| {
                SinkError::Construction(format!(
                    "Failed to link {:?} branch: {}",
                    branch.endpoint, e
                ))
            })?;
            if let Some(last) = chain.last() {
                last.link(&muxer).map_err(|_| {
                    SinkError::Construction(format!(
                        "Failed to link {:?} branch to mp4mux",
                        branch.endpoint
                    ))
                })?;
            }

            sources.push((branch.endpoint, appsrc));
        }

        let bus = pipeline
            .bus()
            .ok_or_else(|| SinkError::Construction("Pipeline has no bus".to_string()))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(SinkError::Engine(format!("Failed to start pipeline: {}", e)));
        }

        Ok(Box::new(GstSinkGraph {
            pipeline,
            bus,
            sources,
        }))
    }
}

/// A running GStreamer pipeline
struct GstSinkGraph {
    pipeline: gst::Pipeline,
    bus: gst::Bus,
    sources: Vec<(EndpointId, gst_app::AppSrc)>,
}

impl GstSinkGraph {
    fn source(&self, endpoint: EndpointId) -> Result<&gst_app::AppSrc, SinkError> {
        self.sources
            .iter()
            .find(|(id, _)| *id == endpoint)
            .map(|(_, src)| src)
            .ok_or(SinkError::MissingEndpoint(endpoint))
    }
}

impl SinkGraph for GstSinkGraph {
    fn push(&mut self, endpoint: EndpointId, buffer: MediaBuffer) -> Result<(), SinkError> {
        let appsrc = self.source(endpoint)?;
        let (Some(pts), Some(dts)) = (clock_time(buffer.pts), clock_time(buffer.dts)) else {
            return Err(SinkError::Push {
                endpoint,
                reason: format!("timestamp {} out of range", buffer.pts),
            });
        };

        let mut gst_buffer = gst::Buffer::from_mut_slice(buffer.data);
        {
            let buffer_ref = gst_buffer.get_mut().ok_or(SinkError::Allocation(0))?;
            buffer_ref.set_pts(pts);
            buffer_ref.set_dts(dts);
            buffer_ref.set_duration(buffer.duration.and_then(clock_time));
        }

        appsrc
            .push_buffer(gst_buffer)
            .map(|_| ())
            .map_err(|e| SinkError::Push {
                endpoint,
                reason: format!("{:?}", e),
            })
    }

    fn end_of_stream(&mut self, endpoint: EndpointId) -> Result<(), SinkError> {
        self.source(endpoint)?
            .end_of_stream()
            .map(|_| ())
            .map_err(|e| SinkError::Push {
                endpoint,
                reason: format!("end-of-stream: {:?}", e),
            })
    }

    fn wait_for_completion(&mut self, timeout: Duration) -> Completion {
        let timeout = u64::try_from(timeout.as_nanos())
            .ok()
            .and_then(clock_time)
            .unwrap_or(gst::ClockTime::MAX);
        let msg = self.bus.timed_pop_filtered(
            timeout,
            &[gst::MessageType::Eos, gst::MessageType::Error],
        );
        match msg {
            None => Completion::TimedOut,
            Some(msg) => match msg.view() {
                gst::MessageView::Error(err) => Completion::Error(format!(
                    "{} ({:?})",
                    err.error(),
                    err.debug()
                )),
                _ => Completion::EndOfStream,
            },
        }
    }

    fn halt(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!("Failed to halt pipeline: {}", e);
        }
    }
}

impl Drop for GstSinkGraph {
    fn drop(&mut self) {
        // Pipelines must reach NULL before their last reference goes away
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::AudioFormat;
    use crate::sink::topology;
    use crate::sink::types::{GraphLayout, VideoCodec};
    use tempfile::tempdir;

    /// Whether GStreamer and every element `plan` needs are installed
    fn engine_available(plan: &GraphPlan) -> bool {
        if gst::init().is_err() {
            return false;
        }
        let mut elements = vec!["appsrc", "mp4mux", "filesink"];
        for branch in &plan.branches {
            elements.extend(branch.stages.iter().map(|s| s.factory_name()));
        }
        elements
            .iter()
            .all(|name| gst::ElementFactory::find(name).is_some())
    }

    fn layouts() -> Vec<GraphLayout> {
        let mut layouts = Vec::new();
        for video in [None, Some(VideoCodec::H264), Some(VideoCodec::H265)] {
            for audio in [None, Some(AudioCodec::AacEld), Some(AudioCodec::Alac)] {
                let layout = GraphLayout { video, audio };
                if !layout.is_empty() {
                    layouts.push(layout);
                }
            }
        }
        layouts
    }

    #[test]
    fn test_clock_time_rejects_none_value() {
        assert_eq!(clock_time(u64::MAX), None);
        assert_eq!(clock_time(500), Some(gst::ClockTime::from_nseconds(500)));
    }

    #[test]
    fn test_caps_carry_stream_params() {
        if gst::init().is_err() {
            return;
        }
        let format = AudioFormat {
            sample_rate: 48000,
            channels: 1,
            bits_per_sample: 16,
        };

        let video = caps_for(&StreamParams::video(VideoCodec::H265));
        let s = video.structure(0).unwrap();
        assert_eq!(s.name().as_str(), "video/x-h265");
        assert_eq!(s.get::<&str>("alignment").unwrap(), "au");

        for codec in [AudioCodec::AacEld, AudioCodec::Alac] {
            let params = StreamParams::audio(codec, &format);
            let caps = caps_for(&params);
            let s = caps.structure(0).unwrap();
            assert_eq!(s.name().as_str(), codec.media_type());
            assert_eq!(s.get::<i32>("rate").unwrap(), 48000);
            assert_eq!(s.get::<i32>("channels").unwrap(), 1);
            assert_eq!(s.has_field("mpegversion"), codec == AudioCodec::AacEld);

            let StreamParams::Audio { codec_data, .. } = &params else {
                unreachable!();
            };
            let buffer = s.get::<gst::Buffer>("codec_data").unwrap();
            let map = buffer.map_readable().unwrap();
            assert_eq!(map.as_slice(), codec_data.as_slice());
        }
    }

    #[test]
    fn test_every_layout_writes_a_file() {
        let dir = tempdir().unwrap();
        let format = AudioFormat::default();
        let mut factory = GstSinkFactory::new();

        for (i, layout) in layouts().into_iter().enumerate() {
            let location = topology::output_path(
                &dir.path().join("session").to_string_lossy(),
                i as u32 + 1,
                &layout,
            );
            let plan = topology::plan(&layout, &format, location.clone()).unwrap();
            if !engine_available(&plan) {
                continue;
            }

            let mut graph = factory.build(&plan).unwrap();
            for endpoint in layout.endpoints() {
                let buffer = MediaBuffer::zeroed(64).unwrap().with_duration(10_000_000);
                graph.push(endpoint, buffer).unwrap();
            }
            for endpoint in layout.endpoints() {
                graph.end_of_stream(endpoint).unwrap();
            }

            let completion = graph.wait_for_completion(Duration::from_secs(5));
            // Zeroed payloads are not decodable video, so parsers may refuse them
            if layout.has_video() {
                assert_ne!(completion, Completion::TimedOut, "{}", plan);
            } else {
                assert_eq!(completion, Completion::EndOfStream, "{}", plan);
            }
            graph.halt();
            drop(graph);

            assert!(location.exists(), "{} was not written", location.display());
        }
    }

    #[test]
    fn test_push_rejections() {
        let dir = tempdir().unwrap();
        let layout = GraphLayout {
            video: None,
            audio: Some(AudioCodec::Alac),
        };
        let location = dir.path().join("rejections.mp4");
        let plan = topology::plan(&layout, &AudioFormat::default(), location).unwrap();
        if !engine_available(&plan) {
            return;
        }

        let mut graph = GstSinkFactory::new().build(&plan).unwrap();
        assert!(matches!(
            graph.push(EndpointId::Video, MediaBuffer::zeroed(4).unwrap()),
            Err(SinkError::MissingEndpoint(EndpointId::Video))
        ));

        let out_of_range = MediaBuffer::zeroed(4).unwrap().with_timestamp(u64::MAX);
        assert!(matches!(
            graph.push(EndpointId::Audio, out_of_range),
            Err(SinkError::Push { .. })
        ));

        graph.end_of_stream(EndpointId::Audio).unwrap();
        assert!(graph
            .push(EndpointId::Audio, MediaBuffer::zeroed(4).unwrap())
            .is_err());
        graph.halt();
    }
}
