//! Timeline synchronization
//!
//! Sender timestamps are absolute nanosecond values shared by both streams,
//! but each stream starts at its own offset. The timeline rebases them onto
//! a common zero (the first frame seen from either stream) and decides, once
//! per session, whether the audio track needs leading silence to line up
//! with the video track.

use super::state::AudioFormat;
use crate::sink::types::{MediaBuffer, SinkError};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Timing of one audio frame after rebasing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStamp {
    /// Presentation timestamp relative to the session origin
    pub pts: u64,
    /// Gap in nanoseconds to fill with silence before this frame
    pub silence: Option<u64>,
}

/// Per-session timestamp state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    origin: Option<u64>,
    first_video: Option<u64>,
    first_audio: Option<u64>,
    audio_started: bool,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> Option<u64> {
        self.origin
    }

    pub fn first_video(&self) -> Option<u64> {
        self.first_video
    }

    pub fn first_audio(&self) -> Option<u64> {
        self.first_audio
    }

    pub fn audio_started(&self) -> bool {
        self.audio_started
    }

    /// Rebase a video frame timestamp
    pub fn stamp_video(&mut self, timestamp: u64) -> u64 {
        self.first_video.get_or_insert(timestamp);
        self.relative(timestamp)
    }

    /// Rebase an audio frame timestamp and make the one-time padding
    /// decision. `expects_video` is false when the session carries no video,
    /// in which case audio never waits for a video reference.
    pub fn stamp_audio(&mut self, timestamp: u64, expects_video: bool) -> AudioStamp {
        // Audio that was already flowing before video showed up is never padded
        let is_first_audio = self.first_audio.is_none();
        let first_audio = *self.first_audio.get_or_insert(timestamp);
        let pts = self.relative(timestamp);

        let mut silence = None;
        if !self.audio_started {
            if !expects_video {
                self.audio_started = true;
            } else if let Some(first_video) = self.first_video {
                self.audio_started = true;
                if is_first_audio && first_audio > first_video {
                    silence = Some(first_audio - first_video);
                }
            }
        }

        AudioStamp { pts, silence }
    }

    /// Forget everything; the next frame defines a new origin
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn relative(&mut self, timestamp: u64) -> u64 {
        let origin = *self.origin.get_or_insert(timestamp);
        if timestamp < origin {
            tracing::debug!(
                "Timestamp {} precedes session origin {}, clamping to 0",
                timestamp,
                origin
            );
        }
        timestamp.saturating_sub(origin)
    }
}

/// Payload size of silence covering `gap` nanoseconds, floored to whole
/// sample frames
pub fn silence_len(gap: u64, format: &AudioFormat) -> usize {
    let samples = gap as u128 * format.sample_rate as u128 / NANOS_PER_SECOND;
    samples as usize * format.bytes_per_frame()
}

/// Zero-filled buffer at PTS 0 lasting `gap` nanoseconds
pub fn silence_buffer(gap: u64, format: &AudioFormat) -> Result<MediaBuffer, SinkError> {
    Ok(MediaBuffer::zeroed(silence_len(gap, format))?
        .with_timestamp(0)
        .with_duration(gap))
}
