//! Recording state management
//!
//! Defines the session state machine and the process-wide recorder
//! configuration.

use crate::utils::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No sink graph exists
    #[default]
    Idle,
    /// A graph exists and accepts frames
    Running,
    /// End-of-stream signaled, waiting for the graph to drain
    Stopped,
}

/// Fixed PCM layout of the audio stream, used to size silence padding and
/// to describe the stream to the muxer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
        }
    }
}

impl AudioFormat {
    /// Bytes in one sample frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Check the format can be described to the muxer. Channel counts must
    /// have an AAC channel configuration (1-6 or 8).
    pub fn validate(&self) -> RecorderResult<()> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(RecorderError::Config(format!(
                "unsupported sample rate: {} Hz",
                self.sample_rate
            )));
        }
        if !matches!(self.channels, 1..=6 | 8) {
            return Err(RecorderError::Config(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(RecorderError::Config(format!(
                "bits per sample must be 8, 16, 24 or 32, got {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}

/// Configuration for the recorder, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Output path prefix; session counter and codec tags are appended
    pub output_template: String,

    /// Whether audio is recorded
    pub audio_enabled: bool,

    /// Whether video is recorded
    pub video_enabled: bool,

    /// Upper bound on how long `stop` waits for the graph to drain
    pub flush_timeout_ms: u64,

    /// Layout of the decoded audio stream
    pub audio_format: AudioFormat,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_template: "recording".to_string(),
            audio_enabled: true,
            video_enabled: true,
            flush_timeout_ms: 5000,
            audio_format: AudioFormat::default(),
        }
    }
}

impl RecorderConfig {
    pub fn new(
        output_template: impl Into<String>,
        audio_enabled: bool,
        video_enabled: bool,
    ) -> Self {
        Self {
            output_template: output_template.into(),
            audio_enabled,
            video_enabled,
            ..Self::default()
        }
    }

    /// Load and validate a JSON config file
    pub fn from_json_file(path: &Path) -> RecorderResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: RecorderConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded recorder config from {:?}", path);

        Ok(config)
    }

    pub fn validate(&self) -> RecorderResult<()> {
        if self.output_template.trim().is_empty() {
            return Err(RecorderError::Config(
                "output template must not be empty".to_string(),
            ));
        }
        self.audio_format.validate()
    }

    /// Whether anything will be recorded at all
    pub fn is_active(&self) -> bool {
        self.audio_enabled || self.video_enabled
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}
