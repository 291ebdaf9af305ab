//! Recording system module
//!
//! This module implements the recording orchestration:
//! - Timeline to rebase sender timestamps and pad late audio
//! - MuxRecorder to build, rebuild and flush the sink graph
//! - RecorderHandle to share a recorder across delivery threads

pub mod coordinator;
pub mod handle;
pub mod state;
pub mod timeline;

pub use coordinator::MuxRecorder;
pub use handle::RecorderHandle;
pub use state::{AudioFormat, RecorderConfig, SessionState};
pub use timeline::{AudioStamp, Timeline};
