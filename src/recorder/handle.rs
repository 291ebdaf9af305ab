//! Shared recorder handle
//!
//! Senders deliver video and audio on separate network threads. The
//! recorder itself assumes a single writer, so connection handlers share it
//! through this handle, which serializes every call behind one mutex.

use super::coordinator::MuxRecorder;
use super::state::SessionState;
use crate::sink::types::AudioCodec;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable, thread-safe access to a [`MuxRecorder`]
#[derive(Clone)]
pub struct RecorderHandle {
    recorder: Arc<Mutex<MuxRecorder>>,
}

impl RecorderHandle {
    pub fn new(recorder: MuxRecorder) -> Self {
        Self {
            recorder: Arc::new(Mutex::new(recorder)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.recorder.lock().state()
    }

    /// Audio format callback: raw AirPlay compression type
    pub fn choose_audio_codec(&self, compression_type: u8) {
        self.recorder
            .lock()
            .choose_audio_codec(AudioCodec::from_compression_type(compression_type));
    }

    /// Video codec callback
    pub fn choose_video_codec(&self, is_hevc: bool) {
        self.recorder.lock().choose_video_codec(is_hevc);
    }

    pub fn push_video(&self, data: &[u8], timestamp: u64) {
        self.recorder.lock().push_video(data, timestamp);
    }

    pub fn push_audio(&self, data: &[u8], timestamp: u64) {
        self.recorder.lock().push_audio(data, timestamp);
    }

    /// Connection closed or video reset
    pub fn stop(&self) {
        self.recorder.lock().stop();
    }

    /// Run `f` with exclusive access to the recorder
    pub fn with<R>(&self, f: impl FnOnce(&mut MuxRecorder) -> R) -> R {
        f(&mut self.recorder.lock())
    }

    /// Stop recording and drop this handle. The recorder itself is released
    /// once the last handle is gone.
    pub fn destroy(self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::RecorderConfig;
    use crate::sink::memory::MemorySinkFactory;
    use crate::sink::types::EndpointId;
    use std::thread;

    #[test]
    fn test_frames_from_two_threads() {
        let factory = MemorySinkFactory::new();
        let recorder = MuxRecorder::new(
            RecorderConfig::new("/tmp/threads", true, true),
            Box::new(factory.clone()),
        );
        let handle = RecorderHandle::new(recorder);
        handle.choose_video_codec(false);

        let video = {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..50u64 {
                    handle.push_video(&[0x65], 1_000_000 + i * 16_666_667);
                }
            })
        };
        let audio = {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..50u64 {
                    handle.push_audio(&[0x21], 1_000_000 + i * 10_884_354);
                }
            })
        };
        video.join().unwrap();
        audio.join().unwrap();

        assert_eq!(factory.pushed(EndpointId::Video).len(), 50);
        // Both streams start at the same sender time, so no padding
        assert_eq!(factory.pushed(EndpointId::Audio).len(), 50);
        assert_eq!(handle.with(|r| r.timeline().and_then(|t| t.origin())), Some(1_000_000));

        handle.destroy();
        assert_eq!(factory.live_graphs(), 0);
    }

    #[test]
    fn test_compression_type_routing() {
        let factory = MemorySinkFactory::new();
        let recorder = MuxRecorder::new(
            RecorderConfig::new("/tmp/alac", true, false),
            Box::new(factory.clone()),
        );
        let handle = RecorderHandle::new(recorder);

        handle.choose_audio_codec(8);
        assert_eq!(handle.state(), SessionState::Idle);

        handle.choose_audio_codec(2);
        assert_eq!(handle.state(), SessionState::Running);

        handle.stop();
        assert_eq!(handle.state(), SessionState::Idle);
    }
}
