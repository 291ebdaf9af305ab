//! Mirror Recorder - records AirPlay mirroring sessions to MP4.
//!
//! The protocol layer delivers decrypted video access units and audio
//! frames, each stamped with the sender's clock. This crate rebases those
//! timestamps onto a shared origin, pads late-starting audio with silence,
//! and feeds everything into a muxing engine that is rebuilt whenever the
//! sender renegotiates its codecs.
//!
//! ```no_run
//! use mirror_recorder::{MemorySinkFactory, MuxRecorder, RecorderConfig};
//!
//! let config = RecorderConfig::new("/tmp/airplay", true, true);
//! let mut recorder = MuxRecorder::new(config, Box::new(MemorySinkFactory::new()));
//! recorder.choose_video_codec(false);
//! recorder.push_video(&[0, 0, 0, 1, 0x65], 1_000_000);
//! recorder.destroy();
//! ```

pub mod recorder;
pub mod sink;
pub mod utils;

pub use recorder::{AudioFormat, MuxRecorder, RecorderConfig, RecorderHandle, SessionState};
pub use sink::{
    AudioCodec, EndpointId, MemorySinkFactory, SinkGraph, SinkGraphFactory, VideoCodec,
};
pub use utils::{RecorderError, RecorderResult};

#[cfg(feature = "gstreamer")]
pub use sink::gstreamer::GstSinkFactory;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default tracing subscriber. `RUST_LOG` overrides the filter.
/// Does nothing if the host already installed one.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    tracing::info!("Mirror recorder v{}", env!("CARGO_PKG_VERSION"));
}
