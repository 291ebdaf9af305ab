//! Media sink graph abstraction
//!
//! The recorder never multiplexes or writes files itself. It describes the
//! graph it needs as a [`GraphPlan`] and hands it to a [`SinkGraphFactory`];
//! the resulting [`SinkGraph`] runs on the engine's own threads and only
//! exposes ingestion, end-of-stream and teardown.

pub mod memory;
pub mod topology;
pub mod types;

#[cfg(feature = "gstreamer")]
pub mod gstreamer;

use std::time::Duration;

pub use memory::{MemorySinkFactory, SinkEvent};
pub use topology::{output_path, plan};
pub use types::{
    AudioCodec, Branch, Completion, EndpointId, GraphLayout, GraphPlan, MediaBuffer, SinkError,
    StageDescriptor, StreamParams, VideoCodec,
};

/// A running sink graph. Dropping it releases every engine resource.
pub trait SinkGraph: Send {
    /// Queue a buffer on an ingestion endpoint. Returns once the engine has
    /// taken ownership; never waits for the buffer to be written.
    fn push(&mut self, endpoint: EndpointId, buffer: MediaBuffer) -> Result<(), SinkError>;

    /// Signal that no more buffers will arrive on `endpoint`
    fn end_of_stream(&mut self, endpoint: EndpointId) -> Result<(), SinkError>;

    /// Block until end-of-stream or an error reaches the end of the graph,
    /// or until `timeout` elapses
    fn wait_for_completion(&mut self, timeout: Duration) -> Completion;

    /// Force the graph into its halted state
    fn halt(&mut self);
}

/// Builds sink graphs from structured plans
pub trait SinkGraphFactory: Send {
    /// Construct the graph described by `plan` and set it running
    fn build(&mut self, plan: &GraphPlan) -> Result<Box<dyn SinkGraph>, SinkError>;
}
