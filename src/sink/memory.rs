//! In-process sink engine
//!
//! Records every graph operation instead of writing a file. Used by the
//! recorder's tests and for dry runs where no media engine is installed.

use super::types::{Completion, EndpointId, GraphLayout, GraphPlan, MediaBuffer, SinkError};
use super::{SinkGraph, SinkGraphFactory};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One observed graph operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Built {
        graph: u32,
        location: PathBuf,
        layout: GraphLayout,
    },
    Pushed {
        graph: u32,
        endpoint: EndpointId,
        buffer: MediaBuffer,
    },
    EndOfStream {
        graph: u32,
        endpoint: EndpointId,
    },
    Waited {
        graph: u32,
        timeout: Duration,
        completion: Completion,
    },
    Halted { graph: u32 },
    Released { graph: u32 },
}

#[derive(Debug)]
struct MemoryState {
    events: Vec<SinkEvent>,
    next_graph: u32,
    live: usize,
    max_live: usize,
    fail_next_build: bool,
    completion: Completion,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            next_graph: 0,
            live: 0,
            max_live: 0,
            fail_next_build: false,
            completion: Completion::EndOfStream,
        }
    }
}

/// Factory for recording graphs. Clones share the same event log.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `build` call fail as a malformed topology would
    pub fn fail_next_build(&self) {
        self.state.lock().fail_next_build = true;
    }

    /// Completion reported by graphs when waited on
    pub fn set_completion(&self, completion: Completion) {
        self.state.lock().completion = completion;
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<SinkEvent> {
        self.state.lock().events.clone()
    }

    /// Buffers pushed to `endpoint`, across all graphs, in order
    pub fn pushed(&self, endpoint: EndpointId) -> Vec<MediaBuffer> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Pushed {
                    endpoint: e,
                    buffer,
                    ..
                } if *e == endpoint => Some(buffer.clone()),
                _ => None,
            })
            .collect()
    }

    /// Output locations of every graph built, in order
    pub fn locations(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Built { location, .. } => Some(location.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn graphs_built(&self) -> u32 {
        self.state.lock().next_graph
    }

    /// Graphs currently alive (built and not yet released)
    pub fn live_graphs(&self) -> usize {
        self.state.lock().live
    }

    /// Highest number of graphs that were ever alive at the same time
    pub fn max_live_graphs(&self) -> usize {
        self.state.lock().max_live
    }
}

impl SinkGraphFactory for MemorySinkFactory {
    fn build(&mut self, plan: &GraphPlan) -> Result<Box<dyn SinkGraph>, SinkError> {
        let mut state = self.state.lock();
        if state.fail_next_build {
            state.fail_next_build = false;
            return Err(SinkError::Construction(format!(
                "no element could be linked for {}",
                plan
            )));
        }

        state.next_graph += 1;
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        let id = state.next_graph;
        state.events.push(SinkEvent::Built {
            graph: id,
            location: plan.location.clone(),
            layout: plan.layout,
        });

        Ok(Box::new(MemorySinkGraph {
            id,
            endpoints: plan.branches.iter().map(|b| b.endpoint).collect(),
            finished: HashSet::new(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySinkGraph {
    id: u32,
    endpoints: Vec<EndpointId>,
    finished: HashSet<EndpointId>,
    state: Arc<Mutex<MemoryState>>,
}

impl SinkGraph for MemorySinkGraph {
    fn push(&mut self, endpoint: EndpointId, buffer: MediaBuffer) -> Result<(), SinkError> {
        if !self.endpoints.contains(&endpoint) {
            return Err(SinkError::MissingEndpoint(endpoint));
        }
        if self.finished.contains(&endpoint) {
            return Err(SinkError::Push {
                endpoint,
                reason: "endpoint already at end-of-stream".to_string(),
            });
        }
        self.state.lock().events.push(SinkEvent::Pushed {
            graph: self.id,
            endpoint,
            buffer,
        });
        Ok(())
    }

    fn end_of_stream(&mut self, endpoint: EndpointId) -> Result<(), SinkError> {
        if !self.endpoints.contains(&endpoint) {
            return Err(SinkError::MissingEndpoint(endpoint));
        }
        self.finished.insert(endpoint);
        self.state.lock().events.push(SinkEvent::EndOfStream {
            graph: self.id,
            endpoint,
        });
        Ok(())
    }

    fn wait_for_completion(&mut self, timeout: Duration) -> Completion {
        let mut state = self.state.lock();
        let completion = state.completion.clone();
        state.events.push(SinkEvent::Waited {
            graph: self.id,
            timeout,
            completion: completion.clone(),
        });
        completion
    }

    fn halt(&mut self) {
        self.state
            .lock()
            .events
            .push(SinkEvent::Halted { graph: self.id });
    }
}

impl Drop for MemorySinkGraph {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.live -= 1;
        state.events.push(SinkEvent::Released { graph: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::AudioFormat;
    use crate::sink::topology;
    use crate::sink::types::VideoCodec;

    fn video_plan() -> GraphPlan {
        let layout = GraphLayout {
            video: Some(VideoCodec::H264),
            audio: None,
        };
        topology::plan(&layout, &AudioFormat::default(), PathBuf::from("v.mp4")).unwrap()
    }

    #[test]
    fn test_push_to_missing_endpoint_is_rejected() {
        let mut factory = MemorySinkFactory::new();
        let mut graph = factory.build(&video_plan()).unwrap();

        let result = graph.push(EndpointId::Audio, MediaBuffer::zeroed(4).unwrap());
        assert!(matches!(result, Err(SinkError::MissingEndpoint(EndpointId::Audio))));
        assert!(factory.pushed(EndpointId::Audio).is_empty());
    }

    #[test]
    fn test_push_after_end_of_stream_is_rejected() {
        let mut factory = MemorySinkFactory::new();
        let mut graph = factory.build(&video_plan()).unwrap();

        graph.end_of_stream(EndpointId::Video).unwrap();
        let result = graph.push(EndpointId::Video, MediaBuffer::zeroed(4).unwrap());
        assert!(matches!(result, Err(SinkError::Push { .. })));
    }

    #[test]
    fn test_release_is_tracked() {
        let mut factory = MemorySinkFactory::new();
        let graph = factory.build(&video_plan()).unwrap();
        assert_eq!(factory.live_graphs(), 1);

        drop(graph);
        assert_eq!(factory.live_graphs(), 0);
        assert_eq!(factory.max_live_graphs(), 1);
        assert_eq!(factory.events().last(), Some(&SinkEvent::Released { graph: 1 }));
    }

    #[test]
    fn test_failed_build_creates_nothing() {
        let mut factory = MemorySinkFactory::new();
        factory.fail_next_build();

        assert!(factory.build(&video_plan()).is_err());
        assert_eq!(factory.graphs_built(), 0);
        assert!(factory.build(&video_plan()).is_ok());
    }
}
