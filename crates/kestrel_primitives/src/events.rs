//! Observability events emitted by the pipeline.
//!
//! Components receive an `Arc<dyn EventSink>` at construction; exporters
//! (Prometheus, StatsD, ...) live outside the core.

use parking_lot::Mutex;

use crate::types::{DiscoveryChannel, EndpointStatus};

/// Attestation evaluation result class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Valid,
    Invalid,
    /// Backend or cryptographic failure.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Attestation {
        platform: String,
        outcome: Outcome,
        reason: Option<&'static str>,
    },
    PackGenerated {
        region: String,
        decoy: bool,
    },
    StatusUpdated {
        endpoint_id: String,
        status: EndpointStatus,
    },
    DiscoveryLogged {
        channel: DiscoveryChannel,
        success: bool,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: Event) {}
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}
