use async_trait::async_trait;
use kestrel_primitives::DiscoveryChannel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("discovery log write failed: {0}")]
pub struct DiscoveryLogError(pub String);

/// One client-reported discovery attempt, after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub channel: DiscoveryChannel,
    pub gateway_id: Option<String>,
    /// Region inferred from the client's country, if known.
    pub region: Option<String>,
    pub success: bool,
    pub latency_ms: Option<u32>,
    pub error: Option<String>,
    pub at: u64,
}

#[async_trait]
pub trait DiscoveryLog: Send + Sync {
    async fn record(&self, record: DiscoveryRecord) -> Result<(), DiscoveryLogError>;
}

#[derive(Debug, Default)]
pub struct MemoryDiscoveryLog {
    records: Mutex<Vec<DiscoveryRecord>>,
}

impl MemoryDiscoveryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<DiscoveryRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl DiscoveryLog for MemoryDiscoveryLog {
    async fn record(&self, record: DiscoveryRecord) -> Result<(), DiscoveryLogError> {
        self.records.lock().push(record);
        Ok(())
    }
}
