use async_trait::async_trait;
use kestrel_primitives::{IntegrityTier, TrustVerdict};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// One row of the attestation audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub device_id: String,
    /// Platform string exactly as the client sent it.
    pub platform: String,
    pub token: String,
    pub is_valid: bool,
    pub tier: IntegrityTier,
    pub at: u64,
}

impl AttestationRecord {
    #[must_use]
    pub fn from_verdict(verdict: &TrustVerdict, token: &str) -> Self {
        Self {
            device_id: verdict.device_id.clone(),
            platform: verdict.platform.clone(),
            token: token.to_owned(),
            is_valid: verdict.is_valid,
            tier: verdict.tier,
            at: verdict.evaluated_at,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AttestationRecord) -> Result<(), AuditError>;
}

/// Audit trail held in memory.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    records: Mutex<Vec<AttestationRecord>>,
}

impl MemoryAudit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<AttestationRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn record(&self, record: AttestationRecord) -> Result<(), AuditError> {
        self.records.lock().push(record);
        Ok(())
    }
}
