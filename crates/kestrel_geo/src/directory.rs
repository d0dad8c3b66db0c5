//! Endpoint directory contract and an in-memory implementation.
//!
//! The production directory is a relational store owned by the operator
//! tooling; the core only reads candidates and forwards operator reports.

use std::sync::Arc;

use async_trait::async_trait;
use kestrel_primitives::{Clock, Endpoint, EndpointStatus, SystemClock};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Row cap for real endpoints returned per region.
pub const MAX_REGION_ENDPOINTS: usize = 100;
/// Row cap for decoys returned per region.
pub const MAX_REGION_DECOYS: usize = 10;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("endpoint not found: {0}")]
    NotFound(String),

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Periodic health report sent by a gateway operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub endpoint_id: String,
    pub status: EndpointStatus,
    pub users_connected: u32,
    pub bandwidth_used_mbps: u32,
    pub packets_forwarded: u64,
    pub uptime_percent: f64,
}

/// Time-series sample written together with each status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub at: u64,
    pub endpoint_id: String,
    pub users_connected: u32,
    pub bandwidth_used_mbps: u32,
    pub packets_forwarded: u64,
    pub uptime_percent: f64,
}

#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    /// Active, non-decoy endpoints in `region`.
    async fn endpoints_by_region(&self, region: &str) -> Result<Vec<Endpoint>, DirectoryError>;

    /// Active decoy endpoints in `region`.
    async fn decoys_by_region(&self, region: &str) -> Result<Vec<Endpoint>, DirectoryError>;

    /// Active or degraded non-decoy endpoints across all regions.
    async fn all_active(&self) -> Result<Vec<Endpoint>, DirectoryError>;

    /// Apply a status report and append its metric sample atomically.
    async fn record_status(&self, report: &StatusReport) -> Result<(), DirectoryError>;

    /// Persist a load fraction already clamped into `[0, 1]`.
    async fn record_load(&self, endpoint_id: &str, load: f64) -> Result<(), DirectoryError>;
}

#[derive(Default)]
struct Tables {
    endpoints: Vec<Endpoint>,
    metrics: Vec<MetricSample>,
}

/// Directory backed by process memory, for development and tests.
pub struct MemoryDirectory {
    tables: RwLock<Tables>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { tables: RwLock::new(Tables::default()), clock }
    }

    /// Insert or replace an endpoint by id.
    pub fn upsert(&self, endpoint: Endpoint) {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.endpoints.iter_mut().find(|e| e.id == endpoint.id) {
            *existing = endpoint;
        } else {
            tables.endpoints.push(endpoint);
        }
    }

    #[must_use]
    pub fn get(&self, endpoint_id: &str) -> Option<Endpoint> {
        self.tables.read().endpoints.iter().find(|e| e.id == endpoint_id).cloned()
    }

    #[must_use]
    pub fn metrics(&self) -> Vec<MetricSample> {
        self.tables.read().metrics.clone()
    }

    fn select(&self, limit: usize, pred: impl Fn(&Endpoint) -> bool) -> Vec<Endpoint> {
        self.tables
            .read()
            .endpoints
            .iter()
            .filter(|e| pred(e))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EndpointDirectory for MemoryDirectory {
    async fn endpoints_by_region(&self, region: &str) -> Result<Vec<Endpoint>, DirectoryError> {
        Ok(self.select(MAX_REGION_ENDPOINTS, |e| {
            e.region == region && e.status == EndpointStatus::Active && !e.is_decoy
        }))
    }

    async fn decoys_by_region(&self, region: &str) -> Result<Vec<Endpoint>, DirectoryError> {
        Ok(self.select(MAX_REGION_DECOYS, |e| {
            e.region == region && e.status == EndpointStatus::Active && e.is_decoy
        }))
    }

    async fn all_active(&self) -> Result<Vec<Endpoint>, DirectoryError> {
        Ok(self.select(usize::MAX, |e| {
            matches!(e.status, EndpointStatus::Active | EndpointStatus::Degraded) && !e.is_decoy
        }))
    }

    async fn record_status(&self, report: &StatusReport) -> Result<(), DirectoryError> {
        let now = self.clock.now_unix();
        let mut tables = self.tables.write();
        let endpoint = tables
            .endpoints
            .iter_mut()
            .find(|e| e.id == report.endpoint_id)
            .ok_or_else(|| DirectoryError::NotFound(report.endpoint_id.clone()))?;
        endpoint.status = report.status;
        endpoint.current_users = report.users_connected;
        endpoint.last_seen = Some(now);
        tables.metrics.push(MetricSample {
            at: now,
            endpoint_id: report.endpoint_id.clone(),
            users_connected: report.users_connected,
            bandwidth_used_mbps: report.bandwidth_used_mbps,
            packets_forwarded: report.packets_forwarded,
            uptime_percent: report.uptime_percent,
        });
        Ok(())
    }

    async fn record_load(&self, endpoint_id: &str, load: f64) -> Result<(), DirectoryError> {
        let now = self.clock.now_unix();
        let mut tables = self.tables.write();
        let endpoint = tables
            .endpoints
            .iter_mut()
            .find(|e| e.id == endpoint_id)
            .ok_or_else(|| DirectoryError::NotFound(endpoint_id.to_owned()))?;
        // Without a capacity figure the user count cannot be derived.
        if let Some(max) = endpoint.max_users {
            endpoint.current_users = users_for_load(load, max);
        }
        endpoint.last_seen = Some(now);
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn users_for_load(load: f64, max: u32) -> u32 {
    let users = (load.clamp(0.0, 1.0) * f64::from(max)).round();
    (users as u32).min(max)
}
