use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use kestrel_primitives::{requires_decoy, Endpoint, TrustVerdict};
use tracing::{debug, warn};

use crate::directory::{DirectoryError, EndpointDirectory};
use crate::regions::{adjacent_regions, DEFAULT_REGION};

/// Endpoints at or above this load do not make a region available.
pub const OVERLOAD_THRESHOLD: f64 = 0.9;
/// Selection cap when the caller passes zero.
pub const DEFAULT_ENDPOINT_LIMIT: usize = 5;

/// How decoys relate to the real set for clients that require them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoyPolicy {
    /// Serve decoys only; the real relay set is never disclosed.
    #[default]
    Replace,
    /// Rank decoys together with the real set.
    Merge,
}

impl FromStr for DecoyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            other => Err(other.to_owned()),
        }
    }
}

impl fmt::Display for DecoyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Replace => "replace",
            Self::Merge => "merge",
        })
    }
}

/// Region resolution and load-ranked endpoint selection.
#[derive(Clone)]
pub struct GeoBalancer {
    directory: Arc<dyn EndpointDirectory>,
    policy: DecoyPolicy,
}

impl GeoBalancer {
    #[must_use]
    pub fn new(directory: Arc<dyn EndpointDirectory>, policy: DecoyPolicy) -> Self {
        Self { directory, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> DecoyPolicy {
        self.policy
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn EndpointDirectory> {
        &self.directory
    }

    /// Resolve the region a client should be served from.
    ///
    /// Order: `explicit`, then each of `preferred`, then the adjacency walk
    /// for `explicit`, then [`DEFAULT_REGION`]. Never fails.
    pub async fn select_region(&self, explicit: &str, preferred: &[String]) -> String {
        if !explicit.is_empty() && self.is_region_available(explicit).await {
            return explicit.to_owned();
        }

        for region in preferred {
            if self.is_region_available(region).await {
                debug!(region = %region, "using preferred region");
                return region.clone();
            }
        }

        for region in adjacent_regions(explicit) {
            if self.is_region_available(region).await {
                debug!(requested = explicit, region, "using nearest available region");
                return (*region).to_owned();
            }
        }

        debug!(requested = explicit, "no region available, using default");
        DEFAULT_REGION.to_owned()
    }

    /// Load-ranked candidates for `region`, with decoys for untrusted clients.
    pub async fn select_endpoints(
        &self,
        region: &str,
        verdict: Option<&TrustVerdict>,
        limit: usize,
    ) -> Result<Vec<Endpoint>, DirectoryError> {
        let candidates = if requires_decoy(verdict) {
            let mut decoys = self.directory.decoys_by_region(region).await?;
            if self.policy == DecoyPolicy::Merge {
                decoys.extend(self.directory.endpoints_by_region(region).await?);
            }
            decoys
        } else {
            self.directory.endpoints_by_region(region).await?
        };

        let limit = if limit == 0 { DEFAULT_ENDPOINT_LIMIT } else { limit };
        Ok(rank_by_load(candidates, limit))
    }

    /// Persist a reported load, clamped into `[0, 1]`.
    pub async fn record_load(&self, endpoint_id: &str, load: f64) -> Result<(), DirectoryError> {
        let load = if load.is_nan() { 0.0 } else { load.clamp(0.0, 1.0) };
        self.directory.record_load(endpoint_id, load).await
    }

    async fn is_region_available(&self, region: &str) -> bool {
        match self.directory.endpoints_by_region(region).await {
            Ok(endpoints) => endpoints
                .iter()
                .any(|e| e.is_healthy() && e.load() < OVERLOAD_THRESHOLD),
            Err(err) => {
                warn!(region, error = %err, "region availability lookup failed");
                false
            }
        }
    }
}

/// Stable ascending sort by load, truncated to `limit`.
#[must_use]
pub fn rank_by_load(mut endpoints: Vec<Endpoint>, limit: usize) -> Vec<Endpoint> {
    endpoints.sort_by(|a, b| a.load().total_cmp(&b.load()));
    endpoints.truncate(limit);
    endpoints
}
