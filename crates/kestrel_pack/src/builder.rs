use std::collections::BTreeMap;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use kestrel_geo::{DirectoryError, GeoBalancer, DEFAULT_ENDPOINT_LIMIT};
use kestrel_primitives::{requires_decoy, Clock, Event, EventSink, NoopSink, SystemClock, TrustVerdict};
use kestrel_rollout::RolloutGate;
use thiserror::Error;
use tracing::{info, instrument};

use crate::catalog::{discovery_descriptor, transport_catalog};
use crate::keys::SigningKeys;
use crate::pack::{ConfigPack, EndpointInfo, PACK_FORMAT_VERSION};

pub const ROLLOUT_CURRENT: &str = "current";
pub const ROLLOUT_HOLDBACK: &str = "holdback";

#[derive(Debug, Error)]
pub enum PackError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("pack serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Assembles and signs config packs.
pub struct PackBuilder {
    balancer: GeoBalancer,
    keys: Arc<SigningKeys>,
    clock: Arc<dyn Clock>,
    rollout: Option<RolloutGate>,
    events: Arc<dyn EventSink>,
    max_endpoints: usize,
}

impl PackBuilder {
    #[must_use]
    pub fn new(balancer: GeoBalancer, keys: Arc<SigningKeys>) -> Self {
        Self {
            balancer,
            keys,
            clock: Arc::new(SystemClock),
            rollout: None,
            events: Arc::new(NoopSink),
            max_endpoints: DEFAULT_ENDPOINT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Stamp each pack's metadata with the client's rollout cohort.
    #[must_use]
    pub fn with_rollout(mut self, gate: RolloutGate) -> Self {
        self.rollout = Some(gate);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub const fn with_max_endpoints(mut self, max_endpoints: usize) -> Self {
        self.max_endpoints = max_endpoints;
        self
    }

    #[must_use]
    pub fn public_key(&self) -> &VerifyingKey {
        self.keys.verifying_key()
    }

    #[must_use]
    pub const fn balancer(&self) -> &GeoBalancer {
        &self.balancer
    }

    #[instrument(skip(self, preferred, verdict), fields(decoy))]
    pub async fn build(
        &self,
        client_id: &str,
        region_hint: &str,
        preferred: &[String],
        verdict: Option<&TrustVerdict>,
    ) -> Result<ConfigPack, PackError> {
        let decoy = requires_decoy(verdict);
        tracing::Span::current().record("decoy", decoy);

        let region = self.balancer.select_region(region_hint, preferred).await;
        let selected = self.balancer.select_endpoints(&region, verdict, self.max_endpoints).await?;

        let mut metadata = BTreeMap::from([
            ("client_id".to_owned(), client_id.to_owned()),
            ("region".to_owned(), region.clone()),
        ]);
        if let Some(gate) = &self.rollout {
            let cohort = if gate.include(client_id, PACK_FORMAT_VERSION, &region) {
                ROLLOUT_CURRENT
            } else {
                ROLLOUT_HOLDBACK
            };
            metadata.insert("rollout".to_owned(), cohort.to_owned());
        }

        let mut pack = ConfigPack {
            version: PACK_FORMAT_VERSION.to_owned(),
            timestamp: self.clock.now_unix(),
            endpoints: selected.iter().map(EndpointInfo::from).collect(),
            transports: transport_catalog(),
            discovery: discovery_descriptor(),
            metadata,
            signature: Vec::new(),
            public_key: Vec::new(),
        };
        pack.sign(&self.keys)?;

        info!(region = %region, endpoints = pack.endpoints.len(), "config pack generated");
        self.events.emit(Event::PackGenerated { region, decoy });
        Ok(pack)
    }
}
