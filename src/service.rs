//! The rendezvous service facade.
//!
//! Transport layers (HTTP, gRPC, ...) decode requests into the types below,
//! call one operation and map [`ServiceError::client_code`] onto their own
//! status codes.

use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use kestrel_attest::{
    AppAttestAttester, AppAttestValidator, Attester, AuditSink, IntegrityConnector, MemoryAudit,
    PlayIntegrityAttester, TrustEvaluator,
};
use kestrel_geo::{region_for_country, DirectoryError, EndpointDirectory, GeoBalancer, StatusReport};
use kestrel_pack::{ConfigPack, PackBuilder, SigningKeys};
use kestrel_primitives::{
    Clock, DiscoveryChannel, Endpoint, EndpointStatus, Event, EventSink, IntegrityTier, NoopSink, Platform,
    ReasonCode, SystemClock,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::discovery::{DiscoveryLog, DiscoveryRecord, MemoryDiscoveryLog};
use crate::errors::{ServiceError, StartupError};
use crate::settings::Settings;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub device_id: String,
    pub platform: String,
    #[serde(default)]
    pub region: Option<String>,
    /// ISO 3166-1 alpha-2 code from the edge, used when `region` is absent.
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub preferred_regions: Vec<String>,
    #[serde(default)]
    pub attestation: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub client_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub platform: String,
    pub token: String,
    pub device_id: String,
    #[serde(default)]
    pub key_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationOutcome {
    pub verified: bool,
    pub integrity: IntegrityTier,
    pub reason: Option<ReasonCode>,
}

/// Gateway health report as received from an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayStatusReport {
    pub gateway_id: String,
    pub status: String,
    pub users_connected: u32,
    pub bandwidth_used_mbps: u32,
    pub packets_forwarded: u64,
    pub uptime_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub channel_type: String,
    #[serde(default)]
    pub gateway_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub latency_ms: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Public listing entry; carries no address or key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub id: String,
    pub callsign: String,
    pub region: String,
    pub status: EndpointStatus,
    pub current_users: u32,
    pub max_users: Option<u32>,
    pub last_seen: Option<u64>,
}

impl From<&Endpoint> for EndpointSummary {
    fn from(e: &Endpoint) -> Self {
        Self {
            id: e.id.clone(),
            callsign: e.callsign(),
            region: e.region.clone(),
            status: e.status,
            current_users: e.current_users,
            max_users: e.max_users,
            last_seen: e.last_seen,
        }
    }
}

/// External systems the core talks to.
pub struct Collaborators {
    pub directory: Arc<dyn EndpointDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub discovery_log: Arc<dyn DiscoveryLog>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
    /// Builds the Play Integrity client; `None` leaves Android unconfigured.
    pub integrity: Option<Arc<dyn IntegrityConnector>>,
    /// Validates App Attest objects; `None` leaves iOS unconfigured.
    pub app_attest: Option<Arc<dyn AppAttestValidator>>,
}

impl Collaborators {
    /// In-memory sinks, system clock, no attestation backends.
    #[must_use]
    pub fn new(directory: Arc<dyn EndpointDirectory>) -> Self {
        Self {
            directory,
            audit: Arc::new(MemoryAudit::new()),
            discovery_log: Arc::new(MemoryDiscoveryLog::new()),
            events: Arc::new(NoopSink),
            clock: Arc::new(SystemClock),
            integrity: None,
            app_attest: None,
        }
    }
}

pub struct Rendezvous {
    evaluator: TrustEvaluator,
    builder: PackBuilder,
    directory: Arc<dyn EndpointDirectory>,
    discovery_log: Arc<dyn DiscoveryLog>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl Rendezvous {
    /// Validate `settings`, resolve the signing key and wire the pipeline.
    pub fn new(settings: &Settings, collaborators: Collaborators) -> Result<Self, StartupError> {
        settings.validate()?;
        let keys = Arc::new(SigningKeys::resolve(&settings.keys)?);

        let Collaborators { directory, audit, discovery_log, events, clock, integrity, app_attest } = collaborators;

        let attesters: Vec<Arc<dyn Attester>> = vec![
            Arc::new(PlayIntegrityAttester::new(
                settings.play_integrity.clone(),
                integrity,
                settings.integrity_credentials.clone(),
            )),
            Arc::new(AppAttestAttester::new(settings.app_attest.clone(), app_attest)),
        ];
        let evaluator = TrustEvaluator::new(attesters, audit).with_events(events.clone()).with_clock(clock.clone());

        let mut builder = PackBuilder::new(GeoBalancer::new(directory.clone(), settings.decoy_policy), keys)
            .with_clock(clock.clone())
            .with_events(events.clone())
            .with_max_endpoints(settings.max_endpoints);
        if let Some(gate) = &settings.rollout {
            builder = builder.with_rollout(gate.clone());
        }

        info!(
            production = settings.production,
            decoy_policy = %settings.decoy_policy,
            rollout = settings.rollout.is_some(),
            "rendezvous core ready"
        );
        Ok(Self { evaluator, builder, directory, discovery_log, events, clock })
    }

    /// Key clients pin to verify packs.
    #[must_use]
    pub fn public_key(&self) -> &VerifyingKey {
        self.builder.public_key()
    }

    #[instrument(
        skip(self, request),
        fields(device_id = %request.device_id, platform = %request.platform, client_version = request.client_version.as_deref())
    )]
    pub async fn request_config(&self, request: &ConfigRequest) -> Result<ConfigPack, ServiceError> {
        if request.device_id.trim().is_empty() {
            return Err(ServiceError::Validation("missing_device_id"));
        }
        if request.platform.parse::<Platform>().is_err() {
            return Err(ServiceError::Validation("unsupported_platform"));
        }

        let verdict = match request.attestation.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => Some(
                self.evaluator
                    .evaluate(&request.platform, token, &request.device_id, request.key_id.as_deref())
                    .await?,
            ),
            None => None,
        };

        let region_hint = request
            .region
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| request.country.as_deref().filter(|c| !c.is_empty()).map(region_for_country))
            .unwrap_or_default();

        self.builder
            .build(&request.device_id, region_hint, &request.preferred_regions, verdict.as_ref())
            .await
            .map_err(|err| {
                warn!(error = %err, "config pack generation failed");
                ServiceError::infrastructure("config_generation_failed", &err)
            })
    }

    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn issue_challenge(&self) -> String {
        kestrel_attest::issue_challenge()
    }

    pub async fn verify_attestation(&self, request: &AttestationRequest) -> Result<AttestationOutcome, ServiceError> {
        if request.device_id.trim().is_empty() {
            return Err(ServiceError::Validation("missing_device_id"));
        }
        let verdict = self
            .evaluator
            .evaluate(&request.platform, &request.token, &request.device_id, request.key_id.as_deref())
            .await?;
        Ok(AttestationOutcome { verified: verdict.is_valid, integrity: verdict.tier, reason: verdict.reason })
    }

    pub async fn report_status(&self, report: &GatewayStatusReport) -> Result<(), ServiceError> {
        if report.gateway_id.trim().is_empty() {
            return Err(ServiceError::Validation("missing_gateway_id"));
        }
        let status: EndpointStatus = report.status.parse().map_err(|_| ServiceError::Validation("invalid_status"))?;
        if !(0.0..=100.0).contains(&report.uptime_percent) {
            return Err(ServiceError::Validation("invalid_uptime"));
        }

        let update = StatusReport {
            endpoint_id: report.gateway_id.clone(),
            status,
            users_connected: report.users_connected,
            bandwidth_used_mbps: report.bandwidth_used_mbps,
            packets_forwarded: report.packets_forwarded,
            uptime_percent: report.uptime_percent,
        };
        self.directory.record_status(&update).await.map_err(|err| match err {
            DirectoryError::NotFound(_) => ServiceError::NotFound("gateway_not_found"),
            other @ DirectoryError::Unavailable(_) => {
                warn!(gateway_id = %report.gateway_id, error = %other, "status store failed");
                ServiceError::infrastructure("gateway_status_store_failed", &other)
            }
        })?;

        self.events.emit(Event::StatusUpdated { endpoint_id: report.gateway_id.clone(), status });
        Ok(())
    }

    pub async fn record_discovery(&self, report: &DiscoveryReport) -> Result<(), ServiceError> {
        let channel: DiscoveryChannel =
            report.channel_type.parse().map_err(|_| ServiceError::Validation("invalid_channel_type"))?;
        let record = DiscoveryRecord {
            channel,
            gateway_id: report.gateway_id.clone().filter(|g| !g.is_empty()),
            region: report
                .country
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(|c| region_for_country(c).to_owned()),
            success: report.success,
            latency_ms: report.latency_ms,
            error: report.error.clone().filter(|e| !e.is_empty()),
            at: self.clock.now_unix(),
        };
        self.discovery_log.record(record).await.map_err(|err| {
            warn!(channel = %channel, error = %err, "discovery log store failed");
            ServiceError::infrastructure("discovery_log_store_failed", &err)
        })?;

        self.events.emit(Event::DiscoveryLogged { channel, success: report.success });
        Ok(())
    }

    pub async fn list_endpoints(&self) -> Result<Vec<EndpointSummary>, ServiceError> {
        let endpoints = self
            .directory
            .all_active()
            .await
            .map_err(|err| ServiceError::infrastructure("endpoint_listing_failed", &err))?;
        Ok(endpoints.iter().map(EndpointSummary::from).collect())
    }

    pub async fn record_load(&self, endpoint_id: &str, fraction: f64) -> Result<(), ServiceError> {
        self.builder.balancer().record_load(endpoint_id, fraction).await.map_err(|err| match err {
            DirectoryError::NotFound(_) => ServiceError::NotFound("gateway_not_found"),
            other @ DirectoryError::Unavailable(_) => ServiceError::infrastructure("load_store_failed", &other),
        })
    }
}
