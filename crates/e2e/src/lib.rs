//! End-to-end harness for the Kestrel rendezvous core
//!
//! Wires [`Rendezvous`] to an in-memory directory and scripted attestation
//! backends so tests can drive whole request flows from configuration
//! variables down to signed packs.

#![forbid(unsafe_code)]
#![deny(warnings)]

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kestrel_attest::{
    AppAttestRequest, AppAttestValidator, AttestError, IntegrityBackend, IntegrityConnector, IntegrityCredentials,
    IntegrityPayload, MemoryAudit,
};
use kestrel_geo::MemoryDirectory;
use kestrel_primitives::{Endpoint, EndpointStatus, FixedClock, MemorySink};
use kestrel_rendezvous::{Collaborators, MemoryDiscoveryLog, Rendezvous, Settings, StartupError};

pub const NOW_SECS: u64 = 1_760_000_000;
pub const PACKAGE: &str = "net.kestrel.client";
pub const TEAM: &str = "TEAM123";
pub const BUNDLE: &str = "net.kestrel.ios";

/// Base64 private key for a fixed 32-byte seed.
#[must_use]
pub fn private_key(seed: u8) -> String {
    STANDARD.encode([seed; 32])
}

/// Base64 public key matching [`private_key`].
#[must_use]
pub fn public_key(seed: u8) -> String {
    STANDARD.encode(ed25519_dalek::SigningKey::from_bytes(&[seed; 32]).verifying_key().as_bytes())
}

#[must_use]
pub fn gateway(id: &str, region: &str, users: u32, decoy: bool) -> Endpoint {
    Endpoint {
        id: id.into(),
        public_key: vec![0xAB; 32],
        address: format!("203.0.113.{}", id.len() + 10),
        port: 443,
        transports: vec!["quic".into(), "websocket".into()],
        discovery_channels: vec!["gps".into(), "fm_rds".into()],
        region: region.into(),
        current_users: users,
        max_users: Some(100),
        status: EndpointStatus::Active,
        is_decoy: decoy,
        last_seen: None,
    }
}

/// Play Integrity payload as the decode API returns it, issued 5s ago.
#[must_use]
pub fn integrity_payload(device_labels: Option<&[&str]>) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "requestDetails": {
            "requestPackageName": PACKAGE,
            "timestampMillis": (NOW_SECS * 1_000 - 5_000).to_string(),
            "nonce": "bm9uY2U",
        },
        "appIntegrity": { "appRecognitionVerdict": "PLAY_RECOGNIZED" },
        "accountDetails": { "appLicensingVerdict": "LICENSED" },
    });
    if let Some(labels) = device_labels {
        payload["deviceIntegrity"] = serde_json::json!({ "deviceRecognitionVerdict": labels });
    }
    payload
}

/// App Attest envelope for `key_id`.
#[must_use]
pub fn app_attest_token(key_id: &str) -> String {
    serde_json::json!({
        "attestationObject": STANDARD.encode(b"attestation-cbor"),
        "clientDataHash": STANDARD.encode([1u8; 32]),
        "keyId": key_id,
    })
    .to_string()
}

struct ScriptedBackend(serde_json::Value);

#[async_trait]
impl IntegrityBackend for ScriptedBackend {
    async fn decode_token(&self, _package_name: &str, token: &str) -> Result<IntegrityPayload, AttestError> {
        if token == "unreachable" {
            return Err(AttestError::Backend("playintegrity.googleapis.com: 503".into()));
        }
        serde_json::from_value(self.0.clone()).map_err(|e| AttestError::Backend(e.to_string()))
    }
}

/// Connector whose backend answers every token with the same payload.
pub struct ScriptedIntegrity(pub serde_json::Value);

#[async_trait]
impl IntegrityConnector for ScriptedIntegrity {
    async fn connect(
        &self,
        _credentials: Option<&IntegrityCredentials>,
    ) -> Result<Arc<dyn IntegrityBackend>, AttestError> {
        Ok(Arc::new(ScriptedBackend(self.0.clone())))
    }
}

/// Validator that accepts every envelope for the configured app.
pub struct AcceptingValidator;

#[async_trait]
impl AppAttestValidator for AcceptingValidator {
    async fn validate(&self, request: &AppAttestRequest<'_>) -> Result<(), AttestError> {
        if request.app_id == format!("{TEAM}.{BUNDLE}") {
            Ok(())
        } else {
            Err(AttestError::AppAttest(format!("unexpected app id {}", request.app_id)))
        }
    }
}

/// A running core plus handles onto its in-memory collaborators.
pub struct Fleet {
    pub core: Rendezvous,
    pub directory: Arc<MemoryDirectory>,
    pub audit: Arc<MemoryAudit>,
    pub discovery: Arc<MemoryDiscoveryLog>,
    pub events: Arc<MemorySink>,
}

impl Fleet {
    /// Two real relays and one decoy in `us-east-1`, one relay in `eu-west-1`.
    pub fn start(vars: &[(&str, &str)], integrity: Option<serde_json::Value>) -> Result<Self, StartupError> {
        let clock = Arc::new(FixedClock::at_unix(NOW_SECS));
        let directory = Arc::new(MemoryDirectory::with_clock(clock.clone()));
        directory.upsert(gateway("relay-busy", "us-east-1", 70, false));
        directory.upsert(gateway("relay-idle", "us-east-1", 5, false));
        directory.upsert(gateway("decoy-1", "us-east-1", 0, true));
        directory.upsert(gateway("relay-eu", "eu-west-1", 30, false));

        let audit = Arc::new(MemoryAudit::new());
        let discovery = Arc::new(MemoryDiscoveryLog::new());
        let events = Arc::new(MemorySink::new());

        let mut collaborators = Collaborators::new(directory.clone());
        collaborators.audit = audit.clone();
        collaborators.discovery_log = discovery.clone();
        collaborators.events = events.clone();
        collaborators.clock = clock;
        collaborators.integrity = integrity.map(|p| Arc::new(ScriptedIntegrity(p)) as Arc<dyn IntegrityConnector>);
        collaborators.app_attest = Some(Arc::new(AcceptingValidator));

        let settings = Settings::from_vars(vars.iter().copied())?;
        let core = Rendezvous::new(&settings, collaborators)?;
        Ok(Self { core, directory, audit, discovery, events })
    }
}
