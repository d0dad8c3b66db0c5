//! iOS attestation through App Attest.
//!
//! The client sends its attestation as a JSON envelope. Certificate chain
//! and receipt validation belong to an [`AppAttestValidator`]; this module
//! owns envelope parsing and the acceptance policy around it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kestrel_primitives::{IntegrityTier, Platform, ReasonCode, TrustVerdict};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::attester::{bypass_or_reject, AttestationInput, Attester};
use crate::error::AttestError;
use crate::play_integrity::DEFAULT_BACKEND_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppAttestConfig {
    pub team_id: Option<String>,
    pub bundle_id: Option<String>,
    /// Production App Attest environment instead of development. On unless
    /// explicitly disabled.
    pub production: bool,
    pub allow_bypass: bool,
    pub timeout: Duration,
}

impl Default for AppAttestConfig {
    fn default() -> Self {
        Self {
            team_id: None,
            bundle_id: None,
            production: true,
            allow_bypass: false,
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

impl AppAttestConfig {
    /// `teamID.bundleID`, when both halves are configured.
    #[must_use]
    pub fn app_id(&self) -> Option<String> {
        match (self.team_id.as_deref(), self.bundle_id.as_deref()) {
            (Some(team), Some(bundle)) if !team.is_empty() && !bundle.is_empty() => {
                Some(format!("{team}.{bundle}"))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    attestation_object: String,
    #[serde(default)]
    client_data_hash: Option<String>,
    #[serde(default)]
    key_id: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope is not valid json: {0}")]
    Json(String),

    #[error("field {0} is not valid base64")]
    Base64(&'static str),

    #[error("attestation object is empty")]
    EmptyObject,

    #[error("envelope key id does not match the supplied key id")]
    KeyIdMismatch,
}

/// Decoded attestation envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationEnvelope {
    pub attestation_object: Vec<u8>,
    pub client_data_hash: Option<Vec<u8>>,
    pub key_id: String,
}

impl AttestationEnvelope {
    pub fn parse(token: &str, key_id: &str) -> Result<Self, EnvelopeError> {
        let raw: Envelope = serde_json::from_str(token).map_err(|e| EnvelopeError::Json(e.to_string()))?;
        let attestation_object = STANDARD
            .decode(raw.attestation_object.as_bytes())
            .map_err(|_| EnvelopeError::Base64("attestationObject"))?;
        if attestation_object.is_empty() {
            return Err(EnvelopeError::EmptyObject);
        }
        let client_data_hash = raw
            .client_data_hash
            .map(|h| STANDARD.decode(h.as_bytes()))
            .transpose()
            .map_err(|_| EnvelopeError::Base64("clientDataHash"))?;
        if raw.key_id.as_deref().is_some_and(|k| k != key_id) {
            return Err(EnvelopeError::KeyIdMismatch);
        }
        Ok(Self { attestation_object, client_data_hash, key_id: key_id.to_owned() })
    }
}

/// What the validator is asked to check.
#[derive(Debug, Clone, Copy)]
pub struct AppAttestRequest<'a> {
    pub app_id: &'a str,
    pub production: bool,
    pub envelope: &'a AttestationEnvelope,
}

#[async_trait]
pub trait AppAttestValidator: Send + Sync {
    async fn validate(&self, request: &AppAttestRequest<'_>) -> Result<(), AttestError>;
}

pub struct AppAttestAttester {
    config: AppAttestConfig,
    validator: Option<Arc<dyn AppAttestValidator>>,
}

impl AppAttestAttester {
    #[must_use]
    pub fn new(config: AppAttestConfig, validator: Option<Arc<dyn AppAttestValidator>>) -> Self {
        Self { config, validator }
    }
}

#[async_trait]
impl Attester for AppAttestAttester {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn attest(&self, input: &AttestationInput<'_>, now_millis: u64) -> Result<TrustVerdict, AttestError> {
        let at = now_millis / 1_000;
        let key_id = match input.key_id {
            Some(k) if !k.is_empty() && !input.token.is_empty() => k,
            _ => {
                return Ok(TrustVerdict::invalid(
                    input.platform,
                    input.device_id,
                    IntegrityTier::Unknown,
                    ReasonCode::MissingTokenOrKeyid,
                    at,
                ))
            }
        };

        let (Some(app_id), Some(validator)) = (self.config.app_id(), self.validator.as_ref()) else {
            return Ok(bypass_or_reject(input, self.config.allow_bypass, ReasonCode::MissingDcappattestConfig, at));
        };

        let envelope = match AttestationEnvelope::parse(input.token, key_id) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(device_id = input.device_id, error = %err, "rejecting malformed app attest envelope");
                return Ok(TrustVerdict::invalid(
                    input.platform,
                    input.device_id,
                    IntegrityTier::Unknown,
                    ReasonCode::InvalidAttestationFormat,
                    at,
                ));
            }
        };

        let request = AppAttestRequest { app_id: &app_id, production: self.config.production, envelope: &envelope };
        tokio::time::timeout(self.config.timeout, validator.validate(&request))
            .await
            .map_err(|_| AttestError::Timeout(self.config.timeout))??;
        Ok(TrustVerdict::valid(input.platform, input.device_id, IntegrityTier::Strong, at))
    }
}
