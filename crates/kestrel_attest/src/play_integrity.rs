//! Android attestation through the Play Integrity decode API.
//!
//! The HTTP client is supplied by an [`IntegrityConnector`] and built at
//! most once per attester, on first use. A connector that fails to build a
//! client leaves the attester in the "not configured" state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kestrel_primitives::{IntegrityTier, Platform, ReasonCode, TrustVerdict};
use serde::{Deserialize, Deserializer};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::attester::{bypass_or_reject, AttestationInput, Attester};
use crate::error::AttestError;

pub const PLAY_RECOGNIZED: &str = "PLAY_RECOGNIZED";
pub const LICENSED: &str = "LICENSED";
pub const MEETS_STRONG_INTEGRITY: &str = "MEETS_STRONG_INTEGRITY";
pub const MEETS_DEVICE_INTEGRITY: &str = "MEETS_DEVICE_INTEGRITY";
pub const MEETS_BASIC_INTEGRITY: &str = "MEETS_BASIC_INTEGRITY";

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayIntegrityPolicy {
    /// Expected requesting package; `None` means Android is not configured.
    pub package_name: Option<String>,
    pub allow_basic: bool,
    pub require_licensed: bool,
    /// Maximum token age, applied in both directions.
    pub max_age: Duration,
    pub allow_bypass: bool,
    pub timeout: Duration,
}

impl Default for PlayIntegrityPolicy {
    fn default() -> Self {
        Self {
            package_name: None,
            allow_basic: false,
            require_licensed: true,
            max_age: DEFAULT_MAX_AGE,
            allow_bypass: false,
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

/// Service account material handed to the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityCredentials {
    File(PathBuf),
    Json(String),
}

/// Decoded token payload, shaped like the decode API response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityPayload {
    #[serde(default)]
    pub request_details: Option<RequestDetails>,
    #[serde(default)]
    pub app_integrity: Option<AppIntegrity>,
    #[serde(default)]
    pub account_details: Option<AccountDetails>,
    #[serde(default)]
    pub device_integrity: Option<DeviceIntegrity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    #[serde(default)]
    pub request_package_name: Option<String>,
    /// The API renders this as a decimal string; numbers are accepted too.
    #[serde(default, deserialize_with = "millis")]
    pub timestamp_millis: Option<u64>,
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIntegrity {
    #[serde(default)]
    pub app_recognition_verdict: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetails {
    #[serde(default)]
    pub app_licensing_verdict: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIntegrity {
    #[serde(default)]
    pub device_recognition_verdict: Vec<String>,
}

fn millis<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }
    match Option::<Raw>::deserialize(de)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl IntegrityPayload {
    /// Highest tier present in the device recognition verdict list.
    #[must_use]
    pub fn tier(&self) -> IntegrityTier {
        let Some(device) = &self.device_integrity else {
            return IntegrityTier::Unknown;
        };
        device
            .device_recognition_verdict
            .iter()
            .map(|label| match label.as_str() {
                MEETS_STRONG_INTEGRITY => IntegrityTier::Strong,
                MEETS_DEVICE_INTEGRITY => IntegrityTier::Device,
                MEETS_BASIC_INTEGRITY => IntegrityTier::Basic,
                _ => IntegrityTier::Unknown,
            })
            .max()
            .unwrap_or(IntegrityTier::Unknown)
    }

    fn app_recognition(&self) -> Option<&str> {
        self.app_integrity.as_ref()?.app_recognition_verdict.as_deref()
    }

    fn licensing(&self) -> Option<&str> {
        self.account_details.as_ref()?.app_licensing_verdict.as_deref()
    }
}

/// Token decode call against the Play Integrity API.
#[async_trait]
pub trait IntegrityBackend: Send + Sync {
    async fn decode_token(&self, package_name: &str, token: &str) -> Result<IntegrityPayload, AttestError>;
}

/// Builds the backend client from credentials.
#[async_trait]
pub trait IntegrityConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: Option<&IntegrityCredentials>,
    ) -> Result<Arc<dyn IntegrityBackend>, AttestError>;
}

pub struct PlayIntegrityAttester {
    policy: PlayIntegrityPolicy,
    connector: Option<Arc<dyn IntegrityConnector>>,
    credentials: Option<IntegrityCredentials>,
    backend: OnceCell<Option<Arc<dyn IntegrityBackend>>>,
}

impl PlayIntegrityAttester {
    #[must_use]
    pub fn new(
        policy: PlayIntegrityPolicy,
        connector: Option<Arc<dyn IntegrityConnector>>,
        credentials: Option<IntegrityCredentials>,
    ) -> Self {
        Self { policy, connector, credentials, backend: OnceCell::new() }
    }

    #[must_use]
    pub const fn policy(&self) -> &PlayIntegrityPolicy {
        &self.policy
    }

    async fn backend(&self) -> Option<Arc<dyn IntegrityBackend>> {
        let connector = self.connector.as_ref()?;
        self.backend
            .get_or_init(|| async {
                match connector.connect(self.credentials.as_ref()).await {
                    Ok(backend) => {
                        info!("play integrity backend initialized");
                        Some(backend)
                    }
                    Err(err) => {
                        warn!(error = %err, "play integrity backend unavailable, treating android as unconfigured");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Apply the acceptance policy to a decoded payload.
    #[must_use]
    pub fn judge(
        &self,
        payload: &IntegrityPayload,
        package_name: &str,
        input: &AttestationInput<'_>,
        now_millis: u64,
    ) -> TrustVerdict {
        let at = now_millis / 1_000;
        let tier = payload.tier();
        let reject = |reason| TrustVerdict::invalid(input.platform, input.device_id, tier, reason, at);

        let Some(details) = &payload.request_details else {
            return reject(ReasonCode::MissingTokenPayload);
        };
        if details.request_package_name.as_deref() != Some(package_name) {
            return reject(ReasonCode::PackageNameMismatch);
        }
        let max_age = u64::try_from(self.policy.max_age.as_millis()).unwrap_or(u64::MAX);
        match details.timestamp_millis {
            Some(ts) if now_millis.abs_diff(ts) <= max_age => {}
            _ => return reject(ReasonCode::AttestationExpired),
        }
        if payload.app_recognition() != Some(PLAY_RECOGNIZED) {
            return reject(ReasonCode::AppNotRecognized);
        }
        if self.policy.require_licensed && payload.licensing() != Some(LICENSED) {
            return reject(ReasonCode::AppNotLicensed);
        }

        let accepted = match tier {
            IntegrityTier::Strong => true,
            IntegrityTier::Basic | IntegrityTier::Device => self.policy.allow_basic,
            IntegrityTier::Unknown | IntegrityTier::Bypass => false,
        };
        if accepted {
            TrustVerdict::valid(input.platform, input.device_id, tier, at)
        } else {
            reject(ReasonCode::DeviceIntegrityFailed)
        }
    }
}

#[async_trait]
impl Attester for PlayIntegrityAttester {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn attest(&self, input: &AttestationInput<'_>, now_millis: u64) -> Result<TrustVerdict, AttestError> {
        let at = now_millis / 1_000;
        let Some(package_name) = self.policy.package_name.as_deref() else {
            return Ok(bypass_or_reject(input, self.policy.allow_bypass, ReasonCode::MissingAttestationConfig, at));
        };
        let Some(backend) = self.backend().await else {
            return Ok(bypass_or_reject(input, self.policy.allow_bypass, ReasonCode::MissingAttestationConfig, at));
        };

        let payload = tokio::time::timeout(self.policy.timeout, backend.decode_token(package_name, input.token))
            .await
            .map_err(|_| AttestError::Timeout(self.policy.timeout))??;
        debug!(device_id = input.device_id, tier = %payload.tier(), "play integrity token decoded");
        Ok(self.judge(&payload, package_name, input, now_millis))
    }
}
