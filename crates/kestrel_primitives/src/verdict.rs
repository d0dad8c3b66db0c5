use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::IntegrityTier;

/// Machine-readable reason attached to an invalid verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    UnsupportedPlatform,
    MissingAttestationConfig,
    MissingTokenPayload,
    PackageNameMismatch,
    AttestationExpired,
    AppNotRecognized,
    AppNotLicensed,
    DeviceIntegrityFailed,
    MissingTokenOrKeyid,
    MissingDcappattestConfig,
    InvalidAttestationFormat,
}

impl ReasonCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedPlatform => "unsupported_platform",
            Self::MissingAttestationConfig => "missing_attestation_config",
            Self::MissingTokenPayload => "missing_token_payload",
            Self::PackageNameMismatch => "package_name_mismatch",
            Self::AttestationExpired => "attestation_expired",
            Self::AppNotRecognized => "app_not_recognized",
            Self::AppNotLicensed => "app_not_licensed",
            Self::DeviceIntegrityFailed => "device_integrity_failed",
            Self::MissingTokenOrKeyid => "missing_token_or_keyid",
            Self::MissingDcappattestConfig => "missing_dcappattest_config",
            Self::InvalidAttestationFormat => "invalid_attestation_format",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of one attestation evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustVerdict {
    /// Platform tag as supplied by the client.
    pub platform: String,
    pub device_id: String,
    pub is_valid: bool,
    pub tier: IntegrityTier,
    pub reason: Option<ReasonCode>,
    /// Unix seconds.
    pub evaluated_at: u64,
}

impl TrustVerdict {
    #[must_use]
    pub fn valid(platform: &str, device_id: &str, tier: IntegrityTier, evaluated_at: u64) -> Self {
        Self {
            platform: platform.to_owned(),
            device_id: device_id.to_owned(),
            is_valid: true,
            tier,
            reason: None,
            evaluated_at,
        }
    }

    #[must_use]
    pub fn invalid(
        platform: &str,
        device_id: &str,
        tier: IntegrityTier,
        reason: ReasonCode,
        evaluated_at: u64,
    ) -> Self {
        Self {
            platform: platform.to_owned(),
            device_id: device_id.to_owned(),
            is_valid: false,
            tier,
            reason: Some(reason),
            evaluated_at,
        }
    }
}

/// Whether a client must be served decoy infrastructure.
///
/// Only a valid verdict at `Strong` integrity sees real endpoints.
#[must_use]
pub fn requires_decoy(verdict: Option<&TrustVerdict>) -> bool {
    match verdict {
        None => true,
        Some(v) => !v.is_valid || v.tier < IntegrityTier::Strong,
    }
}
