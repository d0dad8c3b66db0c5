use async_trait::async_trait;
use kestrel_primitives::{IntegrityTier, Platform, ReasonCode, TrustVerdict};
use tracing::warn;

use crate::error::AttestError;

/// Client-supplied attestation material for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct AttestationInput<'a> {
    /// Raw platform tag, kept verbatim in verdicts and audit rows.
    pub platform: &'a str,
    pub token: &'a str,
    pub device_id: &'a str,
    pub key_id: Option<&'a str>,
}

/// A platform-specific attestation verifier.
#[async_trait]
pub trait Attester: Send + Sync {
    fn platform(&self) -> Platform;

    /// Produce a verdict, or an error when verification itself failed.
    async fn attest(&self, input: &AttestationInput<'_>, now_millis: u64) -> Result<TrustVerdict, AttestError>;
}

/// Verdict for a platform whose verifier is not configured.
pub(crate) fn bypass_or_reject(
    input: &AttestationInput<'_>,
    allow_bypass: bool,
    reason: ReasonCode,
    at: u64,
) -> TrustVerdict {
    if allow_bypass {
        warn!(platform = input.platform, device_id = input.device_id, "attestation bypassed");
        TrustVerdict::valid(input.platform, input.device_id, IntegrityTier::Bypass, at)
    } else {
        TrustVerdict::invalid(input.platform, input.device_id, IntegrityTier::Unknown, reason, at)
    }
}
