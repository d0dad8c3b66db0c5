use std::time::Duration;

use thiserror::Error;

/// Verification failure: the backend or validator could not produce a verdict.
///
/// Policy rejections are not errors; they surface as invalid verdicts.
#[derive(Debug, Error)]
pub enum AttestError {
    #[error("play integrity backend error: {0}")]
    Backend(String),

    #[error("attestation backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("app attest verification failed: {0}")]
    AppAttest(String),
}

impl AttestError {
    /// Stable code for logs and client responses.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "play_integrity_verification_failed",
            Self::Timeout(_) => "attestation_backend_timeout",
            Self::AppAttest(_) => "dcappattest_verification_failed",
        }
    }
}

/// Audit sink write failure.
#[derive(Debug, Error)]
#[error("audit write failed: {0}")]
pub struct AuditError(pub String);
