use kestrel_attest::AttestError;
use kestrel_pack::KeyError;
use thiserror::Error;

use crate::settings::ConfigError;

/// Request failure. Only [`client_code`](Self::client_code) may reach a client.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(&'static str),

    #[error("attestation verification failed: {0}")]
    Verification(#[from] AttestError),

    #[error("{code}: {detail}")]
    Infrastructure { code: &'static str, detail: String },

    #[error("not found: {0}")]
    NotFound(&'static str),
}

impl ServiceError {
    pub(crate) fn infrastructure(code: &'static str, detail: &impl ToString) -> Self {
        Self::Infrastructure { code, detail: detail.to_string() }
    }

    /// Fixed machine-readable code, free of internal detail.
    #[must_use]
    pub const fn client_code(&self) -> &'static str {
        match self {
            Self::Validation(code) | Self::NotFound(code) | Self::Infrastructure { code, .. } => *code,
            Self::Verification(_) => "attestation_verification_failed",
        }
    }
}

/// Failure to bring the service up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Key(#[from] KeyError),
}
