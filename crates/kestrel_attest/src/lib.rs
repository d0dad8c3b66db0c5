#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! Kestrel trust evaluator.
//!
//! Turns a client's platform attestation into a [`TrustVerdict`]:
//! Play Integrity for Android, App Attest for iOS. Invalid attestations
//! are verdicts; only verifier failures are errors.

pub mod app_attest;
pub mod attester;
pub mod audit;
pub mod challenge;
pub mod error;
pub mod evaluator;
pub mod play_integrity;

pub use app_attest::{
    AppAttestAttester, AppAttestConfig, AppAttestRequest, AppAttestValidator, AttestationEnvelope, EnvelopeError,
};
pub use attester::{AttestationInput, Attester};
pub use audit::{AttestationRecord, AuditSink, MemoryAudit};
pub use challenge::{issue_challenge, CHALLENGE_LEN};
pub use error::{AttestError, AuditError};
pub use evaluator::TrustEvaluator;
pub use kestrel_primitives::{requires_decoy, IntegrityTier, ReasonCode, TrustVerdict};
pub use play_integrity::{
    IntegrityBackend, IntegrityConnector, IntegrityCredentials, IntegrityPayload, PlayIntegrityAttester,
    PlayIntegrityPolicy, DEFAULT_BACKEND_TIMEOUT, DEFAULT_MAX_AGE,
};
