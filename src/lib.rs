#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Kestrel rendezvous core.
//!
//! Issues signed config packs to censorship-circumvention clients. A request
//! flows through the trust evaluator (platform attestation), the geo
//! balancer (region fallback, load ranking, decoy injection) and the pack
//! builder (transport catalog, rollout cohort, Ed25519 signature).
//!
//! Untrusted or unattested clients are served decoy gateways; only a valid
//! verdict at strong integrity discloses real relays.

pub mod discovery;
pub mod errors;
pub mod service;
pub mod settings;

pub use discovery::{DiscoveryLog, DiscoveryLogError, DiscoveryRecord, MemoryDiscoveryLog};
pub use errors::{ServiceError, StartupError};
pub use service::{
    AttestationOutcome, AttestationRequest, Collaborators, ConfigRequest, DiscoveryReport, EndpointSummary,
    GatewayStatusReport, Rendezvous,
};
pub use settings::{ConfigError, Settings};

pub use kestrel_attest as attest;
pub use kestrel_geo as geo;
pub use kestrel_pack as pack;
pub use kestrel_primitives as primitives;
pub use kestrel_rollout as rollout;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
