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

//! Kestrel primitives: the data model shared by the attestation, geo,
//! rollout and pack crates.
//!
//! - Platforms, integrity tiers and trust verdicts
//! - Endpoints (real and decoy gateways) with derived load
//! - Enumerated endpoint statuses and discovery channels
//! - Injectable clock and observability sink

pub mod clock;
pub mod events;
pub mod types;
pub mod verdict;

use thiserror::Error;

pub use clock::{Clock, FixedClock, SystemClock};
pub use events::{Event, EventSink, MemorySink, NoopSink, Outcome};
pub use types::{DiscoveryChannel, Endpoint, EndpointStatus, IntegrityTier, Platform, NEUTRAL_LOAD};
pub use verdict::{requires_decoy, ReasonCode, TrustVerdict};

/// Rejection of an enumerated value received from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unsupported platform: {0}")]
    Platform(String),

    #[error("invalid endpoint status: {0}")]
    Status(String),

    #[error("invalid discovery channel: {0}")]
    Channel(String),
}
