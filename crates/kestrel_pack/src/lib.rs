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

//! Kestrel config packs.
//!
//! - Ed25519 signing key resolution with fingerprinting
//! - Endpoint projection, transport catalog and discovery descriptor
//! - Canonical serialization, signing and strict verification
//! - The pack builder tying region selection, decoys and rollout together

pub mod builder;
pub mod catalog;
pub mod keys;
pub mod pack;

pub use builder::{PackBuilder, PackError, ROLLOUT_CURRENT, ROLLOUT_HOLDBACK};
pub use catalog::{discovery_descriptor, transport_catalog, DEFAULT_SCAN_INTERVAL_SECS, DISCOVERY_CHANNELS};
pub use keys::{fingerprint, KeyError, KeyMaterial, SigningKeys};
pub use pack::{ConfigPack, DiscoveryConfig, EndpointInfo, TransportConfig, PACK_FORMAT_VERSION};
