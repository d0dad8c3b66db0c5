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

//! Kestrel geo balancer.
//!
//! Resolves the serving region for a client, ranks candidate endpoints by
//! load and swaps in decoy gateways for clients without strong integrity.

pub mod balancer;
pub mod directory;
pub mod regions;

pub use balancer::{rank_by_load, DecoyPolicy, GeoBalancer, DEFAULT_ENDPOINT_LIMIT, OVERLOAD_THRESHOLD};
pub use directory::{
    DirectoryError, EndpointDirectory, MemoryDirectory, MetricSample, StatusReport, MAX_REGION_DECOYS,
    MAX_REGION_ENDPOINTS,
};
pub use regions::{adjacent_regions, region_for_country, DEFAULT_ORDER, DEFAULT_REGION};
