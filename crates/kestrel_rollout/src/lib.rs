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

//! Kestrel rollout gate.
//!
//! A client is inside a rollout when a stable hash of
//! `client ‖ version ‖ region` falls below the configured percentage.
//! Percentages come from `KESTREL_ROLLOUT_PERCENTAGE[_<VERSION>][_<REGION>]`
//! variables; the most specific one wins.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

pub const ROLLOUT_PREFIX: &str = "KESTREL_ROLLOUT_PERCENTAGE";
pub const FULL_ROLLOUT: u8 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RolloutError {
    #[error("{key}: rollout percentage {value:?} is not an integer")]
    Malformed { key: String, value: String },
}

/// Environment-key form of a version or region: uppercase, every
/// character that is not a Unicode letter or digit replaced by `_`, outer
/// `_` trimmed.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    let mut mapped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_alphanumeric() {
            mapped.extend(c.to_uppercase());
        } else {
            mapped.push('_');
        }
    }
    mapped.trim_matches('_').to_owned()
}

/// Polynomial string hash, wrapping in 64-bit signed arithmetic.
#[must_use]
pub fn rollout_hash(input: &str) -> i64 {
    input
        .chars()
        .fold(0i64, |h, c| h.wrapping_mul(31).wrapping_add(i64::from(u32::from(c))))
}

/// Bucket in `0..100` for a client/version/region triple.
#[must_use]
pub fn bucket(client_id: &str, version: &str, region: &str) -> u8 {
    let h = rollout_hash(&format!("{client_id}{version}{region}"));
    u8::try_from(h.unsigned_abs() % 100).unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutGate {
    overrides: BTreeMap<String, u8>,
}

impl RolloutGate {
    /// Gate with every cohort at 100%.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Collect rollout overrides from `(name, value)` pairs; other names are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, RolloutError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = BTreeMap::new();
        for (key, value) in vars {
            let key = key.as_ref().to_uppercase();
            if key != ROLLOUT_PREFIX && !key.starts_with(&format!("{ROLLOUT_PREFIX}_")) {
                continue;
            }
            let raw = value.as_ref().trim();
            let parsed: i64 = raw
                .parse()
                .map_err(|_| RolloutError::Malformed { key: key.clone(), value: raw.to_owned() })?;
            overrides.insert(key, clamp_percentage(parsed));
        }
        Ok(Self { overrides })
    }

    /// No overrides configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Set one override for a raw version and/or region.
    #[must_use]
    pub fn with_override(mut self, version: Option<&str>, region: Option<&str>, percentage: i64) -> Self {
        let key = scoped_key(version.map(normalize_key).as_deref(), region.map(normalize_key).as_deref());
        self.overrides.insert(key, clamp_percentage(percentage));
        self
    }

    /// Effective percentage: version+region, version, region, global, else 100.
    #[must_use]
    pub fn percentage_for(&self, version: &str, region: &str) -> u8 {
        let v = normalize_key(version);
        let r = normalize_key(region);
        let v = (!v.is_empty()).then_some(v.as_str());
        let r = (!r.is_empty()).then_some(r.as_str());

        let mut candidates = Vec::with_capacity(4);
        if let (Some(v), Some(r)) = (v, r) {
            candidates.push(scoped_key(Some(v), Some(r)));
        }
        if v.is_some() {
            candidates.push(scoped_key(v, None));
        }
        if r.is_some() {
            candidates.push(scoped_key(None, r));
        }
        candidates.push(scoped_key(None, None));

        candidates
            .iter()
            .find_map(|k| self.overrides.get(k).copied())
            .unwrap_or(FULL_ROLLOUT)
    }

    /// Whether `client_id` is in the rollout cohort for `version` in `region`.
    #[must_use]
    pub fn include(&self, client_id: &str, version: &str, region: &str) -> bool {
        let pct = self.percentage_for(version, region);
        let b = bucket(client_id, version, region);
        debug!(client_id, version, region, pct, bucket = b, "rollout check");
        b < pct
    }
}

fn scoped_key(version: Option<&str>, region: Option<&str>) -> String {
    let mut key = ROLLOUT_PREFIX.to_owned();
    for part in [version, region].into_iter().flatten() {
        key.push('_');
        key.push_str(part);
    }
    key
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn clamp_percentage(value: i64) -> u8 {
    if value < 0 {
        0
    } else if value > 100 {
        100
    } else {
        value as u8
    }
}
