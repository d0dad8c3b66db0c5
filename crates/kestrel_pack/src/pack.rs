//! The signed config pack and its canonical form.
//!
//! The signed message is the `serde_json` encoding of every field except
//! `signature`, in declaration order. Maps are `BTreeMap` and byte fields
//! are standard base64, so one logical pack always has one encoding.

use std::collections::BTreeMap;

use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH};
use kestrel_primitives::Endpoint;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::keys::SigningKeys;

pub const PACK_FORMAT_VERSION: &str = "1.0";

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, T: AsRef<[u8]>>(bytes: &T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// What a client learns about one gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub transports: Vec<String>,
    pub region: String,
    pub load: f64,
    pub is_decoy: bool,
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,
}

impl From<&Endpoint> for EndpointInfo {
    fn from(e: &Endpoint) -> Self {
        Self {
            id: e.id.clone(),
            address: e.address.clone(),
            port: e.port,
            transports: e.transports.clone(),
            region: e.region.clone(),
            load: e.load(),
            is_decoy: e.is_decoy,
            public_key: e.public_key.clone(),
        }
    }
}

/// A traffic disguise profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(rename = "type")]
    pub kind: String,
    /// Cover domains the transport blends into.
    pub endpoints: Vec<String>,
    /// TLS fingerprint to mimic; empty when not applicable.
    pub fingerprint: String,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub channels: Vec<String>,
    /// Seconds between scans.
    pub scan_interval: u32,
    pub battery_aware: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPack {
    pub version: String,
    /// Unix seconds at build time.
    pub timestamp: u64,
    pub endpoints: Vec<EndpointInfo>,
    pub transports: Vec<TransportConfig>,
    pub discovery: DiscoveryConfig,
    pub metadata: BTreeMap<String, String>,
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,
}

/// Borrowed view of a pack without its signature.
#[derive(Serialize)]
struct Unsigned<'a> {
    version: &'a str,
    timestamp: u64,
    endpoints: &'a [EndpointInfo],
    transports: &'a [TransportConfig],
    discovery: &'a DiscoveryConfig,
    metadata: &'a BTreeMap<String, String>,
    #[serde(with = "b64")]
    public_key: &'a [u8],
}

impl ConfigPack {
    /// Bytes covered by the signature.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&Unsigned {
            version: &self.version,
            timestamp: self.timestamp,
            endpoints: &self.endpoints,
            transports: &self.transports,
            discovery: &self.discovery,
            metadata: &self.metadata,
            public_key: &self.public_key,
        })
    }

    /// Embed the signer's public key, then sign.
    pub fn sign(&mut self, keys: &SigningKeys) -> Result<(), serde_json::Error> {
        self.public_key = keys.verifying_key().to_bytes().to_vec();
        let message = self.canonical_bytes()?;
        self.signature = keys.sign(&message).to_bytes().to_vec();
        Ok(())
    }

    /// Check the signature against the embedded public key.
    #[must_use]
    pub fn verify(&self) -> bool {
        let Ok(raw) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(self.public_key.as_slice()) else {
            return false;
        };
        match VerifyingKey::from_bytes(&raw) {
            Ok(key) => self.verify_with(&key),
            Err(_) => false,
        }
    }

    /// As [`verify`](Self::verify), and the embedded key must be `pinned`.
    #[must_use]
    pub fn verify_pinned(&self, pinned: &VerifyingKey) -> bool {
        if self.public_key.len() != PUBLIC_KEY_LENGTH {
            return false;
        }
        let same_key: bool = self.public_key.as_slice().ct_eq(&pinned.as_bytes()[..]).into();
        same_key && self.verify_with(pinned)
    }

    fn verify_with(&self, key: &VerifyingKey) -> bool {
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        match self.canonical_bytes() {
            Ok(message) => key.verify_strict(&message, &signature).is_ok(),
            Err(_) => false,
        }
    }
}
