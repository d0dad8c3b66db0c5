use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Load reported for endpoints without a usable capacity figure.
pub const NEUTRAL_LOAD: f64 = 0.5;

/// Client platforms with an attestation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            other => Err(ParseError::Platform(other.to_owned())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device integrity classification, ordered from weakest to strongest.
///
/// `Bypass` marks verdicts issued while attestation bypass was enabled. It
/// ranks below `Basic` so that such clients never count as trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityTier {
    Unknown,
    Bypass,
    Basic,
    Device,
    Strong,
}

impl IntegrityTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Bypass => "bypass",
            Self::Basic => "basic",
            Self::Device => "device",
            Self::Strong => "strong",
        }
    }
}

impl fmt::Display for IntegrityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-reported health of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Active,
    Degraded,
    Offline,
    Maintenance,
}

impl EndpointStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
            Self::Maintenance => "maintenance",
        }
    }
}

impl FromStr for EndpointStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "degraded" => Ok(Self::Degraded),
            "offline" => Ok(Self::Offline),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(ParseError::Status(other.to_owned())),
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Out-of-band channels a client may scan for rendezvous hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryChannel {
    Gps,
    FmRds,
    Dtv,
    Plc,
    GsmCb,
    LteSib,
    IotMqtt,
    Blockchain,
    Satellite,
    Intranet,
    Social,
}

impl DiscoveryChannel {
    pub const ALL: [Self; 11] = [
        Self::Gps,
        Self::FmRds,
        Self::Dtv,
        Self::Plc,
        Self::GsmCb,
        Self::LteSib,
        Self::IotMqtt,
        Self::Blockchain,
        Self::Satellite,
        Self::Intranet,
        Self::Social,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::FmRds => "fm_rds",
            Self::Dtv => "dtv",
            Self::Plc => "plc",
            Self::GsmCb => "gsm_cb",
            Self::LteSib => "lte_sib",
            Self::IotMqtt => "iot_mqtt",
            Self::Blockchain => "blockchain",
            Self::Satellite => "satellite",
            Self::Intranet => "intranet",
            Self::Social => "social",
        }
    }
}

impl FromStr for DiscoveryChannel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseError::Channel(s.to_owned()))
    }
}

impl fmt::Display for DiscoveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gateway as stored by the endpoint directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    /// Key clients use to authenticate the gateway's transport.
    pub public_key: Vec<u8>,
    pub address: String,
    pub port: u16,
    pub transports: Vec<String>,
    pub discovery_channels: Vec<String>,
    pub region: String,
    pub current_users: u32,
    pub max_users: Option<u32>,
    pub status: EndpointStatus,
    pub is_decoy: bool,
    /// Unix seconds of the last operator report.
    pub last_seen: Option<u64>,
}

impl Endpoint {
    /// Fraction of capacity in use, in `[0, 1]`.
    ///
    /// Endpoints without a positive `max_users` report [`NEUTRAL_LOAD`] so
    /// they are neither preferred nor starved by load ordering.
    #[must_use]
    pub fn load(&self) -> f64 {
        match self.max_users {
            Some(max) if max > 0 => (f64::from(self.current_users) / f64::from(max)).min(1.0),
            _ => NEUTRAL_LOAD,
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == EndpointStatus::Active
    }

    /// Public operator handle derived from the endpoint id.
    #[must_use]
    pub fn callsign(&self) -> String {
        if self.id.is_empty() {
            return "OP-unknown".to_owned();
        }
        let prefix: String = self.id.chars().take(8).collect();
        format!("OP-{prefix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(current: u32, max: Option<u32>) -> Endpoint {
        Endpoint {
            id: "gw-0123456789".into(),
            public_key: vec![7; 32],
            address: "192.0.2.1".into(),
            port: 443,
            transports: vec!["masque".into()],
            discovery_channels: vec![],
            region: "us-east-1".into(),
            current_users: current,
            max_users: max,
            status: EndpointStatus::Active,
            is_decoy: false,
            last_seen: None,
        }
    }

    #[test]
    fn load_defaults_without_capacity() {
        assert!((endpoint(5, None).load() - NEUTRAL_LOAD).abs() < f64::EPSILON);
        assert!((endpoint(5_000, Some(0)).load() - NEUTRAL_LOAD).abs() < f64::EPSILON);
        assert!((endpoint(0, Some(0)).load() - NEUTRAL_LOAD).abs() < f64::EPSILON);
    }

    #[test]
    fn load_is_ratio_and_capped() {
        assert!((endpoint(5, Some(10)).load() - 0.5).abs() < f64::EPSILON);
        assert!((endpoint(10, Some(10)).load() - 1.0).abs() < f64::EPSILON);
        assert!((endpoint(30, Some(10)).load() - 1.0).abs() < f64::EPSILON);
        assert!(endpoint(0, Some(10)).load().abs() < f64::EPSILON);
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(IntegrityTier::Unknown < IntegrityTier::Bypass);
        assert!(IntegrityTier::Bypass < IntegrityTier::Basic);
        assert!(IntegrityTier::Basic < IntegrityTier::Device);
        assert!(IntegrityTier::Device < IntegrityTier::Strong);
    }

    #[test]
    fn enumerations_reject_unknown_values() {
        assert_eq!("android".parse::<Platform>(), Ok(Platform::Android));
        assert!("windows".parse::<Platform>().is_err());
        assert!("Android".parse::<Platform>().is_err());
        assert_eq!("maintenance".parse::<EndpointStatus>(), Ok(EndpointStatus::Maintenance));
        assert!("retired".parse::<EndpointStatus>().is_err());
        assert_eq!("lte_sib".parse::<DiscoveryChannel>(), Ok(DiscoveryChannel::LteSib));
        assert!("lte".parse::<DiscoveryChannel>().is_err());
    }

    #[test]
    fn callsign_uses_id_prefix() {
        assert_eq!(endpoint(0, None).callsign(), "OP-gw-01234");
        let mut short = endpoint(0, None);
        short.id = "abc".into();
        assert_eq!(short.callsign(), "OP-abc");
        short.id.clear();
        assert_eq!(short.callsign(), "OP-unknown");
    }
}
