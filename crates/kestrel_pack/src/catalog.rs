use std::collections::BTreeMap;

use kestrel_primitives::DiscoveryChannel;

use crate::pack::{DiscoveryConfig, TransportConfig};

pub const DEFAULT_SCAN_INTERVAL_SECS: u32 = 300;

/// Channels a client scans for out-of-band endpoint announcements.
pub const DISCOVERY_CHANNELS: [DiscoveryChannel; 7] = [
    DiscoveryChannel::Gps,
    DiscoveryChannel::FmRds,
    DiscoveryChannel::Dtv,
    DiscoveryChannel::Plc,
    DiscoveryChannel::GsmCb,
    DiscoveryChannel::LteSib,
    DiscoveryChannel::Blockchain,
];

fn transport(kind: &str, endpoints: &[&str], fingerprint: &str, options: &[(&str, &str)]) -> TransportConfig {
    TransportConfig {
        kind: kind.to_owned(),
        endpoints: endpoints.iter().map(|&e| e.to_owned()).collect(),
        fingerprint: fingerprint.to_owned(),
        options: options.iter().map(|&(k, v)| (k.to_owned(), v.to_owned())).collect::<BTreeMap<_, _>>(),
    }
}

/// Transport disguise profiles shipped in every pack.
#[must_use]
pub fn transport_catalog() -> Vec<TransportConfig> {
    vec![
        transport("masque", &["icloud.com", "www.icloud.com"], "apple_icloud", &[("quic_version", "1")]),
        transport("xtls", &["microsoft.com", "www.microsoft.com"], "microsoft_edge", &[("reality", "true")]),
        transport(
            "parasite",
            &["cdn.cloudflare.com", "cdnjs.cloudflare.com"],
            "",
            &[("header_encoding", "base64url")],
        ),
        transport("ssh", &[], "", &[("obfuscated", "true")]),
    ]
}

#[must_use]
pub fn discovery_descriptor() -> DiscoveryConfig {
    DiscoveryConfig {
        channels: DISCOVERY_CHANNELS.iter().map(|c| c.as_str().to_owned()).collect(),
        scan_interval: DEFAULT_SCAN_INTERVAL_SECS,
        battery_aware: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contents() {
        let catalog = transport_catalog();
        let kinds: Vec<_> = catalog.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, ["masque", "xtls", "parasite", "ssh"]);
        assert_eq!(catalog[0].options["quic_version"], "1");
        assert_eq!(catalog[1].fingerprint, "microsoft_edge");
        assert!(catalog[3].endpoints.is_empty());
    }

    #[test]
    fn descriptor_channels_parse_back() {
        let d = discovery_descriptor();
        assert_eq!(d.scan_interval, 300);
        assert!(d.battery_aware);
        for name in &d.channels {
            assert!(name.parse::<DiscoveryChannel>().is_ok(), "{name}");
        }
        assert_eq!(d.channels[..2], ["gps".to_owned(), "fm_rds".to_owned()]);
    }
}
