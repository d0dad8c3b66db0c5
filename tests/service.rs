//! Facade operations over in-memory collaborators.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::SigningKey;
use kestrel_geo::MemoryDirectory;
use kestrel_primitives::{
    DiscoveryChannel, Endpoint, EndpointStatus, Event, FixedClock, IntegrityTier, MemorySink, ReasonCode,
};
use kestrel_rendezvous::{
    AttestationRequest, Collaborators, ConfigRequest, DiscoveryReport, GatewayStatusReport, MemoryDiscoveryLog,
    Rendezvous, ServiceError, Settings,
};

const NOW: u64 = 1_760_000_000;

fn gw(id: &str, region: &str, users: u32, decoy: bool) -> Endpoint {
    Endpoint {
        id: id.into(),
        public_key: vec![9; 32],
        address: format!("198.51.100.{}", id.len()),
        port: 443,
        transports: vec!["quic".into()],
        discovery_channels: vec!["gps".into()],
        region: region.into(),
        current_users: users,
        max_users: Some(100),
        status: EndpointStatus::Active,
        is_decoy: decoy,
        last_seen: None,
    }
}

struct Harness {
    core: Rendezvous,
    directory: Arc<MemoryDirectory>,
    log: Arc<MemoryDiscoveryLog>,
    events: Arc<MemorySink>,
}

fn harness(extra: &[(&str, &str)]) -> Harness {
    let clock = Arc::new(FixedClock::at_unix(NOW));
    let directory = Arc::new(MemoryDirectory::with_clock(clock.clone()));
    directory.upsert(gw("relay-east-a", "us-east-1", 80, false));
    directory.upsert(gw("relay-east-b", "us-east-1", 10, false));
    directory.upsert(gw("decoy-east", "us-east-1", 0, true));
    directory.upsert(gw("relay-eu", "eu-west-1", 5, false));

    let log = Arc::new(MemoryDiscoveryLog::new());
    let events = Arc::new(MemorySink::new());
    let mut collaborators = Collaborators::new(directory.clone());
    collaborators.discovery_log = log.clone();
    collaborators.events = events.clone();
    collaborators.clock = clock;

    let private = STANDARD.encode([21u8; 32]);
    let mut vars = vec![("KESTREL_CONFIG_SIGNING_PRIVATE_KEY", private.as_str())];
    vars.extend_from_slice(extra);
    let settings = Settings::from_vars(vars).unwrap();
    Harness { core: Rendezvous::new(&settings, collaborators).unwrap(), directory, log, events }
}

fn request(platform: &str) -> ConfigRequest {
    ConfigRequest { device_id: "device-1".into(), platform: platform.into(), ..ConfigRequest::default() }
}

#[tokio::test]
async fn unattested_client_gets_signed_decoys() {
    let h = harness(&[]);
    let pack = h.core.request_config(&request("android")).await.unwrap();

    assert!(pack.verify_pinned(h.core.public_key()));
    assert_eq!(pack.public_key, SigningKey::from_bytes(&[21u8; 32]).verifying_key().as_bytes());
    assert_eq!(pack.endpoints.len(), 1);
    assert!(pack.endpoints.iter().all(|e| e.is_decoy));
    assert_eq!(pack.timestamp, NOW);
    assert_eq!(pack.metadata["region"], "us-east-1");
    assert!(!pack.metadata.contains_key("rollout"));
    assert_eq!(h.events.count(|e| matches!(e, Event::PackGenerated { decoy: true, .. })), 1);
}

#[tokio::test]
async fn unconfigured_backend_rejects_without_bypass() {
    let h = harness(&[]);
    let req = ConfigRequest { attestation: Some("token".into()), ..request("android") };
    let pack = h.core.request_config(&req).await.unwrap();
    assert!(pack.endpoints.iter().all(|e| e.is_decoy));

    let outcome = h
        .core
        .verify_attestation(&AttestationRequest {
            platform: "android".into(),
            token: "token".into(),
            device_id: "device-1".into(),
            key_id: None,
        })
        .await
        .unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.integrity, IntegrityTier::Unknown);
    assert_eq!(outcome.reason, Some(ReasonCode::MissingAttestationConfig));
}

#[tokio::test]
async fn bypass_is_valid_but_still_decoyed() {
    let h = harness(&[("KESTREL_ALLOW_ATTESTATION_BYPASS", "true")]);
    let req = ConfigRequest { attestation: Some("token".into()), ..request("android") };
    let pack = h.core.request_config(&req).await.unwrap();
    assert!(pack.endpoints.iter().all(|e| e.is_decoy));

    let outcome = h
        .core
        .verify_attestation(&AttestationRequest {
            platform: "android".into(),
            token: "token".into(),
            device_id: "device-1".into(),
            key_id: None,
        })
        .await
        .unwrap();
    assert!(outcome.verified);
    assert_eq!(outcome.integrity, IntegrityTier::Bypass);
}

#[tokio::test]
async fn request_validation() {
    let h = harness(&[]);
    let err = h.core.request_config(&ConfigRequest { device_id: "  ".into(), ..request("ios") }).await.unwrap_err();
    assert_eq!(err.client_code(), "missing_device_id");

    let err = h.core.request_config(&request("Android")).await.unwrap_err();
    assert_eq!(err.client_code(), "unsupported_platform");

    let outcome = h
        .core
        .verify_attestation(&AttestationRequest {
            platform: "windows".into(),
            token: "t".into(),
            device_id: "pc".into(),
            key_id: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.reason, Some(ReasonCode::UnsupportedPlatform));
}

#[tokio::test]
async fn country_hint_selects_region() {
    let h = harness(&[]);
    let req = ConfigRequest { country: Some("de".into()), ..request("ios") };
    let pack = h.core.request_config(&req).await.unwrap();
    assert_eq!(pack.metadata["region"], "eu-west-1");

    let req = ConfigRequest { region: Some("ap-southeast-1".into()), ..request("ios") };
    let pack = h.core.request_config(&req).await.unwrap();
    assert_eq!(pack.metadata["region"], "eu-west-1");

    let req = ConfigRequest { region: Some("eu-west-1".into()), country: Some("CN".into()), ..request("ios") };
    let pack = h.core.request_config(&req).await.unwrap();
    assert_eq!(pack.metadata["region"], "eu-west-1");

    let pack = h.core.request_config(&request("ios")).await.unwrap();
    assert_eq!(pack.metadata["region"], "us-east-1");
}

#[tokio::test]
async fn rollout_cohort_is_stamped_when_configured() {
    let h = harness(&[("KESTREL_ROLLOUT_PERCENTAGE", "0")]);
    let pack = h.core.request_config(&request("ios")).await.unwrap();
    assert_eq!(pack.metadata["rollout"], "holdback");

    let h = harness(&[("KESTREL_ROLLOUT_PERCENTAGE_1_0", "100")]);
    let pack = h.core.request_config(&request("ios")).await.unwrap();
    assert_eq!(pack.metadata["rollout"], "current");
}

#[tokio::test]
async fn status_reports_update_directory() {
    let h = harness(&[]);
    let report = GatewayStatusReport {
        gateway_id: "relay-eu".into(),
        status: "degraded".into(),
        users_connected: 42,
        bandwidth_used_mbps: 900,
        packets_forwarded: 1_000_000,
        uptime_percent: 99.5,
    };
    h.core.report_status(&report).await.unwrap();

    let stored = h.directory.get("relay-eu").unwrap();
    assert_eq!(stored.status, EndpointStatus::Degraded);
    assert_eq!(stored.current_users, 42);
    assert_eq!(stored.last_seen, Some(NOW));
    assert_eq!(h.directory.metrics().len(), 1);
    assert_eq!(
        h.events.count(|e| matches!(e, Event::StatusUpdated { status: EndpointStatus::Degraded, .. })),
        1
    );

    let bad = |f: fn(&mut GatewayStatusReport)| {
        let mut r = report.clone();
        f(&mut r);
        r
    };
    let cases: &[(fn(&mut GatewayStatusReport), &str)] = &[
        (|r| r.gateway_id.clear(), "missing_gateway_id"),
        (|r| r.status = "ACTIVE".into(), "invalid_status"),
        (|r| r.uptime_percent = 100.5, "invalid_uptime"),
        (|r| r.uptime_percent = f64::NAN, "invalid_uptime"),
        (|r| r.gateway_id = "ghost".into(), "gateway_not_found"),
    ];
    for (mutate, code) in cases {
        let err = h.core.report_status(&bad(*mutate)).await.unwrap_err();
        assert_eq!(err.client_code(), *code);
    }
    assert_eq!(h.directory.metrics().len(), 1);
}

#[tokio::test]
async fn discovery_reports_are_logged() {
    let h = harness(&[]);
    h.core
        .record_discovery(&DiscoveryReport {
            channel_type: "fm_rds".into(),
            gateway_id: Some("relay-eu".into()),
            success: true,
            latency_ms: Some(850),
            error: Some(String::new()),
            country: Some("GB".into()),
        })
        .await
        .unwrap();

    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].channel, DiscoveryChannel::FmRds);
    assert_eq!(records[0].region.as_deref(), Some("eu-west-1"));
    assert_eq!(records[0].error, None);
    assert_eq!(records[0].at, NOW);

    let err = h
        .core
        .record_discovery(&DiscoveryReport { channel_type: "carrier_pigeon".into(), ..DiscoveryReport::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation("invalid_channel_type")));
    assert_eq!(h.log.records().len(), 1);
}

#[tokio::test]
async fn listing_and_load_reports() {
    let h = harness(&[]);
    let listing = h.core.list_endpoints().await.unwrap();
    assert_eq!(listing.len(), 3);
    assert!(listing.iter().all(|e| e.id.starts_with("relay")));
    assert_eq!(listing[0].callsign, "OP-relay-ea");

    h.core.record_load("relay-east-a", 1.7).await.unwrap();
    assert_eq!(h.directory.get("relay-east-a").unwrap().current_users, 100);
    h.core.record_load("relay-east-a", -3.0).await.unwrap();
    assert_eq!(h.directory.get("relay-east-a").unwrap().current_users, 0);

    let err = h.core.record_load("ghost", 0.5).await.unwrap_err();
    assert_eq!(err.client_code(), "gateway_not_found");
}

#[test]
fn challenges_are_unique() {
    let h = harness(&[]);
    let a = h.core.issue_challenge();
    assert_ne!(a, h.core.issue_challenge());
    assert_eq!(a.len(), 43);
}
