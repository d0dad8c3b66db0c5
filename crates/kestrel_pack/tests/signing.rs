use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use kestrel_geo::{DecoyPolicy, DirectoryError, EndpointDirectory, GeoBalancer, StatusReport};
use kestrel_pack::{
    discovery_descriptor, transport_catalog, ConfigPack, EndpointInfo, PackBuilder, PackError, SigningKeys,
    PACK_FORMAT_VERSION,
};
use kestrel_primitives::Endpoint;
use proptest::prelude::*;

fn keys() -> SigningKeys {
    SigningKeys::from_signing_key(SigningKey::from_bytes(&[77u8; 32]))
}

fn arb_endpoint() -> impl Strategy<Value = EndpointInfo> {
    (
        "[a-z0-9-]{1,16}",
        "[0-9.]{7,15}",
        any::<u16>(),
        prop::collection::vec("[a-z]{3,8}", 0..4),
        "[a-z]{2}-[a-z]{4,7}-[1-3]",
        0.0f64..=1.0,
        any::<bool>(),
        prop::collection::vec(any::<u8>(), 32),
    )
        .prop_map(|(id, address, port, transports, region, load, is_decoy, public_key)| EndpointInfo {
            id,
            address,
            port,
            transports,
            region,
            load,
            is_decoy,
            public_key,
        })
}

fn arb_pack() -> impl Strategy<Value = ConfigPack> {
    (
        any::<u64>(),
        prop::collection::vec(arb_endpoint(), 0..6),
        prop::collection::btree_map("[a-z_]{1,12}", ".{0,24}", 0..5),
    )
        .prop_map(|(timestamp, endpoints, metadata)| {
            let mut pack = ConfigPack {
                version: PACK_FORMAT_VERSION.into(),
                timestamp,
                endpoints,
                transports: transport_catalog(),
                discovery: discovery_descriptor(),
                metadata,
                signature: Vec::new(),
                public_key: Vec::new(),
            };
            pack.sign(&keys()).unwrap();
            pack
        })
}

proptest! {
    #[test]
    fn built_packs_verify_and_survive_the_wire(pack in arb_pack()) {
        prop_assert!(pack.verify());
        let wire = serde_json::to_vec(&pack).unwrap();
        let back: ConfigPack = serde_json::from_slice(&wire).unwrap();
        prop_assert!(back.verify());
    }

    #[test]
    fn any_metadata_change_breaks_the_signature(pack in arb_pack(), key in "[A-Z]{1,6}", value in ".{0,8}") {
        let mut tampered = pack;
        tampered.metadata.insert(key, value);
        prop_assert!(!tampered.verify());
    }

    #[test]
    fn single_signature_bit_flip_is_detected(pack in arb_pack(), byte in 0usize..64, bit in 0u8..8) {
        let mut tampered = pack;
        tampered.signature[byte] ^= 1 << bit;
        prop_assert!(!tampered.verify());
    }

    #[test]
    fn arbitrary_signature_and_key_bytes_never_panic(
        pack in arb_pack(),
        sig in prop::collection::vec(any::<u8>(), 0..80),
        key in prop::collection::vec(any::<u8>(), 0..40),
    ) {
        let mut junk = pack;
        junk.signature = sig;
        junk.public_key = key;
        let _ = junk.verify();
        let _ = junk.verify_pinned(keys().verifying_key());
    }
}

#[test]
fn metadata_insertion_order_does_not_matter() {
    let forward: BTreeMap<String, String> =
        [("a", "1"), ("b", "2")].into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
    let backward: BTreeMap<String, String> =
        [("b", "2"), ("a", "1")].into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
    let mut one = ConfigPack {
        version: PACK_FORMAT_VERSION.into(),
        timestamp: 1,
        endpoints: vec![],
        transports: transport_catalog(),
        discovery: discovery_descriptor(),
        metadata: forward,
        signature: vec![],
        public_key: vec![],
    };
    let mut two = ConfigPack { metadata: backward, ..one.clone() };
    one.sign(&keys()).unwrap();
    two.sign(&keys()).unwrap();
    assert_eq!(one.canonical_bytes().unwrap(), two.canonical_bytes().unwrap());
    assert_eq!(one.signature, two.signature);
}

struct Offline;

#[async_trait]
impl EndpointDirectory for Offline {
    async fn endpoints_by_region(&self, _: &str) -> Result<Vec<Endpoint>, DirectoryError> {
        Err(DirectoryError::Unavailable("timeout".into()))
    }
    async fn decoys_by_region(&self, _: &str) -> Result<Vec<Endpoint>, DirectoryError> {
        Err(DirectoryError::Unavailable("timeout".into()))
    }
    async fn all_active(&self) -> Result<Vec<Endpoint>, DirectoryError> {
        Err(DirectoryError::Unavailable("timeout".into()))
    }
    async fn record_status(&self, _: &StatusReport) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unavailable("timeout".into()))
    }
    async fn record_load(&self, _: &str, _: f64) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unavailable("timeout".into()))
    }
}

#[tokio::test]
async fn directory_outage_is_an_error_not_an_empty_pack() {
    let builder = PackBuilder::new(GeoBalancer::new(Arc::new(Offline), DecoyPolicy::Replace), Arc::new(keys()));
    let err = builder.build("c", "us-east-1", &[], None).await.unwrap_err();
    assert!(matches!(err, PackError::Directory(DirectoryError::Unavailable(_))));
}
