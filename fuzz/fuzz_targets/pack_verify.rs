#![no_main]

use ed25519_dalek::SigningKey;
use kestrel_pack::ConfigPack;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Verification of an arbitrary wire pack must never panic
    if let Ok(pack) = serde_json::from_slice::<ConfigPack>(data) {
        let _ = pack.verify();
        let pinned = SigningKey::from_bytes(&[9u8; 32]).verifying_key();
        let _ = pack.verify_pinned(&pinned);
    }
});
