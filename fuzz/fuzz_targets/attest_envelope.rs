#![no_main]

use kestrel_attest::AttestationEnvelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(token) = std::str::from_utf8(data) {
        if let Ok(envelope) = AttestationEnvelope::parse(token, "fuzz-key") {
            assert!(!envelope.attestation_object.is_empty());
            assert_eq!(envelope.key_id, "fuzz-key");
        }
    }
});
