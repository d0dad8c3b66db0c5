use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand_core::{OsRng, RngCore};

/// Challenge entropy in bytes.
pub const CHALLENGE_LEN: usize = 32;

/// Fresh opaque challenge for a client to bind into its attestation.
///
/// The value is not stored; binding is enforced by the platform verifier.
#[must_use]
pub fn issue_challenge() -> String {
    let mut bytes = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
