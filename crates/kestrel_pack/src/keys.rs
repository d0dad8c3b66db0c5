//! Config signing key resolution.
//!
//! Key material arrives as standard base64. The private key is either a
//! 32-byte seed or a 64-byte `seed ‖ public` keypair. A configured public
//! key is only a cross-check: it must equal the key derived from the
//! private half.

use core::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use rand_core::OsRng;
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

const KEYPAIR_LENGTH: usize = SECRET_KEY_LENGTH + PUBLIC_KEY_LENGTH;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("config signing private key is required")]
    MissingPrivateKey,

    #[error("config signing {0} key is not valid base64")]
    Encoding(&'static str),

    #[error("config signing private key must be 32 or 64 bytes, got {0}")]
    PrivateKeyLength(usize),

    #[error("config signing public key must be 32 bytes, got {0}")]
    PublicKeyLength(usize),

    #[error("config signing keypair halves are inconsistent")]
    InconsistentKeypair,

    #[error("configured public key does not match the private key")]
    PublicKeyMismatch,
}

/// Key material as configured; values are base64 text.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial {
    pub private_key: Option<String>,
    pub public_key: Option<String>,
    pub allow_ephemeral: bool,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key)
            .field("allow_ephemeral", &self.allow_ephemeral)
            .finish()
    }
}

/// The process-wide pack signing key.
pub struct SigningKeys {
    signing: SigningKey,
    verifying: VerifyingKey,
    ephemeral: bool,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("fingerprint", &self.fingerprint())
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

impl SigningKeys {
    pub fn resolve(material: &KeyMaterial) -> Result<Self, KeyError> {
        let keys = match material.private_key.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(private_b64) => {
                let signing = decode_private(private_b64)?;
                if let Some(public_b64) = material.public_key.as_deref().filter(|s| !s.trim().is_empty()) {
                    let configured = decode_public(public_b64)?;
                    let derived = signing.verifying_key();
                    if !bool::from(configured[..].ct_eq(&derived.as_bytes()[..])) {
                        return Err(KeyError::PublicKeyMismatch);
                    }
                }
                Self::from_signing_key(signing)
            }
            None if material.allow_ephemeral => {
                let keys = Self::generate();
                warn!(fingerprint = %keys.fingerprint(), "using ephemeral config signing key");
                keys
            }
            None => return Err(KeyError::MissingPrivateKey),
        };
        info!(fingerprint = %keys.fingerprint(), ephemeral = keys.ephemeral, "config signing key loaded");
        Ok(keys)
    }

    #[must_use]
    pub fn from_signing_key(signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        Self { signing, verifying, ephemeral: false }
    }

    /// Fresh key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        Self { ephemeral: true, ..Self::from_signing_key(signing) }
    }

    #[must_use]
    pub const fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.verifying)
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}

/// First 8 bytes of the SHA3-256 of the public key, hex encoded.
#[must_use]
pub fn fingerprint(key: &VerifyingKey) -> String {
    let digest = Sha3_256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

fn decode_private(b64: &str) -> Result<SigningKey, KeyError> {
    let bytes = STANDARD.decode(b64.trim()).map_err(|_| KeyError::Encoding("private"))?;
    match bytes.len() {
        SECRET_KEY_LENGTH => {
            let mut seed = [0u8; SECRET_KEY_LENGTH];
            seed.copy_from_slice(&bytes);
            Ok(SigningKey::from_bytes(&seed))
        }
        KEYPAIR_LENGTH => {
            let mut pair = [0u8; KEYPAIR_LENGTH];
            pair.copy_from_slice(&bytes);
            SigningKey::from_keypair_bytes(&pair).map_err(|_| KeyError::InconsistentKeypair)
        }
        n => Err(KeyError::PrivateKeyLength(n)),
    }
}

fn decode_public(b64: &str) -> Result<[u8; PUBLIC_KEY_LENGTH], KeyError> {
    let bytes = STANDARD.decode(b64.trim()).map_err(|_| KeyError::Encoding("public"))?;
    <[u8; PUBLIC_KEY_LENGTH]>::try_from(bytes.as_slice()).map_err(|_| KeyError::PublicKeyLength(bytes.len()))
}
