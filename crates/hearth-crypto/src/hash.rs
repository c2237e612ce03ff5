//! SHA-256 hashing and key derivation.
//!
//! Provides:
//! - SHA-256 hashing, one-shot and incremental (handshake transcripts)
//! - HMAC-SHA256 with constant-time verification
//! - HKDF-SHA256 (RFC 5869)
//! - PBKDF2-HMAC-SHA256 for passcode stretching

use crate::CryptoError;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

/// SHA-256 hash output (32 bytes).
pub type HashOutput = [u8; 32];

type HmacSha256 = Hmac<Sha256>;

/// Compute SHA-256 hash of input data.
#[must_use]
pub fn sha256(data: &[u8]) -> HashOutput {
    Sha256::digest(data).into()
}

/// Incremental SHA-256 over a handshake transcript.
///
/// Messages are absorbed as raw bytes in the order they were exchanged;
/// `finalize` can be called at any point without consuming the hasher, so
/// the same transcript yields successive hashes as it grows.
#[derive(Clone, Default)]
pub struct TranscriptHasher {
    hasher: Sha256,
    total_len: usize,
}

impl TranscriptHasher {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.total_len += data.len();
    }

    /// Append several messages in order.
    pub fn update_batch(&mut self, chunks: &[&[u8]]) {
        for chunk in chunks {
            self.update(chunk);
        }
    }

    /// Get total bytes absorbed so far.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Hash of everything absorbed so far.
    #[must_use]
    pub fn finalize(&self) -> HashOutput {
        self.hasher.clone().finalize().into()
    }
}

/// Compute HMAC-SHA256.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if the MAC rejects the key.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<HashOutput, CryptoError> {
    let mut mac = new_mac(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Compute HMAC-SHA256 over the concatenation of `parts`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if the MAC rejects the key.
pub fn hmac_sha256_parts(key: &[u8], parts: &[&[u8]]) -> Result<HashOutput, CryptoError> {
    let mut mac = new_mac(key)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Verify an HMAC-SHA256 tag in constant time.
#[must_use]
pub fn hmac_sha256_verify(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    match new_mac(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.verify_slice(tag).is_ok()
        }
        Err(_) => false,
    }
}

fn new_mac(key: &[u8]) -> Result<HmacSha256, CryptoError> {
    <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 64,
        actual: key.len(),
    })
}

/// HKDF-SHA256 extract and expand into `output`.
///
/// An empty `salt` is treated as absent (a block of zeros), per RFC 5869.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivationFailed`] if `output` exceeds
/// 255 * 32 bytes.
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    hkdf::Hkdf::<Sha256>::new(salt, ikm)
        .expand(info, output)
        .map_err(|_| CryptoError::KeyDerivationFailed)
}

/// PBKDF2-HMAC-SHA256 into `output`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidParameter`] for zero iterations and
/// [`CryptoError::KeyDerivationFailed`] if the PRF rejects the password.
pub fn pbkdf2_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output: &mut [u8],
) -> Result<(), CryptoError> {
    if iterations == 0 {
        return Err(CryptoError::InvalidParameter(
            "PBKDF2 iterations must be non-zero".into(),
        ));
    }
    pbkdf2::pbkdf2::<HmacSha256>(password, salt, iterations, output)
        .map_err(|_| CryptoError::KeyDerivationFailed)
}
