//! # Hearth Crypto
//!
//! Cryptographic primitives for the Hearth secure message layer.
//!
//! This crate provides:
//! - `AES-128-CCM` message encryption with the 13-byte message nonce
//! - SHA-256 based hashing, HMAC, HKDF and PBKDF2
//! - P-256 ECDH and ECDSA for certificate-authenticated sessions
//! - SPAKE2+ (P-256, SHA-256) for passcode-authenticated sessions
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | ECDH P-256 | 128-bit |
//! | PAKE | SPAKE2+ P-256 | 128-bit |
//! | AEAD | AES-128-CCM (16-byte tag) | 128-bit key |
//! | Hash | SHA-256 | 128-bit collision |
//! | KDF | HKDF-SHA256 | 128-bit |
//! | Password KDF | PBKDF2-HMAC-SHA256 | passcode-bound |
//! | Signatures | ECDSA P-256 SHA-256 | 128-bit |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod constant_time;
pub mod ecdh;
pub mod error;
pub mod hash;
pub mod random;
pub mod signatures;
pub mod spake2p;

pub use error::CryptoError;

/// AES-128-CCM key size
pub const AEAD_KEY_SIZE: usize = 16;

/// AES-128-CCM nonce size
pub const AEAD_NONCE_SIZE: usize = 13;

/// AES-128-CCM authentication tag size
pub const AEAD_TAG_SIZE: usize = 16;

/// SHA-256 output size
pub const SHA256_OUTPUT_SIZE: usize = 32;

/// Uncompressed SEC1 P-256 point size
pub const P256_PUBLIC_KEY_SIZE: usize = 65;

/// P-256 private scalar size
pub const P256_SECRET_KEY_SIZE: usize = 32;

/// Raw `r || s` ECDSA P-256 signature size
pub const P256_SIGNATURE_SIZE: usize = 64;

/// HKDF info used to expand session keys
pub const SESSION_KEYS_INFO: &[u8] = b"SessionKeys";

/// Session keys derived from a completed handshake.
///
/// The 48 bytes of `HKDF-SHA256(secret, salt, "SessionKeys")` are split into
/// the initiator-to-responder key, the responder-to-initiator key and the
/// attestation challenge. Each side encrypts with the key for its own
/// direction, so one side's encrypt key is the other's decrypt key.
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for messages this side sends
    pub encrypt_key: [u8; AEAD_KEY_SIZE],
    /// Key for messages this side receives
    pub decrypt_key: [u8; AEAD_KEY_SIZE],
    /// Attestation challenge bound to the session
    pub attestation_challenge: [u8; AEAD_KEY_SIZE],
}

impl SessionKeys {
    /// Derive session keys from a handshake secret.
    ///
    /// PASE passes an empty `salt`; CASE passes the identity protection key
    /// followed by the transcript hash.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivationFailed`] if HKDF expansion fails.
    pub fn derive(secret: &[u8], salt: &[u8], is_initiator: bool) -> Result<Self, CryptoError> {
        let mut okm = [0u8; AEAD_KEY_SIZE * 3];
        hash::hkdf_sha256(secret, salt, SESSION_KEYS_INFO, &mut okm)?;

        let mut i2r = [0u8; AEAD_KEY_SIZE];
        let mut r2i = [0u8; AEAD_KEY_SIZE];
        let mut attestation_challenge = [0u8; AEAD_KEY_SIZE];
        i2r.copy_from_slice(&okm[..16]);
        r2i.copy_from_slice(&okm[16..32]);
        attestation_challenge.copy_from_slice(&okm[32..]);
        zeroize::Zeroize::zeroize(&mut okm);

        let (encrypt_key, decrypt_key) = if is_initiator { (i2r, r2i) } else { (r2i, i2r) };
        Ok(Self {
            encrypt_key,
            decrypt_key,
            attestation_challenge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_keys_cross_wired() {
        let secret = [0x42u8; 16];
        let initiator = SessionKeys::derive(&secret, &[], true).unwrap();
        let responder = SessionKeys::derive(&secret, &[], false).unwrap();

        assert_eq!(initiator.encrypt_key, responder.decrypt_key);
        assert_eq!(initiator.decrypt_key, responder.encrypt_key);
        assert_eq!(
            initiator.attestation_challenge,
            responder.attestation_challenge
        );
        assert_ne!(initiator.encrypt_key, initiator.decrypt_key);
    }

    #[test]
    fn test_session_keys_salt_changes_output() {
        let secret = [0x42u8; 16];
        let unsalted = SessionKeys::derive(&secret, &[], true).unwrap();
        let salted = SessionKeys::derive(&secret, b"salt", true).unwrap();
        assert_ne!(unsalted.encrypt_key, salted.encrypt_key);
    }
}
