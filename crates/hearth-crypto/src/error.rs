//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid nonce length
    #[error("invalid nonce length")]
    InvalidNonceLength,

    /// Ciphertext shorter than the authentication tag
    #[error("ciphertext too short: {0} bytes")]
    CiphertextTooShort(usize),

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,

    /// Signing failed
    #[error("signing failed")]
    SigningFailed,

    /// Invalid public key or curve point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Invalid private key material
    #[error("invalid key material")]
    InvalidKeyMaterial,

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
