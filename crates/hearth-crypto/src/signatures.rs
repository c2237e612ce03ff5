//! ECDSA P-256 (SHA-256) signatures for operational certificates and CASE.
//!
//! Signatures use the raw 64-byte `r || s` form carried in TLV messages, not
//! ASN.1 DER.
//!
//! ## Usage
//!
//! ```ignore
//! use hearth_crypto::signatures::SigningKey;
//! use rand_core::OsRng;
//!
//! let signing_key = SigningKey::generate(&mut OsRng);
//! let signature = signing_key.sign(b"tbs data")?;
//! signing_key.verifying_key().verify(b"tbs data", &signature)?;
//! ```

use crate::{CryptoError, P256_PUBLIC_KEY_SIZE, P256_SIGNATURE_SIZE};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::{CryptoRng, RngCore};

/// ECDSA signature (64 bytes, `r || s`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature([u8; P256_SIGNATURE_SIZE]);

impl Signature {
    /// Create a signature from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; P256_SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the slice is not exactly 64 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != P256_SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignature);
        }
        let mut bytes = [0u8; P256_SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get the raw signature bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; P256_SIGNATURE_SIZE] {
        &self.0
    }
}

/// ECDSA signing key (private key)
///
/// The secret scalar is zeroized on drop by the underlying key type.
#[derive(Clone)]
pub struct SigningKey {
    inner: p256::ecdsa::SigningKey,
}

impl SigningKey {
    /// Generate a new random signing key
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            inner: p256::ecdsa::SigningKey::random(rng),
        }
    }

    /// Create from a big-endian 32-byte scalar
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] for an out-of-range scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        p256::ecdsa::SigningKey::from_slice(bytes)
            .map(|inner| Self { inner })
            .map_err(|_| CryptoError::InvalidKeyMaterial)
    }

    /// Sign a message (SHA-256 digest, RFC 6979 nonce)
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningFailed`] if the signer rejects the input.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        let sig: p256::ecdsa::Signature = self
            .inner
            .try_sign(message)
            .map_err(|_| CryptoError::SigningFailed)?;
        Signature::from_slice(&sig.to_bytes())
    }

    /// Get the corresponding verifying key (public key)
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: *self.inner.verifying_key(),
        }
    }

    /// Export signing key bytes
    ///
    /// # Security
    ///
    /// This exposes the raw secret key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }
}

/// ECDSA verifying key (public key)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: p256::ecdsa::VerifyingKey,
}

impl VerifyingKey {
    /// Import from SEC1 bytes
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the point is invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
            .map(|inner| Self { inner })
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Export as an uncompressed SEC1 point (65 bytes)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; P256_PUBLIC_KEY_SIZE] {
        let mut out = [0u8; P256_PUBLIC_KEY_SIZE];
        out.copy_from_slice(self.inner.to_encoded_point(false).as_bytes());
        out
    }

    /// Verify a signature
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if verification fails.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let sig = p256::ecdsa::Signature::from_slice(signature.as_bytes())
            .map_err(|_| CryptoError::InvalidSignature)?;
        self.inner
            .verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_sign_verify() {
        let key = SigningKey::generate(&mut OsRng);
        let signature = key.sign(b"tbs data").unwrap();
        assert!(key.verifying_key().verify(b"tbs data", &signature).is_ok());
    }

    #[test]
    fn test_verify_wrong_message() {
        let key = SigningKey::generate(&mut OsRng);
        let signature = key.sign(b"tbs data").unwrap();
        assert!(key.verifying_key().verify(b"other data", &signature).is_err());
    }

    #[test]
    fn test_verify_wrong_key() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let signature = key.sign(b"msg").unwrap();
        assert!(other.verifying_key().verify(b"msg", &signature).is_err());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = SigningKey::from_bytes(&[0x33; 32]).unwrap();
        assert_eq!(key.sign(b"m").unwrap(), key.sign(b"m").unwrap());
    }

    #[test]
    fn test_verifying_key_roundtrip() {
        let key = SigningKey::generate(&mut OsRng);
        let bytes = key.verifying_key().to_bytes();
        assert_eq!(bytes.len(), 65);
        let restored = VerifyingKey::from_bytes(&bytes).unwrap();
        assert_eq!(restored, key.verifying_key());
    }

    #[test]
    fn test_signature_from_slice_length() {
        assert!(Signature::from_slice(&[0u8; 63]).is_err());
        assert!(Signature::from_slice(&[0u8; 64]).is_ok());
    }
}
