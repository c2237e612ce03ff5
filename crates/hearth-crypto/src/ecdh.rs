//! ECDH key agreement over NIST P-256.
//!
//! CASE uses one ephemeral key pair per handshake; public keys travel as
//! 65-byte uncompressed SEC1 points. Decoding validates that the point is on
//! the curve and is not the identity.

use crate::{CryptoError, P256_PUBLIC_KEY_SIZE};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// P-256 private key. The inner scalar is zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey(p256::SecretKey);

/// P-256 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(p256::PublicKey);

/// ECDH shared secret (x-coordinate, 32 bytes).
#[derive(ZeroizeOnDrop, Zeroize)]
pub struct SharedSecret([u8; 32]);

impl PrivateKey {
    /// Generate a new random private key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(p256::SecretKey::random(rng))
    }

    /// Derive the public key from this private key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Perform Diffie-Hellman key exchange.
    #[must_use]
    pub fn exchange(&self, peer_public: &PublicKey) -> SharedSecret {
        let shared = p256::ecdh::diffie_hellman(self.0.to_nonzero_scalar(), peer_public.0.as_affine());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(shared.raw_secret_bytes());
        SharedSecret(bytes)
    }

    /// Import from a big-endian 32-byte scalar.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the scalar is zero or
    /// not below the group order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        p256::SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidKeyMaterial)
    }
}

impl PublicKey {
    /// Export as an uncompressed SEC1 point.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; P256_PUBLIC_KEY_SIZE] {
        let mut out = [0u8; P256_PUBLIC_KEY_SIZE];
        out.copy_from_slice(self.0.to_encoded_point(false).as_bytes());
        out
    }

    /// Import from SEC1 bytes (compressed or uncompressed).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes are not a valid
    /// non-identity curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        p256::PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }
}

impl SharedSecret {
    /// Get shared secret as bytes.
    ///
    /// # Security
    ///
    /// The shared secret must go through HKDF before use as a key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
