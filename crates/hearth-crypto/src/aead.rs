//! `AES-128-CCM` AEAD encryption.
//!
//! Provides authenticated encryption with associated data (AEAD) using
//! `AES-128-CCM` as used for secure session messages and the CASE
//! encrypted handshake blobs:
//! - 128-bit keys
//! - 104-bit (13 byte) nonces
//! - 128-bit authentication tags
//! - Associated data authentication
//!
//! ## Message Nonce
//!
//! Session messages never carry an explicit nonce. It is rebuilt on both
//! sides from the packet header:
//!
//! ```text
//! +----------------+------------------+-------------------------+
//! | security flags | message counter  | source node id          |
//! | 1 byte         | 4 bytes (LE)     | 8 bytes (LE, 0 if none) |
//! +----------------+------------------+-------------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use hearth_crypto::aead::{AeadKey, Nonce};
//!
//! let key = AeadKey::new([0x11; 16]);
//! let nonce = Nonce::for_message(0, 42, Some(0x1122));
//!
//! let ciphertext = key.encrypt(&nonce, b"secret", b"header")?;
//! let plaintext = key.decrypt(&nonce, &ciphertext, b"header")?;
//! ```

use crate::CryptoError;
use aes::Aes128;
use ccm::{
    Ccm,
    aead::{Aead, AeadInPlace, KeyInit, Payload, generic_array::GenericArray},
    consts::{U13, U16},
};
use zeroize::ZeroizeOnDrop;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = crate::AEAD_TAG_SIZE;

/// AES-CCM nonce size (13 bytes).
pub const NONCE_SIZE: usize = crate::AEAD_NONCE_SIZE;

/// AEAD key size (16 bytes / 128 bits).
pub const KEY_SIZE: usize = crate::AEAD_KEY_SIZE;

type Aes128Ccm = Ccm<Aes128, U16, U13>;

/// AES-CCM nonce (13 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build the nonce protecting a session message.
    ///
    /// `message_id` is the per-session message counter, so a nonce never
    /// repeats for the lifetime of a session key as long as the counter does
    /// not wrap.
    #[must_use]
    pub fn for_message(security_flags: u8, message_id: u32, source_node_id: Option<u64>) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[0] = security_flags;
        bytes[1..5].copy_from_slice(&message_id.to_le_bytes());
        bytes[5..].copy_from_slice(&source_node_id.unwrap_or(0).to_le_bytes());
        Self(bytes)
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &GenericArray<u8, U13> {
        GenericArray::from_slice(&self.0)
    }
}

/// AEAD encryption key (16 bytes).
///
/// Key is zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with extreme care - this exposes the raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Aes128Ccm {
        Aes128Ccm::new(GenericArray::from_slice(&self.0))
    }

    /// Encrypt plaintext with associated data.
    ///
    /// Returns ciphertext with appended authentication tag (`plaintext.len()` + 16 bytes).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
    pub fn encrypt(
        &self,
        nonce: &Nonce,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher()
            .encrypt(
                nonce.as_generic(),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext with associated data.
    ///
    /// Input must include the authentication tag at the end.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::CiphertextTooShort` if the input cannot hold a
    /// tag, and `CryptoError::DecryptionFailed` on authentication failure.
    pub fn decrypt(
        &self,
        nonce: &Nonce,
        ciphertext_and_tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_and_tag.len() < TAG_SIZE {
            return Err(CryptoError::CiphertextTooShort(ciphertext_and_tag.len()));
        }

        self.cipher()
            .decrypt(
                nonce.as_generic(),
                Payload {
                    msg: ciphertext_and_tag,
                    aad,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypt in-place, appending the authentication tag to `buffer`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
    pub fn encrypt_in_place(
        &self,
        nonce: &Nonce,
        buffer: &mut Vec<u8>,
        aad: &[u8],
    ) -> Result<(), CryptoError> {
        let tag = self
            .cipher()
            .encrypt_in_place_detached(nonce.as_generic(), aad, buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        buffer.extend_from_slice(&tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nonce_for_message_layout() {
        let nonce = Nonce::for_message(0x01, 0x1234_5678, Some(0x0102_0304_0506_0708));
        assert_eq!(
            nonce.as_bytes(),
            &[
                0x01, 0x78, 0x56, 0x34, 0x12, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01
            ]
        );
    }

    #[test]
    fn test_nonce_without_source_node() {
        let nonce = Nonce::for_message(0, 1, None);
        assert_eq!(&nonce.as_bytes()[5..], &[0u8; 8]);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = AeadKey::new([0x42; KEY_SIZE]);
        let nonce = Nonce::for_message(0, 7, None);
        let ciphertext = key.encrypt(&nonce, b"hello hearth", b"header").unwrap();
        assert_eq!(ciphertext.len(), 12 + TAG_SIZE);

        let plaintext = key.decrypt(&nonce, &ciphertext, b"header").unwrap();
        assert_eq!(plaintext, b"hello hearth");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = AeadKey::new([0x42; KEY_SIZE]);
        let nonce = Nonce::for_message(0, 7, None);
        let mut ciphertext = key.encrypt(&nonce, b"payload", b"").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(matches!(
            key.decrypt(&nonce, &ciphertext, b""),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_aad_rejected() {
        let key = AeadKey::new([0x42; KEY_SIZE]);
        let nonce = Nonce::for_message(0, 7, None);
        let ciphertext = key.encrypt(&nonce, b"payload", b"aad-1").unwrap();
        assert!(key.decrypt(&nonce, &ciphertext, b"aad-2").is_err());
    }

    #[test]
    fn test_short_ciphertext() {
        let key = AeadKey::new([0x42; KEY_SIZE]);
        let nonce = Nonce::from_bytes([0; NONCE_SIZE]);
        assert!(matches!(
            key.decrypt(&nonce, &[0u8; 5], b""),
            Err(CryptoError::CiphertextTooShort(5))
        ));
    }

    #[test]
    fn test_in_place_matches_allocating() {
        let key = AeadKey::new([0x24; KEY_SIZE]);
        let nonce = Nonce::for_message(0, 99, Some(5));
        let expected = key.encrypt(&nonce, b"in place", b"aad").unwrap();

        let mut buffer = b"in place".to_vec();
        key.encrypt_in_place(&nonce, &mut buffer, b"aad").unwrap();
        assert_eq!(buffer, expected);
    }

    proptest! {
        #[test]
        fn prop_seal_open_roundtrip(
            key in any::<[u8; KEY_SIZE]>(),
            nonce in any::<[u8; NONCE_SIZE]>(),
            plaintext in prop::collection::vec(any::<u8>(), 0..256),
            aad in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let key = AeadKey::new(key);
            let nonce = Nonce::from_bytes(nonce);
            let sealed = key.encrypt(&nonce, &plaintext, &aad).unwrap();
            prop_assert_eq!(sealed.len(), plaintext.len() + TAG_SIZE);
            prop_assert_eq!(key.decrypt(&nonce, &sealed, &aad).unwrap(), plaintext);
        }

        #[test]
        fn prop_flipped_tag_bit_rejected(
            key in any::<[u8; KEY_SIZE]>(),
            plaintext in prop::collection::vec(any::<u8>(), 0..64),
            bit in 0usize..TAG_SIZE * 8,
        ) {
            let key = AeadKey::new(key);
            let nonce = Nonce::for_message(0, 1, None);
            let mut sealed = key.encrypt(&nonce, &plaintext, b"").unwrap();
            let at = plaintext.len() + bit / 8;
            sealed[at] ^= 1 << (bit % 8);
            prop_assert!(key.decrypt(&nonce, &sealed, b"").is_err());
        }
    }
}
