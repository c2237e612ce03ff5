//! Certificate-authenticated session establishment (SIGMA).
//!
//! ```text
//! Initiator                                    Responder
//!   Sigma1 {random, sessionId,
//!           destinationId, ephPub}  ─────────►  find fabric by destinationId
//!                                   ◄─────────  Sigma2 {random, sessionId, ephPub,
//!                                                       AEAD(S2K, TBEData2)}
//!   Sigma3 {AEAD(S3K, TBEData3)}    ─────────►  verify chain + signature
//!                                   ◄─────────  StatusReport(success)
//! ```
//!
//! Key schedule, with `Z` the ECDH shared secret:
//!
//! ```text
//! S2K  = HKDF(Z, IPK || responderRandom || responderEphPub || H(sigma1), "Sigma2")
//! S3K  = HKDF(Z, IPK || H(sigma1 || sigma2), "Sigma3")
//! salt = IPK || H(sigma1 || sigma2 || sigma3)   -> session keys
//! ```
//!
//! The sigma blobs are sealed with fixed nonces and no associated data.

mod client;
pub mod fabric;
pub mod messages;
mod server;

pub use client::CaseClient;
pub use fabric::{
    CertificateAuthority, Fabric, FabricLookup, FabricTable, OperationalCertificate,
    OperationalFabric, PeerIdentity,
};
pub use server::CaseServer;

use hearth_crypto::CryptoError;
use hearth_crypto::aead::{AeadKey, Nonce};
use hearth_crypto::hash::{TranscriptHasher, hkdf_sha256};
use zeroize::Zeroizing;

/// Nonce sealing TBEData2
pub const SIGMA2_NONCE: &[u8; 13] = b"NCASE_Sigma2N";

/// Nonce sealing TBEData3
pub const SIGMA3_NONCE: &[u8; 13] = b"NCASE_Sigma3N";

const SIGMA2_INFO: &[u8] = b"Sigma2";
const SIGMA3_INFO: &[u8] = b"Sigma3";

fn transcript_hash(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = TranscriptHasher::new();
    hasher.update_batch(parts);
    hasher.finalize()
}

fn derive_key(shared_secret: &[u8], salt: &[&[u8]], info: &[u8]) -> Result<AeadKey, CryptoError> {
    let mut key = Zeroizing::new([0u8; 16]);
    hkdf_sha256(shared_secret, &salt.concat(), info, key.as_mut_slice())?;
    Ok(AeadKey::new(*key))
}

fn sigma2_key(
    shared_secret: &[u8],
    ipk: &[u8; 16],
    responder_random: &[u8; 32],
    responder_eph_pub_key: &[u8; 65],
    sigma1: &[u8],
) -> Result<AeadKey, CryptoError> {
    let sigma1_hash = transcript_hash(&[sigma1]);
    derive_key(
        shared_secret,
        &[ipk, responder_random, responder_eph_pub_key, &sigma1_hash],
        SIGMA2_INFO,
    )
}

fn sigma3_key(
    shared_secret: &[u8],
    ipk: &[u8; 16],
    sigma1: &[u8],
    sigma2: &[u8],
) -> Result<AeadKey, CryptoError> {
    let hash = transcript_hash(&[sigma1, sigma2]);
    derive_key(shared_secret, &[ipk, &hash], SIGMA3_INFO)
}

fn session_salt(ipk: &[u8; 16], sigma1: &[u8], sigma2: &[u8], sigma3: &[u8]) -> Vec<u8> {
    let hash = transcript_hash(&[sigma1, sigma2, sigma3]);
    [&ipk[..], &hash[..]].concat()
}

fn seal(key: &AeadKey, nonce: &[u8; 13], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.encrypt(&Nonce::from_bytes(*nonce), plaintext, &[])
}

fn open(key: &AeadKey, nonce: &[u8; 13], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.decrypt(&Nonce::from_bytes(*nonce), sealed, &[])
}
