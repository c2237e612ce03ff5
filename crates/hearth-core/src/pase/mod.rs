//! Passcode-authenticated session establishment (SPAKE2+).
//!
//! ```text
//! Initiator (commissioner)                     Responder (device)
//!   PbkdfParamRequest      ─────────────────►
//!                          ◄─────────────────  PbkdfParamResponse
//!   Pake1 {X}              ─────────────────►
//!                          ◄─────────────────  Pake2 {Y, hBX}
//!   Pake3 {hAY}            ─────────────────►
//!                          ◄─────────────────  StatusReport(success)
//!   StandaloneAck          ─────────────────►
//! ```
//!
//! Both sides hash `"CHIP PAKE V1 Commissioning" || request || response`
//! (the exact payload bytes) into the SPAKE2+ context, and key the new
//! secure session with `Ke`.

mod client;
pub mod messages;
mod server;

pub use client::PaseClient;
pub use server::PaseServer;

use crate::error::HandshakeError;
use hearth_crypto::hash::TranscriptHasher;

/// SPAKE2+ context prefix
pub const PASE_CONTEXT: &[u8] = b"CHIP PAKE V1 Commissioning";

/// The only passcode id in use
pub const DEFAULT_PASSCODE_ID: u16 = 0;

/// Smallest accepted PBKDF2 salt
pub const MIN_SALT_LENGTH: usize = 16;

/// Largest accepted PBKDF2 salt
pub const MAX_SALT_LENGTH: usize = 32;

/// Fewest accepted PBKDF2 iterations
pub const MIN_ITERATIONS: u32 = 1000;

/// Most accepted PBKDF2 iterations
pub const MAX_ITERATIONS: u32 = 100_000;

/// Largest valid setup passcode
pub const MAX_PASSCODE: u32 = 99_999_998;

const TRIVIAL_PASSCODES: [u32; 10] = [
    11_111_111, 22_222_222, 33_333_333, 44_444_444, 55_555_555, 66_666_666, 77_777_777,
    88_888_888, 12_345_678, 87_654_321,
];

/// Reject out-of-range and trivially guessable passcodes.
///
/// # Errors
///
/// Returns [`HandshakeError::InvalidParameter`] for an invalid passcode.
pub fn validate_passcode(passcode: u32) -> Result<(), HandshakeError> {
    if passcode == 0 || passcode > MAX_PASSCODE || TRIVIAL_PASSCODES.contains(&passcode) {
        return Err(HandshakeError::InvalidParameter("passcode"));
    }
    Ok(())
}

/// Check PBKDF2 parameters against the accepted ranges.
///
/// # Errors
///
/// Returns [`HandshakeError::InvalidParameter`] naming the bad value.
pub fn validate_pbkdf_parameters(salt: &[u8], iterations: u32) -> Result<(), HandshakeError> {
    if !(MIN_SALT_LENGTH..=MAX_SALT_LENGTH).contains(&salt.len()) {
        return Err(HandshakeError::InvalidParameter("pbkdf salt length"));
    }
    if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
        return Err(HandshakeError::InvalidParameter("pbkdf iterations"));
    }
    Ok(())
}

fn pase_context(request: &[u8], response: &[u8]) -> [u8; 32] {
    let mut hasher = TranscriptHasher::new();
    hasher.update_batch(&[PASE_CONTEXT, request, response]);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passcode_validation() {
        assert!(validate_passcode(20_202_021).is_ok());
        assert!(validate_passcode(1).is_ok());
        assert!(validate_passcode(MAX_PASSCODE).is_ok());
        assert!(validate_passcode(0).is_err());
        assert!(validate_passcode(99_999_999).is_err());
        assert!(validate_passcode(12_345_678).is_err());
        assert!(validate_passcode(33_333_333).is_err());
    }

    #[test]
    fn test_pbkdf_parameter_ranges() {
        assert!(validate_pbkdf_parameters(&[0; 16], 1000).is_ok());
        assert!(validate_pbkdf_parameters(&[0; 32], 100_000).is_ok());
        assert!(validate_pbkdf_parameters(&[0; 15], 1000).is_err());
        assert!(validate_pbkdf_parameters(&[0; 33], 1000).is_err());
        assert!(validate_pbkdf_parameters(&[0; 16], 999).is_err());
        assert!(validate_pbkdf_parameters(&[0; 16], 100_001).is_err());
    }

    #[test]
    fn test_context_depends_on_both_messages() {
        let base = pase_context(b"req", b"resp");
        assert_eq!(base, hearth_crypto::hash::sha256(b"CHIP PAKE V1 Commissioningreqresp"));
        assert_ne!(base, pase_context(b"req", b"resp2"));
    }
}
