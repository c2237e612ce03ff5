//! SPAKE2+ over P-256 with SHA-256, HKDF and HMAC (draft-bar-cfrg-spake2plus-01).
//!
//! The prover (commissioner) knows the passcode and so both `w0` and `w1`.
//! The verifier (device) only needs `w0` and `L = w1·P`.
//!
//! ```text
//! Prover                                      Verifier
//!   X = x·P + w0·M          ── X ──►
//!                           ◄── Y, hBX ──     Y = y·P + w0·N
//!   Z = x·(Y - w0·N)                          Z = y·(X - w0·M)
//!   V = w1·(Y - w0·N)                         V = y·L
//!                           ── hAY ──►
//! ```
//!
//! Both sides hash the transcript `TT` (each entry prefixed with its length
//! as 8 little-endian bytes) into `Ka || Ke`, expand `Ka` into the
//! confirmation keys `KcA || KcB`, and exchange `hAY = HMAC(KcA, Y)` and
//! `hBX = HMAC(KcB, X)`.

use crate::hash::{hkdf_sha256, hmac_sha256, pbkdf2_sha256, sha256};
use crate::{CryptoError, P256_PUBLIC_KEY_SIZE};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::elliptic_curve::{Field, PrimeField};
use p256::ProjectivePoint;
use rand_core::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use p256::Scalar;

/// Length of the PBKDF2 output split into `w0s || w1s`.
pub const PBKDF2_OUTPUT_SIZE: usize = 80;

/// HKDF info for the confirmation keys.
const CONFIRMATION_KEYS_INFO: &[u8] = b"ConfirmationKeys";

/// Fixed point `M` (uncompressed SEC1).
const POINT_M: [u8; P256_PUBLIC_KEY_SIZE] = [
    0x04, 0x88, 0x6e, 0x2f, 0x97, 0xac, 0xe4, 0x6e, 0x55, 0xba, 0x9d, 0xd7, 0x24, 0x25, 0x79,
    0xf2, 0x99, 0x3b, 0x64, 0xe1, 0x6e, 0xf3, 0xdc, 0xab, 0x95, 0xaf, 0xd4, 0x97, 0x33, 0x3d,
    0x8f, 0xa1, 0x2f, 0x5f, 0xf3, 0x55, 0x16, 0x3e, 0x43, 0xce, 0x22, 0x4e, 0x0b, 0x0e, 0x65,
    0xff, 0x02, 0xac, 0x8e, 0x5c, 0x7b, 0xe0, 0x94, 0x19, 0xc7, 0x85, 0xe0, 0xca, 0x54, 0x7d,
    0x55, 0xa1, 0x2e, 0x2d, 0x20,
];

/// Fixed point `N` (uncompressed SEC1).
const POINT_N: [u8; P256_PUBLIC_KEY_SIZE] = [
    0x04, 0xd8, 0xbb, 0xd6, 0xc6, 0x39, 0xc6, 0x29, 0x37, 0xb0, 0x4d, 0x99, 0x7f, 0x38, 0xc3,
    0x77, 0x07, 0x19, 0xc6, 0x29, 0xd7, 0x01, 0x4d, 0x49, 0xa2, 0x4b, 0x4f, 0x98, 0xba, 0xa1,
    0x29, 0x2b, 0x49, 0x07, 0xd6, 0x0a, 0xa6, 0xbf, 0xad, 0xe4, 0x50, 0x08, 0xa6, 0x36, 0x33,
    0x7f, 0x51, 0x68, 0xc6, 0x4d, 0x9b, 0xd3, 0x60, 0x34, 0x80, 0x8c, 0xd5, 0x64, 0x49, 0x0b,
    0x1e, 0x65, 0x6e, 0xdb, 0xe7,
];

/// Reduce a big-endian byte string of any length modulo the group order.
#[must_use]
pub fn scalar_from_bytes(bytes: &[u8]) -> Scalar {
    let radix = Scalar::from(256u64);
    bytes
        .iter()
        .fold(Scalar::ZERO, |acc, b| acc * radix + Scalar::from(u64::from(*b)))
}

/// Big-endian 32-byte encoding of a scalar.
#[must_use]
pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; 32] {
    scalar.to_repr().into()
}

/// Decode a SEC1 point, rejecting the identity and off-curve points.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPublicKey`] for anything that is not a
/// valid non-identity P-256 point.
pub fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint, CryptoError> {
    p256::PublicKey::from_sec1_bytes(bytes)
        .map(|key| key.to_projective())
        .map_err(|_| CryptoError::InvalidPublicKey)
}

fn encode_point(point: &ProjectivePoint) -> Result<[u8; P256_PUBLIC_KEY_SIZE], CryptoError> {
    let encoded = point.to_affine().to_encoded_point(false);
    let bytes = encoded.as_bytes();
    if bytes.len() != P256_PUBLIC_KEY_SIZE {
        return Err(CryptoError::InvalidPublicKey);
    }
    let mut out = [0u8; P256_PUBLIC_KEY_SIZE];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Passcode-derived SPAKE2+ scalars.
#[derive(Clone)]
pub struct PasscodeKeys {
    /// `w0 = w0s mod n`
    pub w0: Scalar,
    /// `w1 = w1s mod n`
    pub w1: Scalar,
}

impl PasscodeKeys {
    /// Derive `w0` and `w1` from a setup passcode.
    ///
    /// The passcode is stretched as its 4 little-endian bytes with
    /// PBKDF2-HMAC-SHA256 into 80 bytes, and each 40-byte half is reduced
    /// modulo the group order.
    ///
    /// # Errors
    ///
    /// Returns an error if PBKDF2 rejects the parameters.
    pub fn derive(passcode: u32, salt: &[u8], iterations: u32) -> Result<Self, CryptoError> {
        let mut ws = [0u8; PBKDF2_OUTPUT_SIZE];
        pbkdf2_sha256(&passcode.to_le_bytes(), salt, iterations, &mut ws)?;
        let keys = Self {
            w0: scalar_from_bytes(&ws[..40]),
            w1: scalar_from_bytes(&ws[40..]),
        };
        ws.zeroize();
        Ok(keys)
    }

    /// Verifier point `L = w1·P` (uncompressed SEC1).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if `w1` is zero.
    pub fn l(&self) -> Result<[u8; P256_PUBLIC_KEY_SIZE], CryptoError> {
        encode_point(&(ProjectivePoint::GENERATOR * self.w1))
    }
}

/// Keys and confirmation values produced by a SPAKE2+ run.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Spake2pSecrets {
    /// Shared session secret `Ke`
    pub ke: [u8; 16],
    /// Prover's confirmation `HMAC(KcA, Y)`
    pub h_ay: [u8; 32],
    /// Verifier's confirmation `HMAC(KcB, X)`
    pub h_bx: [u8; 32],
}

/// One side of a SPAKE2+ exchange.
pub struct Spake2p {
    context: Vec<u8>,
    random: Scalar,
    w0: Scalar,
}

impl Spake2p {
    /// Start a run with a fresh random scalar.
    #[must_use]
    pub fn new(context: &[u8], w0: Scalar) -> Self {
        Self::with_random(context, Scalar::random(&mut OsRng), w0)
    }

    /// Start a run with a caller-chosen random scalar.
    #[must_use]
    pub fn with_random(context: &[u8], random: Scalar, w0: Scalar) -> Self {
        Self {
            context: context.to_vec(),
            random,
            w0,
        }
    }

    /// Prover share `X = x·P + w0·M`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the result is the identity.
    pub fn compute_x(&self) -> Result<[u8; P256_PUBLIC_KEY_SIZE], CryptoError> {
        let m = decode_point(&POINT_M)?;
        encode_point(&(ProjectivePoint::GENERATOR * self.random + m * self.w0))
    }

    /// Verifier share `Y = y·P + w0·N`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the result is the identity.
    pub fn compute_y(&self) -> Result<[u8; P256_PUBLIC_KEY_SIZE], CryptoError> {
        let n = decode_point(&POINT_N)?;
        encode_point(&(ProjectivePoint::GENERATOR * self.random + n * self.w0))
    }

    /// Prover side: derive secrets from the verifier's `Y`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if `x` or `y` is not a
    /// valid curve point or an intermediate point is the identity.
    pub fn compute_secret_and_verifiers_from_y(
        &self,
        w1: &Scalar,
        x: &[u8],
        y: &[u8],
    ) -> Result<Spake2pSecrets, CryptoError> {
        decode_point(x)?;
        let y_point = decode_point(y)?;
        let n = decode_point(&POINT_N)?;
        let unblinded = y_point - n * self.w0;
        if unblinded == ProjectivePoint::IDENTITY {
            return Err(CryptoError::InvalidPublicKey);
        }
        let z = unblinded * self.random;
        let v = unblinded * *w1;
        self.compute_secret_and_verifiers(x, y, &z, &v)
    }

    /// Verifier side: derive secrets from the prover's `X` and the stored `L`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if `l`, `x` or `y` is not a
    /// valid curve point or an intermediate point is the identity.
    pub fn compute_secret_and_verifiers_from_x(
        &self,
        l: &[u8],
        x: &[u8],
        y: &[u8],
    ) -> Result<Spake2pSecrets, CryptoError> {
        let l_point = decode_point(l)?;
        let x_point = decode_point(x)?;
        decode_point(y)?;
        let m = decode_point(&POINT_M)?;
        let unblinded = x_point - m * self.w0;
        if unblinded == ProjectivePoint::IDENTITY {
            return Err(CryptoError::InvalidPublicKey);
        }
        let z = unblinded * self.random;
        let v = l_point * self.random;
        self.compute_secret_and_verifiers(x, y, &z, &v)
    }

    fn compute_secret_and_verifiers(
        &self,
        x: &[u8],
        y: &[u8],
        z: &ProjectivePoint,
        v: &ProjectivePoint,
    ) -> Result<Spake2pSecrets, CryptoError> {
        let z = encode_point(z)?;
        let v = encode_point(v)?;
        let w0 = scalar_to_bytes(&self.w0);

        let mut tt = Vec::with_capacity(10 * 8 + self.context.len() + 6 * 65 + 32);
        let entries: [&[u8]; 10] = [
            self.context.as_slice(),
            b"",
            b"",
            &POINT_M,
            &POINT_N,
            x,
            y,
            &z,
            &v,
            &w0,
        ];
        for entry in entries {
            tt.extend_from_slice(&(entry.len() as u64).to_le_bytes());
            tt.extend_from_slice(entry);
        }
        let mut transcript_hash = sha256(&tt);
        tt.zeroize();

        let (ka, ke_bytes) = transcript_hash.split_at(16);
        let mut kc = [0u8; 32];
        hkdf_sha256(ka, &[], CONFIRMATION_KEYS_INFO, &mut kc)?;
        let h_ay = hmac_sha256(&kc[..16], y)?;
        let h_bx = hmac_sha256(&kc[16..], x)?;

        let mut ke = [0u8; 16];
        ke.copy_from_slice(ke_bytes);
        kc.zeroize();
        transcript_hash.zeroize();

        Ok(Spake2pSecrets { ke, h_ay, h_bx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_points_decode() {
        assert!(decode_point(&POINT_M).is_ok());
        assert!(decode_point(&POINT_N).is_ok());
    }

    #[test]
    fn test_scalar_from_bytes_small() {
        assert_eq!(scalar_from_bytes(&[0x01, 0x00]), Scalar::from(256u64));
        assert_eq!(scalar_from_bytes(&[]), Scalar::ZERO);
    }

    #[test]
    fn test_scalar_bytes_roundtrip() {
        let scalar = Scalar::from(0x0102_0304u64);
        assert_eq!(scalar_from_bytes(&scalar_to_bytes(&scalar)), scalar);
    }

    #[test]
    fn test_both_roles_agree() {
        let keys = PasscodeKeys::derive(20202021, b"SPAKE2P Key Salt", 1000).unwrap();
        let context = sha256(b"context");
        let prover = Spake2p::new(&context, keys.w0);
        let verifier = Spake2p::new(&context, keys.w0);

        let x = prover.compute_x().unwrap();
        let y = verifier.compute_y().unwrap();
        let l = keys.l().unwrap();

        let p = prover
            .compute_secret_and_verifiers_from_y(&keys.w1, &x, &y)
            .unwrap();
        let v = verifier.compute_secret_and_verifiers_from_x(&l, &x, &y).unwrap();

        assert_eq!(p.ke, v.ke);
        assert_eq!(p.h_ay, v.h_ay);
        assert_eq!(p.h_bx, v.h_bx);
    }

    #[test]
    fn test_wrong_passcode_disagrees() {
        let good = PasscodeKeys::derive(20202021, b"SPAKE2P Key Salt", 1000).unwrap();
        let bad = PasscodeKeys::derive(20202022, b"SPAKE2P Key Salt", 1000).unwrap();
        let context = [0u8; 32];
        let prover = Spake2p::new(&context, bad.w0);
        let verifier = Spake2p::new(&context, good.w0);

        let x = prover.compute_x().unwrap();
        let y = verifier.compute_y().unwrap();
        let p = prover
            .compute_secret_and_verifiers_from_y(&bad.w1, &x, &y)
            .unwrap();
        let v = verifier
            .compute_secret_and_verifiers_from_x(&good.l().unwrap(), &x, &y)
            .unwrap();

        assert_ne!(p.h_ay, v.h_ay);
        assert_ne!(p.ke, v.ke);
    }

    #[test]
    fn test_reject_invalid_share() {
        let keys = PasscodeKeys::derive(1234, b"SPAKE2P Key Salt", 1000).unwrap();
        let verifier = Spake2p::new(&[], keys.w0);
        let y = verifier.compute_y().unwrap();
        let mut x = [0u8; 65];
        x[0] = 0x04;
        assert!(matches!(
            verifier.compute_secret_and_verifiers_from_x(&keys.l().unwrap(), &x, &y),
            Err(CryptoError::InvalidPublicKey)
        ));
    }
}
