//! Cryptographic test vectors.
//!
//! This module contains known-answer vectors for:
//! - RFC 5869 (HKDF-SHA256, test case 1)
//! - AES-128-CCM with a 13-byte nonce and 16-byte tag
//! - PBKDF2-HMAC-SHA256 passcode stretching into SPAKE2+ `w0`/`w1`
//! - SPAKE2+ P-256 shares, shared key and confirmation values
//! - Session key expansion
//! - P-256 ECDH

use hearth_crypto::SessionKeys;
use hearth_crypto::aead::{AeadKey, Nonce};
use hearth_crypto::ecdh::PrivateKey;
use hearth_crypto::hash;
use hearth_crypto::spake2p::{PasscodeKeys, Spake2p, scalar_from_bytes, scalar_to_bytes};

// Helper function to decode hex strings
fn decode_hex(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

// ============================================================================
// RFC 5869 Test Vectors (HKDF-SHA256)
// ============================================================================

#[test]
fn test_hkdf_rfc5869_case_1() {
    let ikm = decode_hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
    let salt = decode_hex("000102030405060708090a0b0c");
    let info = decode_hex("f0f1f2f3f4f5f6f7f8f9");
    let expected = decode_hex(
        "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865",
    );

    let mut okm = [0u8; 42];
    hash::hkdf_sha256(&ikm, &salt, &info, &mut okm).unwrap();
    assert_eq!(okm.to_vec(), expected);
}

// ============================================================================
// AES-128-CCM
// ============================================================================

#[test]
fn test_aes_ccm_known_answer() {
    let key = AeadKey::new(decode_hex("404142434445464748494a4b4c4d4e4f").try_into().unwrap());
    let nonce = Nonce::from_bytes(decode_hex("101112131415161718191a1b1c").try_into().unwrap());
    let aad = decode_hex("0001020304050607");
    let expected = decode_hex(
        "21d51efc4ec9c06327229dcf3740e82b19a2ae4bff2982dca42c619591e586be7ac1e5d28f",
    );

    let ciphertext = key.encrypt(&nonce, b"hearth secure message", &aad).unwrap();
    assert_eq!(ciphertext, expected);

    let plaintext = key.decrypt(&nonce, &expected, &aad).unwrap();
    assert_eq!(plaintext, b"hearth secure message");
}

// ============================================================================
// Passcode Stretching
// ============================================================================

#[test]
fn test_passcode_keys_known_answer() {
    let keys = PasscodeKeys::derive(20202021, b"SPAKE2P Key Salt", 1000).unwrap();

    assert_eq!(
        scalar_to_bytes(&keys.w0).to_vec(),
        decode_hex("b96170aae803346884724fe9a3b287c30330c2a660375d17bb205a8cf1aecb35")
    );
    assert_eq!(
        scalar_to_bytes(&keys.w1).to_vec(),
        decode_hex("823d264225e36f4923b43ad64f8c862a30f4a129bbf9ee8074a32d6d67586a90")
    );
    assert_eq!(
        keys.l().unwrap().to_vec(),
        decode_hex(
            "0457f8ab79ee253ab6a8e46bb09e543ae422736de501e3db37d441fe344920d095\
             48e4c18240630c4ff4913c53513839b7c07fcc0627a1b8573a149fcd1fa466cf"
        )
    );
}

// ============================================================================
// SPAKE2+ (P-256, SHA-256, draft-01, empty identities)
// ============================================================================

const CONTEXT: &[u8] = b"SPAKE2+-P256-SHA256-HKDF draft-01";
const X_RANDOM: &str = "8b0f3f383905cf3a3bb955ef8fb62e24849dd349a05ca79aafb18041d30cbdb6";
const Y_RANDOM: &str = "2e0895b0e763d6d5a9564433e64ac3cac74ff897f6c3445247ba1bab40082a91";
const W0: &str = "e6887cf9bdfb7579c69bf47928a84514b5e355ac034863f7ffaf4390e67d798c";
const W1: &str = "24b5ae4abda868ec9336ffc3b78ee31c5755bef1759227ef5372ca139b94e512";
const X_SHARE: &str = "04af09987a593d3bac8694b123839422c3cc87e37d6b41c1d630f000dd64980e53\
                       7ae704bcede04ea3bec9b7475b32fa2ca3b684be14d11645e38ea6609eb39e7e";
const Y_SHARE: &str = "04417592620aebf9fd203616bbb9f121b730c258b286f890c5f19fea833a9c900c\
                       be9057bc549a3e19975be9927f0e7614f08d1f0a108eede5fd7eb5624584a4f4";
const L_POINT: &str = "0495645cfb74df6e58f9748bb83a86620bab7c82e107f57d6870da8cbcb2ff9f70\
                       63a14b6402c62f99afcb9706a4d1a143273259fe76f1c605a3639745a92154b9";
const KE: &str = "9ddc259f88ca65e3c0f23a6e94a14335";
const H_AY: &str = "5fbebd93018e2b19bda755fb14e1490267a94c3c37a6e78d45101659a3772610";
const H_BX: &str = "208755b71f182b67173fea23eb5e538c52f8cb604c5546fb857b95fb0b1ca06a";

fn prover() -> Spake2p {
    Spake2p::with_random(
        CONTEXT,
        scalar_from_bytes(&decode_hex(X_RANDOM)),
        scalar_from_bytes(&decode_hex(W0)),
    )
}

fn verifier() -> Spake2p {
    Spake2p::with_random(
        CONTEXT,
        scalar_from_bytes(&decode_hex(Y_RANDOM)),
        scalar_from_bytes(&decode_hex(W0)),
    )
}

#[test]
fn test_spake2p_compute_x() {
    assert_eq!(prover().compute_x().unwrap().to_vec(), decode_hex(X_SHARE));
}

#[test]
fn test_spake2p_compute_y() {
    assert_eq!(verifier().compute_y().unwrap().to_vec(), decode_hex(Y_SHARE));
}

#[test]
fn test_spake2p_l_from_w1() {
    let keys = PasscodeKeys {
        w0: scalar_from_bytes(&decode_hex(W0)),
        w1: scalar_from_bytes(&decode_hex(W1)),
    };
    assert_eq!(keys.l().unwrap().to_vec(), decode_hex(L_POINT));
}

#[test]
fn test_spake2p_prover_secrets() {
    let w1 = scalar_from_bytes(&decode_hex(W1));
    let secrets = prover()
        .compute_secret_and_verifiers_from_y(&w1, &decode_hex(X_SHARE), &decode_hex(Y_SHARE))
        .unwrap();

    assert_eq!(secrets.ke.to_vec(), decode_hex(KE));
    assert_eq!(secrets.h_ay.to_vec(), decode_hex(H_AY));
    assert_eq!(secrets.h_bx.to_vec(), decode_hex(H_BX));
}

#[test]
fn test_spake2p_verifier_secrets() {
    let secrets = verifier()
        .compute_secret_and_verifiers_from_x(
            &decode_hex(L_POINT),
            &decode_hex(X_SHARE),
            &decode_hex(Y_SHARE),
        )
        .unwrap();

    assert_eq!(secrets.ke.to_vec(), decode_hex(KE));
    assert_eq!(secrets.h_ay.to_vec(), decode_hex(H_AY));
    assert_eq!(secrets.h_bx.to_vec(), decode_hex(H_BX));
}

// ============================================================================
// Session Keys
// ============================================================================

#[test]
fn test_session_keys_from_ke() {
    let okm = decode_hex(
        "0eab475062a163c8ffb34031e5502ef66acbd5b9f008b26faac4ea47680f88c0\
         1d0d32e3da6e36c2ac0b5df584820a7b",
    );
    let initiator = SessionKeys::derive(&decode_hex(KE), &[], true).unwrap();

    assert_eq!(initiator.encrypt_key.to_vec(), okm[..16].to_vec());
    assert_eq!(initiator.decrypt_key.to_vec(), okm[16..32].to_vec());
    assert_eq!(initiator.attestation_challenge.to_vec(), okm[32..].to_vec());
}

// ============================================================================
// P-256 ECDH
// ============================================================================

#[test]
fn test_ecdh_known_answer() {
    let alice = PrivateKey::from_bytes(&[0x11; 32]).unwrap();
    let bob = PrivateKey::from_bytes(&[0x22; 32]).unwrap();

    assert_eq!(
        alice.public_key().to_bytes().to_vec(),
        decode_hex(
            "040217e617f0b6443928278f96999e69a23a4f2c152bdf6d6cdf66e5b80282d4ed\
             194a7debcb97712d2dda3ca85aa8765a56f45fc758599652f2897c65306e5794"
        )
    );
    assert_eq!(
        alice.exchange(&bob.public_key()).as_bytes().to_vec(),
        decode_hex("ccfc261f58193c98ca4ad4a53bbac6f0ee29bc4d48438090446908622ca79af6")
    );
}
