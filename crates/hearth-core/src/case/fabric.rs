//! Operational credentials used by CASE.
//!
//! CASE only needs four things from a fabric: the identity protection key
//! (IPK), the local certificate chain, a signer, and chain verification of
//! the peer. [`Fabric`] and [`FabricLookup`] capture that contract;
//! [`OperationalFabric`], [`FabricTable`] and [`CertificateAuthority`] are
//! the in-memory implementation.
//!
//! Certificates are compact TLV structures rather than X.509:
//!
//! ```text
//! { 1: subject id (u64), 2: fabric id (u64), 3: public key (65 bytes),
//!   4: issuer signature over the TLV of fields 1-3 (64 bytes) }
//! ```

use crate::error::{HandshakeError, TlvError};
use crate::tlv::{FieldType, FieldValue, Record, StructSchema, TlvMessage};
use dashmap::DashMap;
use hearth_crypto::CryptoError;
use hearth_crypto::constant_time::ct_eq;
use hearth_crypto::hash::hmac_sha256_parts;
use hearth_crypto::random::fill_random;
use hearth_crypto::signatures::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use std::sync::{Arc, LazyLock};

static CERTIFICATE_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("OperationalCertificate")
        .field("nodeId", 1, FieldType::Unsigned)
        .field("fabricId", 2, FieldType::Unsigned)
        .field("publicKey", 3, FieldType::Bytes)
        .optional("signature", 4, FieldType::Bytes)
        .build()
});

/// Compact operational certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationalCertificate {
    /// Node id (or CA id for an intermediate)
    pub node_id: u64,
    /// Fabric the certificate belongs to
    pub fabric_id: u64,
    /// Subject public key, uncompressed SEC1
    pub public_key: [u8; 65],
    /// Issuer signature
    pub signature: [u8; 64],
}

impl OperationalCertificate {
    /// Bytes covered by the issuer signature.
    ///
    /// # Errors
    ///
    /// Returns [`TlvError`] only if the schema is violated.
    pub fn tbs_bytes(&self) -> Result<Vec<u8>, TlvError> {
        CERTIFICATE_SCHEMA.encode(&self.tbs_record())
    }

    fn tbs_record(&self) -> Record {
        Record::new()
            .with("nodeId", FieldValue::Unsigned(self.node_id))
            .with("fabricId", FieldValue::Unsigned(self.fabric_id))
            .with("publicKey", FieldValue::Bytes(self.public_key.to_vec()))
    }

    /// Check the issuer signature with `issuer`.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::CertificateRejected`] if it does not verify.
    pub fn verify_signature(&self, issuer: &VerifyingKey) -> Result<(), HandshakeError> {
        issuer
            .verify(&self.tbs_bytes()?, &Signature::from_bytes(self.signature))
            .map_err(|_| HandshakeError::CertificateRejected("bad issuer signature"))
    }

    /// Subject key.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::CertificateRejected`] for an invalid point.
    pub fn verifying_key(&self) -> Result<VerifyingKey, HandshakeError> {
        VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| HandshakeError::CertificateRejected("invalid public key"))
    }
}

impl TlvMessage for OperationalCertificate {
    fn schema() -> &'static StructSchema {
        &CERTIFICATE_SCHEMA
    }

    fn to_record(&self) -> Record {
        self.tbs_record()
            .with("signature", FieldValue::Bytes(self.signature.to_vec()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            node_id: record.unsigned("nodeId")?,
            fabric_id: record.unsigned("fabricId")?,
            public_key: record.byte_array("publicKey")?,
            signature: record.byte_array("signature")?,
        })
    }
}

/// Verified peer identity
#[derive(Debug, Clone, Copy)]
pub struct PeerIdentity {
    /// Peer node id from its certificate
    pub node_id: u64,
    /// Peer signing key from its certificate
    pub public_key: VerifyingKey,
}

/// One local fabric membership.
pub trait Fabric: Send + Sync {
    /// Fabric id
    fn fabric_id(&self) -> u64;

    /// Our node id on this fabric
    fn node_id(&self) -> u64;

    /// Identity protection key
    fn identity_protection_key(&self) -> &[u8; 16];

    /// Root CA public key
    fn root_public_key(&self) -> &[u8; 65];

    /// Our encoded operational certificate
    fn certificate(&self) -> &[u8];

    /// Our encoded intermediate certificate, if the chain has one
    fn intermediate_certificate(&self) -> Option<&[u8]>;

    /// Sign with our operational key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningFailed`] if signing fails.
    fn sign(&self, data: &[u8]) -> Result<Signature, CryptoError>;

    /// Verify a peer chain up to our root and return the peer identity.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::CertificateRejected`] for any chain failure.
    fn verify_chain(
        &self,
        certificate: &[u8],
        intermediate: Option<&[u8]>,
    ) -> Result<PeerIdentity, HandshakeError>;

    /// `HMAC(IPK, random || root key || fabric id || node id)` addressing
    /// `node_id` on this fabric.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the HMAC cannot be keyed.
    fn destination_id(&self, initiator_random: &[u8; 32], node_id: u64) -> Result<[u8; 32], CryptoError> {
        hmac_sha256_parts(
            self.identity_protection_key(),
            &[
                initiator_random,
                self.root_public_key(),
                &self.fabric_id().to_le_bytes(),
                &node_id.to_le_bytes(),
            ],
        )
    }
}

/// Resolves a Sigma1 destination id to a local fabric.
pub trait FabricLookup: Send + Sync {
    /// Fabric whose destination id for our node matches, if any.
    fn find_identity(&self, destination_id: &[u8], initiator_random: &[u8; 32]) -> Option<Arc<dyn Fabric>>;
}

/// In-memory fabric membership with a software signing key.
pub struct OperationalFabric {
    fabric_id: u64,
    node_id: u64,
    ipk: [u8; 16],
    root_public_key: [u8; 65],
    certificate: Vec<u8>,
    intermediate: Option<Vec<u8>>,
    signing_key: SigningKey,
}

impl std::fmt::Debug for OperationalFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationalFabric")
            .field("fabric_id", &format_args!("{:016X}", self.fabric_id))
            .field("node_id", &format_args!("{:016X}", self.node_id))
            .field("has_intermediate", &self.intermediate.is_some())
            .finish_non_exhaustive()
    }
}

impl Fabric for OperationalFabric {
    fn fabric_id(&self) -> u64 {
        self.fabric_id
    }

    fn node_id(&self) -> u64 {
        self.node_id
    }

    fn identity_protection_key(&self) -> &[u8; 16] {
        &self.ipk
    }

    fn root_public_key(&self) -> &[u8; 65] {
        &self.root_public_key
    }

    fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    fn intermediate_certificate(&self) -> Option<&[u8]> {
        self.intermediate.as_deref()
    }

    fn sign(&self, data: &[u8]) -> Result<Signature, CryptoError> {
        self.signing_key.sign(data)
    }

    fn verify_chain(
        &self,
        certificate: &[u8],
        intermediate: Option<&[u8]>,
    ) -> Result<PeerIdentity, HandshakeError> {
        let root = VerifyingKey::from_bytes(&self.root_public_key)
            .map_err(|_| HandshakeError::CertificateRejected("invalid root key"))?;
        let leaf = parse_certificate(certificate)?;

        let issuer = match intermediate {
            Some(bytes) => {
                let icac = parse_certificate(bytes)?;
                if icac.fabric_id != self.fabric_id {
                    return Err(HandshakeError::CertificateRejected("intermediate from another fabric"));
                }
                icac.verify_signature(&root)?;
                icac.verifying_key()?
            }
            None => root,
        };

        if leaf.fabric_id != self.fabric_id {
            return Err(HandshakeError::CertificateRejected("certificate from another fabric"));
        }
        leaf.verify_signature(&issuer)?;
        Ok(PeerIdentity {
            node_id: leaf.node_id,
            public_key: leaf.verifying_key()?,
        })
    }
}

fn parse_certificate(bytes: &[u8]) -> Result<OperationalCertificate, HandshakeError> {
    OperationalCertificate::decode(bytes)
        .map_err(|_| HandshakeError::CertificateRejected("malformed certificate"))
}

/// Registry of local fabrics, keyed by fabric id.
#[derive(Default)]
pub struct FabricTable {
    fabrics: DashMap<u64, Arc<dyn Fabric>>,
}

impl std::fmt::Debug for FabricTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricTable")
            .field("fabrics", &self.fabrics.len())
            .finish()
    }
}

impl FabricTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a fabric
    pub fn add(&self, fabric: Arc<dyn Fabric>) {
        self.fabrics.insert(fabric.fabric_id(), fabric);
    }

    /// Look up by fabric id
    #[must_use]
    pub fn get(&self, fabric_id: u64) -> Option<Arc<dyn Fabric>> {
        self.fabrics.get(&fabric_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of fabrics
    #[must_use]
    pub fn len(&self) -> usize {
        self.fabrics.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fabrics.is_empty()
    }
}

impl FabricLookup for FabricTable {
    fn find_identity(&self, destination_id: &[u8], initiator_random: &[u8; 32]) -> Option<Arc<dyn Fabric>> {
        self.fabrics.iter().find_map(|entry| {
            let fabric = entry.value();
            let candidate = fabric.destination_id(initiator_random, fabric.node_id()).ok()?;
            ct_eq(&candidate, destination_id).then(|| Arc::clone(fabric))
        })
    }
}

/// Issues operational certificates for one fabric.
pub struct CertificateAuthority {
    fabric_id: u64,
    ipk: [u8; 16],
    root_key: SigningKey,
    intermediate: Option<(SigningKey, Vec<u8>)>,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("fabric_id", &format_args!("{:016X}", self.fabric_id))
            .field("has_intermediate", &self.intermediate.is_some())
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Create a root CA with a fresh key and IPK.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the OS RNG fails.
    pub fn new(fabric_id: u64) -> Result<Self, CryptoError> {
        let mut ipk = [0u8; 16];
        fill_random(&mut ipk)?;
        Ok(Self {
            fabric_id,
            ipk,
            root_key: SigningKey::generate(&mut OsRng),
            intermediate: None,
        })
    }

    /// Issue node certificates through a fresh intermediate CA.
    ///
    /// # Errors
    ///
    /// Returns an error if signing the intermediate certificate fails.
    pub fn with_intermediate(mut self, ca_id: u64) -> Result<Self, HandshakeError> {
        let key = SigningKey::generate(&mut OsRng);
        let certificate = self.sign_certificate(&self.root_key, ca_id, &key.verifying_key())?;
        self.intermediate = Some((key, certificate.encode()?));
        Ok(self)
    }

    /// Fabric id
    #[must_use]
    pub fn fabric_id(&self) -> u64 {
        self.fabric_id
    }

    /// Root public key
    #[must_use]
    pub fn root_public_key(&self) -> [u8; 65] {
        self.root_key.verifying_key().to_bytes()
    }

    fn sign_certificate(
        &self,
        issuer: &SigningKey,
        node_id: u64,
        subject: &VerifyingKey,
    ) -> Result<OperationalCertificate, HandshakeError> {
        let mut certificate = OperationalCertificate {
            node_id,
            fabric_id: self.fabric_id,
            public_key: subject.to_bytes(),
            signature: [0; 64],
        };
        certificate.signature = *issuer.sign(&certificate.tbs_bytes()?)?.as_bytes();
        Ok(certificate)
    }

    /// Issue a certificate for `subject` signed by the intermediate (or root).
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_certificate(
        &self,
        node_id: u64,
        subject: &VerifyingKey,
    ) -> Result<OperationalCertificate, HandshakeError> {
        let issuer = self
            .intermediate
            .as_ref()
            .map_or(&self.root_key, |(key, _)| key);
        self.sign_certificate(issuer, node_id, subject)
    }

    /// Create a complete fabric membership for `node_id` with a new key.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, node_id: u64) -> Result<OperationalFabric, HandshakeError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let certificate = self.issue_certificate(node_id, &signing_key.verifying_key())?;
        Ok(OperationalFabric {
            fabric_id: self.fabric_id,
            node_id,
            ipk: self.ipk,
            root_public_key: self.root_public_key(),
            certificate: certificate.encode()?,
            intermediate: self.intermediate.as_ref().map(|(_, cert)| cert.clone()),
            signing_key,
        })
    }
}
