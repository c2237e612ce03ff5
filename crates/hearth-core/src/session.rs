//! Sessions and the session table.
//!
//! The unsecured session (id 0) carries handshake traffic in the clear.
//! Secure sessions are created when PASE or CASE completes and encrypt every
//! payload with AES-128-CCM, authenticating the packet header as associated
//! data.

use crate::codec::{
    Message, Packet, SessionType, decode_payload, encode_packet_header, encode_payload,
};
use crate::error::{SessionError, TlvError};
use crate::tlv::{FieldType, FieldValue, Record, StructSchema};
use dashmap::{DashMap, DashSet};
use hearth_crypto::SessionKeys;
use hearth_crypto::aead::{AeadKey, Nonce, TAG_SIZE};
use rand_core::{OsRng, RngCore};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

/// Session id of the unsecured session
pub const UNSECURED_SESSION_ID: u16 = 0;

/// Reliability parameters of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParameters {
    /// Retransmission interval while the peer is idle
    pub idle_retransmission_interval: Duration,
    /// Retransmission interval while the peer is active
    pub active_retransmission_interval: Duration,
    /// Retransmissions before an exchange gives up
    pub retransmission_retries: u32,
}

impl Default for SessionParameters {
    fn default() -> Self {
        Self {
            idle_retransmission_interval: Duration::from_millis(500),
            active_retransmission_interval: Duration::from_millis(300),
            retransmission_retries: 4,
        }
    }
}

/// TLV layout of the MRP parameters carried in handshake messages
pub static MRP_PARAMETERS_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("MrpParameters")
        .optional("idleRetransTimeout", 1, FieldType::Unsigned)
        .optional("activeRetransTimeout", 2, FieldType::Unsigned)
        .build()
});

impl SessionParameters {
    /// Record for [`MRP_PARAMETERS_SCHEMA`]
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record::new()
            .with(
                "idleRetransTimeout",
                FieldValue::Unsigned(duration_ms(self.idle_retransmission_interval)),
            )
            .with(
                "activeRetransTimeout",
                FieldValue::Unsigned(duration_ms(self.active_retransmission_interval)),
            )
    }

    /// Parameters advertised by a peer; absent values keep the local defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TlvError`] if a value is not a 32-bit unsigned integer.
    pub fn from_record(record: &Record, defaults: Self) -> Result<Self, TlvError> {
        let idle = record.opt_unsigned::<u32>("idleRetransTimeout")?;
        let active = record.opt_unsigned::<u32>("activeRetransTimeout")?;
        Ok(Self {
            idle_retransmission_interval: idle.map_or(defaults.idle_retransmission_interval, |ms| {
                Duration::from_millis(u64::from(ms))
            }),
            active_retransmission_interval: active
                .map_or(defaults.active_retransmission_interval, |ms| {
                    Duration::from_millis(u64::from(ms))
                }),
            retransmission_retries: defaults.retransmission_retries,
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::from(u32::MAX))
}

fn initial_counter() -> u32 {
    (OsRng.next_u32() & 0x0FFF_FFFF) + 1
}

/// Session without encryption, used for handshakes.
#[derive(Debug)]
pub struct UnsecureSession {
    message_counter: AtomicU32,
    parameters: SessionParameters,
}

/// Session keyed by a completed handshake.
pub struct SecureSession {
    local_session_id: u16,
    peer_session_id: u16,
    local_node_id: u64,
    peer_node_id: u64,
    is_initiator: bool,
    encrypt_key: AeadKey,
    decrypt_key: AeadKey,
    attestation_challenge: [u8; 16],
    message_counter: AtomicU32,
    parameters: SessionParameters,
}

impl std::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("local_session_id", &self.local_session_id)
            .field("peer_session_id", &self.peer_session_id)
            .field("peer_node_id", &self.peer_node_id)
            .field("is_initiator", &self.is_initiator)
            .finish_non_exhaustive()
    }
}

/// Inputs for creating a secure session after a handshake.
pub struct NewSecureSession<'a> {
    /// Id the peer addresses us by (allocated from the table)
    pub local_session_id: u16,
    /// Id we address the peer by
    pub peer_session_id: u16,
    /// Handshake shared secret (`Ke` for PASE, ECDH secret for CASE)
    pub shared_secret: &'a [u8],
    /// HKDF salt (empty for PASE)
    pub salt: &'a [u8],
    /// Whether this side initiated the handshake
    pub is_initiator: bool,
    /// Our operational node id (0 for PASE)
    pub local_node_id: u64,
    /// Peer operational node id (0 for PASE)
    pub peer_node_id: u64,
    /// Peer's reliability parameters
    pub parameters: SessionParameters,
}

/// A session in the table
#[derive(Debug)]
pub enum Session {
    /// Unsecured session, id 0
    Unsecure(UnsecureSession),
    /// Encrypted session
    Secure(SecureSession),
}

impl Session {
    /// Id the peer addresses this session by
    #[must_use]
    pub fn id(&self) -> u16 {
        match self {
            Self::Unsecure(_) => UNSECURED_SESSION_ID,
            Self::Secure(s) => s.local_session_id,
        }
    }

    /// Id we put in outgoing packets
    #[must_use]
    pub fn peer_session_id(&self) -> u16 {
        match self {
            Self::Unsecure(_) => UNSECURED_SESSION_ID,
            Self::Secure(s) => s.peer_session_id,
        }
    }

    /// Whether payloads are encrypted
    #[must_use]
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Secure(_))
    }

    /// Peer operational node id, if known
    #[must_use]
    pub fn peer_node_id(&self) -> Option<u64> {
        match self {
            Self::Unsecure(_) => None,
            Self::Secure(s) => Some(s.peer_node_id),
        }
    }

    /// Attestation challenge of a secure session
    #[must_use]
    pub fn attestation_challenge(&self) -> Option<&[u8; 16]> {
        match self {
            Self::Unsecure(_) => None,
            Self::Secure(s) => Some(&s.attestation_challenge),
        }
    }

    /// Reliability parameters
    #[must_use]
    pub fn parameters(&self) -> SessionParameters {
        match self {
            Self::Unsecure(s) => s.parameters,
            Self::Secure(s) => s.parameters,
        }
    }

    /// Next message id; wraps at 2^32
    pub fn next_message_id(&self) -> u32 {
        let counter = match self {
            Self::Unsecure(s) => &s.message_counter,
            Self::Secure(s) => &s.message_counter,
        };
        counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Frame (and for secure sessions encrypt) an outgoing message.
    ///
    /// The packet's session id is replaced with the peer's id for this session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Crypto`] if encryption fails.
    pub fn encode(&self, mut message: Message) -> Result<Packet, SessionError> {
        message.packet_header.session_id = self.peer_session_id();
        message.packet_header.session_type = SessionType::Unicast;

        match self {
            Self::Unsecure(_) => Ok(encode_payload(&message)),
            Self::Secure(s) => {
                let mut packet = encode_payload(&message);
                let header = packet.header;
                let nonce = Nonce::for_message(
                    header.security_flags(),
                    header.message_id,
                    Some(s.local_node_id),
                );
                let aad = encode_packet_header(&header);
                s.encrypt_key
                    .encrypt_in_place(&nonce, &mut packet.payload, &aad)?;
                Ok(packet)
            }
        }
    }

    /// Decrypt (for secure sessions) and parse an incoming packet.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AuthenticationFailed`] if the tag does not
    /// verify, and [`SessionError::Codec`] for a malformed payload header.
    pub fn decode(&self, packet: &Packet) -> Result<Message, SessionError> {
        match self {
            Self::Unsecure(_) => Ok(decode_payload(packet)?),
            Self::Secure(s) => {
                if packet.payload.len() < TAG_SIZE {
                    return Err(SessionError::PayloadTooShort(packet.payload.len()));
                }
                let header = packet.header;
                let nonce = Nonce::for_message(
                    header.security_flags(),
                    header.message_id,
                    Some(s.peer_node_id),
                );
                let aad = encode_packet_header(&header);
                let plaintext = s
                    .decrypt_key
                    .decrypt(&nonce, &packet.payload, &aad)
                    .map_err(|_| SessionError::AuthenticationFailed(s.local_session_id))?;
                Ok(decode_payload(&Packet {
                    header,
                    payload: plaintext,
                })?)
            }
        }
    }
}

/// Registry of live sessions, keyed by local session id.
#[derive(Debug)]
pub struct SessionTable {
    sessions: DashMap<u16, Arc<Session>>,
    reserved: DashSet<u16>,
    parameters: SessionParameters,
}

impl SessionTable {
    /// Create a table holding only the unsecured session.
    #[must_use]
    pub fn new(parameters: SessionParameters) -> Self {
        let sessions = DashMap::new();
        sessions.insert(
            UNSECURED_SESSION_ID,
            Arc::new(Session::Unsecure(UnsecureSession {
                message_counter: AtomicU32::new(initial_counter()),
                parameters,
            })),
        );
        Self {
            sessions,
            reserved: DashSet::new(),
            parameters,
        }
    }

    /// Local reliability parameters
    #[must_use]
    pub fn parameters(&self) -> SessionParameters {
        self.parameters
    }

    /// The unsecured session
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] only if the table was tampered with.
    pub fn unsecure_session(&self) -> Result<Arc<Session>, SessionError> {
        self.get(UNSECURED_SESSION_ID)
    }

    /// Look up a session by local id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] if no session has this id.
    pub fn get(&self, session_id: u16) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(&session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SessionError::UnknownSession(session_id))
    }

    /// Reserve an unused non-zero session id for an in-progress handshake.
    ///
    /// Scans linearly from a random start. Release the id with
    /// [`SessionTable::release_session_id`] if the handshake fails.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionIdsExhausted`] if every id is taken.
    pub fn allocate_session_id(&self) -> Result<u16, SessionError> {
        let start = (OsRng.next_u32() & 0xFFFF) as u16;
        (0..=u16::MAX)
            .map(|offset| start.wrapping_add(offset))
            .find(|&id| {
                id != UNSECURED_SESSION_ID
                    && !self.sessions.contains_key(&id)
                    && self.reserved.insert(id)
            })
            .ok_or(SessionError::SessionIdsExhausted)
    }

    /// Give back a reserved id that never became a session.
    pub fn release_session_id(&self, session_id: u16) {
        self.reserved.remove(&session_id);
    }

    /// Derive keys and register a secure session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Crypto`] if key derivation fails.
    pub fn create_secure_session(
        &self,
        params: NewSecureSession<'_>,
    ) -> Result<Arc<Session>, SessionError> {
        let keys = SessionKeys::derive(params.shared_secret, params.salt, params.is_initiator)?;
        let session = Arc::new(Session::Secure(SecureSession {
            local_session_id: params.local_session_id,
            peer_session_id: params.peer_session_id,
            local_node_id: params.local_node_id,
            peer_node_id: params.peer_node_id,
            is_initiator: params.is_initiator,
            encrypt_key: AeadKey::new(keys.encrypt_key),
            decrypt_key: AeadKey::new(keys.decrypt_key),
            attestation_challenge: keys.attestation_challenge,
            message_counter: AtomicU32::new(initial_counter()),
            parameters: params.parameters,
        }));

        self.sessions
            .insert(params.local_session_id, Arc::clone(&session));
        self.reserved.remove(&params.local_session_id);
        debug!(
            local = params.local_session_id,
            peer = params.peer_session_id,
            initiator = params.is_initiator,
            "secure session created"
        );
        Ok(session)
    }

    /// Remove a secure session. The unsecured session cannot be removed.
    pub fn remove(&self, session_id: u16) -> Option<Arc<Session>> {
        if session_id == UNSECURED_SESSION_ID {
            return None;
        }
        self.sessions.remove(&session_id).map(|(_, session)| session)
    }

    /// Number of secure sessions
    #[must_use]
    pub fn secure_session_count(&self) -> usize {
        self.sessions.len() - 1
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new(SessionParameters::default())
    }
}
