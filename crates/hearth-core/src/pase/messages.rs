//! PASE message layouts.

use crate::error::TlvError;
use crate::session::{MRP_PARAMETERS_SCHEMA, SessionParameters};
use crate::tlv::{FieldType, FieldValue, Record, StructSchema, TlvMessage};
use std::sync::LazyLock;

static PBKDF_PARAMETERS_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("PbkdfParameters")
        .field("iterations", 1, FieldType::Unsigned)
        .field("salt", 2, FieldType::Bytes)
        .build()
});

static PBKDF_PARAM_REQUEST_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("PbkdfParamRequest")
        .field("initiatorRandom", 1, FieldType::Bytes)
        .field("initiatorSessionId", 2, FieldType::Unsigned)
        .field("passcodeId", 3, FieldType::Unsigned)
        .field("hasPbkdfParameters", 4, FieldType::Bool)
        .optional("mrpParameters", 5, FieldType::Struct(&MRP_PARAMETERS_SCHEMA))
        .build()
});

static PBKDF_PARAM_RESPONSE_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("PbkdfParamResponse")
        .field("initiatorRandom", 1, FieldType::Bytes)
        .field("responderRandom", 2, FieldType::Bytes)
        .field("responderSessionId", 3, FieldType::Unsigned)
        .optional("pbkdfParameters", 4, FieldType::Struct(&PBKDF_PARAMETERS_SCHEMA))
        .optional("mrpParameters", 5, FieldType::Struct(&MRP_PARAMETERS_SCHEMA))
        .build()
});

static PAKE1_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("Pake1")
        .field("x", 1, FieldType::Bytes)
        .build()
});

static PAKE2_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("Pake2")
        .field("y", 1, FieldType::Bytes)
        .field("verifier", 2, FieldType::Bytes)
        .build()
});

static PAKE3_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("Pake3")
        .field("verifier", 1, FieldType::Bytes)
        .build()
});

pub(crate) fn mrp_value(parameters: Option<&SessionParameters>) -> Option<FieldValue> {
    parameters.map(|p| FieldValue::Struct(p.to_record()))
}

pub(crate) fn mrp_from(record: &Record) -> Result<Option<SessionParameters>, TlvError> {
    record
        .opt_record("mrpParameters")?
        .map(|r| SessionParameters::from_record(r, SessionParameters::default()))
        .transpose()
}

/// PBKDF2 inputs the responder hands to the initiator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbkdfParameters {
    /// PBKDF2 iteration count
    pub iterations: u32,
    /// PBKDF2 salt
    pub salt: Vec<u8>,
}

/// First PASE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbkdfParamRequest {
    /// Initiator nonce
    pub initiator_random: [u8; 32],
    /// Session id the initiator wants to be addressed by
    pub initiator_session_id: u16,
    /// Passcode slot, always the default
    pub passcode_id: u16,
    /// Whether the initiator already knows the PBKDF parameters
    pub has_pbkdf_parameters: bool,
    /// Initiator reliability parameters
    pub mrp_parameters: Option<SessionParameters>,
}

impl TlvMessage for PbkdfParamRequest {
    fn schema() -> &'static StructSchema {
        &PBKDF_PARAM_REQUEST_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("initiatorRandom", FieldValue::Bytes(self.initiator_random.to_vec()))
            .with(
                "initiatorSessionId",
                FieldValue::Unsigned(u64::from(self.initiator_session_id)),
            )
            .with("passcodeId", FieldValue::Unsigned(u64::from(self.passcode_id)))
            .with("hasPbkdfParameters", FieldValue::Bool(self.has_pbkdf_parameters))
            .with_opt("mrpParameters", mrp_value(self.mrp_parameters.as_ref()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            initiator_random: record.byte_array("initiatorRandom")?,
            initiator_session_id: record.unsigned("initiatorSessionId")?,
            passcode_id: record.unsigned("passcodeId")?,
            has_pbkdf_parameters: record.boolean("hasPbkdfParameters")?,
            mrp_parameters: mrp_from(record)?,
        })
    }
}

/// Second PASE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbkdfParamResponse {
    /// Echo of the initiator nonce
    pub initiator_random: [u8; 32],
    /// Responder nonce
    pub responder_random: [u8; 32],
    /// Session id the responder wants to be addressed by
    pub responder_session_id: u16,
    /// Present unless the initiator said it already has them
    pub pbkdf_parameters: Option<PbkdfParameters>,
    /// Responder reliability parameters
    pub mrp_parameters: Option<SessionParameters>,
}

impl TlvMessage for PbkdfParamResponse {
    fn schema() -> &'static StructSchema {
        &PBKDF_PARAM_RESPONSE_SCHEMA
    }

    fn to_record(&self) -> Record {
        let pbkdf = self.pbkdf_parameters.as_ref().map(|p| {
            FieldValue::Struct(
                Record::new()
                    .with("iterations", FieldValue::Unsigned(u64::from(p.iterations)))
                    .with("salt", FieldValue::Bytes(p.salt.clone())),
            )
        });
        Record::new()
            .with("initiatorRandom", FieldValue::Bytes(self.initiator_random.to_vec()))
            .with("responderRandom", FieldValue::Bytes(self.responder_random.to_vec()))
            .with(
                "responderSessionId",
                FieldValue::Unsigned(u64::from(self.responder_session_id)),
            )
            .with_opt("pbkdfParameters", pbkdf)
            .with_opt("mrpParameters", mrp_value(self.mrp_parameters.as_ref()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        let pbkdf_parameters = match record.opt_record("pbkdfParameters")? {
            Some(p) => Some(PbkdfParameters {
                iterations: p.unsigned("iterations")?,
                salt: p.bytes("salt")?.to_vec(),
            }),
            None => None,
        };
        Ok(Self {
            initiator_random: record.byte_array("initiatorRandom")?,
            responder_random: record.byte_array("responderRandom")?,
            responder_session_id: record.unsigned("responderSessionId")?,
            pbkdf_parameters,
            mrp_parameters: mrp_from(record)?,
        })
    }
}

/// Prover share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pake1 {
    /// `X`, uncompressed SEC1 point
    pub x: [u8; 65],
}

impl TlvMessage for Pake1 {
    fn schema() -> &'static StructSchema {
        &PAKE1_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new().with("x", FieldValue::Bytes(self.x.to_vec()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            x: record.byte_array("x")?,
        })
    }
}

/// Verifier share and confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pake2 {
    /// `Y`, uncompressed SEC1 point
    pub y: [u8; 65],
    /// `hBX`
    pub verifier: [u8; 32],
}

impl TlvMessage for Pake2 {
    fn schema() -> &'static StructSchema {
        &PAKE2_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("y", FieldValue::Bytes(self.y.to_vec()))
            .with("verifier", FieldValue::Bytes(self.verifier.to_vec()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            y: record.byte_array("y")?,
            verifier: record.byte_array("verifier")?,
        })
    }
}

/// Prover confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pake3 {
    /// `hAY`
    pub verifier: [u8; 32],
}

impl TlvMessage for Pake3 {
    fn schema() -> &'static StructSchema {
        &PAKE3_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new().with("verifier", FieldValue::Bytes(self.verifier.to_vec()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            verifier: record.byte_array("verifier")?,
        })
    }
}
