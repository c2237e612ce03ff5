//! CASE message layouts, including the encrypted and signed inner blobs.

use crate::error::TlvError;
use crate::pase::messages::{mrp_from, mrp_value};
use crate::session::{MRP_PARAMETERS_SCHEMA, SessionParameters};
use crate::tlv::{FieldType, FieldValue, Record, StructSchema, TlvMessage};
use std::sync::LazyLock;

static SIGMA1_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("Sigma1")
        .field("initiatorRandom", 1, FieldType::Bytes)
        .field("initiatorSessionId", 2, FieldType::Unsigned)
        .field("destinationId", 3, FieldType::Bytes)
        .field("initiatorEphPubKey", 4, FieldType::Bytes)
        .optional("mrpParameters", 5, FieldType::Struct(&MRP_PARAMETERS_SCHEMA))
        .build()
});

static SIGMA2_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("Sigma2")
        .field("responderRandom", 1, FieldType::Bytes)
        .field("responderSessionId", 2, FieldType::Unsigned)
        .field("responderEphPubKey", 3, FieldType::Bytes)
        .field("encrypted2", 4, FieldType::Bytes)
        .optional("mrpParameters", 5, FieldType::Struct(&MRP_PARAMETERS_SCHEMA))
        .build()
});

static SIGMA3_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("Sigma3")
        .field("encrypted3", 1, FieldType::Bytes)
        .build()
});

static TBE_DATA2_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("TbeData2")
        .field("certificate", 1, FieldType::Bytes)
        .optional("intermediateCertificate", 2, FieldType::Bytes)
        .field("signature", 3, FieldType::Bytes)
        .field("resumptionId", 4, FieldType::Bytes)
        .build()
});

static TBE_DATA3_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("TbeData3")
        .field("certificate", 1, FieldType::Bytes)
        .optional("intermediateCertificate", 2, FieldType::Bytes)
        .field("signature", 3, FieldType::Bytes)
        .build()
});

static TBS_DATA_SCHEMA: LazyLock<StructSchema> = LazyLock::new(|| {
    StructSchema::builder("TbsData")
        .field("certificate", 1, FieldType::Bytes)
        .optional("intermediateCertificate", 2, FieldType::Bytes)
        .field("senderEphPubKey", 3, FieldType::Bytes)
        .field("receiverEphPubKey", 4, FieldType::Bytes)
        .build()
});

fn opt_bytes_value(bytes: Option<&Vec<u8>>) -> Option<FieldValue> {
    bytes.map(|b| FieldValue::Bytes(b.clone()))
}

/// First CASE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sigma1 {
    /// Initiator nonce
    pub initiator_random: [u8; 32],
    /// Session id the initiator wants to be addressed by
    pub initiator_session_id: u16,
    /// Blinded identifier of the target fabric and node
    pub destination_id: [u8; 32],
    /// Initiator ephemeral ECDH key
    pub initiator_eph_pub_key: [u8; 65],
    /// Initiator reliability parameters
    pub mrp_parameters: Option<SessionParameters>,
}

impl TlvMessage for Sigma1 {
    fn schema() -> &'static StructSchema {
        &SIGMA1_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("initiatorRandom", FieldValue::Bytes(self.initiator_random.to_vec()))
            .with(
                "initiatorSessionId",
                FieldValue::Unsigned(u64::from(self.initiator_session_id)),
            )
            .with("destinationId", FieldValue::Bytes(self.destination_id.to_vec()))
            .with(
                "initiatorEphPubKey",
                FieldValue::Bytes(self.initiator_eph_pub_key.to_vec()),
            )
            .with_opt("mrpParameters", mrp_value(self.mrp_parameters.as_ref()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            initiator_random: record.byte_array("initiatorRandom")?,
            initiator_session_id: record.unsigned("initiatorSessionId")?,
            destination_id: record.byte_array("destinationId")?,
            initiator_eph_pub_key: record.byte_array("initiatorEphPubKey")?,
            mrp_parameters: mrp_from(record)?,
        })
    }
}

/// Second CASE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sigma2 {
    /// Responder nonce
    pub responder_random: [u8; 32],
    /// Session id the responder wants to be addressed by
    pub responder_session_id: u16,
    /// Responder ephemeral ECDH key
    pub responder_eph_pub_key: [u8; 65],
    /// [`TbeData2`] sealed under the sigma2 key
    pub encrypted2: Vec<u8>,
    /// Responder reliability parameters
    pub mrp_parameters: Option<SessionParameters>,
}

impl TlvMessage for Sigma2 {
    fn schema() -> &'static StructSchema {
        &SIGMA2_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("responderRandom", FieldValue::Bytes(self.responder_random.to_vec()))
            .with(
                "responderSessionId",
                FieldValue::Unsigned(u64::from(self.responder_session_id)),
            )
            .with(
                "responderEphPubKey",
                FieldValue::Bytes(self.responder_eph_pub_key.to_vec()),
            )
            .with("encrypted2", FieldValue::Bytes(self.encrypted2.clone()))
            .with_opt("mrpParameters", mrp_value(self.mrp_parameters.as_ref()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            responder_random: record.byte_array("responderRandom")?,
            responder_session_id: record.unsigned("responderSessionId")?,
            responder_eph_pub_key: record.byte_array("responderEphPubKey")?,
            encrypted2: record.bytes("encrypted2")?.to_vec(),
            mrp_parameters: mrp_from(record)?,
        })
    }
}

/// Third CASE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sigma3 {
    /// [`TbeData3`] sealed under the sigma3 key
    pub encrypted3: Vec<u8>,
}

impl TlvMessage for Sigma3 {
    fn schema() -> &'static StructSchema {
        &SIGMA3_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new().with("encrypted3", FieldValue::Bytes(self.encrypted3.clone()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            encrypted3: record.bytes("encrypted3")?.to_vec(),
        })
    }
}

/// Responder credentials, encrypted inside Sigma2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbeData2 {
    /// Responder operational certificate
    pub certificate: Vec<u8>,
    /// Responder intermediate certificate
    pub intermediate_certificate: Option<Vec<u8>>,
    /// Signature over the responder [`TbsData`]
    pub signature: [u8; 64],
    /// Resumption id for a later resumed session
    pub resumption_id: [u8; 16],
}

impl TlvMessage for TbeData2 {
    fn schema() -> &'static StructSchema {
        &TBE_DATA2_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("certificate", FieldValue::Bytes(self.certificate.clone()))
            .with_opt(
                "intermediateCertificate",
                opt_bytes_value(self.intermediate_certificate.as_ref()),
            )
            .with("signature", FieldValue::Bytes(self.signature.to_vec()))
            .with("resumptionId", FieldValue::Bytes(self.resumption_id.to_vec()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            certificate: record.bytes("certificate")?.to_vec(),
            intermediate_certificate: record
                .opt_bytes("intermediateCertificate")?
                .map(<[u8]>::to_vec),
            signature: record.byte_array("signature")?,
            resumption_id: record.byte_array("resumptionId")?,
        })
    }
}

/// Initiator credentials, encrypted inside Sigma3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbeData3 {
    /// Initiator operational certificate
    pub certificate: Vec<u8>,
    /// Initiator intermediate certificate
    pub intermediate_certificate: Option<Vec<u8>>,
    /// Signature over the initiator [`TbsData`]
    pub signature: [u8; 64],
}

impl TlvMessage for TbeData3 {
    fn schema() -> &'static StructSchema {
        &TBE_DATA3_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("certificate", FieldValue::Bytes(self.certificate.clone()))
            .with_opt(
                "intermediateCertificate",
                opt_bytes_value(self.intermediate_certificate.as_ref()),
            )
            .with("signature", FieldValue::Bytes(self.signature.to_vec()))
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            certificate: record.bytes("certificate")?.to_vec(),
            intermediate_certificate: record
                .opt_bytes("intermediateCertificate")?
                .map(<[u8]>::to_vec),
            signature: record.byte_array("signature")?,
        })
    }
}

/// Data covered by a sigma signature; never sent on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbsData {
    /// Signer certificate
    pub certificate: Vec<u8>,
    /// Signer intermediate certificate
    pub intermediate_certificate: Option<Vec<u8>>,
    /// Signer ephemeral key
    pub sender_eph_pub_key: [u8; 65],
    /// Peer ephemeral key
    pub receiver_eph_pub_key: [u8; 65],
}

impl TlvMessage for TbsData {
    fn schema() -> &'static StructSchema {
        &TBS_DATA_SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("certificate", FieldValue::Bytes(self.certificate.clone()))
            .with_opt(
                "intermediateCertificate",
                opt_bytes_value(self.intermediate_certificate.as_ref()),
            )
            .with("senderEphPubKey", FieldValue::Bytes(self.sender_eph_pub_key.to_vec()))
            .with(
                "receiverEphPubKey",
                FieldValue::Bytes(self.receiver_eph_pub_key.to_vec()),
            )
    }

    fn from_record(record: &Record) -> Result<Self, TlvError> {
        Ok(Self {
            certificate: record.bytes("certificate")?.to_vec(),
            intermediate_certificate: record
                .opt_bytes("intermediateCertificate")?
                .map(<[u8]>::to_vec),
            sender_eph_pub_key: record.byte_array("senderEphPubKey")?,
            receiver_eph_pub_key: record.byte_array("receiverEphPubKey")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigma1_layout() {
        let sigma1 = Sigma1 {
            initiator_random: [0x11; 32],
            initiator_session_id: 7,
            destination_id: [0x22; 32],
            initiator_eph_pub_key: [0x04; 65],
            mrp_parameters: None,
        };
        let bytes = sigma1.encode().unwrap();
        // 15 | 30 01 20 <32> | 24 02 07 | 30 03 20 <32> | 30 04 41 <65> | 18
        assert_eq!(bytes.len(), 1 + 35 + 3 + 35 + 68 + 1);
        assert_eq!(&bytes[36..39], &[0x24, 0x02, 0x07]);
        assert_eq!(&bytes[74..77], &[0x30, 0x04, 0x41]);
        assert_eq!(Sigma1::decode(&bytes).unwrap(), sigma1);
    }

    #[test]
    fn test_tbe_data2_without_intermediate() {
        let tbe = TbeData2 {
            certificate: vec![1, 2, 3],
            intermediate_certificate: None,
            signature: [9; 64],
            resumption_id: [5; 16],
        };
        let record = TbeData2::schema().decode(&tbe.encode().unwrap()).unwrap();
        assert!(record.get("intermediateCertificate").is_none());
        assert_eq!(TbeData2::from_record(&record).unwrap(), tbe);
    }

    #[test]
    fn test_sigma2_keeps_mrp_parameters() {
        let sigma2 = Sigma2 {
            responder_random: [3; 32],
            responder_session_id: 0xBEEF,
            responder_eph_pub_key: [4; 65],
            encrypted2: vec![0xEE; 40],
            mrp_parameters: Some(SessionParameters::default()),
        };
        let decoded = Sigma2::decode(&sigma2.encode().unwrap()).unwrap();
        assert_eq!(decoded.mrp_parameters, sigma2.mrp_parameters);
        assert_eq!(decoded.encrypted2.len(), 40);
    }

    #[test]
    fn test_tbs_data_signed_bytes_depend_on_key_order() {
        let ours = TbsData {
            certificate: vec![1],
            intermediate_certificate: None,
            sender_eph_pub_key: [1; 65],
            receiver_eph_pub_key: [2; 65],
        };
        let swapped = TbsData {
            sender_eph_pub_key: [2; 65],
            receiver_eph_pub_key: [1; 65],
            ..ours.clone()
        };
        assert_ne!(ours.encode().unwrap(), swapped.encode().unwrap());
    }
}
