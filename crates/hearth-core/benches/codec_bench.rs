//! Performance benchmarks for the hearth-core codecs.
//!
//! Run with: `cargo bench -p hearth-core`

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hearth_core::codec::{
    Destination, Message, PacketHeader, PayloadHeader, decode_packet, decode_payload, encode_packet,
    encode_payload,
};
use hearth_core::pase::messages::PbkdfParamRequest;
use hearth_core::session::{SessionParameters, SessionTable};
use hearth_core::tlv::{self, TlvMessage};

fn sample_message() -> Message {
    Message {
        packet_header: PacketHeader {
            session_id: 0x1234,
            message_id: 0x0102_0304,
            source_node_id: Some(0x1122_3344_5566_7788),
            destination: Some(Destination::Node(0x8877_6655_4433_2211)),
            ..PacketHeader::default()
        },
        payload_header: PayloadHeader {
            exchange_id: 7,
            protocol_id: 0xFFF1_0001,
            message_type: 0x02,
            is_initiator: true,
            requires_ack: true,
            acked_message_id: Some(0x0A0B_0C0D),
        },
        payload: vec![0xAB; 256],
    }
}

// ============================================================================
// Framing Benchmarks
// ============================================================================

fn bench_framing(c: &mut Criterion) {
    let message = sample_message();
    let bytes = encode_packet(&encode_payload(&message));

    c.bench_function("encode_message", |b| {
        b.iter(|| encode_packet(&encode_payload(black_box(&message))))
    });
    c.bench_function("decode_message", |b| {
        b.iter(|| decode_packet(black_box(&bytes)).and_then(|packet| decode_payload(&packet)))
    });
}

// ============================================================================
// TLV Benchmarks
// ============================================================================

fn bench_tlv(c: &mut Criterion) {
    let request = PbkdfParamRequest {
        initiator_random: [0x5A; 32],
        initiator_session_id: 0x4321,
        passcode_id: 0,
        has_pbkdf_parameters: false,
        mrp_parameters: Some(SessionParameters::default()),
    };
    let bytes = request.encode().unwrap();

    c.bench_function("tlv_schema_encode", |b| b.iter(|| black_box(&request).encode()));
    c.bench_function("tlv_schema_decode", |b| {
        b.iter(|| PbkdfParamRequest::decode(black_box(&bytes)))
    });
    c.bench_function("tlv_element_decode", |b| b.iter(|| tlv::decode(black_box(&bytes))));
}

// ============================================================================
// Session Benchmarks
// ============================================================================

fn bench_secure_session(c: &mut Criterion) {
    let table = SessionTable::new(SessionParameters::default());
    let id = table.allocate_session_id().unwrap();
    let session = table
        .create_secure_session(hearth_core::session::NewSecureSession {
            local_session_id: id,
            peer_session_id: id,
            shared_secret: &[0x42; 32],
            salt: &[],
            is_initiator: true,
            local_node_id: 0,
            peer_node_id: 0,
            parameters: SessionParameters::default(),
        })
        .unwrap();

    c.bench_function("session_encode_256", |b| {
        b.iter(|| session.encode(black_box(sample_message())))
    });
}

criterion_group!(benches, bench_framing, bench_tlv, bench_secure_session);
criterion_main!(benches);
