//! Boundary-behavior integration tests for the framing codecs (C1).
//!
//! Covers the round-trip laws and size-boundary behaviors from `spec.md`
//! §8: handshake frames cap at 64 KiB of base64, encrypted frames at
//! 1,400 KiB, and both reject anything larger with `ProtocolError`.

use relais_agent::error::TunnelErrorKind;
use relais_agent::framing::{FrameDecoder, FrameEncoder, MAX_ENCRYPTED_FRAME_LEN, MAX_HANDSHAKE_FRAME_LEN};
use serde_json::{json, Value};
use std::io::Cursor;

/// Build a JSON object whose serialized form is exactly `target_bytes` long
/// by padding a string field.
fn json_of_byte_len(target_bytes: usize) -> Value {
    let prefix = json!({"command": "SECURE_INIT", "client_public_key": "", "pad": ""}).to_string().len();
    let pad_len = target_bytes.saturating_sub(prefix);
    json!({"command": "SECURE_INIT", "client_public_key": "", "pad": "a".repeat(pad_len)})
}

#[tokio::test]
async fn handshake_frame_at_the_64kib_base64_boundary_round_trips() {
    // Pick a JSON payload whose base64 encoding lands close to but under
    // the 64 KiB base64-length cap.
    let payload = json_of_byte_len(64 * 1024 * 3 / 4 - 256);

    let mut enc = FrameEncoder::new(Vec::new());
    enc.encode_handshake_json(&payload).await.unwrap();
    let buf = enc.into_inner();

    let mut dec = FrameDecoder::new(Cursor::new(buf));
    let decoded = dec.decode_handshake_json().await.unwrap();
    assert_eq!(decoded, payload);
}

#[tokio::test]
async fn handshake_frame_over_64kib_base64_is_protocol_error() {
    let mut buf = Vec::new();
    buf.push(0x00u8);
    buf.extend_from_slice(&((MAX_HANDSHAKE_FRAME_LEN + 1) as u32).to_be_bytes());
    buf.extend(std::iter::repeat(b'A').take(MAX_HANDSHAKE_FRAME_LEN + 1));

    let mut dec = FrameDecoder::new(Cursor::new(buf));
    let err = dec.decode_handshake_json().await.unwrap_err();
    assert!(matches!(err, TunnelErrorKind::ProtocolError(_)));
}

#[tokio::test]
async fn encrypted_record_frame_over_1400kib_base64_is_protocol_error() {
    let mut buf = Vec::new();
    buf.push(0x00u8);
    buf.extend_from_slice(&((MAX_ENCRYPTED_FRAME_LEN + 1) as u32).to_be_bytes());
    buf.extend(std::iter::repeat(b'A').take(MAX_ENCRYPTED_FRAME_LEN + 1));

    let mut dec = FrameDecoder::new(Cursor::new(buf));
    let err = dec.decode_encrypted_record().await.unwrap_err();
    assert!(matches!(err, TunnelErrorKind::ProtocolError(_)));
}

#[tokio::test]
async fn encrypted_record_frame_within_bound_round_trips() {
    let record: Vec<u8> = (0..2048u32).map(|i| (i % 256) as u8).collect();

    let mut enc = FrameEncoder::new(Vec::new());
    enc.encode_encrypted_record(&record).await.unwrap();
    let buf = enc.into_inner();

    let mut dec = FrameDecoder::new(Cursor::new(buf));
    let decoded = dec.decode_encrypted_record().await.unwrap();
    assert_eq!(decoded, record);
}
