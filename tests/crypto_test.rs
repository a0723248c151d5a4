//! Integration tests for the secure channel (C2), exercising the public
//! handshake/encrypt/decrypt API the way `session.rs` actually drives it:
//! two independently generated ephemeral keypairs, completing the
//! handshake from each side's perspective, then exchanging records.

use relais_agent::crypto::PendingHandshake;
use relais_agent::error::TunnelErrorKind;

#[test]
fn many_messages_round_trip_with_independent_random_nonces() {
    let client = PendingHandshake::generate();
    let server = PendingHandshake::generate();
    let client_pub = client.client_public_key_b64().to_string();
    let server_pub = server.client_public_key_b64().to_string();

    let client_channel = client.complete(&server_pub).unwrap();
    let server_channel = server.complete(&client_pub).unwrap();

    let mut records = Vec::new();
    for i in 0..32u32 {
        let msg = format!("{{\"command\":\"NEWCONN\",\"conn_id\":\"c{i}\"}}");
        let record = client_channel.encrypt(msg.as_bytes()).unwrap();
        let decrypted = server_channel.decrypt(&record).unwrap();
        assert_eq!(decrypted, msg.as_bytes());
        records.push(record);
    }

    // Every record carries its own fresh nonce (`spec.md` §4.2: "fresh
    // random nonce per message"); no two 12-byte nonce prefixes collide
    // across 32 draws.
    let nonces: std::collections::HashSet<&[u8]> =
        records.iter().map(|r| &r[..12]).collect();
    assert_eq!(nonces.len(), records.len());
}

#[test]
fn large_payload_near_the_1400kib_frame_bound_round_trips() {
    let client = PendingHandshake::generate();
    let server = PendingHandshake::generate();
    let client_pub = client.client_public_key_b64().to_string();
    let server_pub = server.client_public_key_b64().to_string();

    let client_channel = client.complete(&server_pub).unwrap();
    let server_channel = server.complete(&client_pub).unwrap();

    let payload: Vec<u8> = (0..1_390 * 1024u32).map(|i| (i % 256) as u8).collect();
    let record = client_channel.encrypt(&payload).unwrap();
    let decrypted = server_channel.decrypt(&record).unwrap();
    assert_eq!(decrypted, payload);
}

#[test]
fn channel_is_unusable_without_completing_the_handshake() {
    // `PendingHandshake` has no encrypt/decrypt of its own — a session can
    // only reach those through `complete()`, so an unkeyed send is a
    // compile-time impossibility rather than a runtime check. This test
    // documents that invariant by exercising the only path that exists:
    // a handshake against a bogus peer key fails cleanly as a crypto error
    // rather than silently producing a channel.
    let client = PendingHandshake::generate();
    let err = client.complete("not-valid-base64!!!").unwrap_err();
    assert!(matches!(err, TunnelErrorKind::CryptoError(_)));
}
