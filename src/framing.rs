//! Framing codecs — `spec.md` §4.1 (C1).
//!
//! Three framings coexist on the control stream over the lifetime of a
//! session: a binary handshake frame, an encrypted message frame (same wire
//! layout, different payload semantics and size bound), and a legacy
//! plaintext line frame used only when encryption is disabled.
//!
//! `FrameDecoder` owns a persistent read buffer so bytes belonging to the
//! *next* frame — possibly arriving in the same TCP read as the frame being
//! decoded — are never lost between calls (required because the server's
//! handshake reply and the first encrypted message may share one read).
//! Only one decode call may be outstanding on a given decoder at a time;
//! holding `&mut FrameDecoder` for the duration of a call is how this crate
//! enforces the "decoders are single-producer" rule from `spec.md` §4.1 —
//! the borrow checker refuses a second concurrent call.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TunnelErrorKind;

/// `spec.md` §4.1 framing 1: handshake frames cap the base64 length at 64 KiB.
pub const MAX_HANDSHAKE_FRAME_LEN: usize = 64 * 1024;
/// `spec.md` §4.1 framing 2: encrypted frames cap the base64 length at 1,400 KiB.
pub const MAX_ENCRYPTED_FRAME_LEN: usize = 1_400 * 1024;

const MAGIC: u8 = 0x00;
const HEADER_LEN: usize = 1 + 4; // magic byte + u32-BE length

fn protocol_err(msg: impl Into<String>) -> TunnelErrorKind {
    TunnelErrorKind::ProtocolError(msg.into())
}

/// Reads frames off a control-channel stream, retaining any bytes read past
/// a frame boundary for the next call.
pub struct FrameDecoder<R> {
    reader: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::new(),
        }
    }

    /// Read from the socket until at least `n` bytes are buffered.
    ///
    /// EOF with an empty buffer is a clean server closure (`Closed`); EOF
    /// with a partial frame buffered is a protocol violation, per
    /// `spec.md` §4.1 ("incomplete-after-EOF").
    async fn fill_at_least(&mut self, n: usize) -> Result<(), TunnelErrorKind> {
        let mut chunk = [0u8; 8192];
        while self.buf.len() < n {
            let read = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(|e| TunnelErrorKind::NetworkError(e.to_string()))?;
            if read == 0 {
                return if self.buf.is_empty() {
                    Err(TunnelErrorKind::Closed { by_server: true })
                } else {
                    Err(protocol_err("connection closed mid-frame"))
                };
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }

    /// Decode one `0x00 | u32-BE LEN | base64(...)` frame and return the
    /// raw bytes of `base64::decode(...)`. `max_len` bounds the base64
    /// string length (not the decoded length), matching `spec.md` §4.1's
    /// "Maximum base64 length" wording.
    pub async fn decode_binary(&mut self, max_len: usize) -> Result<Vec<u8>, TunnelErrorKind> {
        self.fill_at_least(HEADER_LEN).await?;
        if self.buf[0] != MAGIC {
            return Err(protocol_err("bad magic byte in binary frame"));
        }
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
        if len > max_len {
            return Err(protocol_err(format!(
                "frame length {len} exceeds maximum {max_len}"
            )));
        }
        self.fill_at_least(HEADER_LEN + len).await?;
        let b64 = &self.buf[HEADER_LEN..HEADER_LEN + len];
        let decoded = STANDARD
            .decode(b64)
            .map_err(|e| protocol_err(format!("invalid base64: {e}")))?;
        self.buf.advance(HEADER_LEN + len);
        Ok(decoded)
    }

    /// Decode one handshake-framed JSON value (`spec.md` §4.1 framing 1).
    pub async fn decode_handshake_json(&mut self) -> Result<Value, TunnelErrorKind> {
        let raw = self.decode_binary(MAX_HANDSHAKE_FRAME_LEN).await?;
        serde_json::from_slice(&raw).map_err(|e| protocol_err(format!("invalid JSON: {e}")))
    }

    /// Decode one encrypted record (`spec.md` §4.1 framing 2): returns the
    /// raw `NONCE(12) || CIPHERTEXT || TAG(16)` bytes for `crypto.rs` to
    /// decrypt.
    pub async fn decode_encrypted_record(&mut self) -> Result<Vec<u8>, TunnelErrorKind> {
        self.decode_binary(MAX_ENCRYPTED_FRAME_LEN).await
    }

    /// Decode one `\n`-terminated JSON line (`spec.md` §4.1 framing 3,
    /// legacy / encryption-disabled only).
    pub async fn decode_line_json(&mut self) -> Result<Value, TunnelErrorKind> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                let line = &line[..line.len() - 1];
                return serde_json::from_slice(line)
                    .map_err(|e| protocol_err(format!("invalid JSON line: {e}")));
            }
            self.fill_at_least(self.buf.len() + 1).await?;
        }
    }

    /// Peek the next frame's leading byte without consuming it, to decide
    /// whether an incoming message is binary-framed (`0x00` magic) or a
    /// legacy JSON line. Used by the RUNNING loop once a session may
    /// receive either framing kind in principle (it never will in
    /// practice post-handshake, but the check is cheap and explicit).
    pub async fn peek_is_binary(&mut self) -> Result<bool, TunnelErrorKind> {
        self.fill_at_least(1).await?;
        Ok(self.buf[0] == MAGIC)
    }

    /// Return ownership of the underlying reader, discarding any buffered
    /// bytes. Used during teardown.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes frames onto a control-channel stream.
pub struct FrameEncoder<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    async fn write_binary(&mut self, raw: &[u8]) -> Result<(), TunnelErrorKind> {
        let b64 = STANDARD.encode(raw);
        let len = b64.len() as u32;
        let mut frame = Vec::with_capacity(HEADER_LEN + b64.len());
        frame.push(MAGIC);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(b64.as_bytes());
        self.writer
            .write_all(&frame)
            .await
            .map_err(|e| TunnelErrorKind::NetworkError(e.to_string()))
    }

    /// Encode and send a handshake-framed JSON value.
    pub async fn encode_handshake_json(&mut self, value: &Value) -> Result<(), TunnelErrorKind> {
        let json = serde_json::to_vec(value)
            .map_err(|e| protocol_err(format!("failed to serialize handshake JSON: {e}")))?;
        self.write_binary(&json).await
    }

    /// Encode and send a raw encrypted record
    /// (`NONCE(12) || CIPHERTEXT || TAG(16)`, produced by `crypto.rs`).
    pub async fn encode_encrypted_record(&mut self, record: &[u8]) -> Result<(), TunnelErrorKind> {
        self.write_binary(record).await
    }

    /// Encode and send a legacy `\n`-terminated JSON line.
    pub async fn encode_line_json(&mut self, value: &Value) -> Result<(), TunnelErrorKind> {
        let mut line = serde_json::to_vec(value)
            .map_err(|e| protocol_err(format!("failed to serialize JSON line: {e}")))?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| TunnelErrorKind::NetworkError(e.to_string()))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
