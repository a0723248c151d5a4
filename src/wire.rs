//! Control-channel message bodies — `spec.md` §6.1.
//!
//! The message set is closed (design note §9: "model as a tagged variant").
//! Transport framing (the `0x00 | LEN | base64(...)` envelope, or the
//! legacy `\n`-terminated line) lives in `src/framing.rs`; this module only
//! describes the JSON payloads those framings carry.

use serde::{Deserialize, Serialize};

/// Client → server: initiate the ECDH handshake. Always sent under the
/// binary handshake framing (`spec.md` §4.1 framing 1), never encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureInit {
    pub command: String, // always "SECURE_INIT"
    pub client_public_key: String,
}

impl SecureInit {
    pub fn new(client_public_key: String) -> Self {
        Self {
            command: "SECURE_INIT".to_string(),
            client_public_key,
        }
    }
}

/// Server → client: handshake acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureAck {
    pub command: String, // always "SECURE_ACK"
    pub status: String,  // "OK" | "ERR"
    #[serde(default)]
    pub server_public_key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SecureAck {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

/// Client → server: request that the relay open a public endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelRequest {
    pub command: String, // always "TUNNEL"
    pub local_port: String,
    pub domain: String,
    pub remote_port: String,
    pub token: String,
    pub protocol: String,
}

impl TunnelRequest {
    pub fn new(
        local_port: u16,
        domain: Option<&str>,
        remote_port: Option<u16>,
        token: Option<&str>,
        protocol: &str,
    ) -> Self {
        Self {
            command: "TUNNEL".to_string(),
            local_port: local_port.to_string(),
            domain: domain.unwrap_or("").to_string(),
            remote_port: remote_port.map(|p| p.to_string()).unwrap_or_default(),
            token: token.unwrap_or("").to_string(),
            protocol: protocol.to_string(),
        }
    }
}

/// Server → client: outcome of a `TunnelRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelResponse {
    pub status: String, // "OK" | "ERR"
    #[serde(default)]
    pub public_addr: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TunnelResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    /// `spec.md` §4.8: a non-OK reply whose `error` mentions "Token" is
    /// reclassified as `AuthError`.
    pub fn is_auth_error(&self) -> bool {
        self.error
            .as_deref()
            .map(|e| e.contains("Token"))
            .unwrap_or(false)
    }
}

/// Server → client: announces a new inbound data channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConn {
    pub command: String, // always "NEWCONN"
    pub conn_id: String,
    pub data_addr: String,
}

/// Server → client: control-channel liveness signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub command: String, // always "HEARTBEAT"
}

/// Closed set of messages the `RUNNING` loop can receive
/// (`spec.md` §4.8 RUNNING table, design note §9 "Dynamic dispatch").
#[derive(Debug, Clone)]
pub enum ControlMessage {
    NewConn(NewConn),
    Heartbeat,
    /// Any other `command` value: logged at debug and ignored.
    Other(String),
}

impl ControlMessage {
    /// Parse a decoded JSON value arriving in the `RUNNING` state.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value.get("command").and_then(|c| c.as_str()) {
            Some("NEWCONN") => {
                match serde_json::from_value::<NewConn>(value.clone()) {
                    Ok(nc) => ControlMessage::NewConn(nc),
                    Err(_) => ControlMessage::Other("NEWCONN".to_string()),
                }
            }
            Some("HEARTBEAT") => ControlMessage::Heartbeat,
            Some(other) => ControlMessage::Other(other.to_string()),
            None => ControlMessage::Other("<no command>".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tunnel_response_detects_token_error() {
        let resp = TunnelResponse {
            status: "ERR".to_string(),
            public_addr: None,
            error: Some("Invalid Token".to_string()),
        };
        assert!(resp.is_auth_error());

        let resp = TunnelResponse {
            status: "ERR".to_string(),
            public_addr: None,
            error: Some("domain already in use".to_string()),
        };
        assert!(!resp.is_auth_error());
    }

    #[test]
    fn control_message_dispatches_on_command() {
        let v = json!({"command": "NEWCONN", "conn_id": "c1", "data_addr": "1.2.3.4:5000"});
        match ControlMessage::from_json(&v) {
            ControlMessage::NewConn(nc) => {
                assert_eq!(nc.conn_id, "c1");
                assert_eq!(nc.data_addr, "1.2.3.4:5000");
            }
            _ => panic!("expected NewConn"),
        }

        let v = json!({"command": "HEARTBEAT"});
        assert!(matches!(ControlMessage::from_json(&v), ControlMessage::Heartbeat));

        let v = json!({"command": "FUTURE_THING"});
        assert!(matches!(ControlMessage::from_json(&v), ControlMessage::Other(_)));
    }
}
