//! Gateway wire payloads.
//!
//! Frames are JSON text objects `{op, d, s?, t?}`. Event bodies stay opaque
//! `serde_json::Value` maps; only the handshake payloads have shapes the
//! shard itself depends on.

use crate::opcode::OpCode;
use corded_model::Intents;
use serde::Deserialize;
use serde_json::{json, Value};

/// A raw inbound frame.
///
/// `op` stays a plain integer so frames with opcodes this library does not
/// react to still parse and reach listeners.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPayload {
    /// Opcode for the payload.
    pub op: u8,

    /// Event data.
    #[serde(default)]
    pub d: Value,

    /// Sequence number (for Dispatch events).
    #[serde(default)]
    pub s: Option<u64>,

    /// Event name (for Dispatch events).
    #[serde(default)]
    pub t: Option<String>,
}

/// Payload for the Hello opcode (op 10).
///
/// Received immediately after connecting to the Gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    /// Interval (in milliseconds) at which to send heartbeats.
    pub heartbeat_interval: u64,
}

/// Build an Identify frame (op 2).
pub(crate) fn identify(token: &str, intents: Intents, shard_id: u16, shard_count: u16) -> Value {
    json!({
        "op": OpCode::Identify,
        "d": {
            "token": token,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "Corded",
                "device": "Corded",
            },
            "intents": intents,
            "shard": [shard_id, shard_count],
        },
    })
}

/// Build a Resume frame (op 6).
pub(crate) fn resume(token: &str, session_id: &str, seq: Option<u64>) -> Value {
    json!({
        "op": OpCode::Resume,
        "d": {
            "token": token,
            "session_id": session_id,
            "seq": seq,
        },
    })
}

/// Build a Heartbeat frame (op 1). The data is the last received sequence
/// number, or null before any Dispatch arrived.
pub(crate) fn heartbeat(seq: Option<u64>) -> Value {
    json!({
        "op": OpCode::Heartbeat,
        "d": seq,
    })
}
