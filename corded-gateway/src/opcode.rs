//! Gateway opcodes.
//!
//! Opcodes define the type of payload being sent or received over the
//! Gateway WebSocket.

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Gateway operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum OpCode {
    /// Dispatch - An event was dispatched; carries `t` and `s`.
    /// Direction: Receive
    Dispatch = 0,

    /// Heartbeat - Keep the connection alive.
    /// Direction: Send/Receive
    Heartbeat = 1,

    /// Identify - Start a new session.
    /// Direction: Send
    Identify = 2,

    /// Resume - Resume a previous session.
    /// Direction: Send
    Resume = 6,

    /// Reconnect - Server requested a reconnect.
    /// Direction: Receive
    Reconnect = 7,

    /// Invalid Session - Session has been invalidated.
    /// Direction: Receive
    InvalidSession = 9,

    /// Hello - Sent after connecting, contains heartbeat interval.
    /// Direction: Receive
    Hello = 10,

    /// Heartbeat ACK - Acknowledgment of heartbeat received.
    /// Direction: Receive
    HeartbeatAck = 11,
}

impl OpCode {
    /// Try to convert a raw opcode integer to this enum.
    ///
    /// Frames carrying unknown opcodes are still dispatched to listeners,
    /// so parsing is deliberately total over `u8`.
    pub const fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(OpCode::Dispatch),
            1 => Some(OpCode::Heartbeat),
            2 => Some(OpCode::Identify),
            6 => Some(OpCode::Resume),
            7 => Some(OpCode::Reconnect),
            9 => Some(OpCode::InvalidSession),
            10 => Some(OpCode::Hello),
            11 => Some(OpCode::HeartbeatAck),
            _ => None,
        }
    }
}
