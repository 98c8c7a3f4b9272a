//! The gateway event value object.

use crate::payload::RawPayload;
use serde_json::Value;

/// Which way an event crossed the websocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the server.
    Inbound,
    /// Sent by this library.
    Outbound,
}

/// One gateway frame, wrapped for dispatch.
///
/// Inbound events carry `op` and `d` exactly as received; outbound events
/// are constructed from the frame the shard is about to serialize. The body
/// stays an opaque JSON value.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    /// Id of the shard this event crossed.
    pub shard_id: u16,
    /// Whether the event was received or sent.
    pub direction: Direction,
    /// Raw opcode.
    pub op: u8,
    /// Event data.
    pub d: Value,
    /// Sequence number, when the server supplied one.
    pub s: Option<u64>,
    /// Event name, for Dispatch frames.
    pub t: Option<String>,
}

impl GatewayEvent {
    /// Wrap a received frame.
    pub fn inbound(shard_id: u16, payload: &RawPayload) -> Self {
        Self {
            shard_id,
            direction: Direction::Inbound,
            op: payload.op,
            d: payload.d.clone(),
            s: payload.s,
            t: payload.t.clone(),
        }
    }

    /// Wrap a frame about to be sent.
    pub fn outbound(shard_id: u16, frame: &Value) -> Self {
        Self {
            shard_id,
            direction: Direction::Outbound,
            op: frame
                .get("op")
                .and_then(Value::as_u64)
                .unwrap_or_default() as u8,
            d: frame.get("d").cloned().unwrap_or(Value::Null),
            s: None,
            t: None,
        }
    }

    /// The listener registry key for this event: the lowercased event name
    /// for Dispatch frames, `op_<op>` otherwise.
    pub fn dispatch_name(&self) -> String {
        match &self.t {
            Some(t) => t.to_ascii_lowercase(),
            None => format!("op_{}", self.op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_name_from_event_type() {
        let payload: RawPayload =
            serde_json::from_str(r#"{"op": 0, "s": 3, "t": "MESSAGE_CREATE", "d": {}}"#).unwrap();
        let event = GatewayEvent::inbound(0, &payload);
        assert_eq!(event.dispatch_name(), "message_create");
        assert_eq!(event.s, Some(3));
    }

    #[test]
    fn test_dispatch_name_from_opcode() {
        let payload: RawPayload = serde_json::from_str(r#"{"op": 11}"#).unwrap();
        let event = GatewayEvent::inbound(1, &payload);
        assert_eq!(event.dispatch_name(), "op_11");
        assert_eq!(event.d, Value::Null);
    }

    #[test]
    fn test_outbound_event_from_frame() {
        let frame = serde_json::json!({"op": 1, "d": 42});
        let event = GatewayEvent::outbound(7, &frame);
        assert_eq!(event.direction, Direction::Outbound);
        assert_eq!(event.shard_id, 7);
        assert_eq!(event.op, 1);
        assert_eq!(event.d, 42);
        assert_eq!(event.dispatch_name(), "op_1");
    }
}
