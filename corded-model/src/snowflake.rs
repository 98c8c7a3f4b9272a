//! Snowflake ids.
//!
//! Every entity on the platform is identified by a snowflake: a 64-bit
//! unsigned integer packing a millisecond timestamp (offset from the
//! platform epoch) with the worker, process, and per-millisecond increment
//! that minted it. On the wire snowflakes travel as decimal strings, since
//! several client languages cannot hold the full 64 bits in a number.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Milliseconds between the Unix epoch and the platform epoch (2015-01-01T00:00:00Z).
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// A 64-bit entity id.
///
/// The packed layout, from the high bits down: 42 bits of timestamp,
/// 5 bits of worker id, 5 bits of process id, 12 bits of increment.
/// [`from_parts`] and the accessors below round-trip exactly for any
/// timestamp at or after the platform epoch.
///
/// [`from_parts`]: Snowflake::from_parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Snowflake(pub u64);

impl Snowflake {
    /// Wrap a raw id.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Pack the component parts back into an id.
    ///
    /// `timestamp_ms` is absolute Unix milliseconds and must not precede
    /// the platform epoch. `worker` and `process` occupy 5 bits each,
    /// `increment` 12; higher bits are masked off.
    #[inline]
    pub const fn from_parts(timestamp_ms: u64, worker: u8, process: u8, increment: u16) -> Self {
        let ts = timestamp_ms.saturating_sub(DISCORD_EPOCH_MS);
        Self(
            (ts << 22)
                | (((worker & 0x1F) as u64) << 17)
                | (((process & 0x1F) as u64) << 12)
                | (increment & 0xFFF) as u64,
        )
    }

    /// The raw id.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// When this id was minted, in absolute Unix milliseconds.
    #[inline]
    pub const fn timestamp(self) -> u64 {
        (self.0 >> 22) + DISCORD_EPOCH_MS
    }

    /// The worker that minted this id.
    #[inline]
    pub const fn worker_id(self) -> u8 {
        ((self.0 & 0x3E0000) >> 17) as u8
    }

    /// The process that minted this id.
    #[inline]
    pub const fn process_id(self) -> u8 {
        ((self.0 & 0x1F000) >> 12) as u8
    }

    /// Position of this id among those minted in the same millisecond.
    #[inline]
    pub const fn increment(self) -> u16 {
        (self.0 & 0xFFF) as u16
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for Snowflake {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Snowflake> for u64 {
    #[inline]
    fn from(snowflake: Snowflake) -> Self {
        snowflake.0
    }
}

impl Serialize for Snowflake {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // The wire format is a decimal string.
        serializer.collect_str(&self.0)
    }
}

/// The two encodings ids arrive in: strings normally, bare integers from
/// some older payloads.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match IdRepr::deserialize(deserializer)? {
            IdRepr::Int(id) => Ok(Snowflake(id)),
            IdRepr::Text(text) => text
                .parse::<u64>()
                .map(Snowflake)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_string_ids() {
        let snowflake: Snowflake = serde_json::from_str(r#""175928847299117063""#).unwrap();
        assert_eq!(snowflake.get(), 175928847299117063);
    }

    #[test]
    fn test_parses_integer_ids() {
        let snowflake: Snowflake = serde_json::from_str("175928847299117063").unwrap();
        assert_eq!(snowflake.get(), 175928847299117063);
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!(serde_json::from_str::<Snowflake>(r#""not-a-number""#).is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let snowflake = Snowflake::new(175928847299117063);
        let json = serde_json::to_string(&snowflake).unwrap();
        assert_eq!(json, r#""175928847299117063""#);
    }

    #[test]
    fn test_snowflake_decomposition() {
        // Documented example id with known component parts
        let snowflake = Snowflake::new(175928847299117063);
        assert_eq!(snowflake.timestamp(), 1462015105796);
        assert_eq!(snowflake.worker_id(), 1);
        assert_eq!(snowflake.process_id(), 0);
        assert_eq!(snowflake.increment(), 7);
    }

    #[test]
    fn test_snowflake_round_trip() {
        let cases = [
            (DISCORD_EPOCH_MS, 0u8, 0u8, 0u16),
            (1462015105796, 1, 0, 7),
            (1609459200000, 31, 31, 4095),
            (DISCORD_EPOCH_MS + 1, 17, 9, 1024),
        ];

        for (ts, worker, process, increment) in cases {
            let snowflake = Snowflake::from_parts(ts, worker, process, increment);
            assert_eq!(snowflake.timestamp(), ts);
            assert_eq!(snowflake.worker_id(), worker);
            assert_eq!(snowflake.process_id(), process);
            assert_eq!(snowflake.increment(), increment);
        }
    }
}
