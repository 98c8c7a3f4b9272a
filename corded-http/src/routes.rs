//! Connection-metadata responses consumed by the gateway.

use serde::Deserialize;

/// Response from GET /gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GetGateway {
    /// Gateway WebSocket URL.
    pub url: String,
}

/// Response from GET /gateway/bot.
#[derive(Debug, Clone, Deserialize)]
pub struct GetGatewayBot {
    /// Gateway WebSocket URL.
    pub url: String,

    /// Recommended number of shards.
    pub shards: u16,

    /// Session start limit information.
    pub session_start_limit: SessionStartLimit,
}

/// Session start limit from /gateway/bot.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartLimit {
    /// Total number of session starts allowed.
    pub total: u32,

    /// Remaining session starts.
    pub remaining: u32,

    /// Milliseconds until the limit resets.
    pub reset_after: u64,

    /// Maximum number of concurrent identify operations.
    pub max_concurrency: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_bot_parsing() {
        let json = r#"{
            "url": "wss://gateway.discord.gg",
            "shards": 2,
            "session_start_limit": {
                "total": 1000,
                "remaining": 997,
                "reset_after": 14400000,
                "max_concurrency": 1
            }
        }"#;

        let info: GetGatewayBot = serde_json::from_str(json).unwrap();
        assert_eq!(info.shards, 2);
        assert_eq!(info.session_start_limit.max_concurrency, 1);
    }
}
