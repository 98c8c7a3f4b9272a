//! Gateway error types and close-code classification.

use thiserror::Error;

/// Errors that can occur during Gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// WebSocket connection or protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to parse a JSON frame.
    #[error("JSON decode error: {0}")]
    JsonDecode(String),

    /// Connection was closed by the server.
    #[error("connection closed: code={code}, reason={reason}")]
    Closed {
        /// WebSocket close code (0 when none was supplied).
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// The server closed the session with a code that cannot be recovered
    /// from; the controller escalates this to a process-fatal exit.
    #[error("fatal gateway close: code={code}, reason={reason}")]
    Fatal {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// A heartbeat went unacknowledged for a full pacemaker interval.
    #[error("heartbeat not acknowledged in time")]
    HeartbeatLapsed,

    /// The server asked this shard to reconnect.
    #[error("server requested reconnect")]
    ReconnectRequested,

    /// HTTP failure while fetching connection metadata.
    #[error("HTTP error: {0}")]
    Http(#[from] corded_http::HttpError),

    /// Failed to send through an internal channel.
    #[error("channel send error: {0}")]
    ChannelSend(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::JsonDecode(err.to_string())
    }
}

impl<T> From<flume::SendError<T>> for GatewayError {
    fn from(err: flume::SendError<T>) -> Self {
        GatewayError::ChannelSend(err.to_string())
    }
}

/// Gateway close codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred.
    UnknownError = 4000,
    /// Invalid opcode sent.
    UnknownOpcode = 4001,
    /// Invalid payload (decode error).
    DecodeError = 4002,
    /// Payload sent before identifying.
    NotAuthenticated = 4003,
    /// Invalid token.
    AuthenticationFailed = 4004,
    /// Already authenticated.
    AlreadyAuthenticated = 4005,
    /// Invalid sequence number for resume.
    InvalidSeq = 4007,
    /// Payloads sent too quickly.
    RateLimited = 4008,
    /// Session timed out.
    SessionTimeout = 4009,
    /// Invalid shard configuration.
    InvalidShard = 4010,
    /// Too many guilds (sharding required).
    ShardingRequired = 4011,
    /// Invalid API version.
    InvalidApiVersion = 4012,
    /// Invalid intents.
    InvalidIntents = 4013,
    /// Disallowed intents (privileged intent not enabled).
    DisallowedIntents = 4014,
}

impl CloseCode {
    /// Whether this close code is non-recoverable: the shard must stop and
    /// the controller escalates to a fatal exit.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            CloseCode::NotAuthenticated
                | CloseCode::AuthenticationFailed
                | CloseCode::InvalidApiVersion
                | CloseCode::InvalidIntents
                | CloseCode::DisallowedIntents
        )
    }

    /// Whether this close code invalidates the session: the next connect
    /// must identify fresh instead of resuming.
    pub const fn resets_session(self) -> bool {
        matches!(
            self,
            CloseCode::InvalidSeq | CloseCode::RateLimited | CloseCode::SessionTimeout
        )
    }

    /// Try to convert a u16 close code to this enum.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            4000 => Some(CloseCode::UnknownError),
            4001 => Some(CloseCode::UnknownOpcode),
            4002 => Some(CloseCode::DecodeError),
            4003 => Some(CloseCode::NotAuthenticated),
            4004 => Some(CloseCode::AuthenticationFailed),
            4005 => Some(CloseCode::AlreadyAuthenticated),
            4007 => Some(CloseCode::InvalidSeq),
            4008 => Some(CloseCode::RateLimited),
            4009 => Some(CloseCode::SessionTimeout),
            4010 => Some(CloseCode::InvalidShard),
            4011 => Some(CloseCode::ShardingRequired),
            4012 => Some(CloseCode::InvalidApiVersion),
            4013 => Some(CloseCode::InvalidIntents),
            4014 => Some(CloseCode::DisallowedIntents),
            _ => None,
        }
    }
}
