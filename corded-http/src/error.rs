//! HTTP error types.
//!
//! Every failed exchange surfaces with the same shape: the final status, the
//! final response body, and an optional library-supplied message.

use std::fmt;
use thiserror::Error;

/// Snapshot of the final response attached to a failed request.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// HTTP status of the final response.
    pub status: u16,
    /// Raw response body.
    pub body: String,
    /// Optional context supplied by the library.
    pub message: Option<String>,
}

impl ErrorResponse {
    pub(crate) fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            message: None,
        }
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "status {}: {}", self.status, message),
            None => write!(f, "status {}", self.status),
        }
    }
}

/// Errors that can occur during HTTP operations.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport-level request failure.
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request was malformed (400).
    #[error("bad request: {0}")]
    BadRequest(ErrorResponse),

    /// The token is missing or invalid (401).
    #[error("unauthorized: {0}")]
    Unauthorized(ErrorResponse),

    /// The token lacks permission (403).
    #[error("forbidden: {0}")]
    Forbidden(ErrorResponse),

    /// The resource does not exist (404).
    #[error("not found: {0}")]
    NotFound(ErrorResponse),

    /// The request body exceeded the platform limit (413).
    #[error("payload too large: {0}")]
    PayloadTooLarge(ErrorResponse),

    /// Rate limited terminally: either blocked at the edge proxy, or the
    /// retry budget was exhausted while honoring `retry_after` (429).
    #[error("too many requests: {0}")]
    TooManyRequests(ErrorResponse),

    /// The platform kept failing after the retry budget (5xx).
    #[error("server error: {0}")]
    Server(ErrorResponse),

    /// Any other failed exchange.
    #[error("API error: {0}")]
    Api(ErrorResponse),

    /// Invalid header value.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// Client internal error.
    #[error("client error: {0}")]
    Client(String),
}

impl HttpError {
    /// Map a terminal response to its error kind.
    pub(crate) fn from_response(response: ErrorResponse) -> Self {
        match response.status {
            400 => Self::BadRequest(response),
            401 => Self::Unauthorized(response),
            403 => Self::Forbidden(response),
            404 => Self::NotFound(response),
            413 => Self::PayloadTooLarge(response),
            429 => Self::TooManyRequests(response),
            500..=599 => Self::Server(response),
            _ => Self::Api(response),
        }
    }

    /// The final response snapshot, for the status-mapped kinds.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            Self::BadRequest(r)
            | Self::Unauthorized(r)
            | Self::Forbidden(r)
            | Self::NotFound(r)
            | Self::PayloadTooLarge(r)
            | Self::TooManyRequests(r)
            | Self::Server(r)
            | Self::Api(r) => Some(r),
            _ => None,
        }
    }

    /// The final HTTP status, for the status-mapped kinds.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }
}
