//! Corded HTTP - Discord REST API client
#![deny(unsafe_code)]
//!
//! This crate implements the request side of the Corded library: route and
//! rate-limit bucket identity, a per-bucket/global rate-limit coordinator,
//! and a retrying request engine that honors server-reported retry windows.
//!
//! # Example
//!
//! ```ignore
//! use corded_http::{HttpClient, RequestOptions, Route};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), corded_http::HttpError> {
//!     let http = HttpClient::new("your-token")?;
//!
//!     let route = Route::new("/channels/{channel_id}/messages").channel_id(5u64);
//!     let body = serde_json::json!({"content": "hello"});
//!     let message = http
//!         .request(reqwest::Method::POST, route, RequestOptions::new().json(body))
//!         .await?;
//!
//!     println!("{message:?}");
//!     Ok(())
//! }
//! ```

mod client;
pub mod error;
mod file;
mod ratelimit;
mod route;
mod routes;

pub use client::{HttpClient, RequestOptions, ResponseFormat, ResponseValue};
pub use error::{ErrorResponse, HttpError};
pub use file::File;
pub use ratelimit::Ratelimiter;
pub use route::Route;
pub use routes::{GetGateway, GetGatewayBot, SessionStartLimit};

/// Discord API base URL.
pub const API_BASE: &str = "https://discord.com/api/v10";
