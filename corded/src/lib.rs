//! Corded - a low-level Discord API library.
//!
//! This crate ties the Corded ecosystem together:
//! - `corded-http`: rate-limited REST client
//! - `corded-gateway`: sharded WebSocket gateway client
//! - `corded-model`: shared value types
//!
//! # Example
//!
//! ```no_run
//! use corded::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GatewayError> {
//!     let client = CordedClient::new("TOKEN", Intents::default())?;
//!
//!     client.on("message_create", |event| async move {
//!         println!("shard {} saw a message: {}", event.shard_id, event.d);
//!     });
//!
//!     client.start().await
//! }
//! ```

pub mod client;
pub mod prelude;

// Re-exports
pub use corded_gateway as gateway;
pub use corded_http as http;
pub use corded_model as model;

pub use client::CordedClient;
