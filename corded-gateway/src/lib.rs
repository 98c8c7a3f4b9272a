//! Corded Gateway - Discord Gateway WebSocket client
#![deny(unsafe_code)]
//!
//! This crate implements the event side of the Corded library: sharded
//! WebSocket connections with heartbeat-based liveness, session resumption,
//! and close-code-aware reconnection, plus the middleware/listener dispatch
//! pipeline every gateway event flows through.
//!
//! # Example
//!
//! ```ignore
//! use corded_gateway::{Cluster, ClusterConfig, MiddlewareAction};
//! use corded_model::Intents;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), corded_gateway::GatewayError> {
//!     let cluster = Cluster::new(ClusterConfig::new("your-token", Intents::default()))?;
//!
//!     cluster.dispatcher().on("message_create", |event| async move {
//!         println!("shard {} got {:?}", event.shard_id, event.d);
//!     });
//!
//!     cluster.start().await
//! }
//! ```

mod cluster;
mod dispatch;
pub mod error;
mod event;
pub mod heartbeat;
mod opcode;
mod payload;
mod ratelimit;
mod shard;

// Public re-exports
pub use cluster::{Cluster, ClusterConfig};
pub use dispatch::{EventDispatcher, MiddlewareAction, GATEWAY_RECEIVE, GATEWAY_SEND, WILDCARD};
pub use error::{CloseCode, GatewayError};
pub use event::{Direction, GatewayEvent};
pub use heartbeat::HeartbeatHandler;
pub use opcode::OpCode;
pub use payload::{HelloPayload, RawPayload};
pub use ratelimit::{exponential_backoff, with_jitter, FixedWindowLimiter};
pub use shard::{Shard, ShardConfig, ShardState};

/// Discord Gateway API version used by this library.
pub const GATEWAY_VERSION: u8 = 10;
