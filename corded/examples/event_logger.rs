//! Log every gateway event crossing the wire.
//!
//! # Usage
//!
//! ```bash
//! DISCORD_TOKEN=your_bot_token cargo run --example event_logger
//! ```

use corded::prelude::*;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Get token from environment
    let token = std::env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN not set");

    let client = CordedClient::new(token, Intents::default())?;

    // Middleware sees every event, both directions, before any listener.
    client.middleware(|event| async move {
        info!(
            shard_id = event.shard_id,
            direction = ?event.direction,
            name = %event.dispatch_name(),
            "gateway event"
        );
        MiddlewareAction::Keep(event)
    });

    client.on("message_create", |event| async move {
        info!(content = %event.d["content"], "Message received");
    });

    client.start().await?;

    Ok(())
}
