//! Basic cluster connection example.
//!
//! Connects a single-shard cluster and logs the events it receives.
//!
//! # Usage
//!
//! ```bash
//! DISCORD_TOKEN=your_bot_token cargo run --example basic_cluster
//! ```

use corded_gateway::{Cluster, ClusterConfig};
use corded_model::Intents;
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

    let cluster = Cluster::new(ClusterConfig::new(
        token,
        Intents::GUILDS | Intents::GUILD_MESSAGES,
    ))?;

    cluster.dispatcher().on("ready", |event| async move {
        info!(shard_id = event.shard_id, "Shard ready");
    });

    cluster.dispatcher().on("message_create", |event| async move {
        info!(
            channel_id = %event.d["channel_id"],
            content = %event.d["content"],
            "Message received"
        );
    });

    // Runs until shutdown or a fatal close code
    info!("Starting cluster...");
    cluster.start().await?;

    Ok(())
}
