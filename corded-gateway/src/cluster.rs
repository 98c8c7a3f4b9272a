//! Cluster management for multi-shard deployments.
//!
//! The Cluster is the gateway supervisor: it fetches connection metadata,
//! admits shards through the session-start limiter, runs each shard as an
//! independent task, and escalates fatal close codes.

use crate::dispatch::EventDispatcher;
use crate::error::GatewayError;
use crate::ratelimit::FixedWindowLimiter;
use crate::shard::{Shard, ShardConfig, ShardState};

use corded_http::HttpClient;
use corded_model::Intents;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info};

/// How long one session-start window lasts.
const START_WINDOW: Duration = Duration::from_secs(5);

/// Configuration for a Cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Bot token.
    pub token: String,

    /// Gateway intents.
    pub intents: Intents,

    /// Total number of shards. When absent the recommended count from
    /// `/gateway/bot` is used.
    pub shard_count: Option<u16>,

    /// Shard ids this cluster runs. Defaults to all of `0..shard_count`.
    pub shard_ids: Option<Vec<u16>>,

    /// HTTP API base URL override.
    pub api_base_url: Option<String>,
}

impl ClusterConfig {
    /// Create a new cluster configuration.
    pub fn new(token: impl Into<String>, intents: Intents) -> Self {
        Self {
            token: token.into(),
            intents,
            shard_count: None,
            shard_ids: None,
            api_base_url: None,
        }
    }

    /// Set the total shard count.
    pub fn with_shard_count(mut self, shard_count: u16) -> Self {
        self.shard_count = Some(shard_count);
        self
    }

    /// Set the specific shard ids this cluster runs.
    pub fn with_shard_ids(mut self, shard_ids: Vec<u16>) -> Self {
        self.shard_ids = Some(shard_ids);
        self
    }

    /// Override the HTTP API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }
}

/// The gateway supervisor: owns the shard set and the event dispatcher.
///
/// # Example
///
/// ```ignore
/// use corded_gateway::{Cluster, ClusterConfig};
/// use corded_model::Intents;
///
/// #[tokio::main]
/// async fn main() -> Result<(), corded_gateway::GatewayError> {
///     let cluster = Cluster::new(ClusterConfig::new("your-token", Intents::default()))?;
///
///     cluster.dispatcher().on("ready", |event| async move {
///         println!("shard {} ready", event.shard_id);
///     });
///
///     cluster.start().await
/// }
/// ```
pub struct Cluster {
    /// Cluster configuration.
    config: ClusterConfig,

    /// HTTP client shared with the shards.
    http: Arc<HttpClient>,

    /// Dispatcher shared by every shard.
    dispatcher: Arc<EventDispatcher>,

    /// Running shards.
    shards: DashMap<u16, Arc<Shard>>,

    /// Channel carrying fatal shard errors to the parked `start`.
    fatal_tx: flume::Sender<GatewayError>,
    fatal_rx: flume::Receiver<GatewayError>,

    /// Wakes the parked `start` on shutdown.
    shutdown: Notify,
}

impl Cluster {
    /// Create a new cluster with its own HTTP client.
    pub fn new(config: ClusterConfig) -> Result<Self, GatewayError> {
        let mut http = HttpClient::new(&config.token)?;
        if let Some(url) = &config.api_base_url {
            http = http.with_base_url(url.clone());
        }
        Ok(Self::with_http(config, Arc::new(http)))
    }

    /// Create a new cluster sharing an existing HTTP client.
    pub fn with_http(config: ClusterConfig, http: Arc<HttpClient>) -> Self {
        let (fatal_tx, fatal_rx) = flume::unbounded();

        Self {
            config,
            http,
            dispatcher: Arc::new(EventDispatcher::new()),
            shards: DashMap::new(),
            fatal_tx,
            fatal_rx,
            shutdown: Notify::new(),
        }
    }

    /// The dispatcher events from every shard flow through.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// The HTTP client this cluster uses.
    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    /// Start all shards and park until shutdown or a fatal error.
    ///
    /// Shards are admitted through a fixed window of
    /// `session_start_limit.max_concurrency` connects per five seconds,
    /// then each runs as an independent task. A fatal close code on any
    /// shard makes this return its error.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let info = self.http.get_gateway_bot().await?;
        let limit = &info.session_start_limit;

        let shard_count = self.config.shard_count.unwrap_or_else(|| info.shards.max(1));
        let shard_ids = self
            .config
            .shard_ids
            .clone()
            .unwrap_or_else(|| (0..shard_count).collect());

        info!(
            shards = ?shard_ids,
            total = shard_count,
            max_concurrency = limit.max_concurrency,
            remaining_starts = limit.remaining,
            "Starting cluster"
        );

        let starter = FixedWindowLimiter::new(limit.max_concurrency, START_WINDOW);

        for shard_id in shard_ids {
            starter.wait().await;
            self.spawn_shard(shard_id, shard_count);
        }

        tokio::select! {
            fatal = self.fatal_rx.recv_async() => match fatal {
                Ok(error) => {
                    error!(error = %error, "Cluster panicking on fatal shard error");
                    Err(error)
                }
                Err(_) => Ok(()),
            },
            _ = self.shutdown.notified() => {
                info!("Cluster shutdown requested");
                for shard in self.shards.iter() {
                    shard.value().shutdown();
                }
                Ok(())
            }
        }
    }

    /// Escalate a fatal close code, making `start` return.
    pub fn panic(&self, code: u16) {
        let _ = self.fatal_tx.send(GatewayError::Fatal {
            code,
            reason: "escalated by controller".to_string(),
        });
    }

    /// Request a graceful shutdown of every shard.
    ///
    /// Shards notice on their next frame, command, or read timeout.
    pub fn shutdown(&self) {
        for shard in self.shards.iter() {
            shard.value().shutdown();
        }
        self.shutdown.notify_one();
    }

    /// Spawn a single shard as an independent task.
    fn spawn_shard(&self, shard_id: u16, shard_count: u16) {
        let config = ShardConfig::new(self.config.token.clone(), self.config.intents);
        let shard = Arc::new(Shard::new(
            shard_id,
            shard_count,
            config,
            self.http.clone(),
            self.dispatcher.clone(),
        ));

        let runner = shard.clone();
        let fatal_tx = self.fatal_tx.clone();
        tokio::spawn(async move {
            if let Err(error) = runner.run().await {
                error!(shard_id, error = %error, "Shard terminated with error");
                let _ = fatal_tx.send_async(error).await;
            }
        });

        self.shards.insert(shard_id, shard);
        info!(shard_id, "Shard spawned");
    }

    /// Get the state of a specific shard.
    pub fn shard_state(&self, shard_id: u16) -> Option<ShardState> {
        self.shards.get(&shard_id).map(|shard| shard.state())
    }

    /// Get the last measured latency for a specific shard.
    pub fn shard_latency(&self, shard_id: u16) -> Option<Duration> {
        self.shards.get(&shard_id).and_then(|shard| shard.latency())
    }

    /// Get all shard ids managed by this cluster.
    pub fn shard_ids(&self) -> Vec<u16> {
        self.shards.iter().map(|shard| *shard.key()).collect()
    }

    /// Send a raw payload on a specific shard.
    pub fn send(&self, shard_id: u16, frame: Value) -> Result<(), GatewayError> {
        match self.shards.get(&shard_id) {
            Some(shard) => shard.send_payload(frame),
            None => Err(GatewayError::ChannelSend(format!(
                "shard {shard_id} not found"
            ))),
        }
    }
}
