//! The combined client: HTTP plus gateway behind one handle.

use corded_gateway::{Cluster, ClusterConfig, GatewayError, GatewayEvent, MiddlewareAction};
use corded_http::HttpClient;
use corded_model::Intents;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// A client that can make API requests and run the gateway connection.
///
/// Listener and middleware registration delegate to the cluster's event
/// dispatcher; [`start`] drives the shards until shutdown or a fatal
/// gateway error.
///
/// [`start`]: CordedClient::start
pub struct CordedClient {
    cluster: Cluster,
}

impl CordedClient {
    /// Create a client with the default single-shard configuration.
    pub fn new(token: impl Into<String>, intents: Intents) -> Result<Self, GatewayError> {
        Self::with_config(ClusterConfig::new(token, intents))
    }

    /// Create a client from a full cluster configuration.
    pub fn with_config(config: ClusterConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            cluster: Cluster::new(config)?,
        })
    }

    /// The HTTP client, for direct API requests.
    pub fn http(&self) -> &Arc<HttpClient> {
        self.cluster.http()
    }

    /// The gateway cluster.
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Register a listener for an event name (case-insensitive).
    ///
    /// The names `gateway_send`, `gateway_receive`, and `*` subscribe to
    /// all outbound, all inbound, and all events respectively.
    pub fn on<F, Fut>(&self, event: &str, listener: F)
    where
        F: Fn(GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cluster.dispatcher().on(event, listener);
    }

    /// Append a middleware to the dispatch chain.
    pub fn middleware<F, Fut>(&self, middleware: F)
    where
        F: Fn(GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareAction> + Send + 'static,
    {
        self.cluster.dispatcher().middleware(middleware);
    }

    /// Send a raw payload on a specific shard.
    pub fn send(&self, shard_id: u16, frame: serde_json::Value) -> Result<(), GatewayError> {
        self.cluster.send(shard_id, frame)
    }

    /// Connect the gateway and run until shutdown.
    ///
    /// Returns the fatal error when a shard hits a non-recoverable close
    /// code (bad token, invalid or disallowed intents).
    pub async fn start(&self) -> Result<(), GatewayError> {
        info!("Starting Corded client");
        self.cluster.start().await
    }

    /// Request a graceful shutdown.
    pub fn shutdown(&self) {
        self.cluster.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CordedClient::new("test_token", Intents::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_registration_surfaces() {
        let client = CordedClient::new("test_token", Intents::default()).expect("client");
        client.on("message_create", |_event| async {});
        client.middleware(|event| async move { MiddlewareAction::Keep(event) });
    }
}
