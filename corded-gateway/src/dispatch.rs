//! Event dispatch: the middleware chain and listener fanout.

use crate::event::{Direction, GatewayEvent};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::trace;

/// Listener channel receiving every outbound event.
pub const GATEWAY_SEND: &str = "gateway_send";
/// Listener channel receiving every inbound event.
pub const GATEWAY_RECEIVE: &str = "gateway_receive";
/// Listener channel receiving every event in both directions.
pub const WILDCARD: &str = "*";

type ListenerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Listener = Arc<dyn Fn(GatewayEvent) -> ListenerFuture + Send + Sync + 'static>;

type MiddlewareFuture = Pin<Box<dyn Future<Output = MiddlewareAction> + Send + 'static>>;
type Middleware = Arc<dyn Fn(GatewayEvent) -> MiddlewareFuture + Send + Sync + 'static>;

/// What a middleware decided about an event.
///
/// The chain transforms events explicitly: either the (possibly rewritten)
/// event continues down the pipeline, or it is dropped. Listeners can never
/// observe a half-dropped event.
#[derive(Debug)]
pub enum MiddlewareAction {
    /// Continue dispatching this event.
    Keep(GatewayEvent),
    /// Stop: no listener sees the event.
    Drop,
}

/// Routes gateway events through middleware and out to listeners.
///
/// Listeners are keyed by lowercase event name. Three names are special:
/// [`GATEWAY_SEND`], [`GATEWAY_RECEIVE`], and [`WILDCARD`] receive all
/// outbound, all inbound, and all events respectively. The registry is
/// append-only while the gateway runs; each dispatch works from a snapshot.
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    middleware: RwLock<Vec<Middleware>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for an event name (case-insensitive).
    ///
    /// Listeners take the event by value and run concurrently with every
    /// other listener for the same event.
    pub fn on<F, Fut>(&self, event: &str, listener: F)
    where
        F: Fn(GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener: Listener = Arc::new(move |event| Box::pin(listener(event)));
        self.listeners
            .write()
            .entry(event.to_ascii_lowercase())
            .or_default()
            .push(listener);
    }

    /// Append a middleware to the chain.
    ///
    /// Middleware run in registration order and may rewrite or drop events.
    pub fn middleware<F, Fut>(&self, middleware: F)
    where
        F: Fn(GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareAction> + Send + 'static,
    {
        let middleware: Middleware = Arc::new(move |event| Box::pin(middleware(event)));
        self.middleware.write().push(middleware);
    }

    /// Run the middleware chain, then fan the event out.
    ///
    /// Listeners are launched in (direct, directional, wildcard) order but
    /// run concurrently as independent tasks; one failing or slow listener
    /// cannot block the rest.
    pub async fn dispatch(&self, event: GatewayEvent) {
        let chain: Vec<Middleware> = self.middleware.read().clone();

        let mut event = event;
        for middleware in chain {
            match middleware(event).await {
                MiddlewareAction::Keep(kept) => event = kept,
                MiddlewareAction::Drop => {
                    trace!("Event dropped by middleware");
                    return;
                }
            }
        }

        let direct = event.dispatch_name();
        let directional = match event.direction {
            Direction::Outbound => GATEWAY_SEND,
            Direction::Inbound => GATEWAY_RECEIVE,
        };

        let targets: Vec<Listener> = {
            let listeners = self.listeners.read();
            [direct.as_str(), directional, WILDCARD]
                .iter()
                .filter_map(|name| listeners.get(*name))
                .flat_map(|registered| registered.iter().cloned())
                .collect()
        };

        trace!(
            name = %direct,
            listeners = targets.len(),
            "Dispatching event"
        );

        for listener in targets {
            tokio::spawn(listener(event.clone()));
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::RawPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn message_create(shard_id: u16) -> GatewayEvent {
        let payload: RawPayload =
            serde_json::from_str(r#"{"op": 0, "s": 1, "t": "MESSAGE_CREATE", "d": {"id": "1"}}"#)
                .unwrap();
        GatewayEvent::inbound(shard_id, &payload)
    }

    #[tokio::test]
    async fn test_fanout_hits_direct_directional_and_wildcard() {
        let dispatcher = EventDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();

        let direct = tx.clone();
        dispatcher.on("MESSAGE_CREATE", move |_| {
            let tx = direct.clone();
            async move {
                let _ = tx.send("direct");
            }
        });
        let directional = tx.clone();
        dispatcher.on(GATEWAY_RECEIVE, move |_| {
            let tx = directional.clone();
            async move {
                let _ = tx.send("directional");
            }
        });
        let wildcard = tx.clone();
        dispatcher.on(WILDCARD, move |_| {
            let tx = wildcard.clone();
            async move {
                let _ = tx.send("wildcard");
            }
        });
        let unrelated = tx.clone();
        dispatcher.on("guild_create", move |_| {
            let tx = unrelated.clone();
            async move {
                let _ = tx.send("unrelated");
            }
        });

        dispatcher.dispatch(message_create(0)).await;

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, vec!["direct", "directional", "wildcard"]);

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_outbound_events_hit_send_channel() {
        let dispatcher = EventDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();

        let send = tx.clone();
        dispatcher.on(GATEWAY_SEND, move |_| {
            let tx = send.clone();
            async move {
                let _ = tx.send("send");
            }
        });
        let receive = tx.clone();
        dispatcher.on(GATEWAY_RECEIVE, move |_| {
            let tx = receive.clone();
            async move {
                let _ = tx.send("receive");
            }
        });

        let frame = serde_json::json!({"op": 1, "d": null});
        dispatcher
            .dispatch(GatewayEvent::outbound(0, &frame))
            .await;

        assert_eq!(rx.recv().await, Some("send"));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_middleware_rewrites_events_in_order() {
        let dispatcher = EventDispatcher::new();

        dispatcher.middleware(|mut event: GatewayEvent| async move {
            event.d["tagged"] = serde_json::json!(1);
            MiddlewareAction::Keep(event)
        });
        dispatcher.middleware(|mut event: GatewayEvent| async move {
            // Registration order: the first middleware already ran.
            assert_eq!(event.d["tagged"], 1);
            event.d["tagged"] = serde_json::json!(2);
            MiddlewareAction::Keep(event)
        });

        let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
        dispatcher.on("message_create", move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.d.clone());
            }
        });

        dispatcher.dispatch(message_create(0)).await;
        let body = rx.recv().await.unwrap();
        assert_eq!(body["tagged"], 2);
    }

    #[tokio::test]
    async fn test_middleware_drop_suppresses_fanout() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        dispatcher.middleware(|_event| async move { MiddlewareAction::Drop });

        let counter = calls.clone();
        dispatcher.on(WILDCARD, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        dispatcher.dispatch(message_create(0)).await;
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listener_panic_does_not_block_others() {
        let dispatcher = EventDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();

        dispatcher.on("message_create", |_| async {
            panic!("listener failure");
        });
        dispatcher.on(WILDCARD, move |_| {
            let tx = tx.clone();
            async move {
                let _ = tx.send("survived");
            }
        });

        dispatcher.dispatch(message_create(0)).await;
        assert_eq!(rx.recv().await, Some("survived"));
    }
}
