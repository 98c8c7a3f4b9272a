//! End-to-end shard lifecycle tests against a scripted loopback gateway.

use corded_gateway::{Cluster, ClusterConfig, EventDispatcher, GatewayError, Shard, ShardConfig};
use corded_http::HttpClient;
use corded_model::Intents;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type ServerWs = WebSocketStream<TcpStream>;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, format!("ws://127.0.0.1:{port}"))
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("accept timeout")
        .expect("accept");
    accept_async(stream).await.expect("ws handshake")
}

async fn send_json(ws: &mut ServerWs, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("server send");
}

async fn recv_json(ws: &mut ServerWs) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame timeout")
            .expect("stream ended")
            .expect("frame");
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("json"),
            Message::Ping(data) => {
                let _ = ws.send(Message::Pong(data)).await;
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn close_with(ws: &mut ServerWs, code: u16) {
    let _ = ws
        .send(Message::Close(Some(CloseFrame {
            code: code.into(),
            reason: "".into(),
        })))
        .await;
    // Drain until the peer completes the close handshake.
    while let Some(Ok(_)) = ws.next().await {}
}

fn hello(interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": interval_ms}})
}

fn ready(session_id: &str, seq: u64) -> Value {
    json!({"op": 0, "s": seq, "t": "READY", "d": {"session_id": session_id}})
}

fn test_shard(url: String) -> Shard {
    let mut config = ShardConfig::new("test_token", Intents::default()).with_gateway_url(url);
    config.reconnect_base_delay_ms = 50;
    config.reconnect_max_delay_ms = 100;

    let http = Arc::new(HttpClient::new("test_token").expect("client"));
    Shard::new(0, 1, config, http, Arc::new(EventDispatcher::new()))
}

#[tokio::test]
async fn handshake_identifies_then_heartbeats() {
    let (listener, url) = bind().await;
    let accepts = Arc::new(AtomicUsize::new(0));

    let server_accepts = accepts.clone();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        server_accepts.fetch_add(1, Ordering::SeqCst);

        send_json(&mut ws, hello(60000)).await;

        let identify = recv_json(&mut ws).await;
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "test_token");
        assert_eq!(identify["d"]["shard"], json!([0, 1]));
        assert_eq!(identify["d"]["properties"]["browser"], "Corded");
        assert_eq!(identify["d"]["properties"]["device"], "Corded");
        assert_eq!(identify["d"]["intents"], Intents::default().bits());

        // The pacemaker fires immediately; no Dispatch arrived yet.
        let heartbeat = recv_json(&mut ws).await;
        assert_eq!(heartbeat["op"], 1);
        assert_eq!(heartbeat["d"], Value::Null);
        send_json(&mut ws, json!({"op": 11})).await;

        close_with(&mut ws, 4004).await;
        listener
    });

    let shard = test_shard(url);
    let error = shard.run().await.expect_err("must be fatal");
    let GatewayError::Fatal { code, .. } = error else {
        panic!("expected fatal error, got {error:?}");
    };
    assert_eq!(code, 4004);

    let listener = server.await.expect("server");
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    // A fatal close never reconnects.
    assert!(
        timeout(Duration::from_millis(300), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn transient_close_resumes_with_session_and_seq() {
    let (listener, url) = bind().await;
    let accepts = Arc::new(AtomicUsize::new(0));

    let server_accepts = accepts.clone();
    let server = tokio::spawn(async move {
        // Connection 1: full handshake, hand out a session, then drop
        // with a transient code.
        let mut ws = accept(&listener).await;
        server_accepts.fetch_add(1, Ordering::SeqCst);

        send_json(&mut ws, hello(60000)).await;
        assert_eq!(recv_json(&mut ws).await["op"], 2);
        let heartbeat = recv_json(&mut ws).await;
        assert_eq!(heartbeat["op"], 1);
        send_json(&mut ws, json!({"op": 11})).await;
        send_json(&mut ws, ready("sess-1", 1)).await;
        close_with(&mut ws, 4000).await;

        // Connection 2: the shard must lead with RESUME, before HELLO.
        let mut ws = accept(&listener).await;
        server_accepts.fetch_add(1, Ordering::SeqCst);

        let resume = recv_json(&mut ws).await;
        assert_eq!(resume["op"], 6);
        assert_eq!(resume["d"]["token"], "test_token");
        assert_eq!(resume["d"]["session_id"], "sess-1");
        assert_eq!(resume["d"]["seq"], 1);

        send_json(&mut ws, hello(60000)).await;

        // HELLO after a resume spawns the pacemaker but no identify.
        let next = recv_json(&mut ws).await;
        assert_eq!(next["op"], 1);
        assert_eq!(next["d"], 1);

        close_with(&mut ws, 4004).await;
    });

    let shard = test_shard(url);
    let error = shard.run().await.expect_err("must be fatal");
    assert!(matches!(error, GatewayError::Fatal { code: 4004, .. }));

    server.await.expect("server");
    assert_eq!(accepts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missed_ack_reconnects_and_resumes() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        // Connection 1: never acknowledge the heartbeat.
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(100)).await;
        assert_eq!(recv_json(&mut ws).await["op"], 2);
        assert_eq!(recv_json(&mut ws).await["op"], 1);
        send_json(&mut ws, ready("sess-2", 1)).await;

        // The pacemaker's next tick notices the missing ACK and the
        // shard drops the connection itself.
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }

        // Connection 2: the lapse preserved the session.
        let mut ws = accept(&listener).await;
        let resume = recv_json(&mut ws).await;
        assert_eq!(resume["op"], 6);
        assert_eq!(resume["d"]["session_id"], "sess-2");
        assert_eq!(resume["d"]["seq"], 1);

        close_with(&mut ws, 4004).await;
    });

    let shard = test_shard(url);
    let error = shard.run().await.expect_err("must be fatal");
    assert!(matches!(error, GatewayError::Fatal { code: 4004, .. }));

    server.await.expect("server");
}

#[tokio::test]
async fn session_fatal_close_identifies_fresh() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        // Connection 1: hand out a session, then invalidate the sequence.
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(60000)).await;
        assert_eq!(recv_json(&mut ws).await["op"], 2);
        assert_eq!(recv_json(&mut ws).await["op"], 1);
        send_json(&mut ws, json!({"op": 11})).await;
        send_json(&mut ws, ready("sess-3", 7)).await;
        close_with(&mut ws, 4007).await;

        // Connection 2: no resume; a fresh identify after HELLO, and the
        // heartbeat sequence starts over.
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(60000)).await;

        let identify = recv_json(&mut ws).await;
        assert_eq!(identify["op"], 2);

        let heartbeat = recv_json(&mut ws).await;
        assert_eq!(heartbeat["op"], 1);
        assert_eq!(heartbeat["d"], Value::Null);

        close_with(&mut ws, 4004).await;
    });

    let shard = test_shard(url);
    let error = shard.run().await.expect_err("must be fatal");
    assert!(matches!(error, GatewayError::Fatal { code: 4004, .. }));

    server.await.expect("server");
}

#[tokio::test]
async fn connect_ratelimit_refetches_gateway_url() {
    let (listener, ws_url) = bind().await;

    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": ws_url.clone()})))
        .mount(&api)
        .await;

    let server = tokio::spawn(async move {
        // Connection 1: close with RATE_LIMITED, which voids both the
        // session and the cached URL.
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(60000)).await;
        assert_eq!(recv_json(&mut ws).await["op"], 2);
        assert_eq!(recv_json(&mut ws).await["op"], 1);
        close_with(&mut ws, 4008).await;

        // Connection 2 arrives only after a fresh /gateway fetch.
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(60000)).await;
        assert_eq!(recv_json(&mut ws).await["op"], 2);
        close_with(&mut ws, 4004).await;
    });

    let mut config = ShardConfig::new("test_token", Intents::default()).with_gateway_url(ws_url);
    config.reconnect_base_delay_ms = 50;
    config.reconnect_max_delay_ms = 100;

    let http = Arc::new(
        HttpClient::new("test_token")
            .expect("client")
            .with_base_url(api.uri()),
    );
    let shard = Shard::new(0, 1, config, http, Arc::new(EventDispatcher::new()));

    let error = shard.run().await.expect_err("must be fatal");
    assert!(matches!(error, GatewayError::Fatal { code: 4004, .. }));

    server.await.expect("server");

    let requests = api.received_requests().await.expect("recording");
    assert_eq!(requests.len(), 1, "the URL is re-fetched exactly once");
}

#[tokio::test]
async fn cluster_start_panics_on_fatal_close() {
    let (listener, ws_url) = bind().await;

    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": ws_url.clone(),
            "shards": 1,
            "session_start_limit": {
                "total": 1000,
                "remaining": 999,
                "reset_after": 0,
                "max_concurrency": 1
            }
        })))
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/gateway"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": ws_url.clone()})))
        .mount(&api)
        .await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(60000)).await;
        assert_eq!(recv_json(&mut ws).await["op"], 2);
        assert_eq!(recv_json(&mut ws).await["op"], 1);
        close_with(&mut ws, 4004).await;
    });

    let cluster = Cluster::new(
        ClusterConfig::new("test_token", Intents::default()).with_api_base_url(api.uri()),
    )
    .expect("cluster");

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    cluster.dispatcher().on("op_10", move |event| {
        let counter = counter.clone();
        async move {
            assert_eq!(event.shard_id, 0);
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let error = cluster.start().await.expect_err("must panic");
    assert!(matches!(error, GatewayError::Fatal { code: 4004, .. }));

    server.await.expect("server");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1, "HELLO reached listeners");
}
