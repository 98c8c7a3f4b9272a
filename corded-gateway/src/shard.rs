//! Shard implementation for the Gateway connection.
//!
//! A Shard owns a single WebSocket connection. It drives the handshake
//! (HELLO/IDENTIFY or RESUME), tracks the dispatch sequence, feeds every
//! frame through the event dispatcher, and classifies disconnects into
//! resume, fresh-identify, and fatal outcomes.

use crate::dispatch::EventDispatcher;
use crate::error::{CloseCode, GatewayError};
use crate::event::GatewayEvent;
use crate::heartbeat::HeartbeatHandler;
use crate::opcode::OpCode;
use crate::payload::{self, HelloPayload, RawPayload};
use crate::ratelimit::{exponential_backoff, with_jitter, FixedWindowLimiter};

use flume::{Receiver, Sender};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Outbound payload budget per shard.
const SEND_LIMIT_RATE: u32 = 120;
const SEND_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Budget for one websocket frame read.
const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Type alias for the WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Command sent to the shard's connection loop.
#[derive(Debug)]
enum ShardCommand {
    /// Serialize and send a payload frame.
    Send(Value),
    /// The pacemaker observed a missed ACK; drop the connection and resume.
    Lapsed,
}

/// Shard connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Created, not yet running.
    Idle,
    /// Opening the websocket.
    Connecting,
    /// Connected, handshake in flight.
    Handshaking,
    /// Resuming a previous session.
    Resuming,
    /// Fully connected and exchanging events.
    Running,
    /// Backing off before the next connection attempt.
    Reconnecting,
    /// Permanently stopped.
    Closed,
}

/// Configuration for a shard.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Bot token.
    pub token: String,

    /// Gateway intents.
    pub intents: corded_model::Intents,

    /// Pre-seeded gateway URL. When absent the shard fetches `/gateway`
    /// on first connect and caches the result.
    pub gateway_url: Option<String>,

    /// Base reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    pub reconnect_max_delay_ms: u64,
}

impl ShardConfig {
    /// Create a new shard configuration with required fields.
    pub fn new(token: impl Into<String>, intents: corded_model::Intents) -> Self {
        Self {
            token: token.into(),
            intents,
            gateway_url: None,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
        }
    }

    /// Seed the gateway URL instead of fetching `/gateway`.
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }
}

/// A Gateway shard.
///
/// Handles the websocket connection, heartbeating, event dispatch, and
/// automatic reconnection with session resumption.
pub struct Shard {
    // =========================================================================
    // Identity
    // =========================================================================
    /// This shard's ID.
    shard_id: u16,

    /// Total number of shards.
    shard_count: u16,

    // =========================================================================
    // Configuration & collaborators
    // =========================================================================
    /// Shard configuration.
    config: ShardConfig,

    /// HTTP client used to fetch the gateway URL.
    http: Arc<corded_http::HttpClient>,

    /// Dispatcher every inbound and outbound event flows through.
    dispatcher: Arc<EventDispatcher>,

    // =========================================================================
    // State
    // =========================================================================
    /// Current connection state.
    state: RwLock<ShardState>,

    /// Cached gateway URL; cleared when the server rate limits connects.
    url: RwLock<Option<String>>,

    /// Session id captured from READY, kept across transient disconnects.
    session: RwLock<Option<String>>,

    /// Last sequence number received (0 = none yet). Driven only by
    /// inbound `s` values.
    sequence: Arc<AtomicU64>,

    /// Heartbeat liveness state shared with the pacemaker.
    heartbeat: Arc<HeartbeatHandler>,

    /// Outbound payload budget.
    send_limiter: FixedWindowLimiter,

    /// Whether shutdown has been requested.
    shutdown: AtomicBool,

    /// Channel for sending commands to the shard loop.
    command_tx: Sender<ShardCommand>,

    /// Channel for receiving commands in the shard loop.
    command_rx: Receiver<ShardCommand>,
}

impl Shard {
    /// Create a new shard.
    pub fn new(
        shard_id: u16,
        shard_count: u16,
        config: ShardConfig,
        http: Arc<corded_http::HttpClient>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let (command_tx, command_rx) = flume::unbounded();
        let url = RwLock::new(config.gateway_url.clone());

        Self {
            shard_id,
            shard_count,
            config,
            http,
            dispatcher,
            state: RwLock::new(ShardState::Idle),
            url,
            session: RwLock::new(None),
            sequence: Arc::new(AtomicU64::new(0)),
            heartbeat: Arc::new(HeartbeatHandler::default()),
            send_limiter: FixedWindowLimiter::new(SEND_LIMIT_RATE, SEND_LIMIT_WINDOW),
            shutdown: AtomicBool::new(false),
            command_tx,
            command_rx,
        }
    }

    /// Get the shard ID.
    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }

    /// Get the total number of shards.
    pub fn shard_count(&self) -> u16 {
        self.shard_count
    }

    /// Get the current shard state.
    pub fn state(&self) -> ShardState {
        *self.state.read()
    }

    /// Get the last sequence number (None before any Dispatch frame).
    pub fn sequence(&self) -> Option<u64> {
        let seq = self.sequence.load(Ordering::SeqCst);
        (seq > 0).then_some(seq)
    }

    /// Get the current session id, if any.
    pub fn session(&self) -> Option<String> {
        self.session.read().clone()
    }

    /// Get the last measured heartbeat latency.
    pub fn latency(&self) -> Option<Duration> {
        self.heartbeat.latency()
    }

    /// Request a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Queue a raw payload for transmission on this shard.
    ///
    /// The frame passes the send limiter and is dispatched as an outbound
    /// event before it reaches the wire.
    pub fn send_payload(&self, frame: Value) -> Result<(), GatewayError> {
        self.command_tx
            .send(ShardCommand::Send(frame))
            .map_err(GatewayError::from)
    }

    /// Run the shard until shutdown or a fatal close code.
    ///
    /// Reconnection happens here, in one explicit loop: transient failures
    /// back off and retry preserving the session, session-fatal close codes
    /// drop the session first, and fatal close codes return the error for
    /// the cluster to escalate.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let mut reconnect_attempts = 0u32;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!(shard_id = self.shard_id, "Shard shutdown requested");
                *self.state.write() = ShardState::Closed;
                return Ok(());
            }

            match self.connect_once(&mut reconnect_attempts).await {
                Ok(()) => {
                    *self.state.write() = ShardState::Closed;
                    return Ok(());
                }
                Err(GatewayError::Closed { code, reason }) => match CloseCode::from_code(code) {
                    Some(close) if close.is_fatal() => {
                        error!(
                            shard_id = self.shard_id,
                            code,
                            reason = %reason,
                            "Fatal close code, not reconnecting"
                        );
                        *self.state.write() = ShardState::Closed;
                        return Err(GatewayError::Fatal { code, reason });
                    }
                    Some(close) if close.resets_session() => {
                        warn!(
                            shard_id = self.shard_id,
                            code, "Session invalidated, next connect identifies fresh"
                        );
                        *self.session.write() = None;
                        self.sequence.store(0, Ordering::SeqCst);
                        if close == CloseCode::RateLimited {
                            *self.url.write() = None;
                        }
                    }
                    _ => {
                        warn!(
                            shard_id = self.shard_id,
                            code,
                            reason = %reason,
                            "Connection closed, reconnecting"
                        );
                    }
                },
                Err(GatewayError::HeartbeatLapsed) => {
                    warn!(shard_id = self.shard_id, "Heartbeat lapsed, reconnecting");
                }
                Err(GatewayError::ReconnectRequested) => {
                    info!(shard_id = self.shard_id, "Server requested reconnect");
                }
                Err(e) => {
                    warn!(shard_id = self.shard_id, error = %e, "Shard connection error");
                }
            }

            reconnect_attempts += 1;
            let backoff = with_jitter(
                exponential_backoff(
                    reconnect_attempts.saturating_sub(1),
                    self.config.reconnect_base_delay_ms,
                    self.config.reconnect_max_delay_ms,
                ),
                0.25,
            );

            info!(
                shard_id = self.shard_id,
                attempt = reconnect_attempts,
                backoff_ms = backoff.as_millis() as u64,
                "Waiting before reconnect"
            );

            *self.state.write() = ShardState::Reconnecting;
            sleep(backoff).await;
        }
    }

    /// Connect and serve one websocket session.
    async fn connect_once(&self, reconnect_attempts: &mut u32) -> Result<(), GatewayError> {
        *self.state.write() = ShardState::Connecting;

        let url = self.resolve_url().await?;
        info!(shard_id = self.shard_id, url = %url, "Connecting to gateway");

        let (ws, _response) = connect_async(url.as_str()).await?;
        let (mut sink, mut source) = ws.split();

        *self.state.write() = ShardState::Handshaking;

        // Commands queued against a previous connection are stale.
        while self.command_rx.try_recv().is_ok() {}

        self.heartbeat.reset();

        // Prefer resuming: the RESUME goes out before the server's HELLO
        // can trigger a fresh identify.
        let session = self.session.read().clone();
        let resumed = session.is_some();
        if let Some(session_id) = session {
            *self.state.write() = ShardState::Resuming;
            info!(
                shard_id = self.shard_id,
                session_id = %session_id,
                "Resuming session"
            );
            let frame = payload::resume(&self.config.token, &session_id, self.sequence());
            self.send(&mut sink, frame).await?;
        }

        let mut pacemaker: Option<JoinHandle<()>> = None;
        let result = self
            .read_loop(&mut sink, &mut source, &mut pacemaker, resumed, reconnect_attempts)
            .await;

        // The pacemaker must never outlive its connection.
        if let Some(handle) = pacemaker.take() {
            handle.abort();
        }

        result
    }

    /// Resolve the websocket URL, fetching `/gateway` when not cached.
    async fn resolve_url(&self) -> Result<Url, GatewayError> {
        let cached = self.url.read().clone();
        let base = match cached {
            Some(base) => base,
            None => {
                debug!(shard_id = self.shard_id, "Fetching gateway URL");
                let gateway = self.http.get_gateway().await?;
                *self.url.write() = Some(gateway.url.clone());
                gateway.url
            }
        };

        let mut url = Url::parse(&base)?;
        url.query_pairs_mut()
            .append_pair("v", &crate::GATEWAY_VERSION.to_string())
            .append_pair("encoding", "json");

        Ok(url)
    }

    /// Serve frames and commands until the connection ends.
    async fn read_loop(
        &self,
        sink: &mut WsSink,
        source: &mut WsSource,
        pacemaker: &mut Option<JoinHandle<()>>,
        resumed: bool,
        reconnect_attempts: &mut u32,
    ) -> Result<(), GatewayError> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                let _ = sink.close().await;
                return Ok(());
            }

            tokio::select! {
                frame = timeout(FRAME_READ_TIMEOUT, source.next()) => {
                    let frame = frame.map_err(|_| GatewayError::Closed {
                        code: 0,
                        reason: "frame read timed out".to_string(),
                    })?;

                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            self.handle_frame(text.as_str(), sink, pacemaker, resumed, reconnect_attempts)
                                .await?;
                        }
                        Some(Ok(WsMessage::Close(close))) => {
                            let (code, reason) = close
                                .map(|f: CloseFrame| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((0, String::new()));
                            return Err(GatewayError::Closed { code, reason });
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            sink.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(GatewayError::WebSocket(e)),
                        None => {
                            return Err(GatewayError::Closed {
                                code: 0,
                                reason: "websocket stream ended".to_string(),
                            });
                        }
                    }
                }

                command = self.command_rx.recv_async() => {
                    match command {
                        Ok(ShardCommand::Send(frame)) => {
                            self.send(sink, frame).await?;
                        }
                        Ok(ShardCommand::Lapsed) => {
                            let _ = sink.close().await;
                            return Err(GatewayError::HeartbeatLapsed);
                        }
                        Err(e) => return Err(GatewayError::ChannelSend(e.to_string())),
                    }
                }
            }
        }
    }

    /// Parse one inbound text frame, dispatch it, then react on its opcode.
    async fn handle_frame(
        &self,
        text: &str,
        sink: &mut WsSink,
        pacemaker: &mut Option<JoinHandle<()>>,
        resumed: bool,
        reconnect_attempts: &mut u32,
    ) -> Result<(), GatewayError> {
        let frame: RawPayload = serde_json::from_str(text)?;

        if let Some(seq) = frame.s {
            self.sequence.store(seq, Ordering::SeqCst);
        }

        // READY carries the session id later disconnects resume with.
        if frame.t.as_deref() == Some("READY") {
            if let Some(session_id) = frame.d.get("session_id").and_then(Value::as_str) {
                *self.session.write() = Some(session_id.to_string());
                info!(
                    shard_id = self.shard_id,
                    session_id = %session_id,
                    "Shard ready"
                );
            }
        }

        self.dispatcher
            .dispatch(GatewayEvent::inbound(self.shard_id, &frame))
            .await;

        match OpCode::from_u8(frame.op) {
            Some(OpCode::Hello) => {
                let hello: HelloPayload = serde_json::from_value(frame.d.clone())?;
                let interval = Duration::from_millis(hello.heartbeat_interval);

                debug!(
                    shard_id = self.shard_id,
                    interval_ms = hello.heartbeat_interval,
                    "Received Hello"
                );

                self.heartbeat.set_interval(interval);
                self.heartbeat.reset();

                if let Some(previous) = pacemaker.take() {
                    previous.abort();
                }
                *pacemaker = Some(spawn_pacemaker(
                    self.shard_id,
                    interval,
                    self.heartbeat.clone(),
                    self.sequence.clone(),
                    self.command_tx.clone(),
                ));

                if !resumed {
                    info!(shard_id = self.shard_id, "Sending Identify");
                    let frame = payload::identify(
                        &self.config.token,
                        self.config.intents,
                        self.shard_id,
                        self.shard_count,
                    );
                    self.send(sink, frame).await?;
                }

                *self.state.write() = ShardState::Running;
                *reconnect_attempts = 0;
            }
            Some(OpCode::HeartbeatAck) => {
                self.heartbeat.mark_acked();
                let rtt = self.heartbeat.latency().unwrap_or_default();
                trace!(
                    shard_id = self.shard_id,
                    rtt_ms = rtt.as_millis() as u64,
                    "Heartbeat ACK received"
                );
            }
            Some(OpCode::Reconnect) => {
                let _ = sink.close().await;
                return Err(GatewayError::ReconnectRequested);
            }
            _ => {
                trace!(shard_id = self.shard_id, op = frame.op, "No reaction for opcode");
            }
        }

        Ok(())
    }

    /// Send one frame: limiter, outbound event dispatch, then the wire.
    async fn send(&self, sink: &mut WsSink, frame: Value) -> Result<(), GatewayError> {
        self.send_limiter.wait().await;

        self.dispatcher
            .dispatch(GatewayEvent::outbound(self.shard_id, &frame))
            .await;

        let text = serde_json::to_string(&frame)?;
        trace!(shard_id = self.shard_id, "Sending payload");
        sink.send(WsMessage::Text(text.into())).await?;

        Ok(())
    }
}

/// Spawn the pacemaker task for one connection.
///
/// The pacemaker holds no websocket reference: heartbeats travel through
/// the shard's command channel, and a missed ACK tells the connection loop
/// to drop the socket and take the resume path. It never writes the
/// sequence number.
fn spawn_pacemaker(
    shard_id: u16,
    interval: Duration,
    heartbeat: Arc<HeartbeatHandler>,
    sequence: Arc<AtomicU64>,
    commands: Sender<ShardCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            shard_id,
            interval_ms = interval.as_millis() as u64,
            "Pacemaker started"
        );

        loop {
            if !heartbeat.is_acked() {
                heartbeat.mark_lapsed();
                warn!(
                    shard_id,
                    failed = heartbeat.failed_heartbeats(),
                    "Heartbeat went unacknowledged, dropping connection"
                );
                let _ = commands.send(ShardCommand::Lapsed);
                return;
            }

            heartbeat.mark_sent();
            let seq = sequence.load(Ordering::SeqCst);
            let frame = payload::heartbeat((seq > 0).then_some(seq));
            if commands.send(ShardCommand::Send(frame)).is_err() {
                return;
            }

            sleep(interval).await;
        }
    })
}
