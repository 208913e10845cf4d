//! Gateway connection over WebSocket.
//!
//! [`GatewayConnector`] opens a [`GatewayConnection`] to the endpoint
//! discovered through the REST client. A connection identifies itself
//! after `HELLO`, keeps the heartbeat schedule, turns `DISPATCH` frames
//! into named events on its [`EventSink`](crate::EventSink), and reports
//! server-requested reconnects as [`RunOutcome::ReconnectRequested`].
//!
//! Only JSON text frames are understood; binary (compressed) frames are
//! skipped.

use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, ConnectionLink, Connector, RunOutcome};
use crate::error::Error;
use crate::models::EndpointRef;
use crate::transport::DEFAULT_USER_AGENT;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Opcodes ──────────────────────────────────────────────────────────

mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Close code sent when the session should stay resumable.
const CLOSE_CODE_RESUMABLE: u16 = 4000;

// ── GatewayConfig ────────────────────────────────────────────────────

/// Settings for gateway connections.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Intents bitfield sent with `IDENTIFY`.
    pub intents: u64,
    /// How long a heartbeat may go unacknowledged before the connection
    /// is treated as a zombie. Default: 30s.
    pub heartbeat_timeout: Duration,
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            intents: 0,
            heartbeat_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

// ── GatewayConnector ─────────────────────────────────────────────────

/// Opens WebSocket gateway connections authenticated with a bot token.
pub struct GatewayConnector {
    token: SecretString,
    config: GatewayConfig,
}

impl GatewayConnector {
    pub fn new(token: SecretString, config: GatewayConfig) -> Self {
        Self { token, config }
    }
}

impl Connector for GatewayConnector {
    type Connection = GatewayConnection;

    async fn open(
        &self,
        endpoint: &EndpointRef,
        link: ConnectionLink,
    ) -> Result<GatewayConnection, Error> {
        tracing::info!(url = %endpoint.url, "connecting to gateway");

        let uri: tungstenite::http::Uri = endpoint.url.as_str().parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()),
        )?;
        let request =
            ClientRequestBuilder::new(uri).with_header("User-Agent", self.config.user_agent.clone());

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("gateway connected");

        let (sink, stream) = ws_stream.split();
        Ok(GatewayConnection {
            sink,
            stream,
            link,
            token: SecretString::from(self.token.expose_secret().to_owned()),
            intents: self.config.intents,
            heartbeat: None,
            heartbeat_timeout: self.config.heartbeat_timeout,
            sequence: None,
            session_id: None,
            open: true,
            close_code: None,
        })
    }
}

// ── Heartbeat bookkeeping ────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Heartbeat {
    interval: Duration,
    next_beat: Instant,
    last_sent: Option<Instant>,
    awaiting_ack: bool,
}

impl Heartbeat {
    /// Schedule the first beat at a jittered fraction of the interval.
    fn start(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_beat: now + first_beat_delay(interval, Utc::now().timestamp_subsec_nanos()),
            last_sent: None,
            awaiting_ack: false,
        }
    }

    fn sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
        self.awaiting_ack = true;
        self.next_beat = now + self.interval;
    }

    fn acked(&mut self) {
        self.awaiting_ack = false;
    }

    /// The previous beat was never acknowledged within `timeout`.
    fn is_zombie(&self, now: Instant, timeout: Duration) -> bool {
        self.awaiting_ack
            && self
                .last_sent
                .is_some_and(|sent| now.saturating_duration_since(sent) >= timeout)
    }
}

/// `interval * (nanos / 1e9)`: a deterministic spread in `[0, interval)`.
fn first_beat_delay(interval: Duration, subsec_nanos: u32) -> Duration {
    let fraction = f64::from(subsec_nanos.min(999_999_999)) / 1_000_000_000.0;
    interval.mul_f64(fraction)
}

// ── Frames ───────────────────────────────────────────────────────────

/// Gateway frame envelope: `{"op": N, "d": ..., "s": N, "t": "NAME"}`.
#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: serde_json::Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

fn decode_frame(text: &str) -> Option<GatewayPayload> {
    match serde_json::from_str(text) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse gateway frame");
            None
        }
    }
}

/// `READY` -> `on_ready`.
fn dispatch_event_name(t: &str) -> String {
    format!("on_{}", t.to_lowercase())
}

// ── GatewayConnection ────────────────────────────────────────────────

/// One live gateway WebSocket.
pub struct GatewayConnection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    link: ConnectionLink,
    token: SecretString,
    intents: u64,
    heartbeat: Option<Heartbeat>,
    heartbeat_timeout: Duration,
    sequence: Option<u64>,
    session_id: Option<String>,
    open: bool,
    close_code: Option<u16>,
}

impl GatewayConnection {
    /// Session id captured from `READY`, if received.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Last dispatch sequence number seen.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    async fn send_heartbeat(&mut self) -> Result<(), Error> {
        let beat = json!({ "op": op::HEARTBEAT, "d": self.sequence });
        self.send_json(&beat).await?;
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.sent(Instant::now());
        }
        tracing::trace!(seq = ?self.sequence, "heartbeat sent");
        Ok(())
    }

    async fn identify(&mut self) -> Result<(), Error> {
        let payload = json!({
            "op": op::IDENTIFY,
            "d": {
                "token": self.token.expose_secret(),
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "tether",
                    "device": "tether",
                },
            },
        });
        self.send_json(&payload).await?;
        tracing::debug!(intents = self.intents, "identify sent");
        Ok(())
    }

    async fn send_json(&mut self, payload: &serde_json::Value) -> Result<(), Error> {
        if !self.open {
            return Err(Error::WebSocketClosed {
                code: self.close_code.unwrap_or(1000),
                reason: "connection already closed".into(),
            });
        }
        self.sink
            .send(Message::text(payload.to_string()))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))
    }

    /// Apply one decoded frame. `Some` ends the current `run_once` pass.
    async fn handle_payload(&mut self, payload: GatewayPayload) -> Result<Option<RunOutcome>, Error> {
        match payload.op {
            op::HELLO => {
                let interval_ms = payload
                    .d
                    .get("heartbeat_interval")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(41_250);
                tracing::debug!(interval_ms, "hello received");
                self.heartbeat = Some(Heartbeat::start(
                    Duration::from_millis(interval_ms),
                    Instant::now(),
                ));
                self.identify().await?;
            }
            op::HEARTBEAT_ACK => {
                if let Some(hb) = self.heartbeat.as_mut() {
                    hb.acked();
                }
                tracing::trace!("heartbeat acknowledged");
            }
            op::HEARTBEAT => self.send_heartbeat().await?,
            op::DISPATCH => {
                if payload.s.is_some() {
                    self.sequence = payload.s;
                }
                let Some(t) = payload.t else {
                    return Ok(None);
                };
                if t == "READY" {
                    self.session_id = payload
                        .d
                        .get("session_id")
                        .and_then(serde_json::Value::as_str)
                        .map(String::from);
                    tracing::info!(session_id = ?self.session_id, "gateway ready");
                }
                self.link.events.emit(&dispatch_event_name(&t), payload.d);
            }
            op::RECONNECT => {
                tracing::info!("gateway requested reconnect");
                return Ok(Some(RunOutcome::ReconnectRequested));
            }
            op::INVALID_SESSION => {
                tracing::warn!("gateway invalidated the session");
                return Ok(Some(RunOutcome::ReconnectRequested));
            }
            other => tracing::trace!(op = other, "ignoring gateway opcode"),
        }
        Ok(None)
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Connection for GatewayConnection {
    async fn run_once(&mut self, cancel: &CancellationToken) -> Result<RunOutcome, Error> {
        loop {
            let next_beat = self.heartbeat.as_ref().map(|hb| hb.next_beat);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(RunOutcome::Ended),
                () = sleep_until_opt(next_beat) => {
                    let zombie = self
                        .heartbeat
                        .as_ref()
                        .is_some_and(|hb| hb.is_zombie(Instant::now(), self.heartbeat_timeout));
                    if zombie {
                        tracing::warn!("heartbeat not acknowledged, requesting reconnect");
                        return Ok(RunOutcome::ReconnectRequested);
                    }
                    self.send_heartbeat().await?;
                }
                frame = self.stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(payload) = decode_frame(text.as_str()) {
                                if let Some(outcome) = self.handle_payload(payload).await? {
                                    return Ok(outcome);
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            self.open = false;
                            if let Some(cf) = frame {
                                tracing::info!(
                                    code = %cf.code,
                                    reason = %cf.reason,
                                    "gateway close frame received"
                                );
                                self.close_code = Some(u16::from(cf.code));
                            } else {
                                tracing::info!("gateway close frame received (no payload)");
                            }
                            return Ok(RunOutcome::Ended);
                        }
                        Some(Err(e)) => {
                            self.open = false;
                            return Err(Error::WebSocketConnect(e.to_string()));
                        }
                        None => {
                            self.open = false;
                            tracing::info!("gateway stream ended");
                            return Ok(RunOutcome::Ended);
                        }
                        Some(Ok(Message::Binary(_))) => {
                            tracing::trace!("skipping binary gateway frame");
                        }
                        Some(Ok(_)) => {
                            // Ping, Pong, Frame: tungstenite answers pings itself
                        }
                    }
                }
            }
        }
    }

    async fn send(&mut self, payload: serde_json::Value) -> Result<(), Error> {
        self.send_json(&payload).await
    }

    async fn close(&mut self, reconnect: bool) {
        if !self.open {
            return;
        }
        self.open = false;
        let code = if reconnect {
            CLOSE_CODE_RESUMABLE
        } else {
            1000
        };
        self.close_code = Some(code);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "closing".into(),
        };
        if let Err(e) = self.sink.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "close frame not delivered");
        }
        let _ = self.sink.close().await;
        tracing::debug!(code, reconnect, "gateway connection closed");
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ── Tests ────────────────────────────────────────────────────────────
