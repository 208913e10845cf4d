// Shared test doubles for the origin and the real-time connection.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

use tether_api::{
    Connection, ConnectionLink, Connector, EndpointRef, Error, Origin, RunOutcome, Snowflake,
    UserData,
};
use tether_core::{
    Event, EventArgs, Handler, HandlerResult, ReconnectConfig, SessionConfig,
};

pub const BAD_TOKEN: &str = "bad-token";

pub fn token(value: &str) -> SecretString {
    value.to_string().into()
}

/// Session config with millisecond backoff so error paths run fast.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        max_consecutive_errors: None,
        shutdown_grace: Duration::from_secs(2),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}

// ── MockOrigin ──────────────────────────────────────────────────────

/// In-memory origin. Rejects [`BAD_TOKEN`]; serves entities seeded with
/// [`with_entity`](Self::with_entity) and 404s everything else.
#[derive(Default)]
pub struct MockOrigin {
    pub auth_calls: AtomicUsize,
    pub endpoint_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    entities: Mutex<HashMap<(&'static str, u64), Value>>,
    fail_endpoint: bool,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_endpoint() -> Self {
        Self {
            fail_endpoint: true,
            ..Self::default()
        }
    }

    pub fn with_entity(self, kind: &'static str, id: u64, raw: Value) -> Self {
        self.entities.lock().unwrap().insert((kind, id), raw);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn fetch(&self, kind: &'static str, id: Snowflake) -> Result<Value, Error> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent resolves a chance to interleave.
        tokio::task::yield_now().await;
        self.entities
            .lock()
            .unwrap()
            .get(&(kind, id.get()))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                route: format!("{kind}s/{id}"),
            })
    }
}

impl Origin for MockOrigin {
    async fn authenticate(&self, token: &SecretString) -> Result<UserData, Error> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if token.expose_secret() == BAD_TOKEN {
            return Err(Error::Authentication {
                message: "improper token has been passed".into(),
            });
        }
        Ok(serde_json::from_value(json!({
            "id": "1000",
            "username": "tether-bot",
            "bot": true
        }))
        .unwrap())
    }

    async fn resolve_endpoint(&self) -> Result<EndpointRef, Error> {
        self.endpoint_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_endpoint {
            return Err(Error::EndpointUnavailable {
                reason: "scripted".into(),
            });
        }
        Ok(EndpointRef {
            url: Url::parse("wss://gateway.test/?v=10&encoding=json").unwrap(),
            shards: 1,
        })
    }

    async fn fetch_channel(&self, id: Snowflake) -> Result<Value, Error> {
        self.fetch("channel", id).await
    }

    async fn fetch_guild(&self, id: Snowflake) -> Result<Value, Error> {
        self.fetch("guild", id).await
    }

    async fn fetch_user(&self, id: Snowflake) -> Result<Value, Error> {
        self.fetch("user", id).await
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ── ScriptedConnector ───────────────────────────────────────────────

/// One scripted `run_once` pass. When the script runs out, passes wait
/// for cancellation.
#[derive(Debug, Clone)]
pub enum Step {
    Ended,
    Reconnect,
    /// Fail while the transport stays usable.
    Fail,
    /// Fail and mark the transport dead.
    FailClosed,
    /// Post on the reconnect channel, then end the pass.
    SignalReconnect,
    /// Emit an event, then carry on with the next step in the same pass.
    Emit(&'static str, Value),
    Hang,
}

#[derive(Debug, Default)]
pub struct ConnectorStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub runs: AtomicUsize,
}

impl ConnectorStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Step>>>,
    pub stats: Arc<ConnectorStats>,
    /// Opens numbered at or after this index fail.
    fail_opens_from: Option<usize>,
}

impl ScriptedConnector {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            stats: Arc::new(ConnectorStats::default()),
            fail_opens_from: None,
        }
    }

    pub fn failing_opens_from(mut self, index: usize) -> Self {
        self.fail_opens_from = Some(index);
        self
    }
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn open(
        &self,
        _endpoint: &EndpointRef,
        link: ConnectionLink,
    ) -> Result<ScriptedConnection, Error> {
        let index = self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_opens_from.is_some_and(|from| index >= from) {
            return Err(Error::WebSocketConnect("scripted open failure".into()));
        }
        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(ScriptedConnection {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
            link,
            open: true,
        })
    }
}

pub struct ScriptedConnection {
    script: Arc<Mutex<VecDeque<Step>>>,
    stats: Arc<ConnectorStats>,
    link: ConnectionLink,
    open: bool,
}

impl Connection for ScriptedConnection {
    async fn run_once(&mut self, cancel: &CancellationToken) -> Result<RunOutcome, Error> {
        self.stats.runs.fetch_add(1, Ordering::SeqCst);
        loop {
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Hang);
            match step {
                Step::Ended => return Ok(RunOutcome::Ended),
                Step::Reconnect => return Ok(RunOutcome::ReconnectRequested),
                Step::Fail => return Err(Error::WebSocketConnect("scripted failure".into())),
                Step::FailClosed => {
                    self.mark_closed();
                    return Err(Error::WebSocketClosed {
                        code: 4000,
                        reason: "scripted".into(),
                    });
                }
                Step::SignalReconnect => {
                    self.link.reconnect.request();
                    return Ok(RunOutcome::Ended);
                }
                Step::Emit(name, payload) => self.link.events.emit(name, payload),
                Step::Hang => {
                    cancel.cancelled().await;
                    return Ok(RunOutcome::Ended);
                }
            }
        }
    }

    async fn send(&mut self, _payload: Value) -> Result<(), Error> {
        Ok(())
    }

    async fn close(&mut self, _reconnect: bool) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.mark_closed();
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl ScriptedConnection {
    fn mark_closed(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ── Handler helpers ─────────────────────────────────────────────────

/// Handler that bumps `counter` each time it runs.
pub fn counting(counter: &Arc<AtomicUsize>) -> Handler {
    let counter = Arc::clone(counter);
    Handler::new(move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

/// Handler that records the origin of every error event it receives.
pub fn error_recorder(origins: &Arc<Mutex<Vec<String>>>) -> Handler {
    let origins = Arc::clone(origins);
    Handler::new(move |event: Arc<Event>| {
        let origins = Arc::clone(&origins);
        async move {
            if let EventArgs::Error(ctx) = &event.args {
                origins.lock().unwrap().push(ctx.origin.clone());
            }
            HandlerResult::Ok(())
        }
    })
}
