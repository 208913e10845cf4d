// ── Session controller ──
//
// Full lifecycle of one client session: authenticate, open the real-time
// connection, keep it served across reconnect requests and loop failures,
// and tear everything down exactly once.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use secrecy::SecretString;
use strum::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tether_api::{
    Connection, ConnectionLink, Connector, EndpointRef, Origin, ReconnectReceiver,
    ReconnectRequester, RunOutcome, Snowflake, reconnect_signal,
};

use crate::config::{SessionConfig, calculate_backoff};
use crate::dispatch::Dispatcher;
use crate::error::CoreError;
use crate::event::{EventArgs, Handler};
use crate::model::{Entity, EntityKind, User};
use crate::resolve::ObjectResolver;
use crate::store::ObjectCache;

/// Dispatched after every connection is opened.
pub const CONNECT_EVENT: &str = "connect";
/// Dispatched after every connection is closed.
pub const DISCONNECT_EVENT: &str = "disconnect";

// ── SessionState ─────────────────────────────────────────────────────

/// Session lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Idle,
    Authenticating,
    Connected,
    Reconnecting,
    Terminated,
}

// ── SessionController ────────────────────────────────────────────────

/// The main entry point for applications.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Owns at most one live
/// connection at a time; replacing it always closes the old one first.
pub struct SessionController<O, C> {
    inner: Arc<SessionInner<O, C>>,
}

impl<O, C> Clone for SessionController<O, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<O, C> {
    config: SessionConfig,
    origin: Arc<O>,
    connector: C,
    cache: Arc<ObjectCache>,
    dispatcher: Dispatcher,
    resolver: ObjectResolver<O>,
    state: watch::Sender<SessionState>,
    me: ArcSwapOption<User>,
    /// Replaced on every login; cancelled by shutdown.
    session_token: Mutex<CancellationToken>,
    /// Child token of the connection currently being driven.
    connection_token: Mutex<Option<CancellationToken>>,
    reconnect_tx: ReconnectRequester,
    reconnect_rx: tokio::sync::Mutex<ReconnectReceiver>,
    loop_active: watch::Sender<bool>,
    shut_down: AtomicBool,
    lifecycle: tokio::sync::Mutex<()>,
}

/// Result of replacing the current connection.
enum Reopen<T> {
    Opened(T),
    Cancelled,
    Failed(tether_api::Error),
}

/// Clears `loop_active` however `run` exits, including being dropped.
struct LoopGuard<'a>(&'a watch::Sender<bool>);

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl<O: Origin, C: Connector> SessionController<O, C> {
    /// Create an idle session. Nothing touches the network until
    /// [`login`](Self::login) or [`start`](Self::start).
    pub fn new(origin: Arc<O>, connector: C, config: SessionConfig) -> Self {
        let cache = Arc::new(ObjectCache::new());
        let resolver = ObjectResolver::new(Arc::clone(&origin), Arc::clone(&cache));
        let (state, _) = watch::channel(SessionState::Idle);
        let (loop_active, _) = watch::channel(false);
        let (reconnect_tx, reconnect_rx) = reconnect_signal();

        Self {
            inner: Arc::new(SessionInner {
                config,
                origin,
                connector,
                cache,
                dispatcher: Dispatcher::new(),
                resolver,
                state,
                me: ArcSwapOption::empty(),
                session_token: Mutex::new(CancellationToken::new()),
                connection_token: Mutex::new(None),
                reconnect_tx,
                reconnect_rx: tokio::sync::Mutex::new(reconnect_rx),
                loop_active,
                shut_down: AtomicBool::new(false),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The authenticated user, once `login` has succeeded.
    pub fn me(&self) -> Option<Arc<User>> {
        self.inner.me.load_full()
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.inner.cache
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn resolver(&self) -> &ObjectResolver<O> {
        &self.inner.resolver
    }

    pub fn origin(&self) -> &Arc<O> {
        &self.inner.origin
    }

    // ── Application surface ──────────────────────────────────────────

    /// Register the primary handler for an event (`None` uses the handler's name).
    pub fn event(&self, name: Option<&str>, handler: Handler) -> Result<String, CoreError> {
        self.inner.dispatcher.set_primary(name, handler)
    }

    /// Add a listener for an event (`None` uses the handler's name).
    pub fn listener(&self, name: Option<&str>, handler: Handler) -> Result<String, CoreError> {
        self.inner.dispatcher.add_listener(name, handler)
    }

    pub async fn resolve(&self, id: Snowflake, kind: EntityKind) -> Result<Entity, CoreError> {
        self.inner.resolver.resolve(id, kind).await
    }

    pub async fn resolve_tag(&self, id: Snowflake, tag: &str) -> Result<Entity, CoreError> {
        self.inner.resolver.resolve_tag(id, tag).await
    }

    /// Ask the run loop to replace the current connection.
    pub fn request_reconnect(&self) {
        self.inner.reconnect_tx.request();
        if let Some(token) = self.lock_connection_token().as_ref() {
            token.cancel();
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Authenticate with the origin. Exactly one origin call per invocation.
    ///
    /// On success the user is cached and recorded as [`me`](Self::me), and
    /// the session waits in `Authenticating` for [`run`](Self::run). On
    /// failure the session returns to `Idle`.
    pub async fn login(&self, credential: &SecretString) -> Result<Arc<User>, CoreError> {
        if matches!(
            self.state(),
            SessionState::Connected | SessionState::Reconnecting
        ) || *self.inner.loop_active.borrow()
        {
            return Err(CoreError::AlreadyRunning);
        }

        *self.lock_session_token() = CancellationToken::new();
        self.inner.shut_down.store(false, Ordering::Release);
        self.inner.me.store(None);
        self.set_state(SessionState::Authenticating);

        match self.inner.origin.authenticate(credential).await {
            Ok(raw) => {
                let me = Arc::new(User::from(raw));
                self.inner
                    .cache
                    .put(EntityKind::User, me.id, Entity::User(Arc::clone(&me)));
                self.inner.me.store(Some(Arc::clone(&me)));
                info!(user_id = %me.id, username = %me.username, "logged in");
                Ok(me)
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                self.set_state(SessionState::Idle);
                Err(e.into())
            }
        }
    }

    /// Open the connection and serve it until the session ends.
    ///
    /// Requires a completed [`login`](Self::login). Failures while setting
    /// up (endpoint discovery, first open) are returned; failures inside the
    /// loop are dispatched as `error` events and never returned.
    pub async fn run(&self) -> Result<(), CoreError> {
        match self.state() {
            SessionState::Authenticating if self.inner.me.load().is_some() => {}
            SessionState::Connected | SessionState::Reconnecting => {
                return Err(CoreError::AlreadyRunning);
            }
            _ => return Err(CoreError::NotAuthenticated),
        }
        let Ok(mut signal) = self.inner.reconnect_rx.try_lock() else {
            return Err(CoreError::AlreadyRunning);
        };

        self.inner.loop_active.send_replace(true);
        let _active = LoopGuard(&self.inner.loop_active);
        let session = self.session_token();
        signal.take();

        let endpoint = tokio::select! {
            biased;
            () = session.cancelled() => {
                self.set_state(SessionState::Terminated);
                return Ok(());
            }
            resolved = self.inner.origin.resolve_endpoint() => match resolved {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    error!(error = %e, "could not resolve gateway endpoint");
                    self.set_state(SessionState::Terminated);
                    return Err(e.into());
                }
            },
        };
        debug!(url = %endpoint.url, shards = endpoint.shards, "endpoint resolved");

        let conn = tokio::select! {
            biased;
            () = session.cancelled() => {
                self.set_state(SessionState::Terminated);
                return Ok(());
            }
            opened = self.open_connection(&endpoint) => match opened {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "could not open connection");
                    self.set_state(SessionState::Terminated);
                    return Err(e.into());
                }
            },
        };
        self.set_state(SessionState::Connected);
        self.inner.dispatcher.dispatch(CONNECT_EVENT, EventArgs::Empty);

        self.drive(&endpoint, conn, &session, &mut signal).await;

        self.set_state(SessionState::Terminated);
        info!("session terminated");
        Ok(())
    }

    /// Stop the run loop, release the origin and wait (bounded) for
    /// pending handlers. Runs at most once per session; later calls are
    /// no-ops.
    pub async fn shutdown(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            debug!("shutdown already completed");
            return;
        }

        info!("shutting down session");
        let grace = self.inner.config.shutdown_grace;
        self.session_token().cancel();

        let mut active = self.inner.loop_active.subscribe();
        if tokio::time::timeout(grace, active.wait_for(|running| !*running))
            .await
            .is_err()
        {
            warn!(
                grace_ms = duration_ms(grace),
                "run loop still active after grace period"
            );
        }

        self.inner.origin.close().await;
        self.inner.dispatcher.wait_idle(grace).await;
        self.set_state(SessionState::Terminated);
        debug!("shutdown complete");
    }

    /// `login`, then `run`, then `shutdown` whatever happened.
    ///
    /// A login failure is returned after shutdown, leaving the session
    /// `Terminated`.
    pub async fn start(&self, credential: &SecretString) -> Result<(), CoreError> {
        let result = match self.login(credential).await {
            Ok(_) => self.run().await,
            Err(e) => Err(e),
        };
        self.shutdown().await;
        result
    }

    /// Like [`start`](Self::start), but stops cleanly when `signal`
    /// resolves (e.g. `tokio::signal::ctrl_c`). The interruption is not
    /// reported as an error.
    pub async fn start_until<F>(&self, credential: &SecretString, signal: F) -> Result<(), CoreError>
    where
        F: Future<Output = ()>,
    {
        let session = async {
            self.login(credential).await?;
            self.run().await
        };
        tokio::pin!(session);
        tokio::pin!(signal);

        let result = tokio::select! {
            result = &mut session => result,
            () = &mut signal => {
                info!("interrupted, stopping session");
                self.session_token().cancel();
                let grace = self.inner.config.shutdown_grace;
                if tokio::time::timeout(grace, &mut session).await.is_err() {
                    warn!(grace_ms = duration_ms(grace), "session did not stop within grace period");
                }
                Ok(())
            }
        };

        self.shutdown().await;
        result
    }

    // ── Loop internals ───────────────────────────────────────────────

    /// Serve connections until the session ends. Never returns an error:
    /// failures are dispatched and decide between rerun, reopen and stop.
    async fn drive(
        &self,
        endpoint: &EndpointRef,
        mut conn: C::Connection,
        session: &CancellationToken,
        signal: &mut ReconnectReceiver,
    ) {
        let mut consecutive_errors: u32 = 0;

        loop {
            let child = session.child_token();
            *self.lock_connection_token() = Some(child.clone());
            let result = tokio::select! {
                biased;
                result = conn.run_once(&child) => result,
                () = session.cancelled() => Ok(RunOutcome::Ended),
            };
            *self.lock_connection_token() = None;

            if session.is_cancelled() {
                debug!("session cancelled, closing connection");
                self.close_connection(&mut conn, false).await;
                return;
            }

            let requested = signal.take();
            let delay = match result {
                Ok(outcome) => {
                    consecutive_errors = 0;
                    if outcome == RunOutcome::ReconnectRequested || requested {
                        info!("reconnect requested");
                        None
                    } else {
                        info!("connection ended");
                        self.close_connection(&mut conn, false).await;
                        return;
                    }
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    warn!(error = %e, consecutive_errors, "connection loop error");
                    self.inner
                        .dispatcher
                        .dispatch_error("run", Arc::new(CoreError::from(e)));

                    if self
                        .inner
                        .config
                        .max_consecutive_errors
                        .is_some_and(|max| consecutive_errors > max)
                    {
                        error!(consecutive_errors, "too many consecutive errors, terminating");
                        self.close_connection(&mut conn, false).await;
                        return;
                    }

                    let delay = calculate_backoff(consecutive_errors - 1, &self.inner.config.reconnect);
                    if conn.is_open() && !requested {
                        debug!(delay_ms = duration_ms(delay), "rerunning current connection");
                        if !self.sleep_or_cancel(delay, session).await {
                            self.close_connection(&mut conn, false).await;
                            return;
                        }
                        continue;
                    }
                    Some(delay)
                }
            };

            match self.reopen(endpoint, &mut conn, session, delay).await {
                Reopen::Opened(next) => conn = next,
                Reopen::Cancelled => return,
                Reopen::Failed(e) => {
                    error!(error = %e, "could not reopen connection");
                    self.inner
                        .dispatcher
                        .dispatch_error("reconnect", Arc::new(CoreError::from(e)));
                    return;
                }
            }
        }
    }

    /// Close `old`, optionally wait, then open a fresh connection.
    async fn reopen(
        &self,
        endpoint: &EndpointRef,
        old: &mut C::Connection,
        session: &CancellationToken,
        delay: Option<Duration>,
    ) -> Reopen<C::Connection> {
        self.close_connection(old, true).await;
        self.set_state(SessionState::Reconnecting);

        if let Some(delay) = delay {
            debug!(delay_ms = duration_ms(delay), "waiting before reopening connection");
            if !self.sleep_or_cancel(delay, session).await {
                return Reopen::Cancelled;
            }
        }

        let opened = tokio::select! {
            biased;
            () = session.cancelled() => return Reopen::Cancelled,
            opened = self.open_connection(endpoint) => opened,
        };

        match opened {
            Ok(conn) => {
                self.set_state(SessionState::Connected);
                self.inner.dispatcher.dispatch(CONNECT_EVENT, EventArgs::Empty);
                Reopen::Opened(conn)
            }
            Err(e) => Reopen::Failed(e),
        }
    }

    async fn open_connection(&self, endpoint: &EndpointRef) -> Result<C::Connection, tether_api::Error> {
        let link = ConnectionLink {
            events: Arc::new(self.inner.dispatcher.clone()),
            reconnect: self.inner.reconnect_tx.clone(),
        };
        self.inner.connector.open(endpoint, link).await
    }

    async fn close_connection(&self, conn: &mut C::Connection, reconnect: bool) {
        conn.close(reconnect).await;
        self.inner
            .dispatcher
            .dispatch(DISCONNECT_EVENT, EventArgs::Empty);
    }

    /// Returns `false` if the session was cancelled first.
    async fn sleep_or_cancel(&self, delay: Duration, session: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = session.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    // ── State helpers ────────────────────────────────────────────────

    fn set_state(&self, next: SessionState) {
        let previous = self.inner.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "session state changed");
        }
    }

    fn session_token(&self) -> CancellationToken {
        self.lock_session_token().clone()
    }

    fn lock_session_token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.inner
            .session_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_connection_token(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.inner
            .connection_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
