//! Per-venue WebSocket session lifecycle.
//!
//! One controller task owns the socket, the subscription registry and
//! the cache writes for a venue. Callers talk to it through a
//! `SessionHandle`; state transitions are published on a watch channel
//! and out-of-band events (auth failures, disconnects, account
//! payloads) on a bounded notice channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use hermes_clock::Clock;
use hermes_core::{Channel, Symbol};

use crate::backoff::BackoffConfig;
use crate::cache::{ApplyOutcome, StreamCache};
use crate::credentials::Credentials;
use crate::error::ConnectError;
use crate::protocol::{ParsedFrame, StreamEvent, WireProtocol};
use crate::subscription::{Begin, SubscribeAck, SubscriptionKey, SubscriptionManager};
use crate::transport::{SocketConnector, SocketFrame, SocketHandle};

/// Where the session currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected { authenticated: bool },
    Closed,
}

/// Tunables for one venue session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ws_url: String,
    /// Cadence of the liveness check and outbound ping
    pub heartbeat_interval: Duration,
    /// Silence longer than this forces a reconnect
    pub liveness_timeout: Duration,
    /// How long to wait for the venue's auth ack
    pub auth_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ws_url: String::new(),
            heartbeat_interval: Duration::from_secs(5),
            liveness_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Out-of-band session events delivered to the owner.
/// The channel is bounded; a slow consumer loses notices, never frames.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    AuthFailed { reason: Option<String> },
    Disconnected,
    Resubscribed { count: usize },
    Account {
        channel: Channel,
        symbol: Option<Symbol>,
        payload: serde_json::Value,
    },
}

enum Command {
    Subscribe {
        key: SubscriptionKey,
        ack: SubscribeAck,
    },
    Unsubscribe {
        key: SubscriptionKey,
    },
    Close,
}

/// Why the connected loop ended
enum End {
    Closed,
    Dropped,
}

/// Caller-side handle to a running session task
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Register interest in a stream. Resolves once the intent is
    /// accepted (and, for private channels, once authentication has
    /// succeeded).
    pub async fn subscribe(&self, key: SubscriptionKey) -> Result<(), ConnectError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Subscribe { key, ack })
            .await
            .map_err(|_| ConnectError::SessionClosed)?;
        done.await.map_err(|_| ConnectError::SessionClosed)?
    }

    pub async fn unsubscribe(&self, key: SubscriptionKey) -> Result<(), ConnectError> {
        self.commands
            .send(Command::Unsubscribe { key })
            .await
            .map_err(|_| ConnectError::SessionClosed)
    }

    /// Ask the session to shut down. Idempotent.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch for state transitions
    pub fn state_stream(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

/// The session task itself. Built once per venue, runs until closed.
pub struct SessionController {
    config: SessionConfig,
    connector: Arc<dyn SocketConnector>,
    protocol: Arc<dyn WireProtocol>,
    credentials: Option<Credentials>,
    cache: Arc<StreamCache>,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<SessionState>,
    notices: mpsc::Sender<SessionNotice>,
    subs: SubscriptionManager,
    authenticated: bool,
}

impl SessionController {
    /// Spawn the session task and return its handle
    pub fn spawn(
        config: SessionConfig,
        connector: Arc<dyn SocketConnector>,
        protocol: Arc<dyn WireProtocol>,
        credentials: Option<Credentials>,
        cache: Arc<StreamCache>,
        clock: Arc<dyn Clock>,
        notices: mpsc::Sender<SessionNotice>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let controller = SessionController {
            config,
            connector,
            protocol,
            credentials,
            cache,
            clock,
            commands: command_rx,
            state: state_tx,
            notices,
            subs: SubscriptionManager::new(),
            authenticated: false,
        };
        tokio::spawn(controller.run());

        SessionHandle {
            commands: command_tx,
            state: state_rx,
        }
    }

    async fn run(mut self) {
        let mut ever_connected = false;

        'lifecycle: loop {
            // Idle until someone wants a stream
            while !self.subs.has_interest() {
                match self.commands.recv().await {
                    Some(Command::Close) | None => break 'lifecycle,
                    Some(cmd) => self.handle_offline_command(cmd),
                }
            }

            self.state.send_replace(SessionState::Connecting);
            let socket = match self.connect_with_backoff().await {
                Some(socket) => socket,
                None => break 'lifecycle,
            };

            let reconnect = ever_connected;
            ever_connected = true;
            match self.connected(socket, reconnect).await {
                End::Closed => break 'lifecycle,
                End::Dropped => {
                    tracing::warn!(url = %self.config.ws_url, "session dropped, reconnecting");
                    self.authenticated = false;
                    self.cache.mark_all_stale();
                    self.notify(SessionNotice::Disconnected);
                    self.state.send_replace(SessionState::Disconnected);
                }
            }
        }

        self.subs
            .fail_deferred(|| ConnectError::SessionClosed);
        self.state.send_replace(SessionState::Closed);
    }

    /// Dial until a connection sticks, backing off between attempts.
    /// Returns `None` when a close arrives mid-backoff.
    async fn connect_with_backoff(&mut self) -> Option<SocketHandle> {
        let mut attempts: u32 = 0;
        loop {
            match self.connector.connect(&self.config.ws_url).await {
                Ok(socket) => return Some(socket),
                Err(e) => {
                    let delay = self.config.backoff.delay(attempts);
                    attempts = attempts.saturating_add(1);
                    tracing::warn!(
                        url = %self.config.ws_url,
                        attempts,
                        "connect failed ({}), retrying in {:?}",
                        e,
                        delay
                    );

                    let sleep = tokio::time::sleep(delay);
                    tokio::pin!(sleep);
                    loop {
                        tokio::select! {
                            _ = &mut sleep => break,
                            cmd = self.commands.recv() => match cmd {
                                Some(Command::Close) | None => return None,
                                Some(cmd) => self.handle_offline_command(cmd),
                            },
                        }
                    }
                }
            }
        }
    }

    /// Register a subscribe/unsubscribe while no socket is up. Public
    /// intents land in the replay set and are sent on (re)connect;
    /// private ones defer until the next connection authenticates.
    fn handle_offline_command(&mut self, cmd: Command) {
        match cmd {
            Command::Subscribe { key, ack } => {
                if key.is_private() && self.credentials.is_none() {
                    let _ = ack.send(Err(ConnectError::MissingCredentials));
                    return;
                }
                // No socket yet means no auth ack yet: private intents
                // stay deferred so their acks resolve only once the
                // handshake settles on the next connection
                self.subs.begin(key, ack, false);
            }
            Command::Unsubscribe { key } => {
                self.subs.remove(&key);
            }
            Command::Close => {}
        }
    }

    /// Drive one live connection to its end
    async fn connected(&mut self, socket: SocketHandle, reconnect: bool) -> End {
        let SocketHandle {
            outbound,
            mut inbound,
        } = socket;

        self.authenticated = false;

        // Public streams resume immediately; private ones wait for auth
        let (public_keys, mut pending_private) = self.subs.replay_keys();
        let replayed = public_keys.len() + pending_private.len();
        for key in &public_keys {
            if outbound.send(self.protocol.subscribe_frame(key)).await.is_err() {
                return End::Dropped;
            }
        }

        let mut auth_deadline: Option<Instant> = None;
        if self.subs.has_private_interest() {
            if self.credentials.is_some() {
                if self
                    .start_auth(&outbound, &mut auth_deadline, &mut pending_private)
                    .await
                    .is_err()
                {
                    return End::Dropped;
                }
            } else {
                self.fail_private_interest(None, &mut pending_private);
            }
        }
        if auth_deadline.is_none() {
            self.state
                .send_replace(SessionState::Connected { authenticated: false });
        }

        if reconnect && replayed > 0 {
            self.notify(SessionNotice::Resubscribed { count: replayed });
        }

        let mut last_seen = Instant::now();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Close) | None => return End::Closed,
                    Some(Command::Subscribe { key, ack }) => {
                        if self
                            .online_subscribe(
                                key,
                                ack,
                                &outbound,
                                &mut auth_deadline,
                                &mut pending_private,
                            )
                            .await
                            .is_err()
                        {
                            return End::Dropped;
                        }
                    }
                    Some(Command::Unsubscribe { key }) => {
                        if self.subs.remove(&key)
                            && outbound.send(self.protocol.unsubscribe_frame(&key)).await.is_err()
                        {
                            return End::Dropped;
                        }
                    }
                },
                frame = inbound.recv() => match frame {
                    None | Some(SocketFrame::Closed) => return End::Dropped,
                    Some(frame) => {
                        last_seen = Instant::now();
                        if let SocketFrame::Text(raw) = frame {
                            let outcome = self
                                .handle_text(&raw, &outbound, &mut pending_private, &mut auth_deadline)
                                .await;
                            if outcome.is_err() {
                                return End::Dropped;
                            }
                        }
                        // Ping/Pong frames count as liveness only
                    }
                },
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > self.config.liveness_timeout {
                        tracing::warn!(
                            url = %self.config.ws_url,
                            "no traffic for {:?}, forcing reconnect",
                            last_seen.elapsed()
                        );
                        return End::Dropped;
                    }
                    if let Some(deadline) = auth_deadline {
                        if Instant::now() >= deadline {
                            auth_deadline = None;
                            tracing::warn!("authentication timed out");
                            self.fail_private_interest(
                                Some("authentication timed out".into()),
                                &mut pending_private,
                            );
                            self.state
                                .send_replace(SessionState::Connected { authenticated: false });
                        }
                    }
                    if let Some(ping) = self.protocol.ping_frame() {
                        if outbound.send(ping).await.is_err() {
                            return End::Dropped;
                        }
                    }
                }
            }
        }
    }

    async fn online_subscribe(
        &mut self,
        key: SubscriptionKey,
        ack: SubscribeAck,
        outbound: &mpsc::Sender<String>,
        auth_deadline: &mut Option<Instant>,
        pending_private: &mut Vec<SubscriptionKey>,
    ) -> Result<(), ()> {
        if key.is_private() && self.credentials.is_none() {
            let _ = ack.send(Err(ConnectError::MissingCredentials));
            return Ok(());
        }
        match self.subs.begin(key, ack, self.authenticated) {
            Begin::AlreadyActive => Ok(()),
            Begin::Deferred => {
                // First private interest on this connection starts the
                // auth handshake
                if auth_deadline.is_none() {
                    self.start_auth(outbound, auth_deadline, pending_private).await
                } else {
                    Ok(())
                }
            }
            Begin::Activate { key } => outbound
                .send(self.protocol.subscribe_frame(&key))
                .await
                .map_err(|_| ()),
        }
    }

    /// Send the auth frame and arm the ack deadline
    async fn start_auth(
        &mut self,
        outbound: &mpsc::Sender<String>,
        auth_deadline: &mut Option<Instant>,
        pending_private: &mut Vec<SubscriptionKey>,
    ) -> Result<(), ()> {
        let Some(credentials) = &self.credentials else {
            self.fail_private_interest(None, pending_private);
            return Ok(());
        };
        let nonce = self.clock.now_millis();
        match self.protocol.auth_frame(credentials, nonce) {
            Ok(frame) => {
                if outbound.send(frame).await.is_err() {
                    return Err(());
                }
                *auth_deadline = Some(Instant::now() + self.config.auth_timeout);
                self.state.send_replace(SessionState::Authenticating);
                Ok(())
            }
            Err(e) => {
                tracing::error!("failed to build auth frame: {}", e);
                self.fail_private_interest(Some(e.to_string()), pending_private);
                Ok(())
            }
        }
    }

    /// Decode and apply one inbound text frame. `Err` means the socket
    /// must be torn down.
    async fn handle_text(
        &mut self,
        raw: &str,
        outbound: &mpsc::Sender<String>,
        pending_private: &mut Vec<SubscriptionKey>,
        auth_deadline: &mut Option<Instant>,
    ) -> Result<(), ()> {
        let parsed = match self.protocol.parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Malformed frames never poison the cache
                tracing::warn!("dropping unparseable frame: {}", e);
                return Ok(());
            }
        };

        match parsed {
            ParsedFrame::Event(event) => self.apply_event(event, outbound).await,
            ParsedFrame::AuthAck { success: true, .. } => {
                tracing::info!(url = %self.config.ws_url, "authenticated");
                *auth_deadline = None;
                self.authenticated = true;
                let mut keys = std::mem::take(pending_private);
                keys.extend(self.subs.complete_deferred());
                for key in keys {
                    if outbound.send(self.protocol.subscribe_frame(&key)).await.is_err() {
                        return Err(());
                    }
                }
                self.state
                    .send_replace(SessionState::Connected { authenticated: true });
                Ok(())
            }
            ParsedFrame::AuthAck {
                success: false,
                reason,
            } => {
                tracing::error!(reason = ?reason, "authentication rejected");
                *auth_deadline = None;
                self.fail_private_interest(reason, pending_private);
                self.state
                    .send_replace(SessionState::Connected { authenticated: false });
                Ok(())
            }
            ParsedFrame::SubscribeAck { key } => {
                tracing::debug!(key = %key, "subscription confirmed");
                Ok(())
            }
            ParsedFrame::Account {
                key,
                payload,
            } => {
                self.notify(SessionNotice::Account {
                    channel: key.channel,
                    symbol: key.symbol,
                    payload,
                });
                Ok(())
            }
            ParsedFrame::Pong | ParsedFrame::Ignore => Ok(()),
        }
    }

    async fn apply_event(
        &mut self,
        event: StreamEvent,
        outbound: &mpsc::Sender<String>,
    ) -> Result<(), ()> {
        match event {
            StreamEvent::BookSnapshot { symbol, update } => {
                match self.cache.apply_book_snapshot(&symbol, &update) {
                    ApplyOutcome::NeedsResync => self.restart_book_stream(symbol, outbound).await,
                    _ => Ok(()),
                }
            }
            StreamEvent::BookDelta { symbol, update } => {
                match self.cache.apply_book_delta(&symbol, &update) {
                    ApplyOutcome::Applied | ApplyOutcome::Stale => Ok(()),
                    ApplyOutcome::NeedsResync => self.restart_book_stream(symbol, outbound).await,
                }
            }
            StreamEvent::Ticker { symbol, ticker } => {
                self.cache.apply_ticker(&symbol, ticker);
                Ok(())
            }
            StreamEvent::Trade { symbol, trade } => {
                self.cache.apply_trade(&symbol, trade);
                Ok(())
            }
        }
    }

    /// The book cannot continue from the last event: flag the symbol
    /// and re-request the stream so a fresh snapshot arrives
    async fn restart_book_stream(
        &mut self,
        symbol: Symbol,
        outbound: &mpsc::Sender<String>,
    ) -> Result<(), ()> {
        tracing::warn!(symbol = %symbol, "book out of sync, re-requesting stream");
        self.cache.mark_stale(&symbol);
        let key = SubscriptionKey::order_book(symbol);
        if self.subs.is_active(&key) {
            for frame in [
                self.protocol.unsubscribe_frame(&key),
                self.protocol.subscribe_frame(&key),
            ] {
                if outbound.send(frame).await.is_err() {
                    return Err(());
                }
            }
        }
        Ok(())
    }

    /// Auth cannot complete: fail deferred intents, drop private keys
    /// from the replay set, keep public streams running.
    fn fail_private_interest(
        &mut self,
        reason: Option<String>,
        pending_private: &mut Vec<SubscriptionKey>,
    ) {
        let detail = reason
            .clone()
            .unwrap_or_else(|| "authentication failed".to_string());
        self.subs
            .fail_deferred(|| ConnectError::Authentication(detail.clone()));
        for key in pending_private.drain(..) {
            self.subs.remove(&key);
        }
        let (_, still_private) = self.subs.replay_keys();
        for key in still_private {
            self.subs.remove(&key);
        }
        self.notify(SessionNotice::AuthFailed { reason });
    }

    fn notify(&self, notice: SessionNotice) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.notices.try_send(notice) {
            tracing::warn!(?dropped, "notice channel full, dropping");
        }
    }
}
