//! The exchange client facade: one venue, one client.
//!
//! REST calls delegate to the request executor, streaming to a lazily
//! spawned session, reads to the stream cache. All venue specifics come
//! in through the `RestEndpoints` and `WireProtocol` seams.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use hermes_clock::{Clock, SystemClock};
use hermes_connect::{
    ConnectError, Credentials, OrderBookView, RateLimiter, ReqwestTransport, RequestExecutor,
    RequestSigner, SessionController, SessionHandle, SessionNotice, SessionState, SocketConnector,
    StreamCache, SubscriptionKey, TickerView, TradesView, TungsteniteConnector, WireProtocol,
};
use hermes_connect::transport::HttpTransport;
use hermes_core::{BookUpdate, OrderAck, OrderRequest, Symbol, TickerSnapshot, Trade, VenueId};

use crate::config::VenueConfig;
use crate::endpoints::RestEndpoints;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const NOTICE_BUFFER: usize = 64;

/// Client for one venue. Cheap to share behind an `Arc`.
pub struct ExchangeClient {
    config: VenueConfig,
    executor: RequestExecutor,
    endpoints: Arc<dyn RestEndpoints>,
    protocol: Arc<dyn WireProtocol>,
    connector: Arc<dyn SocketConnector>,
    credentials: Option<Credentials>,
    cache: Arc<StreamCache>,
    clock: Arc<dyn Clock>,
    session: Mutex<Option<SessionHandle>>,
    notice_tx: mpsc::Sender<SessionNotice>,
    notice_rx: Mutex<Option<mpsc::Receiver<SessionNotice>>>,
}

impl ExchangeClient {
    pub fn builder(
        config: VenueConfig,
        endpoints: Arc<dyn RestEndpoints>,
        protocol: Arc<dyn WireProtocol>,
    ) -> ExchangeBuilder {
        ExchangeBuilder::new(config, endpoints, protocol)
    }

    pub fn venue(&self) -> &VenueId {
        &self.config.id
    }

    // --- REST ---

    /// Venue's market/instrument listing, venue-shaped
    pub async fn fetch_markets(&self) -> Result<serde_json::Value, ConnectError> {
        self.executor.execute(&self.endpoints.markets()).await
    }

    pub async fn fetch_ticker(&self, symbol: &Symbol) -> Result<TickerSnapshot, ConnectError> {
        let response = self
            .executor
            .execute_raw(&self.endpoints.ticker(symbol))
            .await?;
        self.endpoints.decode_ticker(symbol, &response.body)
    }

    pub async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        depth: Option<u32>,
    ) -> Result<BookUpdate, ConnectError> {
        let response = self
            .executor
            .execute_raw(&self.endpoints.order_book(symbol, depth))
            .await?;
        self.endpoints.decode_order_book(&response.body)
    }

    pub async fn fetch_trades(
        &self,
        symbol: &Symbol,
        limit: Option<u32>,
    ) -> Result<Vec<Trade>, ConnectError> {
        let response = self
            .executor
            .execute_raw(&self.endpoints.trades(symbol, limit))
            .await?;
        self.endpoints.decode_trades(&response.body)
    }

    /// Account balances, venue-shaped
    pub async fn fetch_balance(&self) -> Result<serde_json::Value, ConnectError> {
        self.executor.execute(&self.endpoints.balance()).await
    }

    /// Place an order. A client order id is generated when the caller
    /// did not supply one, so every order is traceable end to end.
    pub async fn create_order(&self, mut order: OrderRequest) -> Result<OrderAck, ConnectError> {
        if order.client_order_id.is_none() {
            order.client_order_id = Some(uuid::Uuid::new_v4().to_string());
        }
        tracing::info!(
            venue = %self.config.id,
            symbol = %order.symbol,
            side = ?order.side,
            client_order_id = ?order.client_order_id,
            "placing order"
        );
        let descriptor = self.endpoints.create_order(&order)?;
        let response = self.executor.execute_raw(&descriptor).await?;
        self.endpoints.decode_order(&response.body)
    }

    pub async fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: &str,
    ) -> Result<OrderAck, ConnectError> {
        tracing::info!(venue = %self.config.id, symbol = %symbol, order_id, "cancelling order");
        let response = self
            .executor
            .execute_raw(&self.endpoints.cancel_order(symbol, order_id))
            .await?;
        self.endpoints.decode_order(&response.body)
    }

    /// Open orders, venue-shaped; `None` symbol means account-wide
    pub async fn fetch_open_orders(
        &self,
        symbol: Option<&Symbol>,
    ) -> Result<serde_json::Value, ConnectError> {
        self.executor
            .execute(&self.endpoints.open_orders(symbol))
            .await
    }

    // --- Streaming ---

    pub async fn watch_order_book(&self, symbol: impl Into<Symbol>) -> Result<(), ConnectError> {
        self.watch(SubscriptionKey::order_book(symbol)).await
    }

    pub async fn watch_ticker(&self, symbol: impl Into<Symbol>) -> Result<(), ConnectError> {
        self.watch(SubscriptionKey::ticker(symbol)).await
    }

    pub async fn watch_trades(&self, symbol: impl Into<Symbol>) -> Result<(), ConnectError> {
        self.watch(SubscriptionKey::trades(symbol)).await
    }

    pub async fn watch_balance(&self) -> Result<(), ConnectError> {
        self.watch(SubscriptionKey::balance()).await
    }

    pub async fn watch_orders(&self) -> Result<(), ConnectError> {
        self.watch(SubscriptionKey::orders()).await
    }

    pub async fn unwatch_order_book(&self, symbol: impl Into<Symbol>) -> Result<(), ConnectError> {
        self.unwatch(SubscriptionKey::order_book(symbol)).await
    }

    pub async fn unwatch_ticker(&self, symbol: impl Into<Symbol>) -> Result<(), ConnectError> {
        self.unwatch(SubscriptionKey::ticker(symbol)).await
    }

    pub async fn unwatch_trades(&self, symbol: impl Into<Symbol>) -> Result<(), ConnectError> {
        self.unwatch(SubscriptionKey::trades(symbol)).await
    }

    pub async fn unwatch_balance(&self) -> Result<(), ConnectError> {
        self.unwatch(SubscriptionKey::balance()).await
    }

    pub async fn unwatch_orders(&self) -> Result<(), ConnectError> {
        self.unwatch(SubscriptionKey::orders()).await
    }

    async fn watch(&self, key: SubscriptionKey) -> Result<(), ConnectError> {
        self.session().subscribe(key).await
    }

    async fn unwatch(&self, key: SubscriptionKey) -> Result<(), ConnectError> {
        let handle = { self.session.lock().clone() };
        match handle {
            Some(handle) => handle.unsubscribe(key).await,
            None => Ok(()),
        }
    }

    // --- Cache reads ---

    pub fn order_book(&self, symbol: &Symbol) -> Option<OrderBookView> {
        self.cache.order_book(symbol)
    }

    pub fn ticker(&self, symbol: &Symbol) -> Option<TickerView> {
        self.cache.ticker(symbol)
    }

    pub fn trades(&self, symbol: &Symbol) -> Option<TradesView> {
        self.cache.trades(symbol)
    }

    // --- Session ---

    pub fn session_state(&self) -> SessionState {
        self.session
            .lock()
            .as_ref()
            .map(|handle| handle.state())
            .unwrap_or(SessionState::Disconnected)
    }

    /// Take the out-of-band notice stream (auth failures, disconnects,
    /// account payloads). Yields `None` after the first call.
    pub fn take_notices(&self) -> Option<mpsc::Receiver<SessionNotice>> {
        self.notice_rx.lock().take()
    }

    pub async fn close(&self) {
        let handle = { self.session.lock().clone() };
        if let Some(handle) = handle {
            handle.close().await;
        }
    }

    /// The live session handle, spawning the session task on first use
    fn session(&self) -> SessionHandle {
        let mut guard = self.session.lock();
        if let Some(handle) = guard.as_ref() {
            if handle.state() != SessionState::Closed {
                return handle.clone();
            }
        }
        let handle = SessionController::spawn(
            self.config.session_config(),
            Arc::clone(&self.connector),
            Arc::clone(&self.protocol),
            self.credentials.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.clock),
            self.notice_tx.clone(),
        );
        *guard = Some(handle.clone());
        handle
    }
}

/// Assembles an `ExchangeClient`, defaulting the production transports
pub struct ExchangeBuilder {
    config: VenueConfig,
    endpoints: Arc<dyn RestEndpoints>,
    protocol: Arc<dyn WireProtocol>,
    credentials: Option<Credentials>,
    http: Option<Arc<dyn HttpTransport>>,
    connector: Option<Arc<dyn SocketConnector>>,
    clock: Option<Arc<dyn Clock>>,
    limiter: Option<Arc<RateLimiter>>,
}

impl ExchangeBuilder {
    pub fn new(
        config: VenueConfig,
        endpoints: Arc<dyn RestEndpoints>,
        protocol: Arc<dyn WireProtocol>,
    ) -> Self {
        ExchangeBuilder {
            config,
            endpoints,
            protocol,
            credentials: None,
            http: None,
            connector: None,
            clock: None,
            limiter: None,
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn http_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.http = Some(transport);
        self
    }

    pub fn socket_connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share a limiter across clients of the same account
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> Result<ExchangeClient, ConnectError> {
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let http: Arc<dyn HttpTransport> = match self.http {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(HTTP_TIMEOUT)?),
        };
        let connector: Arc<dyn SocketConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(TungsteniteConnector::new()),
        };
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new()));
        limiter.register(self.config.id.clone(), self.config.rate_limit);

        let signer = Arc::new(RequestSigner::new(
            &self.config.rest_url,
            self.config.signature.clone(),
            self.credentials.clone(),
            Arc::clone(&clock),
        ));
        let executor = RequestExecutor::new(
            self.config.id.clone(),
            signer,
            limiter,
            http,
            self.config.retry_policy(),
        );

        let cache = Arc::new(StreamCache::new(self.config.trade_ring_capacity));
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_BUFFER);

        Ok(ExchangeClient {
            config: self.config,
            executor,
            endpoints: self.endpoints,
            protocol: self.protocol,
            connector,
            credentials: self.credentials,
            cache,
            clock,
            session: Mutex::new(None),
            notice_tx,
            notice_rx: Mutex::new(Some(notice_rx)),
        })
    }
}
