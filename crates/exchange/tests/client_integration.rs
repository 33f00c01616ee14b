//! Facade tests over mock transports: REST dispatch through the
//! endpoint seam and the watch → parse → cache → read round trip.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::mpsc;

use hermes_connect::{
    ConnectError, Credentials, HttpMethod, HttpResponse, HttpTransport, ParsedFrame,
    RequestDescriptor, SignedRequest, SocketConnector, SocketFrame, SocketHandle, StreamEvent,
    SubscriptionKey, TransportError, WireProtocol,
};
use hermes_core::{
    BookLevel, BookUpdate, OrderAck, OrderRequest, Side, Symbol, TickerSnapshot, Trade,
};
use hermes_exchange::{ExchangeClient, RestEndpoints, VenueConfig, VenueRegistry};

fn decimal_field(v: &serde_json::Value, field: &str) -> Result<rust_decimal::Decimal, ConnectError> {
    v[field]
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ConnectError::Protocol(format!("bad field: {field}")))
}

/// Endpoint glue for a fictional venue with a flat JSON API
struct TestEndpoints;

impl RestEndpoints for TestEndpoints {
    fn markets(&self) -> RequestDescriptor {
        RequestDescriptor::public("testvenue", HttpMethod::Get, "/api/markets")
    }

    fn ticker(&self, symbol: &Symbol) -> RequestDescriptor {
        RequestDescriptor::public("testvenue", HttpMethod::Get, "/api/ticker")
            .with_query("symbol", symbol)
    }

    fn order_book(&self, symbol: &Symbol, depth: Option<u32>) -> RequestDescriptor {
        let mut desc = RequestDescriptor::public("testvenue", HttpMethod::Get, "/api/depth")
            .with_query("symbol", symbol);
        if let Some(depth) = depth {
            desc = desc.with_query("limit", depth.to_string());
        }
        desc
    }

    fn trades(&self, symbol: &Symbol, limit: Option<u32>) -> RequestDescriptor {
        let mut desc = RequestDescriptor::public("testvenue", HttpMethod::Get, "/api/trades")
            .with_query("symbol", symbol);
        if let Some(limit) = limit {
            desc = desc.with_query("limit", limit.to_string());
        }
        desc
    }

    fn balance(&self) -> RequestDescriptor {
        RequestDescriptor::private("testvenue", HttpMethod::Get, "/api/balance")
    }

    fn create_order(&self, order: &OrderRequest) -> Result<RequestDescriptor, ConnectError> {
        let body = serde_json::to_string(order)
            .map_err(|e| ConnectError::Protocol(e.to_string()))?;
        Ok(
            RequestDescriptor::private("testvenue", HttpMethod::Post, "/api/order")
                .with_body(body),
        )
    }

    fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> RequestDescriptor {
        RequestDescriptor::private("testvenue", HttpMethod::Delete, "/api/order")
            .with_query("symbol", symbol)
            .with_query("orderId", order_id)
    }

    fn open_orders(&self, symbol: Option<&Symbol>) -> RequestDescriptor {
        let mut desc = RequestDescriptor::private("testvenue", HttpMethod::Get, "/api/openOrders");
        if let Some(symbol) = symbol {
            desc = desc.with_query("symbol", symbol);
        }
        desc
    }

    fn decode_ticker(&self, _symbol: &Symbol, body: &[u8]) -> Result<TickerSnapshot, ConnectError> {
        let v: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| ConnectError::Protocol(e.to_string()))?;
        Ok(TickerSnapshot {
            bid: decimal_field(&v, "bid").ok(),
            ask: decimal_field(&v, "ask").ok(),
            last: decimal_field(&v, "last").ok(),
            volume: decimal_field(&v, "volume").ok(),
            timestamp: chrono::Utc::now(),
        })
    }

    fn decode_order_book(&self, body: &[u8]) -> Result<BookUpdate, ConnectError> {
        let v: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| ConnectError::Protocol(e.to_string()))?;
        let levels = |side: &str| -> Vec<BookLevel> {
            v[side]
                .as_array()
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| {
                            Some(BookLevel {
                                price: row[0].as_str()?.parse().ok()?,
                                size: row[1].as_str()?.parse().ok()?,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(BookUpdate {
            sequence: v["seq"].as_u64().unwrap_or(0),
            bids: levels("bids"),
            asks: levels("asks"),
        })
    }

    fn decode_trades(&self, body: &[u8]) -> Result<Vec<Trade>, ConnectError> {
        let rows: Vec<serde_json::Value> =
            serde_json::from_slice(body).map_err(|e| ConnectError::Protocol(e.to_string()))?;
        rows.iter()
            .map(|v| {
                Ok(Trade {
                    id: v["id"].as_str().unwrap_or_default().to_string(),
                    price: decimal_field(v, "price")?,
                    size: decimal_field(v, "size")?,
                    side: match v["side"].as_str() {
                        Some("buy") => Some(Side::Buy),
                        Some("sell") => Some(Side::Sell),
                        _ => None,
                    },
                    timestamp: chrono::Utc::now(),
                })
            })
            .collect()
    }

    fn decode_order(&self, body: &[u8]) -> Result<OrderAck, ConnectError> {
        serde_json::from_slice(body).map_err(|e| ConnectError::Protocol(e.to_string()))
    }
}

/// Records every signed request, pops scripted responses
struct MockHttpTransport {
    requests: Mutex<Vec<SignedRequest>>,
    responses: Mutex<VecDeque<HttpResponse>>,
}

impl MockHttpTransport {
    fn with_responses(responses: Vec<(u16, serde_json::Value)>) -> Arc<Self> {
        Arc::new(MockHttpTransport {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| HttpResponse {
                        status,
                        body: body.to_string().into_bytes(),
                    })
                    .collect(),
            ),
        })
    }

    fn recorded(&self) -> Vec<SignedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: &SignedRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::Connection("no scripted response".into()))
    }
}

/// Minimal streaming protocol: subscribe frames out, ticker events in
struct TestProtocol;

impl WireProtocol for TestProtocol {
    fn subscribe_frame(&self, key: &SubscriptionKey) -> String {
        json!({"op": "subscribe", "channel": key.channel.as_str(), "symbol": key.symbol}).to_string()
    }

    fn unsubscribe_frame(&self, key: &SubscriptionKey) -> String {
        json!({"op": "unsubscribe", "channel": key.channel.as_str(), "symbol": key.symbol})
            .to_string()
    }

    fn auth_frame(&self, credentials: &Credentials, nonce: i64) -> Result<String, ConnectError> {
        Ok(json!({"op": "auth", "key": credentials.api_key(), "nonce": nonce}).to_string())
    }

    fn parse(&self, raw: &str) -> Result<ParsedFrame, ConnectError> {
        let v: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ConnectError::Protocol(e.to_string()))?;
        Ok(match v["type"].as_str() {
            Some("ticker") => ParsedFrame::Event(StreamEvent::Ticker {
                symbol: v["symbol"].as_str().unwrap_or_default().to_string(),
                ticker: TickerSnapshot {
                    bid: v["bid"].as_str().and_then(|s| s.parse().ok()),
                    ask: v["ask"].as_str().and_then(|s| s.parse().ok()),
                    last: None,
                    volume: None,
                    timestamp: chrono::Utc::now(),
                },
            }),
            _ => ParsedFrame::Ignore,
        })
    }
}

struct MockConnector {
    links: Mutex<VecDeque<SocketHandle>>,
}

#[async_trait]
impl SocketConnector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<SocketHandle, TransportError> {
        self.links
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::Connection("no scripted connection".into()))
    }
}

fn scripted_socket() -> (Arc<MockConnector>, mpsc::Receiver<String>, mpsc::Sender<SocketFrame>) {
    let (out_tx, out_rx) = mpsc::channel(32);
    let (in_tx, in_rx) = mpsc::channel(32);
    let connector = Arc::new(MockConnector {
        links: Mutex::new(VecDeque::from([SocketHandle {
            outbound: out_tx,
            inbound: in_rx,
        }])),
    });
    (connector, out_rx, in_tx)
}

fn venue_config() -> VenueConfig {
    VenueRegistry::from_json(
        r#"{"venues": [{
            "id": "testvenue",
            "name": "Test Venue",
            "rest_url": "https://api.test",
            "ws_url": "wss://ws.test"
        }]}"#,
    )
    .unwrap()
    .get(&"testvenue".into())
    .unwrap()
    .clone()
}

fn client(
    http: Arc<MockHttpTransport>,
    connector: Arc<MockConnector>,
    credentials: Option<Credentials>,
) -> ExchangeClient {
    let mut builder = ExchangeClient::builder(venue_config(), Arc::new(TestEndpoints), Arc::new(TestProtocol))
        .http_transport(http)
        .socket_connector(connector);
    if let Some(credentials) = credentials {
        builder = builder.credentials(credentials);
    }
    builder.build().unwrap()
}

fn rest_only_client(http: Arc<MockHttpTransport>, credentials: Option<Credentials>) -> ExchangeClient {
    let (connector, _out, _inject) = scripted_socket();
    client(http, connector, credentials)
}

#[tokio::test]
async fn test_fetch_ticker_builds_url_and_decodes() {
    let http = MockHttpTransport::with_responses(vec![(
        200,
        json!({"bid": "42000.5", "ask": "42001", "last": "42000.7", "volume": "123"}),
    )]);
    let client = rest_only_client(http.clone(), None);

    let ticker = client.fetch_ticker(&"BTCUSDT".to_string()).await.unwrap();
    assert_eq!(ticker.bid, Some(dec!(42000.5)));
    assert_eq!(ticker.volume, Some(dec!(123)));

    let recorded = http.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].url, "https://api.test/api/ticker?symbol=BTCUSDT");
    assert!(recorded[0].headers.is_empty()); // public endpoint, unsigned
}

#[tokio::test]
async fn test_fetch_order_book_decodes_levels() {
    let http = MockHttpTransport::with_responses(vec![(
        200,
        json!({"seq": 7, "bids": [["100", "2"]], "asks": [["101", "3"]]}),
    )]);
    let client = rest_only_client(http, None);

    let book = client
        .fetch_order_book(&"BTCUSDT".to_string(), Some(50))
        .await
        .unwrap();
    assert_eq!(book.sequence, 7);
    assert_eq!(book.bids[0].price, dec!(100));
    assert_eq!(book.asks[0].size, dec!(3));
}

#[tokio::test]
async fn test_create_order_signs_and_assigns_client_id() {
    let http = MockHttpTransport::with_responses(vec![(
        200,
        json!({"order_id": "V-1", "client_order_id": null, "symbol": "BTCUSDT", "status": "new"}),
    )]);
    let client = rest_only_client(http.clone(), Some(Credentials::new("key", "secret")));

    let ack = client
        .create_order(OrderRequest::limit("BTCUSDT", Side::Buy, dec!(1), dec!(42000)))
        .await
        .unwrap();
    assert_eq!(ack.order_id, "V-1");

    let recorded = http.recorded();
    assert_eq!(recorded.len(), 1);
    let names: Vec<&str> = recorded[0].headers.iter().map(|(k, _)| k.as_str()).collect();
    assert!(names.contains(&"X-API-KEY"));
    assert!(names.contains(&"X-SIGNATURE"));

    // A client order id was generated into the body
    let body: serde_json::Value =
        serde_json::from_str(recorded[0].body.as_deref().unwrap()).unwrap();
    let client_id = body["client_order_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(client_id).is_ok());
}

#[tokio::test]
async fn test_private_call_without_credentials_fails() {
    let http = MockHttpTransport::with_responses(vec![]);
    let client = rest_only_client(http.clone(), None);

    let err = client.fetch_balance().await.unwrap_err();
    assert!(matches!(err, ConnectError::MissingCredentials));
    assert!(http.recorded().is_empty()); // nothing dispatched
}

#[tokio::test]
async fn test_api_error_surfaces_status_and_body() {
    let http = MockHttpTransport::with_responses(vec![(
        418,
        json!({"error": "unknown symbol"}),
    )]);
    let client = rest_only_client(http, None);

    let err = client.fetch_ticker(&"NOPE".to_string()).await.unwrap_err();
    match err {
        ConnectError::Api { status, body } => {
            assert_eq!(status, 418);
            assert!(body.contains("unknown symbol"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_watch_round_trip_into_cache() {
    let http = MockHttpTransport::with_responses(vec![]);
    let (connector, mut sent, inject) = scripted_socket();
    let client = client(http, connector, None);

    client.watch_ticker("BTCUSDT").await.unwrap();

    // First watch lazily opened the session and sent the subscribe
    let frame: serde_json::Value = serde_json::from_str(
        &tokio::time::timeout(Duration::from_secs(60), sent.recv())
            .await
            .expect("no frame sent")
            .expect("socket closed"),
    )
    .unwrap();
    assert_eq!(frame["op"], "subscribe");
    assert_eq!(frame["channel"], "ticker");

    inject
        .send(SocketFrame::Text(
            json!({"type": "ticker", "symbol": "BTCUSDT", "bid": "42000", "ask": "42001"}).to_string(),
        ))
        .await
        .unwrap();

    let symbol = "BTCUSDT".to_string();
    let mut view = None;
    for _ in 0..200 {
        view = client.ticker(&symbol);
        if view.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let view = view.expect("ticker never cached");
    assert_eq!(view.ticker.bid, Some(dec!(42000)));
    assert!(!view.stale);

    client.close().await;
}

#[tokio::test]
async fn test_unwatch_without_session_is_noop() {
    let http = MockHttpTransport::with_responses(vec![]);
    let client = rest_only_client(http, None);

    client.unwatch_ticker("BTCUSDT").await.unwrap();
}

#[tokio::test]
async fn test_notices_taken_once() {
    let http = MockHttpTransport::with_responses(vec![]);
    let client = rest_only_client(http, None);

    assert!(client.take_notices().is_some());
    assert!(client.take_notices().is_none());
}
