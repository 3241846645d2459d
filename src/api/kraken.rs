use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::gateway::{GatewayError, OrderGateway};
use crate::config::Credentials;
use crate::models::{OrderAck, OrderRequest, OrderType};

// Kraken REST API
// Docs: https://docs.kraken.com/api/docs/rest-api/add-order
const ADD_ORDER_PATH: &str = "/0/private/AddOrder";
const BALANCE_PATH: &str = "/0/private/Balance";
const WS_TOKEN_PATH: &str = "/0/private/GetWebSocketsToken";
const QUERY_ORDERS_PATH: &str = "/0/private/QueryOrders";
const OPEN_ORDERS_PATH: &str = "/0/private/OpenOrders";
const CLOSED_ORDERS_PATH: &str = "/0/private/ClosedOrders";
const ASSET_PAIRS_PATH: &str = "/0/public/AssetPairs";

type HmacSha512 = Hmac<Sha512>;

// Type alias for the rate limiter to simplify signatures
type KrakenRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Every Kraken response: `{"error": [...], "result": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AddOrderResult {
    descr: OrderDescr,
    #[serde(default)]
    txid: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OrderDescr {
    order: String,
}

#[derive(Debug, Deserialize)]
struct TokenResult {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenOrdersResult {
    #[serde(default)]
    open: HashMap<String, OrderInfo>,
}

#[derive(Debug, Deserialize)]
struct ClosedOrdersResult {
    #[serde(default)]
    closed: HashMap<String, OrderInfo>,
}

#[derive(Debug, Deserialize)]
struct OrderInfo {
    status: String,
    #[serde(default)]
    opentm: f64,
    closetm: Option<f64>,
    #[serde(default)]
    vol: String,
    #[serde(default)]
    vol_exec: String,
    #[serde(default)]
    cost: String,
    #[serde(default)]
    fee: String,
    #[serde(default)]
    price: String,
    descr: InfoDescr,
}

#[derive(Debug, Deserialize)]
struct InfoDescr {
    pair: String,
    #[serde(rename = "type")]
    side: String,
    ordertype: String,
    #[serde(default)]
    price: String,
}

#[derive(Debug, Deserialize)]
struct AssetPairInfo {
    wsname: Option<String>,
}

/// Order as reported by the OpenOrders / ClosedOrders endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub txid: String,
    pub pair: String,
    pub side: String,
    pub order_type: String,
    pub status: String,
    pub volume: f64,
    pub volume_executed: f64,
    /// Limit price from the order description; `None` for market orders
    pub limit_price: Option<f64>,
    /// Average fill price
    pub average_price: f64,
    pub cost: f64,
    pub fee: f64,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl OrderSummary {
    fn from_info(txid: String, info: OrderInfo) -> Self {
        Self {
            txid,
            pair: info.descr.pair,
            side: info.descr.side,
            order_type: info.descr.ordertype,
            status: info.status,
            volume: parse_amount(&info.vol),
            volume_executed: parse_amount(&info.vol_exec),
            limit_price: info.descr.price.parse::<f64>().ok().filter(|p| *p > 0.0),
            average_price: parse_amount(&info.price),
            cost: parse_amount(&info.cost),
            fee: parse_amount(&info.fee),
            opened_at: from_unix_secs(info.opentm),
            closed_at: info.closetm.and_then(from_unix_secs),
        }
    }

    /// Realized cost minus filled value minus fees
    pub fn pnl(&self) -> f64 {
        self.cost - self.average_price * self.volume_executed - self.fee
    }
}

fn parse_amount(raw: &str) -> f64 {
    raw.parse().unwrap_or(0.0)
}

fn from_unix_secs(secs: f64) -> Option<DateTime<Utc>> {
    if secs <= 0.0 {
        return None;
    }
    Utc.timestamp_millis_opt((secs * 1000.0) as i64).single()
}

/// Decimal string with at most 8 fractional digits and no trailing zeros
pub fn format_amount(value: f64) -> String {
    let formatted = format!("{:.8}", value);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Compute the `API-Sign` header value
///
/// `base64(HMAC-SHA512(base64decode(secret), path || SHA256(nonce || postdata)))`
pub fn sign_request(
    secret_b64: &str,
    path: &str,
    nonce: u64,
    postdata: &str,
) -> Result<String, GatewayError> {
    let secret = STANDARD.decode(secret_b64)?;

    let mut sha = Sha256::new();
    sha.update(nonce.to_string().as_bytes());
    sha.update(postdata.as_bytes());
    let digest = sha.finalize();

    let mut mac = HmacSha512::new_from_slice(&secret)
        .map_err(|e| GatewayError::Malformed(format!("HMAC key: {}", e)))?;
    mac.update(path.as_bytes());
    mac.update(&digest);

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Client for the Kraken REST API
///
/// Cloneable; all clones share the nonce counter and rate limiter.
#[derive(Clone)]
pub struct KrakenClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    last_nonce: Arc<AtomicU64>,
    rate_limiter: Arc<KrakenRateLimiter>,
}

impl KrakenClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
        requests_per_minute: u32,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            last_nonce: Arc::new(AtomicU64::new(0)),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Millisecond timestamp, bumped so that it always increases
    fn next_nonce(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last_nonce.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last_nonce
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Signed POST to a private endpoint
    async fn private_post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(GatewayError::MissingCredentials)?;

        let nonce = self.next_nonce();
        // Serializer is !Send; finish it before the first await
        let postdata = {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            serializer.append_pair("nonce", &nonce.to_string());
            for (key, value) in params {
                serializer.append_pair(key, value);
            }
            serializer.finish()
        };

        let signature = sign_request(credentials.api_secret(), path, nonce, &postdata)?;

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("API-Key", credentials.api_key())
            .header("API-Sign", signature)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(postdata)
            .send()
            .await?;

        Self::read_envelope(response).await
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;

        Self::read_envelope(response).await
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Malformed(format!("HTTP {}: {}", status, e)))?;

        if !envelope.error.is_empty() {
            return Err(GatewayError::Rejected(envelope.error));
        }

        envelope
            .result
            .ok_or_else(|| GatewayError::Malformed(format!("HTTP {}: missing result", status)))
    }

    /// Status string ("pending", "open", "closed", ...) of one order
    pub async fn query_order_status(&self, txid: &str) -> Result<String, GatewayError> {
        let mut result: HashMap<String, OrderInfo> = self
            .private_post(QUERY_ORDERS_PATH, &[("txid", txid.to_string())])
            .await?;

        result
            .remove(txid)
            .map(|info| info.status)
            .ok_or_else(|| GatewayError::Malformed(format!("order {} not in response", txid)))
    }

    pub async fn open_orders(&self) -> Result<Vec<OrderSummary>, GatewayError> {
        let result: OpenOrdersResult = self.private_post(OPEN_ORDERS_PATH, &[]).await?;
        Ok(Self::summaries(result.open))
    }

    pub async fn closed_orders(&self) -> Result<Vec<OrderSummary>, GatewayError> {
        let result: ClosedOrdersResult = self.private_post(CLOSED_ORDERS_PATH, &[]).await?;
        Ok(Self::summaries(result.closed))
    }

    fn summaries(orders: HashMap<String, OrderInfo>) -> Vec<OrderSummary> {
        let mut summaries: Vec<OrderSummary> = orders
            .into_iter()
            .map(|(txid, info)| OrderSummary::from_info(txid, info))
            .collect();
        summaries.sort_by_key(|s| s.opened_at);
        summaries
    }

    /// Feed names (`wsname`) of every tradable pair, sorted
    pub async fn tradable_pairs(&self) -> Result<Vec<String>, GatewayError> {
        let result: HashMap<String, AssetPairInfo> = self.public_get(ASSET_PAIRS_PATH).await?;

        let mut pairs: Vec<String> = result.into_values().filter_map(|p| p.wsname).collect();
        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }
}

#[async_trait]
impl OrderGateway for KrakenClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let mut params = vec![
            ("pair", order.pair.clone()),
            ("type", order.side.as_str().to_string()),
            ("ordertype", order.order_type.as_str().to_string()),
            ("volume", format_amount(order.volume)),
        ];

        if let (OrderType::Limit, Some(price)) = (order.order_type, order.price) {
            params.push(("price", format_amount(price)));
        }

        let result: AddOrderResult = self.private_post(ADD_ORDER_PATH, &params).await?;

        tracing::info!(
            pair = %order.pair,
            txids = ?result.txid,
            "Order accepted: {}",
            result.descr.order
        );

        Ok(OrderAck {
            txids: result.txid,
            description: result.descr.order,
        })
    }

    async fn get_balance(&self) -> Result<HashMap<String, f64>, GatewayError> {
        let result: HashMap<String, String> = self.private_post(BALANCE_PATH, &[]).await?;

        result
            .into_iter()
            .map(|(asset, amount)| {
                amount
                    .parse::<f64>()
                    .map(|v| (asset.clone(), v))
                    .map_err(|_| GatewayError::Malformed(format!("balance for {}: {}", asset, amount)))
            })
            .collect()
    }

    async fn get_websocket_token(&self) -> Result<String, GatewayError> {
        let result: TokenResult = self.private_post(WS_TOKEN_PATH, &[]).await?;

        result
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::Malformed("WebSocket token missing from response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    // Example key pair from the Kraken API documentation
    const DOC_SECRET: &str =
        "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";

    fn client_for(url: &str) -> KrakenClient {
        KrakenClient::new(url, Some(Credentials::new("test-key", DOC_SECRET)), 600).unwrap()
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_private_calls_are_send_futures() {
        let client = client_for("http://127.0.0.1:9");
        let order = OrderRequest::limit_buy("XBT/USD", 1.0, 100.0);

        let place = client.place_order(&order);
        let balance = client.get_balance();
        let token = client.get_websocket_token();
        let status = client.query_order_status("OABC");

        assert_send(&place);
        assert_send(&balance);
        assert_send(&token);
        assert_send(&status);
    }

    #[test]
    fn test_sign_request_matches_documented_example() {
        let signature = sign_request(
            DOC_SECRET,
            "/0/private/AddOrder",
            1616492376594,
            "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25",
        )
        .unwrap();

        assert_eq!(
            signature,
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn test_sign_request_rejects_bad_secret() {
        let result = sign_request("not base64!", "/0/private/Balance", 1, "nonce=1");
        assert!(matches!(result, Err(GatewayError::InvalidSecret(_))));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.2), "0.2");
        assert_eq!(format_amount(100.0), "100");
        assert_eq!(format_amount(0.123456789), "0.12345679");
    }

    #[test]
    fn test_nonce_strictly_increases() {
        let client = client_for("http://localhost");
        let a = client.next_nonce();
        let b = client.next_nonce();
        let c = client.next_nonce();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_place_limit_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ADD_ORDER_PATH)
            .match_header("API-Key", "test-key")
            .match_header("API-Sign", Matcher::Regex(".+".to_string()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("pair=XBT%2FUSD".to_string()),
                Matcher::Regex("type=buy".to_string()),
                Matcher::Regex("ordertype=limit".to_string()),
                Matcher::Regex("volume=0.2(&|$)".to_string()),
                Matcher::Regex("price=100(&|$)".to_string()),
                Matcher::Regex("^nonce=[0-9]+".to_string()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"error":[],"result":{"descr":{"order":"buy 0.2 XBTUSD @ limit 100"},"txid":["OUF4EM-FRGI2-MQMWZD"]}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server.url());
        let ack = client
            .place_order(&OrderRequest::limit_buy("XBT/USD", 0.2, 100.0))
            .await
            .unwrap();

        assert_eq!(ack.txids, vec!["OUF4EM-FRGI2-MQMWZD".to_string()]);
        assert_eq!(ack.description, "buy 0.2 XBTUSD @ limit 100");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_market_order_sends_no_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ADD_ORDER_PATH)
            .match_body(Matcher::Regex(
                "^nonce=[0-9]+&pair=ETH%2FUSD&type=sell&ordertype=market&volume=1$".to_string(),
            ))
            .with_body(r#"{"error":[],"result":{"descr":{"order":"sell 1 ETHUSD @ market"},"txid":["O1"]}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let order = OrderRequest::market("ETH/USD", crate::models::OrderSide::Sell, 1.0);
        let ack = client.place_order(&order).await.unwrap();

        assert_eq!(ack.txids, vec!["O1".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_rejection_is_rejected_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", ADD_ORDER_PATH)
            .with_body(r#"{"error":["EOrder:Insufficient funds"]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .place_order(&OrderRequest::limit_buy("XBT/USD", 0.2, 100.0))
            .await
            .unwrap_err();

        match err {
            GatewayError::Rejected(errors) => {
                assert_eq!(errors, vec!["EOrder:Insufficient funds".to_string()])
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_response_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", BALANCE_PATH)
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.get_balance().await.unwrap_err();

        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_exchange_is_transport_error() {
        // Nothing listens on port 9 locally
        let client = client_for("http://127.0.0.1:9");
        let err = client.get_balance().await.unwrap_err();

        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let client = KrakenClient::new("http://127.0.0.1:9", None, 60).unwrap();
        let err = client.get_balance().await.unwrap_err();

        assert!(matches!(err, GatewayError::MissingCredentials));
        assert!(!client.has_credentials());
    }

    #[tokio::test]
    async fn test_get_balance_parses_amounts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", BALANCE_PATH)
            .with_body(r#"{"error":[],"result":{"ZUSD":"171288.6158","XXBT":"0.0011"}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let balance = client.get_balance().await.unwrap();

        assert_eq!(balance.get("ZUSD"), Some(&171288.6158));
        assert_eq!(balance.get("XXBT"), Some(&0.0011));
    }

    #[tokio::test]
    async fn test_get_websocket_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", WS_TOKEN_PATH)
            .with_body(r#"{"error":[],"result":{"token":"1Dwc4lzSwNWOAwkMdqhssNNFhs1ed606d1WcF3XfEMw","expires":900}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let token = client.get_websocket_token().await.unwrap();
        assert_eq!(token, "1Dwc4lzSwNWOAwkMdqhssNNFhs1ed606d1WcF3XfEMw");
    }

    #[tokio::test]
    async fn test_missing_websocket_token_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", WS_TOKEN_PATH)
            .with_body(r#"{"error":[],"result":{"expires":900}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        assert!(client.get_websocket_token().await.is_err());
    }

    #[tokio::test]
    async fn test_query_order_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", QUERY_ORDERS_PATH)
            .match_body(Matcher::Regex("txid=OBCMZD-JIEE7-77TH3F".to_string()))
            .with_body(
                r#"{"error":[],"result":{"OBCMZD-JIEE7-77TH3F":{"status":"closed","opentm":1688666559.8974,"closetm":1688666559.9,"vol":"1.25","vol_exec":"1.25","cost":"37526.2","fee":"37.5","price":"30021.0","descr":{"pair":"XBTUSD","type":"buy","ordertype":"limit","price":"30010.0"}}}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server.url());
        let status = client.query_order_status("OBCMZD-JIEE7-77TH3F").await.unwrap();
        assert_eq!(status, "closed");
    }

    #[tokio::test]
    async fn test_closed_orders_summaries() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", CLOSED_ORDERS_PATH)
            .with_body(
                r#"{"error":[],"result":{"count":1,"closed":{"O2":{"status":"closed","opentm":1700000000.0,"closetm":1700000060.0,"vol":"0.5","vol_exec":"0.5","cost":"50.0","fee":"0.1","price":"99.0","descr":{"pair":"ETHUSD","type":"buy","ordertype":"market","price":"0"}}}}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server.url());
        let orders = client.closed_orders().await.unwrap();

        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.txid, "O2");
        assert_eq!(order.side, "buy");
        assert_eq!(order.limit_price, None);
        assert_eq!(order.volume_executed, 0.5);
        assert_eq!(order.closed_at.unwrap().timestamp(), 1700000060);
        // 50.0 - 99.0 * 0.5 - 0.1
        assert!((order.pnl() - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_tradable_pairs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", ASSET_PAIRS_PATH)
            .with_body(
                r#"{"error":[],"result":{"XXBTZUSD":{"altname":"XBTUSD","wsname":"XBT/USD"},"XETHZUSD":{"altname":"ETHUSD","wsname":"ETH/USD"},"XBTUSD.d":{"altname":"XBTUSD.d"}}}"#,
            )
            .create_async()
            .await;

        let client = KrakenClient::new(server.url(), None, 600).unwrap();
        let pairs = client.tradable_pairs().await.unwrap();

        assert_eq!(pairs, vec!["ETH/USD".to_string(), "XBT/USD".to_string()]);
    }
}
