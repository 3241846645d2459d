use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single trade observation for a pair, as received from the ticker feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub pair: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(pair: impl Into<String>, price: f64, volume: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            pair: pair.into(),
            price,
            volume,
            timestamp,
        }
    }
}

/// OHLCV aggregate over one fixed-width time bucket
///
/// Only ever built from at least one tick; empty buckets are never represented.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub pair: String,
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Indicator values of the most recent candle of a series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSnapshot {
    pub pair: String,
    pub timestamp: DateTime<Utc>,
    pub ema9: f64,
    pub ema21: f64,
    pub rsi14: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub obv: f64,
    pub close_price: f64,
}

impl IndicatorSnapshot {
    /// True when every numeric field is finite
    pub fn is_well_formed(&self) -> bool {
        [
            self.ema9,
            self.ema21,
            self.rsi14,
            self.macd_line,
            self.macd_signal,
            self.macd_histogram,
            self.obv,
            self.close_price,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Composite tradeability score recorded once per pair per evaluation cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Score {
    pub pair: String,
    pub timestamp: DateTime<Utc>,
    pub value: u8,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        }
    }
}

/// Order placement request handed to an `OrderGateway`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub volume: f64,
    /// Limit price; ignored for market orders
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn limit_buy(pair: impl Into<String>, volume: f64, price: f64) -> Self {
        Self {
            pair: pair.into(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            volume,
            price: Some(price),
        }
    }

    pub fn market(pair: impl Into<String>, side: OrderSide, volume: f64) -> Self {
        Self {
            pair: pair.into(),
            side,
            order_type: OrderType::Market,
            volume,
            price: None,
        }
    }
}

/// Exchange acknowledgement of an accepted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAck {
    pub txids: Vec<String>,
    pub description: String,
}

/// What happened to an order request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OrderStatus {
    Accepted { txids: Vec<String> },
    Rejected { errors: Vec<String> },
    Failed { message: String },
}

impl OrderStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Accepted { .. } => "Accepted",
            OrderStatus::Rejected { .. } => "Rejected",
            OrderStatus::Failed { .. } => "Failed",
        }
    }
}

/// Audit entry for one order attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub id: Uuid,
    pub request: OrderRequest,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn new(request: OrderRequest, status: OrderStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            status,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            pair: "XBT/USD".to_string(),
            timestamp: Utc::now(),
            ema9: 101.0,
            ema21: 100.0,
            rsi14: 55.0,
            macd_line: 0.5,
            macd_signal: 0.4,
            macd_histogram: 0.1,
            obv: 10.0,
            close_price: 100.3,
        }
    }

    #[test]
    fn test_limit_buy_request() {
        let request = OrderRequest::limit_buy("XBT/USD", 0.2, 100.0);

        assert_eq!(request.side, OrderSide::Buy);
        assert_eq!(request.order_type, OrderType::Limit);
        assert_eq!(request.price, Some(100.0));
    }

    #[test]
    fn test_market_request_has_no_price() {
        let request = OrderRequest::market("ETH/USD", OrderSide::Sell, 1.5);

        assert_eq!(request.order_type.as_str(), "market");
        assert_eq!(request.side.as_str(), "sell");
        assert!(request.price.is_none());
    }

    #[test]
    fn test_snapshot_well_formed() {
        let mut snap = snapshot();
        assert!(snap.is_well_formed());

        snap.rsi14 = f64::NAN;
        assert!(!snap.is_well_formed());
    }

    #[test]
    fn test_order_status_labels() {
        let accepted = OrderStatus::Accepted {
            txids: vec!["OABC".to_string()],
        };
        let failed = OrderStatus::Failed {
            message: "timeout".to_string(),
        };

        assert_eq!(accepted.label(), "Accepted");
        assert_eq!(failed.label(), "Failed");
    }
}
