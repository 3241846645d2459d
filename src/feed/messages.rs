use crate::models::Tick;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub const TICKER_CHANNEL: &str = "ticker";
pub const OWN_TRADES_CHANNEL: &str = "ownTrades";

/// Subscribe request sent right after connecting
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscribeRequest {
    pub event: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pair: Vec<String>,
    pub subscription: Subscription,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Subscription {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SubscribeRequest {
    /// Public ticker channel for `pairs`
    pub fn ticker(pairs: &[String]) -> Self {
        Self {
            event: "subscribe".to_string(),
            pair: pairs.to_vec(),
            subscription: Subscription {
                name: TICKER_CHANNEL.to_string(),
                token: None,
            },
        }
    }

    /// Authenticated own-trades channel
    pub fn own_trades(token: impl Into<String>) -> Self {
        Self {
            event: "subscribe".to_string(),
            pair: Vec::new(),
            subscription: Subscription {
                name: OWN_TRADES_CHANNEL.to_string(),
                token: Some(token.into()),
            },
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Decoded inbound feed message
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Ticker(Tick),
    Heartbeat,
    SubscriptionStatus {
        pair: Option<String>,
        status: String,
        error_message: Option<String>,
    },
    SystemStatus {
        status: String,
    },
    /// Anything else, malformed payloads included
    Other,
}

/// Decode one text frame
///
/// Ticker updates are arrays holding the string `"ticker"`, the pair as the
/// last element and the payload object at index 1, with last trade price in
/// `c[0]` and 24h volume in `v[1]`. `received_at` becomes the tick timestamp.
pub fn parse_feed_message(text: &str, received_at: DateTime<Utc>) -> FeedMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return FeedMessage::Other,
    };

    match &value {
        Value::Array(items) => parse_ticker(items, received_at)
            .map(FeedMessage::Ticker)
            .unwrap_or(FeedMessage::Other),
        Value::Object(fields) => match fields.get("event").and_then(Value::as_str) {
            Some("heartbeat") => FeedMessage::Heartbeat,
            Some("subscriptionStatus") => FeedMessage::SubscriptionStatus {
                pair: fields.get("pair").and_then(Value::as_str).map(str::to_string),
                status: string_field(&value, "status"),
                error_message: fields
                    .get("errorMessage")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            Some("systemStatus") => FeedMessage::SystemStatus {
                status: string_field(&value, "status"),
            },
            _ => FeedMessage::Other,
        },
        _ => FeedMessage::Other,
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_ticker(items: &[Value], received_at: DateTime<Utc>) -> Option<Tick> {
    if !items.iter().any(|v| v.as_str() == Some(TICKER_CHANNEL)) {
        return None;
    }

    let pair = items.last()?.as_str()?;
    let payload = items.get(1)?;

    let price = decimal_at(payload, "c", 0)?;
    let volume = decimal_at(payload, "v", 1)?;

    if !price.is_finite() || price <= 0.0 || !volume.is_finite() || volume < 0.0 {
        return None;
    }

    Some(Tick::new(pair, price, volume, received_at))
}

/// String-encoded decimal at `payload[key][index]`
fn decimal_at(payload: &Value, key: &str, index: usize) -> Option<f64> {
    payload.get(key)?.get(index)?.as_str()?.parse().ok()
}

/// One fill from the own-trades channel
#[derive(Debug, Clone, PartialEq)]
pub struct OwnTrade {
    pub trade_id: String,
    pub order_txid: String,
    pub pair: String,
    pub side: String,
    pub price: f64,
    pub volume: f64,
    pub fee: f64,
}

/// Decode an own-trades update: `[[{trade_id: {...}}, ...], "ownTrades", {...}]`
pub fn parse_own_trades(text: &str) -> Option<Vec<OwnTrade>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let items = value.as_array()?;

    if items.get(1)?.as_str()? != OWN_TRADES_CHANNEL {
        return None;
    }

    let mut trades = Vec::new();
    for entry in items.first()?.as_array()? {
        for (trade_id, fields) in entry.as_object()? {
            trades.push(OwnTrade {
                trade_id: trade_id.clone(),
                order_txid: string_field(fields, "ordertxid"),
                pair: string_field(fields, "pair"),
                side: string_field(fields, "type"),
                price: string_field(fields, "price").parse().unwrap_or(0.0),
                volume: string_field(fields, "vol").parse().unwrap_or(0.0),
                fee: string_field(fields, "fee").parse().unwrap_or(0.0),
            });
        }
    }

    Some(trades)
}
