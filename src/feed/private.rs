use super::messages::{parse_feed_message, parse_own_trades, FeedMessage, SubscribeRequest};
use super::transport::FeedTransport;
use super::{sleep_or_shutdown, DEFAULT_RECONNECT_DELAY};
use crate::api::OrderGateway;
use crate::shutdown::ShutdownSignal;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Duration;

/// Follows the authenticated own-trades channel and logs fills
///
/// A fresh WebSocket token is requested from the gateway for every connection.
pub struct OwnTradesListener {
    transport: Arc<dyn FeedTransport>,
    gateway: Arc<dyn OrderGateway>,
    reconnect_delay: Duration,
}

impl OwnTradesListener {
    pub fn new(transport: Arc<dyn FeedTransport>, gateway: Arc<dyn OrderGateway>) -> Self {
        Self {
            transport,
            gateway,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        while !shutdown.is_cancelled() {
            match self.session(&mut shutdown).await {
                Ok(true) => break,
                Ok(false) => tracing::warn!(
                    "Private feed closed. Reconnecting in {}s...",
                    self.reconnect_delay.as_secs()
                ),
                Err(e) => tracing::error!(
                    "Private feed error: {}. Reconnecting in {}s...",
                    e,
                    self.reconnect_delay.as_secs()
                ),
            }

            if !sleep_or_shutdown(self.reconnect_delay, &mut shutdown).await {
                break;
            }
        }

        tracing::info!("🛑 Private feed stopped");
    }

    /// One connection; `Ok(true)` when it ended because of shutdown
    async fn session(&self, shutdown: &mut ShutdownSignal) -> Result<bool> {
        let token = tokio::select! {
            token = self.gateway.get_websocket_token() => token?,
            _ = shutdown.cancelled() => return Ok(true),
        };

        let mut conn = tokio::select! {
            conn = self.transport.connect() => conn?,
            _ = shutdown.cancelled() => return Ok(true),
        };

        conn.send(&SubscribeRequest::own_trades(token).to_value())
            .await?;
        tracing::info!("🔐 Subscribed to private ownTrades feed");

        loop {
            let message = tokio::select! {
                message = conn.next_message() => message,
                _ = shutdown.cancelled() => {
                    let _ = conn.close().await;
                    return Ok(true);
                }
            };

            let text = match message {
                Some(Ok(text)) => text,
                Some(Err(e)) => return Err(e),
                None => return Ok(false),
            };

            if let Some(trades) = parse_own_trades(&text) {
                for trade in trades {
                    tracing::info!(
                        pair = %trade.pair,
                        order = %trade.order_txid,
                        "💱 Own trade {}: {} {} @ {} (fee {})",
                        trade.trade_id,
                        trade.side,
                        trade.volume,
                        trade.price,
                        trade.fee
                    );
                }
                continue;
            }

            match parse_feed_message(&text, Utc::now()) {
                FeedMessage::SubscriptionStatus {
                    status,
                    error_message: Some(err),
                    ..
                } => tracing::warn!("ownTrades subscription {}: {}", status, err),
                FeedMessage::SubscriptionStatus { status, .. } => {
                    tracing::info!("ownTrades subscription {}", status)
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{GatewayError, PaperGateway};
    use crate::feed::testing::{MockTransport, Script};
    use crate::models::{OrderAck, OrderRequest};
    use crate::shutdown;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct TokenGateway;

    #[async_trait]
    impl OrderGateway for TokenGateway {
        async fn place_order(&self, _order: &OrderRequest) -> std::result::Result<OrderAck, GatewayError> {
            Err(GatewayError::MissingCredentials)
        }

        async fn get_balance(&self) -> std::result::Result<HashMap<String, f64>, GatewayError> {
            Ok(HashMap::new())
        }

        async fn get_websocket_token(&self) -> std::result::Result<String, GatewayError> {
            Ok("ws-token".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribes_with_fresh_token() {
        let transport = Arc::new(MockTransport::new(vec![
            Script::Messages(vec![r#"{"event":"subscriptionStatus","status":"subscribed","subscription":{"name":"ownTrades"}}"#.to_string()]),
            Script::Hang,
        ]));
        let listener = OwnTradesListener::new(transport.clone(), Arc::new(TokenGateway));
        let (trigger, signal) = shutdown::channel();

        let task = tokio::spawn(async move { listener.run(signal).await });

        tokio::time::sleep(Duration::from_secs(6)).await;
        trigger.trigger();
        task.await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["subscription"]["name"], "ownTrades");
        assert_eq!(sent[1]["subscription"]["token"], "ws-token");
        assert!(transport.was_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_failure_retries_without_connecting() {
        let transport = Arc::new(MockTransport::new(vec![Script::Hang]));
        let listener = OwnTradesListener::new(transport.clone(), Arc::new(PaperGateway::new()));
        let (trigger, signal) = shutdown::channel();

        let task = tokio::spawn(async move { listener.run(signal).await });

        tokio::time::sleep(Duration::from_secs(11)).await;
        trigger.trigger();
        task.await.unwrap();

        assert!(transport.connect_times().is_empty());
    }

    /// Token request that never answers
    struct StalledGateway;

    #[async_trait]
    impl OrderGateway for StalledGateway {
        async fn place_order(&self, _order: &OrderRequest) -> std::result::Result<OrderAck, GatewayError> {
            Err(GatewayError::MissingCredentials)
        }

        async fn get_balance(&self) -> std::result::Result<HashMap<String, f64>, GatewayError> {
            Ok(HashMap::new())
        }

        async fn get_websocket_token(&self) -> std::result::Result<String, GatewayError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_pending_token_request() {
        let transport = Arc::new(MockTransport::new(vec![Script::Hang]));
        let listener = OwnTradesListener::new(transport.clone(), Arc::new(StalledGateway));
        let (trigger, signal) = shutdown::channel();

        let task = tokio::spawn(async move { listener.run(signal).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.trigger();

        let stopped = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(stopped.is_ok(), "listener still waiting on the token");
        assert!(transport.connect_times().is_empty());
    }
}
