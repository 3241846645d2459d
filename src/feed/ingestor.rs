use super::messages::{parse_feed_message, FeedMessage, SubscribeRequest};
use super::transport::{FeedConnection, FeedTransport};
use super::{sleep_or_shutdown, DEFAULT_RECONNECT_DELAY};
use crate::persistence::TickStore;
use crate::shutdown::ShutdownSignal;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Subscribed,
    Streaming,
}

/// How one connection session ended
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Closed,
}

/// Consumes the public ticker feed and appends every tick to the store
///
/// Reconnects forever with a fixed delay; only the shutdown signal stops it.
pub struct StreamIngestor {
    transport: Arc<dyn FeedTransport>,
    store: Arc<dyn TickStore>,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
}

impl StreamIngestor {
    pub fn new(transport: Arc<dyn FeedTransport>, store: Arc<dyn TickStore>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            store,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            state,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Stream ticks for `pairs` until shutdown
    pub async fn run(&self, pairs: &[String], mut shutdown: ShutdownSignal) {
        let mut attempt: u64 = 0;

        while !shutdown.is_cancelled() {
            attempt += 1;
            tracing::info!(
                "🔌 Connecting to feed {} (attempt {})",
                self.transport.endpoint(),
                attempt
            );

            match self.session(pairs, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => {
                    tracing::warn!(
                        "Feed connection closed. Reconnecting in {}s...",
                        self.reconnect_delay.as_secs()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Feed error: {}. Reconnecting in {}s...",
                        e,
                        self.reconnect_delay.as_secs()
                    );
                }
            }

            self.set_state(ConnectionState::Disconnected);

            if !sleep_or_shutdown(self.reconnect_delay, &mut shutdown).await {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("🛑 Feed ingestion stopped");
    }

    async fn session(
        &self,
        pairs: &[String],
        shutdown: &mut ShutdownSignal,
    ) -> Result<SessionEnd> {
        let mut conn = tokio::select! {
            conn = self.transport.connect() => conn?,
            _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
        };
        self.set_state(ConnectionState::Connected);

        let request = SubscribeRequest::ticker(pairs);
        if let Err(e) = conn.send(&request.to_value()).await {
            let _ = conn.close().await;
            return Err(e);
        }
        self.set_state(ConnectionState::Subscribed);
        tracing::info!("📡 Subscribed to ticker feed for {} pairs", pairs.len());

        let outcome = self.stream(conn.as_mut(), shutdown).await;

        if matches!(outcome, Ok(SessionEnd::Shutdown)) {
            if let Err(e) = conn.close().await {
                tracing::debug!("Error closing feed connection: {}", e);
            }
        }

        outcome
    }

    async fn stream(
        &self,
        conn: &mut dyn FeedConnection,
        shutdown: &mut ShutdownSignal,
    ) -> Result<SessionEnd> {
        let mut ticks: u64 = 0;

        loop {
            let message = tokio::select! {
                message = conn.next_message() => message,
                _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            };

            let text = match message {
                Some(Ok(text)) => text,
                Some(Err(e)) => return Err(e),
                None => {
                    tracing::info!("Feed session ended after {} ticks", ticks);
                    return Ok(SessionEnd::Closed);
                }
            };

            if self.state() != ConnectionState::Streaming {
                self.set_state(ConnectionState::Streaming);
            }

            match parse_feed_message(&text, Utc::now()) {
                FeedMessage::Ticker(tick) => match self.store.append(&tick).await {
                    Ok(()) => {
                        ticks += 1;
                        tracing::debug!(
                            pair = %tick.pair,
                            price = tick.price,
                            volume = tick.volume,
                            "Tick stored"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(pair = %tick.pair, "Failed to store tick: {}", e);
                    }
                },
                FeedMessage::SubscriptionStatus {
                    pair,
                    status,
                    error_message,
                } => match error_message {
                    Some(err) => tracing::warn!(
                        "Subscription {} for {}: {}",
                        status,
                        pair.unwrap_or_default(),
                        err
                    ),
                    None => tracing::info!(
                        "Subscription {} for {}",
                        status,
                        pair.unwrap_or_default()
                    ),
                },
                FeedMessage::SystemStatus { status } => {
                    tracing::info!("Feed system status: {}", status);
                }
                FeedMessage::Heartbeat | FeedMessage::Other => {}
            }
        }
    }
}
