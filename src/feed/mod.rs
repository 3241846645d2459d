// Live feed consumption: public ticker ingestion and the private own-trades listener
pub mod ingestor;
pub mod messages;
pub mod private;
pub mod transport;

use crate::shutdown::ShutdownSignal;
use tokio::time::Duration;

pub use ingestor::{ConnectionState, StreamIngestor};
pub use messages::{parse_feed_message, FeedMessage, OwnTrade, SubscribeRequest};
pub use private::OwnTradesListener;
pub use transport::{FeedConnection, FeedTransport, WsTransport};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Wait `delay`; false if shutdown arrived first
pub(crate) async fn sleep_or_shutdown(delay: Duration, shutdown: &mut ShutdownSignal) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.cancelled() => false,
    }
}
