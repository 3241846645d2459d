pub mod gateway;
pub mod kraken;
pub mod paper;

pub use gateway::{GatewayError, OrderGateway};
pub use kraken::{KrakenClient, OrderSummary};
pub use paper::PaperGateway;
