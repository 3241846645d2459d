use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{OrderAck, OrderRequest, OrderStatus};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request reached the exchange, which refused it
    #[error("exchange rejected request: {}", .0.join(", "))]
    Rejected(Vec<String>),

    /// Request never got a usable answer from the exchange
    #[error("request failed to reach exchange: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected exchange response: {0}")]
    Malformed(String),

    #[error("API credentials are not configured")]
    MissingCredentials,

    #[error("API secret is not valid base64: {0}")]
    InvalidSecret(#[from] base64::DecodeError),
}

impl GatewayError {
    /// Audit status for an order that ended in this error
    pub fn as_order_status(&self) -> OrderStatus {
        match self {
            GatewayError::Rejected(errors) => OrderStatus::Rejected {
                errors: errors.clone(),
            },
            other => OrderStatus::Failed {
                message: other.to_string(),
            },
        }
    }
}

/// Exchange trading API as seen by the evaluation loop
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit an order; returns once the exchange acknowledged or refused it
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError>;

    /// Per-asset balances
    async fn get_balance(&self) -> Result<HashMap<String, f64>, GatewayError>;

    /// Token for authenticating a private feed subscription
    async fn get_websocket_token(&self) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_maps_to_rejected_status() {
        let err = GatewayError::Rejected(vec!["EOrder:Insufficient funds".to_string()]);

        assert_eq!(
            err.as_order_status(),
            OrderStatus::Rejected {
                errors: vec!["EOrder:Insufficient funds".to_string()]
            }
        );
        assert!(err.to_string().contains("Insufficient funds"));
    }

    #[test]
    fn test_other_errors_map_to_failed_status() {
        let err = GatewayError::Malformed("missing result".to_string());

        match err.as_order_status() {
            OrderStatus::Failed { message } => assert!(message.contains("missing result")),
            other => panic!("unexpected status {:?}", other),
        }
    }
}
