use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::gateway::{GatewayError, OrderGateway};
use crate::models::{OrderAck, OrderRequest};

/// Gateway that logs orders instead of sending them
///
/// Acknowledges every order with a `PAPER-` txid and keeps a copy for inspection.
#[derive(Debug, Clone, Default)]
pub struct PaperGateway {
    placed: Arc<Mutex<Vec<OrderRequest>>>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders "placed" so far, oldest first
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed
            .lock()
            .map(|orders| orders.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let txid = format!("PAPER-{}", Uuid::new_v4());
        let description = match order.price {
            Some(price) => format!(
                "{} {:.8} {} @ {} {}",
                order.side.as_str(),
                order.volume,
                order.pair,
                order.order_type.as_str(),
                price
            ),
            None => format!(
                "{} {:.8} {} @ {}",
                order.side.as_str(),
                order.volume,
                order.pair,
                order.order_type.as_str()
            ),
        };

        tracing::info!("📝 [PAPER] Would place: {} ({})", description, txid);

        if let Ok(mut placed) = self.placed.lock() {
            placed.push(order.clone());
        }

        Ok(OrderAck {
            txids: vec![txid],
            description,
        })
    }

    async fn get_balance(&self) -> Result<HashMap<String, f64>, GatewayError> {
        Ok(HashMap::new())
    }

    async fn get_websocket_token(&self) -> Result<String, GatewayError> {
        Err(GatewayError::MissingCredentials)
    }
}
