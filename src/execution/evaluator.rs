use chrono::Utc;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use crate::api::{GatewayError, OrderGateway};
use crate::candles::{AggregationConfig, AggregationError, CandleAggregator};
use crate::config::EvaluationSettings;
use crate::indicators::{IndicatorEngine, IndicatorError};
use crate::models::{OrderRecord, OrderRequest, OrderStatus, Score};
use crate::persistence::{OrderJournal, ScoreStore, TickStore};
use crate::strategy::{CompositeScorer, ScoringModel};

/// Why one pair produced no score in a cycle
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("{pair}: {source}")]
    Indicators {
        pair: String,
        #[source]
        source: IndicatorError,
    },

    #[error("{pair}: indicator snapshot has non-finite values")]
    MalformedSnapshot { pair: String },

    #[error("{pair}: close price {price} cannot size an order")]
    InvalidPrice { pair: String, price: f64 },

    #[error("{pair}: evaluation panicked: {message}")]
    Panicked { pair: String, message: String },
}

impl EvaluationError {
    /// Not enough history yet; the pair is simply retried next cycle
    pub fn is_insufficient_data(&self) -> bool {
        match self {
            EvaluationError::Aggregation(e) => e.is_insufficient_data(),
            EvaluationError::Indicators { .. } => true,
            _ => false,
        }
    }
}

/// Result of one pair's pipeline
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub score: Score,
    /// Present when the score reached the threshold
    pub order: Option<OrderRecord>,
}

#[derive(Debug)]
pub struct PairResult {
    pub pair: String,
    pub outcome: Result<PairOutcome, EvaluationError>,
}

/// Per-pair results of one evaluation cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub results: Vec<PairResult>,
}

impl CycleReport {
    pub fn scored(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(&r.outcome, Err(e) if e.is_insufficient_data()))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(&r.outcome, Err(e) if !e.is_insufficient_data()))
            .count()
    }

    /// Order records produced this cycle, whatever their status
    pub fn orders(&self) -> Vec<&OrderRecord> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .filter_map(|o| o.order.as_ref())
            .collect()
    }

    pub fn get(&self, pair: &str) -> Option<&Result<PairOutcome, EvaluationError>> {
        self.results.iter().find(|r| r.pair == pair).map(|r| &r.outcome)
    }
}

/// aggregate → indicators → score → maybe order, for each pair
pub struct Evaluator {
    aggregator: CandleAggregator,
    engine: IndicatorEngine,
    scorer: Arc<dyn ScoringModel>,
    scores: Arc<dyn ScoreStore>,
    journal: Arc<dyn OrderJournal>,
    gateway: Arc<dyn OrderGateway>,
    score_threshold: u8,
    notional_per_trade: f64,
}

impl Evaluator {
    pub fn new(
        ticks: Arc<dyn TickStore>,
        scores: Arc<dyn ScoreStore>,
        journal: Arc<dyn OrderJournal>,
        gateway: Arc<dyn OrderGateway>,
        settings: &EvaluationSettings,
    ) -> Self {
        Self {
            aggregator: CandleAggregator::new(ticks, settings.aggregation()),
            engine: IndicatorEngine::new(),
            scorer: Arc::new(CompositeScorer::new()),
            scores,
            journal,
            gateway,
            score_threshold: settings.score_threshold,
            notional_per_trade: settings.notional_per_trade,
        }
    }

    pub fn with_scoring_model(mut self, scorer: Arc<dyn ScoringModel>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn aggregation(&self) -> &AggregationConfig {
        self.aggregator.config()
    }

    /// Evaluate every pair once; one pair failing never affects the others
    pub async fn run_cycle(&self, pairs: &[String]) -> CycleReport {
        let mut report = CycleReport::default();

        for pair in pairs {
            let outcome = match AssertUnwindSafe(self.evaluate_pair(pair))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => Err(EvaluationError::Panicked {
                    pair: pair.clone(),
                    message: panic_message(panic.as_ref()),
                }),
            };

            match &outcome {
                Ok(_) => {}
                Err(e) if e.is_insufficient_data() => {
                    tracing::info!(pair = %pair, "⏳ Skipping: {}", e);
                }
                Err(e) => {
                    tracing::error!(pair = %pair, "❌ Evaluation failed: {}", e);
                }
            }

            report.results.push(PairResult {
                pair: pair.clone(),
                outcome,
            });
        }

        report
    }

    /// Run the four-step pipeline for one pair
    pub async fn evaluate_pair(&self, pair: &str) -> Result<PairOutcome, EvaluationError> {
        let candles = self.aggregator.aggregate(pair).await?;

        let snapshot = self
            .engine
            .compute(&candles)
            .map_err(|source| EvaluationError::Indicators {
                pair: pair.to_string(),
                source,
            })?;

        if !snapshot.is_well_formed() {
            return Err(EvaluationError::MalformedSnapshot {
                pair: pair.to_string(),
            });
        }

        let value = self.scorer.score(&snapshot);
        let score = Score {
            pair: pair.to_string(),
            timestamp: Utc::now(),
            value,
            price: snapshot.close_price,
        };

        tracing::info!(
            pair = %pair,
            ema9 = snapshot.ema9,
            ema21 = snapshot.ema21,
            rsi = snapshot.rsi14,
            macd = snapshot.macd_line,
            macd_signal = snapshot.macd_signal,
            obv = snapshot.obv,
            "📊 Score {} at price {:.8} ({})",
            value,
            snapshot.close_price,
            self.scorer.name()
        );

        if let Err(e) = self.scores.record(&score).await {
            tracing::error!(pair = %pair, "Failed to record score: {}", e);
        }

        let order = if value >= self.score_threshold {
            Some(self.request_order(pair, snapshot.close_price).await?)
        } else {
            None
        };

        Ok(PairOutcome { score, order })
    }

    /// Limit buy of `notional_per_trade` worth at `price`
    async fn request_order(&self, pair: &str, price: f64) -> Result<OrderRecord, EvaluationError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(EvaluationError::InvalidPrice {
                pair: pair.to_string(),
                price,
            });
        }

        let volume = self.notional_per_trade / price;
        let request = OrderRequest::limit_buy(pair, volume, price);

        tracing::info!(
            pair = %pair,
            "🟢 Score above threshold {}: limit buy {:.8} @ {:.8}",
            self.score_threshold,
            volume,
            price
        );

        let status = match self.gateway.place_order(&request).await {
            Ok(ack) => {
                tracing::info!(pair = %pair, txids = ?ack.txids, "✅ Order accepted: {}", ack.description);
                OrderStatus::Accepted { txids: ack.txids }
            }
            Err(e @ GatewayError::Rejected(_)) => {
                tracing::warn!(pair = %pair, "⚠️  Order rejected: {}", e);
                e.as_order_status()
            }
            Err(e) => {
                tracing::error!(pair = %pair, "❌ Order request failed: {}", e);
                e.as_order_status()
            }
        };

        let record = OrderRecord::new(request, status);
        if let Err(e) = self.journal.record_order(&record).await {
            tracing::error!(pair = %pair, "Failed to record order {}: {}", record.id, e);
        }

        Ok(record)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
