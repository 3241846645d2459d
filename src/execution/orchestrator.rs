use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use super::evaluator::{CycleReport, Evaluator};
use crate::feed::{OwnTradesListener, StreamIngestor};
use crate::shutdown::ShutdownSignal;

/// Runs ingestion and periodic evaluation as independent tasks
///
/// The two tasks share nothing but the tick store behind them.
pub struct ExecutionOrchestrator {
    ingestor: Arc<StreamIngestor>,
    evaluator: Arc<Evaluator>,
    own_trades: Option<Arc<OwnTradesListener>>,
    evaluation_interval: Duration,
}

impl ExecutionOrchestrator {
    pub fn new(
        ingestor: Arc<StreamIngestor>,
        evaluator: Arc<Evaluator>,
        evaluation_interval: Duration,
    ) -> Self {
        Self {
            ingestor,
            evaluator,
            own_trades: None,
            evaluation_interval,
        }
    }

    /// Also follow the private own-trades feed
    pub fn with_own_trades(mut self, listener: Arc<OwnTradesListener>) -> Self {
        self.own_trades = Some(listener);
        self
    }

    /// Spawn all loops and wait until every one of them has stopped
    pub async fn run(&self, pairs: Vec<String>, shutdown: ShutdownSignal) {
        tracing::info!(
            "🔄 Spawning loops for {} pairs (evaluation every {}s)",
            pairs.len(),
            self.evaluation_interval.as_secs()
        );

        let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

        // Loop 1: feed ingestion
        let ingestion = {
            let ingestor = self.ingestor.clone();
            let pairs = pairs.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                ingestor.run(&pairs, shutdown).await;
            })
        };
        tasks.push(("ingestion", ingestion));

        // Loop 2: evaluation
        let evaluation = {
            let evaluator = self.evaluator.clone();
            let period = self.evaluation_interval;
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                evaluation_loop(evaluator, pairs, period, shutdown).await;
            })
        };
        tasks.push(("evaluation", evaluation));

        // Loop 3: private own-trades feed (optional)
        if let Some(listener) = &self.own_trades {
            let listener = listener.clone();
            let shutdown = shutdown.clone();
            tasks.push((
                "own-trades",
                tokio::spawn(async move {
                    listener.run(shutdown).await;
                }),
            ));
        }

        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                tracing::error!("{} task ended abnormally: {}", name, e);
            }
        }

        tracing::info!("✅ All loops stopped");
    }
}

/// Evaluate every pair once per `period`, first cycle immediately
pub async fn evaluation_loop(
    evaluator: Arc<Evaluator>,
    pairs: Vec<String>,
    period: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut interval = interval_at(Instant::now(), period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut cycle: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        cycle += 1;
        tracing::info!("⚡ Evaluation cycle {} starting", cycle);

        let report = evaluator.run_cycle(&pairs).await;
        log_cycle(cycle, &report);
    }

    tracing::info!("🛑 Evaluation loop stopped after {} cycles", cycle);
}

fn log_cycle(cycle: u64, report: &CycleReport) {
    tracing::info!(
        "Cycle {} complete: {} scored, {} skipped, {} failed, {} orders",
        cycle,
        report.scored(),
        report.skipped(),
        report.failed(),
        report.orders().len()
    );
}
