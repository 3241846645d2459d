// Scoring of indicator snapshots
pub mod scoring;

use crate::models::IndicatorSnapshot;

pub use scoring::{CompositeScorer, ScoreBreakdown};

/// Maps an indicator snapshot to a 0-100 tradeability score
pub trait ScoringModel: Send + Sync {
    /// Score a snapshot; must be a pure function of its input
    fn score(&self, snapshot: &IndicatorSnapshot) -> u8;

    /// Get model name
    fn name(&self) -> &str;
}
