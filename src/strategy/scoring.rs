use super::ScoringModel;
use crate::models::IndicatorSnapshot;

pub const POINTS_PER_CONDITION: u8 = 20;
pub const RSI_LOWER: f64 = 30.0;
pub const RSI_UPPER: f64 = 70.0;
/// Close must sit at least 0.5% under EMA9
pub const PULLBACK_FACTOR: f64 = 0.995;

/// Which of the five conditions a snapshot meets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreBreakdown {
    pub ema_trend: bool,
    pub macd_bullish: bool,
    pub rsi_neutral: bool,
    pub pullback: bool,
    pub obv_positive: bool,
}

impl ScoreBreakdown {
    pub fn evaluate(snapshot: &IndicatorSnapshot) -> Self {
        Self {
            ema_trend: snapshot.ema9 > snapshot.ema21,
            macd_bullish: snapshot.macd_line > snapshot.macd_signal,
            rsi_neutral: RSI_LOWER < snapshot.rsi14 && snapshot.rsi14 < RSI_UPPER,
            pullback: snapshot.close_price < snapshot.ema9 * PULLBACK_FACTOR,
            obv_positive: snapshot.obv > 0.0,
        }
    }

    pub fn conditions_met(&self) -> u8 {
        [
            self.ema_trend,
            self.macd_bullish,
            self.rsi_neutral,
            self.pullback,
            self.obv_positive,
        ]
        .iter()
        .filter(|met| **met)
        .count() as u8
    }

    pub fn total(&self) -> u8 {
        self.conditions_met() * POINTS_PER_CONDITION
    }
}

/// Five equally weighted boolean conditions, 20 points each
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer;

impl CompositeScorer {
    pub fn new() -> Self {
        Self
    }
}

impl ScoringModel for CompositeScorer {
    fn score(&self, snapshot: &IndicatorSnapshot) -> u8 {
        ScoreBreakdown::evaluate(snapshot).total()
    }

    fn name(&self) -> &str {
        "CompositeScorer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Snapshot meeting all five conditions
    fn bullish_pullback() -> IndicatorSnapshot {
        IndicatorSnapshot {
            pair: "X/Y".to_string(),
            timestamp: Utc::now(),
            ema9: 100.0,
            ema21: 98.0,
            rsi14: 55.0,
            macd_line: 0.8,
            macd_signal: 0.5,
            macd_histogram: 0.3,
            obv: 1200.0,
            close_price: 99.4,
        }
    }

    #[test]
    fn test_all_conditions_score_100() {
        let scorer = CompositeScorer::new();
        assert_eq!(scorer.score(&bullish_pullback()), 100);
    }

    #[test]
    fn test_no_conditions_score_0() {
        let snapshot = IndicatorSnapshot {
            ema9: 95.0,
            ema21: 98.0,
            rsi14: 80.0,
            macd_line: 0.1,
            macd_signal: 0.5,
            obv: -10.0,
            close_price: 101.0,
            ..bullish_pullback()
        };

        assert_eq!(CompositeScorer::new().score(&snapshot), 0);
    }

    #[test]
    fn test_rsi_boundaries_are_exclusive() {
        let scorer = CompositeScorer::new();

        let at_lower = IndicatorSnapshot {
            rsi14: 30.0,
            ..bullish_pullback()
        };
        let at_upper = IndicatorSnapshot {
            rsi14: 70.0,
            ..bullish_pullback()
        };
        let inside = IndicatorSnapshot {
            rsi14: 30.0001,
            ..bullish_pullback()
        };

        assert_eq!(scorer.score(&at_lower), 80);
        assert_eq!(scorer.score(&at_upper), 80);
        assert_eq!(scorer.score(&inside), 100);
    }

    #[test]
    fn test_pullback_threshold() {
        let scorer = CompositeScorer::new();

        // Exactly 0.5% below EMA9 does not count (strict)
        let at_threshold = IndicatorSnapshot {
            close_price: 100.0 * PULLBACK_FACTOR,
            ..bullish_pullback()
        };
        let not_pulled_back = IndicatorSnapshot {
            close_price: 99.8,
            ..bullish_pullback()
        };

        assert_eq!(scorer.score(&at_threshold), 80);
        assert_eq!(scorer.score(&not_pulled_back), 80);
    }

    #[test]
    fn test_obv_zero_does_not_count() {
        let snapshot = IndicatorSnapshot {
            obv: 0.0,
            ..bullish_pullback()
        };
        let breakdown = ScoreBreakdown::evaluate(&snapshot);

        assert!(!breakdown.obv_positive);
        assert_eq!(breakdown.conditions_met(), 4);
    }

    #[test]
    fn test_score_is_deterministic_and_stepped() {
        let scorer = CompositeScorer::new();
        let variants = [
            bullish_pullback(),
            IndicatorSnapshot { ema9: 90.0, ..bullish_pullback() },
            IndicatorSnapshot { macd_line: 0.0, ..bullish_pullback() },
            IndicatorSnapshot { rsi14: 10.0, obv: -1.0, ..bullish_pullback() },
            IndicatorSnapshot { rsi14: f64::NAN, ..bullish_pullback() },
        ];

        for snapshot in &variants {
            let first = scorer.score(snapshot);
            assert_eq!(first, scorer.score(snapshot));
            assert!([0, 20, 40, 60, 80, 100].contains(&first));
        }
    }

    #[test]
    fn test_model_name() {
        assert_eq!(CompositeScorer::new().name(), "CompositeScorer");
    }
}
