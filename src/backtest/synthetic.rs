use crate::models::Tick;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic tick generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise
    Uptrend,
    /// Steady downtrend with noise
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large swings (±3% per tick)
    Volatile,
    /// Feed outages: stretches with no ticks at all
    WithGaps,
}

impl MarketScenario {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "uptrend" => Some(Self::Uptrend),
            "downtrend" => Some(Self::Downtrend),
            "sideways" => Some(Self::Sideways),
            "volatile" => Some(Self::Volatile),
            "gaps" | "withgaps" | "with-gaps" => Some(Self::WithGaps),
            _ => None,
        }
    }
}

/// Generates reproducible tick streams for replay
pub struct SyntheticTickGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticTickGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 100.0,
            base_volume: 1_000.0,
        }
    }

    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = price;
        self
    }

    /// Generate `num_ticks` ticks starting at `start`
    ///
    /// Consecutive ticks are `spacing_secs` apart on average, with up to half
    /// that spacing of random jitter. Prices never drop below half the base.
    pub fn generate(
        &mut self,
        pair: &str,
        scenario: MarketScenario,
        num_ticks: usize,
        start: DateTime<Utc>,
        spacing_secs: i64,
    ) -> Vec<Tick> {
        let spacing_secs = spacing_secs.max(1);
        let mut ticks = Vec::with_capacity(num_ticks);
        let mut price = self.base_price;
        let mut offset_secs: i64 = 0;

        for i in 0..num_ticks {
            price = match scenario {
                MarketScenario::Uptrend => price * (1.0 + 0.002 + self.rng.gen_range(-0.003..0.003)),
                MarketScenario::Downtrend => price * (1.0 - 0.002 + self.rng.gen_range(-0.003..0.003)),
                MarketScenario::Sideways | MarketScenario::WithGaps => {
                    let reversion = (self.base_price - price) * 0.1;
                    price + reversion + price * self.rng.gen_range(-0.01..0.01)
                }
                MarketScenario::Volatile => price * (1.0 + self.rng.gen_range(-0.03..0.03)),
            };
            price = price.max(self.base_price * 0.5);

            // Every 40th tick is followed by a one hour outage
            if scenario == MarketScenario::WithGaps && i > 0 && i % 40 == 0 {
                offset_secs += 3600;
            }

            let jitter = self.rng.gen_range(0..=spacing_secs / 2);
            let timestamp = start + Duration::seconds(offset_secs + jitter);
            offset_secs += spacing_secs;

            // Cumulative-style volume, ±30%
            let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

            ticks.push(Tick::new(pair, price, volume, timestamp));
        }

        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_generate_uptrend() {
        let mut gen = SyntheticTickGenerator::new(42);
        let ticks = gen.generate("SYN/USD", MarketScenario::Uptrend, 500, start(), 60);

        assert_eq!(ticks.len(), 500);
        let first = ticks.first().unwrap().price;
        let last = ticks.last().unwrap().price;
        assert!(last > first, "Uptrend should end higher: {} -> {}", first, last);
    }

    #[test]
    fn test_generate_downtrend() {
        let mut gen = SyntheticTickGenerator::new(42);
        let ticks = gen.generate("SYN/USD", MarketScenario::Downtrend, 500, start(), 60);

        let first = ticks.first().unwrap().price;
        let last = ticks.last().unwrap().price;
        assert!(last < first, "Downtrend should end lower: {} -> {}", first, last);
    }

    #[test]
    fn test_generate_sideways_stays_near_base() {
        let mut gen = SyntheticTickGenerator::new(7);
        let ticks = gen.generate("SYN/USD", MarketScenario::Sideways, 500, start(), 60);

        assert!(ticks.iter().all(|t| t.price > 85.0 && t.price < 115.0));
    }

    #[test]
    fn test_same_seed_same_ticks() {
        let a = SyntheticTickGenerator::new(9).generate("A/B", MarketScenario::Volatile, 50, start(), 30);
        let b = SyntheticTickGenerator::new(9).generate("A/B", MarketScenario::Volatile, 50, start(), 30);

        assert_eq!(a, b);
    }

    #[test]
    fn test_timestamps_increase_and_gaps_exist() {
        let mut gen = SyntheticTickGenerator::new(1);
        let ticks = gen.generate("SYN/USD", MarketScenario::WithGaps, 120, start(), 60);

        assert!(ticks.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        let longest = ticks
            .windows(2)
            .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
            .max()
            .unwrap();
        assert!(longest >= 3600);
    }

    #[test]
    fn test_parse_scenario() {
        assert_eq!(MarketScenario::parse("Uptrend"), Some(MarketScenario::Uptrend));
        assert_eq!(MarketScenario::parse("with-gaps"), Some(MarketScenario::WithGaps));
        assert_eq!(MarketScenario::parse("moon"), None);
    }
}
