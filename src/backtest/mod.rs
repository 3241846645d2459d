// Offline replay of tick histories through the evaluation pipeline
pub mod runner;
pub mod synthetic;

pub use runner::{ReplayPoint, ReplayReport, ReplayRunner};
pub use synthetic::{MarketScenario, SyntheticTickGenerator};
