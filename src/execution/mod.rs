// Evaluation pipeline and the loops that drive it
pub mod evaluator;
pub mod orchestrator;

pub use evaluator::{CycleReport, EvaluationError, Evaluator, PairOutcome, PairResult};
pub use orchestrator::{evaluation_loop, ExecutionOrchestrator};
