pub mod accumulator;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod eval;
pub mod message;

pub use accumulator::{EvalAccumulator, NanPolicy};
pub use config::{EvalConfig, EvalVariant, ProcessArgs};
pub use checkpoint::latest_checkpoint;
pub use engine::{ConditioningInput, EngineError, InferenceEngine, ReplayEngine};
pub use eval::eval_stream;
pub use message::EvalMessage;
