//! Order routing and the limit-ladder execution state machine.

pub mod engine;
pub mod gateway;

pub use engine::{EngineSettings, ExecutionEngine, ResolvedOrder};
pub use gateway::OrderGateway;
