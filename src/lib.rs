pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod market;
pub mod signing;

#[cfg(test)]
mod testing;

pub use adapters::FuturesRestClient;
pub use config::AppConfig;
pub use domain::{ExecutionResult, IgnoreReason, Intent, Order, Side, SymbolRules, TradeRequest};
pub use error::{ErrorKind, ErrorReport, LadderError, Result};
pub use exchange::ExchangeTransport;
pub use execution::{ExecutionEngine, OrderGateway};
pub use market::{PositionOracle, SymbolRulesCache};
