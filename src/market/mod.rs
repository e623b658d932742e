pub mod position;
pub mod rules_cache;

pub use position::PositionOracle;
pub use rules_cache::SymbolRulesCache;
