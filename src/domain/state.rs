use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LadderState {
    /// Validating the request and resolving side/quantity
    Resolving,
    /// Limit order resting at the n-th configured tick offset
    LadderAttempt(u32),
    /// Every ladder step failed to fill; market order in flight
    MarketFallback,
    /// Terminal: filled, fell back, or ignored
    Done,
}

impl LadderState {
    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: LadderState) -> bool {
        use LadderState::*;

        match (self, target) {
            (Resolving, LadderAttempt(_)) => true,
            (Resolving, MarketFallback) => true,
            (Resolving, Done) => true,
            (LadderAttempt(_), LadderAttempt(_)) => true,
            (LadderAttempt(_), MarketFallback) => true,
            (LadderAttempt(_), Done) => true,
            (MarketFallback, Done) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LadderState::Done)
    }
}

impl fmt::Display for LadderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LadderState::Resolving => write!(f, "RESOLVING"),
            LadderState::LadderAttempt(ticks) => write!(f, "LADDER_ATTEMPT({})", ticks),
            LadderState::MarketFallback => write!(f, "MARKET_FALLBACK"),
            LadderState::Done => write!(f, "DONE"),
        }
    }
}
