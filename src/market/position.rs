use reqwest::Method;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::domain::Position;
use crate::error::{LadderError, Result};
use crate::exchange::types::{PositionRisk, POSITION_RISK_PATH};
use crate::exchange::{params, ExchangeTransport};

/// Live position lookups; never cached.
pub struct PositionOracle {
    transport: Arc<dyn ExchangeTransport>,
}

impl PositionOracle {
    pub fn new(transport: Arc<dyn ExchangeTransport>) -> Self {
        Self { transport }
    }

    pub async fn get_position(&self, symbol: &str) -> Result<Position> {
        let value = self
            .transport
            .signed_request(
                Method::GET,
                POSITION_RISK_PATH,
                params(&[("symbol", symbol)]),
            )
            .await?;
        let rows: Vec<PositionRisk> = serde_json::from_value(value)?;

        // One-way mode reports a single BOTH row per symbol; take the first match.
        let row = rows
            .into_iter()
            .find(|r| r.symbol == symbol)
            .ok_or_else(|| LadderError::UnknownSymbol(symbol.to_string()))?;

        debug!(symbol, amount = %row.position_amt, side = ?row.position_side, "position snapshot");

        Ok(Position {
            symbol: row.symbol,
            amount: row.position_amt,
        })
    }

    /// Signed position amount: positive long, negative short, zero flat
    pub async fn get_position_amount(&self, symbol: &str) -> Result<Decimal> {
        Ok(self.get_position(symbol).await?.amount)
    }
}
