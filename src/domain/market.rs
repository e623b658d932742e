use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::error::{LadderError, Result};

/// Truncate `value` to a multiple of `step`, toward zero.
///
/// A non-positive step leaves the value untouched. `None` when the
/// intermediate quotient overflows the decimal range.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return Some(value);
    }
    value.checked_div(step)?.trunc().checked_mul(step)
}

/// Truncate `price` to a multiple of `tick`, toward zero.
pub fn round_price_to_tick(price: Decimal, tick: Decimal) -> Option<Decimal> {
    floor_to_step(price, tick)
}

fn out_of_range(what: &str, value: Decimal) -> LadderError {
    LadderError::InvalidRequest(format!("{} {} is out of the representable range", what, value))
}

/// Exchange-enforced precision filters for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRules {
    /// Smallest price increment
    pub tick_size: Decimal,
    /// Smallest quantity increment
    pub step_size: Decimal,
    pub min_qty: Decimal,
}

impl SymbolRules {
    pub fn floor_qty(&self, qty: Decimal) -> Result<Decimal> {
        floor_to_step(qty, self.step_size).ok_or_else(|| out_of_range("quantity", qty))
    }

    pub fn round_price(&self, price: Decimal) -> Result<Decimal> {
        round_price_to_tick(price, self.tick_size).ok_or_else(|| out_of_range("price", price))
    }

    /// Limit price `ticks` ticks through the reference, in the aggressive direction.
    pub fn ladder_price(&self, reference: Decimal, side: Side, ticks: u32) -> Result<Decimal> {
        let target = Decimal::from(ticks)
            .checked_mul(self.tick_size)
            .and_then(|offset| match side {
                Side::Buy => reference.checked_add(offset),
                Side::Sell => reference.checked_sub(offset),
            })
            .ok_or_else(|| out_of_range("reference price", reference))?;
        self.round_price(target)
    }
}

/// Signed position snapshot: positive long, negative short, zero flat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub amount: Decimal,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.amount.is_zero()
    }

    /// Side of the order that reduces this position, if any
    pub fn closing_side(&self) -> Option<Side> {
        if self.amount > Decimal::ZERO {
            Some(Side::Sell)
        } else if self.amount < Decimal::ZERO {
            Some(Side::Buy)
        } else {
            None
        }
    }
}
