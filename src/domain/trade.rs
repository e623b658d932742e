use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use super::{Order, Side};
use crate::error::{LadderError, Result};

/// Maximum client order id length accepted by the exchange
pub const MAX_CLIENT_ID_LEN: usize = 36;

/// Side as requested by the signal; exits may leave it unspecified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
    Unspecified,
}

impl TradeSide {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = raw.map(str::trim).unwrap_or_default();
        match raw.to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            "" => Ok(TradeSide::Unspecified),
            _ => Err(LadderError::InvalidSide(raw.to_string())),
        }
    }

    pub fn as_order_side(&self) -> Option<Side> {
        match self {
            TradeSide::Buy => Some(Side::Buy),
            TradeSide::Sell => Some(Side::Sell),
            TradeSide::Unspecified => None,
        }
    }
}

/// Whether the signal opens or closes exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    Entry,
    Exit,
}

impl FromStr for Intent {
    type Err = LadderError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "entry" => Ok(Intent::Entry),
            "exit" => Ok(Intent::Exit),
            other => Err(LadderError::InvalidRequest(format!(
                "invalid intent '{}': expected entry or exit",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Intent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// Accepts a decimal as a JSON string or number; null and "" mean absent.
fn lenient_decimal<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Decimal>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected decimal, got {}",
            other
        ))),
    }
}

/// Accepts a bool, "true"/"false"/"1"/"0"/"yes"/"no" strings, or 0/1; null and "" mean absent.
fn lenient_bool<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<bool>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b)),
        Some(serde_json::Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "expected boolean, got '{}'",
                other
            ))),
        },
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(serde::de::Error::custom(format!("expected boolean, got {}", n))),
        },
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected boolean, got {}",
            other
        ))),
    }
}

/// Inbound trade instruction
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeRequest {
    /// Defaults to the allowed symbol when absent
    #[serde(default)]
    pub symbol: Option<String>,
    /// Raw side as sent; validated by the engine
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub quantity: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price_ref: Option<Decimal>,
    #[serde(default)]
    pub intent: Intent,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub reduce_only: Option<bool>,
    #[serde(default, alias = "order_id")]
    pub client_id: Option<String>,
}

impl TradeRequest {
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| LadderError::InvalidRequest(format!("malformed trade payload: {}", e)))
    }

    pub fn entry(symbol: &str, side: Side, quantity: Option<Decimal>) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            side: Some(side.as_str().to_ascii_lowercase()),
            quantity,
            ..Default::default()
        }
    }

    pub fn exit(symbol: &str) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            intent: Intent::Exit,
            ..Default::default()
        }
    }

    pub fn with_price_ref(mut self, price_ref: Decimal) -> Self {
        self.price_ref = Some(price_ref);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Reduce-only if flagged explicitly or the intent is an exit
    pub fn is_reduce_only(&self) -> bool {
        self.reduce_only.unwrap_or(false) || self.intent == Intent::Exit
    }

    /// Client id trimmed to the exchange limit; blank ids are dropped
    pub fn normalized_client_id(&self) -> Option<String> {
        let id = self.client_id.as_deref()?.trim();
        if id.is_empty() {
            return None;
        }
        Some(truncate_client_id(id).to_string())
    }
}

/// Cut `id` to at most [`MAX_CLIENT_ID_LEN`] bytes on a char boundary.
pub fn truncate_client_id(id: &str) -> &str {
    let mut end = id.len().min(MAX_CLIENT_ID_LEN);
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    &id[..end]
}

/// Why an execution terminated without placing orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IgnoreReason {
    #[serde(rename = "no position to reduce")]
    NoPosition,
    #[serde(rename = "qty too small after step rounding")]
    QtyTooSmall,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::NoPosition => write!(f, "no position to reduce"),
            IgnoreReason::QtyTooSmall => write!(f, "qty too small after step rounding"),
        }
    }
}

/// Outcome of one execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Ignored {
        symbol: String,
        reason: IgnoreReason,
    },
    FilledLimit {
        symbol: String,
        side: Side,
        reduce_only: bool,
        qty: Decimal,
        price: Decimal,
        order: Order,
    },
    FilledMarketFallback {
        symbol: String,
        side: Side,
        reduce_only: bool,
        qty: Decimal,
        order: Order,
    },
}

impl ExecutionResult {
    pub fn order(&self) -> Option<&Order> {
        match self {
            ExecutionResult::Ignored { .. } => None,
            ExecutionResult::FilledLimit { order, .. }
            | ExecutionResult::FilledMarketFallback { order, .. } => Some(order),
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ExecutionResult::Ignored { .. })
    }
}
