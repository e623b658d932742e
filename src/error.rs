use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Exchange error code returned when the requested margin type is already active.
pub const CODE_NO_NEED_TO_CHANGE_MARGIN_TYPE: i64 = -4046;

/// Main error type for the execution engine
#[derive(Error, Debug)]
pub enum LadderError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    // Caller input errors
    #[error("Symbol {requested} is not allowed (allowed: {allowed})")]
    ForbiddenSymbol { requested: String, allowed: String },

    #[error("Invalid side '{0}': expected buy or sell")]
    InvalidSide(String),

    #[error("Entry orders require an explicit side (buy or sell)")]
    MissingSide,

    #[error("Quantity {qty} is below the minimum order quantity {min_qty}")]
    MinQty { qty: Decimal, min_qty: Decimal },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Exchange errors
    #[error("Exchange API error (status={status}, code={code:?}): {message}")]
    Exchange {
        status: u16,
        code: Option<i64>,
        message: String,
        body: serde_json::Value,
    },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Malformed exchange metadata for {symbol}: missing {filter}")]
    MalformedMetadata { symbol: String, filter: &'static str },

    #[error("Invalid exchange response: {0}")]
    InvalidResponse(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for LadderError
pub type Result<T> = std::result::Result<T, LadderError>;

/// Coarse classification surfaced to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InvalidInput,
    Exchange,
    Metadata,
    Transport,
}

impl LadderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LadderError::Configuration(_) | LadderError::ConfigSource(_) => {
                ErrorKind::Configuration
            }
            LadderError::ForbiddenSymbol { .. }
            | LadderError::InvalidSide(_)
            | LadderError::MissingSide
            | LadderError::MinQty { .. }
            | LadderError::InvalidRequest(_) => ErrorKind::InvalidInput,
            LadderError::Exchange { .. } => ErrorKind::Exchange,
            LadderError::UnknownSymbol(_)
            | LadderError::MalformedMetadata { .. }
            | LadderError::InvalidResponse(_) => ErrorKind::Metadata,
            LadderError::Http(_) | LadderError::Json(_) => ErrorKind::Transport,
        }
    }

    /// Exchange error code, if this is an exchange rejection that carried one.
    pub fn exchange_code(&self) -> Option<i64> {
        match self {
            LadderError::Exchange { code, .. } => *code,
            _ => None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            status: "error",
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Structured failure returned across the inbound boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub status: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorReport {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "kind": self.kind,
            "message": self.message,
        })
    }
}
