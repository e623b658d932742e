//! USDⓈ-M futures REST endpoints and the slices of their payloads we read.

use rust_decimal::Decimal;
use serde::Deserialize;

pub const EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";
pub const PREMIUM_INDEX_PATH: &str = "/fapi/v1/premiumIndex";
pub const POSITION_RISK_PATH: &str = "/fapi/v2/positionRisk";
pub const LEVERAGE_PATH: &str = "/fapi/v1/leverage";
pub const MARGIN_TYPE_PATH: &str = "/fapi/v1/marginType";
pub const ORDER_PATH: &str = "/fapi/v1/order";

/// Error body returned on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: Option<i64>,
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { tick_size: Decimal },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: Decimal, min_qty: Decimal },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndex {
    pub symbol: String,
    pub mark_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amt: Decimal,
    #[serde(default)]
    pub position_side: Option<String>,
}
