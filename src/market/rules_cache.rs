use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::SymbolRules;
use crate::error::{LadderError, Result};
use crate::exchange::types::{ExchangeInfoResponse, SymbolFilter, EXCHANGE_INFO_PATH};
use crate::exchange::ExchangeTransport;

/// Per-symbol tick/step/min-qty rules, fetched once and kept for the process lifetime.
///
/// Concurrent first lookups for the same symbol may both hit the exchange;
/// the metadata read is idempotent so the race is tolerated.
pub struct SymbolRulesCache {
    transport: Arc<dyn ExchangeTransport>,
    rules: RwLock<HashMap<String, SymbolRules>>,
}

impl SymbolRulesCache {
    pub fn new(transport: Arc<dyn ExchangeTransport>) -> Self {
        Self {
            transport,
            rules: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_rules(&self, symbol: &str) -> Result<SymbolRules> {
        let symbol = symbol.to_uppercase();

        if let Some(rules) = self.rules.read().await.get(&symbol) {
            return Ok(*rules);
        }

        debug!(symbol = %symbol, "symbol rules cache miss");
        let value = self
            .transport
            .public_request(EXCHANGE_INFO_PATH, Vec::new())
            .await?;
        let info: ExchangeInfoResponse = serde_json::from_value(value)?;
        let rules = extract_rules(&info, &symbol)?;

        info!(
            symbol = %symbol,
            tick = %rules.tick_size,
            step = %rules.step_size,
            min_qty = %rules.min_qty,
            "loaded symbol rules"
        );

        self.rules.write().await.insert(symbol, rules);
        Ok(rules)
    }

    pub async fn cached_symbols(&self) -> Vec<String> {
        self.rules.read().await.keys().cloned().collect()
    }
}

fn extract_rules(info: &ExchangeInfoResponse, symbol: &str) -> Result<SymbolRules> {
    let entry = info
        .symbols
        .iter()
        .find(|s| s.symbol == symbol)
        .ok_or_else(|| LadderError::UnknownSymbol(symbol.to_string()))?;

    let mut tick_size = None;
    let mut lot = None;
    for filter in &entry.filters {
        match filter {
            SymbolFilter::Price { tick_size: tick } => tick_size = Some(*tick),
            SymbolFilter::LotSize { step_size, min_qty } => lot = Some((*step_size, *min_qty)),
            SymbolFilter::Other => {}
        }
    }

    let malformed = |filter: &'static str| LadderError::MalformedMetadata {
        symbol: symbol.to_string(),
        filter,
    };

    let tick_size = tick_size
        .filter(|t| t.is_sign_positive() && !t.is_zero())
        .ok_or_else(|| malformed("PRICE_FILTER.tickSize"))?;
    let (step_size, min_qty) = lot
        .filter(|(step, _)| step.is_sign_positive() && !step.is_zero())
        .ok_or_else(|| malformed("LOT_SIZE.stepSize"))?;

    Ok(SymbolRules {
        tick_size,
        step_size,
        min_qty,
    })
}
