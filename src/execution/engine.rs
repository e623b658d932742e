use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use super::OrderGateway;
use crate::config::AppConfig;
use crate::domain::{
    ExecutionResult, IgnoreReason, LadderState, MarginType, Order, Side, SymbolRules,
    TradeRequest, TradeSide,
};
use crate::error::{LadderError, Result};
use crate::exchange::ExchangeTransport;
use crate::market::{PositionOracle, SymbolRulesCache};

/// Engine parameters, normally taken from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub allowed_symbol: String,
    pub default_notional: Decimal,
    pub leverage: u32,
    pub margin_type: MarginType,
    pub tick_offsets: Vec<u32>,
    pub wait_per_attempt: Duration,
    pub poll_interval: Option<Duration>,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            allowed_symbol: config.trading.allowed_symbol.to_uppercase(),
            default_notional: config.trading.default_notional,
            leverage: config.trading.leverage,
            margin_type: config.trading.margin_type,
            tick_offsets: config.ladder.tick_offsets.clone(),
            wait_per_attempt: config.ladder.wait_per_attempt(),
            poll_interval: config.ladder.poll_interval(),
        }
    }
}

/// Side and size settled during resolution; fixed for every attempt that follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub reference_price: Decimal,
    pub reduce_only: bool,
    pub client_id: Option<String>,
}

enum Resolution {
    Ready(ResolvedOrder),
    Ignored(IgnoreReason),
}

/// Turns one trade request into a limit-ladder / market-fallback execution.
///
/// Callers serialize executions per symbol; overlapping runs would race on
/// position and order state.
pub struct ExecutionEngine {
    settings: EngineSettings,
    rules: SymbolRulesCache,
    positions: PositionOracle,
    gateway: OrderGateway,
}

impl ExecutionEngine {
    pub fn new(transport: Arc<dyn ExchangeTransport>, settings: EngineSettings, dry_run: bool) -> Self {
        Self {
            rules: SymbolRulesCache::new(transport.clone()),
            positions: PositionOracle::new(transport.clone()),
            gateway: OrderGateway::new(transport, dry_run),
            settings,
        }
    }

    pub fn from_config(transport: Arc<dyn ExchangeTransport>, config: &AppConfig) -> Self {
        Self::new(
            transport,
            EngineSettings::from_config(config),
            !config.trading.enabled,
        )
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn rules(&self) -> &SymbolRulesCache {
        &self.rules
    }

    pub fn positions(&self) -> &PositionOracle {
        &self.positions
    }

    pub fn gateway(&self) -> &OrderGateway {
        &self.gateway
    }

    #[instrument(skip_all, fields(symbol = ?request.symbol, intent = ?request.intent))]
    pub async fn execute_trade(&self, request: &TradeRequest) -> Result<ExecutionResult> {
        let mut state = LadderState::Resolving;

        let resolved = match self.resolve(request).await? {
            Resolution::Ready(resolved) => resolved,
            Resolution::Ignored(reason) => {
                advance(&mut state, LadderState::Done);
                info!(%reason, "nothing to execute");
                return Ok(ExecutionResult::Ignored {
                    symbol: self.settings.allowed_symbol.clone(),
                    reason,
                });
            }
        };

        info!(
            side = %resolved.side,
            qty = %resolved.qty,
            reference = %resolved.reference_price,
            reduce_only = resolved.reduce_only,
            "resolved execution"
        );

        let rules = self.rules.get_rules(&resolved.symbol).await?;

        for &ticks in &self.settings.tick_offsets {
            advance(&mut state, LadderState::LadderAttempt(ticks));
            if let Some(result) = self.attempt(&resolved, &rules, ticks).await? {
                advance(&mut state, LadderState::Done);
                return Ok(result);
            }
        }

        advance(&mut state, LadderState::MarketFallback);
        let order = self
            .gateway
            .place_market_order(
                &resolved.symbol,
                resolved.side,
                resolved.qty,
                resolved.reduce_only,
                resolved.client_id.as_deref(),
            )
            .await?;
        advance(&mut state, LadderState::Done);

        info!(order_id = order.order_id, status = ?order.status, "market fallback placed");
        Ok(ExecutionResult::FilledMarketFallback {
            symbol: resolved.symbol,
            side: resolved.side,
            reduce_only: resolved.reduce_only,
            qty: resolved.qty,
            order,
        })
    }

    /// Validate the request and settle side, quantity and reference price.
    pub async fn resolve_order(&self, request: &TradeRequest) -> Result<Option<ResolvedOrder>> {
        match self.resolve(request).await? {
            Resolution::Ready(resolved) => Ok(Some(resolved)),
            Resolution::Ignored(_) => Ok(None),
        }
    }

    async fn resolve(&self, request: &TradeRequest) -> Result<Resolution> {
        let allowed = &self.settings.allowed_symbol;
        let symbol = request
            .symbol
            .as_deref()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| allowed.clone());
        if &symbol != allowed {
            return Err(LadderError::ForbiddenSymbol {
                requested: symbol,
                allowed: allowed.clone(),
            });
        }

        let reduce_only = request.is_reduce_only();
        let requested_side = TradeSide::parse(request.side.as_deref())?;

        // Runs for exits too: margin mode and leverage shape how the close executes.
        self.gateway
            .ensure_leverage_and_margin(&symbol, self.settings.leverage, self.settings.margin_type)
            .await?;

        let rules = self.rules.get_rules(&symbol).await?;

        let reference_price = match request.price_ref {
            Some(price) => price,
            None => self.gateway.get_mark_price(&symbol).await?,
        };
        if reference_price <= Decimal::ZERO {
            return Err(LadderError::InvalidRequest(format!(
                "reference price must be positive, got {}",
                reference_price
            )));
        }

        let (side, qty) = if reduce_only {
            let position = self.positions.get_position(&symbol).await?;
            let Some(side) = position.closing_side() else {
                return Ok(Resolution::Ignored(IgnoreReason::NoPosition));
            };
            let qty = rules.floor_qty(position.amount.abs())?;
            if qty <= Decimal::ZERO || qty < rules.min_qty {
                return Ok(Resolution::Ignored(IgnoreReason::QtyTooSmall));
            }
            if requested_side != TradeSide::Unspecified
                && requested_side.as_order_side() != Some(side)
            {
                debug!(requested = ?requested_side, effective = %side, "exit side follows position");
            }
            (side, qty)
        } else {
            let raw_qty = match request.quantity {
                Some(qty) => qty,
                None => self
                    .settings
                    .default_notional
                    .checked_div(reference_price)
                    .ok_or_else(|| {
                        LadderError::InvalidRequest(format!(
                            "notional {} / reference price {} is out of range",
                            self.settings.default_notional, reference_price
                        ))
                    })?,
            };
            let qty = rules.floor_qty(raw_qty)?;
            if qty < rules.min_qty || qty <= Decimal::ZERO {
                return Err(LadderError::MinQty {
                    qty,
                    min_qty: rules.min_qty,
                });
            }
            let side = requested_side.as_order_side().ok_or(LadderError::MissingSide)?;
            (side, qty)
        };

        Ok(Resolution::Ready(ResolvedOrder {
            symbol,
            side,
            qty,
            reference_price,
            reduce_only,
            client_id: request.normalized_client_id(),
        }))
    }

    /// One ladder step. `Some` means the limit order filled and execution is done.
    async fn attempt(
        &self,
        resolved: &ResolvedOrder,
        rules: &SymbolRules,
        ticks: u32,
    ) -> Result<Option<ExecutionResult>> {
        let price = rules.ladder_price(resolved.reference_price, resolved.side, ticks)?;

        let placed = self
            .gateway
            .place_limit_order(
                &resolved.symbol,
                resolved.side,
                resolved.qty,
                price,
                resolved.reduce_only,
                resolved.client_id.as_deref(),
            )
            .await?;
        let order_id = placed.order_id;

        let latest = self.await_fill(&resolved.symbol, order_id).await?;
        if latest.is_filled() {
            info!(ticks, %price, order_id, "limit order filled");
            return Ok(Some(filled_limit(resolved, price, latest)));
        }

        match self.gateway.cancel_order(&resolved.symbol, order_id).await {
            Ok(cancelled) if cancelled.is_filled() => {
                info!(ticks, %price, order_id, "limit order filled during cancel");
                return Ok(Some(filled_limit(resolved, price, cancelled)));
            }
            Ok(cancelled) => {
                debug!(
                    ticks,
                    order_id,
                    executed = %cancelled.executed_qty,
                    "limit attempt cancelled"
                );
            }
            Err(e) => {
                warn!(ticks, order_id, error = %e, "cancel failed, re-checking order");
                // A failed cancel usually means the order filled in the meantime.
                match self.gateway.get_order(&resolved.symbol, order_id).await {
                    Ok(order) if order.is_filled() => {
                        info!(ticks, %price, order_id, "limit order filled before cancel");
                        return Ok(Some(filled_limit(resolved, price, order)));
                    }
                    Ok(order) => {
                        debug!(order_id, status = ?order.status, "order not filled after failed cancel");
                    }
                    Err(e) => {
                        warn!(order_id, error = %e, "re-check after failed cancel failed");
                    }
                }
            }
        }

        Ok(None)
    }

    /// Wait out one attempt and return the latest order snapshot.
    ///
    /// Without a poll interval this is a single sleep followed by one status
    /// query; with one, status is polled until filled or the wait is used up.
    async fn await_fill(&self, symbol: &str, order_id: i64) -> Result<Order> {
        let wait = self.settings.wait_per_attempt;

        let Some(interval) = self.settings.poll_interval.filter(|i| !i.is_zero()) else {
            sleep(wait).await;
            return self.gateway.get_order(symbol, order_id).await;
        };

        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(interval.min(remaining)).await;

            let order = self.gateway.get_order(symbol, order_id).await?;
            if order.is_filled() || order.status.is_terminal() || Instant::now() >= deadline {
                return Ok(order);
            }
        }
    }
}

fn filled_limit(resolved: &ResolvedOrder, price: Decimal, order: Order) -> ExecutionResult {
    ExecutionResult::FilledLimit {
        symbol: resolved.symbol.clone(),
        side: resolved.side,
        reduce_only: resolved.reduce_only,
        qty: resolved.qty,
        price,
        order,
    }
}

fn advance(state: &mut LadderState, next: LadderState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid ladder transition {} -> {}",
        state,
        next
    );
    debug!(from = %state, to = %next, "ladder state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::types::{
        EXCHANGE_INFO_PATH, LEVERAGE_PATH, MARGIN_TYPE_PATH, ORDER_PATH, POSITION_RISK_PATH,
        PREMIUM_INDEX_PATH,
    };
    use crate::testing::{Reply, ScriptedExchange};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    fn settings() -> EngineSettings {
        EngineSettings {
            allowed_symbol: "ETHUSDT".to_string(),
            default_notional: dec!(20),
            leverage: 3,
            margin_type: MarginType::Isolated,
            tick_offsets: vec![1, 2, 3],
            wait_per_attempt: Duration::ZERO,
            poll_interval: None,
        }
    }

    fn order(id: i64, status: &str, kind: &str, side: &str) -> Value {
        json!({
            "orderId": id,
            "symbol": "ETHUSDT",
            "status": status,
            "price": "0",
            "origQty": "0.050",
            "executedQty": "0",
            "type": kind,
            "side": side,
            "reduceOnly": false
        })
    }

    /// Exchange with rules, mark price 2000.00 and account setup scripted.
    fn exchange() -> Arc<ScriptedExchange> {
        let exchange = Arc::new(ScriptedExchange::new());
        exchange.respond(
            "GET",
            EXCHANGE_INFO_PATH,
            json!({"symbols": [{
                "symbol": "ETHUSDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                    {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001"}
                ]
            }]}),
        );
        exchange.respond(
            "GET",
            PREMIUM_INDEX_PATH,
            json!({"symbol": "ETHUSDT", "markPrice": "2000.00"}),
        );
        exchange.fail("POST", MARGIN_TYPE_PATH, 400, -4046, "No need to change margin type.");
        exchange.respond("POST", LEVERAGE_PATH, json!({"leverage": 3}));
        exchange
    }

    fn position(exchange: &ScriptedExchange, amount: &str) {
        exchange.respond(
            "GET",
            POSITION_RISK_PATH,
            json!([{"symbol": "ETHUSDT", "positionAmt": amount, "positionSide": "BOTH"}]),
        );
    }

    fn engine(exchange: &Arc<ScriptedExchange>) -> ExecutionEngine {
        ExecutionEngine::new(exchange.clone(), settings(), false)
    }

    fn limit_prices(exchange: &ScriptedExchange) -> Vec<String> {
        exchange
            .calls_to("POST", ORDER_PATH)
            .iter()
            .filter(|c| c.param("type") == Some("LIMIT"))
            .map(|c| c.param("price").unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_entry_falls_back_to_market_when_ladder_never_fills() {
        let exchange = exchange();
        for id in 1..=3 {
            exchange.push("POST", ORDER_PATH, Reply::Ok(order(id, "NEW", "LIMIT", "BUY")));
        }
        exchange.push("POST", ORDER_PATH, Reply::Ok(order(4, "FILLED", "MARKET", "BUY")));
        exchange.respond("GET", ORDER_PATH, order(0, "NEW", "LIMIT", "BUY"));
        exchange.respond("DELETE", ORDER_PATH, order(0, "CANCELED", "LIMIT", "BUY"));

        let request = TradeRequest::from_json(
            r#"{"symbol":"ETHUSDT","side":"buy","quantity":"0.05"}"#,
        )
        .unwrap();
        let result = engine(&exchange).execute_trade(&request).await.unwrap();

        assert_eq!(limit_prices(&exchange), vec!["2000.01", "2000.02", "2000.03"]);
        match &result {
            ExecutionResult::FilledMarketFallback {
                side, qty, order, ..
            } => {
                assert_eq!(*side, Side::Buy);
                assert_eq!(qty.to_string(), "0.050");
                assert_eq!(order.order_id, 4);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // One market order, same size as every limit attempt
        let placements = exchange.calls_to("POST", ORDER_PATH);
        assert_eq!(placements.len(), 4);
        assert!(placements.iter().all(|c| c.param("quantity") == Some("0.050")));
        assert_eq!(
            placements.iter().filter(|c| c.param("type") == Some("MARKET")).count(),
            1
        );
        assert_eq!(exchange.calls_to("DELETE", ORDER_PATH).len(), 3);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "filled_market_fallback");
        assert_eq!(json["qty"], "0.050");
    }

    #[tokio::test]
    async fn test_ladder_stops_at_first_fill() {
        let exchange = exchange();
        exchange.push("POST", ORDER_PATH, Reply::Ok(order(1, "NEW", "LIMIT", "SELL")));
        exchange.push("POST", ORDER_PATH, Reply::Ok(order(2, "NEW", "LIMIT", "SELL")));
        exchange.push("GET", ORDER_PATH, Reply::Ok(order(1, "NEW", "LIMIT", "SELL")));
        exchange.push("GET", ORDER_PATH, Reply::Ok(order(2, "FILLED", "LIMIT", "SELL")));
        exchange.respond("DELETE", ORDER_PATH, order(1, "CANCELED", "LIMIT", "SELL"));

        let request = TradeRequest::entry("ETHUSDT", Side::Sell, Some(dec!(0.05)));
        let result = engine(&exchange).execute_trade(&request).await.unwrap();

        assert_eq!(limit_prices(&exchange), vec!["1999.99", "1999.98"]);
        match result {
            ExecutionResult::FilledLimit { price, order, side, .. } => {
                assert_eq!(price, dec!(1999.98));
                assert_eq!(order.order_id, 2);
                assert_eq!(side, Side::Sell);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(exchange.calls_to("POST", ORDER_PATH).len(), 2);
        assert_eq!(exchange.calls_to("DELETE", ORDER_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_exit_short_position_buys_back() {
        let exchange = exchange();
        position(&exchange, "-0.2");
        exchange.respond("POST", ORDER_PATH, order(9, "NEW", "LIMIT", "BUY"));
        exchange.respond("GET", ORDER_PATH, order(9, "FILLED", "LIMIT", "BUY"));

        // Caller side is ignored for exits
        let request = TradeRequest::from_json(
            r#"{"symbol":"ETHUSDT","intent":"exit","side":"sell","price_ref":"2000"}"#,
        )
        .unwrap();
        let result = engine(&exchange).execute_trade(&request).await.unwrap();

        match result {
            ExecutionResult::FilledLimit {
                side,
                qty,
                reduce_only,
                ..
            } => {
                assert_eq!(side, Side::Buy);
                assert_eq!(qty.to_string(), "0.200");
                assert!(reduce_only);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let placed = &exchange.calls_to("POST", ORDER_PATH)[0];
        assert_eq!(placed.param("side"), Some("BUY"));
        assert_eq!(placed.param("reduceOnly"), Some("true"));
        // price_ref supplied, so no mark price lookup
        assert_eq!(exchange.call_count(PREMIUM_INDEX_PATH), 0);
    }

    #[tokio::test]
    async fn test_exit_with_flat_position_is_ignored() {
        let exchange = exchange();
        position(&exchange, "0.000");

        let result = engine(&exchange)
            .execute_trade(&TradeRequest::exit("ETHUSDT"))
            .await
            .unwrap();

        assert_eq!(
            result,
            ExecutionResult::Ignored {
                symbol: "ETHUSDT".into(),
                reason: IgnoreReason::NoPosition,
            }
        );
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
        // Account setup still ran
        assert_eq!(exchange.call_count(LEVERAGE_PATH), 1);
    }

    #[tokio::test]
    async fn test_exit_dust_position_is_ignored() {
        let exchange = exchange();
        position(&exchange, "0.0004");

        let result = engine(&exchange)
            .execute_trade(&TradeRequest::exit("ETHUSDT"))
            .await
            .unwrap();

        assert!(matches!(
            result,
            ExecutionResult::Ignored {
                reason: IgnoreReason::QtyTooSmall,
                ..
            }
        ));
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
    }

    #[tokio::test]
    async fn test_exit_below_min_qty_is_ignored() {
        let exchange = exchange();
        exchange.respond(
            "GET",
            EXCHANGE_INFO_PATH,
            json!({"symbols": [{
                "symbol": "ETHUSDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                    {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.01"}
                ]
            }]}),
        );
        position(&exchange, "-0.004");

        let result = engine(&exchange)
            .execute_trade(&TradeRequest::exit("ETHUSDT"))
            .await
            .unwrap();

        assert!(matches!(
            result,
            ExecutionResult::Ignored {
                reason: IgnoreReason::QtyTooSmall,
                ..
            }
        ));
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
    }

    #[tokio::test]
    async fn test_exit_qty_never_exceeds_position() {
        for amount in ["0.12345", "-3.0009", "1", "-0.001"] {
            let exchange = exchange();
            position(&exchange, amount);

            let resolved = engine(&exchange)
                .resolve_order(&TradeRequest::exit("ETHUSDT"))
                .await
                .unwrap()
                .unwrap();
            let position: Decimal = amount.parse().unwrap();
            assert!(resolved.qty <= position.abs(), "amount={amount}");
            assert!(resolved.qty > Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn test_reduce_only_flag_resolves_from_position() {
        let exchange = exchange();
        position(&exchange, "0.5");

        let request = TradeRequest::from_json(r#"{"reduce_only":true}"#).unwrap();
        let resolved = engine(&exchange).resolve_order(&request).await.unwrap().unwrap();
        assert_eq!(resolved.side, Side::Sell);
        assert_eq!(resolved.qty, dec!(0.5));
        assert!(resolved.reduce_only);
    }

    #[tokio::test]
    async fn test_entry_below_min_qty_fails() {
        let exchange = exchange();

        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.0009)));
        let err = engine(&exchange).execute_trade(&request).await.unwrap_err();

        assert!(matches!(err, LadderError::MinQty { .. }));
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
    }

    #[tokio::test]
    async fn test_entry_quantity_from_notional() {
        let exchange = exchange();

        let request = TradeRequest::from_json(r#"{"side":"buy"}"#).unwrap();
        let resolved = engine(&exchange).resolve_order(&request).await.unwrap().unwrap();

        // 20 / 2000.00 = 0.01
        assert_eq!(resolved.qty, dec!(0.010));
        assert_eq!(resolved.reference_price, dec!(2000.00));
        assert_eq!(resolved.symbol, "ETHUSDT");
    }

    #[tokio::test]
    async fn test_tiny_reference_price_is_rejected_not_panicking() {
        let exchange = exchange();

        let request = TradeRequest::from_json(
            r#"{"side":"buy","price_ref":"0.0000000000000000000000000001"}"#,
        )
        .unwrap();
        let err = engine(&exchange).execute_trade(&request).await.unwrap_err();

        assert!(matches!(err, LadderError::InvalidRequest(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
    }

    #[tokio::test]
    async fn test_huge_quantity_is_rejected_not_panicking() {
        let exchange = exchange();

        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(Decimal::MAX))
            .with_price_ref(dec!(2000));
        let err = engine(&exchange).execute_trade(&request).await.unwrap_err();

        assert!(matches!(err, LadderError::InvalidRequest(_)));
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
    }

    #[tokio::test]
    async fn test_entry_without_side_fails() {
        let exchange = exchange();

        let request = TradeRequest::from_json(r#"{"quantity":"0.05"}"#).unwrap();
        let err = engine(&exchange).execute_trade(&request).await.unwrap_err();
        assert!(matches!(err, LadderError::MissingSide));
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
    }

    #[tokio::test]
    async fn test_forbidden_symbol_makes_no_calls() {
        let exchange = exchange();

        let request = TradeRequest::entry("BTCUSDT", Side::Buy, Some(dec!(0.01)));
        let err = engine(&exchange).execute_trade(&request).await.unwrap_err();

        assert!(matches!(err, LadderError::ForbiddenSymbol { .. }));
        assert!(exchange.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_side_makes_no_calls() {
        let exchange = exchange();

        let request = TradeRequest::from_json(r#"{"side":"long","quantity":"1"}"#).unwrap();
        let err = engine(&exchange).execute_trade(&request).await.unwrap_err();

        assert!(matches!(err, LadderError::InvalidSide(_)));
        assert!(exchange.calls().is_empty());
    }

    #[tokio::test]
    async fn test_setup_failure_aborts_before_orders() {
        let exchange = exchange();
        exchange.fail("POST", LEVERAGE_PATH, 400, -4028, "Leverage is not valid");

        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.05)));
        let err = engine(&exchange).execute_trade(&request).await.unwrap_err();

        assert_eq!(err.exchange_code(), Some(-4028));
        assert_eq!(exchange.call_count(EXCHANGE_INFO_PATH), 0);
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
    }

    #[tokio::test]
    async fn test_failed_cancel_rechecks_fill() {
        let exchange = exchange();
        exchange.respond("POST", ORDER_PATH, order(5, "NEW", "LIMIT", "BUY"));
        exchange.push("GET", ORDER_PATH, Reply::Ok(order(5, "NEW", "LIMIT", "BUY")));
        exchange.push("GET", ORDER_PATH, Reply::Ok(order(5, "FILLED", "LIMIT", "BUY")));
        exchange.fail("DELETE", ORDER_PATH, 400, -2011, "Unknown order sent.");

        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.05)));
        let result = engine(&exchange).execute_trade(&request).await.unwrap();

        assert!(matches!(result, ExecutionResult::FilledLimit { .. }));
        // No second limit order and no market fallback
        assert_eq!(exchange.calls_to("POST", ORDER_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_cancel_on_unfilled_order_continues_ladder() {
        let exchange = exchange();
        for id in 1..=3 {
            exchange.push("POST", ORDER_PATH, Reply::Ok(order(id, "NEW", "LIMIT", "BUY")));
        }
        exchange.push("POST", ORDER_PATH, Reply::Ok(order(4, "FILLED", "MARKET", "BUY")));
        exchange.respond("GET", ORDER_PATH, order(0, "EXPIRED", "LIMIT", "BUY"));
        exchange.fail("DELETE", ORDER_PATH, 400, -2011, "Unknown order sent.");

        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.05)));
        let result = engine(&exchange).execute_trade(&request).await.unwrap();

        assert!(matches!(result, ExecutionResult::FilledMarketFallback { .. }));
    }

    #[tokio::test]
    async fn test_placement_error_aborts_ladder() {
        let exchange = exchange();
        exchange.fail("POST", ORDER_PATH, 400, -2019, "Margin is insufficient.");

        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.05)));
        let err = engine(&exchange).execute_trade(&request).await.unwrap_err();

        assert_eq!(err.exchange_code(), Some(-2019));
        assert_eq!(exchange.calls_to("POST", ORDER_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_client_id_forwarded_to_every_order() {
        let exchange = exchange();
        exchange.respond("POST", ORDER_PATH, order(1, "NEW", "LIMIT", "BUY"));
        exchange.respond("GET", ORDER_PATH, order(1, "NEW", "LIMIT", "BUY"));
        exchange.respond("DELETE", ORDER_PATH, order(1, "CANCELED", "LIMIT", "BUY"));

        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.05)))
            .with_client_id("tv-signal-0001");
        engine(&exchange).execute_trade(&request).await.unwrap();

        let placements = exchange.calls_to("POST", ORDER_PATH);
        assert_eq!(placements.len(), 4);
        assert!(placements
            .iter()
            .all(|c| c.param("newClientOrderId") == Some("tv-signal-0001")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_early_on_fill() {
        let exchange = exchange();
        exchange.respond("POST", ORDER_PATH, order(1, "NEW", "LIMIT", "BUY"));
        exchange.push("GET", ORDER_PATH, Reply::Ok(order(1, "NEW", "LIMIT", "BUY")));
        exchange.push("GET", ORDER_PATH, Reply::Ok(order(1, "FILLED", "LIMIT", "BUY")));

        let mut settings = settings();
        settings.wait_per_attempt = Duration::from_secs(2);
        settings.poll_interval = Some(Duration::from_millis(500));
        let engine = ExecutionEngine::new(exchange.clone(), settings, false);

        let started = Instant::now();
        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.05)));
        let result = engine.execute_trade(&request).await.unwrap();

        assert!(matches!(result, ExecutionResult::FilledLimit { .. }));
        assert_eq!(exchange.calls_to("GET", ORDER_PATH).len(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_bounded_by_wait() {
        let exchange = exchange();
        exchange.push("POST", ORDER_PATH, Reply::Ok(order(1, "NEW", "LIMIT", "BUY")));
        exchange.push("POST", ORDER_PATH, Reply::Ok(order(2, "FILLED", "MARKET", "BUY")));
        exchange.respond("GET", ORDER_PATH, order(1, "PARTIALLY_FILLED", "LIMIT", "BUY"));
        exchange.respond("DELETE", ORDER_PATH, order(1, "CANCELED", "LIMIT", "BUY"));

        let mut settings = settings();
        settings.tick_offsets = vec![1];
        settings.wait_per_attempt = Duration::from_millis(1000);
        settings.poll_interval = Some(Duration::from_millis(300));
        let engine = ExecutionEngine::new(exchange.clone(), settings, false);

        let started = Instant::now();
        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.05)));
        let result = engine.execute_trade(&request).await.unwrap();

        assert!(matches!(result, ExecutionResult::FilledMarketFallback { .. }));
        // 300 + 300 + 300 + 100
        assert_eq!(exchange.calls_to("GET", ORDER_PATH).len(), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_dry_run_fills_first_rung_without_writes() {
        let exchange = exchange();
        let engine = ExecutionEngine::new(exchange.clone(), settings(), true);

        let request = TradeRequest::entry("ETHUSDT", Side::Buy, Some(dec!(0.05)));
        let result = engine.execute_trade(&request).await.unwrap();

        match result {
            ExecutionResult::FilledLimit { price, order, .. } => {
                assert_eq!(price, dec!(2000.01));
                assert!(order.order_id < 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(exchange.call_count(ORDER_PATH), 0);
        assert_eq!(exchange.call_count(LEVERAGE_PATH), 0);
        assert_eq!(exchange.call_count(MARGIN_TYPE_PATH), 0);
    }
}
