use reqwest::Method;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{truncate_client_id, MarginType, Order, OrderStatus, OrderType, Side};
use crate::error::{LadderError, Result, CODE_NO_NEED_TO_CHANGE_MARGIN_TYPE};
use crate::exchange::types::{
    PremiumIndex, LEVERAGE_PATH, MARGIN_TYPE_PATH, ORDER_PATH, PREMIUM_INDEX_PATH,
};
use crate::exchange::{params, ExchangeTransport, Params};

/// Order placement, query and cancellation, plus account setup.
///
/// With `dry_run` set, writes never reach the exchange: orders are simulated
/// as immediately filled and leverage/margin changes are skipped.
pub struct OrderGateway {
    transport: Arc<dyn ExchangeTransport>,
    dry_run: bool,
    next_sim_id: AtomicI64,
    simulated: Mutex<HashMap<i64, Order>>,
}

fn reduce_only_flag(reduce_only: bool) -> &'static str {
    if reduce_only {
        "true"
    } else {
        "false"
    }
}

impl OrderGateway {
    pub fn new(transport: Arc<dyn ExchangeTransport>, dry_run: bool) -> Self {
        Self {
            transport,
            dry_run,
            next_sim_id: AtomicI64::new(-1),
            simulated: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        price: Decimal,
        reduce_only: bool,
        client_id: Option<&str>,
    ) -> Result<Order> {
        let mut request = params(&[
            ("symbol", symbol),
            ("side", side.as_str()),
            ("type", "LIMIT"),
            ("timeInForce", "GTC"),
        ]);
        request.push(("quantity".to_string(), qty.to_string()));
        request.push(("price".to_string(), price.to_string()));
        request.push(("reduceOnly".to_string(), reduce_only_flag(reduce_only).to_string()));
        request.push(("newOrderRespType".to_string(), "RESULT".to_string()));

        self.submit(request, client_id, OrderType::Limit).await
    }

    pub async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        reduce_only: bool,
        client_id: Option<&str>,
    ) -> Result<Order> {
        let mut request = params(&[("symbol", symbol), ("side", side.as_str()), ("type", "MARKET")]);
        request.push(("quantity".to_string(), qty.to_string()));
        request.push(("reduceOnly".to_string(), reduce_only_flag(reduce_only).to_string()));
        request.push(("newOrderRespType".to_string(), "RESULT".to_string()));

        self.submit(request, client_id, OrderType::Market).await
    }

    async fn submit(
        &self,
        mut request: Params,
        client_id: Option<&str>,
        order_type: OrderType,
    ) -> Result<Order> {
        if let Some(id) = client_id.map(str::trim).filter(|id| !id.is_empty()) {
            request.push(("newClientOrderId".to_string(), truncate_client_id(id).to_string()));
        }

        if self.dry_run {
            return self.simulate(&request, order_type).await;
        }

        let value = self
            .transport
            .signed_request(Method::POST, ORDER_PATH, request)
            .await?;
        let order: Order = serde_json::from_value(value)?;

        info!(
            order_id = order.order_id,
            symbol = %order.symbol,
            side = %order.side,
            kind = ?order.order_type,
            qty = %order.quantity,
            price = %order.price,
            status = ?order.status,
            "order placed"
        );
        Ok(order)
    }

    async fn simulate(&self, request: &Params, order_type: OrderType) -> Result<Order> {
        let field = |key: &str| {
            request
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let decimal = |key: &str| -> Result<Decimal> {
            field(key)
                .unwrap_or_default()
                .parse()
                .map_err(|e| LadderError::InvalidRequest(format!("{}: {}", key, e)))
        };

        let side = match field("side").as_deref() {
            Some("SELL") => Side::Sell,
            _ => Side::Buy,
        };
        let quantity = decimal("quantity")?;
        let price = match order_type {
            OrderType::Limit => decimal("price")?,
            _ => Decimal::ZERO,
        };

        let order = Order {
            order_id: self.next_sim_id.fetch_sub(1, Ordering::Relaxed),
            symbol: field("symbol").unwrap_or_default(),
            side,
            order_type,
            status: OrderStatus::Filled,
            quantity,
            executed_qty: quantity,
            price,
            avg_price: price,
            reduce_only: field("reduceOnly").as_deref() == Some("true"),
            client_order_id: field("newClientOrderId"),
        };

        info!(
            order_id = order.order_id,
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.quantity,
            "dry run: simulated fill"
        );

        self.simulated
            .lock()
            .await
            .insert(order.order_id, order.clone());
        Ok(order)
    }

    pub async fn get_order(&self, symbol: &str, order_id: i64) -> Result<Order> {
        if let Some(order) = self.simulated.lock().await.get(&order_id) {
            return Ok(order.clone());
        }

        let value = self
            .transport
            .signed_request(
                Method::GET,
                ORDER_PATH,
                params(&[("symbol", symbol.to_string()), ("orderId", order_id.to_string())]),
            )
            .await?;
        let order: Order = serde_json::from_value(value)?;
        debug!(order_id, status = ?order.status, executed = %order.executed_qty, "order status");
        Ok(order)
    }

    /// Cancel a resting order. Fails if the order already filled or was cancelled.
    pub async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<Order> {
        if let Some(order) = self.simulated.lock().await.get(&order_id) {
            return Err(LadderError::InvalidRequest(format!(
                "simulated order {} is already {:?}",
                order_id, order.status
            )));
        }

        let value = self
            .transport
            .signed_request(
                Method::DELETE,
                ORDER_PATH,
                params(&[("symbol", symbol.to_string()), ("orderId", order_id.to_string())]),
            )
            .await?;
        let order: Order = serde_json::from_value(value)?;
        debug!(order_id, status = ?order.status, "order cancelled");
        Ok(order)
    }

    pub async fn get_mark_price(&self, symbol: &str) -> Result<Decimal> {
        let value = self
            .transport
            .public_request(PREMIUM_INDEX_PATH, params(&[("symbol", symbol)]))
            .await?;
        let index: PremiumIndex = serde_json::from_value(value)?;
        if index.mark_price <= Decimal::ZERO {
            return Err(LadderError::InvalidResponse(format!(
                "non-positive mark price {} for {}",
                index.mark_price, symbol
            )));
        }
        Ok(index.mark_price)
    }

    /// Align margin type and leverage for `symbol`.
    ///
    /// "No need to change margin type" counts as success; any other rejection aborts.
    pub async fn ensure_leverage_and_margin(
        &self,
        symbol: &str,
        leverage: u32,
        margin_type: MarginType,
    ) -> Result<()> {
        if self.dry_run {
            info!(symbol, leverage, margin = margin_type.as_str(), "dry run: skipping account setup");
            return Ok(());
        }

        match self
            .transport
            .signed_request(
                Method::POST,
                MARGIN_TYPE_PATH,
                params(&[("symbol", symbol), ("marginType", margin_type.as_str())]),
            )
            .await
        {
            Ok(_) => info!(symbol, margin = margin_type.as_str(), "margin type set"),
            Err(e) if e.exchange_code() == Some(CODE_NO_NEED_TO_CHANGE_MARGIN_TYPE) => {
                debug!(symbol, margin = margin_type.as_str(), "margin type already set");
            }
            Err(e) => return Err(e),
        }

        self.transport
            .signed_request(
                Method::POST,
                LEVERAGE_PATH,
                params(&[("symbol", symbol.to_string()), ("leverage", leverage.to_string())]),
            )
            .await?;
        debug!(symbol, leverage, "leverage set");

        Ok(())
    }
}
