use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::trading::model::{
    FillPage, MarketOrderRequest, OrderFill, OrderSubmission, ProtectiveOrderRequest, Quote,
    TradeDirection,
};

/// Broker trading API: the only path to orders, trades and account state.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    async fn place_market_order(&self, order: &MarketOrderRequest) -> EngineResult<OrderSubmission>;

    /// ORDER_FILL transaction by id, `None` when the transaction is not a fill.
    async fn transaction(&self, transaction_id: &str) -> EngineResult<Option<OrderFill>>;

    async fn place_protective_order(&self, order: &ProtectiveOrderRequest) -> EngineResult<()>;

    async fn open_trade_ids(&self) -> EngineResult<HashSet<String>>;

    /// Fills after `since`. Without a cursor, returns no fills and the current
    /// last transaction id.
    async fn fills_since(&self, since: Option<&str>) -> EngineResult<FillPage>;

    async fn pricing(&self, instrument: &str) -> EngineResult<Quote>;

    async fn account_balance(&self) -> EngineResult<f64>;

    /// Flattens `units` of a position opened in `direction`.
    async fn close_position(
        &self,
        instrument: &str,
        direction: TradeDirection,
        units: i64,
        reduce_only: bool,
    ) -> EngineResult<OrderSubmission> {
        let order = if reduce_only {
            MarketOrderRequest::reduce(instrument, direction, units)
        } else {
            MarketOrderRequest::close(instrument, direction, units)
        };
        self.place_market_order(&order).await
    }
}
