use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::TradeDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionFill {
    Default,
    ReduceOnly,
}

/// Market order. `units` is signed: positive buys, negative sells.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOrderRequest {
    pub instrument: String,
    pub units: i64,
    pub position_fill: PositionFill,
}

impl MarketOrderRequest {
    /// Opening order for a fresh position
    pub fn open(instrument: &str, direction: TradeDirection, units: i64) -> Self {
        Self {
            instrument: instrument.to_string(),
            units: direction.signed_units(units),
            position_fill: PositionFill::Default,
        }
    }

    /// Opposite-side order flattening `units` of a position opened in `direction`.
    pub fn close(instrument: &str, direction: TradeDirection, units: i64) -> Self {
        Self {
            instrument: instrument.to_string(),
            units: direction.opposite().signed_units(units),
            position_fill: PositionFill::Default,
        }
    }

    /// Like [`MarketOrderRequest::close`] but can never open a new position.
    pub fn reduce(instrument: &str, direction: TradeDirection, units: i64) -> Self {
        Self {
            position_fill: PositionFill::ReduceOnly,
            ..Self::close(instrument, direction, units)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectiveOrderKind {
    TakeProfit,
    StopLoss,
}

/// SL or TP order attached to an open trade
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectiveOrderRequest {
    pub trade_id: String,
    pub instrument: String,
    pub kind: ProtectiveOrderKind,
    pub price: f64,
    pub replace_existing: bool,
}

impl ProtectiveOrderRequest {
    pub fn take_profit(trade_id: &str, instrument: &str, price: f64) -> Self {
        Self {
            trade_id: trade_id.to_string(),
            instrument: instrument.to_string(),
            kind: ProtectiveOrderKind::TakeProfit,
            price,
            replace_existing: false,
        }
    }

    pub fn stop_loss(trade_id: &str, instrument: &str, price: f64) -> Self {
        Self {
            trade_id: trade_id.to_string(),
            instrument: instrument.to_string(),
            kind: ProtectiveOrderKind::StopLoss,
            price,
            replace_existing: false,
        }
    }

    pub fn replacing(mut self) -> Self {
        self.replace_existing = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeClose {
    pub trade_id: String,
    pub realized_pl: f64,
}

/// ORDER_FILL transaction as reported by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub transaction_id: String,
    pub instrument: String,
    pub units: i64,
    pub price: f64,
    pub pl: f64,
    pub account_balance: f64,
    pub trade_opened: Option<String>,
    pub trades_closed: Vec<TradeClose>,
    /// partial close of a trade that stays open
    pub trade_reduced: Option<TradeClose>,
    pub time: Option<DateTime<Utc>>,
}

/// Broker answer to a market order submission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSubmission {
    pub last_transaction_id: Option<String>,
    pub fill: Option<OrderFill>,
}

/// Page of ORDER_FILL transactions with the cursor for the next request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FillPage {
    pub fills: Vec<OrderFill>,
    pub last_transaction_id: Option<String>,
}
