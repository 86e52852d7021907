use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 交易方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn is_long(&self) -> bool {
        matches!(self, TradeDirection::Buy)
    }

    /// +1.0 for longs, -1.0 for shorts
    pub fn sign(&self) -> f64 {
        match self {
            TradeDirection::Buy => 1.0,
            TradeDirection::Sell => -1.0,
        }
    }

    /// Units as the broker expects them: positive buys, negative sells.
    pub fn signed_units(&self, units: i64) -> i64 {
        match self {
            TradeDirection::Buy => units.abs(),
            TradeDirection::Sell => -units.abs(),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            TradeDirection::Buy => TradeDirection::Sell,
            TradeDirection::Sell => TradeDirection::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry decision handed from the signal evaluator to the risk sizer. Consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub instrument: String,
    pub direction: TradeDirection,
    pub entry_price: f64,
    pub atr: f64,
}

/// A filled, protected position under supervision.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTrade {
    pub trade_id: String,
    pub instrument: String,
    pub direction: TradeDirection,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// absolute units still open
    pub units: i64,
    pub opened_at: DateTime<Utc>,
    pub partial_closed: bool,
    pub last_trail_stop: Option<f64>,
    /// broker did not list the trade during the post-entry presence check
    pub provisional: bool,
}

impl ActiveTrade {
    /// Price distance moved in the trade's favour. Negative when under water.
    pub fn favourable_move(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.direction.sign()
    }

    /// Stop currently protecting the trade: last trailed value, else the initial SL.
    pub fn current_stop(&self) -> f64 {
        self.last_trail_stop.unwrap_or(self.stop_loss)
    }

    /// True when `candidate` would move the stop towards the market.
    pub fn is_tighter_stop(&self, candidate: f64) -> bool {
        match self.direction {
            TradeDirection::Buy => candidate > self.current_stop(),
            TradeDirection::Sell => candidate < self.current_stop(),
        }
    }
}

/// Result column of the trade log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeOutcome {
    Open,
    Win,
    Loss,
    Breakeven,
    FailSafe,
}

impl TradeOutcome {
    pub fn from_realized(profit: f64) -> Self {
        if profit > 0.0 {
            TradeOutcome::Win
        } else if profit < 0.0 {
            TradeOutcome::Loss
        } else {
            TradeOutcome::Breakeven
        }
    }
}

/// One row of the append-only trade log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogRecord {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub trade_id: Option<String>,
    pub side: Option<TradeDirection>,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub atr: Option<f64>,
    pub units: i64,
    pub realized_profit: f64,
    pub account_balance: Option<f64>,
    pub outcome: TradeOutcome,
}

impl TradeLogRecord {
    /// Entry row written once protection is attached
    pub fn opened(trade: &ActiveTrade, atr: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            instrument: trade.instrument.clone(),
            trade_id: Some(trade.trade_id.clone()),
            side: Some(trade.direction),
            entry_price: Some(trade.entry_price),
            stop_loss: Some(trade.stop_loss),
            take_profit: Some(trade.take_profit),
            atr: Some(atr),
            units: trade.units,
            realized_profit: 0.0,
            account_balance: None,
            outcome: TradeOutcome::Open,
        }
    }
}
