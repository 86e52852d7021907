//! 多因子共振信号
//!
//! An entry needs all four of: RSI beyond its adaptive threshold, price at a
//! support/resistance level, an engulfing pattern and momentum agreeing with the
//! trade direction.

use std::fmt;

use crate::app_config::{SessionSpreadLimits, StrategyParams};
use crate::time_util::TradingSession;
use crate::trading::indicator::atr::VolatilityRegime;
use crate::trading::indicator::IndicatorSnapshot;
use crate::trading::model::{PriceTick, TradeDirection, TradeIntent};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiThresholds {
    pub buy: f64,
    pub sell: f64,
}

impl RsiThresholds {
    /// Widened in high volatility, tightened in calm markets.
    pub fn adaptive(params: &StrategyParams, atr: f64, atr_median: f64) -> Self {
        let regime = VolatilityRegime::classify(
            atr,
            atr_median,
            params.high_volatility_ratio,
            params.low_volatility_ratio,
        );
        match regime {
            VolatilityRegime::High => Self {
                buy: params.buy_threshold - params.high_volatility_widen,
                sell: params.sell_threshold + params.high_volatility_widen,
            },
            VolatilityRegime::Low => Self {
                buy: params.buy_threshold + params.low_volatility_tighten,
                sell: params.sell_threshold - params.low_volatility_tighten,
            },
            VolatilityRegime::Normal => Self {
                buy: params.buy_threshold,
                sell: params.sell_threshold,
            },
        }
    }
}

/// Why a tick produced no intent
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientHistory { have: usize, need: usize },
    AtrUndefined,
    AtrBelowMinimum(f64),
    SpreadTooWide { spread: f64, limit: f64 },
    NoConfluence,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientHistory { have, need } => {
                write!(f, "history {}/{}", have, need)
            }
            SkipReason::AtrUndefined => write!(f, "atr undefined"),
            SkipReason::AtrBelowMinimum(atr) => write!(f, "atr {:.5} below minimum", atr),
            SkipReason::SpreadTooWide { spread, limit } => {
                write!(f, "spread {:.5} > limit {:.5}", spread, limit)
            }
            SkipReason::NoConfluence => write!(f, "no confluence"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Enter(TradeIntent),
    Skip(SkipReason),
}

impl Evaluation {
    pub fn intent(self) -> Option<TradeIntent> {
        match self {
            Evaluation::Enter(intent) => Some(intent),
            Evaluation::Skip(_) => None,
        }
    }
}

/// The four-way AND. Ties never signal because every comparison is strict.
pub fn confluence(snapshot: &IndicatorSnapshot, thresholds: RsiThresholds) -> Option<TradeDirection> {
    if snapshot.rsi < thresholds.buy
        && snapshot.support_resistance
        && snapshot.engulfing_up
        && snapshot.momentum_up
    {
        Some(TradeDirection::Buy)
    } else if snapshot.rsi > thresholds.sell
        && snapshot.support_resistance
        && snapshot.engulfing_down
        && snapshot.momentum_down
    {
        Some(TradeDirection::Sell)
    } else {
        None
    }
}

/// 信号评估器
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    params: StrategyParams,
    spread_limits: SessionSpreadLimits,
}

impl SignalEvaluator {
    pub fn new(params: StrategyParams, spread_limits: SessionSpreadLimits) -> Self {
        Self {
            params,
            spread_limits,
        }
    }

    /// Runs the entry gates in order: history length, ATR, spread, confluence.
    pub fn evaluate(
        &self,
        tick: &PriceTick,
        history_len: usize,
        snapshot: &IndicatorSnapshot,
    ) -> Evaluation {
        if history_len < self.params.min_history {
            return Evaluation::Skip(SkipReason::InsufficientHistory {
                have: history_len,
                need: self.params.min_history,
            });
        }

        let atr = match snapshot.atr {
            None => return Evaluation::Skip(SkipReason::AtrUndefined),
            Some(atr) if atr < self.params.min_atr => {
                return Evaluation::Skip(SkipReason::AtrBelowMinimum(atr))
            }
            Some(atr) => atr,
        };
        let thresholds =
            RsiThresholds::adaptive(&self.params, atr, snapshot.atr_median.unwrap_or(atr));

        let limit = TradingSession::at(tick.observed_at).spread_limit(&self.spread_limits);
        let spread = tick.spread();
        if spread > limit {
            return Evaluation::Skip(SkipReason::SpreadTooWide { spread, limit });
        }

        match confluence(snapshot, thresholds) {
            Some(direction) => Evaluation::Enter(TradeIntent {
                instrument: tick.instrument.clone(),
                direction,
                entry_price: tick.mid(),
                atr,
            }),
            None => Evaluation::Skip(SkipReason::NoConfluence),
        }
    }
}
