use crate::app_config::StrategyParams;

use super::atr::{atr, atr_median};
use super::engulfing::{is_bearish_engulfing, is_bullish_engulfing};
use super::momentum::momentum;
use super::rsi_indicator::rsi;
use super::support_resistance::is_near_support_resistance;

/// Every indicator value for one tick. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    /// `None` until the history covers one ATR period
    pub atr: Option<f64>,
    pub atr_median: Option<f64>,
    pub momentum_up: bool,
    pub momentum_down: bool,
    pub support_resistance: bool,
    pub engulfing_up: bool,
    pub engulfing_down: bool,
}

/// 指标引擎: derives an [`IndicatorSnapshot`] from a price history.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: StrategyParams,
}

impl IndicatorEngine {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// `prices` is oldest-first and ends with the current mid.
    pub fn snapshot(&self, prices: &[f64], current_mid: f64) -> IndicatorSnapshot {
        let p = &self.params;
        let atr_value = atr(prices, p.atr_period);
        let trend = momentum(prices, p.momentum_short, p.momentum_long);

        IndicatorSnapshot {
            rsi: rsi(prices, p.rsi_period),
            atr: atr_value,
            atr_median: atr_value.map(|a| atr_median(prices, p.atr_median_window, a)),
            momentum_up: trend.is_up(),
            momentum_down: trend.is_down(),
            support_resistance: is_near_support_resistance(
                prices,
                current_mid,
                p.sr_lookback,
                p.sr_threshold,
            ),
            engulfing_up: is_bullish_engulfing(prices),
            engulfing_down: is_bearish_engulfing(prices),
        }
    }
}
