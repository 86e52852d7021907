//! 止盈止损与仓位计算
//!
//! Turns an entry price and ATR into protective distances, SL/TP prices and a
//! position size.

use crate::app_config::RiskParams;
use crate::trading::model::instrument::{pip_unit, round_price};
use crate::trading::model::TradeDirection;

/// Protective distances for one entry, in price units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskPlan {
    pub stop_distance: f64,
    pub take_profit_distance: f64,
    pub buffer: f64,
}

/// Absolute SL/TP prices, rounded to the instrument precision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectiveLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl RiskPlan {
    /// SL sits `stop + buffer` behind the entry, TP `take_profit_distance` ahead.
    pub fn levels(&self, instrument: &str, direction: TradeDirection, entry: f64) -> ProtectiveLevels {
        let sign = direction.sign();
        ProtectiveLevels {
            stop_loss: round_price(instrument, entry - sign * (self.stop_distance + self.buffer)),
            take_profit: round_price(instrument, entry + sign * self.take_profit_distance),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskSizer {
    params: RiskParams,
}

impl RiskSizer {
    pub fn new(params: RiskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn plan(&self, atr: f64) -> RiskPlan {
        let p = &self.params;
        let stop_distance = p.stop_floor.max(atr * p.atr_multiplier);
        RiskPlan {
            stop_distance,
            take_profit_distance: stop_distance * p.reward_risk_ratio,
            buffer: p.buffer_floor.max(stop_distance * p.buffer_multiple),
        }
    }

    /// Doubles the stop after a fill that did not move; re-floors it and uses the
    /// narrower post-widening buffer.
    pub fn widen(&self, plan: &RiskPlan) -> RiskPlan {
        let p = &self.params;
        let stop_distance = (plan.stop_distance * 2.0).max(p.stop_floor);
        RiskPlan {
            stop_distance,
            take_profit_distance: stop_distance * p.reward_risk_ratio,
            buffer: p.buffer_floor.max(stop_distance * p.widened_buffer_multiple),
        }
    }

    /// `balance * risk_fraction / (stop / pip)`, truncated, never below the minimum.
    pub fn units(&self, instrument: &str, balance: f64, stop_distance: f64) -> i64 {
        let p = &self.params;
        let pip_risk = stop_distance / pip_unit(instrument);
        let raw = if pip_risk > 0.0 && pip_risk.is_finite() {
            (balance * p.risk_fraction / pip_risk).trunc()
        } else {
            0.0
        };
        let units = if raw.is_finite() { raw as i64 } else { 0 };
        units.max(p.min_units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn sizer() -> RiskSizer {
        RiskSizer::new(RiskParams::default())
    }

    #[test]
    fn stop_is_floored() {
        let plan = sizer().plan(0.0001);
        assert!(approx_eq!(f64, plan.stop_distance, 0.0015, epsilon = 1e-12));
        assert!(approx_eq!(f64, plan.take_profit_distance, 0.0018, epsilon = 1e-12));
        assert!(approx_eq!(f64, plan.buffer, 0.00225, epsilon = 1e-12));
    }

    #[test]
    fn levels_for_both_directions() {
        let plan = sizer().plan(0.0008);
        let buy = plan.levels("EUR_USD", TradeDirection::Buy, 1.10500);
        // stop 0.002, buffer 0.003, tp 0.0024
        assert_eq!(buy.stop_loss, 1.10000);
        assert_eq!(buy.take_profit, 1.10740);
        let sell = plan.levels("EUR_USD", TradeDirection::Sell, 1.10500);
        assert_eq!(sell.stop_loss, 1.11000);
        assert_eq!(sell.take_profit, 1.10260);
    }

    #[test]
    fn widen_doubles_and_narrows_buffer() {
        let s = sizer();
        let widened = s.widen(&s.plan(0.0008));
        assert!(approx_eq!(f64, widened.stop_distance, 0.004, epsilon = 1e-12));
        assert!(approx_eq!(f64, widened.take_profit_distance, 0.0048, epsilon = 1e-12));
        assert!(approx_eq!(f64, widened.buffer, 0.0044, epsilon = 1e-12));
    }

    #[test]
    fn units_never_below_minimum() {
        let s = sizer();
        assert_eq!(s.units("EUR_USD", 1000.0, 0.0015), 133);
        assert_eq!(s.units("EUR_USD", 10.0, 0.0015), 100);
        assert_eq!(s.units("EUR_USD", 1000.0, 0.0), 100);
        assert_eq!(s.units("USD_JPY", 1000.0, 0.02), 100);
    }
}
