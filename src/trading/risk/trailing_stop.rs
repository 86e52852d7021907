//! 移动止损
//!
//! One supervisory task per protected trade. Each poll reads the exit-side price
//! and, by profit in pips:
//! - at `full_close_pips` closes whatever is left and ends the task
//! - at `partial_close_pips`, once, closes half (reduce-only), fixes the TP and
//!   moves the SL just past entry
//! - at `trail_trigger_pips` trails the SL `trail_gap_pips` behind price
//!
//! The stop only ever moves towards the market.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app_config::TrailingParams;
use crate::error::EngineResult;
use crate::trading::model::instrument::{pip_unit, round_price};
use crate::trading::model::{ActiveTrade, ProtectiveOrderRequest};
use crate::trading::oanda::BrokerApi;
use crate::trading::risk::trade_registry::TradeRegistry;
use crate::trading::services::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailStep {
    Continue,
    /// remaining units closed at the broker
    Closed,
    /// trade no longer registered
    Gone,
}

pub struct TrailingStopManager {
    broker: Arc<dyn BrokerApi>,
    registry: TradeRegistry,
    notifier: Arc<dyn Notifier>,
    params: TrailingParams,
}

impl TrailingStopManager {
    pub fn new(
        broker: Arc<dyn BrokerApi>,
        registry: TradeRegistry,
        notifier: Arc<dyn Notifier>,
        params: TrailingParams,
    ) -> Self {
        Self {
            broker,
            registry,
            notifier,
            params,
        }
    }

    /// Poll loop for one trade. Errors are logged and the next poll proceeds.
    pub async fn run(&self, instrument: String, trade_id: String) {
        info!("{}: trailing stop supervision started for trade {}", instrument, trade_id);
        loop {
            tokio::time::sleep(self.params.poll_interval).await;
            match self.poll_once(&instrument, &trade_id).await {
                Ok(TrailStep::Continue) => {}
                Ok(TrailStep::Closed) => {
                    info!("{}: trade {} closed by trailing manager", instrument, trade_id);
                    return;
                }
                Ok(TrailStep::Gone) => {
                    debug!("{}: trade {} left the registry", instrument, trade_id);
                    return;
                }
                Err(e) => warn!("{}: trailing stop error on {}: {}", instrument, trade_id, e),
            }
        }
    }

    pub async fn poll_once(&self, instrument: &str, trade_id: &str) -> EngineResult<TrailStep> {
        let Some(mut trade) = self.registry.get(instrument, trade_id).await else {
            return Ok(TrailStep::Gone);
        };

        let quote = self.broker.pricing(instrument).await?;
        let price = quote.exit_price(trade.direction.is_long());
        let pip = pip_unit(instrument);
        let profit_pips = trade.favourable_move(price) / pip;

        if profit_pips >= self.params.full_close_pips {
            self.notifier
                .notify(&format!(
                    "💸 {}: +{:.1} pips, closing trade {}",
                    instrument, profit_pips, trade_id
                ))
                .await;
            self.broker
                .close_position(instrument, trade.direction, trade.units, false)
                .await?;
            return Ok(TrailStep::Closed);
        }

        if profit_pips >= self.params.partial_close_pips && !trade.partial_closed {
            trade = self.partial_close(trade, pip).await?;
        }

        if profit_pips >= self.params.trail_trigger_pips {
            let sign = trade.direction.sign();
            let trail = round_price(instrument, price - sign * self.params.trail_gap_pips * pip);
            if trade.last_trail_stop != Some(trail) && trade.is_tighter_stop(trail) {
                self.move_stop(&trade, trail).await?;
                self.notifier
                    .notify(&format!("🔧 {}: SL trailed to {}", instrument, trail))
                    .await;
            }
        }

        Ok(TrailStep::Continue)
    }

    async fn partial_close(&self, trade: ActiveTrade, pip: f64) -> EngineResult<ActiveTrade> {
        let instrument = trade.instrument.clone();
        let instrument = instrument.as_str();
        let trade_id = trade.trade_id.clone();
        let close_units = (trade.units as f64 * self.params.partial_close_fraction) as i64;
        if close_units > 0 {
            self.broker
                .close_position(instrument, trade.direction, close_units, true)
                .await?;
        }
        let updated = self
            .registry
            .update(instrument, &trade_id, |t| {
                t.partial_closed = true;
                t.units -= close_units;
            })
            .await;
        let mut trade = updated.unwrap_or_else(|| ActiveTrade {
            partial_closed: true,
            units: trade.units - close_units,
            ..trade
        });
        self.notifier
            .notify(&format!(
                "📤 {}: closed {} units at +{} pips",
                instrument, close_units, self.params.partial_close_pips
            ))
            .await;

        let sign = trade.direction.sign();
        let fixed_tp = round_price(
            instrument,
            trade.entry_price + sign * self.params.fixed_take_profit_pips * pip,
        );
        let tp =
            ProtectiveOrderRequest::take_profit(&trade.trade_id, instrument, fixed_tp).replacing();
        match self.broker.place_protective_order(&tp).await {
            Ok(()) => {
                trade.take_profit = fixed_tp;
                self.registry
                    .update(instrument, &trade.trade_id, |t| t.take_profit = fixed_tp)
                    .await;
                self.notifier
                    .notify(&format!("🎯 {}: fixed TP set at {}", instrument, fixed_tp))
                    .await;
            }
            Err(e) => warn!("{}: failed to set fixed TP: {}", instrument, e),
        }

        let breakeven = round_price(
            instrument,
            trade.entry_price + sign * self.params.breakeven_offset_pips * pip,
        );
        if trade.is_tighter_stop(breakeven) {
            match self.move_stop(&trade, breakeven).await {
                Ok(()) => {
                    trade.last_trail_stop = Some(breakeven);
                    self.notifier
                        .notify(&format!("🔐 {}: SL moved to breakeven", instrument))
                        .await;
                }
                Err(e) => warn!("{}: failed to move SL to breakeven: {}", instrument, e),
            }
        }
        Ok(trade)
    }

    async fn move_stop(&self, trade: &ActiveTrade, price: f64) -> EngineResult<()> {
        let sl = ProtectiveOrderRequest::stop_loss(&trade.trade_id, &trade.instrument, price)
            .replacing();
        self.broker.place_protective_order(&sl).await?;
        self.registry
            .update(&trade.instrument, &trade.trade_id, |t| t.last_trail_stop = Some(price))
            .await;
        info!("{}: SL for {} moved to {}", trade.instrument, trade.trade_id, price);
        Ok(())
    }
}

/// Owns every trailing task handle so they can be listed and cancelled.
pub struct TrailingStopSupervisor {
    manager: Arc<TrailingStopManager>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TrailingStopSupervisor {
    pub fn new(manager: Arc<TrailingStopManager>) -> Self {
        Self {
            manager,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts supervision unless a live task already exists for the trade.
    pub fn spawn(&self, trade: &ActiveTrade) -> bool {
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.retain(|_, handle| !handle.is_finished());
        if tasks.contains_key(&trade.trade_id) {
            return false;
        }

        let manager = Arc::clone(&self.manager);
        let instrument = trade.instrument.clone();
        let trade_id = trade.trade_id.clone();
        let handle = tokio::spawn(async move { manager.run(instrument, trade_id).await });
        tasks.insert(trade.trade_id.clone(), handle);
        true
    }

    pub fn active_trade_ids(&self) -> Vec<String> {
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.retain(|_, handle| !handle.is_finished());
        let mut ids: Vec<String> = tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn cancel(&self, trade_id: &str) -> bool {
        let handle = match self.tasks.lock() {
            Ok(mut guard) => guard.remove(trade_id),
            Err(poisoned) => poisoned.into_inner().remove(trade_id),
        };
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Aborts every task. Positions stay open with their broker-side SL/TP.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut guard) => guard.drain().map(|(_, h)| h).collect(),
            Err(poisoned) => poisoned.into_inner().drain().map(|(_, h)| h).collect(),
        };
        let count = drained.len();
        for handle in drained {
            handle.abort();
        }
        info!("trailing stop supervisor stopped {} task(s)", count);
        count
    }
}
