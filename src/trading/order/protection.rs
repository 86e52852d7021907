//! 止盈止损挂单与失败保护
//!
//! ```text
//! Unprotected -> Pending -> Protected
//!                   \-> FailSafeClosing -> Closed
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{error, info, warn};

use super::order_executor::ConfirmedEntry;
use crate::app_config::ProtectionParams;
use crate::error::{EngineError, EngineResult};
use crate::trading::model::instrument::format_price;
use crate::trading::model::{ActiveTrade, ProtectiveOrderRequest, TradeLogRecord, TradeOutcome};
use crate::trading::oanda::BrokerApi;
use crate::trading::risk::TradeRegistry;
use crate::trading::services::{Notifier, TradeLog};
use crate::trading::strategy::RiskSizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionState {
    Unprotected,
    Pending,
    Protected,
    FailSafeClosing,
    Closed,
}

impl fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
pub struct ProtectionStateMachine {
    state: ProtectionState,
}

impl Default for ProtectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: ProtectionState::Unprotected,
        }
    }

    pub fn state(&self) -> ProtectionState {
        self.state
    }

    fn invalid(&self, to: ProtectionState) -> EngineError {
        EngineError::InvalidTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    pub fn begin(&mut self) -> EngineResult<()> {
        match self.state {
            ProtectionState::Unprotected => {
                self.state = ProtectionState::Pending;
                Ok(())
            }
            _ => Err(self.invalid(ProtectionState::Pending)),
        }
    }

    pub fn protect(&mut self) -> EngineResult<()> {
        match self.state {
            ProtectionState::Pending => {
                self.state = ProtectionState::Protected;
                Ok(())
            }
            _ => Err(self.invalid(ProtectionState::Protected)),
        }
    }

    /// Entered at most once; a second request is rejected so the flattening
    /// order can never be sent twice.
    pub fn begin_fail_safe(&mut self) -> EngineResult<()> {
        match self.state {
            ProtectionState::Unprotected | ProtectionState::Pending => {
                self.state = ProtectionState::FailSafeClosing;
                Ok(())
            }
            _ => Err(self.invalid(ProtectionState::FailSafeClosing)),
        }
    }

    pub fn close(&mut self) -> EngineResult<()> {
        match self.state {
            ProtectionState::FailSafeClosing => {
                self.state = ProtectionState::Closed;
                Ok(())
            }
            _ => Err(self.invalid(ProtectionState::Closed)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtectionOutcome {
    /// both legs set and the broker lists the trade as open
    Protected(ActiveTrade),
    /// both legs set but the trade was missing from the open-trade list
    Provisional(ActiveTrade),
    /// a leg failed and the position was flattened
    FailSafeClosed { trade_id: String },
}

pub struct ProtectionManager {
    broker: Arc<dyn BrokerApi>,
    notifier: Arc<dyn Notifier>,
    registry: TradeRegistry,
    trade_log: Arc<dyn TradeLog>,
    sizer: RiskSizer,
    params: ProtectionParams,
}

impl ProtectionManager {
    pub fn new(
        broker: Arc<dyn BrokerApi>,
        notifier: Arc<dyn Notifier>,
        registry: TradeRegistry,
        trade_log: Arc<dyn TradeLog>,
        sizer: RiskSizer,
        params: ProtectionParams,
    ) -> Self {
        Self {
            broker,
            notifier,
            registry,
            trade_log,
            sizer,
            params,
        }
    }

    pub async fn protect(&self, mut entry: ConfirmedEntry) -> EngineResult<ProtectionOutcome> {
        let mut machine = ProtectionStateMachine::new();
        let instrument = entry.instrument.clone();

        if !self.wait_for_settle(&entry).await {
            entry.plan = self.sizer.widen(&entry.plan);
            entry.levels = entry
                .plan
                .levels(&instrument, entry.direction, entry.fill_price);
            warn!(
                "{}: price still too close after wait, widened stop to {:.5}",
                instrument, entry.plan.stop_distance
            );
        }

        machine.begin()?;
        let tp_set = self.set_take_profit(&entry).await;
        let sl_set = self.set_stop_loss(&entry).await;

        if !(tp_set && sl_set) {
            self.fail_safe_close(&mut machine, &entry).await?;
            return Ok(ProtectionOutcome::FailSafeClosed {
                trade_id: entry.trade_id,
            });
        }
        machine.protect()?;

        let trade = ActiveTrade {
            trade_id: entry.trade_id.clone(),
            instrument: instrument.clone(),
            direction: entry.direction,
            entry_price: entry.fill_price,
            stop_loss: entry.levels.stop_loss,
            take_profit: entry.levels.take_profit,
            units: entry.units,
            opened_at: Utc::now(),
            partial_closed: false,
            last_trail_stop: None,
            provisional: false,
        };
        self.registry.insert(trade.clone()).await;
        if let Err(e) = self
            .trade_log
            .append(&TradeLogRecord::opened(&trade, entry.atr, trade.opened_at))
        {
            error!("{}: failed to log trade {}: {}", instrument, trade.trade_id, e);
        }
        self.notifier
            .notify(&format!(
                "🆕 {}: Trade added to active list | ID: {}",
                instrument, trade.trade_id
            ))
            .await;

        tokio::time::sleep(self.params.presence_check_delay).await;
        let present = match self.broker.open_trade_ids().await {
            Ok(ids) => ids.contains(&trade.trade_id),
            Err(e) => {
                warn!("{}: presence check failed: {}", instrument, e);
                false
            }
        };
        if present {
            return Ok(ProtectionOutcome::Protected(trade));
        }

        warn!(
            "{}: trade {} missing from open trades, keeping provisional record",
            instrument, trade.trade_id
        );
        self.notifier
            .notify(&format!(
                "⚠️ {}: Trade ID {} missing from open trades",
                instrument, trade.trade_id
            ))
            .await;
        let trade_id = trade.trade_id.clone();
        let updated = self
            .registry
            .update(&instrument, &trade_id, |t| t.provisional = true)
            .await;
        let trade = updated.unwrap_or(ActiveTrade {
            provisional: true,
            ..trade
        });
        Ok(ProtectionOutcome::Provisional(trade))
    }

    /// Polls the exit-side price until it moves `settle_min_move` away from the
    /// fill. Pricing errors just consume a poll.
    async fn wait_for_settle(&self, entry: &ConfirmedEntry) -> bool {
        let poll_ms = self.params.settle_poll.as_millis().max(1);
        let polls = (self.params.settle_timeout.as_millis() / poll_ms) as usize;
        let is_long = entry.direction.is_long();

        for _ in 0..polls {
            tokio::time::sleep(self.params.settle_poll).await;
            match self.broker.pricing(&entry.instrument).await {
                Ok(quote) => {
                    let moved = (quote.exit_price(is_long) - entry.fill_price).abs();
                    if moved >= self.params.settle_min_move {
                        return true;
                    }
                }
                Err(e) => warn!("{}: settle poll failed: {}", entry.instrument, e),
            }
        }
        false
    }

    async fn set_take_profit(&self, entry: &ConfirmedEntry) -> bool {
        let order = ProtectiveOrderRequest::take_profit(
            &entry.trade_id,
            &entry.instrument,
            entry.levels.take_profit,
        );
        match self.broker.place_protective_order(&order).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: failed to set TP: {}", entry.instrument, e);
                false
            }
        }
    }

    /// First attempt plus `sl_retry_attempts` retries at a fixed delay.
    async fn set_stop_loss(&self, entry: &ConfirmedEntry) -> bool {
        let order = ProtectiveOrderRequest::stop_loss(
            &entry.trade_id,
            &entry.instrument,
            entry.levels.stop_loss,
        );
        let strategy =
            FixedInterval::new(self.params.sl_retry_delay).take(self.params.sl_retry_attempts);
        let broker = Arc::clone(&self.broker);
        let result = Retry::spawn(strategy, || {
            let broker = Arc::clone(&broker);
            let order = order.clone();
            async move {
                let res = broker.place_protective_order(&order).await;
                if let Err(e) = &res {
                    warn!("{}: SL attempt failed: {}", order.instrument, e);
                }
                res
            }
        })
        .await;
        result.is_ok()
    }

    async fn fail_safe_close(
        &self,
        machine: &mut ProtectionStateMachine,
        entry: &ConfirmedEntry,
    ) -> EngineResult<()> {
        machine.begin_fail_safe()?;
        let instrument = entry.instrument.as_str();
        error!(
            "🛑 {}: SL or TP setup failed for trade {}, closing immediately",
            instrument, entry.trade_id
        );
        self.notifier
            .notify(&format!(
                "🛑 {}: SL/TP setup failed. Closing trade to avoid risk.",
                instrument
            ))
            .await;

        match self
            .broker
            .close_position(instrument, entry.direction, entry.units, false)
            .await
        {
            Ok(_) => {
                self.notifier
                    .notify(&format!(
                        "🔐 {}: Trade closed due to failed SL/TP setup.",
                        instrument
                    ))
                    .await;
            }
            Err(e) => {
                error!("{}: emergency close failed: {}", instrument, e);
                self.notifier
                    .notify(&format!("❌ {}: Emergency close failed: {}", instrument, e))
                    .await;
            }
        }
        machine.close()?;

        let record = TradeLogRecord {
            timestamp: Utc::now(),
            instrument: instrument.to_string(),
            trade_id: Some(entry.trade_id.clone()),
            side: Some(entry.direction),
            entry_price: Some(entry.fill_price),
            stop_loss: Some(entry.levels.stop_loss),
            take_profit: Some(entry.levels.take_profit),
            atr: Some(entry.atr),
            units: entry.units,
            realized_profit: 0.0,
            account_balance: Some(entry.account_balance),
            outcome: TradeOutcome::FailSafe,
        };
        if let Err(e) = self.trade_log.append(&record) {
            error!("{}: failed to log fail-safe close: {}", instrument, e);
        }
        info!(
            "{}: fail-safe close done for {} at {}",
            instrument,
            entry.trade_id,
            format_price(instrument, entry.fill_price)
        );
        Ok(())
    }
}
