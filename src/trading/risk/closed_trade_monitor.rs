//! 平仓监控
//!
//! Follows the broker's ORDER_FILL transactions to learn about closures that
//! happened broker-side (SL/TP hits, manual closes, trailing closes). Each
//! closed trade is alerted and logged exactly once.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::app_config::MonitorParams;
use crate::error::EngineResult;
use crate::trading::model::{OrderFill, TradeClose, TradeLogRecord, TradeOutcome};
use crate::trading::oanda::BrokerApi;
use crate::trading::risk::TradeRegistry;
use crate::trading::services::{Notifier, TradeLog};

/// Trade ids already alerted. The transaction cursor keeps old fills from coming
/// back, so only the most recent ids need remembering.
const ALERTED_CAPACITY: usize = 512;

#[derive(Debug, Default)]
struct RecentIds {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl RecentIds {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ..Default::default()
        }
    }

    /// False when `id` is already remembered.
    fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct ClosedTradeMonitor {
    broker: Arc<dyn BrokerApi>,
    registry: TradeRegistry,
    notifier: Arc<dyn Notifier>,
    trade_log: Arc<dyn TradeLog>,
    params: MonitorParams,
    cursor: Option<String>,
    alerted: RecentIds,
}

impl ClosedTradeMonitor {
    pub fn new(
        broker: Arc<dyn BrokerApi>,
        registry: TradeRegistry,
        notifier: Arc<dyn Notifier>,
        trade_log: Arc<dyn TradeLog>,
        params: MonitorParams,
    ) -> Self {
        Self {
            broker,
            registry,
            notifier,
            trade_log,
            params,
            cursor: None,
            alerted: RecentIds::with_capacity(ALERTED_CAPACITY),
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("closed trade monitor started");
        loop {
            if let Err(e) = self.sweep(Utc::now()).await {
                warn!("error checking closed trades: {}", e);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.params.closed_trade_poll) => {}
                _ = shutdown.changed() => {
                    info!("closed trade monitor stopped");
                    return;
                }
            }
        }
    }

    /// One polling round. Returns the number of newly closed trades.
    pub async fn sweep(&mut self, now: DateTime<Utc>) -> EngineResult<usize> {
        let result = self.collect_closures().await;
        self.evict_stale(now).await;
        result
    }

    async fn collect_closures(&mut self) -> EngineResult<usize> {
        let page = self.broker.fills_since(self.cursor.as_deref()).await?;
        if self.cursor.is_none() {
            // first sweep only establishes where to read from
            self.cursor = page.last_transaction_id;
            info!("closed trade monitor primed at transaction {:?}", self.cursor);
            return Ok(0);
        }

        let mut closed = 0;
        for fill in &page.fills {
            for close in &fill.trades_closed {
                if self.alerted.insert(&close.trade_id) {
                    self.on_trade_closed(fill, close).await;
                    closed += 1;
                }
            }
            if let Some(reduced) = &fill.trade_reduced {
                self.on_trade_reduced(fill, reduced);
            }
        }
        if page.last_transaction_id.is_some() {
            self.cursor = page.last_transaction_id;
        }
        Ok(closed)
    }

    async fn on_trade_closed(&self, fill: &OrderFill, close: &TradeClose) {
        let trade = self.registry.remove(&close.trade_id).await;
        let outcome = TradeOutcome::from_realized(close.realized_pl);
        let instrument = trade
            .as_ref()
            .map(|t| t.instrument.clone())
            .unwrap_or_else(|| fill.instrument.clone());

        info!(
            "{}: trade {} closed {:?} realized {:.2}",
            instrument, close.trade_id, outcome, close.realized_pl
        );
        self.notifier
            .notify(&format!(
                "📉 Trade Closed\n💰 Realized PnL: {:.2}\n📊 Balance: {:.2}",
                close.realized_pl, fill.account_balance
            ))
            .await;

        let record = TradeLogRecord {
            timestamp: fill.time.unwrap_or_else(Utc::now),
            instrument,
            trade_id: Some(close.trade_id.clone()),
            side: trade.as_ref().map(|t| t.direction),
            entry_price: trade.as_ref().map(|t| t.entry_price),
            stop_loss: trade.as_ref().map(|t| t.current_stop()),
            take_profit: trade.as_ref().map(|t| t.take_profit),
            atr: None,
            units: trade.as_ref().map(|t| t.units).unwrap_or(0),
            realized_profit: close.realized_pl,
            account_balance: Some(fill.account_balance),
            outcome,
        };
        if let Err(e) = self.trade_log.append(&record) {
            error!("failed to log closed trade {}: {}", close.trade_id, e);
        }
    }

    /// Partial closes book profit without ending the trade.
    fn on_trade_reduced(&self, fill: &OrderFill, reduced: &TradeClose) {
        let record = TradeLogRecord {
            timestamp: fill.time.unwrap_or_else(Utc::now),
            instrument: fill.instrument.clone(),
            trade_id: Some(reduced.trade_id.clone()),
            side: None,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            atr: None,
            units: fill.units.abs(),
            realized_profit: reduced.realized_pl,
            account_balance: Some(fill.account_balance),
            outcome: TradeOutcome::from_realized(reduced.realized_pl),
        };
        if let Err(e) = self.trade_log.append(&record) {
            error!("failed to log partial close of {}: {}", reduced.trade_id, e);
        }
    }

    /// Drops provisional records the broker never confirmed as open.
    async fn evict_stale(&self, now: DateTime<Utc>) {
        let stale = self
            .registry
            .stale_provisional(now, self.params.stale_trade_after)
            .await;
        if stale.is_empty() {
            return;
        }
        let open = match self.broker.open_trade_ids().await {
            Ok(open) => open,
            Err(e) => {
                warn!("skipping stale trade eviction: {}", e);
                return;
            }
        };
        for trade in stale {
            if open.contains(&trade.trade_id) {
                continue;
            }
            self.registry.remove(&trade.trade_id).await;
            warn!(
                "{}: evicted stale provisional trade {}",
                trade.instrument, trade.trade_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_each_id_once() {
        let mut ids = RecentIds::with_capacity(4);
        assert!(ids.insert("7"));
        assert!(!ids.insert("7"));
        assert!(ids.insert("8"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn oldest_ids_are_forgotten_at_capacity() {
        let mut ids = RecentIds::with_capacity(3);
        for id in ["1", "2", "3", "4"] {
            assert!(ids.insert(id));
        }
        assert_eq!(ids.len(), 3);
        // "1" fell out, the rest are still known
        assert!(!ids.insert("4"));
        assert!(!ids.insert("2"));
        assert!(ids.insert("1"));
        assert_eq!(ids.len(), 3);
    }
}
