use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::trading::model::ActiveTrade;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradeKey {
    pub instrument: String,
    pub trade_id: String,
}

impl TradeKey {
    pub fn new(instrument: impl Into<String>, trade_id: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            trade_id: trade_id.into(),
        }
    }
}

/// 活跃交易表, shared by workers, trailing tasks and the closed-trade monitor.
///
/// Keyed by (instrument, trade id): inserting the same key twice replaces the
/// record instead of duplicating it.
#[derive(Debug, Clone, Default)]
pub struct TradeRegistry {
    inner: Arc<RwLock<HashMap<TradeKey, ActiveTrade>>>,
}

impl TradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, trade: ActiveTrade) {
        let key = TradeKey::new(&trade.instrument, &trade.trade_id);
        let mut guard = self.inner.write().await;
        if guard.insert(key, trade).is_some() {
            debug!("active trade record replaced");
        }
    }

    pub async fn get(&self, instrument: &str, trade_id: &str) -> Option<ActiveTrade> {
        self.inner
            .read()
            .await
            .get(&TradeKey::new(instrument, trade_id))
            .cloned()
    }

    /// Lookup by trade id alone; broker close events do not always name the instrument.
    pub async fn find(&self, trade_id: &str) -> Option<ActiveTrade> {
        self.inner
            .read()
            .await
            .values()
            .find(|t| t.trade_id == trade_id)
            .cloned()
    }

    /// Applies `f` to the record if it is still registered.
    pub async fn update<F>(&self, instrument: &str, trade_id: &str, f: F) -> Option<ActiveTrade>
    where
        F: FnOnce(&mut ActiveTrade),
    {
        let mut guard = self.inner.write().await;
        let trade = guard.get_mut(&TradeKey::new(instrument, trade_id))?;
        f(trade);
        Some(trade.clone())
    }

    pub async fn remove(&self, trade_id: &str) -> Option<ActiveTrade> {
        let mut guard = self.inner.write().await;
        let key = guard.keys().find(|k| k.trade_id == trade_id).cloned()?;
        guard.remove(&key)
    }

    pub async fn contains(&self, instrument: &str, trade_id: &str) -> bool {
        self.inner
            .read()
            .await
            .contains_key(&TradeKey::new(instrument, trade_id))
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn count_for(&self, instrument: &str) -> usize {
        self.inner
            .read()
            .await
            .keys()
            .filter(|k| k.instrument == instrument)
            .count()
    }

    pub async fn snapshot(&self) -> Vec<ActiveTrade> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Provisional records older than `max_age` at `now`.
    pub async fn stale_provisional(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<ActiveTrade> {
        let max_age =
            chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(3650));
        self.inner
            .read()
            .await
            .values()
            .filter(|t| t.provisional && now - t.opened_at > max_age)
            .cloned()
            .collect()
    }
}
