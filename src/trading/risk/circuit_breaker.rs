//! 日内熔断: blocks new entries once the day's realized loss reaches the limit.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::time_util::utc_date;
use crate::trading::services::TradeLog;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerState {
    Open { daily_pnl: f64 },
    Tripped { daily_pnl: f64 },
}

impl BreakerState {
    pub fn allows_entry(&self) -> bool {
        matches!(self, BreakerState::Open { .. })
    }

    pub fn daily_pnl(&self) -> f64 {
        match self {
            BreakerState::Open { daily_pnl } | BreakerState::Tripped { daily_pnl } => *daily_pnl,
        }
    }
}

/// Recomputed from the trade log on every evaluation, so a new UTC date starts
/// from zero without any explicit reset.
pub struct CircuitBreaker {
    trade_log: Arc<dyn TradeLog>,
    daily_loss_limit: f64,
}

impl CircuitBreaker {
    pub fn new(trade_log: Arc<dyn TradeLog>, daily_loss_limit: f64) -> Self {
        Self {
            trade_log,
            daily_loss_limit,
        }
    }

    /// Realized P&L for `date`; an unreadable log counts as zero.
    pub fn daily_pnl(&self, date: NaiveDate) -> f64 {
        match self.trade_log.realized_on(date) {
            Ok(pnl) => pnl,
            Err(e) => {
                warn!("trade log unreadable, daily pnl treated as 0: {}", e);
                0.0
            }
        }
    }

    pub fn evaluate(&self, now: DateTime<Utc>) -> BreakerState {
        let daily_pnl = self.daily_pnl(utc_date(now));
        if daily_pnl <= self.daily_loss_limit {
            BreakerState::Tripped { daily_pnl }
        } else {
            BreakerState::Open { daily_pnl }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, EngineResult};
    use crate::trading::model::{TradeLogRecord, TradeOutcome};
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct VecLog(Mutex<Vec<TradeLogRecord>>);

    impl TradeLog for VecLog {
        fn append(&self, record: &TradeLogRecord) -> EngineResult<()> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn records(&self) -> EngineResult<Vec<TradeLogRecord>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    struct BrokenLog;

    impl TradeLog for BrokenLog {
        fn append(&self, _: &TradeLogRecord) -> EngineResult<()> {
            Err(EngineError::TradeLog("disk gone".to_string()))
        }

        fn records(&self) -> EngineResult<Vec<TradeLogRecord>> {
            Err(EngineError::TradeLog("disk gone".to_string()))
        }
    }

    fn closed(at: DateTime<Utc>, profit: f64) -> TradeLogRecord {
        TradeLogRecord {
            timestamp: at,
            instrument: "EUR_USD".to_string(),
            trade_id: None,
            side: None,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            atr: None,
            units: 0,
            realized_profit: profit,
            account_balance: None,
            outcome: TradeOutcome::from_realized(profit),
        }
    }

    #[test]
    fn trips_at_limit_and_resets_next_day() {
        let log = Arc::new(VecLog::default());
        let day1 = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        log.append(&closed(day1, -150.0)).unwrap();
        let breaker = CircuitBreaker::new(log.clone(), -200.0);
        assert!(breaker.evaluate(day1).allows_entry());

        log.append(&closed(day1, -50.0)).unwrap();
        let state = breaker.evaluate(day1);
        assert!(!state.allows_entry());
        assert_eq!(state.daily_pnl(), -200.0);

        let day2 = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 1).unwrap();
        assert!(breaker.evaluate(day2).allows_entry());
    }

    #[test]
    fn unreadable_log_counts_as_flat() {
        let breaker = CircuitBreaker::new(Arc::new(BrokenLog), -200.0);
        assert_eq!(breaker.evaluate(Utc::now()), BreakerState::Open { daily_pnl: 0.0 });
    }
}
