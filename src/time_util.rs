use chrono::{DateTime, NaiveDate, Timelike, Utc};

use crate::app_config::SessionSpreadLimits;

/// UTC trading session buckets used by the spread filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingSession {
    /// 06:00 - 14:00 UTC
    London,
    /// 14:00 - 22:00 UTC
    NewYork,
    /// Asian session and off-hours
    Asian,
}

impl TradingSession {
    pub fn at(time: DateTime<Utc>) -> Self {
        match time.hour() {
            6..=13 => TradingSession::London,
            14..=21 => TradingSession::NewYork,
            _ => TradingSession::Asian,
        }
    }

    pub fn spread_limit(&self, limits: &SessionSpreadLimits) -> f64 {
        match self {
            TradingSession::London => limits.london,
            TradingSession::NewYork => limits.new_york,
            TradingSession::Asian => limits.asian,
        }
    }
}

pub fn utc_date(time: DateTime<Utc>) -> NaiveDate {
    time.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, 30, 0).unwrap()
    }

    #[test]
    fn session_boundaries() {
        assert_eq!(TradingSession::at(at_hour(5)), TradingSession::Asian);
        assert_eq!(TradingSession::at(at_hour(6)), TradingSession::London);
        assert_eq!(TradingSession::at(at_hour(13)), TradingSession::London);
        assert_eq!(TradingSession::at(at_hour(14)), TradingSession::NewYork);
        assert_eq!(TradingSession::at(at_hour(21)), TradingSession::NewYork);
        assert_eq!(TradingSession::at(at_hour(22)), TradingSession::Asian);
    }

    #[test]
    fn each_session_has_its_own_limit() {
        let limits = SessionSpreadLimits::default();
        assert_eq!(TradingSession::London.spread_limit(&limits), 0.005);
        assert_eq!(TradingSession::NewYork.spread_limit(&limits), 0.02);
        assert_eq!(TradingSession::Asian.spread_limit(&limits), 0.012);
    }
}
