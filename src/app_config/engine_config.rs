//! 引擎配置
//!
//! One parameter set for the whole engine. Defaults are the values the live bot
//! trades with; every field can be overridden through the environment.

use std::time::Duration;

use super::env::{env_list, env_or_default, env_parse, env_required};
use crate::error::EngineError;

fn env_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_parse(key, default.as_millis() as u64))
}

/// Indicator and confluence parameters
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub history_capacity: usize,
    pub min_history: usize,
    pub rsi_period: usize,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub atr_period: usize,
    pub min_atr: f64,
    pub atr_median_window: usize,
    pub high_volatility_ratio: f64,
    pub low_volatility_ratio: f64,
    pub high_volatility_widen: f64,
    pub low_volatility_tighten: f64,
    pub sr_lookback: usize,
    pub sr_threshold: f64,
    pub momentum_short: usize,
    pub momentum_long: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            min_history: 21,
            rsi_period: 5,
            buy_threshold: 35.0,
            sell_threshold: 65.0,
            atr_period: 5,
            min_atr: 0.0003,
            atr_median_window: 20,
            high_volatility_ratio: 1.5,
            low_volatility_ratio: 0.75,
            high_volatility_widen: 5.0,
            low_volatility_tighten: 3.0,
            sr_lookback: 20,
            sr_threshold: 0.0003,
            momentum_short: 5,
            momentum_long: 20,
        }
    }
}

impl StrategyParams {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            history_capacity: env_parse("HISTORY_CAPACITY", d.history_capacity),
            min_history: env_parse("MIN_HISTORY", d.min_history),
            rsi_period: env_parse("RSI_PERIOD", d.rsi_period),
            buy_threshold: env_parse("RSI_BUY_THRESHOLD", d.buy_threshold),
            sell_threshold: env_parse("RSI_SELL_THRESHOLD", d.sell_threshold),
            atr_period: env_parse("ATR_PERIOD", d.atr_period),
            min_atr: env_parse("MIN_ATR", d.min_atr),
            sr_threshold: env_parse("SR_THRESHOLD", d.sr_threshold),
            ..d
        }
    }
}

/// Spread limits per UTC trading session (absolute price units)
#[derive(Debug, Clone)]
pub struct SessionSpreadLimits {
    /// 06:00-14:00 UTC
    pub london: f64,
    /// 14:00-22:00 UTC
    pub new_york: f64,
    /// everything else
    pub asian: f64,
}

impl Default for SessionSpreadLimits {
    fn default() -> Self {
        Self {
            london: 0.005,
            new_york: 0.02,
            asian: 0.012,
        }
    }
}

impl SessionSpreadLimits {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            london: env_parse("SPREAD_LIMIT_LONDON", d.london),
            new_york: env_parse("SPREAD_LIMIT_NEW_YORK", d.new_york),
            asian: env_parse("SPREAD_LIMIT_ASIAN", d.asian),
        }
    }
}

/// Position sizing and protective distances
#[derive(Debug, Clone)]
pub struct RiskParams {
    pub stop_floor: f64,
    pub atr_multiplier: f64,
    pub reward_risk_ratio: f64,
    pub buffer_multiple: f64,
    pub buffer_floor: f64,
    /// buffer multiple used after the protective distances were widened
    pub widened_buffer_multiple: f64,
    pub risk_fraction: f64,
    pub min_units: i64,
    /// used when the account summary can't be fetched
    pub fallback_balance: f64,
    pub max_open_trades: usize,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            stop_floor: 0.0015,
            atr_multiplier: 2.5,
            reward_risk_ratio: 1.2,
            buffer_multiple: 1.5,
            buffer_floor: 0.0005,
            widened_buffer_multiple: 1.1,
            risk_fraction: 0.02,
            min_units: 100,
            fallback_balance: 1000.0,
            max_open_trades: 3,
        }
    }
}

impl RiskParams {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            stop_floor: env_parse("STOP_FLOOR", d.stop_floor),
            atr_multiplier: env_parse("ATR_MULTIPLIER", d.atr_multiplier),
            reward_risk_ratio: env_parse("TP_SL_RATIO", d.reward_risk_ratio),
            risk_fraction: env_parse("RISK_PERCENT", d.risk_fraction),
            min_units: env_parse("MIN_UNITS", d.min_units),
            fallback_balance: env_parse("FALLBACK_BALANCE", d.fallback_balance),
            max_open_trades: env_parse("MAX_OPEN_TRADES", d.max_open_trades),
            ..d
        }
    }
}

/// Fill confirmation and SL/TP attachment timing
#[derive(Debug, Clone)]
pub struct ProtectionParams {
    pub fill_poll_attempts: usize,
    pub fill_poll_delay: Duration,
    pub settle_min_move: f64,
    pub settle_timeout: Duration,
    pub settle_poll: Duration,
    pub sl_retry_attempts: usize,
    pub sl_retry_delay: Duration,
    pub presence_check_delay: Duration,
}

impl Default for ProtectionParams {
    fn default() -> Self {
        Self {
            fill_poll_attempts: 3,
            fill_poll_delay: Duration::from_secs(1),
            settle_min_move: 0.0003,
            settle_timeout: Duration::from_secs(15),
            settle_poll: Duration::from_secs(1),
            sl_retry_attempts: 3,
            sl_retry_delay: Duration::from_secs(2),
            presence_check_delay: Duration::from_secs(10),
        }
    }
}

impl ProtectionParams {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            fill_poll_attempts: env_parse("FILL_POLL_ATTEMPTS", d.fill_poll_attempts),
            fill_poll_delay: env_millis("FILL_POLL_DELAY_MS", d.fill_poll_delay),
            settle_min_move: env_parse("SETTLE_MIN_MOVE", d.settle_min_move),
            settle_timeout: env_millis("SETTLE_TIMEOUT_MS", d.settle_timeout),
            settle_poll: env_millis("SETTLE_POLL_MS", d.settle_poll),
            sl_retry_attempts: env_parse("SL_RETRY_ATTEMPTS", d.sl_retry_attempts),
            sl_retry_delay: env_millis("SL_RETRY_DELAY_MS", d.sl_retry_delay),
            presence_check_delay: env_millis("PRESENCE_CHECK_DELAY_MS", d.presence_check_delay),
        }
    }
}

/// Trailing-stop supervision, all distances in pips
#[derive(Debug, Clone)]
pub struct TrailingParams {
    pub poll_interval: Duration,
    pub full_close_pips: f64,
    pub partial_close_pips: f64,
    pub partial_close_fraction: f64,
    pub fixed_take_profit_pips: f64,
    pub breakeven_offset_pips: f64,
    pub trail_trigger_pips: f64,
    pub trail_gap_pips: f64,
}

impl Default for TrailingParams {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            full_close_pips: 10.0,
            partial_close_pips: 5.0,
            partial_close_fraction: 0.5,
            fixed_take_profit_pips: 10.0,
            breakeven_offset_pips: 1.0,
            trail_trigger_pips: 5.0,
            trail_gap_pips: 2.0,
        }
    }
}

impl TrailingParams {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            poll_interval: env_millis("TRAIL_POLL_INTERVAL_MS", d.poll_interval),
            full_close_pips: env_parse("TRAIL_FULL_CLOSE_PIPS", d.full_close_pips),
            partial_close_pips: env_parse("TRAIL_PARTIAL_CLOSE_PIPS", d.partial_close_pips),
            trail_trigger_pips: env_parse("TRAIL_TRIGGER_PIPS", d.trail_trigger_pips),
            trail_gap_pips: env_parse("TRAIL_GAP_PIPS", d.trail_gap_pips),
            ..d
        }
    }
}

/// Background loops: feed reconnect, closed-trade polling, daily summary
#[derive(Debug, Clone)]
pub struct MonitorParams {
    pub daily_loss_limit: f64,
    pub reconnect_backoff: Duration,
    pub closed_trade_poll: Duration,
    pub stale_trade_after: Duration,
    pub daily_summary_cron: String,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            daily_loss_limit: -200.0,
            reconnect_backoff: Duration::from_secs(5),
            closed_trade_poll: Duration::from_secs(10),
            stale_trade_after: Duration::from_secs(300),
            daily_summary_cron: "0 59 21 * * *".to_string(),
        }
    }
}

impl MonitorParams {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            daily_loss_limit: env_parse("DAILY_LOSS_LIMIT", d.daily_loss_limit),
            reconnect_backoff: env_millis("STREAM_RECONNECT_BACKOFF_MS", d.reconnect_backoff),
            closed_trade_poll: env_millis("CLOSED_TRADE_POLL_MS", d.closed_trade_poll),
            stale_trade_after: env_millis("STALE_TRADE_AFTER_MS", d.stale_trade_after),
            daily_summary_cron: env_or_default("DAILY_SUMMARY_CRON", &d.daily_summary_cron),
        }
    }
}

/// OANDA v20 endpoints and credentials
#[derive(Debug, Clone)]
pub struct OandaConfig {
    pub api_url: String,
    pub stream_url: String,
    pub access_token: String,
    pub account_id: String,
}

impl OandaConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        Ok(Self {
            api_url: env_or_default("OANDA_API_URL", "https://api-fxpractice.oanda.com/v3"),
            stream_url: env_or_default(
                "OANDA_STREAM_URL",
                "https://stream-fxpractice.oanda.com/v3",
            ),
            access_token: env_required("OANDA_ACCESS_TOKEN")?,
            account_id: env_required("OANDA_ACCOUNT_ID")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub instruments: Vec<String>,
    pub trade_log_path: String,
    pub strategy: StrategyParams,
    pub spread_limits: SessionSpreadLimits,
    pub risk: RiskParams,
    pub protection: ProtectionParams,
    pub trailing: TrailingParams,
    pub monitor: MonitorParams,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            instruments: env_list("INSTRUMENTS", "USD_JPY"),
            trade_log_path: env_or_default("TRADE_LOG_PATH", "trades.csv"),
            strategy: StrategyParams::from_env(),
            spread_limits: SessionSpreadLimits::from_env(),
            risk: RiskParams::from_env(),
            protection: ProtectionParams::from_env(),
            trailing: TrailingParams::from_env(),
            monitor: MonitorParams::from_env(),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.instruments.is_empty() {
            return Err(EngineError::Config("no instruments configured".to_string()));
        }
        let s = &self.strategy;
        if s.rsi_period == 0 || s.atr_period == 0 {
            return Err(EngineError::Config("indicator periods must be > 0".to_string()));
        }
        if s.min_history > s.history_capacity {
            return Err(EngineError::Config(format!(
                "min_history {} exceeds history capacity {}",
                s.min_history, s.history_capacity
            )));
        }
        if self.risk.min_units <= 0 {
            return Err(EngineError::Config("min_units must be positive".to_string()));
        }
        Ok(())
    }
}
