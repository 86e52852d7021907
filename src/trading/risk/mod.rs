pub mod circuit_breaker;
pub mod closed_trade_monitor;
pub mod trade_registry;
pub mod trailing_stop;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use closed_trade_monitor::ClosedTradeMonitor;
pub use trade_registry::{TradeKey, TradeRegistry};
pub use trailing_stop::{TrailStep, TrailingStopManager, TrailingStopSupervisor};
