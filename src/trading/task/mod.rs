pub mod daily_summary_job;
pub mod engine;

pub use daily_summary_job::{build_daily_summary, send_daily_summary, start_daily_summary_job};
pub use engine::{EngineContext, InstrumentWorker, TickOutcome, TradingEngine};
