pub mod atr;
pub mod engulfing;
pub mod momentum;
pub mod price_history;
pub mod rsi_indicator;
pub mod snapshot;
pub mod support_resistance;

pub use price_history::PriceHistory;
pub use snapshot::{IndicatorEngine, IndicatorSnapshot};
