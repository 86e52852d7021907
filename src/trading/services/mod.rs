pub mod notification;
pub mod trade_log;

pub use notification::{LogNotifier, Notifier, TelegramNotifier};
pub use trade_log::{CsvTradeLog, TradeLog};
