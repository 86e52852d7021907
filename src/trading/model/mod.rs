pub mod instrument;
pub mod order;
pub mod tick;
pub mod trade;

pub use order::{
    FillPage, MarketOrderRequest, OrderFill, OrderSubmission, PositionFill, ProtectiveOrderKind,
    ProtectiveOrderRequest, TradeClose,
};
pub use tick::{PriceTick, Quote};
pub use trade::{ActiveTrade, TradeDirection, TradeIntent, TradeLogRecord, TradeOutcome};
