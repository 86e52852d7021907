pub mod order_executor;
pub mod protection;

pub use order_executor::{ConfirmedEntry, OrderExecutor};
pub use protection::{ProtectionManager, ProtectionOutcome, ProtectionState, ProtectionStateMachine};
