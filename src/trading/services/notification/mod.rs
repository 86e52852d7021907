//! Operator alerts. Delivery is fire-and-forget: a failed alert is logged and
//! never interrupts trading.

pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

pub use telegram::TelegramNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Fallback sink when no Telegram credentials are configured
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        info!(target: "alerts", "{}", message);
    }
}

/// Telegram when configured, otherwise alerts only go to the log.
pub fn notifier_from_env() -> Arc<dyn Notifier> {
    match TelegramNotifier::from_env() {
        Ok(telegram) => Arc::new(telegram),
        Err(e) => {
            warn!("Telegram disabled ({}), alerts go to the log only", e);
            Arc::new(LogNotifier)
        }
    }
}
