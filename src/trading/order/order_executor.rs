use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app_config::ProtectionParams;
use crate::error::{EngineError, EngineResult};
use crate::trading::model::instrument::format_price;
use crate::trading::model::{MarketOrderRequest, OrderFill, TradeDirection, TradeIntent};
use crate::trading::oanda::BrokerApi;
use crate::trading::services::Notifier;
use crate::trading::strategy::{ProtectiveLevels, RiskPlan, RiskSizer};

/// A market order the broker confirmed as filled, with levels recomputed from
/// the actual fill price.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedEntry {
    pub trade_id: String,
    pub instrument: String,
    pub direction: TradeDirection,
    /// absolute units
    pub units: i64,
    pub fill_price: f64,
    pub realized_pl: f64,
    pub account_balance: f64,
    pub atr: f64,
    pub plan: RiskPlan,
    pub levels: ProtectiveLevels,
}

/// 下单执行: sizes, submits and confirms market orders.
pub struct OrderExecutor {
    broker: Arc<dyn BrokerApi>,
    notifier: Arc<dyn Notifier>,
    sizer: RiskSizer,
    params: ProtectionParams,
}

impl OrderExecutor {
    pub fn new(
        broker: Arc<dyn BrokerApi>,
        notifier: Arc<dyn Notifier>,
        sizer: RiskSizer,
        params: ProtectionParams,
    ) -> Self {
        Self {
            broker,
            notifier,
            sizer,
            params,
        }
    }

    pub fn sizer(&self) -> &RiskSizer {
        &self.sizer
    }

    /// Account balance for sizing, the configured fallback when unavailable.
    pub async fn resolve_balance(&self) -> f64 {
        match self.broker.account_balance().await {
            Ok(balance) if balance > 0.0 => balance,
            Ok(balance) => {
                warn!("account balance {} unusable, using fallback", balance);
                self.sizer.params().fallback_balance
            }
            Err(e) => {
                warn!("account balance unavailable ({}), using fallback", e);
                self.sizer.params().fallback_balance
            }
        }
    }

    pub async fn execute(&self, intent: &TradeIntent) -> EngineResult<ConfirmedEntry> {
        let instrument = intent.instrument.as_str();
        let plan = self.sizer.plan(intent.atr);
        let balance = self.resolve_balance().await;
        let units = self.sizer.units(instrument, balance, plan.stop_distance);

        info!(
            "🛒 {}: placing {} MARKET {} units @ {} (stop {:.5}, balance {:.2})",
            instrument,
            intent.direction,
            units,
            format_price(instrument, intent.entry_price),
            plan.stop_distance,
            balance
        );

        let order = MarketOrderRequest::open(instrument, intent.direction, units);
        let submission = match self.broker.place_market_order(&order).await {
            Ok(submission) => submission,
            Err(e) => {
                error!("{}: market order failed: {}", instrument, e);
                self.notifier
                    .notify(&format!("❌ {}: market order failed: {}", instrument, e))
                    .await;
                return Err(e);
            }
        };

        let fill = match submission.fill.filter(|f| f.trade_opened.is_some()) {
            Some(fill) => Ok(Some(fill)),
            None => match submission.last_transaction_id.as_deref() {
                Some(tx_id) => self.poll_fill(tx_id).await,
                None => Ok(None),
            },
        };

        let fill = match fill {
            Ok(Some(fill)) => fill,
            Ok(None) => {
                let reason = "no ORDER_FILL with an opened trade".to_string();
                return Err(self.not_filled(instrument, reason).await);
            }
            // the order may already be live at the broker
            Err(e) => {
                let reason = format!("fill lookup failed: {}", e);
                return Err(self.not_filled(instrument, reason).await);
            }
        };

        let entry = self.confirm(intent, units, plan, fill)?;
        self.notifier
            .notify(&format!(
                "✅ {}: Trade filled @ {} | TP: {} | SL: {}\n📊 Account Balance: {:.2}",
                instrument,
                format_price(instrument, entry.fill_price),
                format_price(instrument, entry.levels.take_profit),
                format_price(instrument, entry.levels.stop_loss),
                entry.account_balance
            ))
            .await;
        Ok(entry)
    }

    async fn not_filled(&self, instrument: &str, reason: String) -> EngineError {
        warn!("{}: market order not filled: {}", instrument, reason);
        self.notifier
            .notify(&format!("❌ {}: Market order not filled ({})", instrument, reason))
            .await;
        EngineError::FillNotConfirmed {
            instrument: instrument.to_string(),
            reason,
        }
    }

    /// Reads the transaction record until it shows an opened trade.
    async fn poll_fill(&self, transaction_id: &str) -> EngineResult<Option<OrderFill>> {
        for attempt in 1..=self.params.fill_poll_attempts {
            tokio::time::sleep(self.params.fill_poll_delay).await;
            match self.broker.transaction(transaction_id).await {
                Ok(Some(fill)) if fill.trade_opened.is_some() => return Ok(Some(fill)),
                Ok(_) => {
                    info!("transaction {} not a fill yet (attempt {})", transaction_id, attempt)
                }
                Err(e) if e.is_retryable() => {
                    warn!("fill poll {} failed (attempt {}): {}", transaction_id, attempt, e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn confirm(
        &self,
        intent: &TradeIntent,
        units: i64,
        plan: RiskPlan,
        fill: OrderFill,
    ) -> EngineResult<ConfirmedEntry> {
        let trade_id = fill.trade_opened.ok_or_else(|| EngineError::FillNotConfirmed {
            instrument: intent.instrument.clone(),
            reason: "fill without opened trade".to_string(),
        })?;
        let fill_price = if fill.price > 0.0 {
            fill.price
        } else {
            intent.entry_price
        };
        let units = if fill.units != 0 { fill.units.abs() } else { units };

        Ok(ConfirmedEntry {
            levels: plan.levels(&intent.instrument, intent.direction, fill_price),
            trade_id,
            instrument: intent.instrument.clone(),
            direction: intent.direction,
            units,
            fill_price,
            realized_pl: fill.pl,
            account_balance: fill.account_balance,
            atr: intent.atr,
            plan,
        })
    }
}
