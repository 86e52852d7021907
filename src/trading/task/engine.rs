//! 交易引擎
//!
//! One worker task per instrument owns that instrument's price history and
//! processes its ticks strictly in order. A tick that produces a signal runs the
//! whole entry round trip (order, fill confirmation, protection) before the next
//! tick is read, so a second setup for the same instrument cannot start while
//! one is pending.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app_config::EngineConfig;
use crate::error::EngineResult;
use crate::trading::indicator::{IndicatorEngine, IndicatorSnapshot, PriceHistory};
use crate::trading::model::instrument::format_price;
use crate::trading::model::{PriceTick, TradeDirection, TradeIntent};
use crate::trading::oanda::BrokerApi;
use crate::trading::order::{OrderExecutor, ProtectionManager, ProtectionOutcome};
use crate::trading::risk::{
    BreakerState, CircuitBreaker, TradeRegistry, TrailingStopManager, TrailingStopSupervisor,
};
use crate::trading::services::{Notifier, TradeLog};
use crate::trading::strategy::{Evaluation, RiskSizer, SignalEvaluator, SkipReason};

/// What a single tick led to
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// daily loss limit reached
    Halted { daily_pnl: f64 },
    /// signal dropped because the instrument already holds `max_open_trades`
    AtCapacity { open: usize },
    /// order rejected or not filled
    Abandoned,
    Entered(ProtectionOutcome),
}

/// Everything the workers share
#[derive(Clone)]
pub struct EngineContext {
    pub broker: Arc<dyn BrokerApi>,
    pub notifier: Arc<dyn Notifier>,
    pub trade_log: Arc<dyn TradeLog>,
    pub registry: TradeRegistry,
    pub trailing: Arc<TrailingStopSupervisor>,
}

impl EngineContext {
    pub fn new(
        config: &EngineConfig,
        broker: Arc<dyn BrokerApi>,
        notifier: Arc<dyn Notifier>,
        trade_log: Arc<dyn TradeLog>,
    ) -> Self {
        let registry = TradeRegistry::new();
        let manager = TrailingStopManager::new(
            Arc::clone(&broker),
            registry.clone(),
            Arc::clone(&notifier),
            config.trailing.clone(),
        );
        Self {
            broker,
            notifier,
            trade_log,
            registry,
            trailing: Arc::new(TrailingStopSupervisor::new(Arc::new(manager))),
        }
    }
}

pub struct InstrumentWorker {
    instrument: String,
    history: PriceHistory,
    indicators: IndicatorEngine,
    evaluator: SignalEvaluator,
    breaker: CircuitBreaker,
    executor: OrderExecutor,
    protection: ProtectionManager,
    ctx: EngineContext,
    max_open_trades: usize,
    halted_on: Option<NaiveDate>,
}

impl InstrumentWorker {
    pub fn new(instrument: &str, config: &EngineConfig, ctx: EngineContext) -> Self {
        let sizer = RiskSizer::new(config.risk.clone());
        Self {
            instrument: instrument.to_string(),
            history: PriceHistory::new(config.strategy.history_capacity),
            indicators: IndicatorEngine::new(config.strategy.clone()),
            evaluator: SignalEvaluator::new(config.strategy.clone(), config.spread_limits.clone()),
            breaker: CircuitBreaker::new(
                Arc::clone(&ctx.trade_log),
                config.monitor.daily_loss_limit,
            ),
            executor: OrderExecutor::new(
                Arc::clone(&ctx.broker),
                Arc::clone(&ctx.notifier),
                sizer.clone(),
                config.protection.clone(),
            ),
            protection: ProtectionManager::new(
                Arc::clone(&ctx.broker),
                Arc::clone(&ctx.notifier),
                ctx.registry.clone(),
                Arc::clone(&ctx.trade_log),
                sizer,
                config.protection.clone(),
            ),
            max_open_trades: config.risk.max_open_trades,
            ctx,
            halted_on: None,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    /// Consumes ticks until every sender is dropped.
    pub async fn run(mut self, mut ticks: mpsc::Receiver<PriceTick>) {
        info!("{}: worker started", self.instrument);
        while let Some(tick) = ticks.recv().await {
            let outcome = self.on_tick(tick).await;
            debug!("{}: {:?}", self.instrument, outcome);
        }
        info!("{}: worker stopped", self.instrument);
    }

    pub async fn on_tick(&mut self, tick: PriceTick) -> TickOutcome {
        let mid = tick.mid();
        self.history.push(mid);

        if let BreakerState::Tripped { daily_pnl } = self.breaker.evaluate(tick.observed_at) {
            self.on_halted(tick.observed_at.date_naive(), daily_pnl);
            return TickOutcome::Halted { daily_pnl };
        }

        let history_len = self.history.len();
        let snapshot = self.indicators.snapshot(self.history.as_slice(), mid);
        let intent = match self.evaluator.evaluate(&tick, history_len, &snapshot) {
            Evaluation::Skip(reason) => return TickOutcome::Skipped(reason),
            Evaluation::Enter(intent) => intent,
        };

        self.act_on(intent, &snapshot).await
    }

    /// Entry path for an accepted signal: capacity gate, alert, order round trip,
    /// then trailing supervision for a fully protected trade.
    pub async fn act_on(&self, intent: TradeIntent, snapshot: &IndicatorSnapshot) -> TickOutcome {
        let open = self.ctx.registry.count_for(&self.instrument).await;
        if open >= self.max_open_trades {
            info!(
                "{}: {} signal ignored, {} trade(s) already open",
                self.instrument, intent.direction, open
            );
            return TickOutcome::AtCapacity { open };
        }

        self.ctx
            .notifier
            .notify(&signal_alert(&intent, snapshot))
            .await;

        match self.enter(&intent).await {
            Ok(outcome) => {
                if let ProtectionOutcome::Protected(trade) = &outcome {
                    self.ctx.trailing.spawn(trade);
                }
                TickOutcome::Entered(outcome)
            }
            Err(e) => {
                warn!("{}: entry abandoned: {}", self.instrument, e);
                TickOutcome::Abandoned
            }
        }
    }

    async fn enter(&self, intent: &TradeIntent) -> EngineResult<ProtectionOutcome> {
        let entry = self.executor.execute(intent).await?;
        self.protection.protect(entry).await
    }

    fn on_halted(&mut self, date: NaiveDate, daily_pnl: f64) {
        if self.halted_on == Some(date) {
            return;
        }
        self.halted_on = Some(date);
        error!(
            "⛔ {}: Daily loss limit reached ({:.2}), no new entries today",
            self.instrument, daily_pnl
        );
    }
}

fn signal_alert(intent: &TradeIntent, snapshot: &IndicatorSnapshot) -> String {
    let (icon, engulfing, momentum) = match intent.direction {
        TradeDirection::Buy => ("📈", snapshot.engulfing_up, snapshot.momentum_up),
        TradeDirection::Sell => ("📉", snapshot.engulfing_down, snapshot.momentum_down),
    };
    format!(
        "{} {}: {} Signal @ {} | RSI={:.2} | S/R: {} | Engulfing: {} | Momentum: {}",
        icon,
        intent.instrument,
        intent.direction,
        format_price(&intent.instrument, intent.entry_price),
        snapshot.rsi,
        snapshot.support_resistance,
        engulfing,
        momentum
    )
}

/// Builds one worker per configured instrument.
pub struct TradingEngine {
    config: EngineConfig,
    ctx: EngineContext,
}

impl TradingEngine {
    pub fn new(config: EngineConfig, ctx: EngineContext) -> Self {
        Self { config, ctx }
    }

    /// Spawns the workers and returns the router feeding them.
    pub fn start(&self) -> (crate::socket::TickRouter, Vec<tokio::task::JoinHandle<()>>) {
        let mut router = crate::socket::TickRouter::new();
        let mut handles = Vec::with_capacity(self.config.instruments.len());
        for instrument in &self.config.instruments {
            let rx = router.register(instrument);
            let worker = InstrumentWorker::new(instrument, &self.config, self.ctx.clone());
            handles.push(tokio::spawn(worker.run(rx)));
        }
        info!(
            "🚀 Starting multi-currency trading engine for: {} ({})",
            self.config.instruments.join(", "),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        (router, handles)
    }
}
