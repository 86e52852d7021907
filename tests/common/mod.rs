#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use rust_fx::app_config::EngineConfig;
use rust_fx::error::{EngineError, EngineResult};
use rust_fx::trading::model::{
    FillPage, MarketOrderRequest, OrderFill, OrderSubmission, ProtectiveOrderKind,
    ProtectiveOrderRequest, Quote, TradeLogRecord,
};
use rust_fx::trading::oanda::BrokerApi;
use rust_fx::trading::order::{OrderExecutor, ProtectionManager};
use rust_fx::trading::risk::TrailingStopManager;
use rust_fx::trading::services::{Notifier, TradeLog};
use rust_fx::trading::strategy::RiskSizer;
use rust_fx::trading::task::EngineContext;

/// Scripted broker. Every request is recorded; behaviour is switched through
/// the public knobs.
pub struct MockBroker {
    pub market_orders: Mutex<Vec<MarketOrderRequest>>,
    pub protective_orders: Mutex<Vec<ProtectiveOrderRequest>>,
    pub fill_price: Mutex<f64>,
    pub reject_orders: AtomicBool,
    /// fill only reachable through `transaction()`
    pub deferred_fill: AtomicBool,
    /// no fill is ever reported
    pub withhold_fill: AtomicBool,
    pub take_profit_failures: AtomicUsize,
    pub stop_loss_failures: AtomicUsize,
    /// consumed front to back, the last quote sticks
    pub quotes: Mutex<VecDeque<Quote>>,
    pub pricing_fails: AtomicBool,
    pub open_trades: Mutex<HashSet<String>>,
    /// newly opened trades show up in `open_trade_ids`
    pub report_open: AtomicBool,
    pub fill_pages: Mutex<VecDeque<FillPage>>,
    pub balance: Mutex<Option<f64>>,
    /// next `transaction()` calls fail with a transient error
    pub transaction_failures: AtomicUsize,
    /// every `transaction()` call is refused
    pub reject_transactions: AtomicBool,
    pub transaction_calls: AtomicUsize,
    transactions: Mutex<HashMap<String, OrderFill>>,
    next_id: AtomicU64,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            market_orders: Mutex::new(Vec::new()),
            protective_orders: Mutex::new(Vec::new()),
            fill_price: Mutex::new(1.10500),
            reject_orders: AtomicBool::new(false),
            deferred_fill: AtomicBool::new(false),
            withhold_fill: AtomicBool::new(false),
            take_profit_failures: AtomicUsize::new(0),
            stop_loss_failures: AtomicUsize::new(0),
            quotes: Mutex::new(VecDeque::from(vec![Quote {
                bid: 1.10550,
                ask: 1.10570,
            }])),
            pricing_fails: AtomicBool::new(false),
            open_trades: Mutex::new(HashSet::new()),
            report_open: AtomicBool::new(true),
            fill_pages: Mutex::new(VecDeque::new()),
            balance: Mutex::new(Some(10_000.0)),
            transaction_failures: AtomicUsize::new(0),
            reject_transactions: AtomicBool::new(false),
            transaction_calls: AtomicUsize::new(0),
            transactions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(100),
        }
    }

    pub fn set_quotes(&self, quotes: Vec<Quote>) {
        *self.quotes.lock().unwrap() = quotes.into();
    }

    pub fn push_fill_page(&self, page: FillPage) {
        self.fill_pages.lock().unwrap().push_back(page);
    }

    pub fn market_orders(&self) -> Vec<MarketOrderRequest> {
        self.market_orders.lock().unwrap().clone()
    }

    pub fn protective_orders(&self) -> Vec<ProtectiveOrderRequest> {
        self.protective_orders.lock().unwrap().clone()
    }

    pub fn stop_loss_orders(&self) -> Vec<ProtectiveOrderRequest> {
        self.protective_orders()
            .into_iter()
            .filter(|o| o.kind == ProtectiveOrderKind::StopLoss)
            .collect()
    }

    pub fn take_profit_orders(&self) -> Vec<ProtectiveOrderRequest> {
        self.protective_orders()
            .into_iter()
            .filter(|o| o.kind == ProtectiveOrderKind::TakeProfit)
            .collect()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BrokerApi for MockBroker {
    async fn place_market_order(&self, order: &MarketOrderRequest) -> EngineResult<OrderSubmission> {
        self.market_orders.lock().unwrap().push(order.clone());
        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(EngineError::rejected("place market order", "INSUFFICIENT_MARGIN"));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = n.to_string();
        let tx_id = (n + 1000).to_string();
        if self.withhold_fill.load(Ordering::SeqCst) {
            return Ok(OrderSubmission {
                last_transaction_id: Some(tx_id),
                fill: None,
            });
        }

        let fill = OrderFill {
            transaction_id: tx_id.clone(),
            instrument: order.instrument.clone(),
            units: order.units,
            price: *self.fill_price.lock().unwrap(),
            pl: 0.0,
            account_balance: self.balance.lock().unwrap().unwrap_or(0.0),
            trade_opened: Some(id.clone()),
            trades_closed: Vec::new(),
            trade_reduced: None,
            time: Some(Utc::now()),
        };
        if self.report_open.load(Ordering::SeqCst) {
            self.open_trades.lock().unwrap().insert(id);
        }

        if self.deferred_fill.load(Ordering::SeqCst) {
            self.transactions.lock().unwrap().insert(tx_id.clone(), fill);
            return Ok(OrderSubmission {
                last_transaction_id: Some(tx_id),
                fill: None,
            });
        }
        Ok(OrderSubmission {
            last_transaction_id: Some(tx_id),
            fill: Some(fill),
        })
    }

    async fn transaction(&self, transaction_id: &str) -> EngineResult<Option<OrderFill>> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_transactions.load(Ordering::SeqCst) {
            return Err(EngineError::rejected("transaction", "404 Not Found"));
        }
        if Self::take_failure(&self.transaction_failures) {
            return Err(EngineError::Transport(
                "transaction 503 Service Unavailable".to_string(),
            ));
        }
        Ok(self.transactions.lock().unwrap().get(transaction_id).cloned())
    }

    async fn place_protective_order(&self, order: &ProtectiveOrderRequest) -> EngineResult<()> {
        self.protective_orders.lock().unwrap().push(order.clone());
        let failures = match order.kind {
            ProtectiveOrderKind::TakeProfit => &self.take_profit_failures,
            ProtectiveOrderKind::StopLoss => &self.stop_loss_failures,
        };
        if Self::take_failure(failures) {
            return Err(EngineError::rejected(
                "place protective order",
                "PRICE_DISTANCE_MINIMUM_NOT_MET",
            ));
        }
        Ok(())
    }

    async fn open_trade_ids(&self) -> EngineResult<HashSet<String>> {
        Ok(self.open_trades.lock().unwrap().clone())
    }

    async fn fills_since(&self, _since: Option<&str>) -> EngineResult<FillPage> {
        Ok(self.fill_pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn pricing(&self, _instrument: &str) -> EngineResult<Quote> {
        if self.pricing_fails.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("pricing timed out".to_string()));
        }
        let mut quotes = self.quotes.lock().unwrap();
        let quote = if quotes.len() > 1 {
            quotes.pop_front()
        } else {
            quotes.front().copied()
        };
        quote.ok_or_else(|| EngineError::Transport("no quote".to_string()))
    }

    async fn account_balance(&self) -> EngineResult<f64> {
        self.balance
            .lock()
            .unwrap()
            .ok_or_else(|| EngineError::Transport("summary unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages().iter().filter(|m| m.contains(needle)).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct MemoryTradeLog {
    records: Mutex<Vec<TradeLogRecord>>,
}

impl MemoryTradeLog {
    pub fn with_records(records: Vec<TradeLogRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl TradeLog for MemoryTradeLog {
    fn append(&self, record: &TradeLogRecord) -> EngineResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn records(&self) -> EngineResult<Vec<TradeLogRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Production parameters with every wait shrunk to a millisecond.
pub fn fast_config(instruments: &[&str]) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.instruments = instruments.iter().map(|s| s.to_string()).collect();

    let ms = Duration::from_millis(1);
    config.protection.fill_poll_delay = ms;
    config.protection.settle_timeout = Duration::from_millis(5);
    config.protection.settle_poll = ms;
    config.protection.sl_retry_delay = ms;
    config.protection.presence_check_delay = ms;
    config.trailing.poll_interval = ms;
    config.monitor.reconnect_backoff = Duration::from_millis(5);
    config.monitor.closed_trade_poll = ms;
    config
}

/// Mock collaborators wired the way the engine wires the real ones.
pub struct Harness {
    pub config: EngineConfig,
    pub broker: Arc<MockBroker>,
    pub notifier: Arc<RecordingNotifier>,
    pub trade_log: Arc<MemoryTradeLog>,
    pub ctx: EngineContext,
}

impl Harness {
    pub fn new(instruments: &[&str]) -> Self {
        Self::with_log(instruments, MemoryTradeLog::default())
    }

    pub fn with_log(instruments: &[&str], log: MemoryTradeLog) -> Self {
        let config = fast_config(instruments);
        let broker = Arc::new(MockBroker::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let trade_log = Arc::new(log);
        let ctx = EngineContext::new(
            &config,
            broker.clone(),
            notifier.clone(),
            trade_log.clone(),
        );
        Self {
            config,
            broker,
            notifier,
            trade_log,
            ctx,
        }
    }

    pub fn sizer(&self) -> RiskSizer {
        RiskSizer::new(self.config.risk.clone())
    }

    pub fn executor(&self) -> OrderExecutor {
        OrderExecutor::new(
            self.broker.clone(),
            self.notifier.clone(),
            self.sizer(),
            self.config.protection.clone(),
        )
    }

    pub fn protection(&self) -> ProtectionManager {
        ProtectionManager::new(
            self.broker.clone(),
            self.notifier.clone(),
            self.ctx.registry.clone(),
            self.trade_log.clone(),
            self.sizer(),
            self.config.protection.clone(),
        )
    }

    pub fn trailing_manager(&self) -> TrailingStopManager {
        TrailingStopManager::new(
            self.broker.clone(),
            self.ctx.registry.clone(),
            self.notifier.clone(),
            self.config.trailing.clone(),
        )
    }
}
