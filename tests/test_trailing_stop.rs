mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::Harness;
use rust_fx::trading::model::{ActiveTrade, PositionFill, Quote, TradeDirection};
use rust_fx::trading::risk::{TrailStep, TrailingStopSupervisor};

fn usd_jpy_trade(trade_id: &str, direction: TradeDirection) -> ActiveTrade {
    let sign = direction.sign();
    ActiveTrade {
        trade_id: trade_id.to_string(),
        instrument: "USD_JPY".to_string(),
        direction,
        entry_price: 150.000,
        stop_loss: 150.000 - sign * 0.1,
        take_profit: 150.000 + sign * 0.2,
        units: 1000,
        opened_at: Utc::now(),
        partial_closed: false,
        last_trail_stop: None,
        provisional: false,
    }
}

fn flat(price: f64) -> Quote {
    Quote {
        bid: price,
        ask: price,
    }
}

#[tokio::test]
async fn long_stop_only_moves_up() {
    let h = Harness::new(&["USD_JPY"]);
    h.ctx
        .registry
        .insert(usd_jpy_trade("7", TradeDirection::Buy))
        .await;
    h.broker.set_quotes(vec![
        flat(150.006),
        flat(150.005),
        flat(150.008),
        flat(150.004),
        flat(150.011),
    ]);
    let manager = h.trailing_manager();

    let mut steps = Vec::new();
    for _ in 0..5 {
        steps.push(manager.poll_once("USD_JPY", "7").await.unwrap());
    }
    assert_eq!(
        steps,
        vec![
            TrailStep::Continue,
            TrailStep::Continue,
            TrailStep::Continue,
            TrailStep::Continue,
            TrailStep::Closed
        ]
    );

    let stops: Vec<f64> = h.broker.stop_loss_orders().iter().map(|o| o.price).collect();
    assert_eq!(stops, vec![150.001, 150.004, 150.006]);
    assert!(stops.windows(2).all(|w| w[1] > w[0]));
    assert!(h.broker.stop_loss_orders().iter().all(|o| o.replace_existing));

    let tps = h.broker.take_profit_orders();
    assert_eq!(tps.len(), 1);
    assert_eq!(tps[0].price, 150.010);

    let orders = h.broker.market_orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].units, -500);
    assert_eq!(orders[0].position_fill, PositionFill::ReduceOnly);
    assert_eq!(orders[1].units, -500);
    assert_eq!(orders[1].position_fill, PositionFill::Default);

    let trade = h.ctx.registry.get("USD_JPY", "7").await.unwrap();
    assert!(trade.partial_closed);
    assert_eq!(trade.units, 500);
    assert_eq!(trade.last_trail_stop, Some(150.006));
}

#[tokio::test]
async fn short_stop_only_moves_down() {
    let h = Harness::new(&["USD_JPY"]);
    h.ctx
        .registry
        .insert(usd_jpy_trade("8", TradeDirection::Sell))
        .await;
    h.broker
        .set_quotes(vec![flat(149.994), flat(149.997), flat(149.993)]);
    let manager = h.trailing_manager();

    for _ in 0..3 {
        assert_eq!(
            manager.poll_once("USD_JPY", "8").await.unwrap(),
            TrailStep::Continue
        );
    }

    let stops: Vec<f64> = h.broker.stop_loss_orders().iter().map(|o| o.price).collect();
    assert_eq!(stops, vec![149.999, 149.996, 149.995]);
    assert!(stops.windows(2).all(|w| w[1] < w[0]));
    assert_eq!(h.broker.market_orders()[0].units, 500);
}

#[tokio::test]
async fn partial_close_happens_once() {
    let h = Harness::new(&["USD_JPY"]);
    h.ctx
        .registry
        .insert(usd_jpy_trade("9", TradeDirection::Buy))
        .await;
    h.broker.set_quotes(vec![flat(150.006)]);
    let manager = h.trailing_manager();

    for _ in 0..4 {
        manager.poll_once("USD_JPY", "9").await.unwrap();
    }
    assert_eq!(h.broker.market_orders().len(), 1);
    // same price every poll: one breakeven move, one trail move
    assert_eq!(h.broker.stop_loss_orders().len(), 2);
    assert_eq!(h.notifier.count_containing("SL trailed to"), 1);
}

#[tokio::test]
async fn below_trigger_nothing_happens() {
    let h = Harness::new(&["USD_JPY"]);
    h.ctx
        .registry
        .insert(usd_jpy_trade("10", TradeDirection::Buy))
        .await;
    h.broker.set_quotes(vec![flat(150.003)]);

    let step = h.trailing_manager().poll_once("USD_JPY", "10").await.unwrap();
    assert_eq!(step, TrailStep::Continue);
    assert!(h.broker.market_orders().is_empty());
    assert!(h.broker.protective_orders().is_empty());
}

#[tokio::test]
async fn unregistered_trade_ends_supervision() {
    let h = Harness::new(&["USD_JPY"]);
    let step = h.trailing_manager().poll_once("USD_JPY", "404").await.unwrap();
    assert_eq!(step, TrailStep::Gone);
}

#[tokio::test]
async fn pricing_errors_do_not_stop_the_task() {
    let h = Harness::new(&["USD_JPY"]);
    let trade = usd_jpy_trade("11", TradeDirection::Buy);
    h.ctx.registry.insert(trade.clone()).await;
    h.broker
        .pricing_fails
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let supervisor = TrailingStopSupervisor::new(Arc::new(h.trailing_manager()));
    assert!(supervisor.spawn(&trade));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(supervisor.active_trade_ids(), vec!["11".to_string()]);

    h.broker.set_quotes(vec![flat(150.012)]);
    h.broker
        .pricing_fails
        .store(false, std::sync::atomic::Ordering::SeqCst);

    let finished = tokio::time::timeout(Duration::from_secs(2), async {
        while !supervisor.active_trade_ids().is_empty() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(finished.is_ok(), "trailing task never closed the trade");
    assert_eq!(h.broker.market_orders().len(), 1);
}

#[tokio::test]
async fn supervisor_lists_and_cancels_tasks() {
    let h = Harness::new(&["USD_JPY"]);
    h.broker.set_quotes(vec![flat(150.000)]);
    let a = usd_jpy_trade("21", TradeDirection::Buy);
    let b = usd_jpy_trade("22", TradeDirection::Sell);
    h.ctx.registry.insert(a.clone()).await;
    h.ctx.registry.insert(b.clone()).await;

    let supervisor = TrailingStopSupervisor::new(Arc::new(h.trailing_manager()));
    assert!(supervisor.spawn(&a));
    assert!(supervisor.spawn(&b));
    assert!(!supervisor.spawn(&a));
    assert_eq!(
        supervisor.active_trade_ids(),
        vec!["21".to_string(), "22".to_string()]
    );

    assert!(supervisor.cancel("21"));
    assert!(!supervisor.cancel("21"));
    assert_eq!(supervisor.shutdown(), 1);
    assert!(supervisor.active_trade_ids().is_empty());
    // positions are left alone
    assert!(h.broker.market_orders().is_empty());
}
