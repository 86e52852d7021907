use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::app_config::{EngineConfig, OandaConfig, ShutdownConfig, ShutdownManager};
use crate::socket::{OandaPriceFeed, PriceFeed, StreamSupervisor};
use crate::trading::oanda::{BrokerApi, OandaClient};
use crate::trading::risk::ClosedTradeMonitor;
use crate::trading::services::notification::notifier_from_env;
use crate::trading::services::{CsvTradeLog, TradeLog};
use crate::trading::task::{start_daily_summary_job, EngineContext, TradingEngine};

/// Command-line overrides on top of the environment
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub instruments: Option<Vec<String>>,
    pub trade_log: Option<String>,
}

/// 加载配置: environment first, then CLI overrides, then validation.
pub fn load_config(options: &RunOptions) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::from_env();
    if let Some(instruments) = &options.instruments {
        config.instruments = instruments.clone();
    }
    if let Some(path) = &options.trade_log {
        config.trade_log_path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

/// 应用入口总编排: wires the collaborators, starts every loop and waits for a
/// signal or a fatal feed error. Open positions are left to their broker-side
/// SL/TP on exit.
pub async fn run(options: RunOptions) -> anyhow::Result<()> {
    let config = load_config(&options)?;
    let oanda = OandaConfig::from_env()?;

    let broker: Arc<dyn BrokerApi> = Arc::new(OandaClient::new(oanda.clone())?);
    let feed: Arc<dyn PriceFeed> = Arc::new(OandaPriceFeed::new(oanda)?);
    let notifier = notifier_from_env();
    let trade_log: Arc<dyn TradeLog> = Arc::new(CsvTradeLog::new(&config.trade_log_path));
    info!("trade log at {}", config.trade_log_path);

    let ctx = EngineContext::new(
        &config,
        Arc::clone(&broker),
        Arc::clone(&notifier),
        Arc::clone(&trade_log),
    );
    let engine = TradingEngine::new(config.clone(), ctx.clone());
    let (router, workers) = engine.start();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let monitor = ClosedTradeMonitor::new(
        broker,
        ctx.registry.clone(),
        Arc::clone(&notifier),
        Arc::clone(&trade_log),
        config.monitor.clone(),
    );
    let monitor_handle = tokio::spawn(monitor.run(shutdown_rx.clone()));

    let scheduler = start_daily_summary_job(
        &config.monitor.daily_summary_cron,
        trade_log,
        Arc::clone(&notifier),
    )
    .await
    .map_err(|e| anyhow!("初始化任务调度器失败: {}", e))?;

    let supervisor = StreamSupervisor::new(feed, config.monitor.reconnect_backoff);
    let feed_rx = shutdown_rx.clone();
    // the router moves into the feed task; dropping it ends the workers
    let mut feed_handle = tokio::spawn(async move { supervisor.run(&router, feed_rx).await });

    notifier
        .notify(&format!(
            "🚀 Starting multi-currency trading bot for: {}",
            config.instruments.join(", ")
        ))
        .await;

    let shutdown_manager = ShutdownManager::new(ShutdownConfig::default());
    {
        let tx = Arc::clone(&shutdown_tx);
        shutdown_manager
            .register_shutdown_hook("price_stream", move || {
                let tx = Arc::clone(&tx);
                async move {
                    let _ = tx.send(true);
                    Ok(())
                }
            })
            .await;
    }
    {
        let trailing = Arc::clone(&ctx.trailing);
        shutdown_manager
            .register_shutdown_hook("trailing_stops", move || {
                let trailing = Arc::clone(&trailing);
                async move {
                    trailing.shutdown();
                    Ok(())
                }
            })
            .await;
    }
    {
        let scheduler = scheduler.clone();
        shutdown_manager
            .register_shutdown_hook("scheduler", move || {
                let mut scheduler = scheduler.clone();
                async move {
                    scheduler
                        .shutdown()
                        .await
                        .map_err(|e| anyhow!("scheduler shutdown failed: {}", e))
                }
            })
            .await;
    }

    let fatal = tokio::select! {
        signal = ShutdownManager::wait_for_shutdown_signal() => {
            info!("接收到 {} 信号，开始优雅关闭...", signal?);
            None
        }
        res = &mut feed_handle => match res {
            Ok(Ok(())) => {
                warn!("price stream stopped without a shutdown request");
                None
            }
            Ok(Err(e)) => Some(anyhow!(e)),
            Err(e) => Some(anyhow!("price stream task failed: {}", e)),
        },
    };

    if let Some(e) = &fatal {
        error!("fatal: {}", e);
        notifier.notify(&format!("🛑 Trading engine stopping: {}", e)).await;
    }

    if let Err(e) = shutdown_manager.shutdown().await {
        error!("优雅关闭失败: {}", e);
    }

    let drain = async {
        if !feed_handle.is_finished() {
            let _ = (&mut feed_handle).await;
        }
        let _ = monitor_handle.await;
        join_all(workers).await;
    };
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        warn!("background tasks did not stop in time");
    }

    match fatal {
        Some(e) => Err(e),
        None => {
            info!("trading engine stopped");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win_over_environment() {
        let options = RunOptions {
            instruments: Some(vec!["EUR_JPY".to_string(), "GBP_JPY".to_string()]),
            trade_log: Some("/tmp/fx_trades.csv".to_string()),
        };
        let config = load_config(&options).unwrap();
        assert_eq!(config.instruments, vec!["EUR_JPY", "GBP_JPY"]);
        assert_eq!(config.trade_log_path, "/tmp/fx_trades.csv");
    }

    #[test]
    fn empty_override_fails_validation() {
        let options = RunOptions {
            instruments: Some(vec![]),
            trade_log: None,
        };
        assert!(load_config(&options).is_err());
    }
}
