//! 每日交易汇总
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::trading::model::instrument::format_price;
use crate::trading::model::TradeLogRecord;
use crate::trading::services::{Notifier, TradeLog};

fn price_cell(instrument: &str, price: Option<f64>) -> String {
    price
        .map(|p| format_price(instrument, p))
        .unwrap_or_else(|| "-".to_string())
}

/// Plain-text summary of the given records grouped by instrument.
/// `None` when there is nothing to report.
pub fn build_daily_summary(records: &[TradeLogRecord]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let mut by_instrument: BTreeMap<&str, Vec<&TradeLogRecord>> = BTreeMap::new();
    for record in records {
        by_instrument
            .entry(record.instrument.as_str())
            .or_default()
            .push(record);
    }

    let mut lines = vec!["📊 Daily Summary".to_string()];
    for (instrument, trades) in by_instrument {
        lines.push(format!("\n🔹 {}: {} trades", instrument, trades.len()));
        let mut total = 0.0;
        for t in &trades {
            total += t.realized_profit;
            lines.push(format!(
                "• Entry: {} | TP: {} | SL: {} | PnL: {:.2}",
                price_cell(instrument, t.entry_price),
                price_cell(instrument, t.take_profit),
                price_cell(instrument, t.stop_loss),
                t.realized_profit
            ));
        }
        lines.push(format!("💰 {} Total PnL: {:.2}", instrument, total));
    }
    Some(lines.join("\n"))
}

/// Reads the trade log for `date` and sends the summary. Returns whether a
/// message went out.
pub async fn send_daily_summary(
    trade_log: &dyn TradeLog,
    notifier: &dyn Notifier,
    date: NaiveDate,
) -> anyhow::Result<bool> {
    let records = trade_log.records_on(date)?;
    match build_daily_summary(&records) {
        Some(message) => {
            notifier.notify(&message).await;
            info!("daily summary sent for {} ({} records)", date, records.len());
            Ok(true)
        }
        None => {
            debug!("no trades on {}, daily summary skipped", date);
            Ok(false)
        }
    }
}

/// Registers the summary job on a fresh scheduler and starts it.
pub async fn start_daily_summary_job(
    cron: &str,
    trade_log: Arc<dyn TradeLog>,
    notifier: Arc<dyn Notifier>,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let trade_log = Arc::clone(&trade_log);
        let notifier = Arc::clone(&notifier);
        Box::pin(async move {
            let today = Utc::now().date_naive();
            if let Err(e) = send_daily_summary(trade_log.as_ref(), notifier.as_ref(), today).await {
                error!("daily summary failed: {}", e);
            }
        })
    })?;
    debug!("daily summary job created: {}", job.guid());
    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("daily summary scheduled with cron `{}` (UTC)", cron);
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::model::{TradeDirection, TradeOutcome};
    use chrono::TimeZone;

    fn record(instrument: &str, entry: f64, profit: f64) -> TradeLogRecord {
        TradeLogRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
            instrument: instrument.to_string(),
            trade_id: Some("42".to_string()),
            side: Some(TradeDirection::Buy),
            entry_price: Some(entry),
            stop_loss: Some(entry - 0.5),
            take_profit: Some(entry + 0.6),
            atr: Some(0.02),
            units: 100,
            realized_profit: profit,
            account_balance: None,
            outcome: TradeOutcome::from_realized(profit),
        }
    }

    #[test]
    fn nothing_to_report() {
        assert!(build_daily_summary(&[]).is_none());
    }

    #[test]
    fn groups_by_instrument_with_totals() {
        let records = vec![
            record("USD_JPY", 150.123, 12.5),
            record("EUR_JPY", 162.0, -3.0),
            record("USD_JPY", 150.5, -2.25),
        ];
        let msg = build_daily_summary(&records).unwrap();

        assert!(msg.contains("🔹 USD_JPY: 2 trades"));
        assert!(msg.contains("🔹 EUR_JPY: 1 trades"));
        assert!(msg.contains("💰 USD_JPY Total PnL: 10.25"));
        assert!(msg.contains("💰 EUR_JPY Total PnL: -3.00"));
        assert!(msg.contains("• Entry: 150.123 | TP: 150.723 | SL: 149.623 | PnL: 12.50"));
        // BTreeMap ordering
        assert!(msg.find("EUR_JPY").unwrap() < msg.find("USD_JPY").unwrap());
    }
}
