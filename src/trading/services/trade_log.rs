//! 交易日志: append-only record of entries and closures.
//!
//! Also read back by the circuit breaker and the daily summary, so every query
//! goes through the same file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::time_util::utc_date;
use crate::trading::model::TradeLogRecord;

pub trait TradeLog: Send + Sync {
    fn append(&self, record: &TradeLogRecord) -> EngineResult<()>;

    fn records(&self) -> EngineResult<Vec<TradeLogRecord>>;

    fn records_on(&self, date: NaiveDate) -> EngineResult<Vec<TradeLogRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| utc_date(r.timestamp) == date)
            .collect())
    }

    /// Sum of realized profit booked on `date`
    fn realized_on(&self, date: NaiveDate) -> EngineResult<f64> {
        Ok(self
            .records_on(date)?
            .iter()
            .map(|r| r.realized_profit)
            .sum())
    }
}

/// CSV file with a header row. Writes and reads are serialized by a mutex.
pub struct CsvTradeLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvTradeLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> EngineResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| EngineError::TradeLog("trade log lock poisoned".to_string()))
    }
}

impl TradeLog for CsvTradeLog {
    fn append(&self, record: &TradeLogRecord) -> EngineResult<()> {
        let _guard = self.guard()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    fn records(&self) -> EngineResult<Vec<TradeLogRecord>> {
        let _guard = self.guard()?;
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<TradeLogRecord>().enumerate() {
            match row {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping trade log row {}: {}", line + 2, e),
            }
        }
        Ok(records)
    }
}
