use thiserror::Error;

/// 引擎错误
///
/// Every fallible broker/feed/log operation returns this type. Callers decide what
/// to do from the variant: transient transport problems can be retried, everything
/// else fails the single operation and is reported.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Network / HTTP transport failure, timeouts, 5xx responses.
    #[error("transport error: {0}")]
    Transport(String),

    /// The broker answered but refused the request (4xx, reject transaction).
    #[error("broker rejected {operation}: {reason}")]
    BrokerRejected { operation: String, reason: String },

    /// A market order was submitted but no fill could be confirmed.
    #[error("fill not confirmed for {instrument}: {reason}")]
    FillNotConfirmed { instrument: String, reason: String },

    /// Stop-loss / take-profit could not be attached to a filled trade.
    #[error("protection setup failed for trade {trade_id}: {reason}")]
    ProtectionFailed { trade_id: String, reason: String },

    /// Unexpected payload shape from the broker or the price feed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The price feed refused our credentials. Not retried.
    #[error("feed authentication failed: {0}")]
    FeedAuthentication(String),

    #[error("trade log error: {0}")]
    TradeLog(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl EngineError {
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::BrokerRejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport(_))
    }

    /// Errors that must stop the process instead of looping forever.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::FeedAuthentication(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::MalformedPayload(err.to_string())
        } else {
            EngineError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::MalformedPayload(err.to_string())
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::TradeLog(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::TradeLog(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
