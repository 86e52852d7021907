//! OANDA v20 wire types. Decimal values arrive as strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::trading::model::instrument::format_price;
use crate::trading::model::{
    MarketOrderRequest, OrderFill, PositionFill, ProtectiveOrderKind, ProtectiveOrderRequest,
    Quote, TradeClose,
};

pub(crate) fn parse_decimal(field: &str, raw: &str) -> EngineResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| EngineError::MalformedPayload(format!("{}: not a number: {:?}", field, raw)))
}

fn parse_optional(field: &str, raw: &Option<String>) -> EngineResult<f64> {
    match raw {
        Some(v) => parse_decimal(field, v),
        None => Ok(0.0),
    }
}

#[derive(Debug, Serialize)]
pub struct OrderEnvelope<T> {
    pub order: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOrderBody {
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub instrument: String,
    pub units: String,
    pub time_in_force: &'static str,
    pub position_fill: PositionFill,
}

impl From<&MarketOrderRequest> for MarketOrderBody {
    fn from(req: &MarketOrderRequest) -> Self {
        Self {
            order_type: "MARKET",
            instrument: req.instrument.clone(),
            units: req.units.to_string(),
            time_in_force: "FOK",
            position_fill: req.position_fill,
        }
    }
}

/// Protective order created through `POST /orders`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectiveOrderBody {
    #[serde(rename = "type")]
    pub order_type: ProtectiveOrderKind,
    #[serde(rename = "tradeID")]
    pub trade_id: String,
    pub price: String,
    pub time_in_force: &'static str,
    pub trigger_condition: &'static str,
}

impl From<&ProtectiveOrderRequest> for ProtectiveOrderBody {
    fn from(req: &ProtectiveOrderRequest) -> Self {
        Self {
            order_type: req.kind,
            trade_id: req.trade_id.clone(),
            price: format_price(&req.instrument, req.price),
            time_in_force: "GTC",
            trigger_condition: "DEFAULT",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceDetails {
    pub price: String,
    pub time_in_force: &'static str,
}

/// Replaces the SL or TP of an existing trade through `PUT /trades/{id}/orders`
#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrdersBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<PriceDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<PriceDetails>,
}

impl From<&ProtectiveOrderRequest> for TradeOrdersBody {
    fn from(req: &ProtectiveOrderRequest) -> Self {
        let details = PriceDetails {
            price: format_price(&req.instrument, req.price),
            time_in_force: "GTC",
        };
        match req.kind {
            ProtectiveOrderKind::TakeProfit => Self {
                take_profit: Some(details),
                ..Default::default()
            },
            ProtectiveOrderKind::StopLoss => Self {
                stop_loss: Some(details),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TradeOpenedDto {
    #[serde(rename = "tradeID")]
    pub trade_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeClosedDto {
    #[serde(rename = "tradeID")]
    pub trade_id: String,
    #[serde(rename = "realizedPL")]
    pub realized_pl: Option<String>,
}

/// Generic transaction; only ORDER_FILL carries the fill fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub instrument: Option<String>,
    pub units: Option<String>,
    pub price: Option<String>,
    pub pl: Option<String>,
    pub account_balance: Option<String>,
    pub trade_opened: Option<TradeOpenedDto>,
    #[serde(default)]
    pub trades_closed: Vec<TradeClosedDto>,
    pub trade_reduced: Option<TradeClosedDto>,
    pub time: Option<DateTime<Utc>>,
}

impl TransactionDto {
    pub fn is_fill(&self) -> bool {
        self.tx_type == "ORDER_FILL"
    }

    pub fn into_fill(self) -> EngineResult<Option<OrderFill>> {
        if !self.is_fill() {
            return Ok(None);
        }
        let units = match &self.units {
            Some(u) => parse_decimal("units", u)? as i64,
            None => 0,
        };
        let mut trades_closed = Vec::with_capacity(self.trades_closed.len());
        for closed in self.trades_closed {
            trades_closed.push(TradeClose {
                realized_pl: parse_optional("realizedPL", &closed.realized_pl)?,
                trade_id: closed.trade_id,
            });
        }
        let trade_reduced = match self.trade_reduced {
            Some(reduced) => Some(TradeClose {
                realized_pl: parse_optional("realizedPL", &reduced.realized_pl)?,
                trade_id: reduced.trade_id,
            }),
            None => None,
        };
        Ok(Some(OrderFill {
            price: parse_optional("price", &self.price)?,
            pl: parse_optional("pl", &self.pl)?,
            account_balance: parse_optional("accountBalance", &self.account_balance)?,
            transaction_id: self.id,
            instrument: self.instrument.unwrap_or_default(),
            units,
            trade_opened: self.trade_opened.map(|t| t.trade_id),
            trades_closed,
            trade_reduced,
            time: self.time,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_create_transaction: Option<serde_json::Value>,
    pub order_fill_transaction: Option<TransactionDto>,
    pub order_cancel_transaction: Option<serde_json::Value>,
    #[serde(rename = "lastTransactionID")]
    pub last_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionResponse {
    pub transaction: TransactionDto,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsResponse {
    #[serde(default)]
    pub transactions: Vec<TransactionDto>,
    #[serde(rename = "lastTransactionID")]
    pub last_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenTradeDto {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenTradesResponse {
    #[serde(default)]
    pub trades: Vec<OpenTradeDto>,
}

#[derive(Debug, Deserialize)]
pub struct AccountSummaryDto {
    pub balance: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountSummaryResponse {
    pub account: AccountSummaryDto,
    #[serde(rename = "lastTransactionID")]
    pub last_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriceBucketDto {
    pub price: String,
}

/// Pricing entry, shared by the REST pricing endpoint and the stream.
#[derive(Debug, Deserialize)]
pub struct ClientPriceDto {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub instrument: Option<String>,
    #[serde(default)]
    pub bids: Vec<PriceBucketDto>,
    #[serde(default)]
    pub asks: Vec<PriceBucketDto>,
    pub time: Option<DateTime<Utc>>,
}

impl ClientPriceDto {
    pub fn is_heartbeat(&self) -> bool {
        self.msg_type.as_deref() == Some("HEARTBEAT")
    }

    pub fn quote(&self) -> EngineResult<Quote> {
        let bid = self
            .bids
            .first()
            .ok_or_else(|| EngineError::MalformedPayload("price without bids".to_string()))?;
        let ask = self
            .asks
            .first()
            .ok_or_else(|| EngineError::MalformedPayload("price without asks".to_string()))?;
        Ok(Quote {
            bid: parse_decimal("bid", &bid.price)?,
            ask: parse_decimal("ask", &ask.price)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PricingResponse {
    #[serde(default)]
    pub prices: Vec<ClientPriceDto>,
}
