use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::api_trait::BrokerApi;
use super::dto::{
    parse_decimal, AccountSummaryResponse, ErrorBody, MarketOrderBody, OpenTradesResponse,
    OrderEnvelope, OrderResponse, PricingResponse, ProtectiveOrderBody, TradeOrdersBody,
    TransactionResponse, TransactionsResponse,
};
use crate::app_config::OandaConfig;
use crate::error::{EngineError, EngineResult};
use crate::trading::model::{
    FillPage, MarketOrderRequest, OrderFill, OrderSubmission, ProtectiveOrderRequest, Quote,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn auth_headers(access_token: &str) -> EngineResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
        .map_err(|e| EngineError::Config(format!("invalid access token: {}", e)))?;
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// OANDA v20 REST client
pub struct OandaClient {
    client: Client,
    config: OandaConfig,
}

impl OandaClient {
    pub fn new(config: OandaConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .default_headers(auth_headers(&config.access_token)?)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> EngineResult<Self> {
        Self::new(OandaConfig::from_env()?)
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/accounts/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.account_id,
            path
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> EngineResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("oanda {} -> {}: {}", operation, status, body);

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }
        let err = status_error(operation, status, body);
        warn!("oanda {} failed: {}", operation, err);
        Err(err)
    }
}

/// 5xx and 429 are transient and end up as `Transport`; any other non-success
/// status is a broker rejection of this single request.
fn status_error(operation: &str, status: StatusCode, body: String) -> EngineError {
    let reason = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|e| e.error_message)
        .unwrap_or(body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        EngineError::Transport(format!("{} {}: {}", operation, status, reason))
    } else {
        EngineError::rejected(operation, format!("{}: {}", status, reason))
    }
}

#[async_trait]
impl BrokerApi for OandaClient {
    async fn place_market_order(&self, order: &MarketOrderRequest) -> EngineResult<OrderSubmission> {
        let body = OrderEnvelope {
            order: MarketOrderBody::from(order),
        };
        let request = self.client.post(self.account_url("orders")).json(&body);
        let response: OrderResponse = self.send("market_order", request).await?;

        let fill = match response.order_fill_transaction {
            Some(tx) => tx.into_fill()?,
            None => None,
        };
        if fill.is_none() && response.order_cancel_transaction.is_some() {
            warn!("{}: market order cancelled by broker", order.instrument);
        }
        Ok(OrderSubmission {
            last_transaction_id: response.last_transaction_id,
            fill,
        })
    }

    async fn transaction(&self, transaction_id: &str) -> EngineResult<Option<OrderFill>> {
        let request = self
            .client
            .get(self.account_url(&format!("transactions/{}", transaction_id)));
        let response: TransactionResponse = self.send("transaction", request).await?;
        response.transaction.into_fill()
    }

    async fn place_protective_order(&self, order: &ProtectiveOrderRequest) -> EngineResult<()> {
        if order.replace_existing {
            let request = self
                .client
                .put(self.account_url(&format!("trades/{}/orders", order.trade_id)))
                .json(&TradeOrdersBody::from(order));
            let _: serde_json::Value = self.send("replace_trade_order", request).await?;
            return Ok(());
        }

        let body = OrderEnvelope {
            order: ProtectiveOrderBody::from(order),
        };
        let request = self.client.post(self.account_url("orders")).json(&body);
        let response: OrderResponse = self.send("protective_order", request).await?;
        if response.order_create_transaction.is_none() {
            return Err(EngineError::rejected(
                "protective_order",
                "no orderCreateTransaction in response",
            ));
        }
        Ok(())
    }

    async fn open_trade_ids(&self) -> EngineResult<HashSet<String>> {
        let request = self.client.get(self.account_url("openTrades"));
        let response: OpenTradesResponse = self.send("open_trades", request).await?;
        Ok(response.trades.into_iter().map(|t| t.id).collect())
    }

    async fn fills_since(&self, since: Option<&str>) -> EngineResult<FillPage> {
        let Some(since) = since else {
            let request = self.client.get(self.account_url("summary"));
            let summary: AccountSummaryResponse = self.send("account_summary", request).await?;
            return Ok(FillPage {
                fills: Vec::new(),
                last_transaction_id: summary.last_transaction_id,
            });
        };

        let request = self
            .client
            .get(self.account_url("transactions/sinceid"))
            .query(&[("id", since), ("type", "ORDER_FILL")]);
        let response: TransactionsResponse = self.send("transactions_since", request).await?;

        let mut fills = Vec::new();
        for tx in response.transactions {
            if let Some(fill) = tx.into_fill()? {
                fills.push(fill);
            }
        }
        let last_transaction_id = response
            .last_transaction_id
            .or_else(|| fills.last().map(|f| f.transaction_id.clone()));
        Ok(FillPage {
            fills,
            last_transaction_id,
        })
    }

    async fn pricing(&self, instrument: &str) -> EngineResult<Quote> {
        let request = self
            .client
            .get(self.account_url("pricing"))
            .query(&[("instruments", instrument)]);
        let response: PricingResponse = self.send("pricing", request).await?;
        response
            .prices
            .first()
            .ok_or_else(|| EngineError::MalformedPayload(format!("no price for {}", instrument)))?
            .quote()
    }

    async fn account_balance(&self) -> EngineResult<f64> {
        let request = self.client.get(self.account_url("summary"));
        let summary: AccountSummaryResponse = self.send("account_summary", request).await?;
        parse_decimal("balance", &summary.account.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every connection with the same status line and body.
    async fn stub_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/v3", addr)
    }

    fn client(api_url: String) -> OandaClient {
        OandaClient::new(OandaConfig {
            api_url,
            stream_url: "http://127.0.0.1:1/v3".to_string(),
            access_token: "token".to_string(),
            account_id: "101-001-1-001".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let url = stub_server("503 Service Unavailable", "Service Unavailable").await;
        let err = client(url).transaction("6410").await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let url = stub_server("429 Too Many Requests", "{}").await;
        let err = client(url).open_trade_ids().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        let url = stub_server(
            "400 Bad Request",
            r#"{"errorMessage":"Invalid value specified for 'units'"}"#,
        )
        .await;
        let err = client(url).transaction("6410").await.unwrap_err();
        assert_eq!(
            err,
            EngineError::rejected(
                "transaction",
                "400 Bad Request: Invalid value specified for 'units'"
            )
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn plain_text_body_is_kept_as_reason() {
        let err = status_error("pricing", StatusCode::BAD_GATEWAY, "upstream down".to_string());
        assert_eq!(
            err,
            EngineError::Transport("pricing 502 Bad Gateway: upstream down".to_string())
        );
    }
}
