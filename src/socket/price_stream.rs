//! 行情流
//!
//! `StreamSupervisor` keeps one streaming connection alive for every configured
//! instrument and fans ticks out to the per-instrument workers. Any read failure
//! ends the session; a new one is opened after a fixed backoff with no gap
//! filling. Only rejected credentials stop the loop.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::app_config::OandaConfig;
use crate::error::{EngineError, EngineResult};
use crate::trading::model::PriceTick;
use crate::trading::oanda::dto::ClientPriceDto;
use crate::trading::oanda::oanda_client::auth_headers;

pub type TickStream = Pin<Box<dyn Stream<Item = EngineResult<PriceTick>> + Send>>;

/// A reconnectable source of price ticks.
///
/// Stream items: `Ok` ticks, `Err(MalformedPayload)` for lines that could not be
/// decoded (skipped), any other `Err` ends the session.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn connect(&self, instruments: &[String]) -> EngineResult<TickStream>;
}

/// OANDA v20 pricing stream: newline-delimited JSON over a chunked response.
pub struct OandaPriceFeed {
    client: Client,
    config: OandaConfig,
}

impl OandaPriceFeed {
    pub fn new(config: OandaConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .default_headers(auth_headers(&config.access_token)?)
            .build()?;
        Ok(Self { client, config })
    }
}

/// Decodes one stream line. Heartbeats decode to `None`.
pub fn parse_price_line(line: &str) -> EngineResult<Option<PriceTick>> {
    let dto: ClientPriceDto = serde_json::from_str(line)?;
    if dto.is_heartbeat() {
        return Ok(None);
    }
    let instrument = dto
        .instrument
        .clone()
        .ok_or_else(|| EngineError::MalformedPayload("price without instrument".to_string()))?;
    let quote = dto.quote()?;
    Ok(Some(PriceTick::new(
        instrument,
        quote.bid,
        quote.ask,
        dto.time.unwrap_or_else(Utc::now),
    )))
}

/// Splits a byte stream into lines, keeping partial lines across chunks.
fn lines<S, B>(bytes: S) -> impl Stream<Item = EngineResult<String>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
{
    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buf, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line).trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    return Some((Ok(text), (bytes, buf, false)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => return Some((Err(EngineError::from(e)), (bytes, buf, true))),
                    None => return None,
                }
            }
        },
    )
}

#[async_trait]
impl PriceFeed for OandaPriceFeed {
    async fn connect(&self, instruments: &[String]) -> EngineResult<TickStream> {
        let url = format!(
            "{}/accounts/{}/pricing/stream",
            self.config.stream_url.trim_end_matches('/'),
            self.config.account_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[("instruments", instruments.join(","))])
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                return Err(EngineError::FeedAuthentication(body));
            }
            status if !status.is_success() => {
                return Err(EngineError::Transport(format!("price stream status {}", status)));
            }
            _ => {}
        }

        let ticks = lines(Box::pin(response.bytes_stream())).filter_map(|line| async move {
            match line {
                Ok(line) => parse_price_line(&line).transpose(),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(ticks))
    }
}

/// Per-instrument dispatch into capacity-1 channels.
///
/// A tick that finds its worker's slot occupied is dropped: the worker is busy
/// with an order round trip and will read the latest price again afterwards.
pub struct TickRouter {
    senders: HashMap<String, mpsc::Sender<PriceTick>>,
    dropped: AtomicU64,
}

impl TickRouter {
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Registers an instrument and returns the worker's receiving end.
    pub fn register(&mut self, instrument: &str) -> mpsc::Receiver<PriceTick> {
        let (tx, rx) = mpsc::channel(1);
        self.senders.insert(instrument.to_string(), tx);
        rx
    }

    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.senders.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn dispatch(&self, tick: PriceTick) -> bool {
        let Some(sender) = self.senders.get(&tick.instrument) else {
            debug!("tick for unrouted instrument {}", tick.instrument);
            return false;
        };
        match sender.try_send(tick) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(tick)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("{}: worker busy, tick dropped", tick.instrument);
                false
            }
            Err(mpsc::error::TrySendError::Closed(tick)) => {
                warn!("{}: worker gone, tick dropped", tick.instrument);
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for TickRouter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StreamSupervisor {
    feed: Arc<dyn PriceFeed>,
    backoff: Duration,
}

impl StreamSupervisor {
    pub fn new(feed: Arc<dyn PriceFeed>, backoff: Duration) -> Self {
        Self { feed, backoff }
    }

    /// Runs until shutdown (`Ok`) or a fatal feed error (`Err`).
    pub async fn run(
        &self,
        router: &TickRouter,
        mut shutdown: watch::Receiver<bool>,
    ) -> EngineResult<()> {
        let instruments = router.instruments();
        let mut session: u64 = 0;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            session += 1;

            let connected = tokio::select! {
                res = self.feed.connect(&instruments) => res,
                _ = shutdown.changed() => return Ok(()),
            };

            match connected {
                Ok(mut ticks) => {
                    info!("📡 price stream session {} connected: {}", session, instruments.join(","));
                    loop {
                        tokio::select! {
                            item = ticks.next() => match item {
                                Some(Ok(tick)) => {
                                    router.dispatch(tick);
                                }
                                Some(Err(EngineError::MalformedPayload(msg))) => {
                                    debug!("dropping malformed stream line: {}", msg);
                                }
                                Some(Err(e)) => {
                                    warn!("price stream error: {}", e);
                                    break;
                                }
                                None => {
                                    warn!("price stream ended");
                                    break;
                                }
                            },
                            _ = shutdown.changed() => return Ok(()),
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("price stream authentication failed, giving up: {}", e);
                    return Err(e);
                }
                Err(e) => warn!("price stream connect failed: {}", e),
            }

            info!("reconnecting price stream in {:?}", self.backoff);
            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_price_and_heartbeat_lines() {
        let price = r#"{"type":"PRICE","time":"2024-03-04T10:00:00.000000000Z","bids":[{"price":"1.10495","liquidity":1000000}],"asks":[{"price":"1.10505","liquidity":1000000}],"instrument":"EUR_USD"}"#;
        let tick = parse_price_line(price).unwrap().unwrap();
        assert_eq!(tick.instrument, "EUR_USD");
        assert_eq!(tick.bid, 1.10495);
        assert_eq!(tick.ask, 1.10505);

        let heartbeat = r#"{"type":"HEARTBEAT","time":"2024-03-04T10:00:05.000000000Z"}"#;
        assert!(parse_price_line(heartbeat).unwrap().is_none());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_price_line("{not json"),
            Err(EngineError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_price_line(r#"{"type":"PRICE","instrument":"EUR_USD","bids":[],"asks":[]}"#),
            Err(EngineError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn full_slot_drops_tick() {
        let mut router = TickRouter::new();
        let mut rx = router.register("EUR_USD");
        let tick = PriceTick::new("EUR_USD", 1.1, 1.1001, Utc::now());

        assert!(router.dispatch(tick.clone()));
        assert!(!router.dispatch(tick.clone()));
        assert_eq!(router.dropped(), 1);

        assert_eq!(rx.recv().await.unwrap(), tick);
        assert!(router.dispatch(tick));
    }
}
