use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use url::Url;

use common::{Bar, Error, Interval, Result, Subscription};

const STREAM_BASE: &str = "wss://stream.binance.com:9443/ws";

/// Binance kline/candlestick WebSocket stream for one symbol and interval.
///
/// Parses kline events and publishes the closed ones as `Bar`s on a
/// broadcast channel. Reconnects automatically with exponential backoff.
pub struct KlineStream {
    subscription: Subscription,
    bar_tx: broadcast::Sender<Bar>,
}

impl KlineStream {
    pub fn new(subscription: Subscription, bar_tx: broadcast::Sender<Bar>) -> Self {
        Self {
            subscription,
            bar_tx,
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{STREAM_BASE}/{}@kline_{}",
            self.subscription.symbol.to_lowercase(),
            self.subscription.interval
        )
    }

    /// Run the stream loop forever, reconnecting on failure.
    /// Call this inside a `tokio::spawn`.
    pub async fn run(self) {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        let symbol = self.subscription.symbol.clone();
        let interval = self.subscription.interval;

        loop {
            info!(symbol = %symbol, interval = %interval, "Connecting to Binance kline stream");
            match self.connect_once().await {
                Ok(()) => {
                    info!(symbol = %symbol, interval = %interval, "Kline stream closed cleanly");
                    // Binance ends sessions after 24h
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(
                        symbol = %symbol,
                        interval = %interval,
                        error = %e,
                        backoff = ?backoff,
                        "Kline stream error, reconnecting"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_once(&self) -> Result<()> {
        let url = Url::parse(&self.url()).map_err(|e| Error::WebSocket(e.to_string()))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| Error::WebSocket(e.to_string()))?;

            if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                match parse_kline_event(&self.subscription.symbol, &text) {
                    Ok(Some(bar)) => {
                        debug!(
                            symbol = %bar.symbol,
                            interval = %bar.interval,
                            close = %bar.close,
                            "Kline closed"
                        );
                        // No active receivers is not an error
                        let _ = self.bar_tx.send(bar);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Failed to parse kline event");
                    }
                }
            }
        }

        Ok(())
    }
}

// ─── Binance kline JSON parsing ──────────────────────────────────────────────

#[derive(Deserialize)]
struct KlineWrapper {
    k: KlineData,
}

#[derive(Deserialize)]
struct KlineData {
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "q")]
    quote_volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
    #[serde(rename = "T")]
    close_time_ms: i64,
}

/// Parse one stream message. Returns `None` for non-kline messages and for
/// klines that are still open.
pub fn parse_kline_event(symbol: &str, text: &str) -> Result<Option<Bar>> {
    let wrapper: serde_json::Value = serde_json::from_str(text)?;
    if wrapper.get("e").and_then(|v| v.as_str()) != Some("kline") {
        return Ok(None);
    }

    let kline: KlineWrapper = serde_json::from_value(wrapper)?;
    let k = kline.k;
    if !k.is_closed {
        return Ok(None);
    }

    let closed_at: DateTime<Utc> = Utc
        .timestamp_millis_opt(k.close_time_ms)
        .single()
        .ok_or_else(|| Error::Other(format!("invalid kline close time {}", k.close_time_ms)))?;

    Ok(Some(Bar {
        symbol: symbol.to_string(),
        interval: Interval::from_str(&k.interval)?,
        open: decimal("o", &k.open)?,
        high: decimal("h", &k.high)?,
        low: decimal("l", &k.low)?,
        close: decimal("c", &k.close)?,
        base_volume: decimal("v", &k.volume)?,
        quote_volume: decimal("q", &k.quote_volume)?,
        closed_at,
    }))
}

fn decimal(field: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| Error::Other(format!("invalid kline field '{field}' = '{raw}': {e}")))
}
