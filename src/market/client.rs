use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::{debug, warn};

use super::series::PriceSeries;
use crate::config::MarketConfig;
use crate::error::{ForecastError, Result};

/// Source of daily closing prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Daily closes for `symbol` covering the last `days` calendar days.
    async fn daily_closes(&self, symbol: &str, days: u32) -> Result<PriceSeries>;
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

/// Yahoo Finance chart API client.
#[derive(Clone)]
pub struct YahooClient {
    http_client: HttpClient,
    base_url: String,
    user_agent: String,
}

impl YahooClient {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }

    fn chart_url(&self, symbol: &str, days: u32, now: DateTime<Utc>) -> String {
        let start = now - Duration::days(i64::from(days));
        format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            self.base_url,
            symbol,
            start.timestamp(),
            now.timestamp()
        )
    }
}

#[async_trait]
impl PriceSource for YahooClient {
    async fn daily_closes(&self, symbol: &str, days: u32) -> Result<PriceSeries> {
        let url = self.chart_url(symbol, days, Utc::now());
        debug!("Fetching {} days of closes for {}", days, symbol);

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        // Unknown symbols come back as 404 with a chart.error body.
        let status = response.status();
        let body: ChartResponse = match response.json().await {
            Ok(body) => body,
            Err(e) if !status.is_success() => {
                return Err(ForecastError::Upstream(format!(
                    "provider returned {} for {}: {}",
                    status, symbol, e
                )))
            }
            Err(e) => return Err(e.into()),
        };

        parse_chart(symbol, body)
    }
}

fn parse_chart(symbol: &str, body: ChartResponse) -> Result<PriceSeries> {
    let mut series = PriceSeries::new(symbol);

    if let Some(error) = body.chart.error {
        warn!("Provider error for {}: {} - {}", symbol, error.code, error.description);
        return Ok(series);
    }

    let Some(data) = body.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(series);
    };
    let timestamps = data.timestamp.unwrap_or_default();
    let Some(quote) = data.indicators.quote.into_iter().next() else {
        return Ok(series);
    };

    for (ts, close) in timestamps.iter().zip(quote.close.iter()) {
        let (Some(close), Some(when)) = (close, DateTime::from_timestamp(*ts, 0)) else {
            continue;
        };
        series.push(when.date_naive(), *close);
    }

    debug!("Parsed {} closes for {}", series.len(), symbol);
    Ok(series)
}
