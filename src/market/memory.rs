use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::client::PriceSource;
use super::series::PriceSeries;
use crate::error::Result;

/// Fixed in-memory prices, keyed by symbol. Unknown symbols yield an empty
/// series, the same way the provider answers for a delisted ticker.
#[derive(Default)]
pub struct StaticSource {
    series: DashMap<String, PriceSeries>,
    requests: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn insert(&self, series: PriceSeries) {
        self.series.insert(series.symbol.clone(), series);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PriceSource for StaticSource {
    /// Returns at most the last `days` points, mirroring a trailing window.
    async fn daily_closes(&self, symbol: &str, days: u32) -> Result<PriceSeries> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let Some(stored) = self.series.get(symbol) else {
            return Ok(PriceSeries::new(symbol));
        };

        let skip = stored.points.len().saturating_sub(days as usize);
        Ok(PriceSeries {
            symbol: stored.symbol.clone(),
            points: stored.points[skip..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn returns_trailing_window() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let closes: Vec<f64> = (0..10).map(f64::from).collect();
        let source = StaticSource::new().with_series(PriceSeries::from_closes("X", start, &closes));

        let series = source.daily_closes("X", 4).await.unwrap();
        assert_eq!(series.closes(), vec![6.0, 7.0, 8.0, 9.0]);

        let unknown = source.daily_closes("Y", 4).await.unwrap();
        assert!(unknown.is_empty());
        assert_eq!(source.request_count(), 2);
    }
}
