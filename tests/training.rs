use chrono::NaiveDate;
use std::sync::Arc;

use stock_forecast::config::Config;
use stock_forecast::market::{PriceSeries, StaticSource};
use stock_forecast::ml::{ForecastEngine, ModelCache, ModelStore, Trainer};
use stock_forecast::ForecastError;

fn config_in(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.model.dir = dir.join("models");
    config.model.hidden_size = 6;
    config.model.epochs = 3;
    config
}

fn series(symbol: &str, n: usize) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let closes: Vec<f64> = (0..n)
        .map(|i| 50.0 + (i as f64 * 0.2).cos() * 5.0 + i as f64 * 0.1)
        .collect();
    PriceSeries::from_closes(symbol, start, &closes)
}

#[tokio::test]
async fn short_history_fails_without_writing_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let source = Arc::new(StaticSource::new().with_series(series("SHRT", 64)));
    let trainer = Trainer::new(&config, source);

    let err = trainer.train("SHRT").await.unwrap_err();
    assert!(matches!(
        err,
        ForecastError::InsufficientData { required: 65, actual: 64, .. }
    ));
    assert!(!ModelStore::new(config.model.dir.clone()).path_for("SHRT").exists());
}

#[tokio::test]
async fn unknown_symbol_has_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let trainer = Trainer::new(&config, Arc::new(StaticSource::new()));

    assert!(matches!(
        trainer.train("GONE").await,
        Err(ForecastError::NoData { .. })
    ));
}

#[tokio::test]
async fn minimum_history_trains_on_one_window() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let source = Arc::new(StaticSource::new().with_series(series("EDGE", 65)));

    let report = Trainer::new(&config, source).train("EDGE").await.unwrap();
    assert_eq!(report.windows, 1);
    assert_eq!(report.epoch_losses.len(), 3);
    assert!(report.path.exists());
}

#[tokio::test]
async fn trained_model_serves_five_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let source = Arc::new(StaticSource::new().with_series(series("AAPL", 124)));

    let engine = ForecastEngine::new(&config, source.clone());
    let trainer = Trainer::new(&config, source).with_cache(engine.models());

    let report = trainer.train("AAPL").await.unwrap();
    assert_eq!(report.points, 124);
    assert_eq!(report.history.count, 124);
    assert!(report.history.min < report.history.mean && report.history.mean < report.history.max);
    assert_eq!(report.windows, 124 - 65 + 1);
    assert!(report.final_loss().unwrap().is_finite());

    let store = ModelStore::new(config.model.dir.clone());
    let artifact = store.load("AAPL").await.unwrap();
    assert_eq!(artifact.network.lookback, 60);
    assert_eq!(artifact.network.horizon, 5);
    assert_eq!(artifact.final_loss, report.final_loss());

    let forecast = engine.predict("AAPL").await.unwrap();
    assert_eq!(forecast.symbol, "AAPL");
    assert_eq!(forecast.predictions.len(), 5);
    assert!(forecast.predictions.iter().all(|p| p.is_finite()));
}

#[tokio::test]
async fn retraining_invalidates_cached_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    let source = Arc::new(StaticSource::new().with_series(series("IBM", 100)));

    let cache = Arc::new(ModelCache::new(ModelStore::new(config.model.dir.clone()), true));
    Trainer::new(&config, source.clone())
        .with_cache(cache.clone())
        .train("IBM")
        .await
        .unwrap();
    let first = cache.get("IBM").await.unwrap();
    assert_eq!(cache.len(), 1);

    config.model.seed = 99;
    Trainer::new(&config, source)
        .with_cache(cache.clone())
        .train("IBM")
        .await
        .unwrap();
    assert!(cache.is_empty());

    let second = cache.get("IBM").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}
