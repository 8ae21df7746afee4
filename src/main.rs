use anyhow::Result;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{error, info, warn};

use stock_forecast::config::Config;
use stock_forecast::market::{PriceSource, YahooClient};
use stock_forecast::ml::{ForecastEngine, Trainer};
use stock_forecast::web::{ApiServer, AppState};

#[derive(Parser)]
#[command(name = "stock-forecast")]
#[command(about = "Train LSTM closing-price forecasters and serve their predictions over HTTP")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download history, fit a model and save it under the model directory
    Train {
        /// Ticker to train; repeat the flag to train several
        #[arg(short, long = "symbol", default_value = "AAPL")]
        symbols: Vec<String>,

        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Serve predictions from previously trained models
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    let source: Arc<dyn PriceSource> = Arc::new(YahooClient::new(&config.market)?);

    match cli.command {
        Command::Train { symbols, epochs } => {
            if let Some(epochs) = epochs {
                if epochs == 0 {
                    anyhow::bail!("--epochs must be positive");
                }
                config.model.epochs = epochs;
            }
            train(&config, source, &symbols).await
        }
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, source).await
        }
    }
}

async fn train(config: &Config, source: Arc<dyn PriceSource>, symbols: &[String]) -> Result<()> {
    let trainer = Trainer::new(config, source);
    let mut failures = 0;

    for symbol in symbols {
        match trainer.train(symbol).await {
            Ok(report) => info!(
                "{}: {} points, {} windows, final loss {:.6}, saved to {}",
                report.symbol,
                report.points,
                report.windows,
                report.final_loss().unwrap_or(f64::NAN),
                report.path.display()
            ),
            Err(e) => {
                error!("Training {} failed: {}", symbol, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} training runs failed", failures, symbols.len());
    }
    Ok(())
}

async fn serve(config: Config, source: Arc<dyn PriceSource>) -> Result<()> {
    info!("Starting stock forecast server");

    let engine = Arc::new(ForecastEngine::new(&config, source));
    let mut state = AppState::new(engine);

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("Metrics exporter unavailable: {}", e),
    }

    ApiServer::new(config.server.clone(), state).start().await
}
