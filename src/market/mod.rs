pub mod client;
pub mod memory;
pub mod series;

pub use client::{PriceSource, YahooClient};
pub use memory::StaticSource;
pub use series::{validate_symbol, PricePoint, PriceSeries, SeriesSummary};
