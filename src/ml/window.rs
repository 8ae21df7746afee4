/// One supervised example: `lookback` inputs followed by `horizon` targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub input: Vec<f64>,
    pub target: Vec<f64>,
}

/// Every contiguous input/target pair in `series`, oldest first.
pub fn build_windows(series: &[f64], lookback: usize, horizon: usize) -> Vec<Window> {
    let span = lookback + horizon;
    if series.len() < span {
        return Vec::new();
    }

    series
        .windows(span)
        .map(|w| Window {
            input: w[..lookback].to_vec(),
            target: w[lookback..].to_vec(),
        })
        .collect()
}

/// Smallest series length that yields at least one window.
pub fn min_points(lookback: usize, horizon: usize) -> usize {
    lookback + horizon
}
