use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use super::window::Window;
use crate::error::{ForecastError, Result};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn glorot_uniform<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> DMatrix<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    DMatrix::from_fn(rows, cols, |_, _| dist.sample(rng))
}

/// One LSTM layer. Gate blocks are stacked in the order
/// input, forget, cell candidate, output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,
    pub w: DMatrix<f64>,
    pub u: DMatrix<f64>,
    pub b: DVector<f64>,
}

/// Values from one forward step kept for backpropagation.
#[derive(Debug, Clone)]
struct StepCache {
    x: DVector<f64>,
    h_prev: DVector<f64>,
    c_prev: DVector<f64>,
    i: DVector<f64>,
    f: DVector<f64>,
    g: DVector<f64>,
    o: DVector<f64>,
    tanh_c: DVector<f64>,
}

#[derive(Debug, Clone)]
struct LayerTrace {
    hidden: Vec<DVector<f64>>,
    steps: Vec<StepCache>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LstmGrads {
    pub w: DMatrix<f64>,
    pub u: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl LstmLayer {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let gates = 4 * hidden_size;
        let mut b = DVector::<f64>::zeros(gates);
        b.rows_mut(hidden_size, hidden_size).fill(1.0);

        Self {
            input_size,
            hidden_size,
            w: glorot_uniform(gates, input_size, rng),
            u: glorot_uniform(gates, hidden_size, rng),
            b,
        }
    }

    fn step(
        &self,
        x: &DVector<f64>,
        h_prev: &DVector<f64>,
        c_prev: &DVector<f64>,
    ) -> (DVector<f64>, DVector<f64>, StepCache) {
        let hs = self.hidden_size;
        let z = &self.w * x + &self.u * h_prev + &self.b;

        let i = z.rows(0, hs).map(sigmoid);
        let f = z.rows(hs, hs).map(sigmoid);
        let g = z.rows(2 * hs, hs).map(f64::tanh);
        let o = z.rows(3 * hs, hs).map(sigmoid);

        let c = f.component_mul(c_prev) + i.component_mul(&g);
        let tanh_c = c.map(f64::tanh);
        let h = o.component_mul(&tanh_c);

        let cache = StepCache {
            x: x.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            tanh_c,
        };
        (h, c, cache)
    }

    fn forward_sequence(&self, inputs: &[DVector<f64>]) -> LayerTrace {
        let mut h = DVector::zeros(self.hidden_size);
        let mut c = DVector::zeros(self.hidden_size);
        let mut hidden = Vec::with_capacity(inputs.len());
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let (h_next, c_next, cache) = self.step(x, &h, &c);
            hidden.push(h_next.clone());
            steps.push(cache);
            h = h_next;
            c = c_next;
        }

        LayerTrace { hidden, steps }
    }

    /// Backpropagation through time. `d_hidden[t]` is the loss gradient with
    /// respect to the hidden state emitted at step `t`.
    fn backward(
        &self,
        trace: &LayerTrace,
        d_hidden: &[DVector<f64>],
    ) -> (LstmGrads, Vec<DVector<f64>>) {
        let hs = self.hidden_size;
        let mut grads = LstmGrads::zeros(self);
        let mut d_inputs = vec![DVector::<f64>::zeros(self.input_size); trace.steps.len()];
        let mut dh_next = DVector::<f64>::zeros(hs);
        let mut dc_next = DVector::<f64>::zeros(hs);

        for t in (0..trace.steps.len()).rev() {
            let s = &trace.steps[t];
            let dh = &d_hidden[t] + &dh_next;

            let d_o = dh.component_mul(&s.tanh_c);
            let dc = &dc_next
                + dh.component_mul(&s.o)
                    .component_mul(&s.tanh_c.map(|v| 1.0 - v * v));
            let d_i = dc.component_mul(&s.g);
            let d_g = dc.component_mul(&s.i);
            let d_f = dc.component_mul(&s.c_prev);
            dc_next = dc.component_mul(&s.f);

            let mut dz = DVector::<f64>::zeros(4 * hs);
            dz.rows_mut(0, hs)
                .copy_from(&d_i.component_mul(&s.i.map(|v| v * (1.0 - v))));
            dz.rows_mut(hs, hs)
                .copy_from(&d_f.component_mul(&s.f.map(|v| v * (1.0 - v))));
            dz.rows_mut(2 * hs, hs)
                .copy_from(&d_g.component_mul(&s.g.map(|v| 1.0 - v * v)));
            dz.rows_mut(3 * hs, hs)
                .copy_from(&d_o.component_mul(&s.o.map(|v| v * (1.0 - v))));

            grads.w += &dz * s.x.transpose();
            grads.u += &dz * s.h_prev.transpose();
            grads.b += &dz;

            d_inputs[t] = self.w.tr_mul(&dz);
            dh_next = self.u.tr_mul(&dz);
        }

        (grads, d_inputs)
    }
}

impl LstmGrads {
    fn zeros(layer: &LstmLayer) -> Self {
        Self {
            w: DMatrix::zeros(layer.w.nrows(), layer.w.ncols()),
            u: DMatrix::zeros(layer.u.nrows(), layer.u.ncols()),
            b: DVector::zeros(layer.b.len()),
        }
    }

    fn accumulate(&mut self, other: &LstmGrads) {
        self.w += &other.w;
        self.u += &other.u;
        self.b += &other.b;
    }
}

/// Fully connected projection from the last hidden state to the forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub w: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl Dense {
    pub fn new<R: Rng>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        Self {
            w: glorot_uniform(output_size, input_size, rng),
            b: DVector::zeros(output_size),
        }
    }

    pub fn forward(&self, h: &DVector<f64>) -> DVector<f64> {
        &self.w * h + &self.b
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkGrads {
    pub layers: Vec<LstmGrads>,
    pub head_w: DMatrix<f64>,
    pub head_b: DVector<f64>,
}

impl NetworkGrads {
    fn zeros(network: &LstmNetwork) -> Self {
        Self {
            layers: network.layers.iter().map(LstmGrads::zeros).collect(),
            head_w: DMatrix::zeros(network.head.w.nrows(), network.head.w.ncols()),
            head_b: DVector::zeros(network.head.b.len()),
        }
    }

    /// Flat views in the same order as [`LstmNetwork::params_mut`].
    pub fn slices(&self) -> Vec<&[f64]> {
        let mut slices = Vec::with_capacity(self.layers.len() * 3 + 2);
        for layer in &self.layers {
            slices.push(layer.w.as_slice());
            slices.push(layer.u.as_slice());
            slices.push(layer.b.as_slice());
        }
        slices.push(self.head_w.as_slice());
        slices.push(self.head_b.as_slice());
        slices
    }
}

/// Stacked LSTM layers followed by a dense head. The first layers feed their
/// whole hidden sequence upward; the head sees only the final hidden state of
/// the top layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmNetwork {
    pub lookback: usize,
    pub horizon: usize,
    pub layers: Vec<LstmLayer>,
    pub head: Dense,
}

struct NetworkTrace {
    layers: Vec<LayerTrace>,
    output: DVector<f64>,
}

impl LstmNetwork {
    pub fn new<R: Rng>(lookback: usize, hidden_size: usize, horizon: usize, rng: &mut R) -> Self {
        Self::with_depth(lookback, hidden_size, horizon, 2, rng)
    }

    fn with_depth<R: Rng>(
        lookback: usize,
        hidden_size: usize,
        horizon: usize,
        depth: usize,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::with_capacity(depth);
        layers.push(LstmLayer::new(1, hidden_size, rng));
        for _ in 1..depth {
            layers.push(LstmLayer::new(hidden_size, hidden_size, rng));
        }

        Self {
            lookback,
            horizon,
            layers,
            head: Dense::new(hidden_size, horizon, rng),
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.head.w.ncols()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.w.len() + l.u.len() + l.b.len())
            .sum::<usize>()
            + self.head.w.len()
            + self.head.b.len()
    }

    /// Checks that stored shapes agree with each other.
    pub fn check_shapes(&self) -> Result<()> {
        let Some(first) = self.layers.first() else {
            return Err(ForecastError::Model("network has no recurrent layers".to_string()));
        };
        if first.input_size != 1 {
            return Err(ForecastError::Model(format!(
                "first layer expects {} features, prices have 1",
                first.input_size
            )));
        }

        let mut expected_input = 1;
        for (idx, layer) in self.layers.iter().enumerate() {
            let gates = 4 * layer.hidden_size;
            let ok = layer.input_size == expected_input
                && layer.w.shape() == (gates, layer.input_size)
                && layer.u.shape() == (gates, layer.hidden_size)
                && layer.b.len() == gates;
            if !ok {
                return Err(ForecastError::Model(format!(
                    "layer {} has inconsistent weight shapes",
                    idx
                )));
            }
            expected_input = layer.hidden_size;
        }

        if self.head.w.shape() != (self.horizon, expected_input)
            || self.head.b.len() != self.horizon
        {
            return Err(ForecastError::Model("dense head does not match horizon".to_string()));
        }
        Ok(())
    }

    fn trace(&self, window: &[f64]) -> NetworkTrace {
        let mut inputs: Vec<DVector<f64>> = window
            .iter()
            .map(|&v| DVector::from_element(1, v))
            .collect();
        let mut layers = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let trace = layer.forward_sequence(&inputs);
            inputs = trace.hidden.clone();
            layers.push(trace);
        }

        let last = inputs
            .last()
            .cloned()
            .unwrap_or_else(|| DVector::zeros(self.hidden_size()));
        let output = self.head.forward(&last);
        NetworkTrace { layers, output }
    }

    /// Runs one scaled window through the network.
    pub fn forward(&self, window: &[f64]) -> Result<Vec<f64>> {
        if window.len() != self.lookback {
            return Err(ForecastError::Model(format!(
                "expected a window of {} values, got {}",
                self.lookback,
                window.len()
            )));
        }

        let output = self.trace(window).output;
        if output.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::Model("network produced a non-finite value".to_string()));
        }
        Ok(output.iter().copied().collect())
    }

    fn backward(&self, trace: &NetworkTrace, d_output: &DVector<f64>) -> NetworkGrads {
        let mut grads = NetworkGrads::zeros(self);

        let top = trace.layers.last().and_then(|t| t.hidden.last());
        let steps = trace.layers.last().map_or(0, |t| t.hidden.len());
        if let Some(h_last) = top {
            grads.head_w = d_output * h_last.transpose();
        }
        grads.head_b = d_output.clone();

        let mut d_hidden = vec![DVector::<f64>::zeros(self.hidden_size()); steps];
        if let Some(last) = d_hidden.last_mut() {
            *last = self.head.w.tr_mul(d_output);
        }

        for (idx, layer) in self.layers.iter().enumerate().rev() {
            let (layer_grads, d_inputs) = layer.backward(&trace.layers[idx], &d_hidden);
            grads.layers[idx] = layer_grads;
            d_hidden = d_inputs;
        }

        grads
    }

    /// Mean squared error over a batch and its gradient with respect to every
    /// parameter.
    pub fn loss_and_grads(&self, batch: &[&Window]) -> (f64, NetworkGrads) {
        let mut total = NetworkGrads::zeros(self);
        if batch.is_empty() {
            return (0.0, total);
        }

        let scale = 1.0 / (batch.len() * self.horizon) as f64;
        let mut loss = 0.0;

        for window in batch {
            let trace = self.trace(&window.input);
            let target = DVector::from_column_slice(&window.target);
            let diff = &trace.output - target;

            loss += diff.norm_squared() * scale;
            let d_output = diff * (2.0 * scale);
            let grads = self.backward(&trace, &d_output);

            for (acc, layer) in total.layers.iter_mut().zip(&grads.layers) {
                acc.accumulate(layer);
            }
            total.head_w += &grads.head_w;
            total.head_b += &grads.head_b;
        }

        (loss, total)
    }

    /// Flat mutable views of every parameter tensor, in a stable order.
    pub fn params_mut(&mut self) -> Vec<&mut [f64]> {
        let mut params = Vec::with_capacity(self.layers.len() * 3 + 2);
        for layer in &mut self.layers {
            params.push(layer.w.as_mut_slice());
            params.push(layer.u.as_mut_slice());
            params.push(layer.b.as_mut_slice());
        }
        params.push(self.head.w.as_mut_slice());
        params.push(self.head.b.as_mut_slice());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_network() -> LstmNetwork {
        let mut rng = StdRng::seed_from_u64(7);
        LstmNetwork::new(6, 3, 2, &mut rng)
    }

    fn sample_window() -> Window {
        Window {
            input: vec![0.1, 0.4, 0.35, 0.8, 0.6, 0.9],
            target: vec![0.7, 0.2],
        }
    }

    fn batch_loss(network: &LstmNetwork, windows: &[Window]) -> f64 {
        let refs: Vec<&Window> = windows.iter().collect();
        network.loss_and_grads(&refs).0
    }

    #[test]
    fn forget_gate_bias_starts_at_one() {
        let network = small_network();
        let b = &network.layers[0].b;
        assert_eq!(b.len(), 12);
        assert!(b.rows(0, 3).iter().all(|&v| v == 0.0));
        assert!(b.rows(3, 3).iter().all(|&v| v == 1.0));
        assert!(b.rows(6, 6).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn forward_checks_window_length() {
        let network = small_network();
        assert_eq!(network.forward(&[0.5; 6]).unwrap().len(), 2);
        assert!(matches!(network.forward(&[0.5; 5]), Err(ForecastError::Model(_))));
    }

    #[test]
    fn shapes_are_consistent() {
        let network = small_network();
        network.check_shapes().unwrap();
        assert_eq!(network.hidden_size(), 3);
        // two layers: 4*3*(1+3+1) + 4*3*(3+3+1), head 2*3 + 2
        assert_eq!(network.parameter_count(), 60 + 84 + 8);

        let mut broken = network.clone();
        broken.head.b = DVector::zeros(3);
        assert!(broken.check_shapes().is_err());
    }

    #[test]
    fn zero_weight_head_outputs_bias() {
        let mut network = small_network();
        network.head.w.fill(0.0);
        network.head.b = DVector::from_vec(vec![0.25, 0.75]);
        assert_eq!(network.forward(&[0.3; 6]).unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let network = small_network();
        let windows = vec![
            sample_window(),
            Window {
                input: vec![0.9, 0.8, 0.5, 0.4, 0.2, 0.1],
                target: vec![0.05, 0.0],
            },
        ];
        let refs: Vec<&Window> = windows.iter().collect();
        let (_, grads) = network.loss_and_grads(&refs);
        let analytic: Vec<Vec<f64>> = grads.slices().into_iter().map(|s| s.to_vec()).collect();

        let eps = 1e-6;
        let tensor_count = analytic.len();
        for tensor in 0..tensor_count {
            let len = analytic[tensor].len();
            for idx in 0..len {
                let mut plus = network.clone();
                plus.params_mut()[tensor][idx] += eps;
                let mut minus = network.clone();
                minus.params_mut()[tensor][idx] -= eps;

                let numeric =
                    (batch_loss(&plus, &windows) - batch_loss(&minus, &windows)) / (2.0 * eps);
                let exact = analytic[tensor][idx];
                let tolerance = 1e-6 + 1e-4 * numeric.abs().max(exact.abs());
                assert!(
                    (numeric - exact).abs() < tolerance,
                    "tensor {} index {}: numeric {} vs analytic {}",
                    tensor,
                    idx,
                    numeric,
                    exact
                );
            }
        }
    }

    #[test]
    fn serde_round_trip_preserves_outputs() {
        let network = small_network();
        let json = serde_json::to_string(&network).unwrap();
        let restored: LstmNetwork = serde_json::from_str(&json).unwrap();
        let before = network.forward(&[0.2; 6]).unwrap();
        let after = restored.forward(&[0.2; 6]).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
