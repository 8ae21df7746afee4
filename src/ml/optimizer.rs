//! Adam (adaptive moment estimation) over flat parameter slices.

#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    moments: Vec<Moments>,
}

#[derive(Debug, Clone, Default)]
struct Moments {
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            moments: Vec::new(),
        }
    }

    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Applies one update. `params` and `grads` must list the same tensors in
    /// the same order on every call.
    pub fn step(&mut self, params: Vec<&mut [f64]>, grads: Vec<&[f64]>) {
        debug_assert_eq!(params.len(), grads.len());
        self.t += 1;

        if self.moments.len() < params.len() {
            self.moments.resize_with(params.len(), Moments::default);
        }

        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        for ((param, grad), moments) in params.into_iter().zip(grads).zip(&mut self.moments) {
            if moments.m.len() != param.len() {
                moments.m = vec![0.0; param.len()];
                moments.v = vec![0.0; param.len()];
            }

            for i in 0..param.len() {
                let g = grad[i];
                moments.m[i] = self.beta1 * moments.m[i] + (1.0 - self.beta1) * g;
                moments.v[i] = self.beta2 * moments.v[i] + (1.0 - self.beta2) * g * g;

                let m_hat = moments.m[i] / bias1;
                let v_hat = moments.v[i] / bias2;
                param[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.1);
        let mut w = vec![1.0, -1.0];
        adam.step(vec![w.as_mut_slice()], vec![&[0.5, -2.0][..]]);

        // Bias correction makes the first update lr * sign(g).
        assert!((w[0] - 0.9).abs() < 1e-6);
        assert!((w[1] + 0.9).abs() < 1e-6);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn minimises_quadratic() {
        let mut adam = Adam::new(0.05);
        let mut x = vec![3.0];
        for _ in 0..500 {
            let grad = vec![2.0 * (x[0] - 1.0)];
            adam.step(vec![x.as_mut_slice()], vec![grad.as_slice()]);
        }
        assert!((x[0] - 1.0).abs() < 5e-2);
    }
}
