use super::{Gradients, MovieRecommender};
use ndarray::{ArrayD, Zip};
use std::collections::HashMap;

pub trait Optimizer: Send + Sync {
    /// Applies one update to every model parameter using `grads`.
    fn step(&mut self, model: &mut MovieRecommender, grads: &Gradients);
    fn reset(&mut self);
}

#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, model: &mut MovieRecommender, grads: &Gradients) {
        let lr = self.learning_rate as f32;
        for ((_, mut param), (_, grad)) in model.named_parameters_mut().into_iter().zip(grads.named()) {
            param.scaled_add(-lr, &grad);
        }
    }

    fn reset(&mut self) {
        // SGD doesn't maintain state
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: HashMap<&'static str, ArrayD<f32>>,
    v: HashMap<&'static str, ArrayD<f32>>,
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }

    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self::new(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::with_learning_rate(0.001)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, model: &mut MovieRecommender, grads: &Gradients) {
        self.t += 1;

        let beta1 = self.beta1 as f32;
        let beta2 = self.beta2 as f32;
        let eps = self.epsilon as f32;
        let bias1 = 1.0 - beta1.powi(self.t);
        let bias2 = 1.0 - beta2.powi(self.t);
        let step_size = self.learning_rate as f32 / bias1;

        for ((key, mut param), (_, grad)) in model.named_parameters_mut().into_iter().zip(grads.named()) {
            let m = self.m.entry(key).or_insert_with(|| ArrayD::zeros(param.raw_dim()));
            let v = self.v.entry(key).or_insert_with(|| ArrayD::zeros(param.raw_dim()));

            Zip::from(&mut param)
                .and(m)
                .and(v)
                .and(&grad)
                .for_each(|p, m, v, &g| {
                    // biased first and second moment estimates
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let denom = (*v / bias2).sqrt() + eps;
                    *p -= step_size * *m / denom;
                });
        }
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m.clear();
        self.v.clear();
    }
}
