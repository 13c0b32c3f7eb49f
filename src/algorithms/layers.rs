//! Dense building blocks for the scoring network.
//!
//! Each layer exposes an explicit `forward` and a `backward` that turns the
//! upstream gradient into parameter gradients plus the gradient w.r.t. its input.

use crate::error::{RecResult, RecommenderError};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

/// Lookup table mapping dense indices to learned vectors.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub weight: Array2<f32>,
    name: &'static str,
}

impl Embedding {
    pub fn new(name: &'static str, weight: Array2<f32>) -> Self {
        Self { weight, name }
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight.nrows()
    }

    pub fn dim(&self) -> usize {
        self.weight.ncols()
    }

    /// Gathers one row per index. Any index past the table is a hard error.
    pub fn forward(&self, indices: &[usize]) -> RecResult<Array2<f32>> {
        let size = self.num_embeddings();
        if let Some(&bad) = indices.iter().find(|&&i| i >= size) {
            return Err(RecommenderError::IndexOutOfRange {
                table: self.name,
                index: bad,
                size,
            });
        }
        Ok(self.weight.select(Axis(0), indices))
    }

    /// Scatter-adds row gradients back into a table-shaped gradient.
    pub fn backward(&self, indices: &[usize], grad_out: ArrayView2<f32>) -> Array2<f32> {
        let mut grad = Array2::zeros(self.weight.raw_dim());
        for (row, &idx) in grad_out.outer_iter().zip(indices) {
            let mut target = grad.row_mut(idx);
            target += &row;
        }
        grad
    }
}

/// Fully connected layer, `y = x W + b` with `W` stored as `(in, out)`.
#[derive(Debug, Clone)]
pub struct Linear {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

pub struct LinearGrad {
    pub input: Array2<f32>,
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Self {
        debug_assert_eq!(weight.ncols(), bias.len());
        Self { weight, bias }
    }

    pub fn in_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn out_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weight) + &self.bias
    }

    pub fn backward(&self, x: &Array2<f32>, grad_out: &Array2<f32>) -> LinearGrad {
        LinearGrad {
            input: grad_out.dot(&self.weight.t()),
            weight: x.t().dot(grad_out),
            bias: grad_out.sum_axis(Axis(0)),
        }
    }
}

/// Inverted dropout: survivors are scaled by `1 / (1 - p)` so evaluation is the identity.
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> RecResult<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(RecommenderError::InvalidConfig(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }
        Ok(Self { p })
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    /// Samples a scaled keep-mask shaped like `x`.
    pub fn sample_mask<R: Rng + ?Sized>(&self, rng: &mut R, x: &Array2<f32>) -> Array2<f32> {
        let scale = 1.0 / (1.0 - self.p);
        Array2::from_shape_simple_fn(x.raw_dim(), || {
            if rng.gen::<f32>() < self.p {
                0.0
            } else {
                scale
            }
        })
    }
}

pub fn relu(x: &Array2<f32>) -> Array2<f32> {
    x.mapv(|v| v.max(0.0))
}

/// Gradient of ReLU given the pre-activation values.
pub fn relu_backward(pre_activation: &Array2<f32>, grad_out: &Array2<f32>) -> Array2<f32> {
    let mut grad = grad_out.clone();
    grad.zip_mut_with(pre_activation, |g, &z| {
        if z <= 0.0 {
            *g = 0.0;
        }
    });
    grad
}
