use ndarray::{Array1, Array2};
use rand::Rng;
use std::f32::consts::PI;

/// Draws one standard-normal sample with the Box-Muller transform.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    // u1 in (0, 1] keeps ln() finite
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn normal<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize, mean: f32, std_dev: f32) -> Array2<f32> {
    Array2::from_shape_simple_fn((rows, cols), || standard_normal(rng) * std_dev + mean)
}

pub fn uniform<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize, low: f32, high: f32) -> Array2<f32> {
    Array2::from_shape_simple_fn((rows, cols), || rng.gen_range(low..high))
}

pub fn uniform_vector<R: Rng + ?Sized>(rng: &mut R, size: usize, low: f32, high: f32) -> Array1<f32> {
    Array1::from_shape_simple_fn(size, || rng.gen_range(low..high))
}

pub fn xavier_uniform<R: Rng + ?Sized>(rng: &mut R, fan_in: usize, fan_out: usize) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    uniform(rng, fan_in, fan_out, -limit, limit)
}

#[derive(Debug, Clone)]
pub enum InitializationMethod {
    XavierUniform,
    /// U(-1/sqrt(fan_in), 1/sqrt(fan_in)), the usual dense-layer default.
    FanInUniform,
    Normal { mean: f32, std_dev: f32 },
    Uniform { low: f32, high: f32 },
    Zeros,
}

impl InitializationMethod {
    pub fn initialize_matrix<R: Rng + ?Sized>(&self, rng: &mut R, rows: usize, cols: usize) -> Array2<f32> {
        match self {
            InitializationMethod::XavierUniform => xavier_uniform(rng, rows, cols),
            InitializationMethod::FanInUniform => {
                let bound = 1.0 / (rows.max(1) as f32).sqrt();
                uniform(rng, rows, cols, -bound, bound)
            }
            InitializationMethod::Normal { mean, std_dev } => normal(rng, rows, cols, *mean, *std_dev),
            InitializationMethod::Uniform { low, high } => uniform(rng, rows, cols, *low, *high),
            InitializationMethod::Zeros => Array2::zeros((rows, cols)),
        }
    }
}
