pub mod initializer;
pub mod layers;
pub mod optimizer;
pub mod ranker;

use crate::error::{RecResult, RecommenderError};
use crate::utils::sigmoid;
use initializer::InitializationMethod;
use layers::{relu, relu_backward, Dropout, Embedding, Linear};
use ndarray::{concatenate, s, Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

pub const HIDDEN_DIM_1: usize = 128;
pub const HIDDEN_DIM_2: usize = 64;
pub const DROPOUT_P: f32 = 0.2;

/// Anything that can produce affinity scores for `(user_index, movie_index)` pairs.
pub trait AffinityScorer: Send + Sync {
    fn num_users(&self) -> usize;
    fn num_movies(&self) -> usize;
    /// Scores parallel slices of user and movie indices in inference mode.
    fn score_batch(&self, users: &[usize], movies: &[usize]) -> RecResult<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Flat, shape-tagged copy of one parameter tensor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Two-tower embedding model with a feed-forward head and sigmoid output.
#[derive(Debug, Clone)]
pub struct MovieRecommender {
    user_embeddings: Embedding,
    movie_embeddings: Embedding,
    fc1: Linear,
    fc2: Linear,
    fc3: Linear,
    dropout: Dropout,
    mode: Mode,
    rng: StdRng,
}

/// Intermediate activations kept from a forward pass for the backward pass.
pub struct ForwardCache {
    users: Vec<usize>,
    movies: Vec<usize>,
    x0: Array2<f32>,
    z1: Array2<f32>,
    mask1: Option<Array2<f32>>,
    h1: Array2<f32>,
    z2: Array2<f32>,
    mask2: Option<Array2<f32>>,
    h2: Array2<f32>,
    output: Array1<f32>,
}

impl ForwardCache {
    pub fn output(&self) -> &Array1<f32> {
        &self.output
    }
}

/// Parameter gradients, one tensor per model parameter.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub user_embeddings: Array2<f32>,
    pub movie_embeddings: Array2<f32>,
    pub fc1_weight: Array2<f32>,
    pub fc1_bias: Array1<f32>,
    pub fc2_weight: Array2<f32>,
    pub fc2_bias: Array1<f32>,
    pub fc3_weight: Array2<f32>,
    pub fc3_bias: Array1<f32>,
}

impl Gradients {
    /// Views in the same order as [`MovieRecommender::named_parameters`].
    pub fn named(&self) -> [(&'static str, ArrayViewD<'_, f32>); 8] {
        [
            ("user_embeddings.weight", self.user_embeddings.view().into_dyn()),
            ("movie_embeddings.weight", self.movie_embeddings.view().into_dyn()),
            ("fc1.weight", self.fc1_weight.view().into_dyn()),
            ("fc1.bias", self.fc1_bias.view().into_dyn()),
            ("fc2.weight", self.fc2_weight.view().into_dyn()),
            ("fc2.bias", self.fc2_bias.view().into_dyn()),
            ("fc3.weight", self.fc3_weight.view().into_dyn()),
            ("fc3.bias", self.fc3_bias.view().into_dyn()),
        ]
    }
}

impl MovieRecommender {
    pub fn new(num_users: usize, num_movies: usize, embedding_dim: usize) -> RecResult<Self> {
        Self::build(num_users, num_movies, embedding_dim, StdRng::from_entropy())
    }

    pub fn with_seed(num_users: usize, num_movies: usize, embedding_dim: usize, seed: u64) -> RecResult<Self> {
        Self::build(num_users, num_movies, embedding_dim, StdRng::seed_from_u64(seed))
    }

    fn build(num_users: usize, num_movies: usize, embedding_dim: usize, mut rng: StdRng) -> RecResult<Self> {
        if num_users == 0 || num_movies == 0 || embedding_dim == 0 {
            return Err(RecommenderError::InvalidConfig(format!(
                "model dimensions must be positive (users={num_users}, movies={num_movies}, dim={embedding_dim})"
            )));
        }
        tracing::debug!(
            "Initializing embeddings with {} users and {} movies",
            num_users,
            num_movies
        );

        let embedding_init = InitializationMethod::Normal { mean: 0.0, std_dev: 1.0 };
        let user_embeddings = Embedding::new(
            "user_embeddings",
            embedding_init.initialize_matrix(&mut rng, num_users, embedding_dim),
        );
        let movie_embeddings = Embedding::new(
            "movie_embeddings",
            embedding_init.initialize_matrix(&mut rng, num_movies, embedding_dim),
        );

        let fc1 = Self::dense(&mut rng, embedding_dim * 2, HIDDEN_DIM_1);
        let fc2 = Self::dense(&mut rng, HIDDEN_DIM_1, HIDDEN_DIM_2);
        let fc3 = Self::dense(&mut rng, HIDDEN_DIM_2, 1);

        Ok(Self {
            user_embeddings,
            movie_embeddings,
            fc1,
            fc2,
            fc3,
            dropout: Dropout::new(DROPOUT_P)?,
            mode: Mode::Train,
            rng,
        })
    }

    fn dense(rng: &mut StdRng, fan_in: usize, fan_out: usize) -> Linear {
        let bound = 1.0 / (fan_in as f32).sqrt();
        Linear::new(
            InitializationMethod::FanInUniform.initialize_matrix(rng, fan_in, fan_out),
            initializer::uniform_vector(rng, fan_out, -bound, bound),
        )
    }

    pub fn embedding_dim(&self) -> usize {
        self.user_embeddings.dim()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn train(&mut self) {
        self.mode = Mode::Train;
    }

    pub fn eval(&mut self) {
        self.mode = Mode::Eval;
    }

    fn check_lengths(users: &[usize], movies: &[usize]) -> RecResult<()> {
        if users.len() != movies.len() {
            return Err(RecommenderError::LengthMismatch {
                users: users.len(),
                movies: movies.len(),
            });
        }
        Ok(())
    }

    fn embed(&self, users: &[usize], movies: &[usize]) -> RecResult<Array2<f32>> {
        Self::check_lengths(users, movies)?;
        let u = self.user_embeddings.forward(users)?;
        let m = self.movie_embeddings.forward(movies)?;
        Ok(concatenate![Axis(1), u, m])
    }

    /// Forward pass honouring the current mode; dropout masks are drawn only in training.
    pub fn forward(&mut self, users: &[usize], movies: &[usize]) -> RecResult<ForwardCache> {
        let x0 = self.embed(users, movies)?;
        let training = self.mode == Mode::Train;

        let z1 = self.fc1.forward(&x0);
        let mut h1 = relu(&z1);
        let mask1 = training.then(|| self.dropout.sample_mask(&mut self.rng, &h1));
        if let Some(mask) = &mask1 {
            h1 *= mask;
        }

        let z2 = self.fc2.forward(&h1);
        let mut h2 = relu(&z2);
        let mask2 = training.then(|| self.dropout.sample_mask(&mut self.rng, &h2));
        if let Some(mask) = &mask2 {
            h2 *= mask;
        }

        let output = self.fc3.forward(&h2).column(0).mapv(sigmoid);

        Ok(ForwardCache {
            users: users.to_vec(),
            movies: movies.to_vec(),
            x0,
            z1,
            mask1,
            h1,
            z2,
            mask2,
            h2,
            output,
        })
    }

    /// Back-propagates `d_output` (dLoss/dScore per sample) through the whole network.
    pub fn backward(&self, cache: &ForwardCache, d_output: &Array1<f32>) -> Gradients {
        let dz3 = (d_output * &cache.output.mapv(|s| s * (1.0 - s))).insert_axis(Axis(1));
        let g3 = self.fc3.backward(&cache.h2, &dz3);

        let mut dh2 = g3.input;
        if let Some(mask) = &cache.mask2 {
            dh2 *= mask;
        }
        let dz2 = relu_backward(&cache.z2, &dh2);
        let g2 = self.fc2.backward(&cache.h1, &dz2);

        let mut dh1 = g2.input;
        if let Some(mask) = &cache.mask1 {
            dh1 *= mask;
        }
        let dz1 = relu_backward(&cache.z1, &dh1);
        let g1 = self.fc1.backward(&cache.x0, &dz1);

        let dim = self.embedding_dim();
        let dx0 = g1.input;
        Gradients {
            user_embeddings: self
                .user_embeddings
                .backward(&cache.users, dx0.slice(s![.., ..dim])),
            movie_embeddings: self
                .movie_embeddings
                .backward(&cache.movies, dx0.slice(s![.., dim..])),
            fc1_weight: g1.weight,
            fc1_bias: g1.bias,
            fc2_weight: g2.weight,
            fc2_bias: g2.bias,
            fc3_weight: g3.weight,
            fc3_bias: g3.bias,
        }
    }

    /// Inference-mode scores; never applies dropout regardless of the current mode.
    pub fn predict(&self, users: &[usize], movies: &[usize]) -> RecResult<Array1<f32>> {
        let x0 = self.embed(users, movies)?;
        let h1 = relu(&self.fc1.forward(&x0));
        let h2 = relu(&self.fc2.forward(&h1));
        Ok(self.fc3.forward(&h2).column(0).mapv(sigmoid))
    }

    pub fn score(&self, user: usize, movie: usize) -> RecResult<f32> {
        Ok(self.predict(&[user], &[movie])?[0])
    }

    pub fn named_parameters(&self) -> [(&'static str, ArrayViewD<'_, f32>); 8] {
        [
            ("user_embeddings.weight", self.user_embeddings.weight.view().into_dyn()),
            ("movie_embeddings.weight", self.movie_embeddings.weight.view().into_dyn()),
            ("fc1.weight", self.fc1.weight.view().into_dyn()),
            ("fc1.bias", self.fc1.bias.view().into_dyn()),
            ("fc2.weight", self.fc2.weight.view().into_dyn()),
            ("fc2.bias", self.fc2.bias.view().into_dyn()),
            ("fc3.weight", self.fc3.weight.view().into_dyn()),
            ("fc3.bias", self.fc3.bias.view().into_dyn()),
        ]
    }

    pub fn named_parameters_mut(&mut self) -> [(&'static str, ArrayViewMutD<'_, f32>); 8] {
        [
            ("user_embeddings.weight", self.user_embeddings.weight.view_mut().into_dyn()),
            ("movie_embeddings.weight", self.movie_embeddings.weight.view_mut().into_dyn()),
            ("fc1.weight", self.fc1.weight.view_mut().into_dyn()),
            ("fc1.bias", self.fc1.bias.view_mut().into_dyn()),
            ("fc2.weight", self.fc2.weight.view_mut().into_dyn()),
            ("fc2.bias", self.fc2.bias.view_mut().into_dyn()),
            ("fc3.weight", self.fc3.weight.view_mut().into_dyn()),
            ("fc3.bias", self.fc3.bias.view_mut().into_dyn()),
        ]
    }

    pub fn state_dict(&self) -> BTreeMap<String, TensorData> {
        self.named_parameters()
            .into_iter()
            .map(|(name, view)| {
                let tensor = TensorData {
                    shape: view.shape().to_vec(),
                    data: view.iter().copied().collect(),
                };
                (name.to_string(), tensor)
            })
            .collect()
    }

    /// Copies every tensor of `state` into the model. All shapes are checked
    /// before anything is written, so a mismatch leaves the model untouched.
    pub fn load_state_dict(&mut self, state: &BTreeMap<String, TensorData>) -> RecResult<()> {
        for (name, view) in self.named_parameters() {
            let tensor = state.get(name).ok_or_else(|| RecommenderError::ShapeMismatch {
                name: name.to_string(),
                expected: view.shape().to_vec(),
                found: Vec::new(),
            })?;
            let numel: usize = tensor.shape.iter().product();
            if tensor.shape != view.shape() || tensor.data.len() != numel {
                return Err(RecommenderError::ShapeMismatch {
                    name: name.to_string(),
                    expected: view.shape().to_vec(),
                    found: tensor.shape.clone(),
                });
            }
        }

        for (name, mut view) in self.named_parameters_mut() {
            if let Some(tensor) = state.get(name) {
                view.iter_mut()
                    .zip(&tensor.data)
                    .for_each(|(dst, &src)| *dst = src);
            }
        }
        Ok(())
    }
}

impl AffinityScorer for MovieRecommender {
    fn num_users(&self) -> usize {
        self.user_embeddings.num_embeddings()
    }

    fn num_movies(&self) -> usize {
        self.movie_embeddings.num_embeddings()
    }

    fn score_batch(&self, users: &[usize], movies: &[usize]) -> RecResult<Vec<f32>> {
        Ok(self.predict(users, movies)?.to_vec())
    }
}

/// Mean squared error and its gradient w.r.t. the predictions.
pub fn mse_loss(predictions: &Array1<f32>, targets: &Array1<f32>) -> (f32, Array1<f32>) {
    let n = predictions.len().max(1) as f32;
    let diff = predictions - targets;
    let loss = diff.mapv(|d| d * d).sum() / n;
    let grad = diff * (2.0 / n);
    (loss, grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn model() -> MovieRecommender {
        MovieRecommender::with_seed(6, 9, 8, 42).unwrap()
    }

    #[test]
    fn test_scores_are_bounded() {
        let model = model();
        let users: Vec<usize> = (0..6).flat_map(|u| std::iter::repeat(u).take(9)).collect();
        let movies: Vec<usize> = (0..6).flat_map(|_| 0..9).collect();
        let scores = model.score_batch(&users, &movies).unwrap();
        assert_eq!(scores.len(), 54);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_eval_mode_is_deterministic() {
        let mut model = model();
        model.eval();
        let a = model.forward(&[0, 1, 5], &[2, 8, 0]).unwrap();
        let b = model.forward(&[0, 1, 5], &[2, 8, 0]).unwrap();
        assert_eq!(a.output(), b.output());
        assert_eq!(a.output(), &model.predict(&[0, 1, 5], &[2, 8, 0]).unwrap());
    }

    #[test]
    fn test_train_mode_applies_dropout() {
        let mut model = model();
        model.train();
        let users = vec![0; 32];
        let movies: Vec<usize> = (0..32).map(|i| i % 9).collect();
        let a = model.forward(&users, &movies).unwrap();
        let b = model.forward(&users, &movies).unwrap();
        assert_ne!(a.output(), b.output());
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let model = model();
        assert!(matches!(
            model.score(6, 0),
            Err(RecommenderError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            model.score(0, 9),
            Err(RecommenderError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            model.score_batch(&[0, 1], &[0]),
            Err(RecommenderError::LengthMismatch { users: 2, movies: 1 })
        ));
    }

    #[test]
    fn test_mse_loss_matches_definition() {
        let pred = array![0.5, 1.0, 0.0];
        let target = array![1.5, 1.0, 2.0];
        let (loss, grad) = mse_loss(&pred, &target);
        assert!((loss - (1.0 + 0.0 + 4.0) / 3.0).abs() < 1e-6);
        assert!(loss >= 0.0);
        assert!((grad[0] - (-2.0 / 3.0)).abs() < 1e-6);

        let (perfect, _) = mse_loss(&target, &target);
        assert!(perfect.abs() < 1e-12);
    }

    #[test]
    fn test_backward_matches_finite_difference() {
        let mut model = MovieRecommender::with_seed(3, 4, 4, 5).unwrap();
        model.eval();
        let users = [0, 2, 1];
        let movies = [3, 0, 3];
        let targets = array![0.9, 0.1, 0.4];

        let cache = model.forward(&users, &movies).unwrap();
        let (_, d_out) = mse_loss(cache.output(), &targets);
        let grads = model.backward(&cache, &d_out);

        let loss_at = |m: &MovieRecommender| {
            let p = m.predict(&users, &movies).unwrap();
            mse_loss(&p, &targets).0
        };

        let eps = 1e-3;
        let mut plus = model.clone();
        plus.fc3.bias[0] += eps;
        let mut minus = model.clone();
        minus.fc3.bias[0] -= eps;
        let numeric = (loss_at(&plus) - loss_at(&minus)) / (2.0 * eps);
        assert!((numeric - grads.fc3_bias[0]).abs() < 2e-3);

        let mut plus = model.clone();
        plus.user_embeddings.weight[[2, 1]] += eps;
        let mut minus = model.clone();
        minus.user_embeddings.weight[[2, 1]] -= eps;
        let numeric = (loss_at(&plus) - loss_at(&minus)) / (2.0 * eps);
        assert!((numeric - grads.user_embeddings[[2, 1]]).abs() < 2e-3);

        // rows never looked up receive no gradient
        assert!(grads.movie_embeddings.row(1).iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_state_dict_round_trip_and_shape_check() {
        let source = model();
        let state = source.state_dict();
        assert_eq!(state["user_embeddings.weight"].shape, vec![6, 8]);
        assert_eq!(state["fc1.weight"].shape, vec![16, HIDDEN_DIM_1]);

        let mut target = MovieRecommender::with_seed(6, 9, 8, 7).unwrap();
        target.load_state_dict(&state).unwrap();
        assert_eq!(
            target.predict(&[1, 4], &[3, 8]).unwrap(),
            source.predict(&[1, 4], &[3, 8]).unwrap()
        );

        let mut wrong = MovieRecommender::with_seed(7, 9, 8, 7).unwrap();
        let before = wrong.state_dict();
        assert!(matches!(
            wrong.load_state_dict(&state),
            Err(RecommenderError::ShapeMismatch { .. })
        ));
        assert_eq!(wrong.state_dict(), before);
    }
}
