use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub recommendation: RecommendationConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub dataset_dir: PathBuf,
    pub ratings_file: String,
    pub movies_file: String,
    /// Only this many leading rows of the ratings file are used.
    pub max_samples: usize,
}

impl DataConfig {
    pub fn ratings_path(&self) -> PathBuf {
        self.dataset_dir.join(&self.ratings_file)
    }

    pub fn movies_path(&self) -> PathBuf {
        self.dataset_dir.join(&self.movies_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub embedding_dim: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub patience: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub experiment_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub top_k: usize,
    /// Number of leading users (by dense index) to pre-compute.
    pub user_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub checkpoint_path: PathBuf,
    pub id_index_path: PathBuf,
    pub recommendations_dir: PathBuf,
}

impl OutputConfig {
    pub fn recommendations_path(&self) -> PathBuf {
        self.recommendations_dir.join(crate::services::recommendation::RECOMMENDATIONS_FILE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                dataset_dir: PathBuf::from("../ml-32m"),
                ratings_file: "ratings.csv".to_string(),
                movies_file: "movies.csv".to_string(),
                max_samples: 100_000,
            },
            model: ModelConfig { embedding_dim: 100 },
            training: TrainingConfig {
                batch_size: 2048,
                learning_rate: 0.01,
                epochs: 10,
                patience: 3,
                shuffle: true,
                seed: None,
                experiment_name: "movie-recommender".to_string(),
            },
            recommendation: RecommendationConfig {
                top_k: 20,
                user_limit: 1000,
            },
            output: OutputConfig {
                checkpoint_path: PathBuf::from("model/saved_model.json"),
                id_index_path: PathBuf::from("model/id_index.json"),
                recommendations_dir: PathBuf::from("frontend/public/data"),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
        }
    }
}

impl Config {
    /// Layers a config file and `MOVIEREC__*` environment variables over the defaults.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let defaults = config::Config::try_from(&Config::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MOVIEREC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model.embedding_dim, 100);
        assert_eq!(config.training.batch_size, 2048);
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.training.patience, 3);
        assert_eq!(config.data.max_samples, 100_000);
        assert_eq!(config.recommendation.top_k, 20);
        assert_eq!(config.recommendation.user_limit, 1000);
        assert_eq!(
            config.data.ratings_path(),
            PathBuf::from("../ml-32m/ratings.csv")
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movierec.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[training]\nbatch_size = 64\nepochs = 2\n\n[model]\nembedding_dim = 16").unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.training.epochs, 2);
        assert_eq!(config.model.embedding_dim, 16);
        assert_eq!(config.training.patience, 3);
    }
}
