use crate::algorithms::MovieRecommender;
use crate::config::Config;
use crate::services::dataset::{ensure_dataset_dir, load_movies, load_ratings, RatingDataset};
use crate::services::recommendation::BatchRecommender;
use crate::services::storage::{save_mappings, verify_artifacts, ArtifactReport, FileCheckpointStore};
use crate::services::training::{Trainer, TrainingSummary};
use crate::utils::metrics::MetricsSink;
use crate::utils::validation::validate_config;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{error, info, info_span};
use uuid::Uuid;

/// Outcome of the recommendation stage, which never fails the run.
#[derive(Debug, Clone, PartialEq)]
pub enum RecommendationStage {
    Written { path: PathBuf, users: usize },
    Failed(String),
}

impl RecommendationStage {
    pub fn is_written(&self) -> bool {
        matches!(self, RecommendationStage::Written { .. })
    }
}

/// Outcome of persisting the ID index, which never fails the run.
#[derive(Debug, Clone, PartialEq)]
pub enum IdIndexStage {
    Written(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub training: TrainingSummary,
    pub num_users: usize,
    pub num_movies: usize,
    pub id_index: IdIndexStage,
    pub recommendations: RecommendationStage,
    pub artifacts: ArtifactReport,
}

/// End-to-end run: load data, train, persist the model and ID index,
/// pre-compute recommendations, then check what landed on disk.
pub fn run<M: MetricsSink + ?Sized>(config: &Config, metrics: &mut M) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id);
    let _guard = span.enter();

    validate_config(config).context("invalid configuration")?;
    ensure_dataset_dir(&config.data.dataset_dir)?;
    info!("Using dataset directory {}", config.data.dataset_dir.display());

    for dir in [
        config.output.checkpoint_path.parent(),
        config.output.id_index_path.parent(),
        Some(config.output.recommendations_dir.as_path()),
    ]
    .into_iter()
    .flatten()
    .filter(|d| !d.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }

    let movies = load_movies(&config.data.movies_path())
        .with_context(|| format!("failed to read {}", config.data.movies_path().display()))?;
    let ratings = load_ratings(&config.data.ratings_path(), config.data.max_samples)
        .with_context(|| format!("failed to read {}", config.data.ratings_path().display()))?;
    let dataset = RatingDataset::from_ratings(&ratings)?;
    drop(ratings);

    let (num_users, num_movies) = (dataset.num_users(), dataset.num_movies());
    let dim = config.model.embedding_dim;
    let mut model = match config.training.seed {
        Some(seed) => MovieRecommender::with_seed(num_users, num_movies, dim, seed)?,
        None => MovieRecommender::new(num_users, num_movies, dim)?,
    };

    let mut store = FileCheckpointStore::new(&config.output.checkpoint_path);
    let mut trainer = Trainer::new(config.training.clone());
    let training = trainer.fit(&mut model, &dataset, &mut store, metrics)?;
    info!(
        "Saved model to {} ({} checkpoint writes)",
        store.path().display(),
        store.writes()
    );

    let mappings = dataset.into_mappings();
    let id_index = match save_mappings(&mappings, &config.output.id_index_path) {
        Ok(()) => IdIndexStage::Written(config.output.id_index_path.clone()),
        Err(e) => {
            error!("Error saving id index: {}", e);
            IdIndexStage::Failed(e.to_string())
        }
    };

    model.eval();
    let recommender = BatchRecommender::from_config(&config.recommendation);
    let recommendations = match recommender
        .generate(&model, &mappings, &movies)
        .and_then(|table| {
            let users = table.len();
            recommender
                .write(&table, &config.output.recommendations_dir)
                .map(|path| (path, users))
        }) {
        Ok((path, users)) => RecommendationStage::Written { path, users },
        Err(e) => {
            error!("Error generating recommendations: {}", e);
            RecommendationStage::Failed(e.to_string())
        }
    };

    let recommendations_path = config.output.recommendations_path();
    let artifacts = verify_artifacts(&[
        config.output.checkpoint_path.as_path(),
        config.output.id_index_path.as_path(),
        recommendations_path.as_path(),
    ]);

    info!("Run {} complete", run_id);
    Ok(RunReport {
        run_id,
        training,
        num_users,
        num_movies,
        id_index,
        recommendations,
        artifacts,
    })
}
