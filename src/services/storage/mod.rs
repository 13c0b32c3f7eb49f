use crate::algorithms::{AffinityScorer, MovieRecommender, TensorData};
use crate::error::{RecResult, RecommenderError};
use crate::models::IdMappings;
use crate::utils::{ensure_parent_dir, file_size_mb};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Serialized snapshot of every learnable parameter of a [`MovieRecommender`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub num_users: usize,
    pub num_movies: usize,
    pub embedding_dim: usize,
    pub tensors: BTreeMap<String, TensorData>,
}

impl ModelCheckpoint {
    pub fn from_model(model: &MovieRecommender) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            saved_at: Utc::now(),
            num_users: model.num_users(),
            num_movies: model.num_movies(),
            embedding_dim: model.embedding_dim(),
            tensors: model.state_dict(),
        }
    }

    pub fn write(&self, path: &Path) -> RecResult<()> {
        ensure_parent_dir(path)?;
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read(path: &Path) -> RecResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Compares the recorded model shape with the one the caller is about to build.
    pub fn check_dimensions(&self, num_users: usize, num_movies: usize, embedding_dim: usize) -> RecResult<()> {
        for (field, stored, requested) in [
            ("embedding_dim", self.embedding_dim, embedding_dim),
            ("num_users", self.num_users, num_users),
            ("num_movies", self.num_movies, num_movies),
        ] {
            if stored != requested {
                return Err(RecommenderError::CheckpointMismatch {
                    field,
                    stored,
                    requested,
                });
            }
        }
        Ok(())
    }
}

/// Builds a model of the requested shape and fills it from the checkpoint at `path`.
pub fn load_model(
    path: &Path,
    num_users: usize,
    num_movies: usize,
    embedding_dim: usize,
) -> RecResult<MovieRecommender> {
    let checkpoint = ModelCheckpoint::read(path)?;
    checkpoint.check_dimensions(num_users, num_movies, embedding_dim)?;
    let mut model = MovieRecommender::new(num_users, num_movies, embedding_dim)?;
    model.load_state_dict(&checkpoint.tensors)?;
    model.eval();
    info!(
        "Loaded checkpoint {} ({} users, {} movies, dim {})",
        path.display(),
        num_users,
        num_movies,
        embedding_dim
    );
    Ok(model)
}

/// Where the training loop persists parameter snapshots.
pub trait CheckpointStore {
    fn save(&mut self, model: &MovieRecommender) -> RecResult<()>;
}

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
    writes: usize,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&mut self, model: &MovieRecommender) -> RecResult<()> {
        ModelCheckpoint::from_model(model).write(&self.path)?;
        self.writes += 1;
        debug!("Checkpoint #{} written to {}", self.writes, self.path.display());
        Ok(())
    }
}

pub fn save_mappings(mappings: &IdMappings, path: &Path) -> RecResult<()> {
    ensure_parent_dir(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, mappings)?;
    writer.flush()?;
    Ok(())
}

pub fn load_mappings(path: &Path) -> RecResult<IdMappings> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactStatus {
    pub path: PathBuf,
    pub size_mb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactReport {
    pub artifacts: Vec<ArtifactStatus>,
}

impl ArtifactReport {
    pub fn all_present(&self) -> bool {
        self.artifacts.iter().all(|a| a.size_mb.is_some())
    }

    pub fn missing(&self) -> impl Iterator<Item = &Path> {
        self.artifacts
            .iter()
            .filter(|a| a.size_mb.is_none())
            .map(|a| a.path.as_path())
    }
}

/// Best-effort existence check of run outputs. Missing files only produce a warning.
pub fn verify_artifacts(paths: &[&Path]) -> ArtifactReport {
    let artifacts: Vec<ArtifactStatus> = paths
        .iter()
        .map(|p| ArtifactStatus {
            path: p.to_path_buf(),
            size_mb: file_size_mb(p),
        })
        .collect();
    let report = ArtifactReport { artifacts };

    if report.all_present() {
        for a in &report.artifacts {
            info!("Verified {} ({:.2}MB)", a.path.display(), a.size_mb.unwrap_or_default());
        }
    } else {
        for missing in report.missing() {
            warn!("Warning: output file is missing: {}", missing.display());
        }
    }
    report
}
