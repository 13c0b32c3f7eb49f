use std::path::PathBuf;

/// Errors raised by the recommendation engine.
#[derive(thiserror::Error, Debug)]
pub enum RecommenderError {
    #[error("Dataset directory not found at {0}")]
    DatasetNotFound(PathBuf),

    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{table} index {index} out of range (size {size})")]
    IndexOutOfRange {
        table: &'static str,
        index: usize,
        size: usize,
    },

    #[error("No raw id registered for dense index {0}")]
    UnknownIndex(usize),

    #[error("Unknown user: {0}")]
    UnknownUser(i64),

    #[error("Unknown movie: {0}")]
    UnknownMovie(i64),

    #[error("Shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Checkpoint was saved with {field} = {stored}, but {requested} was requested")]
    CheckpointMismatch {
        field: &'static str,
        stored: usize,
        requested: usize,
    },

    #[error("Duplicate raw id {0} in persisted id index")]
    DuplicateId(i64),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Batch length mismatch: {users} users vs {movies} movies")]
    LengthMismatch { users: usize, movies: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RecResult<T> = Result<T, RecommenderError>;
