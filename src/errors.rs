use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised anywhere in the lyric training pipeline
#[derive(Error, Debug)]
pub enum LyricError {
    /// IO errors that occur during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The requested text column is not in the CSV header
    #[error("Column '{column}' not found in {path}")]
    MissingColumn {
        path: PathBuf,
        column: String,
    },

    /// Nothing left to train on after cleaning
    #[error("Corpus is empty after cleaning")]
    EmptyCorpus,

    /// A split has no windows, usually because the corpus is shorter than the window
    #[error("No {split} examples for window length {maxlen}")]
    EmptyDataset {
        split: String,
        maxlen: usize,
    },

    /// A character outside the vocabulary was encoded
    #[error("Character {0:?} is not in the vocabulary")]
    UnknownChar(char),

    /// Model saving errors
    #[error("Failed to save model to {path}: {reason}")]
    ModelSave {
        path: PathBuf,
        reason: String,
    },

    /// Model loading errors
    #[error("Failed to load model from {path}: {reason}")]
    ModelLoad {
        path: PathBuf,
        reason: String,
    },

    /// Configuration loading errors
    #[error("Failed to load configuration from {path}: {reason}")]
    ConfigLoad {
        path: PathBuf,
        reason: String,
    },

    /// Chart rendering errors
    #[error("Failed to draw {path}: {reason}")]
    Plot {
        path: PathBuf,
        reason: String,
    },

    /// Tensor data could not be read back from the backend
    #[error("Tensor error: {0}")]
    Tensor(String),

    /// Parameter validation errors
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Type alias for the crate's Result type
pub type Result<T> = std::result::Result<T, LyricError>;

/// Extension trait for Result to attach a path to foreign errors
pub trait ResultExt<T> {
    /// Turn the error into a `Plot` error for the given file
    fn plot_context(self, path: &std::path::Path) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn plot_context(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| LyricError::Plot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
