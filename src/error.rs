use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::BatchReport;

/// The main error type for framelabel operations.
#[derive(Debug, Error)]
pub enum FramelabelError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Label is empty after normalization")]
    EmptyLabel,

    #[error("Label '{0}' contains control characters")]
    InvalidLabel(String),

    #[error("Label '{0}' is not registered and strict lookup is enabled")]
    UnknownLabelStrict(String),

    #[error("Frame index {index} is out of range for {len} frame(s)")]
    FrameIndexOutOfRange { index: usize, len: usize },

    #[error("Cannot write manifest for {path}: no classes registered")]
    MissingClasses { path: PathBuf },

    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid classes.txt at {path}: {message}")]
    ClassesTxtInvalid { path: PathBuf, message: String },

    #[error("Failed to parse label file {path} at line {line}: {message}")]
    LabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Failed to serialize manifest for {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to parse predictions from {path}: {source}")]
    PredictionParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize report: {0}")]
    ReportSerialize(#[source] serde_json::Error),

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("No frame is loaded")]
    NoFrameLoaded,

    #[error("Operation '{operation}' is not available in {mode} mode")]
    WrongMode {
        operation: &'static str,
        mode: &'static str,
    },

    #[error("No images found in {path}")]
    EmptyFolder { path: PathBuf },

    #[error("Batch finished with {failed} failed frame(s) out of {total}")]
    BatchFailed {
        failed: usize,
        total: usize,
        report: BatchReport,
    },
}

impl FramelabelError {
    /// Wraps an I/O error with the path it happened on.
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}
