//! Error types for render-eval operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for render-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while evaluating a scene.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A render has no ground-truth counterpart, or the other way round.
    #[error("Missing image pair: {name} has no counterpart at {expected}")]
    MissingPair {
        /// Filename shared by the render and ground-truth directories.
        name: String,
        /// Path where the counterpart was expected.
        expected: PathBuf,
    },

    /// Failed to read or decode an image or directory.
    #[error("Image load failed: {path}: {reason}")]
    Load {
        /// Path that failed to load.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// Render and ground truth do not share a resolution.
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Expected dimensions (width, height).
        expected: (usize, usize),
        /// Actual dimensions (width, height).
        actual: (usize, usize),
    },

    /// Tensor does not have the `[1, 3, H, W]` layout.
    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    /// A scoring function failed.
    #[error("Metric calculation failed: {metric}: {reason}")]
    MetricComputation {
        /// Name of the metric that failed.
        metric: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Model weights could not be loaded.
    #[error("Model load failed: {path}: {reason}")]
    ModelLoad {
        /// Weights file.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// Writing result artifacts failed.
    #[error("Persistence failed: {path}: {reason}")]
    Persistence {
        /// Artifact path.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a scene failure, as recorded in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Render/ground-truth filenames do not line up.
    MissingPair,
    /// Decode, directory or resolution problem.
    Load,
    /// A metric failed.
    MetricComputation,
    /// Artifacts could not be written.
    Persistence,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPair { .. } => ErrorKind::MissingPair,
            Self::Load { .. } | Self::DimensionMismatch { .. } | Self::InvalidTensor(_) => {
                ErrorKind::Load
            }
            Self::MetricComputation { .. } | Self::ModelLoad { .. } => {
                ErrorKind::MetricComputation
            }
            Self::Persistence { .. } | Self::Json(_) => ErrorKind::Persistence,
            // Stray I/O outside the loader and persister is treated as a load problem.
            Self::Io(_) => ErrorKind::Load,
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn metric(metric: &str, reason: impl std::fmt::Display) -> Self {
        Self::MetricComputation {
            metric: metric.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPair => write!(f, "missing pair"),
            Self::Load => write!(f, "load"),
            Self::MetricComputation => write!(f, "metric computation"),
            Self::Persistence => write!(f, "persistence"),
        }
    }
}
