//! Error types for Findex

use thiserror::Error;

/// Errors that can occur while loading, merging or rendering heatmaps
#[derive(Debug, Error)]
pub enum HeatmapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("Unknown container shape: {0}")]
    UnknownShape(String),

    #[error("Empty cohort: {0}")]
    EmptyCohort(String),

    #[error("Grid dimensions {found:?} do not match {expected:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
