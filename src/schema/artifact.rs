//! Subject artifact definition
//!
//! An artifact is a JSON document holding any subset of:
//! - `heatmap_data`: 2-D occupancy grid
//! - container metadata (`tank_shape`, `scale_factor`, `trapezoid_side`)
//! - `total_duration` of the recording in seconds
//! - behavioral metrics (speed, top-zone and freezing statistics)
//!
//! Older recordings store the grid alone as a bare array of rows.

use crate::error::HeatmapError;
use crate::types::ContainerShape;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File extension recognized as a subject artifact
pub const ARTIFACT_EXTENSION: &str = "json";

/// Decoded contents of one artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap_data: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tank_shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trapezoid_side: Option<serde_json::Value>,

    // Behavioral metrics; malformed values decode as absent
    #[serde(default, deserialize_with = "lenient::numbers", skip_serializing_if = "Option::is_none")]
    pub speeds_mm_s: Option<Vec<f64>>,
    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub avg_speed_mm_s: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub total_displacement_mm: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub top_time: Option<f64>,
    /// `[start, end]` intervals spent in the top zone
    #[serde(default, deserialize_with = "lenient::intervals", skip_serializing_if = "Option::is_none")]
    pub top_times: Option<Vec<Vec<f64>>>,
    #[serde(default, deserialize_with = "lenient::count", skip_serializing_if = "Option::is_none")]
    pub top_frequency: Option<u32>,
    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub freeze_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient::intervals", skip_serializing_if = "Option::is_none")]
    pub freeze_times: Option<Vec<Vec<f64>>>,
    #[serde(default, deserialize_with = "lenient::count", skip_serializing_if = "Option::is_none")]
    pub freeze_frequency: Option<u32>,
}

/// Tolerant decoders for the behavioral keys: float counts are rounded,
/// non-numeric values and `null` samples are dropped.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use tracing::warn;

    fn raw<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?.filter(|value| !value.is_null()))
    }

    fn finite(value: &Value) -> Option<f64> {
        value.as_f64().filter(|v| v.is_finite())
    }

    /// Samples as numbers, dropping entries that are not
    fn samples(values: &[Value]) -> Vec<f64> {
        values.iter().filter_map(finite).collect()
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(raw(deserializer)?.and_then(|value| {
            let number = finite(&value);
            if number.is_none() {
                warn!(%value, "ignoring non-numeric behavioral value");
            }
            number
        }))
    }

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        Ok(raw(deserializer)?.and_then(|value| {
            let count = finite(&value)
                .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64)
                .map(|v| v.round() as u32);
            if count.is_none() {
                warn!(%value, "ignoring invalid behavioral count");
            }
            count
        }))
    }

    pub fn numbers<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<f64>>, D::Error> {
        Ok(raw(deserializer)?.and_then(|value| match value {
            Value::Array(items) => Some(samples(&items)),
            other => {
                warn!(value = %other, "ignoring non-array behavioral series");
                None
            }
        }))
    }

    pub fn intervals<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<Vec<f64>>>, D::Error> {
        Ok(raw(deserializer)?.and_then(|value| match value {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| item.as_array().map(|bounds| samples(bounds)))
                    .collect(),
            ),
            other => {
                warn!(value = %other, "ignoring non-array behavioral intervals");
                None
            }
        }))
    }
}

/// Either layout an artifact may be stored in
#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactDocument {
    Grid(Vec<Vec<f64>>),
    Mapping(ArtifactPayload),
}

impl From<ArtifactDocument> for ArtifactPayload {
    fn from(document: ArtifactDocument) -> Self {
        match document {
            ArtifactDocument::Grid(rows) => ArtifactPayload {
                heatmap_data: Some(rows),
                ..Default::default()
            },
            ArtifactDocument::Mapping(payload) => payload,
        }
    }
}

impl ArtifactPayload {
    /// Parse an artifact document
    pub fn from_json(json: &str) -> Result<Self, HeatmapError> {
        let document: ArtifactDocument = serde_json::from_str(json)?;
        Ok(document.into())
    }

    /// Occupancy grid as an array, `None` when absent or zero-sized
    pub fn grid(&self) -> Result<Option<Array2<f64>>, HeatmapError> {
        let rows = match &self.heatmap_data {
            Some(rows) if !rows.is_empty() && !rows[0].is_empty() => rows,
            _ => return Ok(None),
        };

        let cols = rows[0].len();
        if let Some(bad) = rows.iter().position(|row| row.len() != cols) {
            return Err(HeatmapError::InvalidArtifact(format!(
                "heatmap_data row {} has {} cells, expected {}",
                bad,
                rows[bad].len(),
                cols
            )));
        }

        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((rows.len(), cols), flat)
            .map(Some)
            .map_err(|e| HeatmapError::InvalidArtifact(e.to_string()))
    }

    /// Whether the artifact states a container shape
    pub fn has_container_info(&self) -> bool {
        self.tank_shape.is_some()
    }

    pub fn shape(&self) -> ContainerShape {
        self.tank_shape
            .as_deref()
            .map(ContainerShape::parse)
            .unwrap_or(ContainerShape::Unknown)
    }

    /// Stated scale, or the shape's default when missing or not positive
    pub fn scale(&self) -> f64 {
        let fallback = self.shape().default_scale();
        match self.scale_factor {
            Some(scale) if scale.is_finite() && scale > 0.0 => scale,
            Some(scale) => {
                tracing::warn!(scale, fallback, "ignoring non-positive scale_factor");
                fallback
            }
            None => fallback,
        }
    }

    /// Names of the keys present in this artifact, in schema order
    pub fn keys(&self) -> Vec<&'static str> {
        let present = [
            ("heatmap_data", self.heatmap_data.is_some()),
            ("tank_shape", self.tank_shape.is_some()),
            ("scale_factor", self.scale_factor.is_some()),
            ("total_duration", self.total_duration.is_some()),
            ("trapezoid_side", self.trapezoid_side.is_some()),
            ("speeds_mm_s", self.speeds_mm_s.is_some()),
            ("avg_speed_mm_s", self.avg_speed_mm_s.is_some()),
            ("total_displacement_mm", self.total_displacement_mm.is_some()),
            ("top_time", self.top_time.is_some()),
            ("top_times", self.top_times.is_some()),
            ("top_frequency", self.top_frequency.is_some()),
            ("freeze_time", self.freeze_time.is_some()),
            ("freeze_times", self.freeze_times.is_some()),
            ("freeze_frequency", self.freeze_frequency.is_some()),
        ];
        present
            .iter()
            .filter(|(_, is_present)| *is_present)
            .map(|(key, _)| *key)
            .collect()
    }
}

/// An artifact together with the file it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub payload: ArtifactPayload,
}

impl Artifact {
    /// Read and parse an artifact file
    pub fn read(path: &Path) -> Result<Self, HeatmapError> {
        let json = fs::read_to_string(path)?;
        let payload = ArtifactPayload::from_json(&json)?;
        Ok(Self {
            path: path.to_path_buf(),
            payload,
        })
    }
}

/// Whether `grid` records any presence at all
pub fn has_occupancy(grid: &Array2<f64>) -> bool {
    grid.iter().any(|&value| value != 0.0)
}

/// Whether `path` looks like an artifact file
pub fn is_artifact(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION))
            .unwrap_or(false)
}

/// Artifact files directly inside `folder`, sorted by path
pub fn list_artifacts(folder: &Path) -> io::Result<Vec<PathBuf>> {
    let mut artifacts = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if is_artifact(&path) {
            artifacts.push(path);
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

/// Whether `folder` directly contains at least one artifact
pub fn has_artifacts(folder: &Path) -> bool {
    list_artifacts(folder)
        .map(|artifacts| !artifacts.is_empty())
        .unwrap_or(false)
}
