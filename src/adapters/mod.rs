//! Record adapters
//!
//! This module turns the artifacts of one subject folder into a [`RawRecord`].
//! Recordings come in two layouts: the grid stored next to its container
//! metadata, or the grid and metadata split across separate artifacts. Each
//! layout is handled by one adapter, and the [`RecordLoader`] tries them in order.

mod companion;
mod self_contained;

pub use companion::CompanionAdapter;
pub use self_contained::SelfContainedAdapter;

use crate::error::HeatmapError;
use crate::schema::{has_occupancy, list_artifacts, Artifact, ArtifactPayload};
use crate::types::RawRecord;
use ndarray::Array2;
use std::path::Path;
use tracing::{debug, info, warn};

/// Trait for subject record adapters
pub trait RecordAdapter {
    /// Adapter name used in logs
    fn name(&self) -> &'static str;

    /// Build a record from a subject's artifacts, `None` if this layout does not apply
    fn extract(&self, subject: &str, artifacts: &[Artifact]) -> Option<RawRecord>;
}

/// Loads subject folders by trying each adapter in turn
pub struct RecordLoader {
    adapters: Vec<Box<dyn RecordAdapter>>,
}

impl Default for RecordLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordLoader {
    /// Loader trying the self-contained layout first, then the companion layout
    pub fn new() -> Self {
        Self::with_adapters(vec![
            Box::new(SelfContainedAdapter),
            Box::new(CompanionAdapter),
        ])
    }

    pub fn with_adapters(adapters: Vec<Box<dyn RecordAdapter>>) -> Self {
        Self { adapters }
    }

    /// Load the record stored in `folder`.
    ///
    /// Unreadable artifacts are skipped. Returns `Ok(None)` when no artifact
    /// carries a usable grid; only a folder that cannot be listed is an error.
    pub fn load(&self, folder: &Path) -> Result<Option<RawRecord>, HeatmapError> {
        let subject = subject_name(folder);
        let artifacts = read_artifacts(folder)?;

        if artifacts.is_empty() {
            info!(folder = %folder.display(), "no artifacts found");
            return Ok(None);
        }

        for adapter in &self.adapters {
            if let Some(record) = adapter.extract(&subject, &artifacts) {
                debug!(
                    subject = %record.subject,
                    adapter = adapter.name(),
                    shape = %record.shape,
                    scale = record.scale,
                    rows = record.grid.nrows(),
                    cols = record.grid.ncols(),
                    "loaded record"
                );
                return Ok(Some(record));
            }
        }

        info!(folder = %folder.display(), "no valid heatmap data found");
        Ok(None)
    }
}

/// Read every artifact in `folder`, logging and skipping the unreadable ones
pub fn read_artifacts(folder: &Path) -> Result<Vec<Artifact>, HeatmapError> {
    let mut artifacts = Vec::new();
    for path in list_artifacts(folder)? {
        match Artifact::read(&path) {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable artifact"),
        }
    }
    Ok(artifacts)
}

/// Subject name for a folder (its last path component)
pub fn subject_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.to_string_lossy().into_owned())
}

/// Grid of an artifact if it holds any occupancy
fn occupied_grid(artifact: &Artifact) -> Option<Array2<f64>> {
    match artifact.payload.grid() {
        Ok(Some(grid)) if has_occupancy(&grid) => Some(grid),
        Ok(_) => None,
        Err(e) => {
            warn!(path = %artifact.path.display(), error = %e, "discarding malformed grid");
            None
        }
    }
}

/// Assemble a record from a grid and the artifact holding its metadata
fn build_record(subject: &str, grid: Array2<f64>, metadata: &ArtifactPayload) -> RawRecord {
    RawRecord {
        subject: subject.to_string(),
        grid,
        shape: metadata.shape(),
        scale: metadata.scale(),
        total_duration: metadata.total_duration,
        trapezoid_side: metadata.trapezoid_side.clone(),
    }
}
