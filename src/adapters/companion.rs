//! Companion artifact adapter
//!
//! Older recordings keep the grid in one artifact and the container metadata in
//! a separate behavioral artifact. Grid-only recordings also land here and fall
//! back to default metadata.

use super::{build_record, occupied_grid, RecordAdapter};
use crate::schema::Artifact;
use crate::types::RawRecord;

/// Adapter for grids whose metadata lives in a companion artifact
pub struct CompanionAdapter;

impl RecordAdapter for CompanionAdapter {
    fn name(&self) -> &'static str {
        "companion"
    }

    fn extract(&self, subject: &str, artifacts: &[Artifact]) -> Option<RawRecord> {
        let (grid_artifact, grid) = artifacts
            .iter()
            .find_map(|artifact| occupied_grid(artifact).map(|grid| (artifact, grid)))?;

        let metadata = artifacts
            .iter()
            .find(|artifact| artifact.payload.has_container_info())
            .unwrap_or(grid_artifact);

        let mut record = build_record(subject, grid, &metadata.payload);
        if record.total_duration.is_none() {
            record.total_duration = grid_artifact.payload.total_duration;
        }
        Some(record)
    }
}
