//! Self-contained artifact adapter
//!
//! Newer recordings write the grid and the container metadata into the same
//! artifact.

use super::{build_record, occupied_grid, RecordAdapter};
use crate::schema::Artifact;
use crate::types::RawRecord;

/// Adapter for artifacts that carry grid and metadata together
pub struct SelfContainedAdapter;

impl RecordAdapter for SelfContainedAdapter {
    fn name(&self) -> &'static str {
        "self-contained"
    }

    fn extract(&self, subject: &str, artifacts: &[Artifact]) -> Option<RawRecord> {
        artifacts
            .iter()
            .filter(|artifact| artifact.payload.has_container_info())
            .find_map(|artifact| {
                occupied_grid(artifact).map(|grid| build_record(subject, grid, &artifact.payload))
            })
    }
}
