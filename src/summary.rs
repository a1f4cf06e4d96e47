//! Behavioral summary table
//!
//! One row per subject with the behavioral measures stored alongside its
//! heatmap, grouped by cohort, each cohort closed by a mean row.

use crate::adapters::{read_artifacts, subject_name};
use crate::cohort::{assign_label, build_group_map};
use crate::error::HeatmapError;
use crate::schema::ArtifactPayload;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Column headers, in output order
pub const SUMMARY_COLUMNS: [&str; 10] = [
    "Group",
    "Top Duration",
    "Top Frequency",
    "Freeze Duration",
    "Freeze Frequency",
    "Latency to the Top",
    "Total Displacement",
    "Average Speed",
    "Tank Shape",
    "Folder Name",
];

/// Behavioral measures of one subject
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectSummary {
    pub group: String,
    pub top_duration: f64,
    pub top_frequency: u32,
    pub freeze_duration: f64,
    pub freeze_frequency: u32,
    /// Start of the first visit to the top zone, if any
    pub latency_to_top: Option<f64>,
    pub total_displacement: f64,
    pub average_speed: f64,
    pub tank_shape: String,
    pub folder_name: String,
}

impl SubjectSummary {
    /// Derive a row from an artifact payload
    pub fn from_payload(group: String, folder_name: String, payload: &ArtifactPayload) -> Self {
        let freeze_count = payload.freeze_times.as_ref().map_or(0, |times| times.len() as u32);
        let freeze_frequency = match payload.freeze_frequency {
            Some(n) if n > 0 => n,
            _ => freeze_count,
        };

        let latency_to_top = payload
            .top_times
            .as_ref()
            .and_then(|times| times.first())
            .and_then(|visit| visit.first())
            .copied();

        Self {
            group,
            top_duration: payload.top_time.unwrap_or(0.0),
            top_frequency: payload.top_frequency.unwrap_or(0),
            freeze_duration: payload.freeze_time.unwrap_or(0.0),
            freeze_frequency,
            latency_to_top,
            total_displacement: payload.total_displacement_mm.unwrap_or(0.0),
            average_speed: payload.avg_speed_mm_s.unwrap_or(0.0),
            tank_shape: payload
                .tank_shape
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            folder_name,
        }
    }
}

/// Column means over a cohort
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryMeans {
    pub top_duration: f64,
    pub top_frequency: f64,
    pub freeze_duration: f64,
    pub freeze_frequency: f64,
    pub latency_to_top: f64,
    pub total_displacement: f64,
    pub average_speed: f64,
}

/// Subjects of one cohort
#[derive(Debug, Clone, PartialEq)]
pub struct CohortSummary {
    pub label: String,
    pub subjects: Vec<SubjectSummary>,
}

impl CohortSummary {
    /// Mean of the present values per column, `0` when a column has none
    pub fn means(&self) -> SummaryMeans {
        let rows = &self.subjects;
        SummaryMeans {
            top_duration: mean(rows.iter().map(|r| r.top_duration)),
            top_frequency: mean(rows.iter().map(|r| r.top_frequency as f64)),
            freeze_duration: mean(rows.iter().map(|r| r.freeze_duration)),
            freeze_frequency: mean(rows.iter().map(|r| r.freeze_frequency as f64)),
            latency_to_top: mean(rows.iter().filter_map(|r| r.latency_to_top)),
            total_displacement: mean(rows.iter().map(|r| r.total_displacement)),
            average_speed: mean(rows.iter().map(|r| r.average_speed)),
        }
    }
}

/// Collect one summary row per subject folder, grouped and sorted by cohort label.
///
/// Folders without a readable artifact are skipped with a warning.
pub fn collect_summary(folders: &[PathBuf], fuzzy: bool) -> Vec<CohortSummary> {
    let names: Vec<String> = folders.iter().map(|f| subject_name(f)).collect();
    let group_map = fuzzy.then(|| build_group_map(&names));

    let mut cohorts: BTreeMap<String, Vec<SubjectSummary>> = BTreeMap::new();
    for (folder, name) in folders.iter().zip(names) {
        let payload = match first_payload(folder) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!(folder = %folder.display(), "no readable artifact, skipping subject");
                continue;
            }
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "failed to read subject folder");
                continue;
            }
        };

        let label = assign_label(&name, fuzzy, group_map.as_ref());
        debug!(subject = %name, cohort = %label, "summarized subject");
        cohorts
            .entry(label.clone())
            .or_default()
            .push(SubjectSummary::from_payload(label, name, &payload));
    }

    cohorts
        .into_iter()
        .map(|(label, subjects)| CohortSummary { label, subjects })
        .collect()
}

/// Write the summary as CSV: subject rows, then a `Mean (n=N)` row and a blank row per cohort
pub fn write_summary_csv(summary: &[CohortSummary], path: &Path) -> Result<(), HeatmapError> {
    fs::write(path, summary_csv(summary))?;
    debug!(path = %path.display(), cohorts = summary.len(), "wrote summary");
    Ok(())
}

/// Render the summary as CSV text
pub fn summary_csv(summary: &[CohortSummary]) -> String {
    let mut out = String::new();
    write_row(&mut out, SUMMARY_COLUMNS.iter().map(|c| c.to_string()));

    for cohort in summary {
        for row in &cohort.subjects {
            write_row(
                &mut out,
                [
                    row.group.clone(),
                    row.top_duration.to_string(),
                    row.top_frequency.to_string(),
                    row.freeze_duration.to_string(),
                    row.freeze_frequency.to_string(),
                    row.latency_to_top.map(|v| v.to_string()).unwrap_or_default(),
                    row.total_displacement.to_string(),
                    row.average_speed.to_string(),
                    row.tank_shape.clone(),
                    row.folder_name.clone(),
                ],
            );
        }

        let means = cohort.means();
        write_row(
            &mut out,
            [
                format!("Mean (n={})", cohort.subjects.len()),
                means.top_duration.to_string(),
                means.top_frequency.to_string(),
                means.freeze_duration.to_string(),
                means.freeze_frequency.to_string(),
                means.latency_to_top.to_string(),
                means.total_displacement.to_string(),
                means.average_speed.to_string(),
                String::new(),
                String::new(),
            ],
        );
        out.push('\n');
    }

    out
}

fn first_payload(folder: &Path) -> Result<Option<ArtifactPayload>, HeatmapError> {
    Ok(read_artifacts(folder)?
        .into_iter()
        .next()
        .map(|artifact| artifact.payload))
}

fn write_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let line: Vec<String> = fields.into_iter().map(|f| escape_field(&f)).collect();
    let _ = writeln!(out, "{}", line.join(","));
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn subject(root: &Path, name: &str, json: &str) -> PathBuf {
        let folder = root.join(name);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("results.json"), json).unwrap();
        folder
    }

    #[test]
    fn test_row_from_payload() {
        let payload = ArtifactPayload::from_json(
            r#"{
                "tank_shape": "rectangle",
                "top_time": 12.5,
                "top_times": [[3.0, 5.0], [9.0, 12.0]],
                "top_frequency": 2,
                "freeze_time": 4.0,
                "freeze_times": [[1.0, 2.0], [6.0, 7.0], [8.0, 9.0]],
                "freeze_frequency": 0,
                "total_displacement_mm": 1500.0,
                "avg_speed_mm_s": 25.0
            }"#,
        )
        .unwrap();

        let row = SubjectSummary::from_payload("a".into(), "A_1".into(), &payload);
        assert_eq!(row.freeze_frequency, 3);
        assert_eq!(row.latency_to_top, Some(3.0));
        assert_eq!(row.top_frequency, 2);
        assert_eq!(row.tank_shape, "rectangle");
    }

    #[test]
    fn test_row_defaults() {
        let row = SubjectSummary::from_payload("a".into(), "A_1".into(), &ArtifactPayload::default());
        assert_eq!(row.top_duration, 0.0);
        assert_eq!(row.freeze_frequency, 0);
        assert_eq!(row.latency_to_top, None);
        assert_eq!(row.tank_shape, "Unknown");
    }

    #[test]
    fn test_collect_sorted_by_label() {
        let dir = TempDir::new().unwrap();
        let folders = vec![
            subject(dir.path(), "B_1", r#"{"top_time": 2.0}"#),
            subject(dir.path(), "A_1", r#"{"top_time": 4.0, "top_times": [[1.5, 2.0]]}"#),
            subject(dir.path(), "A_2", r#"{"top_time": 6.0}"#),
        ];

        let summary = collect_summary(&folders, false);
        let labels: Vec<&str> = summary.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(summary[0].subjects.len(), 2);
        assert_eq!(summary[0].subjects[0].folder_name, "A_1");

        let means = summary[0].means();
        assert_eq!(means.top_duration, 5.0);
        assert_eq!(means.latency_to_top, 1.5);
    }

    #[test]
    fn test_collect_fuzzy_and_skips_empty_folders() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("caffeine_9");
        fs::create_dir_all(&empty).unwrap();
        let folders = vec![
            subject(dir.path(), "caffeine_1", "{}"),
            subject(dir.path(), "Caffiene_2", "{}"),
            empty,
        ];

        let summary = collect_summary(&folders, true);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].label, "caffeine");
        assert_eq!(summary[0].subjects.len(), 2);
    }

    #[test]
    fn test_csv_layout() {
        let cohort = CohortSummary {
            label: "a".into(),
            subjects: vec![SubjectSummary::from_payload(
                "a".into(),
                "A,1".into(),
                &ArtifactPayload {
                    top_time: Some(2.0),
                    ..ArtifactPayload::default()
                },
            )],
        };

        let csv = summary_csv(&[cohort]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], SUMMARY_COLUMNS.join(","));
        assert_eq!(lines[1], "a,2,0,0,0,,0,0,Unknown,\"A,1\"");
        assert_eq!(lines[2], "Mean (n=1),2,0,0,0,0,0,0,,");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_write_summary_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.csv");
        write_summary_csv(&[], &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
