//! Pipeline orchestration
//!
//! This module provides the batch entry point. It runs folder resolution,
//! record loading, cohort assignment, merging and rendering in sequence.

use crate::adapters::{subject_name, RecordLoader};
use crate::cohort::{build_group_map, group_records};
use crate::config::MergeConfig;
use crate::error::HeatmapError;
use crate::folders::resolve_folders;
use crate::merger::CohortMerger;
use crate::render::{HeatmapRenderer, RenderOptions};
use crate::types::RawRecord;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Merge the recordings under `folders` into one heatmap image per cohort.
///
/// # Arguments
/// * `folders` - Subject folders, or parent folders holding subject folders
/// * `output_dir` - Where the PNG files are written (created when needed)
/// * `fuzzy` - Merge near-duplicate cohort spellings
/// * `kernel_size` - Gaussian kernel size; even values are bumped to odd
/// * `alpha` - Heatmap opacity in `0..=1`
///
/// # Returns
/// Paths of the images written. Empty when no valid record was found, in which
/// case `output_dir` is not created. If an image could not be written, the
/// remaining cohorts are still processed and the write failure is returned.
///
/// # Example
/// ```ignore
/// let written = merge_heatmaps(&["recordings/"], Path::new("Heatmaps"), true, 15, 0.8)?;
/// ```
pub fn merge_heatmaps<P: AsRef<Path>>(
    folders: &[P],
    output_dir: &Path,
    fuzzy: bool,
    kernel_size: usize,
    alpha: f64,
) -> Result<Vec<PathBuf>, HeatmapError> {
    let config = MergeConfig::default()
        .with_fuzzy(fuzzy)
        .with_kernel_size(kernel_size)
        .with_heatmap_alpha(alpha);
    let report = HeatmapProcessor::new(config)?.run(folders, output_dir)?;

    let write_failures: Vec<String> = report
        .failures
        .iter()
        .filter(|failure| failure.stage == FailureStage::Write)
        .map(|failure| format!("{}: {}", failure.label, failure.error))
        .collect();
    if !write_failures.is_empty() {
        return Err(HeatmapError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("failed to write heatmaps ({})", write_failures.join("; ")),
        )));
    }

    Ok(report.written)
}

/// Pipeline stage a cohort failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// No record could be merged
    Merge,
    /// The image could not be rendered or saved
    Write,
}

/// A cohort that produced no image
#[derive(Debug, Clone, PartialEq)]
pub struct CohortFailure {
    pub label: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Images written, in cohort order
    pub written: Vec<PathBuf>,
    /// Cohorts that failed to merge or render
    pub failures: Vec<CohortFailure>,
}

impl MergeReport {
    /// Whether the run wrote nothing and recorded no failure
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.failures.is_empty()
    }
}

/// Batch processor holding the configured pipeline stages.
pub struct HeatmapProcessor {
    config: MergeConfig,
    loader: RecordLoader,
    merger: CohortMerger,
    renderer: HeatmapRenderer,
}

impl HeatmapProcessor {
    /// Create a processor; the configuration is validated first
    pub fn new(config: MergeConfig) -> Result<Self, HeatmapError> {
        config.validate()?;
        let renderer = HeatmapRenderer::new(RenderOptions::from(&config));
        Ok(Self::with_stages(config, RecordLoader::default(), renderer))
    }

    /// Create a processor with an explicit loader and renderer
    pub fn with_stages(config: MergeConfig, loader: RecordLoader, renderer: HeatmapRenderer) -> Self {
        let merger = CohortMerger::new(config.kernel_size);
        Self {
            config,
            loader,
            merger,
            renderer,
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Run the whole batch over `folders`
    pub fn run<P: AsRef<Path>>(
        &self,
        folders: &[P],
        output_dir: &Path,
    ) -> Result<MergeReport, HeatmapError> {
        let subjects = resolve_folders(folders);
        if subjects.is_empty() {
            info!("no subject folders found");
            return Ok(MergeReport::default());
        }

        let records = self.load_records(&subjects);
        if records.is_empty() {
            info!(subjects = subjects.len(), "no valid heatmap data found");
            return Ok(MergeReport::default());
        }

        // Built from every resolved subject, including those without a record
        let group_map = self.config.fuzzy.then(|| {
            let names: Vec<String> = subjects.iter().map(|s| subject_name(s)).collect();
            build_group_map(&names)
        });
        let cohorts = group_records(records, self.config.fuzzy, group_map.as_ref());

        fs::create_dir_all(output_dir)?;

        let mut report = MergeReport::default();
        for cohort in &cohorts {
            let outcome = self
                .merger
                .merge(&cohort.records)
                .map_err(|e| (FailureStage::Merge, e))
                .and_then(|field| {
                    self.renderer
                        .render_to_file(&field, &cohort.label, output_dir)
                        .map_err(|e| (FailureStage::Write, e))
                });

            match outcome {
                Ok(path) => {
                    info!(cohort = %cohort.label, path = %path.display(), "saved heatmap");
                    report.written.push(path);
                }
                Err((stage, e)) => {
                    error!(cohort = %cohort.label, ?stage, error = %e, "failed to produce heatmap");
                    report.failures.push(CohortFailure {
                        label: cohort.label.clone(),
                        stage,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Load every subject folder, skipping those without a usable record
    pub fn load_records(&self, subjects: &[PathBuf]) -> Vec<RawRecord> {
        let mut records = Vec::with_capacity(subjects.len());
        for folder in subjects {
            match self.loader.load(folder) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(folder = %folder.display(), error = %e, "failed to load subject"),
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_subject(root: &Path, name: &str, shape: &str, rows: usize, cols: usize) {
        let folder = root.join(name);
        fs::create_dir_all(&folder).unwrap();
        let grid: Vec<Vec<f64>> = (0..rows)
            .map(|y| (0..cols).map(|x| ((x + y) % 5) as f64).collect())
            .collect();
        let artifact = json!({
            "heatmap_data": grid,
            "tank_shape": shape,
            "scale_factor": 5.0,
            "total_duration": 20.0,
        });
        fs::write(folder.join("results.json"), artifact.to_string()).unwrap();
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_merge_heatmaps_end_to_end() {
        let data = TempDir::new().unwrap();
        for name in ["A_1", "A_2", "B_1"] {
            write_subject(data.path(), name, "rectangle", 40, 40);
        }
        let out = TempDir::new().unwrap();
        let output_dir = out.path().join("heatmaps");

        let written = merge_heatmaps(&[data.path()], &output_dir, false, 4, 0.8).unwrap();

        assert_eq!(file_names(&written), vec!["a (n=2).png", "b (n=1).png"]);
        assert!(written.iter().all(|p| p.is_file()));
    }

    #[test]
    fn test_no_valid_records_leaves_output_untouched() {
        let data = TempDir::new().unwrap();
        let subject = data.path().join("A_1");
        fs::create_dir_all(&subject).unwrap();
        fs::write(subject.join("results.json"), r#"{"heatmap_data": [[0, 0], [0, 0]]}"#).unwrap();
        let out = TempDir::new().unwrap();
        let output_dir = out.path().join("heatmaps");

        let written = merge_heatmaps(&[data.path()], &output_dir, false, 15, 0.8).unwrap();

        assert!(written.is_empty());
        assert!(!output_dir.exists());
    }

    #[test]
    fn test_fuzzy_run_merges_misspelled_cohorts() {
        let data = TempDir::new().unwrap();
        write_subject(data.path(), "caffeine_1", "trapezoid", 29, 54);
        write_subject(data.path(), "Caffiene_2", "trapezoid", 29, 54);
        write_subject(data.path(), "control_1", "trapezoid", 29, 54);
        let out = TempDir::new().unwrap();

        let processor = HeatmapProcessor::new(MergeConfig::default().with_fuzzy(true)).unwrap();
        let report = processor.run(&[data.path()], out.path()).unwrap();

        let mut names = file_names(&report.written);
        names.sort();
        assert_eq!(names, vec!["caffeine (n=2).png", "control (n=1).png"]);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_write_failure_reported_after_siblings() {
        let data = TempDir::new().unwrap();
        write_subject(data.path(), "A_1", "rectangle", 40, 40);
        write_subject(data.path(), "B_1", "rectangle", 40, 40);
        let out = TempDir::new().unwrap();
        // A directory where cohort a's image should go makes that save fail
        fs::create_dir_all(out.path().join("a (n=1).png")).unwrap();

        let processor = HeatmapProcessor::new(MergeConfig::default()).unwrap();
        let report = processor.run(&[data.path()], out.path()).unwrap();
        assert_eq!(file_names(&report.written), vec!["b (n=1).png"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "a");
        assert_eq!(report.failures[0].stage, FailureStage::Write);

        let result = merge_heatmaps(&[data.path()], out.path(), false, 15, 0.8);
        assert!(matches!(result, Err(HeatmapError::Io(_))));
        assert!(out.path().join("b (n=1).png").is_file());
    }

    #[test]
    fn test_output_dir_that_is_a_file_is_an_error() {
        let data = TempDir::new().unwrap();
        write_subject(data.path(), "A_1", "rectangle", 40, 40);
        let out = TempDir::new().unwrap();
        let blocker = out.path().join("heatmaps");
        fs::write(&blocker, "not a directory").unwrap();

        let result = merge_heatmaps(&[data.path()], &blocker, false, 15, 0.8);
        assert!(matches!(result, Err(HeatmapError::Io(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = HeatmapProcessor::new(MergeConfig::default().with_heatmap_alpha(2.0));
        assert!(matches!(result, Err(HeatmapError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_folder_yields_empty_report() {
        let out = TempDir::new().unwrap();
        let processor = HeatmapProcessor::new(MergeConfig::default()).unwrap();
        let report = processor
            .run(&[out.path().join("does-not-exist")], out.path())
            .unwrap();
        assert!(report.is_empty());
    }
}
