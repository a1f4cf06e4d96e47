//! Merge configuration
//!
//! Settings for a heatmap run. Every field has a default, so a configuration
//! file only needs the keys it wants to change.

use crate::error::HeatmapError;
use crate::merger::DEFAULT_KERNEL_SIZE;
use crate::smoothing::MAX_KERNEL_SIZE;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default heatmap opacity
pub const DEFAULT_HEATMAP_ALPHA: f64 = 0.8;

/// Default width of the heatmap area in rendered images
pub const DEFAULT_HEATMAP_WIDTH_PX: u32 = 600;

/// Settings for merging and rendering cohort heatmaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Merge near-duplicate cohort spellings
    pub fuzzy: bool,
    /// Gaussian kernel size (even values are bumped to the next odd one)
    pub kernel_size: usize,
    /// Heatmap opacity over the white background, `0..=1`
    pub heatmap_alpha: f64,
    /// Approximate width of the heatmap area in pixels
    pub heatmap_width_px: u32,
    /// TrueType font for captions; system fonts are searched when unset
    pub font_path: Option<PathBuf>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            fuzzy: false,
            kernel_size: DEFAULT_KERNEL_SIZE,
            heatmap_alpha: DEFAULT_HEATMAP_ALPHA,
            heatmap_width_px: DEFAULT_HEATMAP_WIDTH_PX,
            font_path: None,
        }
    }
}

impl MergeConfig {
    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, HeatmapError> {
        let config: MergeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self, HeatmapError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    pub fn with_heatmap_alpha(mut self, alpha: f64) -> Self {
        self.heatmap_alpha = alpha;
        self
    }

    pub fn with_font_path(mut self, path: PathBuf) -> Self {
        self.font_path = Some(path);
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), HeatmapError> {
        if !(0.0..=1.0).contains(&self.heatmap_alpha) {
            return Err(HeatmapError::InvalidConfig(format!(
                "heatmap_alpha must be within 0..=1, got {}",
                self.heatmap_alpha
            )));
        }
        if self.kernel_size > MAX_KERNEL_SIZE {
            return Err(HeatmapError::InvalidConfig(format!(
                "kernel_size must be at most {}, got {}",
                MAX_KERNEL_SIZE, self.kernel_size
            )));
        }
        if self.heatmap_width_px == 0 {
            return Err(HeatmapError::InvalidConfig(
                "heatmap_width_px must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Timestamped output folder name, `Heatmaps_YYYYmmdd_HHMMSS`
pub fn default_output_dir(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("Heatmaps_{}", now.format("%Y%m%d_%H%M%S")))
}
