//! Core types for the Findex pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! heatmap merge: container geometry presets, per-subject raw records, cohorts,
//! and the merged per-cohort field handed to the renderer.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale used when an artifact carries no `scale_factor` and the shape has no preset
pub const DEFAULT_SCALE: f64 = 5.0;

/// Container (tank) shape identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerShape {
    Rectangle,
    Trapezoid,
    #[serde(other)]
    Unknown,
}

impl ContainerShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerShape::Rectangle => "rectangle",
            ContainerShape::Trapezoid => "trapezoid",
            ContainerShape::Unknown => "unknown",
        }
    }

    /// Parse a shape identifier; anything unrecognized maps to `Unknown`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "rectangle" => ContainerShape::Rectangle,
            "trapezoid" => ContainerShape::Trapezoid,
            _ => ContainerShape::Unknown,
        }
    }

    /// Reference geometry for this shape, if one is registered
    pub fn preset(&self) -> Option<&'static ContainerPreset> {
        match self {
            ContainerShape::Rectangle => Some(&RECTANGLE_PRESET),
            ContainerShape::Trapezoid => Some(&TRAPEZOID_PRESET),
            ContainerShape::Unknown => None,
        }
    }

    /// Scale assumed when a record does not state one
    pub fn default_scale(&self) -> f64 {
        self.preset()
            .map(ContainerPreset::default_scale)
            .unwrap_or(DEFAULT_SCALE)
    }
}

impl fmt::Display for ContainerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed real-world geometry of a container, in millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContainerPreset {
    Rectangle {
        width_mm: f64,
        height_mm: f64,
        default_scale: f64,
    },
    Trapezoid {
        top_width_mm: f64,
        bottom_width_mm: f64,
        height_mm: f64,
        default_scale: f64,
    },
}

/// 200 x 200 mm rectangular tank
pub const RECTANGLE_PRESET: ContainerPreset = ContainerPreset::Rectangle {
    width_mm: 200.0,
    height_mm: 200.0,
    default_scale: 5.0,
};

/// Trapezoidal tank: 270 mm across the top, 220 mm across the bottom, 145 mm high
pub const TRAPEZOID_PRESET: ContainerPreset = ContainerPreset::Trapezoid {
    top_width_mm: 270.0,
    bottom_width_mm: 220.0,
    height_mm: 145.0,
    default_scale: 5.0,
};

impl ContainerPreset {
    pub fn shape(&self) -> ContainerShape {
        match self {
            ContainerPreset::Rectangle { .. } => ContainerShape::Rectangle,
            ContainerPreset::Trapezoid { .. } => ContainerShape::Trapezoid,
        }
    }

    /// Width of the bounding frame (the wider edge for trapezoids)
    pub fn frame_width_mm(&self) -> f64 {
        match *self {
            ContainerPreset::Rectangle { width_mm, .. } => width_mm,
            ContainerPreset::Trapezoid {
                top_width_mm,
                bottom_width_mm,
                ..
            } => top_width_mm.max(bottom_width_mm),
        }
    }

    pub fn height_mm(&self) -> f64 {
        match *self {
            ContainerPreset::Rectangle { height_mm, .. }
            | ContainerPreset::Trapezoid { height_mm, .. } => height_mm,
        }
    }

    pub fn default_scale(&self) -> f64 {
        match *self {
            ContainerPreset::Rectangle { default_scale, .. }
            | ContainerPreset::Trapezoid { default_scale, .. } => default_scale,
        }
    }

    /// Grid dimensions `(rows, cols)` of this container at `scale` mm per cell
    pub fn dimensions_at(&self, scale: f64) -> (usize, usize) {
        (
            mm_to_cells(self.height_mm(), scale),
            mm_to_cells(self.frame_width_mm(), scale),
        )
    }
}

/// Convert a physical length to a whole number of cells
pub(crate) fn mm_to_cells(length_mm: f64, scale: f64) -> usize {
    (length_mm / scale).round().max(0.0) as usize
}

/// One subject's occupancy recording
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Subject folder name (`<Cohort>_<Index>`)
    pub subject: String,
    /// Occupancy grid, rows x cols
    pub grid: Array2<f64>,
    pub shape: ContainerShape,
    /// Millimetres per grid cell
    pub scale: f64,
    /// Total recording duration in seconds
    pub total_duration: Option<f64>,
    /// Auxiliary trapezoid orientation info, passed through untouched
    pub trapezoid_side: Option<serde_json::Value>,
}

impl RawRecord {
    pub fn dimensions(&self) -> (usize, usize) {
        self.grid.dim()
    }
}

/// Subjects grouped under one condition label
#[derive(Debug, Clone)]
pub struct Cohort {
    pub label: String,
    pub records: Vec<RawRecord>,
}

/// Cohort-level merge result
#[derive(Debug, Clone, PartialEq)]
pub struct MergedField {
    /// Shape shared by every merged record
    pub shape: ContainerShape,
    /// Common target scale (the finest among the merged records)
    pub scale: f64,
    /// Smoothed occupancy divided by the mean recording duration
    pub probability_field: Array2<f64>,
    /// Number of records that went into the average
    pub sample_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_parse() {
        assert_eq!(ContainerShape::parse("Rectangle"), ContainerShape::Rectangle);
        assert_eq!(ContainerShape::parse(" trapezoid "), ContainerShape::Trapezoid);
        assert_eq!(ContainerShape::parse("circle"), ContainerShape::Unknown);
    }

    #[test]
    fn test_shape_serde() {
        let shape: ContainerShape = serde_json::from_str("\"trapezoid\"").unwrap();
        assert_eq!(shape, ContainerShape::Trapezoid);

        let other: ContainerShape = serde_json::from_str("\"hexagon\"").unwrap();
        assert_eq!(other, ContainerShape::Unknown);

        assert_eq!(
            serde_json::to_string(&ContainerShape::Rectangle).unwrap(),
            "\"rectangle\""
        );
    }

    #[test]
    fn test_preset_dimensions() {
        assert_eq!(RECTANGLE_PRESET.dimensions_at(5.0), (40, 40));
        assert_eq!(TRAPEZOID_PRESET.dimensions_at(5.0), (29, 54));
        assert_eq!(RECTANGLE_PRESET.dimensions_at(2.5), (80, 80));
        // 145 / 10 = 14.5 rounds away from zero
        assert_eq!(TRAPEZOID_PRESET.dimensions_at(10.0), (15, 27));
    }

    #[test]
    fn test_default_scale() {
        assert_eq!(ContainerShape::Rectangle.default_scale(), 5.0);
        assert_eq!(ContainerShape::Unknown.default_scale(), DEFAULT_SCALE);
        assert!(ContainerShape::Unknown.preset().is_none());
    }
}
