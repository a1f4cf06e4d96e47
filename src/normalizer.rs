//! Geometry normalization
//!
//! This module brings occupancy grids recorded at different physical scales onto
//! a common grid:
//! - Target dimensions follow from the container's real size and the target scale
//! - Coarser grids are placed top-left into the larger target frame
//! - Finer grids are resampled by nearest neighbour
//! - Trapezoidal containers are masked to their true silhouette

use crate::error::HeatmapError;
use crate::types::{mm_to_cells, ContainerPreset, ContainerShape};
use ndarray::{s, Array2};

/// Scales closer than this are treated as equal
const SCALE_EPSILON: f64 = 1e-9;

/// Normalizer for resampling grids between physical scales
pub struct GeometryNormalizer;

impl GeometryNormalizer {
    /// Resample `grid` from `current_scale` to the grid implied by `target_scale`.
    ///
    /// Equal scales return the grid unchanged, even for shapes without a preset.
    pub fn normalize(
        grid: &Array2<f64>,
        current_scale: f64,
        target_scale: f64,
        shape: ContainerShape,
    ) -> Result<Array2<f64>, HeatmapError> {
        if (current_scale - target_scale).abs() < SCALE_EPSILON {
            return Ok(grid.clone());
        }

        let preset = shape
            .preset()
            .ok_or_else(|| HeatmapError::UnknownShape(shape.to_string()))?;
        let (rows, cols) = preset.dimensions_at(target_scale);

        let ratio = current_scale / target_scale;
        if ratio >= 1.0 {
            Ok(place_top_left(grid, rows, cols, ratio))
        } else {
            Ok(resize_nearest(grid, rows, cols))
        }
    }

    /// Zero every cell outside the container's silhouette at `scale`
    pub fn apply_container_mask(grid: &mut Array2<f64>, shape: ContainerShape, scale: f64) {
        if let Some(preset) = shape.preset() {
            mask_to_preset(grid, preset, scale);
        }
    }
}

/// Target dimensions `(rows, cols)` for `shape` at `scale`
pub fn target_dimensions(
    shape: ContainerShape,
    scale: f64,
) -> Result<(usize, usize), HeatmapError> {
    shape
        .preset()
        .map(|preset| preset.dimensions_at(scale))
        .ok_or_else(|| HeatmapError::UnknownShape(shape.to_string()))
}

/// Mask `grid` against an explicit preset; rectangles are left untouched
pub fn mask_to_preset(grid: &mut Array2<f64>, preset: &ContainerPreset, scale: f64) {
    if let ContainerPreset::Trapezoid {
        top_width_mm,
        bottom_width_mm,
        ..
    } = *preset
    {
        mask_trapezoid(
            grid,
            mm_to_cells(top_width_mm, scale),
            mm_to_cells(bottom_width_mm, scale),
        );
    }
}

/// Keep a centered span per row whose width runs linearly from `top_width`
/// (first row) to `bottom_width` (last row); zero everything else.
pub fn mask_trapezoid(grid: &mut Array2<f64>, top_width: usize, bottom_width: usize) {
    let (rows, cols) = grid.dim();
    for (y, mut row) in grid.rows_mut().into_iter().enumerate() {
        let (start, end) = row_span(y, rows, cols, top_width, bottom_width);
        row.slice_mut(s![..start]).fill(0.0);
        row.slice_mut(s![end..]).fill(0.0);
    }
}

/// Half-open column span `[start, end)` kept at row `y`
pub fn row_span(
    y: usize,
    rows: usize,
    cols: usize,
    top_width: usize,
    bottom_width: usize,
) -> (usize, usize) {
    let width = if rows > 1 {
        let t = y as f64 / (rows - 1) as f64;
        top_width as f64 + t * (bottom_width as f64 - top_width as f64)
    } else {
        top_width as f64
    };
    let width = (width.max(0.0) as usize).min(cols);
    let start = (cols - width) / 2;
    (start, start + width)
}

/// Copy the top-left overlap of `grid` into a zeroed `rows` x `cols` frame.
///
/// The copied region is cropped to `source_dim * ratio` per axis; values are
/// not interpolated.
fn place_top_left(grid: &Array2<f64>, rows: usize, cols: usize, ratio: f64) -> Array2<f64> {
    let (src_rows, src_cols) = grid.dim();
    let copy_rows = ((src_rows as f64 * ratio) as usize).min(rows).min(src_rows);
    let copy_cols = ((src_cols as f64 * ratio) as usize).min(cols).min(src_cols);

    let mut placed = Array2::zeros((rows, cols));
    placed
        .slice_mut(s![..copy_rows, ..copy_cols])
        .assign(&grid.slice(s![..copy_rows, ..copy_cols]));
    placed
}

/// Nearest-neighbour resample to exactly `rows` x `cols`
fn resize_nearest(grid: &Array2<f64>, rows: usize, cols: usize) -> Array2<f64> {
    let (src_rows, src_cols) = grid.dim();
    if src_rows == 0 || src_cols == 0 {
        return Array2::zeros((rows, cols));
    }

    let row_step = src_rows as f64 / rows.max(1) as f64;
    let col_step = src_cols as f64 / cols.max(1) as f64;

    Array2::from_shape_fn((rows, cols), |(y, x)| {
        let sy = ((y as f64 * row_step) as usize).min(src_rows - 1);
        let sx = ((x as f64 * col_step) as usize).min(src_cols - 1);
        grid[[sy, sx]]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RECTANGLE_PRESET, TRAPEZOID_PRESET};

    fn ramp(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(y, x)| (y * cols + x) as f64 + 1.0)
    }

    #[test]
    fn test_identity_resampling() {
        let grid = ramp(7, 3);
        for shape in [
            ContainerShape::Rectangle,
            ContainerShape::Trapezoid,
            ContainerShape::Unknown,
        ] {
            for scale in [1.0, 2.5, 5.0, 7.3] {
                let out = GeometryNormalizer::normalize(&grid, scale, scale, shape).unwrap();
                assert_eq!(out, grid);
            }
        }
    }

    #[test]
    fn test_dimension_contract() {
        let grid = ramp(40, 40);
        for target in [1.0, 2.0, 2.5, 3.0, 4.0, 6.0, 10.0] {
            let rect = GeometryNormalizer::normalize(&grid, 5.0, target, ContainerShape::Rectangle)
                .unwrap();
            let expected = (
                (200.0_f64 / target).round() as usize,
                (200.0_f64 / target).round() as usize,
            );
            assert_eq!(rect.dim(), expected, "rectangle at scale {target}");

            let trap = GeometryNormalizer::normalize(&grid, 5.0, target, ContainerShape::Trapezoid)
                .unwrap();
            let expected = (
                (145.0_f64 / target).round() as usize,
                (270.0_f64 / target).round() as usize,
            );
            assert_eq!(trap.dim(), expected, "trapezoid at scale {target}");
        }
    }

    #[test]
    fn test_unknown_shape_rejected() {
        let grid = ramp(4, 4);
        let result = GeometryNormalizer::normalize(&grid, 5.0, 2.5, ContainerShape::Unknown);
        assert!(matches!(result, Err(HeatmapError::UnknownShape(_))));
        assert!(target_dimensions(ContainerShape::Unknown, 5.0).is_err());
    }

    #[test]
    fn test_coarse_source_placed_top_left() {
        // 40x40 at scale 5 -> 80x80 at scale 2.5; the source fits entirely
        let grid = ramp(40, 40);
        let out =
            GeometryNormalizer::normalize(&grid, 5.0, 2.5, ContainerShape::Rectangle).unwrap();

        assert_eq!(out.dim(), (80, 80));
        assert_eq!(out.slice(s![..40, ..40]), grid);
        assert!(out.slice(s![40.., ..]).iter().all(|&v| v == 0.0));
        assert!(out.slice(s![.., 40..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_coarse_source_cropped_to_frame() {
        // Oversized source: only the target frame is kept
        let grid = ramp(100, 100);
        let out =
            GeometryNormalizer::normalize(&grid, 5.0, 4.0, ContainerShape::Rectangle).unwrap();

        assert_eq!(out.dim(), (50, 50));
        assert_eq!(out.slice(s![.., ..]), grid.slice(s![..50, ..50]));
    }

    #[test]
    fn test_fine_source_nearest_neighbour() {
        let grid = ramp(80, 80);
        let out =
            GeometryNormalizer::normalize(&grid, 2.5, 5.0, ContainerShape::Rectangle).unwrap();

        assert_eq!(out.dim(), (40, 40));
        assert_eq!(out[[0, 0]], grid[[0, 0]]);
        assert_eq!(out[[1, 1]], grid[[2, 2]]);
        assert_eq!(out[[39, 20]], grid[[78, 40]]);
    }

    #[test]
    fn test_rectangle_not_masked() {
        let mut grid = Array2::ones((40, 40));
        GeometryNormalizer::apply_container_mask(&mut grid, ContainerShape::Rectangle, 5.0);
        assert!(grid.iter().all(|&v| v == 1.0));

        mask_to_preset(&mut grid, &RECTANGLE_PRESET, 5.0);
        assert!(grid.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_trapezoid_mask_preset() {
        let (rows, cols) = TRAPEZOID_PRESET.dimensions_at(5.0);
        let mut grid = Array2::ones((rows, cols));
        GeometryNormalizer::apply_container_mask(&mut grid, ContainerShape::Trapezoid, 5.0);

        // Top row spans the full 54 cells, bottom row narrows to 44
        let top: f64 = grid.row(0).sum();
        let bottom: f64 = grid.row(rows - 1).sum();
        assert_eq!(top, 54.0);
        assert_eq!(bottom, 44.0);
        assert_eq!(grid[[rows - 1, 4]], 0.0);
        assert_eq!(grid[[rows - 1, 5]], 1.0);
        assert_eq!(grid[[rows - 1, 48]], 1.0);
        assert_eq!(grid[[rows - 1, 49]], 0.0);
    }

    #[test]
    fn test_trapezoid_mask_monotonic_when_widening() {
        let widening = ContainerPreset::Trapezoid {
            top_width_mm: 100.0,
            bottom_width_mm: 200.0,
            height_mm: 100.0,
            default_scale: 5.0,
        };
        let (rows, cols) = widening.dimensions_at(5.0);
        let mut grid = Array2::ones((rows, cols));
        mask_to_preset(&mut grid, &widening, 5.0);

        let widths: Vec<f64> = grid.rows().into_iter().map(|r| r.sum()).collect();
        assert!(widths[0] < widths[rows - 1]);
        assert!(widths.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(widths[0], 20.0);
        assert_eq!(widths[rows - 1], 40.0);
    }

    #[test]
    fn test_row_span_single_row() {
        assert_eq!(row_span(0, 1, 10, 6, 2), (2, 8));
        // Spans never exceed the frame
        assert_eq!(row_span(0, 3, 4, 10, 10), (0, 4));
    }
}
