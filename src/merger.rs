//! Cohort merging
//!
//! Combines the records of one cohort into a single probability field:
//! 1. Keep records sharing the first record's container shape
//! 2. Resample everything to the finest scale present and mask the container
//! 3. Average, smooth, and divide by the mean recording duration

use crate::error::HeatmapError;
use crate::normalizer::GeometryNormalizer;
use crate::smoothing::{coerce_kernel_size, gaussian_blur};
use crate::types::{ContainerShape, MergedField, RawRecord};
use ndarray::Array2;
use tracing::{debug, warn};

/// Default Gaussian kernel size
pub const DEFAULT_KERNEL_SIZE: usize = 15;

/// Merger for turning a cohort's records into one field
#[derive(Debug, Clone)]
pub struct CohortMerger {
    kernel_size: usize,
}

impl Default for CohortMerger {
    fn default() -> Self {
        Self::new(DEFAULT_KERNEL_SIZE)
    }
}

impl CohortMerger {
    /// Create a merger; even kernel sizes are bumped to the next odd value
    pub fn new(kernel_size: usize) -> Self {
        Self {
            kernel_size: coerce_kernel_size(kernel_size),
        }
    }

    /// Kernel size actually used for smoothing
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Merge `records` into one field.
    ///
    /// Records that cannot be brought onto the common grid are logged and left
    /// out; if none remain the cohort is empty.
    pub fn merge(&self, records: &[RawRecord]) -> Result<MergedField, HeatmapError> {
        let (shape, survivors) = reconcile_shape(records)?;

        let target_scale = survivors
            .iter()
            .map(|record| record.scale)
            .fold(f64::INFINITY, f64::min);

        let mut merged: Vec<(&RawRecord, Array2<f64>)> = Vec::with_capacity(survivors.len());
        for record in survivors {
            match normalize_record(record, target_scale, shape) {
                Ok(grid) => {
                    if let Some((_, first)) = merged.first() {
                        if first.dim() != grid.dim() {
                            let mismatch = HeatmapError::DimensionMismatch {
                                expected: first.dim(),
                                found: grid.dim(),
                            };
                            warn!(subject = %record.subject, error = %mismatch, "excluding record from merge");
                            continue;
                        }
                    }
                    merged.push((record, grid));
                }
                Err(e) => warn!(subject = %record.subject, error = %e, "excluding record from merge"),
            }
        }

        if merged.is_empty() {
            return Err(HeatmapError::EmptyCohort(format!(
                "no {} record could be normalized",
                shape
            )));
        }

        let sample_size = merged.len();
        let mut average = Array2::<f64>::zeros(merged[0].1.dim());
        for (_, grid) in &merged {
            average += grid;
        }
        average /= sample_size as f64;

        let smoothed = gaussian_blur(&average, self.kernel_size);

        let duration = mean_duration(merged.iter().map(|(record, _)| *record));
        let probability_field = if duration > 0.0 {
            smoothed / duration
        } else {
            smoothed
        };

        debug!(
            shape = %shape,
            scale = target_scale,
            sample_size,
            mean_duration = duration,
            kernel_size = self.kernel_size,
            "merged cohort"
        );

        Ok(MergedField {
            shape,
            scale: target_scale,
            probability_field,
            sample_size,
        })
    }
}

/// Keep only records matching the first record's shape
fn reconcile_shape(
    records: &[RawRecord],
) -> Result<(ContainerShape, Vec<&RawRecord>), HeatmapError> {
    let first = records
        .first()
        .ok_or_else(|| HeatmapError::EmptyCohort("no records to merge".to_string()))?;
    let shape = first.shape;

    let survivors: Vec<&RawRecord> = records
        .iter()
        .filter(|record| {
            let keep = record.shape == shape;
            if !keep {
                debug!(
                    subject = %record.subject,
                    shape = %record.shape,
                    cohort_shape = %shape,
                    "dropping record with mismatched container shape"
                );
            }
            keep
        })
        .collect();

    Ok((shape, survivors))
}

/// Resample one record to the target scale and mask its container
fn normalize_record(
    record: &RawRecord,
    target_scale: f64,
    shape: ContainerShape,
) -> Result<Array2<f64>, HeatmapError> {
    let mut grid = GeometryNormalizer::normalize(&record.grid, record.scale, target_scale, shape)?;
    GeometryNormalizer::apply_container_mask(&mut grid, shape, target_scale);
    Ok(grid)
}

/// Mean of the known durations, `1.0` when none is known
fn mean_duration<'a>(records: impl Iterator<Item = &'a RawRecord>) -> f64 {
    let durations: Vec<f64> = records.filter_map(|record| record.total_duration).collect();
    if durations.is_empty() {
        1.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn record(
        subject: &str,
        grid: Array2<f64>,
        shape: ContainerShape,
        scale: f64,
        total_duration: Option<f64>,
    ) -> RawRecord {
        RawRecord {
            subject: subject.to_string(),
            grid,
            shape,
            scale,
            total_duration,
            trapezoid_side: None,
        }
    }

    fn pattern(seed: usize) -> Array2<f64> {
        Array2::from_shape_fn((40, 40), |(y, x)| ((y * 7 + x * 3 + seed) % 11) as f64)
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = CohortMerger::default().merge(&[]);
        assert!(matches!(result, Err(HeatmapError::EmptyCohort(_))));
    }

    #[test]
    fn test_kernel_size_coerced() {
        assert_eq!(CohortMerger::new(14).kernel_size(), 15);
        assert_eq!(CohortMerger::new(4).kernel_size(), 5);
        assert_eq!(CohortMerger::default().kernel_size(), 15);
    }

    #[test]
    fn test_probability_scaling() {
        let a = pattern(0);
        let b = pattern(5);
        let records = vec![
            record("A_1", a.clone(), ContainerShape::Rectangle, 5.0, Some(10.0)),
            record("A_2", b.clone(), ContainerShape::Rectangle, 5.0, Some(10.0)),
        ];

        let field = CohortMerger::new(1).merge(&records).unwrap();
        let expected = (&a + &b) / 2.0 / 10.0;

        assert_eq!(field.sample_size, 2);
        assert_eq!(field.shape, ContainerShape::Rectangle);
        assert_eq!(field.scale, 5.0);
        for (got, want) in field.probability_field.iter().zip(expected.iter()) {
            assert!((got - want).abs() < EPS);
        }
    }

    #[test]
    fn test_missing_durations_leave_field_unscaled() {
        let grid = pattern(2);
        let records = vec![record("A_1", grid.clone(), ContainerShape::Rectangle, 5.0, None)];

        let field = CohortMerger::new(1).merge(&records).unwrap();
        assert_eq!(field.probability_field, grid);
    }

    #[test]
    fn test_partial_durations_averaged() {
        let records = vec![
            record("A_1", pattern(0), ContainerShape::Rectangle, 5.0, Some(20.0)),
            record("A_2", pattern(0), ContainerShape::Rectangle, 5.0, None),
            record("A_3", pattern(0), ContainerShape::Rectangle, 5.0, Some(40.0)),
        ];
        assert!((mean_duration(records.iter()) - 30.0).abs() < EPS);

        let field = CohortMerger::new(1).merge(&records).unwrap();
        let expected = pattern(0) / 30.0;
        for (got, want) in field.probability_field.iter().zip(expected.iter()) {
            assert!((got - want).abs() < EPS);
        }
    }

    #[test]
    fn test_non_positive_duration_skips_division() {
        let grid = pattern(1);
        let records = vec![record("A_1", grid.clone(), ContainerShape::Rectangle, 5.0, Some(0.0))];

        let field = CohortMerger::new(1).merge(&records).unwrap();
        assert_eq!(field.probability_field, grid);
    }

    #[test]
    fn test_first_seen_shape_wins() {
        let records = vec![
            record("A_1", pattern(0), ContainerShape::Trapezoid, 5.0, None),
            record("A_2", pattern(0), ContainerShape::Rectangle, 5.0, None),
            record("A_3", pattern(0), ContainerShape::Rectangle, 5.0, None),
        ];

        let field = CohortMerger::new(1).merge(&records).unwrap();
        assert_eq!(field.shape, ContainerShape::Trapezoid);
        assert_eq!(field.sample_size, 1);
        assert!(field.sample_size <= records.len());
    }

    #[test]
    fn test_sample_size_equals_input_when_shapes_agree() {
        let records: Vec<RawRecord> = (0..4)
            .map(|i| {
                record(
                    &format!("A_{i}"),
                    pattern(i),
                    ContainerShape::Rectangle,
                    5.0,
                    Some(10.0),
                )
            })
            .collect();

        let field = CohortMerger::default().merge(&records).unwrap();
        assert_eq!(field.sample_size, records.len());
    }

    #[test]
    fn test_finest_scale_is_target() {
        let coarse = Array2::ones((40, 40));
        let fine = Array2::ones((80, 80));
        let records = vec![
            record("A_1", coarse, ContainerShape::Rectangle, 5.0, None),
            record("A_2", fine, ContainerShape::Rectangle, 2.5, None),
        ];

        let field = CohortMerger::new(1).merge(&records).unwrap();
        assert_eq!(field.scale, 2.5);
        assert_eq!(field.probability_field.dim(), (80, 80));
        // Coarse grid only covers the top-left quarter of the finer frame
        assert_eq!(field.probability_field[[0, 0]], 1.0);
        assert_eq!(field.probability_field[[79, 79]], 0.5);
    }

    #[test]
    fn test_trapezoid_grids_masked() {
        let records = vec![
            record("T_1", Array2::ones((58, 108)), ContainerShape::Trapezoid, 2.5, None),
            record("T_2", Array2::ones((29, 54)), ContainerShape::Trapezoid, 5.0, None),
        ];

        let field = CohortMerger::new(1).merge(&records).unwrap();
        let (rows, cols) = field.probability_field.dim();
        assert_eq!((rows, cols), (58, 108));
        assert_eq!(field.probability_field[[rows - 1, 0]], 0.0);
        assert_eq!(field.probability_field[[rows - 1, cols - 1]], 0.0);
    }

    #[test]
    fn test_unknown_shape_at_common_scale_merges() {
        let records = vec![
            record("U_1", Array2::ones((3, 3)), ContainerShape::Unknown, 5.0, None),
            record("U_2", Array2::ones((3, 3)), ContainerShape::Unknown, 5.0, None),
        ];

        let field = CohortMerger::new(1).merge(&records).unwrap();
        assert_eq!(field.sample_size, 2);
    }

    #[test]
    fn test_unknown_shape_needing_resample_excluded() {
        let records = vec![
            record("U_1", Array2::ones((3, 3)), ContainerShape::Unknown, 5.0, None),
            record("U_2", Array2::ones((6, 6)), ContainerShape::Unknown, 2.5, None),
        ];

        // The finer record passes through unchanged, the coarser one cannot be resampled
        let field = CohortMerger::new(1).merge(&records).unwrap();
        assert_eq!(field.sample_size, 1);
        assert_eq!(field.probability_field.dim(), (6, 6));
    }

    #[test]
    fn test_mismatched_dimensions_excluded() {
        let records = vec![
            record("A_1", Array2::ones((40, 40)), ContainerShape::Rectangle, 5.0, None),
            record("A_2", Array2::ones((41, 40)), ContainerShape::Rectangle, 5.0, None),
        ];

        let field = CohortMerger::new(1).merge(&records).unwrap();
        assert_eq!(field.sample_size, 1);
    }
}
