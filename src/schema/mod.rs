//! Per-subject artifact schema
//!
//! This module defines the on-disk document format written by the tracking
//! software: one or more JSON artifacts per subject folder, each either a
//! key/value mapping or a bare 2-D occupancy grid.

mod artifact;

pub use artifact::*;
