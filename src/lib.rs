//! Findex - cohort heatmaps for animal-tracking recordings
//!
//! Findex merges the per-subject occupancy grids produced by a tracking run into
//! one probability heatmap per experimental cohort: folder resolution → record
//! loading → cohort assignment → geometry normalization → merging → rendering.
//!
//! ## Modules
//!
//! - **Heatmaps**: merge subject grids recorded at different scales into cohort images
//! - **Summary**: tabulate the behavioral measures stored next to each grid

pub mod adapters;
pub mod cohort;
pub mod config;
pub mod error;
pub mod folders;
pub mod merger;
pub mod normalizer;
pub mod pipeline;
pub mod render;
pub mod schema;
pub mod smoothing;
pub mod summary;
pub mod types;

pub use config::MergeConfig;
pub use error::HeatmapError;
pub use folders::resolve_folders;
pub use pipeline::{merge_heatmaps, HeatmapProcessor, MergeReport};
pub use summary::{collect_summary, write_summary_csv};

/// Crate version
pub const FINDEX_VERSION: &str = env!("CARGO_PKG_VERSION");
