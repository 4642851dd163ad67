//! Neutral community model fitting for microbial abundance data.
//!
//! This library fits the Sloan neutral community model to a taxa × samples
//! abundance table and reports the taxa whose occurrence deviates from it.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (CountMatrix, TaxonomyTable, occurrence records)
//! - **filter**: Ignore-level filtering of low-count taxa
//! - **normalize**: Rarefaction to a uniform read depth
//! - **profile**: Library sizes and per-taxon occurrence
//! - **model**: The neutral model and its least-squares fit
//! - **classify**: Wilson confidence bands and non-neutral taxa
//! - **report**: Fit report and output tables
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use comad::prelude::*;
//! use std::path::Path;
//!
//! let (run, paths) = Pipeline::new()
//!     .name("gut")
//!     .rarefaction_level(1000)
//!     .seed(42)
//!     .run_files(Path::new("gut_data.tsv"), Some(Path::new("gut_taxonomy.tsv")), Path::new("out"))
//!     .unwrap();
//!
//! println!("m = {:.4}, R^2 = {:.2}", run.fit.m, run.fit.r_squared);
//! println!("report: {}", paths.report.display());
//! ```

pub mod classify;
pub mod data;
pub mod error;
pub mod filter;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod profile;
pub mod report;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::classify::{
        annotate_neutral, full_non_neutral, most_non_neutral, neutral_band, wilson_interval,
        DeviationCounts, NeutralCurvePoint,
    };
    pub use crate::data::{
        CountMatrix, Deviation, FeatureTable, Lineage, NeutralRecord, OccurrenceRecord,
        OutlierRecord, TaxonomyTable,
    };
    pub use crate::error::{ComadError, Result};
    pub use crate::filter::{filter_ignore_level, filter_ignore_level_with_stats, IgnoreFilterResult};
    pub use crate::model::{fit_neutral_model, neutral_curve, neutral_occurrence, FitConfig, FitResult};
    pub use crate::normalize::{rarefy, rarefy_to_uniform_depth, resolve_depth, RarefactionDepth};
    pub use crate::pipeline::{NeufitConfig, Pipeline, PipelineRun, RunId};
    pub use crate::profile::{profile_library_size, profile_occurrence, LibrarySizeProfile};
    pub use crate::report::{render_report, write_outputs, OutputPaths};
}
