//! Confidence bands around the neutral prediction and non-neutral taxa.

pub mod band;
pub mod outliers;
pub mod wilson;

pub use band::{neutral_band, NeutralCurvePoint};
pub use outliers::{
    full_non_neutral, most_non_neutral, DeviationCounts, DEFAULT_OUTLIER_THRESHOLD,
};
pub use wilson::{annotate_neutral, wilson_interval};
