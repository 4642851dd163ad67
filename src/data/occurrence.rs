//! Per-taxon occurrence records and their annotated forms.
//!
//! Each analysis stage produces a fresh value rather than filling in fields
//! of an earlier one: the summarizer yields [`OccurrenceRecord`]s, the
//! classifier wraps them into [`NeutralRecord`]s once a prediction and its
//! confidence band are known, and the outlier view ranks those as
//! [`OutlierRecord`]s.

use crate::data::taxonomy::Lineage;
use serde::{Deserialize, Serialize};

/// Occurrence statistics for one taxon after rarefaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    /// Taxon identifier.
    pub otu_id: String,
    /// Reads of this taxon divided by (reads per sample × samples).
    pub mean_abundance: f64,
    /// Fraction of samples with a non-zero count.
    pub occurrence: f64,
    /// Taxonomic ranks, if a taxonomy table was joined.
    pub lineage: Option<Lineage>,
}

/// Where an observed occurrence lies relative to its confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deviation {
    /// Observed occurrence is above the upper bound.
    Above,
    /// Observed occurrence is below the lower bound.
    Below,
    /// Observed occurrence is inside the band.
    Neutral,
}

/// An occurrence record with its neutral prediction and confidence band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutralRecord {
    #[serde(flatten)]
    pub record: OccurrenceRecord,
    /// Occurrence predicted by the fitted neutral model.
    pub predicted_occurrence: f64,
    /// Lower bound of the confidence interval around the prediction.
    pub lower_conf_int: f64,
    /// Upper bound of the confidence interval around the prediction.
    pub upper_conf_int: f64,
}

impl NeutralRecord {
    /// Classify the observed occurrence against the confidence band.
    ///
    /// Bounds are exclusive: an occurrence equal to a bound is neutral.
    pub fn deviation(&self) -> Deviation {
        if self.record.occurrence > self.upper_conf_int {
            Deviation::Above
        } else if self.record.occurrence < self.lower_conf_int {
            Deviation::Below
        } else {
            Deviation::Neutral
        }
    }

    /// Absolute difference between observed and predicted occurrence.
    pub fn difference(&self) -> f64 {
        (self.record.occurrence - self.predicted_occurrence).abs()
    }
}

/// A taxon far from the neutral prediction, ranked by its difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierRecord {
    /// |occurrence − predicted_occurrence|.
    pub difference: f64,
    pub record: NeutralRecord,
}
