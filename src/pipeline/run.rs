//! The immutable record of one neutral-model run.

use crate::classify::{DeviationCounts, NeutralCurvePoint};
use crate::data::{NeutralRecord, OutlierRecord};
use crate::filter::IgnoreFilterResult;
use crate::model::FitResult;
use crate::normalize::RarefactionDepth;
use crate::profile::LibrarySizeProfile;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies a run: dataset nickname plus start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunId {
    pub name: String,
    pub timestamp: DateTime<Local>,
}

impl RunId {
    pub fn new(name: &str, timestamp: DateTime<Local>) -> Self {
        Self {
            name: name.to_string(),
            timestamp,
        }
    }

    /// A run identifier stamped with the current local time.
    pub fn now(name: &str) -> Self {
        Self::new(name, Local::now())
    }

    /// Common prefix of every output file, e.g. `gut_2024-03-01_14-05-09`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.name, self.timestamp.format("%Y-%m-%d_%H-%M-%S"))
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_stem())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: RunId,
    /// Abundance table the run was read from, if it came from a file.
    pub data_file: Option<PathBuf>,
    /// Taxa removed by the ignore level.
    pub ignore_filter: IgnoreFilterResult,
    /// Read totals per sample after the ignore level, before rarefaction.
    pub library_sizes: LibrarySizeProfile,
    pub depth: RarefactionDepth,
    /// Whether any sample had to be subsampled.
    pub resampled: bool,
    pub n_samples: usize,
    /// Taxa left after rarefaction.
    pub n_taxa: usize,
    /// Rank columns of the joined taxonomy; empty without taxonomy.
    pub rank_names: Vec<String>,
    /// All taxa, ascending by mean abundance.
    pub records: Vec<NeutralRecord>,
    pub fit: FitResult,
    /// Taxa outside the confidence band: above first, then below.
    pub full_non_neutral: Vec<NeutralRecord>,
    /// Taxa beyond the magnitude threshold, largest difference first.
    pub outliers: Vec<OutlierRecord>,
    pub outlier_threshold: f64,
    /// Fitted curve and band on a log-spaced abundance grid.
    pub curve: Vec<NeutralCurvePoint>,
}

impl PipelineRun {
    /// Reads per sample the model was fitted at.
    pub fn n_reads(&self) -> u64 {
        self.depth.depth
    }

    pub fn r_squared(&self) -> f64 {
        self.fit.r_squared
    }

    pub fn deviation_counts(&self) -> DeviationCounts {
        DeviationCounts::from_records(&self.records)
    }

    /// Compact machine-readable overview.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.to_string(),
            name: self.run_id.name.clone(),
            timestamp: self.run_id.timestamp,
            data_file: self.data_file.clone(),
            ignore_level: self.ignore_filter.ignore_level,
            n_taxa_ignored: self.ignore_filter.n_removed(),
            depth: self.depth,
            resampled: self.resampled,
            n_samples: self.n_samples,
            n_taxa: self.n_taxa,
            m: self.fit.m,
            m_stderr: self.fit.m_stderr,
            r_squared: self.fit.r_squared,
            deviations: self.deviation_counts(),
            n_outliers: self.outliers.len(),
            outlier_threshold: self.outlier_threshold,
        }
    }
}

/// Serializable overview of a [`PipelineRun`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub name: String,
    pub timestamp: DateTime<Local>,
    pub data_file: Option<PathBuf>,
    pub ignore_level: u64,
    pub n_taxa_ignored: usize,
    pub depth: RarefactionDepth,
    pub resampled: bool,
    pub n_samples: usize,
    pub n_taxa: usize,
    pub m: f64,
    pub m_stderr: Option<f64>,
    pub r_squared: f64,
    pub deviations: DeviationCounts,
    pub n_outliers: usize,
    pub outlier_threshold: f64,
}
