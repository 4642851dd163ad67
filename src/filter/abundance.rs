//! Read-count filtering applied before rarefaction.

use crate::data::CountMatrix;
use crate::error::{ComadError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Drop taxa whose total read count across all samples is at or below `ignore_level`.
///
/// An `ignore_level` of 0 removes only taxa that are absent from every sample.
///
/// # Returns
/// A new CountMatrix containing only taxa with more than `ignore_level` reads.
pub fn filter_ignore_level(counts: &CountMatrix, ignore_level: u64) -> Result<CountMatrix> {
    let row_sums = counts.row_sums();

    let keep_indices: Vec<usize> = (0..counts.n_taxa())
        .into_par_iter()
        .filter(|&row| row_sums[row] > ignore_level)
        .collect();

    if keep_indices.is_empty() {
        return Err(ComadError::Rarefaction(format!(
            "No taxa have more than {} reads; nothing left to rarefy",
            ignore_level
        )));
    }

    counts.subset_taxa(&keep_indices)
}

/// Result of ignore-level filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreFilterResult {
    /// Threshold applied.
    pub ignore_level: u64,
    /// Number of taxa before filtering.
    pub n_before: usize,
    /// Number of taxa after filtering.
    pub n_after: usize,
    /// Proportion of total reads retained.
    pub reads_retained: f64,
}

impl IgnoreFilterResult {
    /// Number of taxa removed.
    pub fn n_removed(&self) -> usize {
        self.n_before - self.n_after
    }
}

impl std::fmt::Display for IgnoreFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Ignore-level filter (> {} reads)", self.ignore_level)?;
        writeln!(f, "  Taxa before:    {}", self.n_before)?;
        writeln!(f, "  Taxa after:     {}", self.n_after)?;
        writeln!(f, "  Reads retained: {:.1}%", self.reads_retained * 100.0)?;
        Ok(())
    }
}

/// Filter with statistics about what was filtered.
pub fn filter_ignore_level_with_stats(
    counts: &CountMatrix,
    ignore_level: u64,
) -> Result<(CountMatrix, IgnoreFilterResult)> {
    let n_before = counts.n_taxa();
    let total_reads_before: u64 = counts.row_sums().iter().sum();

    let filtered = filter_ignore_level(counts, ignore_level)?;

    let total_reads_after: u64 = filtered.row_sums().iter().sum();
    let result = IgnoreFilterResult {
        ignore_level,
        n_before,
        n_after: filtered.n_taxa(),
        reads_retained: if total_reads_before > 0 {
            total_reads_after as f64 / total_reads_before as f64
        } else {
            0.0
        },
    };

    Ok((filtered, result))
}
