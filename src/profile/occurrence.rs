//! Occurrence and mean relative abundance per taxon.

use crate::data::{CountMatrix, OccurrenceRecord, TaxonomyTable};
use crate::error::{ComadError, Result};
use std::cmp::Ordering;

/// Summarize a rarefied count matrix into one [`OccurrenceRecord`] per taxon.
///
/// For each taxon:
/// - `mean_abundance` = total reads / (`reads_per_sample` × samples)
/// - `occurrence` = samples with a non-zero count / samples
///
/// Records are sorted ascending by `mean_abundance`; ties keep matrix order.
/// When a taxonomy table is given its lineages are left-joined by taxon ID:
/// taxa missing from the table get no lineage, and table rows for taxa not
/// in the matrix are ignored.
///
/// # Arguments
/// * `counts` - Count matrix in which every sample has `reads_per_sample` reads
/// * `reads_per_sample` - The rarefaction depth
/// * `taxonomy` - Optional taxonomy to join
pub fn profile_occurrence(
    counts: &CountMatrix,
    reads_per_sample: u64,
    taxonomy: Option<&TaxonomyTable>,
) -> Result<Vec<OccurrenceRecord>> {
    let n_samples = counts.n_samples();
    if n_samples == 0 {
        return Err(ComadError::EmptyData("Count matrix has no samples".to_string()));
    }
    if reads_per_sample == 0 {
        return Err(ComadError::InvalidParameter(
            "reads_per_sample must be positive".to_string(),
        ));
    }

    let total_reads = reads_per_sample as f64 * n_samples as f64;
    let row_sums = counts.row_sums();
    let row_nnz = counts.row_nnz();

    let mut records: Vec<OccurrenceRecord> = counts
        .taxon_ids()
        .iter()
        .enumerate()
        .map(|(row, otu_id)| OccurrenceRecord {
            otu_id: otu_id.clone(),
            mean_abundance: row_sums[row] as f64 / total_reads,
            occurrence: row_nnz[row] as f64 / n_samples as f64,
            lineage: taxonomy.and_then(|t| t.get(otu_id).cloned()),
        })
        .collect();

    records.sort_by(|a, b| {
        a.mean_abundance
            .partial_cmp(&b.mean_abundance)
            .unwrap_or(Ordering::Equal)
    });

    Ok(records)
}
