//! Rarefaction: subsampling every sample to a uniform read depth.
//!
//! Reads are drawn without replacement. For a sample with `T` reads the
//! read positions `0..T` are laid out taxon by taxon, `d` distinct positions
//! are chosen uniformly, and each chosen position is mapped back to its taxon
//! through the cumulative counts. The result sums to exactly `d` and never
//! exceeds the original count of any taxon.
//!
//! # Example
//!
//! ```ignore
//! use comad::normalize::rarefy::{rarefy_to_uniform_depth};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let rarefied = rarefy_to_uniform_depth(&counts, 0, &mut rng)?;
//! ```

use crate::data::CountMatrix;
use crate::error::{ComadError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the rarefaction depth was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthChoice {
    /// No depth requested; the smallest sample total was used.
    HighestUniform,
    /// The requested depth was used as-is.
    Custom,
    /// The requested depth exceeded every sample total; the smallest sample
    /// total was used instead.
    FallbackToMinimum { requested: u64 },
}

/// A resolved rarefaction depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RarefactionDepth {
    /// Reads per sample after rarefaction.
    pub depth: u64,
    /// How the depth was chosen.
    pub choice: DepthChoice,
}

impl RarefactionDepth {
    /// Whether the requested depth had to be replaced.
    pub fn is_fallback(&self) -> bool {
        matches!(self.choice, DepthChoice::FallbackToMinimum { .. })
    }
}

impl std::fmt::Display for RarefactionDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.choice {
            DepthChoice::Custom => write!(f, "rarefying to custom rarefaction level")?,
            _ => write!(f, "rarefying to highest possible uniform read depth")?,
        }
        write!(f, "({} reads per sample)", self.depth)
    }
}

/// Resolve the rarefaction depth from the sample totals and a requested depth.
///
/// A request of 0 means "highest possible uniform depth", i.e. the smallest
/// sample total. A request above the largest sample total falls back to the
/// smallest sample total. Any other request is used unchanged, even if some
/// samples are too small for it; [`rarefy`] rejects those.
pub fn resolve_depth(col_sums: &[u64], requested: u64) -> Result<RarefactionDepth> {
    let min_total = col_sums
        .iter()
        .copied()
        .min()
        .ok_or_else(|| ComadError::EmptyData("Count matrix has no samples".to_string()))?;
    let max_total = col_sums.iter().copied().max().unwrap_or(min_total);

    let resolved = if requested == 0 {
        RarefactionDepth {
            depth: min_total,
            choice: DepthChoice::HighestUniform,
        }
    } else if requested > max_total {
        log::warn!(
            "Requested rarefaction level {} exceeds every sample total (max {}); using {}",
            requested,
            max_total,
            min_total
        );
        RarefactionDepth {
            depth: min_total,
            choice: DepthChoice::FallbackToMinimum { requested },
        }
    } else {
        RarefactionDepth {
            depth: requested,
            choice: DepthChoice::Custom,
        }
    };

    if resolved.depth == 0 {
        return Err(ComadError::Rarefaction(
            "At least one sample has no reads; cannot rarefy to a depth of 0".to_string(),
        ));
    }

    Ok(resolved)
}

/// Subsample one sample's counts to exactly `depth` reads without replacement.
pub fn rarefy_column<R: Rng + ?Sized>(column: &[u64], depth: u64, rng: &mut R) -> Result<Vec<u64>> {
    let total: u64 = column.iter().sum();
    if total < depth {
        return Err(ComadError::Rarefaction(format!(
            "Sample has {} reads, fewer than the rarefaction depth {}",
            total, depth
        )));
    }
    if total == depth {
        return Ok(column.to_vec());
    }

    let total = usize::try_from(total)
        .map_err(|_| ComadError::Rarefaction(format!("Sample total {} is too large", total)))?;
    let depth = usize::try_from(depth)
        .map_err(|_| ComadError::Rarefaction(format!("Depth {} is too large", depth)))?;

    // cumulative[i] = reads of taxa 0..=i
    let cumulative: Vec<usize> = column
        .iter()
        .scan(0usize, |acc, &count| {
            *acc += count as usize;
            Some(*acc)
        })
        .collect();

    let mut rarefied = vec![0u64; column.len()];
    for position in rand::seq::index::sample(rng, total, depth).iter() {
        let taxon = cumulative.partition_point(|&c| c <= position);
        rarefied[taxon] += 1;
    }

    Ok(rarefied)
}

/// Rarefy every sample of a count matrix to `depth` reads.
///
/// Samples already at `depth` are kept unchanged; samples with fewer reads
/// are an error. Taxa left without any reads are dropped.
pub fn rarefy<R: Rng + ?Sized>(counts: &CountMatrix, depth: u64, rng: &mut R) -> Result<CountMatrix> {
    let col_sums = counts.col_sums();
    if let Some((idx, &total)) = col_sums.iter().enumerate().find(|(_, &t)| t < depth) {
        return Err(ComadError::Rarefaction(format!(
            "Sample '{}' has {} reads, fewer than the rarefaction depth {}",
            counts.sample_ids()[idx],
            total,
            depth
        )));
    }

    let columns = (0..counts.n_samples())
        .map(|col| rarefy_column(&counts.col_dense(col), depth, &mut *rng))
        .collect::<Result<Vec<_>>>()?;

    let rarefied = CountMatrix::from_columns(
        &columns,
        counts.taxon_ids().to_vec(),
        counts.sample_ids().to_vec(),
    )?;
    rarefied.drop_empty_taxa()
}

/// A count matrix at a uniform read depth.
#[derive(Debug, Clone)]
pub struct Rarefied {
    /// Counts with every sample summing to `depth.depth`.
    pub counts: CountMatrix,
    /// The resolved depth.
    pub depth: RarefactionDepth,
    /// Whether any sample was subsampled.
    pub resampled: bool,
}

/// Resolve the depth and rarefy, unless every sample already has that depth.
pub fn rarefy_to_uniform_depth<R: Rng + ?Sized>(
    counts: &CountMatrix,
    requested: u64,
    rng: &mut R,
) -> Result<Rarefied> {
    let col_sums = counts.col_sums();
    let depth = resolve_depth(&col_sums, requested)?;

    if col_sums.iter().all(|&total| total == depth.depth) {
        return Ok(Rarefied {
            counts: counts.clone(),
            depth,
            resampled: false,
        });
    }

    log::info!(
        "Rarefying {} samples to {} reads",
        counts.n_samples(),
        depth.depth
    );
    let rarefied = rarefy(counts, depth.depth, rng)?;
    Ok(Rarefied {
        counts: rarefied,
        depth,
        resampled: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn matrix(rows: &[Vec<u64>]) -> CountMatrix {
        let taxon_ids = (0..rows.len()).map(|i| format!("otu_{}", i)).collect();
        let sample_ids = (0..rows[0].len()).map(|i| format!("S{}", i)).collect();
        CountMatrix::from_rows(rows, taxon_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_resolve_depth_rules() {
        let sums = [10, 25, 30];
        assert_eq!(
            resolve_depth(&sums, 0).unwrap(),
            RarefactionDepth {
                depth: 10,
                choice: DepthChoice::HighestUniform
            }
        );
        assert_eq!(resolve_depth(&sums, 20).unwrap().choice, DepthChoice::Custom);
        assert_eq!(resolve_depth(&sums, 30).unwrap().depth, 30);

        let fallback = resolve_depth(&sums, 31).unwrap();
        assert_eq!(fallback.depth, 10);
        assert!(fallback.is_fallback());
    }

    #[test]
    fn test_resolve_depth_zero_total_is_error() {
        assert!(matches!(
            resolve_depth(&[0, 5], 0),
            Err(ComadError::Rarefaction(_))
        ));
        assert!(resolve_depth(&[], 0).is_err());
    }

    #[test]
    fn test_rarefy_column_exact_depth() {
        let column = vec![7, 0, 13, 1, 29];
        let mut rng = StdRng::seed_from_u64(7);
        for depth in [1, 5, 20, 49] {
            let rarefied = rarefy_column(&column, depth, &mut rng).unwrap();
            assert_eq!(rarefied.iter().sum::<u64>(), depth);
            for (after, before) in rarefied.iter().zip(&column) {
                assert!(after <= before);
            }
        }
    }

    #[test]
    fn test_rarefy_column_at_depth_is_unchanged() {
        let column = vec![3, 0, 2];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(rarefy_column(&column, 5, &mut rng).unwrap(), column);
    }

    #[test]
    fn test_rarefy_column_too_small_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            rarefy_column(&[1, 2], 4, &mut rng),
            Err(ComadError::Rarefaction(_))
        ));
    }

    #[test]
    fn test_rarefy_is_reproducible_with_seed() {
        let counts = matrix(&[vec![50, 10, 70], vec![25, 90, 5], vec![25, 0, 25]]);
        let a = rarefy(&counts, 40, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = rarefy(&counts, 40, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a.taxon_ids(), b.taxon_ids());
        for row in 0..a.n_taxa() {
            assert_eq!(a.row_dense(row), b.row_dense(row));
        }
    }

    #[test]
    fn test_rarefy_scenario_drops_empty_taxa() {
        // totals 10, 25, 30; taxon 1 only appears in the second sample
        let counts = matrix(&[vec![10, 20, 30], vec![0, 5, 0]]);
        let mut rng = StdRng::seed_from_u64(3);
        let rarefied = rarefy_to_uniform_depth(&counts, 10, &mut rng).unwrap();

        assert!(rarefied.resampled);
        assert_eq!(rarefied.depth.depth, 10);
        assert!(rarefied.counts.col_sums().iter().all(|&s| s == 10));
        for row in 0..rarefied.counts.n_taxa() {
            assert!(rarefied.counts.row_dense(row).iter().sum::<u64>() > 0);
        }
        let kept_otu_1 = rarefied.counts.taxon_ids().iter().any(|id| id == "otu_1");
        let otu_1_reads: u64 = rarefied
            .counts
            .taxon_ids()
            .iter()
            .position(|id| id == "otu_1")
            .map(|row| rarefied.counts.row_dense(row).iter().sum())
            .unwrap_or(0);
        assert_eq!(kept_otu_1, otu_1_reads > 0);
    }

    #[test]
    fn test_all_zero_taxon_after_rarefaction_is_dropped() {
        // Rarefying the second sample from 2 reads to 1 keeps exactly one of
        // the two singleton taxa; the other has no reads anywhere.
        let counts = matrix(&[vec![1, 1], vec![0, 1]]);
        let rarefied = rarefy(&counts, 1, &mut StdRng::seed_from_u64(11)).unwrap();
        assert!(rarefied.n_taxa() >= 1);
        assert!(rarefied.row_sums().iter().all(|&s| s > 0));
        assert_eq!(rarefied.col_sums(), vec![1, 1]);
    }

    #[test]
    fn test_uniform_depth_skips_resampling() {
        let counts = matrix(&[vec![4, 2], vec![1, 3]]);
        let mut rng = StdRng::seed_from_u64(5);
        let rarefied = rarefy_to_uniform_depth(&counts, 0, &mut rng).unwrap();
        assert!(!rarefied.resampled);
        assert_eq!(rarefied.counts.row_dense(0), vec![4, 2]);
    }

    #[test]
    fn test_custom_depth_below_some_totals_fails() {
        let counts = matrix(&[vec![10, 20, 30]]);
        let mut rng = StdRng::seed_from_u64(5);
        let err = rarefy_to_uniform_depth(&counts, 15, &mut rng).unwrap_err();
        assert!(matches!(err, ComadError::Rarefaction(_)));
    }

    #[test]
    fn test_display_matches_report_wording() {
        let auto = RarefactionDepth {
            depth: 10,
            choice: DepthChoice::HighestUniform,
        };
        assert_eq!(
            auto.to_string(),
            "rarefying to highest possible uniform read depth(10 reads per sample)"
        );
        let custom = RarefactionDepth {
            depth: 8,
            choice: DepthChoice::Custom,
        };
        assert_eq!(
            custom.to_string(),
            "rarefying to custom rarefaction level(8 reads per sample)"
        );
    }
}
