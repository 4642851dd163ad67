//! Read totals per sample, as listed at the top of the fit report.

use crate::data::CountMatrix;
use serde::{Deserialize, Serialize};

/// Read totals of every sample in a count matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySizeProfile {
    /// Sample identifiers, in matrix order.
    pub sample_ids: Vec<String>,
    /// Total reads per sample.
    pub library_sizes: Vec<u64>,
    /// Mean library size.
    pub mean: f64,
    /// Median library size.
    pub median: f64,
    /// Minimum library size.
    pub min: u64,
    /// Maximum library size.
    pub max: u64,
}

impl LibrarySizeProfile {
    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.library_sizes.len()
    }

    /// Whether every sample already has the same number of reads.
    pub fn is_uniform(&self) -> bool {
        self.min == self.max
    }

    /// Iterate over `(sample_id, reads)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.sample_ids
            .iter()
            .map(String::as_str)
            .zip(self.library_sizes.iter().copied())
    }
}

impl std::fmt::Display for LibrarySizeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Dataset contains {} samples (sample_id, reads): ",
            self.n_samples()
        )?;
        for (sample_id, reads) in self.iter() {
            writeln!(f, "{}\t{}", sample_id, reads)?;
        }
        Ok(())
    }
}

/// Profile the read totals of a count matrix.
pub fn profile_library_size(counts: &CountMatrix) -> LibrarySizeProfile {
    let library_sizes = counts.col_sums();
    let n_samples = library_sizes.len();

    let mean = if n_samples > 0 {
        library_sizes.iter().sum::<u64>() as f64 / n_samples as f64
    } else {
        0.0
    };

    LibrarySizeProfile {
        sample_ids: counts.sample_ids().to_vec(),
        mean,
        median: median_u64(&library_sizes),
        min: library_sizes.iter().copied().min().unwrap_or(0),
        max: library_sizes.iter().copied().max().unwrap_or(0),
        library_sizes,
    }
}

fn median_u64(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    } else {
        sorted[n / 2] as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_matrix() -> CountMatrix {
        // library sizes 100, 200, 150, 50
        let rows = vec![
            vec![40, 80, 60, 20],
            vec![50, 100, 75, 25],
            vec![10, 20, 15, 5],
        ];
        let taxon_ids = vec!["A".into(), "B".into(), "C".into()];
        let sample_ids = vec!["S1".into(), "S2".into(), "S3".into(), "S4".into()];
        CountMatrix::from_rows(&rows, taxon_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_profile_library_size() {
        let profile = profile_library_size(&create_test_matrix());

        assert_eq!(profile.n_samples(), 4);
        assert_eq!(profile.library_sizes, vec![100, 200, 150, 50]);
        assert_eq!(profile.min, 50);
        assert_eq!(profile.max, 200);
        assert!((profile.mean - 125.0).abs() < 1e-10);
        assert!((profile.median - 125.0).abs() < 1e-10);
        assert!(!profile.is_uniform());
    }

    #[test]
    fn test_display_lists_every_sample() {
        let text = profile_library_size(&create_test_matrix()).to_string();
        assert!(text.starts_with("Dataset contains 4 samples (sample_id, reads): \n"));
        assert!(text.contains("S2\t200\n"));
        assert!(text.contains("S4\t50\n"));
    }
}
