//! Sparse abundance matrix of integer read counts.

use crate::error::{ComadError, Result};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A sparse count matrix storing taxon read counts across samples.
///
/// Rows represent taxa (OTUs), columns represent samples. Every taxon has a
/// count for every sample; absent entries are zero.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (taxa × samples)
    data: CsMat<u64>,
    /// Taxon identifiers (row names)
    taxon_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(data: CsMat<u64>, taxon_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != taxon_ids.len() {
            return Err(ComadError::DimensionMismatch {
                expected: nrows,
                actual: taxon_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(ComadError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            taxon_ids,
            sample_ids,
        })
    }

    /// Build a matrix from dense rows, one row per taxon.
    ///
    /// Fails if any row does not have exactly one count per sample.
    pub fn from_rows(
        rows: &[Vec<u64>],
        taxon_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        if rows.len() != taxon_ids.len() {
            return Err(ComadError::DimensionMismatch {
                expected: taxon_ids.len(),
                actual: rows.len(),
            });
        }
        let n_samples = sample_ids.len();
        let mut tri_mat = TriMat::new((rows.len(), n_samples));
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != n_samples {
                return Err(ComadError::RaggedRow {
                    row: row_idx,
                    expected: n_samples,
                    actual: row.len(),
                });
            }
            for (col_idx, &value) in row.iter().enumerate() {
                if value > 0 {
                    tri_mat.add_triplet(row_idx, col_idx, value);
                }
            }
        }
        Self::new(tri_mat.to_csr(), taxon_ids, sample_ids)
    }

    /// Build a matrix from dense sample columns, one column per sample.
    pub fn from_columns(
        columns: &[Vec<u64>],
        taxon_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        if columns.len() != sample_ids.len() {
            return Err(ComadError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: columns.len(),
            });
        }
        let n_taxa = taxon_ids.len();
        let mut tri_mat = TriMat::new((n_taxa, columns.len()));
        for (col_idx, column) in columns.iter().enumerate() {
            if column.len() != n_taxa {
                return Err(ComadError::DimensionMismatch {
                    expected: n_taxa,
                    actual: column.len(),
                });
            }
            for (row_idx, &value) in column.iter().enumerate() {
                if value > 0 {
                    tri_mat.add_triplet(row_idx, col_idx, value);
                }
            }
        }
        Self::new(tri_mat.to_csr(), taxon_ids, sample_ids)
    }

    /// Load a count matrix from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first column is the taxon ID header)
    /// - Subsequent rows: taxon ID followed by one non-negative integer count per sample
    ///
    /// Counts written as integral decimals (`12.0`) are accepted. Rows with a
    /// different number of fields than the header are rejected.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| ComadError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.trim_end_matches('\r').split('\t').collect();
        if header.len() < 2 {
            return Err(ComadError::EmptyData(
                "TSV must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.to_string()).collect();
        let n_samples = sample_ids.len();

        let mut triplets: Vec<(usize, usize, u64)> = Vec::new();
        let mut taxon_ids: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let row_idx = taxon_ids.len();
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != n_samples + 1 {
                return Err(ComadError::RaggedRow {
                    row: row_idx,
                    expected: n_samples + 1,
                    actual: fields.len(),
                });
            }

            taxon_ids.push(fields[0].to_string());

            for (col_idx, value_str) in fields[1..].iter().enumerate() {
                let value = parse_count(value_str).ok_or_else(|| ComadError::InvalidCount {
                    value: value_str.to_string(),
                    row: row_idx,
                    col: col_idx,
                })?;
                if value > 0 {
                    triplets.push((row_idx, col_idx, value));
                }
            }
        }

        let n_taxa = taxon_ids.len();
        if n_taxa == 0 {
            return Err(ComadError::EmptyData("No taxa in TSV".to_string()));
        }

        let mut tri_mat = TriMat::new((n_taxa, n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), taxon_ids, sample_ids)
    }

    /// Write the count matrix to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "otu_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row_idx, taxon_id) in self.taxon_ids.iter().enumerate() {
            write!(writer, "{}", taxon_id)?;
            for value in self.row_dense(row_idx) {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.data.get(row, col).copied().unwrap_or(0)
    }

    /// Number of taxa (rows).
    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Taxon identifiers.
    #[inline]
    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get a dense vector for a specific row (taxon).
    pub fn row_dense(&self, row: usize) -> Vec<u64> {
        let mut dense = vec![0u64; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Get a dense vector for a specific column (sample).
    pub fn col_dense(&self, col: usize) -> Vec<u64> {
        let mut dense = vec![0u64; self.n_taxa()];
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            if let Some(&val) = row_vec.get(col) {
                dense[row] = val;
            }
        }
        dense
    }

    /// Number of samples in which each taxon has a non-zero count.
    pub fn row_nnz(&self) -> Vec<usize> {
        self.data
            .outer_iterator()
            .map(|row_vec| row_vec.iter().filter(|(_, &val)| val > 0).count())
            .collect()
    }

    /// Compute row sums (total reads per taxon).
    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.n_taxa())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().map(|(_, &val)| val).sum())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Compute column sums (read totals per sample).
    pub fn col_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Subset the matrix to include only specified taxa (by index).
    pub fn subset_taxa(&self, indices: &[usize]) -> Result<Self> {
        let n_taxa = indices.len();
        let n_samples = self.n_samples();

        let mut tri_mat = TriMat::new((n_taxa, n_samples));
        let mut new_taxon_ids = Vec::with_capacity(n_taxa);

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_taxa() {
                return Err(ComadError::InvalidParameter(format!(
                    "Taxon index {} out of bounds",
                    old_row
                )));
            }
            new_taxon_ids.push(self.taxon_ids[old_row].clone());

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_taxon_ids, self.sample_ids.clone())
    }

    /// Drop taxa whose count is zero in every sample.
    pub fn drop_empty_taxa(&self) -> Result<Self> {
        let keep: Vec<usize> = self
            .row_sums()
            .iter()
            .enumerate()
            .filter(|(_, &sum)| sum > 0)
            .map(|(i, _)| i)
            .collect();
        self.subset_taxa(&keep)
    }
}

/// Parse a read count, accepting integral decimals such as `12.0`.
pub(crate) fn parse_count(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return Some(value);
    }
    let value: f64 = trimmed.parse().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
        Some(value as u64)
    } else {
        None
    }
}
