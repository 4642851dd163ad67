//! Feature-table ingestion.
//!
//! Reads a tab-separated feature table as exported by common microbiome
//! tooling and splits it into an abundance matrix and a taxonomy table:
//!
//! ```text
//! # Constructed from biom file
//! #OTU ID   S1    S2    taxonomy
//! otu_1     12.0  0.0   k__Bacteria; p__Firmicutes
//! ```
//!
//! Comment lines before the header are skipped. The taxonomy column is
//! optional and is recognised by its name.

use crate::data::count_matrix::parse_count;
use crate::data::taxonomy::{Lineage, TaxonomyTable, RANKS};
use crate::data::CountMatrix;
use crate::error::{ComadError, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// An abundance matrix together with the taxonomy found in the same file.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub counts: CountMatrix,
    pub taxonomy: Option<TaxonomyTable>,
}

/// Paths written by [`FeatureTable::write_data_taxonomy`].
#[derive(Debug, Clone)]
pub struct ExtractedTables {
    pub data_path: PathBuf,
    pub taxonomy_path: Option<PathBuf>,
}

impl FeatureTable {
    /// Load a feature table from a TSV file.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = loop {
            let line = lines
                .next()
                .ok_or_else(|| ComadError::EmptyData("Feature table has no header".to_string()))??;
            let line = line.trim_end_matches('\r').to_string();
            if line.trim().is_empty() {
                continue;
            }
            // The header itself usually starts with "#OTU ID"
            if line.starts_with('#') && !line.contains('\t') {
                continue;
            }
            break line;
        };

        let header: Vec<&str> = header_line.split('\t').collect();
        let taxonomy_col = header
            .iter()
            .rposition(|h| h.trim().eq_ignore_ascii_case("taxonomy"))
            .filter(|&idx| idx > 0);
        let sample_end = taxonomy_col.unwrap_or(header.len());
        if sample_end < 2 {
            return Err(ComadError::EmptyData(
                "Feature table must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..sample_end].iter().map(|s| s.to_string()).collect();
        let n_samples = sample_ids.len();

        let mut rows: Vec<Vec<u64>> = Vec::new();
        let mut taxon_ids: Vec<String> = Vec::new();
        let mut taxonomy = taxonomy_col.map(|_| TaxonomyTable::with_default_ranks());

        for line_result in lines {
            let line = line_result?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let row_idx = rows.len();
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != header.len() {
                return Err(ComadError::RaggedRow {
                    row: row_idx,
                    expected: header.len(),
                    actual: fields.len(),
                });
            }

            let mut row = Vec::with_capacity(n_samples);
            for (col_idx, raw) in fields[1..sample_end].iter().enumerate() {
                let value = parse_count(raw).ok_or_else(|| ComadError::InvalidCount {
                    value: raw.to_string(),
                    row: row_idx,
                    col: col_idx,
                })?;
                row.push(value);
            }

            let taxon_id = fields[0].to_string();
            if let (Some(table), Some(col)) = (taxonomy.as_mut(), taxonomy_col) {
                table.insert(&taxon_id, Lineage::parse(fields[col], RANKS.len()));
            }
            taxon_ids.push(taxon_id);
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(ComadError::EmptyData("No taxa in feature table".to_string()));
        }

        let counts = CountMatrix::from_rows(&rows, taxon_ids, sample_ids)?;
        Ok(Self { counts, taxonomy })
    }

    /// Write the pre-extracted data and taxonomy tables under `<dir>/data_tax_csv/`.
    pub fn write_data_taxonomy<P: AsRef<Path>>(&self, dir: P, name: &str) -> Result<ExtractedTables> {
        let out_dir = dir.as_ref().join("data_tax_csv");
        fs::create_dir_all(&out_dir)?;

        let data_path = out_dir.join(format!("{}_data.tsv", name));
        self.counts.to_tsv(&data_path)?;

        let taxonomy_path = match &self.taxonomy {
            Some(table) => {
                let path = out_dir.join(format!("{}_taxonomy.tsv", name));
                table.to_tsv(&path, self.counts.taxon_ids())?;
                Some(path)
            }
            None => None,
        };

        Ok(ExtractedTables {
            data_path,
            taxonomy_path,
        })
    }
}
