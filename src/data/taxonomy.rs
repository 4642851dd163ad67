//! Taxonomic lineages keyed by taxon identifier.

use crate::error::{ComadError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Default rank names, in order.
pub const RANKS: [&str; 7] = [
    "Kingdom", "Phylum", "Class", "Order", "Family", "Genus", "Species",
];

/// An ordered list of rank names for one taxon.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Lineage(pub Vec<String>);

impl Lineage {
    /// Build a lineage from a `;`-separated string such as `k__Bacteria; p__Firmicutes`.
    ///
    /// Segments are positional: an empty segment stays an empty rank. The
    /// result is padded with empty ranks (or truncated) to `n_ranks`.
    pub fn parse(raw: &str, n_ranks: usize) -> Self {
        let mut ranks: Vec<String> = raw.split(';').map(|s| s.trim().to_string()).collect();
        ranks.resize(n_ranks, String::new());
        Self(ranks)
    }

    /// Rank value at a position, empty if missing.
    pub fn rank(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or("")
    }

    /// Number of ranks.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the lineage has no ranks.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Taxonomy table: one lineage per taxon identifier.
#[derive(Debug, Clone)]
pub struct TaxonomyTable {
    rank_names: Vec<String>,
    lineages: HashMap<String, Lineage>,
}

impl TaxonomyTable {
    /// Create an empty table with the given rank names.
    pub fn new(rank_names: Vec<String>) -> Self {
        Self {
            rank_names,
            lineages: HashMap::new(),
        }
    }

    /// Create an empty table with the seven standard ranks.
    pub fn with_default_ranks() -> Self {
        Self::new(RANKS.iter().map(|r| r.to_string()).collect())
    }

    /// Insert or replace the lineage for a taxon. Shorter lineages are padded.
    pub fn insert(&mut self, taxon_id: &str, mut lineage: Lineage) {
        lineage.0.resize(self.rank_names.len(), String::new());
        self.lineages.insert(taxon_id.to_string(), lineage);
    }

    /// Load a taxonomy table from a TSV file.
    ///
    /// Expected format:
    /// - First row: header; the first column is the taxon ID header, the
    ///   remaining columns name the ranks
    /// - Subsequent rows: taxon ID followed by rank values (missing trailing
    ///   ranks are left empty)
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| ComadError::EmptyData("Empty taxonomy file".to_string()))??;
        let header: Vec<&str> = header_line.trim_end_matches('\r').split('\t').collect();
        if header.len() < 2 {
            return Err(ComadError::EmptyData(
                "Taxonomy must have at least one rank column".to_string(),
            ));
        }
        let rank_names: Vec<String> = header[1..].iter().map(|s| s.to_string()).collect();
        let n_ranks = rank_names.len();
        let mut table = Self::new(rank_names);

        for (row_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() > n_ranks + 1 {
                return Err(ComadError::RaggedRow {
                    row: row_idx,
                    expected: n_ranks + 1,
                    actual: fields.len(),
                });
            }
            let ranks = fields[1..].iter().map(|s| s.trim().to_string()).collect();
            table.insert(fields[0], Lineage(ranks));
        }

        Ok(table)
    }

    /// Write the table to a TSV file, rows ordered by `order`.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P, order: &[String]) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "otu_id")?;
        for rank in &self.rank_names {
            write!(writer, "\t{}", rank)?;
        }
        writeln!(writer)?;

        for taxon_id in order {
            if let Some(lineage) = self.lineages.get(taxon_id) {
                write!(writer, "{}", taxon_id)?;
                for i in 0..self.rank_names.len() {
                    write!(writer, "\t{}", lineage.rank(i))?;
                }
                writeln!(writer)?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    /// Rank names in column order.
    pub fn rank_names(&self) -> &[String] {
        &self.rank_names
    }

    /// Lineage for a taxon, if present.
    pub fn get(&self, taxon_id: &str) -> Option<&Lineage> {
        self.lineages.get(taxon_id)
    }

    /// Number of taxa with a lineage.
    pub fn len(&self) -> usize {
        self.lineages.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.lineages.is_empty()
    }
}
