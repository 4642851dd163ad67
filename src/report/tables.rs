//! Delimited tables of annotated taxa, outliers and the neutral curve.

use crate::classify::NeutralCurvePoint;
use crate::data::{NeutralRecord, OutlierRecord};
use crate::error::Result;
use std::io::Write;

/// Column header of the outlier table's difference column.
pub const DIFFERENCE_COLUMN: &str = "Difference off Neutral Model";

fn lineage_fields(record: &NeutralRecord, n_ranks: usize) -> Vec<String> {
    (0..n_ranks)
        .map(|i| {
            record
                .record
                .lineage
                .as_ref()
                .map(|l| l.rank(i).to_string())
                .unwrap_or_default()
        })
        .collect()
}

fn neutral_header(rank_names: &[String]) -> Vec<String> {
    let mut header = vec![
        "otu_id".to_string(),
        "mean_abundance".to_string(),
        "occurrence".to_string(),
    ];
    header.extend(rank_names.iter().cloned());
    header.extend(
        ["predicted_occurrence", "lower_conf_int", "upper_conf_int"]
            .iter()
            .map(|s| s.to_string()),
    );
    header
}

/// Write annotated records with every field, one row per taxon.
///
/// Columns: `otu_id`, `mean_abundance`, `occurrence`, one column per rank,
/// `predicted_occurrence`, `lower_conf_int`, `upper_conf_int`.
pub fn write_neutral_records<W: Write>(
    writer: W,
    records: &[NeutralRecord],
    rank_names: &[String],
    delimiter: u8,
) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    wtr.write_record(neutral_header(rank_names))?;

    for r in records {
        let mut row = vec![
            r.record.otu_id.clone(),
            r.record.mean_abundance.to_string(),
            r.record.occurrence.to_string(),
        ];
        row.extend(lineage_fields(r, rank_names.len()));
        row.push(r.predicted_occurrence.to_string());
        row.push(r.lower_conf_int.to_string());
        row.push(r.upper_conf_int.to_string());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the outlier table: the difference, the taxon ID and its ranks.
pub fn write_outliers<W: Write>(
    writer: W,
    outliers: &[OutlierRecord],
    rank_names: &[String],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec![DIFFERENCE_COLUMN.to_string(), "otu_id".to_string()];
    header.extend(rank_names.iter().cloned());
    wtr.write_record(&header)?;

    for outlier in outliers {
        let mut row = vec![
            outlier.difference.to_string(),
            outlier.record.record.otu_id.clone(),
        ];
        row.extend(lineage_fields(&outlier.record, rank_names.len()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the neutral curve and its band as a tab-separated table.
pub fn write_curve<W: Write>(writer: W, curve: &[NeutralCurvePoint]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    for point in curve {
        wtr.serialize(point)?;
    }
    wtr.flush()?;
    Ok(())
}
