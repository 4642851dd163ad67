//! Non-neutral taxa: outside the confidence band, or far from the prediction.

use crate::data::{Deviation, NeutralRecord, OutlierRecord};
use std::cmp::Ordering;

/// Default magnitude threshold for [`most_non_neutral`].
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 0.5;

/// Records whose observed occurrence lies strictly outside the confidence band.
///
/// Records above the band come first, then records below it, each group in
/// input order.
pub fn full_non_neutral(records: &[NeutralRecord]) -> Vec<NeutralRecord> {
    let above = records.iter().filter(|r| r.deviation() == Deviation::Above);
    let below = records.iter().filter(|r| r.deviation() == Deviation::Below);
    above.chain(below).cloned().collect()
}

/// Records whose |occurrence − prediction| exceeds `threshold`, largest first.
///
/// Equal differences keep their input order.
pub fn most_non_neutral(records: &[NeutralRecord], threshold: f64) -> Vec<OutlierRecord> {
    let mut outliers: Vec<OutlierRecord> = records
        .iter()
        .filter(|r| r.difference() > threshold)
        .map(|r| OutlierRecord {
            difference: r.difference(),
            record: r.clone(),
        })
        .collect();

    outliers.sort_by(|a, b| {
        b.difference
            .partial_cmp(&a.difference)
            .unwrap_or(Ordering::Equal)
    });
    outliers
}

/// Counts of records per [`Deviation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviationCounts {
    pub above: usize,
    pub below: usize,
    pub neutral: usize,
}

impl DeviationCounts {
    pub fn from_records(records: &[NeutralRecord]) -> Self {
        records
            .iter()
            .fold(Self::default(), |mut counts, r| {
                match r.deviation() {
                    Deviation::Above => counts.above += 1,
                    Deviation::Below => counts.below += 1,
                    Deviation::Neutral => counts.neutral += 1,
                }
                counts
            })
    }

    /// Number of records outside the band.
    pub fn non_neutral(&self) -> usize {
        self.above + self.below
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OccurrenceRecord;

    fn neutral(otu_id: &str, occurrence: f64, predicted: f64) -> NeutralRecord {
        NeutralRecord {
            record: OccurrenceRecord {
                otu_id: otu_id.to_string(),
                mean_abundance: 0.01,
                occurrence,
                lineage: None,
            },
            predicted_occurrence: predicted,
            lower_conf_int: (predicted - 0.1).max(0.0),
            upper_conf_int: (predicted + 0.1).min(1.0),
        }
    }

    #[test]
    fn test_full_non_neutral_above_then_below() {
        let records = vec![
            neutral("below1", 0.1, 0.5),
            neutral("above1", 0.9, 0.5),
            neutral("inside", 0.55, 0.5),
            neutral("below2", 0.0, 0.3),
            neutral("above2", 0.8, 0.2),
        ];
        let ids: Vec<String> = full_non_neutral(&records)
            .into_iter()
            .map(|r| r.record.otu_id)
            .collect();
        assert_eq!(ids, vec!["above1", "above2", "below1", "below2"]);
    }

    #[test]
    fn test_band_edge_is_neutral() {
        let mut on_edge = neutral("edge", 0.6, 0.5);
        on_edge.upper_conf_int = 0.6;
        assert!(full_non_neutral(&[on_edge]).is_empty());
    }

    #[test]
    fn test_magnitude_threshold() {
        let records = vec![neutral("far", 0.9, 0.1), neutral("near", 0.5, 0.1)];
        let outliers = most_non_neutral(&records, DEFAULT_OUTLIER_THRESHOLD);

        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].record.record.otu_id, "far");
        assert!((outliers[0].difference - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_outliers_sorted_descending_stable() {
        let records = vec![
            neutral("a", 0.75, 0.125),
            neutral("b", 1.0, 0.0),
            neutral("c", 0.0, 0.625),
            neutral("d", 0.0, 0.875),
        ];
        let ids: Vec<String> = most_non_neutral(&records, 0.5)
            .into_iter()
            .map(|o| o.record.record.otu_id)
            .collect();
        // a and c both differ by 0.625
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let records = vec![neutral("exact", 0.75, 0.25)];
        assert!(most_non_neutral(&records, 0.5).is_empty());
    }

    #[test]
    fn test_deviation_counts() {
        let records = vec![
            neutral("a", 0.9, 0.5),
            neutral("b", 0.1, 0.5),
            neutral("c", 0.5, 0.5),
        ];
        let counts = DeviationCounts::from_records(&records);
        assert_eq!(counts, DeviationCounts { above: 1, below: 1, neutral: 1 });
        assert_eq!(counts.non_neutral(), 2);
    }
}
