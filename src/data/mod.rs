//! Data structures for neutral model fitting.

mod count_matrix;
mod feature_table;
mod occurrence;
mod taxonomy;

pub use count_matrix::CountMatrix;
pub use feature_table::{ExtractedTables, FeatureTable};
pub use occurrence::{Deviation, NeutralRecord, OccurrenceRecord, OutlierRecord};
pub use taxonomy::{Lineage, TaxonomyTable, RANKS};
