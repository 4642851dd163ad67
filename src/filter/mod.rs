//! Filtering primitives for count matrices.

pub mod abundance;

pub use abundance::{filter_ignore_level, filter_ignore_level_with_stats, IgnoreFilterResult};
