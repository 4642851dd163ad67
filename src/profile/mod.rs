//! Profiling primitives: per-sample read totals and per-taxon occurrence.

mod library_size;
mod occurrence;

pub use library_size::{profile_library_size, LibrarySizeProfile};
pub use occurrence::profile_occurrence;
