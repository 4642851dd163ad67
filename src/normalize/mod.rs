//! Read-depth normalization by rarefaction.

pub mod rarefy;

pub use rarefy::{
    rarefy, rarefy_column, rarefy_to_uniform_depth, resolve_depth, DepthChoice, Rarefied,
    RarefactionDepth,
};
