//! Running the neutral-model analysis end to end.

mod run;
mod runner;

pub use run::{PipelineRun, RunId, RunSummary};
pub use runner::{NeufitConfig, Pipeline};
