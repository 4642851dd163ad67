//! The neutral community model and its least-squares fit.

pub mod fit;
pub mod levmar;
pub mod neutral;

pub use fit::{fit_neutral_model, FitConfig, FitResult};
pub use levmar::{levenberg_marquardt, LevMarConfig, LevMarSolution, Termination};
pub use neutral::{neutral_curve, neutral_occurrence};
