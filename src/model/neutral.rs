//! Neutral community model prediction curve.
//!
//! Under the Sloan neutral model the long-term abundance of a taxon with
//! mean relative abundance `p` in a community of `N` reads with migration
//! rate `m` follows a Beta(`N·m·p`, `N·m·(1−p)`) distribution. A taxon is
//! detected in a sample when its abundance exceeds one read, so the expected
//! occurrence frequency is the Beta CDF truncated to `[1/N, 1]`:
//!
//! ```text
//! F(p; N, m) = I(1; α, β) − I(1/N; α, β),   α = N·m·p,  β = N·m·(1−p)
//! ```
//!
//! where `I` is the regularized incomplete beta function.

use crate::error::{ComadError, Result};
use statrs::function::beta::checked_beta_reg;

/// Shape parameters are clamped to this floor; a shape of exactly zero is a
/// point mass the incomplete beta function is undefined for.
const MIN_SHAPE: f64 = 1e-12;

/// Expected occurrence frequency of a taxon under the neutral model.
///
/// # Arguments
/// * `p` - Mean relative abundance, in `[0, 1]`
/// * `n_reads` - Reads per sample (`N`), positive
/// * `m` - Migration parameter, in `(0, 1]`
pub fn neutral_occurrence(p: f64, n_reads: u64, m: f64) -> Result<f64> {
    if n_reads == 0 {
        return Err(ComadError::InvalidParameter(
            "Read depth N must be positive".to_string(),
        ));
    }
    if !(m > 0.0 && m <= 1.0) {
        return Err(ComadError::InvalidParameter(format!(
            "Migration parameter m must be in (0, 1], got {}",
            m
        )));
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(ComadError::InvalidParameter(format!(
            "Relative abundance must be in [0, 1], got {}",
            p
        )));
    }

    let n = n_reads as f64;
    let alpha = (n * m * p).max(MIN_SHAPE);
    let beta = (n * m * (1.0 - p)).max(MIN_SHAPE);
    let detection = 1.0 / n;

    let upper = checked_beta_reg(alpha, beta, 1.0)
        .map_err(|e| ComadError::Numerical(format!("incomplete beta at 1: {}", e)))?;
    let lower = checked_beta_reg(alpha, beta, detection)
        .map_err(|e| ComadError::Numerical(format!("incomplete beta at 1/N: {}", e)))?;

    Ok((upper - lower).clamp(0.0, 1.0))
}

/// Evaluate the neutral curve at every abundance in `p`.
pub fn neutral_curve(p: &[f64], n_reads: u64, m: f64) -> Result<Vec<f64>> {
    p.iter()
        .map(|&pi| neutral_occurrence(pi, n_reads, m))
        .collect()
}
