//! The fitted neutral curve and its confidence band on an abundance grid.

use crate::classify::wilson::wilson_interval;
use crate::error::{ComadError, Result};
use crate::model::{neutral_curve, FitResult};
use serde::{Deserialize, Serialize};

/// One point of the neutral curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeutralCurvePoint {
    pub mean_abundance: f64,
    pub predicted_occurrence: f64,
    pub lower_conf_int: f64,
    pub upper_conf_int: f64,
}

/// `points` log-spaced values from `start` to `end`, both included.
fn log_grid(start: f64, end: f64, points: usize) -> Vec<f64> {
    let (lo, hi) = (start.log10(), end.log10());
    let step = (hi - lo) / (points - 1) as f64;
    (0..points)
        .map(|i| 10f64.powf(lo + step * i as f64))
        .collect()
}

/// Evaluate the fitted curve and its Wilson band from `min_abundance / 10` to 1.
///
/// # Arguments
/// * `fit` - Fitted neutral model
/// * `n_samples` - Number of samples, the trials of the Wilson interval
/// * `min_abundance` - Smallest observed mean abundance, must be positive
/// * `points` - Grid size, at least 2
/// * `alpha` - Significance level of the band
pub fn neutral_band(
    fit: &FitResult,
    n_samples: usize,
    min_abundance: f64,
    points: usize,
    alpha: f64,
) -> Result<Vec<NeutralCurvePoint>> {
    if !(min_abundance > 0.0 && min_abundance <= 1.0) {
        return Err(ComadError::InvalidParameter(format!(
            "Minimum abundance must be in (0, 1], got {}",
            min_abundance
        )));
    }
    if points < 2 {
        return Err(ComadError::InvalidParameter(format!(
            "Curve needs at least 2 points, got {}",
            points
        )));
    }

    let grid = log_grid(min_abundance / 10.0, 1.0, points);
    let predicted = neutral_curve(&grid, fit.n_reads, fit.m)?;

    grid.iter()
        .zip(predicted)
        .map(|(&p, occurrence)| {
            let (lower, upper) = wilson_interval(occurrence * n_samples as f64, n_samples, alpha)?;
            Ok(NeutralCurvePoint {
                mean_abundance: p,
                predicted_occurrence: occurrence,
                lower_conf_int: lower,
                upper_conf_int: upper,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Termination;
    use approx::assert_relative_eq;

    fn fit() -> FitResult {
        FitResult {
            n_reads: 1000,
            m: 0.1,
            m_stderr: Some(0.01),
            initial_m: 0.5,
            best_fit: vec![],
            r_squared: 0.8,
            chi_square: 0.2,
            reduced_chi_square: 0.01,
            aic: -50.0,
            bic: -48.0,
            n_data: 21,
            n_fev: 20,
            iterations: 5,
            termination: Termination::Ftol,
        }
    }

    #[test]
    fn test_log_grid_endpoints() {
        let grid = log_grid(1e-5, 1.0, 6);
        assert_eq!(grid.len(), 6);
        assert_relative_eq!(grid[0], 1e-5, max_relative = 1e-12);
        assert_relative_eq!(grid[1], 1e-4, max_relative = 1e-12);
        assert_relative_eq!(grid[5], 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_band_contains_curve() {
        let band = neutral_band(&fit(), 50, 1e-4, 200, 0.05).unwrap();
        assert_eq!(band.len(), 200);
        assert_relative_eq!(band[0].mean_abundance, 1e-5, max_relative = 1e-12);
        for point in &band {
            assert!(point.lower_conf_int <= point.predicted_occurrence);
            assert!(point.predicted_occurrence <= point.upper_conf_int);
        }
        for pair in band.windows(2) {
            assert!(pair[1].predicted_occurrence >= pair[0].predicted_occurrence - 1e-9);
        }
    }

    #[test]
    fn test_invalid_grid() {
        assert!(neutral_band(&fit(), 50, 0.0, 100, 0.05).is_err());
        assert!(neutral_band(&fit(), 50, 1e-3, 1, 0.05).is_err());
    }
}
