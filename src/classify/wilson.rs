//! Wilson score confidence band around the neutral prediction.

use crate::data::{NeutralRecord, OccurrenceRecord};
use crate::error::{ComadError, Result};
use crate::model::FitResult;
use statrs::distribution::{ContinuousCDF, Normal};

/// Two-sided standard normal quantile for significance level `alpha`.
fn z_score(alpha: f64) -> Result<f64> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(ComadError::InvalidParameter(format!(
            "Confidence alpha must be in (0, 1), got {}",
            alpha
        )));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ComadError::Numerical(format!("standard normal: {}", e)))?;
    Ok(normal.inverse_cdf(1.0 - alpha / 2.0))
}

/// Wilson score interval for `successes` out of `n` trials.
///
/// `successes` may be fractional. Bounds are clipped to `[0, 1]` and always
/// contain the point estimate `successes / n`.
pub fn wilson_interval(successes: f64, n: usize, alpha: f64) -> Result<(f64, f64)> {
    if n == 0 {
        return Err(ComadError::EmptyData(
            "Wilson interval needs at least one trial".to_string(),
        ));
    }
    let z = z_score(alpha)?;
    let n = n as f64;
    let p = (successes / n).clamp(0.0, 1.0);
    Ok(wilson_bounds(p, n, z))
}

fn wilson_bounds(p: f64, n: f64, z: f64) -> (f64, f64) {
    let z2 = z * z;
    let denominator = 1.0 + z2 / n;
    let centre = p + z2 / (2.0 * n);
    let spread = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();

    let lower = ((centre - spread) / denominator).max(0.0).min(p);
    let upper = ((centre + spread) / denominator).min(1.0).max(p);
    (lower, upper)
}

/// Attach the fitted prediction and its Wilson band to every record.
///
/// The prediction for record `i` is `fit.best_fit[i]`; the interval treats
/// `prediction × n_samples` as the successes out of `n_samples` trials.
pub fn annotate_neutral(
    records: &[OccurrenceRecord],
    fit: &FitResult,
    n_samples: usize,
    alpha: f64,
) -> Result<Vec<NeutralRecord>> {
    if fit.best_fit.len() != records.len() {
        return Err(ComadError::DimensionMismatch {
            expected: records.len(),
            actual: fit.best_fit.len(),
        });
    }
    if n_samples == 0 {
        return Err(ComadError::EmptyData("No samples".to_string()));
    }
    let z = z_score(alpha)?;
    let n = n_samples as f64;

    Ok(records
        .iter()
        .zip(&fit.best_fit)
        .map(|(record, &predicted)| {
            let (lower, upper) = wilson_bounds(predicted.clamp(0.0, 1.0), n, z);
            NeutralRecord {
                record: record.clone(),
                predicted_occurrence: predicted,
                lower_conf_int: lower,
                upper_conf_int: upper,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_known_interval() {
        // 5 of 10 at 95%: (0.2366, 0.7634)
        let (lower, upper) = wilson_interval(5.0, 10, 0.05).unwrap();
        assert_relative_eq!(lower, 0.236593, epsilon = 1e-5);
        assert_relative_eq!(upper, 0.763407, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_successes() {
        let (lower, upper) = wilson_interval(0.0, 20, 0.05).unwrap();
        assert_eq!(lower, 0.0);
        assert!(upper > 0.0 && upper < 0.2);
    }

    #[test]
    fn test_contains_estimate_and_stays_in_unit_interval() {
        for n in [1usize, 3, 10, 100] {
            for i in 0..=20 {
                let p = i as f64 / 20.0;
                let (lower, upper) = wilson_interval(p * n as f64, n, 0.05).unwrap();
                assert!(0.0 <= lower && lower <= p, "n={} p={}", n, p);
                assert!(p <= upper && upper <= 1.0, "n={} p={}", n, p);
            }
        }
    }

    #[test]
    fn test_wider_at_smaller_alpha() {
        let (l95, u95) = wilson_interval(30.0, 100, 0.05).unwrap();
        let (l99, u99) = wilson_interval(30.0, 100, 0.01).unwrap();
        assert!(l99 < l95 && u99 > u95);
    }

    fn fit_with(best_fit: Vec<f64>) -> FitResult {
        FitResult {
            n_reads: 100,
            m: 0.3,
            m_stderr: None,
            initial_m: 0.5,
            n_data: best_fit.len(),
            best_fit,
            r_squared: 0.9,
            chi_square: 0.1,
            reduced_chi_square: 0.05,
            aic: -10.0,
            bic: -9.0,
            n_fev: 10,
            iterations: 3,
            termination: crate::model::Termination::Ftol,
        }
    }

    fn record(otu_id: &str, occurrence: f64) -> OccurrenceRecord {
        OccurrenceRecord {
            otu_id: otu_id.to_string(),
            mean_abundance: 0.01,
            occurrence,
            lineage: None,
        }
    }

    #[test]
    fn test_annotate_keeps_order_and_contains_prediction() {
        let records = vec![record("a", 0.1), record("b", 0.9), record("c", 0.5)];
        let annotated =
            annotate_neutral(&records, &fit_with(vec![0.2, 0.6, 0.0]), 10, 0.05).unwrap();

        let ids: Vec<&str> = annotated.iter().map(|r| r.record.otu_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        for r in &annotated {
            assert!(r.lower_conf_int <= r.predicted_occurrence);
            assert!(r.predicted_occurrence <= r.upper_conf_int);
            assert!(r.lower_conf_int >= 0.0 && r.upper_conf_int <= 1.0);
        }
        assert_relative_eq!(annotated[1].predicted_occurrence, 0.6);
    }

    #[test]
    fn test_annotate_length_mismatch() {
        let records = vec![record("a", 0.1)];
        let err = annotate_neutral(&records, &fit_with(vec![0.1, 0.2]), 10, 0.05).unwrap_err();
        assert!(matches!(err, ComadError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(wilson_interval(1.0, 0, 0.05).is_err());
        assert!(wilson_interval(1.0, 10, 0.0).is_err());
        assert!(wilson_interval(1.0, 10, 1.0).is_err());
    }
}
