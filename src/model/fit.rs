//! Least-squares fit of the neutral model to observed occurrence frequencies.
//!
//! The read depth `N` is fixed to the rarefaction depth and the migration
//! parameter `m` is the single free parameter. `m` is kept strictly inside
//! `(0, 1)` by optimizing an unbounded internal parameter `θ` and mapping it
//! back through
//!
//! ```text
//! m = lo + (hi − lo)·(sin θ + 1) / 2
//! ```
//!
//! Standard errors are propagated through the same mapping.

use crate::data::OccurrenceRecord;
use crate::error::{ComadError, Result};
use crate::model::levmar::{levenberg_marquardt, LevMarConfig, Termination};
use crate::model::neutral::neutral_curve;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Lower bound for the migration parameter.
pub const M_MIN: f64 = 1e-9;
/// Upper bound for the migration parameter.
pub const M_MAX: f64 = 1.0 - 1e-9;

/// Floor applied to chi-square before taking logarithms for AIC/BIC.
const MIN_CHI_SQUARE: f64 = 1e-250;

/// Configuration for the neutral model fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Starting value of `m`.
    pub initial_m: f64,
    /// Solver settings.
    #[serde(flatten)]
    pub solver: LevMarConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            initial_m: 0.5,
            solver: LevMarConfig::default(),
        }
    }
}

/// Result of fitting the neutral model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Fixed read depth `N`.
    pub n_reads: u64,
    /// Fitted migration parameter.
    pub m: f64,
    /// Standard error of `m`, when it can be estimated.
    pub m_stderr: Option<f64>,
    /// Starting value of `m`.
    pub initial_m: f64,
    /// Model prediction at every record's mean abundance, in record order.
    pub best_fit: Vec<f64>,
    /// Coefficient of determination of observed vs. predicted occurrence.
    pub r_squared: f64,
    /// Sum of squared residuals.
    pub chi_square: f64,
    /// Chi-square divided by the degrees of freedom.
    pub reduced_chi_square: f64,
    /// Akaike information criterion.
    pub aic: f64,
    /// Bayesian information criterion.
    pub bic: f64,
    /// Number of data points.
    pub n_data: usize,
    /// Number of model evaluations.
    pub n_fev: usize,
    /// Solver iterations.
    pub iterations: usize,
    /// Convergence criterion that stopped the solver.
    pub termination: Termination,
}

impl FitResult {
    /// Relative standard error of `m` in percent.
    pub fn m_stderr_percent(&self) -> Option<f64> {
        self.m_stderr.map(|se| 100.0 * se / self.m.abs())
    }
}

impl std::fmt::Display for FitResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[[Model]]")?;
        writeln!(f, "    Model(beta_cdf)")?;
        writeln!(f, "[[Fit Statistics]]")?;
        writeln!(f, "    # fitting method   = leastsq")?;
        writeln!(f, "    # function evals   = {}", self.n_fev)?;
        writeln!(f, "    # data points      = {}", self.n_data)?;
        writeln!(f, "    # variables        = 1")?;
        writeln!(f, "    chi-square         = {:.8}", self.chi_square)?;
        writeln!(f, "    reduced chi-square = {:.8}", self.reduced_chi_square)?;
        writeln!(f, "    Akaike info crit   = {:.8}", self.aic)?;
        writeln!(f, "    Bayesian info crit = {:.8}", self.bic)?;
        writeln!(f, "[[Variables]]")?;
        writeln!(f, "    N:  {} (fixed)", self.n_reads)?;
        match (self.m_stderr, self.m_stderr_percent()) {
            (Some(se), Some(pct)) => writeln!(
                f,
                "    m:  {:.8} +/- {:.8} ({:.2}%) (init = {})",
                self.m, se, pct, self.initial_m
            ),
            _ => writeln!(
                f,
                "    m:  {:.8} +/- None (init = {})",
                self.m, self.initial_m
            ),
        }
    }
}

fn to_internal(m: f64) -> f64 {
    (2.0 * (m - M_MIN) / (M_MAX - M_MIN) - 1.0).clamp(-1.0, 1.0).asin()
}

fn to_external(theta: f64) -> f64 {
    M_MIN + (M_MAX - M_MIN) * (theta.sin() + 1.0) / 2.0
}

/// `1 − SS_res / SS_tot`; a constant response gives 1 for an exact fit and 0 otherwise.
fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let ss_res: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    // A constant response has no variance to explain; rounding in the mean
    // would otherwise leave a tiny ss_tot and a meaningless ratio
    let constant = observed.iter().all(|&y| y == observed[0]);
    if constant {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }

    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let ss_tot: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
    1.0 - ss_res / ss_tot
}

/// Fit the neutral model to a set of occurrence records.
///
/// # Arguments
/// * `records` - Occurrence records; their order defines the order of `best_fit`
/// * `n_reads` - Fixed read depth `N`
/// * `config` - Starting value and solver settings
///
/// # Errors
/// [`ComadError::FitConvergence`] when the solver exhausts its budget or the
/// model does not respond to `m` at all; the fit is never reported in that case.
pub fn fit_neutral_model(
    records: &[OccurrenceRecord],
    n_reads: u64,
    config: &FitConfig,
) -> Result<FitResult> {
    if records.is_empty() {
        return Err(ComadError::EmptyData("No taxa to fit".to_string()));
    }
    if n_reads == 0 {
        return Err(ComadError::InvalidParameter(
            "Read depth N must be positive".to_string(),
        ));
    }
    if !(config.initial_m > 0.0 && config.initial_m < 1.0) {
        return Err(ComadError::InvalidParameter(format!(
            "Initial m must be in (0, 1), got {}",
            config.initial_m
        )));
    }

    let abundances: Vec<f64> = records.iter().map(|r| r.mean_abundance).collect();
    let observed: Vec<f64> = records.iter().map(|r| r.occurrence).collect();
    let n_data = records.len();

    let residual = |theta: &DVector<f64>| -> Result<DVector<f64>> {
        let predicted = neutral_curve(&abundances, n_reads, to_external(theta[0]))?;
        Ok(DVector::from_iterator(
            n_data,
            predicted.iter().zip(&observed).map(|(p, y)| p - y),
        ))
    };

    let theta0 = DVector::from_element(1, to_internal(config.initial_m));
    let solution = levenberg_marquardt(residual, theta0, &config.solver)?;

    let sensitivity = solution.jacobian.norm_squared();
    if sensitivity == 0.0 {
        return Err(ComadError::FitConvergence {
            iterations: solution.iterations,
            reason: "model prediction is insensitive to m".to_string(),
        });
    }

    let theta = solution.params[0];
    let m = to_external(theta);
    let best_fit = neutral_curve(&abundances, n_reads, m)?;
    let chi_square = solution.chi_square;

    let dof = n_data.saturating_sub(1);
    let reduced_chi_square = if dof > 0 {
        chi_square / dof as f64
    } else {
        f64::NAN
    };
    let m_stderr = if dof > 0 {
        let dm_dtheta = ((M_MAX - M_MIN) / 2.0 * theta.cos()).abs();
        let se = (reduced_chi_square / sensitivity).sqrt() * dm_dtheta;
        se.is_finite().then_some(se)
    } else {
        None
    };

    let nd = n_data as f64;
    let neg2_log_likelihood = nd * (chi_square.max(MIN_CHI_SQUARE) / nd).ln();
    let aic = neg2_log_likelihood + 2.0;
    let bic = neg2_log_likelihood + nd.ln();

    log::debug!(
        "Neutral fit: m = {:.6}, chi-square = {:.6e}, {} evaluations ({:?})",
        m,
        chi_square,
        solution.n_fev,
        solution.termination
    );

    Ok(FitResult {
        n_reads,
        m,
        m_stderr,
        initial_m: config.initial_m,
        r_squared: r_squared(&observed, &best_fit),
        best_fit,
        chi_square,
        reduced_chi_square,
        aic,
        bic,
        n_data,
        n_fev: solution.n_fev,
        iterations: solution.iterations,
        termination: solution.termination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn synthetic_records(n_reads: u64, m: f64) -> Vec<OccurrenceRecord> {
        let abundances: Vec<f64> = (1..=40)
            .map(|i| 10f64.powf(-4.0 + 3.0 * i as f64 / 40.0))
            .collect();
        let occurrence = neutral_curve(&abundances, n_reads, m).unwrap();
        abundances
            .iter()
            .zip(occurrence)
            .enumerate()
            .map(|(i, (&p, o))| OccurrenceRecord {
                otu_id: format!("OTU{}", i),
                mean_abundance: p,
                occurrence: o,
                lineage: None,
            })
            .collect()
    }

    #[test]
    fn test_recovers_migration_parameter() {
        let records = synthetic_records(1000, 0.2);
        let fit = fit_neutral_model(&records, 1000, &FitConfig::default()).unwrap();

        assert_relative_eq!(fit.m, 0.2, epsilon = 1e-4);
        assert!(fit.r_squared > 0.999 && fit.r_squared <= 1.0);
        assert_eq!(fit.best_fit.len(), records.len());
        assert_eq!(fit.n_data, 40);
        assert_eq!(fit.initial_m, 0.5);
    }

    #[test]
    fn test_boundary_m_stays_inside_open_interval() {
        let records = synthetic_records(500, 1.0);
        let fit = fit_neutral_model(&records, 500, &FitConfig::default()).unwrap();
        assert!(fit.m > 0.0 && fit.m < 1.0);
        assert!(fit.m > 0.5);
    }

    #[test]
    fn test_noisy_fit_has_stderr() {
        let mut records = synthetic_records(1000, 0.1);
        for (i, r) in records.iter_mut().enumerate() {
            let jitter = if i % 2 == 0 { 0.03 } else { -0.03 };
            r.occurrence = (r.occurrence + jitter).clamp(0.0, 1.0);
        }
        let fit = fit_neutral_model(&records, 1000, &FitConfig::default()).unwrap();

        let se = fit.m_stderr.unwrap();
        assert!(se > 0.0);
        assert!(fit.r_squared < 1.0);
        assert!(fit.chi_square > 0.0);
        assert_relative_eq!(fit.reduced_chi_square, fit.chi_square / 39.0, epsilon = 1e-12);
    }

    #[test]
    fn test_insensitive_model_is_fit_failure() {
        // With N = 1 every prediction is 0 regardless of m
        let records = synthetic_records(1000, 0.3);
        let err = fit_neutral_model(&records, 1, &FitConfig::default()).unwrap_err();
        assert!(matches!(err, ComadError::FitConvergence { .. }));
    }

    #[test]
    fn test_empty_records_rejected() {
        let err = fit_neutral_model(&[], 100, &FitConfig::default()).unwrap_err();
        assert!(matches!(err, ComadError::EmptyData(_)));
    }

    #[test]
    fn test_invalid_initial_m_rejected() {
        let records = synthetic_records(100, 0.3);
        let config = FitConfig {
            initial_m: 1.0,
            ..Default::default()
        };
        assert!(fit_neutral_model(&records, 100, &config).is_err());
    }

    #[test]
    fn test_r_squared_constant_response() {
        assert_eq!(r_squared(&[0.5, 0.5], &[0.5, 0.5]), 1.0);
        assert_eq!(r_squared(&[0.5, 0.5], &[0.4, 0.5]), 0.0);
        assert_relative_eq!(r_squared(&[0.0, 1.0], &[0.0, 0.5]), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_r_squared_repeated_non_dyadic_value() {
        // 0.05 has no exact binary form, so the mean differs from it by rounding
        let observed = vec![0.05; 30];
        let predicted = vec![0.049; 30];
        assert_eq!(r_squared(&observed, &predicted), 0.0);
        assert_eq!(r_squared(&observed, &observed), 1.0);
    }

    #[test]
    fn test_constant_occurrence_fit_reports_zero_r_squared() {
        let records: Vec<OccurrenceRecord> = (1..=30)
            .map(|i| OccurrenceRecord {
                otu_id: format!("OTU{}", i),
                mean_abundance: i as f64 / 1000.0,
                occurrence: 0.05,
                lineage: None,
            })
            .collect();
        let fit = fit_neutral_model(&records, 100, &FitConfig::default()).unwrap();
        assert_eq!(fit.r_squared, 0.0);
    }

    #[test]
    fn test_bound_transform_round_trip() {
        for &m in &[0.01, 0.5, 0.99] {
            assert_relative_eq!(to_external(to_internal(m)), m, epsilon = 1e-12);
        }
        assert!(to_external(std::f64::consts::FRAC_PI_2) < 1.0);
        assert!(to_external(-std::f64::consts::FRAC_PI_2) > 0.0);
    }

    #[test]
    fn test_display_layout() {
        let records = synthetic_records(1000, 0.2);
        let text = fit_neutral_model(&records, 1000, &FitConfig::default())
            .unwrap()
            .to_string();
        assert!(text.starts_with("[[Model]]\n"));
        assert!(text.contains("[[Fit Statistics]]"));
        assert!(text.contains("    N:  1000 (fixed)"));
        assert!(text.contains("(init = 0.5)"));
    }
}
