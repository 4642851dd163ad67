//! Levenberg-Marquardt nonlinear least squares.
//!
//! Minimizes `‖r(x)‖²` for a residual function `r` by solving the damped
//! normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr
//! ```
//!
//! with a central-difference Jacobian. λ shrinks after every accepted step
//! and grows after every rejected one.

use crate::error::{ComadError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Largest damping factor tried before the step is considered vanished.
const MAX_LAMBDA: f64 = 1e16;

/// Floor for diagonal scaling so parameters with a flat direction still get damped.
const MIN_DIAG: f64 = 1e-12;

/// Solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevMarConfig {
    /// Maximum number of accepted-or-rejected outer iterations.
    pub max_iter: usize,
    /// Relative reduction of the sum of squares below which the fit has converged.
    pub ftol: f64,
    /// Relative step size below which the fit has converged.
    pub xtol: f64,
    /// Infinity norm of the gradient below which the fit has converged.
    pub gtol: f64,
    /// Initial damping factor.
    pub initial_lambda: f64,
}

impl Default for LevMarConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            ftol: 1.5e-8,
            xtol: 1.5e-8,
            gtol: 1e-14,
            initial_lambda: 1e-3,
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Sum of squares stopped decreasing by more than `ftol`.
    Ftol,
    /// Step size fell below `xtol`.
    Xtol,
    /// Gradient fell below `gtol`.
    Gtol,
}

/// A converged least-squares solution.
#[derive(Debug, Clone)]
pub struct LevMarSolution {
    /// Parameters at the optimum.
    pub params: DVector<f64>,
    /// Residuals at the optimum.
    pub residuals: DVector<f64>,
    /// Jacobian of the residuals at the optimum.
    pub jacobian: DMatrix<f64>,
    /// Sum of squared residuals at the optimum.
    pub chi_square: f64,
    /// Number of residual evaluations, Jacobian evaluations included.
    pub n_fev: usize,
    /// Outer iterations used.
    pub iterations: usize,
    /// Convergence criterion that stopped the solver.
    pub termination: Termination,
}

/// Minimize the sum of squared residuals starting from `x0`.
///
/// Returns [`ComadError::FitConvergence`] if no convergence criterion is met
/// within `max_iter` iterations, and [`ComadError::Numerical`] if the
/// residuals at `x0` are not finite.
pub fn levenberg_marquardt<F>(
    residual: F,
    x0: DVector<f64>,
    config: &LevMarConfig,
) -> Result<LevMarSolution>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>>,
{
    let n_fev = Cell::new(0usize);
    let eval = |x: &DVector<f64>| -> Result<DVector<f64>> {
        n_fev.set(n_fev.get() + 1);
        residual(x)
    };

    let mut x = x0;
    let mut r = eval(&x)?;
    if r.iter().any(|v| !v.is_finite()) {
        return Err(ComadError::Numerical(
            "Residuals are not finite at the initial parameters".to_string(),
        ));
    }
    let mut cost = r.norm_squared();
    let mut lambda = config.initial_lambda;

    for iter in 0..config.max_iter {
        let jacobian = numerical_jacobian(&eval, &x, &r)?;
        let jt = jacobian.transpose();
        let gradient = &jt * &r;
        let jtj = &jt * &jacobian;

        let finish = |termination, x, r, jacobian, cost, n_fev| LevMarSolution {
            params: x,
            residuals: r,
            jacobian,
            chi_square: cost,
            n_fev,
            iterations: iter + 1,
            termination,
        };

        if gradient.amax() <= config.gtol {
            return Ok(finish(Termination::Gtol, x, r, jacobian, cost, n_fev.get()));
        }

        let scale = DMatrix::from_diagonal(&jtj.diagonal().map(|d| d.max(MIN_DIAG)));

        // Inner loop: raise the damping until a step reduces the cost
        loop {
            let damped = &jtj + &scale * lambda;
            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&(-&gradient)),
                None => {
                    lambda *= 10.0;
                    if lambda > MAX_LAMBDA {
                        return Ok(finish(Termination::Xtol, x, r, jacobian, cost, n_fev.get()));
                    }
                    continue;
                }
            };

            let x_new = &x + &step;
            let r_new = eval(&x_new)?;
            let cost_new = r_new.norm_squared();

            if cost_new.is_finite() && cost_new < cost {
                let reduction = cost - cost_new;
                let small_step = step.norm() <= config.xtol * (x.norm() + config.xtol);
                x = x_new;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(1e-12);
                log::debug!("LM iteration {}: cost {:.6e}, lambda {:.1e}", iter + 1, cost, lambda);

                if reduction <= config.ftol * (cost + reduction) {
                    let jacobian = numerical_jacobian(&eval, &x, &r)?;
                    return Ok(finish(Termination::Ftol, x, r, jacobian, cost, n_fev.get()));
                }
                if small_step {
                    let jacobian = numerical_jacobian(&eval, &x, &r)?;
                    return Ok(finish(Termination::Xtol, x, r, jacobian, cost, n_fev.get()));
                }
                break;
            }

            lambda *= 10.0;
            if lambda > MAX_LAMBDA {
                // Every damped step is now negligibly small: no further reduction is possible
                return Ok(finish(Termination::Xtol, x, r, jacobian, cost, n_fev.get()));
            }
        }
    }

    Err(ComadError::FitConvergence {
        iterations: config.max_iter,
        reason: format!("sum of squares still {:.6e} and decreasing", cost),
    })
}

/// Central-difference Jacobian of the residuals at `x`.
fn numerical_jacobian<F>(eval: &F, x: &DVector<f64>, r: &DVector<f64>) -> Result<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>>,
{
    let n_params = x.len();
    let mut jacobian = DMatrix::zeros(r.len(), n_params);

    for j in 0..n_params {
        let h = 1e-7 * x[j].abs().max(1.0);
        let mut forward = x.clone();
        forward[j] += h;
        let mut backward = x.clone();
        backward[j] -= h;

        let column = (eval(&forward)? - eval(&backward)?) / (2.0 * h);
        if column.iter().any(|v| !v.is_finite()) {
            return Err(ComadError::Numerical(format!(
                "Jacobian column {} is not finite",
                j
            )));
        }
        jacobian.set_column(j, &column);
    }

    Ok(jacobian)
}
