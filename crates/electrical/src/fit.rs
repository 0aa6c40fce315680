//! Fixed-tau exponential fit for relaxation plateaus
//!
//! Fits `V(t) = V0 + a * (1 - exp(-t / tau))` over `(V0, a)` with a damped
//! Gauss-Newton (Levenberg-Marquardt) iteration started from fixed guesses,
//! so repeated runs on the same plateau give bit-identical results.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use simcore::{ModelError, Result};

const STEP_TOLERANCE: f64 = 1.49012e-8;
const COST_TOLERANCE: f64 = 1.49012e-8;
const INITIAL_DAMPING: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialFit {
    /// Voltage at the start of the plateau (V)
    pub offset: f64,
    /// Total exponential excursion (V)
    pub amplitude: f64,
    pub tau: f64,
    /// Sum of squared residuals (V²)
    pub residual_sum_squares: f64,
    pub evaluations: usize,
}

impl ExponentialFit {
    pub fn evaluate(&self, t: f64) -> f64 {
        self.offset + self.amplitude * rise(t, self.tau)
    }
}

fn rise(t: f64, tau: f64) -> f64 {
    1.0 - (-t / tau).exp()
}

fn sum_squares(t: &[f64], v: &[f64], tau: f64, params: &Vector2<f64>) -> f64 {
    t.iter()
        .zip(v)
        .map(|(&ti, &vi)| {
            let r = vi - (params[0] + params[1] * rise(ti, tau));
            r * r
        })
        .sum()
}

fn not_converged(evaluations: usize, reason: impl Into<String>) -> ModelError {
    ModelError::FitConvergence {
        iterations: evaluations,
        reason: reason.into(),
    }
}

/// Least-squares fit of offset and amplitude with `tau` held fixed.
///
/// `initial_guess` is `(V0, a)`. Fails when the residuals stop being finite,
/// the normal equations are singular, or the evaluation budget runs out.
pub fn fit_fixed_tau_exponential(
    t: &[f64],
    v: &[f64],
    tau: f64,
    initial_guess: (f64, f64),
    max_evaluations: usize,
) -> Result<ExponentialFit> {
    if t.len() != v.len() || t.len() < 2 {
        return Err(not_converged(0, format!("need at least 2 paired samples, got {}/{}", t.len(), v.len())));
    }

    let mut params = Vector2::new(initial_guess.0, initial_guess.1);
    let mut cost = sum_squares(t, v, tau, &params);
    let mut evaluations = 1;
    if !cost.is_finite() {
        return Err(not_converged(evaluations, format!("residuals are not finite (tau = {tau})")));
    }

    // Jacobian columns are [1, rise(t)] and do not depend on the parameters
    let mut jtj = Matrix2::zeros();
    let mut sum_rise = 0.0;
    let mut sum_rise_sq = 0.0;
    for &ti in t {
        let phi = rise(ti, tau);
        sum_rise += phi;
        sum_rise_sq += phi * phi;
    }
    jtj[(0, 0)] = t.len() as f64;
    jtj[(0, 1)] = sum_rise;
    jtj[(1, 0)] = sum_rise;
    jtj[(1, 1)] = sum_rise_sq;

    let mut damping = INITIAL_DAMPING;
    let mut converged = false;
    while evaluations < max_evaluations {
        let mut jtr = Vector2::zeros();
        for (&ti, &vi) in t.iter().zip(v) {
            let phi = rise(ti, tau);
            let r = vi - (params[0] + params[1] * phi);
            jtr[0] += r;
            jtr[1] += r * phi;
        }

        let damped = jtj + Matrix2::from_diagonal(&(jtj.diagonal() * damping));
        let step = damped
            .cholesky()
            .ok_or_else(|| not_converged(evaluations, "normal equations are singular"))?
            .solve(&jtr);

        let candidate = params + step;
        let candidate_cost = sum_squares(t, v, tau, &candidate);
        evaluations += 1;
        if !candidate_cost.is_finite() {
            return Err(not_converged(evaluations, "residuals are not finite"));
        }

        let small_step = step.norm() <= STEP_TOLERANCE * (params.norm() + STEP_TOLERANCE);
        if candidate_cost <= cost {
            let small_gain = cost - candidate_cost <= COST_TOLERANCE * cost;
            params = candidate;
            cost = candidate_cost;
            damping /= 10.0;
            if small_step || small_gain {
                converged = true;
                break;
            }
        } else if small_step {
            // rounding noise at the optimum
            converged = true;
            break;
        } else {
            damping *= 10.0;
        }
    }

    if !converged {
        return Err(not_converged(evaluations, "evaluation budget exhausted"));
    }
    Ok(ExponentialFit {
        offset: params[0],
        amplitude: params[1],
        tau,
        residual_sum_squares: cost,
        evaluations,
    })
}
