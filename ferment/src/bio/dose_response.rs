// SPDX-License-Identifier: AGPL-3.0-or-later
//! Four-parameter log-logistic dose-response model.
//!
//! `E(x) = E0 + Emax · xʰ / (xʰ + EC50ʰ)`, fitted to replicate-median
//! responses by Levenberg–Marquardt least squares with an analytic
//! Jacobian. Used for viability assays of the PQS quorum-sensing signal
//! against the production strain.
//!
//! The response is evaluated as `E0 + Emax / (1 + (EC50/x)ʰ)`, which is the
//! same curve but stays finite at `x = 0` for either sign of `h`.
//!
//! # References
//!
//! - Ritz et al. 2015, *PLoS ONE* 10:e0146021 (dose-response analysis in R)
//! - Marquardt 1963, *J SIAM* 11:431-441

use crate::error::{Error, Result};
use crate::tolerances;

/// Number of model parameters.
pub const N_PARAMS: usize = 4;

/// Four-parameter log-logistic curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogLogistic4 {
    /// Response at zero dose (for `hill > 0`).
    pub e0: f64,
    /// Span from `e0` to the saturating response; negative for inhibition.
    pub emax: f64,
    /// Dose at half-maximal effect. Must be positive.
    pub ec50: f64,
    /// Hill slope.
    pub hill: f64,
}

impl LogLogistic4 {
    /// Parameters as `[e0, emax, ec50, hill]`.
    #[must_use]
    pub const fn to_array(&self) -> [f64; N_PARAMS] {
        [self.e0, self.emax, self.ec50, self.hill]
    }

    /// Inverse of [`Self::to_array`].
    #[must_use]
    pub const fn from_array(p: [f64; N_PARAMS]) -> Self {
        Self {
            e0: p[0],
            emax: p[1],
            ec50: p[2],
            hill: p[3],
        }
    }

    /// Response at dose `x`. NaN when `ec50 <= 0`.
    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        if self.ec50 <= 0.0 {
            return f64::NAN;
        }
        let (frac, _) = occupancy(x, self.ec50, self.hill);
        self.e0 + self.emax * frac
    }

    /// [`Self::eval`] over a dose series.
    #[must_use]
    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }

    /// Partial derivatives of the response with respect to
    /// `[e0, emax, ec50, hill]` at dose `x`.
    #[must_use]
    pub fn gradient(&self, x: f64) -> [f64; N_PARAMS] {
        let (frac, q) = occupancy(x, self.ec50, self.hill);
        // At x = 0, or when q saturates, the curve is flat in ec50 and hill.
        let (d_ec50, d_hill) = if x > 0.0 && q.is_finite() && q > 0.0 {
            let denom = (1.0 + q) * (1.0 + q);
            (
                -self.emax * q * self.hill / self.ec50 / denom,
                -self.emax * q * (self.ec50 / x).ln() / denom,
            )
        } else {
            (0.0, 0.0)
        };
        [1.0, frac, d_ec50, d_hill]
    }
}

/// `1 / (1 + q)` with `q = (ec50 / x)^h`; returns both.
fn occupancy(x: f64, ec50: f64, hill: f64) -> (f64, f64) {
    let q = (ec50 / x).powf(hill);
    (1.0 / (1.0 + q), q)
}

/// Median of a sample; `None` when empty. NaN values are not expected.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    Some(if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    })
}

/// Collapse replicate measurements to one median per dose.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if a dose has no replicates.
pub fn replicate_medians(rows: &[Vec<f64>]) -> Result<Vec<f64>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            median(row).ok_or_else(|| Error::InvalidInput(format!("dose row {i} has no replicates")))
        })
        .collect()
}

/// Starting point for the fit: lowest response, observed span, median
/// dose, unit slope.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for empty input.
pub fn initial_guess(x: &[f64], y: &[f64]) -> Result<LogLogistic4> {
    let x_med = median(x).ok_or_else(|| Error::InvalidInput("no doses".into()))?;
    if y.is_empty() {
        return Err(Error::InvalidInput("no responses".into()));
    }
    let y_min = y.iter().copied().fold(f64::INFINITY, f64::min);
    let y_max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(LogLogistic4 {
        e0: y_min,
        emax: y_max - y_min,
        ec50: x_med,
        hill: 1.0,
    })
}

/// Convergence settings for [`fit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Relative reduction of the residual sum of squares that ends the fit.
    pub ftol: f64,
    /// Relative parameter step that ends the fit.
    pub xtol: f64,
    /// Trial steps allowed.
    pub max_iter: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            ftol: tolerances::LM_FTOL,
            xtol: tolerances::LM_XTOL,
            max_iter: tolerances::LM_MAX_ITER,
        }
    }
}

/// Outcome of a converged fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Fitted curve.
    pub model: LogLogistic4,
    /// Parameter covariance, `(JᵀJ)⁻¹ · SSR / (m − 4)`.
    pub covariance: [[f64; N_PARAMS]; N_PARAMS],
    /// Square roots of the covariance diagonal.
    pub std_errors: [f64; N_PARAMS],
    /// Residual sum of squares.
    pub ssr: f64,
    /// Trial steps taken.
    pub iterations: usize,
}

/// Fit the curve to `(x, y)` starting from `initial`.
///
/// # Errors
///
/// - [`Error::InvalidInput`] if `x` and `y` differ in length, there are
///   not more points than parameters, or any value is non-finite.
/// - [`Error::NumericalFailure`] if the iteration budget runs out, the
///   starting point has a non-finite residual, or `JᵀJ` is singular at
///   the solution.
pub fn fit(x: &[f64], y: &[f64], initial: LogLogistic4, opts: &FitOptions) -> Result<FitResult> {
    if x.len() != y.len() {
        return Err(Error::InvalidInput(format!(
            "{} doses but {} responses",
            x.len(),
            y.len()
        )));
    }
    if x.len() <= N_PARAMS {
        return Err(Error::InvalidInput(format!(
            "need more than {N_PARAMS} points, got {}",
            x.len()
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput("doses and responses must be finite".into()));
    }

    let mut p = initial.to_array();
    let mut ssr = sum_of_squares(x, y, &p);
    if !ssr.is_finite() {
        return Err(Error::NumericalFailure(format!(
            "non-finite residuals at the starting point {initial:?}"
        )));
    }
    let mut lambda = tolerances::LM_LAMBDA_INIT;
    let mut iterations = 0;

    'outer: loop {
        let (a, g) = normal_equations(x, y, &p);
        loop {
            iterations += 1;
            if iterations > opts.max_iter {
                return Err(Error::NumericalFailure(format!(
                    "dose-response fit did not converge in {} steps (SSR = {ssr:e})",
                    opts.max_iter
                )));
            }

            let mut damped = a;
            for (j, row) in damped.iter_mut().enumerate() {
                row[j] += lambda * a[j][j].max(tolerances::LM_DIAG_FLOOR);
            }
            let Some(delta) = solve(damped, g) else {
                lambda *= 10.0;
                if lambda > tolerances::LM_LAMBDA_MAX {
                    break 'outer;
                }
                continue;
            };

            let mut candidate = p;
            for (c, d) in candidate.iter_mut().zip(&delta) {
                *c += d;
            }
            let ssr_c = sum_of_squares(x, y, &candidate);

            if ssr_c.is_finite() && ssr_c < ssr {
                let reduction = ssr - ssr_c;
                let step = norm(&delta);
                let size = norm(&p);
                p = candidate;
                ssr = ssr_c;
                lambda = (lambda / 10.0).max(tolerances::LM_LAMBDA_MIN);
                if ssr == 0.0
                    || reduction <= opts.ftol * ssr
                    || step <= opts.xtol * (size + opts.xtol)
                {
                    break 'outer;
                }
                continue 'outer;
            }

            lambda *= 10.0;
            if lambda > tolerances::LM_LAMBDA_MAX {
                log::debug!("dose-response fit: damping saturated at SSR = {ssr:e}");
                break 'outer;
            }
        }
    }

    let (a, _) = normal_equations(x, y, &p);
    let inverse = invert(a).ok_or_else(|| {
        Error::NumericalFailure("singular Jacobian at the fitted parameters".into())
    })?;
    #[allow(clippy::cast_precision_loss)]
    let variance = ssr / (x.len() - N_PARAMS) as f64;
    let mut covariance = inverse;
    for row in &mut covariance {
        for v in row.iter_mut() {
            *v *= variance;
        }
    }
    let mut std_errors = [0.0; N_PARAMS];
    for (j, se) in std_errors.iter_mut().enumerate() {
        *se = covariance[j][j].max(0.0).sqrt();
    }

    log::debug!("dose-response fit converged in {iterations} steps, SSR = {ssr:e}");
    Ok(FitResult {
        model: LogLogistic4::from_array(p),
        covariance,
        std_errors,
        ssr,
        iterations,
    })
}

/// [`fit`] from [`initial_guess`] with default options.
///
/// # Errors
///
/// As [`fit`] and [`initial_guess`].
pub fn fit_default(x: &[f64], y: &[f64]) -> Result<FitResult> {
    let initial = initial_guess(x, y)?;
    fit(x, y, initial, &FitOptions::default())
}

type Matrix = [[f64; N_PARAMS]; N_PARAMS];

fn sum_of_squares(x: &[f64], y: &[f64], p: &[f64; N_PARAMS]) -> f64 {
    let model = LogLogistic4::from_array(*p);
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - model.eval(xi);
            r * r
        })
        .sum()
}

/// `JᵀJ` and `Jᵀr` at `p`.
fn normal_equations(x: &[f64], y: &[f64], p: &[f64; N_PARAMS]) -> (Matrix, [f64; N_PARAMS]) {
    let model = LogLogistic4::from_array(*p);
    let rows: Vec<([f64; N_PARAMS], f64)> = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (model.gradient(xi), yi - model.eval(xi)))
        .collect();

    let mut a = [[0.0; N_PARAMS]; N_PARAMS];
    let mut g = [0.0; N_PARAMS];
    for (j, row) in a.iter_mut().enumerate() {
        for (k, cell) in row.iter_mut().enumerate() {
            *cell = rows.iter().map(|(jac, _)| jac[j] * jac[k]).sum();
        }
        g[j] = rows.iter().map(|(jac, r)| jac[j] * r).sum();
    }
    (a, g)
}

fn norm(v: &[f64; N_PARAMS]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Gaussian elimination with partial pivoting. `None` if singular.
fn solve(mut m: Matrix, mut b: [f64; N_PARAMS]) -> Option<[f64; N_PARAMS]> {
    for col in 0..N_PARAMS {
        let mut pivot = col;
        for row in col + 1..N_PARAMS {
            if m[row][col].abs() > m[pivot][col].abs() {
                pivot = row;
            }
        }
        if m[pivot][col].abs() < tolerances::SINGULAR_PIVOT {
            return None;
        }
        m.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..N_PARAMS {
            let factor = m[row][col] / m[col][col];
            for k in col..N_PARAMS {
                m[row][k] -= factor * m[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut out = [0.0; N_PARAMS];
    for row in (0..N_PARAMS).rev() {
        let tail: f64 = (row + 1..N_PARAMS).map(|k| m[row][k] * out[k]).sum();
        out[row] = (b[row] - tail) / m[row][row];
    }
    Some(out)
}

fn invert(m: Matrix) -> Option<Matrix> {
    let mut inv = [[0.0; N_PARAMS]; N_PARAMS];
    for col in 0..N_PARAMS {
        let mut e = [0.0; N_PARAMS];
        e[col] = 1.0;
        let x = solve(m, e)?;
        for (row, v) in x.iter().enumerate() {
            inv[row][col] = *v;
        }
    }
    Some(inv)
}
