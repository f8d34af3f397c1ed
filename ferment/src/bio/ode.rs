// SPDX-License-Identifier: AGPL-3.0-or-later
//! ODE integrators that report the state on a caller-supplied time grid.
//!
//! Two methods share the `dy/dt = f(y, t)` closure convention:
//!
//! - [`rk4_step`] — classical fixed-step Runge–Kutta, used by
//!   [`rk4_integrate_grid`] with each grid interval split into equal steps.
//! - [`dopri_integrate_grid`] — Dormand–Prince 5(4) with local error
//!   control. Steps are truncated so every grid time is hit exactly, and
//!   the step-size proposal carries over from one interval to the next.
//!
//! Both return one row per requested time; row 0 is a copy of `y0`.
//! Failures (step-size collapse, step budget exhausted, non-finite state)
//! are reported as [`Error::NumericalFailure`], never as a short or
//! NaN-laden trajectory.
//!
//! # Example
//!
//! ```
//! use cpc_ferment::bio::ode::{integrate_grid, IntegrationControl, Method};
//!
//! // Exponential decay: dy/dt = -0.5 * y
//! let grid: Vec<f64> = (0..=10).map(f64::from).collect();
//! let sol = integrate_grid(
//!     |y, _t| vec![-0.5 * y[0]],
//!     &[1.0],
//!     &grid,
//!     &Method::default(),
//!     &IntegrationControl::default(),
//! )
//! .unwrap();
//! assert_eq!(sol.y.len(), grid.len());
//! assert!((sol.y[10][0] - (-5.0_f64).exp()).abs() < 1e-7);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tolerances;

/// Options for the adaptive Dormand–Prince integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdeOptions {
    /// Relative tolerance on each component.
    pub rtol: f64,
    /// Absolute tolerance on each component.
    pub atol: f64,
    /// First trial step; estimated from the RHS when `None`.
    pub h_init: Option<f64>,
    /// Steps smaller than this abort the run.
    pub h_min: f64,
    /// Upper bound on the step size; the grid span when `None`.
    pub h_max: Option<f64>,
    /// Attempted steps allowed between two consecutive grid times.
    pub max_steps_per_interval: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: tolerances::ODE_DEFAULT_RTOL,
            atol: tolerances::ODE_DEFAULT_ATOL,
            h_init: None,
            h_min: tolerances::ODE_MIN_STEP,
            h_max: None,
            max_steps_per_interval: tolerances::ODE_MAX_STEPS_PER_INTERVAL,
        }
    }
}

/// Integration method for [`integrate_grid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Method {
    /// Adaptive Dormand–Prince 5(4).
    DormandPrince(OdeOptions),
    /// Fixed-step RK4; each grid interval is split into `ceil(Δt / dt)` steps.
    Rk4 {
        /// Maximum step size.
        dt: f64,
    },
}

impl Default for Method {
    fn default() -> Self {
        Self::DormandPrince(OdeOptions::default())
    }
}

impl Method {
    /// Check that tolerances and step sizes are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for non-finite or non-positive
    /// tolerances, step bounds, or step budgets.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::DormandPrince(o) => {
                if !(o.rtol.is_finite() && o.rtol > 0.0) {
                    return Err(Error::InvalidConfig(format!("rtol must be > 0, got {}", o.rtol)));
                }
                if !(o.atol.is_finite() && o.atol >= 0.0) {
                    return Err(Error::InvalidConfig(format!("atol must be >= 0, got {}", o.atol)));
                }
                if !(o.h_min.is_finite() && o.h_min > 0.0) {
                    return Err(Error::InvalidConfig(format!("h_min must be > 0, got {}", o.h_min)));
                }
                for (name, value) in [("h_init", o.h_init), ("h_max", o.h_max)] {
                    if let Some(h) = value {
                        if !(h.is_finite() && h > 0.0) {
                            return Err(Error::InvalidConfig(format!("{name} must be > 0, got {h}")));
                        }
                    }
                }
                if o.max_steps_per_interval == 0 {
                    return Err(Error::InvalidConfig("max_steps_per_interval must be >= 1".into()));
                }
                Ok(())
            }
            Self::Rk4 { dt } => {
                if dt.is_finite() && *dt > 0.0 {
                    Ok(())
                } else {
                    Err(Error::InvalidConfig(format!("RK4 dt must be > 0, got {dt}")))
                }
            }
        }
    }
}

/// Run-level switches checked by both integrators.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrationControl<'a> {
    /// Fail with [`Error::NegativeState`] as soon as an accepted step
    /// leaves any component below zero.
    pub strict_non_negative: bool,
    /// Checked before each grid interval; `true` aborts with
    /// [`Error::Cancelled`].
    pub cancel: Option<&'a AtomicBool>,
}

/// Work counters for one integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Right-hand-side evaluations.
    pub rhs_evals: usize,
    /// Accepted steps.
    pub accepted_steps: usize,
    /// Rejected steps (error too large or non-finite stage).
    pub rejected_steps: usize,
}

/// States sampled on the requested grid.
#[derive(Debug, Clone)]
pub struct GridSolution {
    /// The requested time points.
    pub t: Vec<f64>,
    /// `y[i]` is the state at `t[i]`.
    pub y: Vec<Vec<f64>>,
    /// Solver work counters.
    pub stats: SolverStats,
}

/// Perform a single RK4 step.
///
/// Given `dy/dt = f(y, t)`, advance from `y` at time `t` by step `dt`.
#[must_use]
pub fn rk4_step<F>(f: &F, y: &[f64], t: f64, dt: f64) -> Vec<f64>
where
    F: Fn(&[f64], f64) -> Vec<f64>,
{
    let half_dt = 0.5 * dt;
    let k1 = f(y, t);

    let y2: Vec<f64> = y
        .iter()
        .zip(&k1)
        .map(|(&yi, &ki)| half_dt.mul_add(ki, yi))
        .collect();
    let k2 = f(&y2, t + half_dt);

    let y3: Vec<f64> = y
        .iter()
        .zip(&k2)
        .map(|(&yi, &ki)| half_dt.mul_add(ki, yi))
        .collect();
    let k3 = f(&y3, t + half_dt);

    let y4: Vec<f64> = y
        .iter()
        .zip(&k3)
        .map(|(&yi, &ki)| dt.mul_add(ki, yi))
        .collect();
    let k4 = f(&y4, t + dt);

    let sixth_dt = dt / 6.0;
    y.iter()
        .enumerate()
        .map(|(i, &yi)| {
            let slope = 2.0f64.mul_add(k2[i] + k3[i], k1[i] + k4[i]);
            sixth_dt.mul_add(slope, yi)
        })
        .collect()
}

/// Integrate onto `grid` with the chosen [`Method`].
///
/// # Errors
///
/// See [`dopri_integrate_grid`] and [`rk4_integrate_grid`].
pub fn integrate_grid<F>(
    f: F,
    y0: &[f64],
    grid: &[f64],
    method: &Method,
    control: &IntegrationControl<'_>,
) -> Result<GridSolution>
where
    F: Fn(&[f64], f64) -> Vec<f64>,
{
    match method {
        Method::DormandPrince(opts) => dopri_integrate_grid(f, y0, grid, opts, control),
        Method::Rk4 { dt } => rk4_integrate_grid(f, y0, grid, *dt, control),
    }
}

/// Fixed-step RK4 sampled on `grid`.
///
/// Each interval `[t_i, t_{i+1}]` is split into `ceil((t_{i+1} - t_i) / dt)`
/// equal steps, so grid times are hit exactly.
///
/// # Errors
///
/// - [`Error::InvalidInput`] for an empty, non-finite, or non-increasing
///   grid, a non-finite `y0`, or a non-positive `dt`.
/// - [`Error::NumericalFailure`] if the state becomes non-finite or an
///   interval needs more than `RK4_MAX_STEPS_PER_INTERVAL` steps.
/// - [`Error::NegativeState`] / [`Error::Cancelled`] per `control`.
pub fn rk4_integrate_grid<F>(
    f: F,
    y0: &[f64],
    grid: &[f64],
    dt: f64,
    control: &IntegrationControl<'_>,
) -> Result<GridSolution>
where
    F: Fn(&[f64], f64) -> Vec<f64>,
{
    validate_problem(y0, grid)?;
    if !(dt.is_finite() && dt > 0.0) {
        return Err(Error::InvalidInput(format!("RK4 dt must be > 0, got {dt}")));
    }
    if control.strict_non_negative {
        check_non_negative(y0, grid[0])?;
    }

    let mut stats = SolverStats::default();
    let mut t_out = Vec::with_capacity(grid.len());
    let mut y_out = Vec::with_capacity(grid.len());
    t_out.push(grid[0]);
    y_out.push(y0.to_vec());

    let mut y = y0.to_vec();
    for pair in grid.windows(2) {
        let (t0, t1) = (pair[0], pair[1]);
        check_cancel(control, t0)?;

        let wanted = ((t1 - t0) / dt).ceil().max(1.0);
        #[allow(clippy::cast_precision_loss)]
        let budget = tolerances::RK4_MAX_STEPS_PER_INTERVAL as f64;
        if !(wanted <= budget) {
            return Err(Error::NumericalFailure(format!(
                "RK4 dt = {dt} needs {wanted:e} steps over [{t0}, {t1}], budget {}",
                tolerances::RK4_MAX_STEPS_PER_INTERVAL
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n_steps = wanted as usize;
        #[allow(clippy::cast_precision_loss)]
        let h = (t1 - t0) / n_steps as f64;

        for s in 0..n_steps {
            #[allow(clippy::cast_precision_loss)]
            let t = (s as f64).mul_add(h, t0);
            y = rk4_step(&f, &y, t, h);
            stats.rhs_evals += 4;
            stats.accepted_steps += 1;
            if y.iter().any(|v| !v.is_finite()) {
                return Err(Error::NumericalFailure(format!(
                    "RK4 state became non-finite near t = {}",
                    t + h
                )));
            }
            if control.strict_non_negative {
                check_non_negative(&y, t + h)?;
            }
        }
        t_out.push(t1);
        y_out.push(y.clone());
    }

    log::debug!(
        "rk4: {} steps, {} RHS evaluations over {} grid points",
        stats.accepted_steps,
        stats.rhs_evals,
        grid.len()
    );
    Ok(GridSolution {
        t: t_out,
        y: y_out,
        stats,
    })
}

// ── Dormand–Prince 5(4) ───────────────────────────────────────

const SAFETY: f64 = 0.9;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// 5th-order minus embedded 4th-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339_200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

struct DopriStep {
    y: Vec<f64>,
    k7: Vec<f64>,
    err: Vec<f64>,
}

impl DopriStep {
    fn is_finite(&self) -> bool {
        self.y.iter().chain(&self.k7).all(|v| v.is_finite())
    }
}

fn stage(y: &[f64], h: f64, terms: &[(f64, &[f64])]) -> Vec<f64> {
    y.iter()
        .enumerate()
        .map(|(i, &yi)| yi + h * terms.iter().map(|&(a, k)| a * k[i]).sum::<f64>())
        .collect()
}

fn dopri_step<F>(f: &F, y: &[f64], k1: &[f64], t: f64, h: f64) -> DopriStep
where
    F: Fn(&[f64], f64) -> Vec<f64>,
{
    let k2 = f(&stage(y, h, &[(A21, k1)]), C2.mul_add(h, t));
    let k3 = f(&stage(y, h, &[(A31, k1), (A32, &k2[..])]), C3.mul_add(h, t));
    let k4 = f(
        &stage(y, h, &[(A41, k1), (A42, &k2[..]), (A43, &k3[..])]),
        C4.mul_add(h, t),
    );
    let k5 = f(
        &stage(y, h, &[(A51, k1), (A52, &k2[..]), (A53, &k3[..]), (A54, &k4[..])]),
        C5.mul_add(h, t),
    );
    let k6 = f(
        &stage(
            y,
            h,
            &[(A61, k1), (A62, &k2[..]), (A63, &k3[..]), (A64, &k4[..]), (A65, &k5[..])],
        ),
        t + h,
    );
    let y_new = stage(
        y,
        h,
        &[(A71, k1), (A73, &k3[..]), (A74, &k4[..]), (A75, &k5[..]), (A76, &k6[..])],
    );
    let k7 = f(&y_new, t + h);

    let err = (0..y.len())
        .map(|i| {
            h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i])
        })
        .collect();

    DopriStep { y: y_new, k7, err }
}

#[allow(clippy::cast_precision_loss)]
fn rms(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    (values.map(|v| v * v).sum::<f64>() / n as f64).sqrt()
}

fn error_norm(err: &[f64], y: &[f64], y_new: &[f64], opts: &OdeOptions) -> f64 {
    rms(
        err.iter().zip(y).zip(y_new).map(|((&e, &a), &b)| {
            let scale = opts.atol + opts.rtol * a.abs().max(b.abs());
            e / scale
        }),
        err.len(),
    )
}

/// Starting step size (Hairer, Nørsett & Wanner, *Solving ODEs I*, §II.4).
fn initial_step<F>(f: &F, y0: &[f64], f0: &[f64], t0: f64, opts: &OdeOptions) -> f64
where
    F: Fn(&[f64], f64) -> Vec<f64>,
{
    let n = y0.len();
    let scale: Vec<f64> = y0.iter().map(|y| opts.atol + opts.rtol * y.abs()).collect();
    let d0 = rms(y0.iter().zip(&scale).map(|(y, s)| y / s), n);
    let d1 = rms(f0.iter().zip(&scale).map(|(d, s)| d / s), n);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };

    let y1: Vec<f64> = y0.iter().zip(f0).map(|(y, d)| y + h0 * d).collect();
    let f1 = f(&y1, t0 + h0);
    let d2 = rms(
        f1.iter().zip(f0).zip(&scale).map(|((a, b), s)| (a - b) / s),
        n,
    ) / h0;

    let d_max = d1.max(d2);
    let h1 = if d_max <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d_max).powf(0.2)
    };
    let h = (100.0 * h0).min(h1);
    if h.is_finite() && h > 0.0 {
        h
    } else {
        1e-6
    }
}

/// Adaptive Dormand–Prince 5(4) sampled on `grid`.
///
/// The local error estimate of each step is measured against
/// `atol + rtol * max(|y|, |y_new|)` per component (RMS norm). A step that
/// would pass the next grid time is shortened to land on it exactly.
///
/// # Errors
///
/// - [`Error::InvalidInput`] for an empty, non-finite, or non-increasing
///   grid, or a non-finite `y0`.
/// - [`Error::NumericalFailure`] if the RHS is non-finite at an accepted
///   state, the step size drops below `h_min`, or an interval needs more
///   than `max_steps_per_interval` attempts.
/// - [`Error::NegativeState`] / [`Error::Cancelled`] per `control`.
pub fn dopri_integrate_grid<F>(
    f: F,
    y0: &[f64],
    grid: &[f64],
    opts: &OdeOptions,
    control: &IntegrationControl<'_>,
) -> Result<GridSolution>
where
    F: Fn(&[f64], f64) -> Vec<f64>,
{
    validate_problem(y0, grid)?;
    if control.strict_non_negative {
        check_non_negative(y0, grid[0])?;
    }

    let mut stats = SolverStats::default();
    let mut t_out = Vec::with_capacity(grid.len());
    let mut y_out = Vec::with_capacity(grid.len());
    t_out.push(grid[0]);
    y_out.push(y0.to_vec());
    if grid.len() == 1 {
        return Ok(GridSolution {
            t: t_out,
            y: y_out,
            stats,
        });
    }

    let mut t = grid[0];
    let mut y = y0.to_vec();
    let mut k1 = f(&y, t);
    stats.rhs_evals += 1;
    if k1.iter().any(|v| !v.is_finite()) {
        return Err(Error::NumericalFailure(format!(
            "non-finite derivative at t = {t}"
        )));
    }

    let span = grid[grid.len() - 1] - grid[0];
    let h_max = opts.h_max.map_or(span, |h| h.min(span));
    let mut h = match opts.h_init {
        Some(h0) => h0,
        None => {
            stats.rhs_evals += 1;
            initial_step(&f, &y, &k1, t, opts)
        }
    };
    let mut last_rejected = false;

    for &t_next in &grid[1..] {
        check_cancel(control, t)?;
        let mut attempts = 0;

        while t < t_next {
            if attempts >= opts.max_steps_per_interval {
                return Err(Error::NumericalFailure(format!(
                    "step budget of {} exhausted between t = {t} and t = {t_next}",
                    opts.max_steps_per_interval
                )));
            }
            h = h.min(h_max);
            if h < opts.h_min || h <= f64::EPSILON * t.abs() {
                return Err(Error::NumericalFailure(format!(
                    "step size {h:e} underflow at t = {t}"
                )));
            }
            attempts += 1;

            let remaining = t_next - t;
            let truncated = h >= remaining;
            let h_step = if truncated { remaining } else { h };

            let step = dopri_step(&f, &y, &k1, t, h_step);
            stats.rhs_evals += 6;
            let err = if step.is_finite() {
                error_norm(&step.err, &y, &step.y, opts)
            } else {
                f64::INFINITY
            };

            if err <= 1.0 {
                stats.accepted_steps += 1;
                t = if truncated { t_next } else { t + h_step };
                y = step.y;
                k1 = step.k7;
                if control.strict_non_negative {
                    check_non_negative(&y, t)?;
                }

                let mut fac = if err == 0.0 {
                    FAC_MAX
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(FAC_MIN, FAC_MAX)
                };
                if last_rejected {
                    fac = fac.min(1.0);
                }
                h = if truncated {
                    h.max(h_step * fac)
                } else {
                    h_step * fac
                };
                last_rejected = false;
            } else {
                stats.rejected_steps += 1;
                let fac = if err.is_finite() {
                    (SAFETY * err.powf(-0.2)).clamp(FAC_MIN, 1.0)
                } else {
                    FAC_MIN
                };
                h = h_step * fac;
                last_rejected = true;
            }
        }

        t_out.push(t_next);
        y_out.push(y.clone());
    }

    log::debug!(
        "dopri5: {} accepted, {} rejected, {} RHS evaluations over {} grid points",
        stats.accepted_steps,
        stats.rejected_steps,
        stats.rhs_evals,
        grid.len()
    );
    Ok(GridSolution {
        t: t_out,
        y: y_out,
        stats,
    })
}

fn validate_problem(y0: &[f64], grid: &[f64]) -> Result<()> {
    if y0.is_empty() {
        return Err(Error::InvalidInput("initial state is empty".into()));
    }
    if let Some(i) = y0.iter().position(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "initial state component {i} is not finite"
        )));
    }
    if grid.is_empty() {
        return Err(Error::InvalidInput("time grid is empty".into()));
    }
    if grid.iter().any(|t| !t.is_finite()) {
        return Err(Error::InvalidInput("time grid contains non-finite values".into()));
    }
    if let Some(i) = grid.windows(2).position(|w| w[1] <= w[0]) {
        return Err(Error::InvalidInput(format!(
            "time grid must be strictly increasing (index {})",
            i + 1
        )));
    }
    Ok(())
}

fn check_non_negative(y: &[f64], t: f64) -> Result<()> {
    match y.iter().position(|&v| v < 0.0) {
        Some(index) => Err(Error::NegativeState {
            t,
            index,
            value: y[index],
        }),
        None => Ok(()),
    }
}

fn check_cancel(control: &IntegrationControl<'_>, t: f64) -> Result<()> {
    match control.cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled { t }),
        _ => Ok(()),
    }
}
