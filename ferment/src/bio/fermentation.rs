// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch and fed-batch runs of the CPC fermentation model.
//!
//! A [`BatchRun`] bundles the kinetic parameters, the inoculum, the output
//! grid, and the integration method. [`simulate`] validates the run and
//! integrates the kinetic rates onto the grid, returning an immutable
//! [`Trajectory`] with one [`FermentationState`] per grid time.
//! [`ProductSummary`] reduces a trajectory to the three figures the
//! reference batch is reported by.
//!
//! # Example
//!
//! ```
//! use cpc_ferment::bio::fermentation::{reference_batch, simulate, ProductSummary};
//!
//! let traj = simulate(&reference_batch()).unwrap();
//! assert_eq!(traj.len(), 100);
//! let summary = ProductSummary::from_trajectory(&traj);
//! assert!(summary.max_product >= summary.final_product);
//! ```

use std::sync::atomic::AtomicBool;

use super::kinetics::{rhs, FermentationState, Field, KineticParams};
use super::ode::{integrate_grid, IntegrationControl, Method, SolverStats};
use crate::error::{Error, Result};
use crate::tolerances;

/// Output times of a run: finite, strictly increasing, at least one point.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid(Vec<f64>);

impl TimeGrid {
    /// Wrap explicit output times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the grid is empty, contains a
    /// non-finite time, or is not strictly increasing.
    pub fn new(times: Vec<f64>) -> Result<Self> {
        if times.is_empty() {
            return Err(Error::InvalidConfig("time grid is empty".into()));
        }
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(Error::InvalidConfig(format!("time grid contains {t}")));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::InvalidConfig(format!(
                "time grid must be strictly increasing (t[{}] = {} after {})",
                i + 1,
                times[i + 1],
                times[i]
            )));
        }
        Ok(Self(times))
    }

    /// `points` evenly spaced times from `start` to `end`, both included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for non-finite bounds, `points == 0`,
    /// `end <= start` with more than one point, or a spacing too fine to
    /// stay strictly increasing.
    pub fn linspace(start: f64, end: f64, points: usize) -> Result<Self> {
        if !(start.is_finite() && end.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "grid bounds must be finite, got {start}..{end}"
            )));
        }
        match points {
            0 => Err(Error::InvalidConfig("grid needs at least one point".into())),
            1 => Self::new(vec![start]),
            n => {
                if end <= start {
                    return Err(Error::InvalidConfig(format!(
                        "grid end {end} must exceed start {start}"
                    )));
                }
                #[allow(clippy::cast_precision_loss)]
                let step = (end - start) / (n - 1) as f64;
                #[allow(clippy::cast_precision_loss, clippy::suboptimal_flops)]
                let mut times: Vec<f64> = (0..n).map(|i| i as f64 * step + start).collect();
                times[n - 1] = end;
                Self::new(times)
            }
        }
    }

    /// Reference sampling: 100 points over 0–100 h.
    #[must_use]
    pub fn reference() -> Self {
        let step = 100.0 / 99.0;
        let mut times: Vec<f64> = (0..100).map(|i| f64::from(i) * step).collect();
        times[99] = 100.0;
        Self(times)
    }

    /// Output times.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of output times.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; a grid has at least one point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything needed to integrate one fermentation.
#[derive(Debug, Clone)]
pub struct BatchRun {
    /// Kinetic constants and feed.
    pub params: KineticParams,
    /// State at the first grid time.
    pub initial: FermentationState,
    /// Output times.
    pub grid: TimeGrid,
    /// Integration method and tolerances.
    pub method: Method,
    /// Abort with [`Error::NegativeState`] when any component goes negative.
    pub strict_non_negative: bool,
}

impl BatchRun {
    /// The reference batch: literature parameters, 12 000 L inoculum,
    /// 100 points over 100 h, Dormand–Prince at default tolerances.
    #[must_use]
    pub fn reference() -> Self {
        Self {
            params: KineticParams::default(),
            initial: FermentationState::reference(),
            grid: TimeGrid::reference(),
            method: Method::default(),
            strict_non_negative: false,
        }
    }

    /// Reject a run before any integration work is done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for invalid parameters, initial
    /// state, or method settings.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.initial.validate()?;
        self.method.validate()
    }
}

/// [`BatchRun::reference`].
#[must_use]
pub fn reference_batch() -> BatchRun {
    BatchRun::reference()
}

/// Sampled solution of one run.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Grid times.
    pub t: Vec<f64>,
    /// `states[i]` is the state at `t[i]`; row 0 is the initial state.
    pub states: Vec<FermentationState>,
    /// Solver work counters.
    pub stats: SolverStats,
}

impl Trajectory {
    /// Time series of one field.
    #[must_use]
    pub fn column(&self, field: Field) -> Vec<f64> {
        self.states.iter().map(|s| s.get(field)).collect()
    }

    /// State at the last grid time.
    #[must_use]
    pub fn final_state(&self) -> Option<&FermentationState> {
        self.states.last()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// `true` if the trajectory has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// First grid time at which glucose is at or below the phase
    /// threshold, if it ever is.
    #[must_use]
    pub fn glucose_depletion_time(&self, threshold: f64) -> Option<f64> {
        self.t
            .iter()
            .zip(&self.states)
            .find(|(_, s)| s.s1 <= threshold)
            .map(|(&t, _)| t)
    }
}

/// Integrate a run onto its grid.
///
/// # Errors
///
/// - [`Error::InvalidConfig`] if the run fails [`BatchRun::validate`].
/// - [`Error::NumericalFailure`] if the solver cannot meet its tolerances.
/// - [`Error::NegativeState`] in strict runs.
pub fn simulate(run: &BatchRun) -> Result<Trajectory> {
    integrate(run, None)
}

/// [`simulate`], checking `cancel` between grid points.
///
/// # Errors
///
/// As [`simulate`], plus [`Error::Cancelled`] once `cancel` is set.
pub fn simulate_cancellable(run: &BatchRun, cancel: &AtomicBool) -> Result<Trajectory> {
    integrate(run, Some(cancel))
}

fn integrate(run: &BatchRun, cancel: Option<&AtomicBool>) -> Result<Trajectory> {
    run.validate()?;
    let control = IntegrationControl {
        strict_non_negative: run.strict_non_negative,
        cancel,
    };
    let sol = integrate_grid(
        rhs(&run.params),
        &run.initial.to_array(),
        run.grid.as_slice(),
        &run.method,
        &control,
    )?;

    let mut states = Vec::with_capacity(sol.y.len());
    for row in &sol.y {
        states.push(FermentationState::from_slice(row)?);
    }
    if let Some(last) = states.last() {
        log::debug!(
            "fermentation run to t = {}: P = {:.3} mg/L, V = {:.1} L",
            sol.t.last().copied().unwrap_or_default(),
            last.p,
            last.v
        );
    }
    Ok(Trajectory {
        t: sol.t,
        states,
        stats: sol.stats,
    })
}

/// Product figures of a finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductSummary {
    /// Product concentration at the last grid time (mg/L).
    pub final_product: f64,
    /// Largest product concentration on the grid (mg/L).
    pub max_product: f64,
    /// Grid time of `max_product` (h).
    pub peak_time: f64,
    /// Product mass in the reactor at the last grid time (kg).
    pub total_kg: f64,
}

impl ProductSummary {
    /// Summarize a trajectory. An empty trajectory yields all zeros.
    #[must_use]
    pub fn from_trajectory(traj: &Trajectory) -> Self {
        let Some(last) = traj.final_state() else {
            return Self {
                final_product: 0.0,
                max_product: 0.0,
                peak_time: 0.0,
                total_kg: 0.0,
            };
        };
        let first = traj.states.first().unwrap_or(last);
        let first_time = traj.t.first().copied().unwrap_or_default();
        let (peak_time, max_product) = traj
            .t
            .iter()
            .zip(&traj.states)
            .map(|(&t, s)| (t, s.p))
            .fold((first_time, first.p), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        Self {
            final_product: last.p,
            max_product,
            peak_time,
            total_kg: last.p * last.v / tolerances::MG_PER_KG,
        }
    }
}
