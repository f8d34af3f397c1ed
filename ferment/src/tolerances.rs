// SPDX-License-Identifier: AGPL-3.0-or-later
//! Centralized numerical tolerances with their origin.
//!
//! Every threshold used by the solvers, the fit, the statistical
//! functions, and the validation binaries is defined here. No ad-hoc
//! magic numbers.
//!
//! # Tolerance categories
//!
//! | Category | Basis | Example |
//! |----------|-------|---------|
//! | Exact | IEEE 754 f64 | 0.0 for row-0 identity |
//! | Machine | f64 arithmetic | 1e-12 for analytical formulas |
//! | Solver | local error control | 1.49012e-8 default rtol/atol |
//! | Baseline | reference integration | 1e-6 relative on product summaries |

// ═══════════════════════════════════════════════════════════════════
// Machine-precision tolerances (IEEE 754 f64)
// ═══════════════════════════════════════════════════════════════════

/// Operations that must be exact (row-0 copy, counts).
pub const EXACT: f64 = 0.0;

/// Analytical formulas with minimal f64 rounding.
///
/// f64 has ~15.9 significant digits; 1e-12 allows 3 digits of
/// accumulated rounding in simple arithmetic chains.
pub const ANALYTICAL_F64: f64 = 1e-12;

// ═══════════════════════════════════════════════════════════════════
// ODE solver defaults
// ═══════════════════════════════════════════════════════════════════

/// Default relative tolerance: √ε(f64) ≈ 1.49012e-8, the tolerance the
/// reference batch baseline was integrated with.
pub const ODE_DEFAULT_RTOL: f64 = 1.490_116_119_384_765_6e-8;

/// Default absolute tolerance (same value as the relative tolerance).
pub const ODE_DEFAULT_ATOL: f64 = 1.490_116_119_384_765_6e-8;

/// Smallest step the adaptive solver may take before declaring failure.
pub const ODE_MIN_STEP: f64 = 1e-12;

/// Step budget per output interval before declaring failure.
pub const ODE_MAX_STEPS_PER_INTERVAL: usize = 500;

/// Fixed-step RK4 budget per output interval; a `dt` needing more steps
/// is rejected instead of run.
pub const RK4_MAX_STEPS_PER_INTERVAL: usize = 1_000_000;

/// RK4 (dt = 0.01 h) vs Dormand–Prince on the reference batch,
/// relative difference on product summaries.
pub const ODE_METHOD_PARITY: f64 = 1e-4;

// ═══════════════════════════════════════════════════════════════════
// Baseline tolerances
// ═══════════════════════════════════════════════════════════════════

/// Golden product summaries (final P, max P, total kg), relative.
pub const GOLDEN_RELATIVE: f64 = 1e-6;

/// Phase threshold of the reference kinetics: glucose (g/L) at or below
/// which sucrose uptake starts.
pub const GLUCOSE_DEPLETION_G_PER_L: f64 = 0.01;

/// Conversion from mg/L × L to kg of product.
pub const MG_PER_KG: f64 = 1e6;

// ═══════════════════════════════════════════════════════════════════
// Curve fitting (Levenberg–Marquardt)
// ═══════════════════════════════════════════════════════════════════

/// Relative reduction in sum of squares that counts as converged.
pub const LM_FTOL: f64 = 1.490_116_119_384_765_6e-8;

/// Relative parameter change that counts as converged.
pub const LM_XTOL: f64 = 1.490_116_119_384_765_6e-8;

/// Iteration budget for the 4-parameter fit.
pub const LM_MAX_ITER: usize = 1000;

/// Starting Marquardt damping factor.
pub const LM_LAMBDA_INIT: f64 = 1e-3;

/// Damping floor after successful steps.
pub const LM_LAMBDA_MIN: f64 = 1e-12;

/// Damping at which no further descent is possible in f64; the current
/// estimate is returned as the minimum.
pub const LM_LAMBDA_MAX: f64 = 1e16;

/// Floor on diagonal entries of `JᵀJ` used for damping.
pub const LM_DIAG_FLOOR: f64 = 1e-12;

/// Pivot magnitude treated as singular in the normal equations.
pub const SINGULAR_PIVOT: f64 = 1e-300;

// ═══════════════════════════════════════════════════════════════════
// Special functions
// ═══════════════════════════════════════════════════════════════════

/// Continued-fraction convergence for the regularized incomplete beta.
pub const BETA_CF_CONVERGENCE: f64 = 1e-15;

/// Iteration cap for the incomplete beta continued fraction.
pub const BETA_CF_MAX_ITER: usize = 300;

/// Interval contribution below which the studentized range integral stops.
pub const PTUKEY_INTERVAL_EPS: f64 = 1e-14;

/// Bisection tolerance on the studentized range quantile.
pub const QTUKEY_TOLERANCE: f64 = 1e-10;
