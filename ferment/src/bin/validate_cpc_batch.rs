// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validation binary: reference CPC batch fermentation.
//!
//! Integrates the diauxic CPC model from the reference inoculum over
//! 100 h and checks the product summaries against a tight-tolerance
//! reference integration, plus the structural properties every run must
//! have.
//!
//! # Provenance
//!
//! | Field | Value |
//! |-------|-------|
//! | Baseline script | `dynamic_syst.py` (scipy `odeint`, LSODA, rtol = atol = 1.49012e-8) |
//! | Reported values | final P 562.048 mg/L, max P 593.314 mg/L, total 6.745 kg |
//! | Reference integration | Dormand–Prince 5(4), rtol = atol = 1e-12, same grid |
//! | Grid | 100 points, 0–100 h |
//! | Initial state | X_H 5, X_T 0, S1 40, S2 5, E 0, P 0 (g/L, mg/L), V 12 000 L |
//! | Feed | none (Q = 0) |

use std::sync::atomic::AtomicBool;

use cpc_ferment::bio::fermentation::{
    reference_batch, simulate, simulate_cancellable, BatchRun, ProductSummary, Trajectory,
};
use cpc_ferment::bio::kinetics::{specific_rates, Field, KineticParams};
use cpc_ferment::bio::ode::Method;
use cpc_ferment::error::Error;
use cpc_ferment::tolerances;
use cpc_ferment::validation::Validator;

// Reference integration (rtol = atol = 1e-12).
const FINAL_P: f64 = 562.047_960_418_014_2;
const MAX_P: f64 = 593.313_916_065_444_9;
const TOTAL_KG: f64 = 6.744_575_525_016_171;
const FINAL_X_T: f64 = 16.938_542_765_244_684;
const FINAL_S2: f64 = -0.423_570_663_183_951_3;

// Values as reported by the baseline script (3 decimals).
const REPORTED_FINAL_P: f64 = 562.048;
const REPORTED_MAX_P: f64 = 593.314;
const REPORTED_TOTAL_KG: f64 = 6.745;
const REPORT_ROUNDING: f64 = 5e-4;

/// First grid index with S1 at or below the phase threshold.
const DEPLETION_INDEX: usize = 37;
/// Grid index of the product maximum.
const PEAK_INDEX: usize = 84;

fn glucose_non_increasing_before_shift(traj: &Trajectory, threshold: f64) -> bool {
    traj.states
        .windows(2)
        .take_while(|w| w[0].s1 > threshold)
        .all(|w| w[1].s1 <= w[0].s1)
}

fn phase_selector_agrees(traj: &Trajectory, params: &KineticParams) -> bool {
    traj.t.iter().zip(&traj.states).all(|(&t, s)| {
        let r = specific_rates(t, s, params);
        let selector = params.hyphal_growth_source(s.s1);
        let by_phi = if r.phi > 0.5 {
            Field::Sucrose
        } else {
            Field::Glucose
        };
        selector == by_phi && r.growth_source == selector
    })
}

fn main() {
    env_logger::init();
    let mut v = Validator::new("validate_cpc_batch (diauxic CPC batch, 12 000 L, 100 h)");
    let run = reference_batch();
    let threshold = run.params.phase_threshold;

    v.section("── Reference run ──");
    let Some(traj) = v.check_ok("Dormand–Prince run completes", simulate(&run)) else {
        v.finish();
    };
    v.check_count("one row per grid time", traj.len(), run.grid.len());
    let row0_identical = traj.states[0]
        .to_array()
        .iter()
        .zip(run.initial.to_array())
        .all(|(a, b)| a.to_bits() == b.to_bits());
    v.check_true("row 0 is the initial state bit-for-bit", row0_identical);
    v.check_true(
        "grid times reproduced exactly",
        traj.t
            .iter()
            .zip(run.grid.as_slice())
            .all(|(a, b)| a.to_bits() == b.to_bits()),
    );
    println!(
        "  solver: {} accepted, {} rejected, {} RHS evaluations",
        traj.stats.accepted_steps, traj.stats.rejected_steps, traj.stats.rhs_evals
    );

    v.section("── Product summary vs reference integration ──");
    let summary = ProductSummary::from_trajectory(&traj);
    v.check_relative("final P (mg/L)", summary.final_product, FINAL_P, tolerances::GOLDEN_RELATIVE);
    v.check_relative("max P (mg/L)", summary.max_product, MAX_P, tolerances::GOLDEN_RELATIVE);
    v.check_relative("total CPC (kg)", summary.total_kg, TOTAL_KG, tolerances::GOLDEN_RELATIVE);
    v.check("final P, reported", summary.final_product, REPORTED_FINAL_P, REPORT_ROUNDING);
    v.check("max P, reported", summary.max_product, REPORTED_MAX_P, REPORT_ROUNDING);
    v.check("total CPC, reported", summary.total_kg, REPORTED_TOTAL_KG, REPORT_ROUNDING);
    v.check(
        "total = P·V / 1e6",
        summary.total_kg,
        summary.final_product * 12_000.0 / tolerances::MG_PER_KG,
        tolerances::EXACT,
    );

    v.section("── Trajectory shape ──");
    let Some(last) = traj.final_state().copied() else {
        v.finish();
    };
    v.check_relative("final X_T (g/L)", last.x_t, FINAL_X_T, tolerances::GOLDEN_RELATIVE);
    v.check_relative(
        "final S2 (g/L), unclamped",
        last.s2,
        FINAL_S2,
        tolerances::GOLDEN_RELATIVE,
    );
    v.check("volume constant without feed", last.v, 12_000.0, tolerances::EXACT);
    let depletion = traj.states.iter().position(|s| s.s1 <= threshold);
    v.check_count(
        "glucose depleted at grid index",
        depletion.unwrap_or(usize::MAX),
        DEPLETION_INDEX,
    );
    v.check(
        "peak time (h)",
        summary.peak_time,
        traj.t[PEAK_INDEX],
        tolerances::EXACT,
    );
    v.check_true(
        "S1 non-increasing while above threshold",
        glucose_non_increasing_before_shift(&traj, threshold),
    );
    v.check_true(
        "φ and hyphal growth source agree at every row",
        phase_selector_agrees(&traj, &run.params),
    );

    v.section("── Determinism ──");
    if let Some(again) = v.check_ok("rerun completes", simulate(&run)) {
        let identical = traj
            .states
            .iter()
            .zip(&again.states)
            .all(|(a, b)| {
                a.to_array()
                    .iter()
                    .zip(b.to_array())
                    .all(|(x, y)| x.to_bits() == y.to_bits())
            });
        v.check_true("rerun bitwise identical", identical);
    }

    v.section("── Method parity: RK4 (dt = 0.01 h) ──");
    let rk4 = BatchRun {
        method: Method::Rk4 { dt: 0.01 },
        ..reference_batch()
    };
    if let Some(rk4_traj) = v.check_ok("RK4 run completes", simulate(&rk4)) {
        let rk4_summary = ProductSummary::from_trajectory(&rk4_traj);
        v.check_relative(
            "RK4 final P vs reference",
            rk4_summary.final_product,
            FINAL_P,
            tolerances::ODE_METHOD_PARITY,
        );
        v.check_relative(
            "RK4 max P vs reference",
            rk4_summary.max_product,
            MAX_P,
            tolerances::ODE_METHOD_PARITY,
        );
    }

    v.section("── Strict mode and cancellation ──");
    let strict = BatchRun {
        strict_non_negative: true,
        ..reference_batch()
    };
    let negative_sucrose = matches!(
        simulate(&strict),
        Err(Error::NegativeState { index, .. }) if index == Field::Sucrose.index()
    );
    v.check_true("strict run stops on negative sucrose", negative_sucrose);
    let cancel = AtomicBool::new(true);
    v.check_true(
        "pre-cancelled run returns Cancelled",
        matches!(
            simulate_cancellable(&run, &cancel),
            Err(Error::Cancelled { .. })
        ),
    );

    v.finish();
}
