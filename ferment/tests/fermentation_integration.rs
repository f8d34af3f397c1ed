// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the CPC batch: reference summaries, trajectory
//! shape, method parity, and fed-batch variants through the public API.

use cpc_ferment::bio::fermentation::{
    reference_batch, simulate, BatchRun, ProductSummary, TimeGrid, Trajectory,
};
use cpc_ferment::bio::kinetics::{
    specific_rates, FeedPolicy, Field, FermentationState, KineticParams, Phase,
};
use cpc_ferment::bio::ode::{Method, OdeOptions};
use cpc_ferment::error::Error;
use cpc_ferment::tolerances;

// Reference integration at rtol = atol = 1e-12 on the 100-point grid.
const FINAL_P: f64 = 562.047_960_418_014_2;
const MAX_P: f64 = 593.313_916_065_444_9;
const TOTAL_KG: f64 = 6.744_575_525_016_171;
const FINAL_X_H: f64 = 0.732_298_846_386_093_8;
const FINAL_X_T: f64 = 16.938_542_765_244_684;
const FINAL_S2: f64 = -0.423_570_663_183_951_3;
const FINAL_E: f64 = 0.141_059_361_933_230_07;

fn rel(actual: f64, expected: f64) -> f64 {
    (actual - expected).abs() / expected.abs()
}

fn reference() -> Trajectory {
    simulate(&reference_batch()).unwrap()
}

// ── Reference summaries ─────────────────────────────────────────

#[test]
fn reference_summary_matches_tight_integration() {
    let s = ProductSummary::from_trajectory(&reference());
    assert!(rel(s.final_product, FINAL_P) <= tolerances::GOLDEN_RELATIVE, "{}", s.final_product);
    assert!(rel(s.max_product, MAX_P) <= tolerances::GOLDEN_RELATIVE, "{}", s.max_product);
    assert!(rel(s.total_kg, TOTAL_KG) <= tolerances::GOLDEN_RELATIVE, "{}", s.total_kg);
}

#[test]
fn reference_summary_rounds_to_reported_values() {
    let s = ProductSummary::from_trajectory(&reference());
    assert_eq!(format!("{:.3}", s.final_product), "562.048");
    assert_eq!(format!("{:.3}", s.max_product), "593.314");
    assert_eq!(format!("{:.3}", s.total_kg), "6.745");
}

#[test]
fn reference_final_state() {
    let traj = reference();
    let last = traj.final_state().unwrap();
    assert!(rel(last.x_h, FINAL_X_H) <= tolerances::GOLDEN_RELATIVE);
    assert!(rel(last.x_t, FINAL_X_T) <= tolerances::GOLDEN_RELATIVE);
    assert!(rel(last.s2, FINAL_S2) <= tolerances::GOLDEN_RELATIVE);
    assert!(rel(last.e, FINAL_E) <= tolerances::GOLDEN_RELATIVE);
    assert!(last.s1.abs() < 1e-6, "glucose exhausted: {}", last.s1);
    assert!((last.v - 12_000.0).abs() <= tolerances::EXACT);
}

#[test]
fn tighter_tolerance_agrees_with_reference() {
    let run = BatchRun {
        method: Method::DormandPrince(OdeOptions {
            rtol: 1e-10,
            atol: 1e-10,
            ..OdeOptions::default()
        }),
        ..reference_batch()
    };
    let s = ProductSummary::from_trajectory(&simulate(&run).unwrap());
    assert!(rel(s.final_product, FINAL_P) <= tolerances::GOLDEN_RELATIVE);
    assert!(rel(s.max_product, MAX_P) <= tolerances::GOLDEN_RELATIVE);
}

// ── Trajectory shape ────────────────────────────────────────────

#[test]
fn row_zero_is_initial_state() {
    let traj = reference();
    assert_eq!(traj.len(), 100);
    assert_eq!(traj.t[0].to_bits(), 0.0_f64.to_bits());
    assert_eq!(traj.t[99].to_bits(), 100.0_f64.to_bits());
    for (a, b) in traj.states[0]
        .to_array()
        .iter()
        .zip(FermentationState::reference().to_array())
    {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn glucose_depletes_at_expected_grid_row() {
    let traj = reference();
    let threshold = tolerances::GLUCOSE_DEPLETION_G_PER_L;
    let idx = traj.states.iter().position(|s| s.s1 <= threshold).unwrap();
    assert_eq!(idx, 37);
    assert_eq!(traj.glucose_depletion_time(threshold), Some(traj.t[37]));
}

#[test]
fn glucose_non_increasing_before_shift() {
    let traj = reference();
    for w in traj
        .states
        .windows(2)
        .take_while(|w| w[0].s1 > tolerances::GLUCOSE_DEPLETION_G_PER_L)
    {
        assert!(w[1].s1 <= w[0].s1);
    }
}

#[test]
fn glucose_phase_converts_substrate_to_biomass() {
    let traj = reference();
    let start = traj.states[0];
    let shift = traj.states[37];
    assert!(shift.s1 < start.s1);
    assert!(shift.total_biomass() > start.total_biomass());
    assert!(shift.p > start.p);
}

#[test]
fn product_peaks_then_declines() {
    let traj = reference();
    let s = ProductSummary::from_trajectory(&traj);
    assert_eq!(s.peak_time.to_bits(), traj.t[84].to_bits());
    assert!(s.final_product < s.max_product);
    let p = traj.column(Field::Product);
    assert!(p[..=84].windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn phase_selector_consistent_on_every_row() {
    let traj = reference();
    let params = KineticParams::default();
    for (&t, s) in traj.t.iter().zip(&traj.states) {
        let r = specific_rates(t, s, &params);
        match r.phase {
            Phase::Glucose => {
                assert!((r.phi - 0.0).abs() <= tolerances::EXACT);
                assert_eq!(r.growth_source, Field::Glucose);
            }
            Phase::Sucrose => {
                assert!((r.phi - 1.0).abs() <= tolerances::EXACT);
                assert_eq!(r.growth_source, Field::Sucrose);
            }
        }
    }
}

#[test]
fn sucrose_overshoots_below_zero_when_unclamped() {
    let last = *reference().final_state().unwrap();
    assert!(last.s2 < 0.0);
}

// ── Method parity and variants ──────────────────────────────────

#[test]
fn rk4_matches_reference_within_parity() {
    let run = BatchRun {
        method: Method::Rk4 { dt: 0.01 },
        ..reference_batch()
    };
    let s = ProductSummary::from_trajectory(&simulate(&run).unwrap());
    assert!(rel(s.final_product, FINAL_P) <= tolerances::ODE_METHOD_PARITY);
    assert!(rel(s.max_product, MAX_P) <= tolerances::ODE_METHOD_PARITY);
    assert!(rel(s.total_kg, TOTAL_KG) <= tolerances::ODE_METHOD_PARITY);
}

#[test]
fn strict_run_reports_negative_sucrose() {
    let run = BatchRun {
        strict_non_negative: true,
        ..reference_batch()
    };
    match simulate(&run) {
        Err(Error::NegativeState { t, index, value }) => {
            assert_eq!(index, Field::Sucrose.index());
            assert!(value < 0.0);
            assert!((60.0..65.0).contains(&t), "t = {t}");
        }
        other => panic!("expected NegativeState, got {other:?}"),
    }
}

#[test]
fn threshold_feed_only_dilutes_after_shift() {
    let (scale, rate) = FeedPolicy::reference_ramp();
    let run = BatchRun {
        params: KineticParams {
            feed_policy: FeedPolicy::ThresholdTriggered { scale, rate },
            ..KineticParams::default()
        },
        grid: TimeGrid::linspace(0.0, 60.0, 61).unwrap(),
        ..reference_batch()
    };
    let traj = simulate(&run).unwrap();
    let depleted = traj
        .glucose_depletion_time(run.params.phase_threshold)
        .unwrap();
    for (&t, s) in traj.t.iter().zip(&traj.states) {
        if t < depleted - 1.5 {
            assert!((s.v - 12_000.0).abs() <= tolerances::EXACT, "t = {t}, V = {}", s.v);
        }
    }
    assert!(traj.final_state().unwrap().v > 12_000.0);
}

#[test]
fn exponential_ramp_grows_volume_from_start() {
    let (scale, rate) = FeedPolicy::reference_ramp();
    let run = BatchRun {
        params: KineticParams {
            feed_policy: FeedPolicy::ExponentialRamp { scale, rate },
            ..KineticParams::default()
        },
        grid: TimeGrid::linspace(0.0, 10.0, 11).unwrap(),
        ..reference_batch()
    };
    let v = simulate(&run).unwrap().column(Field::Volume);
    assert!(v.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn invalid_initial_state_rejected_before_integration() {
    let run = BatchRun {
        initial: FermentationState {
            v: 0.0,
            ..FermentationState::reference()
        },
        ..reference_batch()
    };
    assert!(matches!(simulate(&run), Err(Error::InvalidConfig(_))));
}
