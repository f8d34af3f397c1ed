// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diauxic kinetics of a cephalosporin C (CPC) fermentation.
//!
//! Biomass grows on glucose (S1) until it is exhausted, then on sucrose
//! (S2). Hyphae differentiate into arthrospores at a rate repressed by
//! residual glucose; arthrospores carry the enzyme activity that forms
//! the product. Sucrose maintenance consumption is always active but is
//! strongly repressed while glucose is present.
//!
//! The evaluator [`rates`] is a pure function of time, state, and an
//! explicit [`KineticParams`]; the diauxic [`Phase`] is recomputed from
//! S1 on every call and never cached.
//!
//! # State variables
//!
//! | Index | Variable | Description |
//! |-------|----------|-------------|
//! | 0 | `X_H` | Hyphal biomass (g/L) |
//! | 1 | `X_T` | Arthrospore biomass (g/L) |
//! | 2 | `S1` | Glucose (g/L) |
//! | 3 | `S2` | Sucrose (g/L) |
//! | 4 | `E` | Enzyme (mg/g·h) |
//! | 5 | `P` | Product, CPC (mg/L) |
//! | 6 | `V` | Working volume (L) |
//!
//! Concentrations are not clamped: a negative excursion is reproduced as
//! computed. Strict runs reject it at the integrator level instead.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tolerances;

/// Number of state variables.
pub const STATE_DIM: usize = 7;

/// Named index into the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Hyphal biomass `X_H`.
    HyphalBiomass,
    /// Arthrospore biomass `X_T`.
    Arthrospores,
    /// Glucose `S1`.
    Glucose,
    /// Sucrose `S2`.
    Sucrose,
    /// Enzyme `E`.
    Enzyme,
    /// Product `P`.
    Product,
    /// Volume `V`.
    Volume,
}

impl Field {
    /// All fields in state-vector order.
    pub const ALL: [Self; STATE_DIM] = [
        Self::HyphalBiomass,
        Self::Arthrospores,
        Self::Glucose,
        Self::Sucrose,
        Self::Enzyme,
        Self::Product,
        Self::Volume,
    ];

    /// Position in the state vector.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::HyphalBiomass => 0,
            Self::Arthrospores => 1,
            Self::Glucose => 2,
            Self::Sucrose => 3,
            Self::Enzyme => 4,
            Self::Product => 5,
            Self::Volume => 6,
        }
    }

    /// Short symbol used in reports.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::HyphalBiomass => "X_H",
            Self::Arthrospores => "X_T",
            Self::Glucose => "S1",
            Self::Sucrose => "S2",
            Self::Enzyme => "E",
            Self::Product => "P",
            Self::Volume => "V",
        }
    }

    /// Unit of the field.
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Self::HyphalBiomass | Self::Arthrospores | Self::Glucose | Self::Sucrose => "g/L",
            Self::Enzyme => "mg/g·h",
            Self::Product => "mg/L",
            Self::Volume => "L",
        }
    }
}

/// Reactor state, or its time derivative (same shape, per-hour units).
///
/// Missing fields in a deserialized state take their reference values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FermentationState {
    /// Hyphal biomass (g/L).
    pub x_h: f64,
    /// Arthrospore biomass (g/L).
    pub x_t: f64,
    /// Glucose (g/L).
    pub s1: f64,
    /// Sucrose (g/L).
    pub s2: f64,
    /// Enzyme (mg/g·h).
    pub e: f64,
    /// Product (mg/L).
    pub p: f64,
    /// Working volume (L).
    pub v: f64,
}

impl Default for FermentationState {
    fn default() -> Self {
        Self::reference()
    }
}

impl FermentationState {
    /// Inoculum of the reference batch: 5 g/L hyphae, 40 g/L glucose,
    /// 5 g/L sucrose in 12 000 L.
    #[must_use]
    pub const fn reference() -> Self {
        Self {
            x_h: 5.0,
            x_t: 0.0,
            s1: 40.0,
            s2: 5.0,
            e: 0.0,
            p: 0.0,
            v: 12_000.0,
        }
    }

    /// State-vector layout.
    #[must_use]
    pub const fn to_array(&self) -> [f64; STATE_DIM] {
        [self.x_h, self.x_t, self.s1, self.s2, self.e, self.p, self.v]
    }

    /// Inverse of [`Self::to_array`].
    #[must_use]
    pub const fn from_array(a: [f64; STATE_DIM]) -> Self {
        Self {
            x_h: a[0],
            x_t: a[1],
            s1: a[2],
            s2: a[3],
            e: a[4],
            p: a[5],
            v: a[6],
        }
    }

    /// Build from a slice of exactly [`STATE_DIM`] values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] on a length mismatch.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let a: [f64; STATE_DIM] = values.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "state needs {STATE_DIM} components, got {}",
                values.len()
            ))
        })?;
        Ok(Self::from_array(a))
    }

    /// Value of one field.
    #[must_use]
    pub const fn get(&self, field: Field) -> f64 {
        self.to_array()[field.index()]
    }

    /// Total biomass `X_H + X_T`.
    #[must_use]
    pub fn total_biomass(&self) -> f64 {
        self.x_h + self.x_t
    }

    /// Check the invariants a run must start from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a non-finite component or a
    /// non-positive volume.
    pub fn validate(&self) -> Result<()> {
        for field in Field::ALL {
            let value = self.get(field);
            if !value.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "initial {} is not finite ({value})",
                    field.symbol()
                )));
            }
        }
        if self.v <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "volume must be > 0, got {}",
                self.v
            )));
        }
        Ok(())
    }
}

/// Diauxic regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Glucose above the threshold: growth on glucose, sucrose uptake off.
    Glucose,
    /// Glucose at or below the threshold: growth on sucrose.
    Sucrose,
}

impl Phase {
    /// Regime for a glucose level. The threshold is inclusive.
    #[must_use]
    pub fn of(s1: f64, threshold: f64) -> Self {
        if s1 <= threshold {
            Self::Sucrose
        } else {
            Self::Glucose
        }
    }

    /// Sucrose-uptake switch φ: 1 after the shift, 0 before.
    #[must_use]
    pub const fn phi(self) -> f64 {
        match self {
            Self::Glucose => 0.0,
            Self::Sucrose => 1.0,
        }
    }
}

/// Inlet concentrations of the feed stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedComposition {
    /// Glucose in the feed (g/L).
    pub s1_in: f64,
    /// Sucrose in the feed (g/L).
    pub s2_in: f64,
    /// Hyphae in the feed (g/L).
    pub x_h_in: f64,
    /// Arthrospores in the feed (g/L).
    pub x_t_in: f64,
}

impl Default for FeedComposition {
    fn default() -> Self {
        Self {
            s1_in: 0.0,
            s2_in: 30.0,
            x_h_in: 0.0,
            x_t_in: 0.0,
        }
    }
}

/// Feed-flow law `Q(t, S1)` in L/h.
///
/// The reference batch runs with zero flow. The exponential law
/// `Q = scale · rate · exp(rate · t)` is available either from t = 0 or
/// gated on the glucose shift; neither is enabled unless selected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FeedPolicy {
    /// Fixed flow (L/h); zero for a batch.
    Constant {
        /// Flow rate (L/h).
        flow: f64,
    },
    /// Exponential ramp active for the whole run.
    ExponentialRamp {
        /// Volume scale (L).
        scale: f64,
        /// Exponential rate (1/h).
        rate: f64,
    },
    /// Exponential ramp that only flows once glucose is depleted.
    ThresholdTriggered {
        /// Volume scale (L).
        scale: f64,
        /// Exponential rate (1/h).
        rate: f64,
    },
}

impl Default for FeedPolicy {
    fn default() -> Self {
        Self::Constant { flow: 0.0 }
    }
}

impl FeedPolicy {
    /// Ramp parameters the reference batch kept as its fed-batch candidate.
    #[must_use]
    pub const fn reference_ramp() -> (f64, f64) {
        (600.0, 0.021)
    }

    /// Flow at time `t` in the given regime.
    #[must_use]
    pub fn flow(&self, t: f64, phase: Phase) -> f64 {
        match *self {
            Self::Constant { flow } => flow,
            Self::ExponentialRamp { scale, rate } => scale * rate * (rate * t).exp(),
            Self::ThresholdTriggered { scale, rate } => match phase {
                Phase::Sucrose => scale * rate * (rate * t).exp(),
                Phase::Glucose => 0.0,
            },
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for non-finite or negative flow
    /// parameters.
    pub fn validate(&self) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        let valid = match *self {
            Self::Constant { flow } => ok(flow),
            Self::ExponentialRamp { scale, rate } | Self::ThresholdTriggered { scale, rate } => {
                ok(scale) && rate.is_finite()
            }
        };
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!("invalid feed policy {self:?}")))
        }
    }
}

/// Kinetic constants of the CPC model.
///
/// Defaults are the fitted values of the reference batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KineticParams {
    /// Biomass yield on glucose (g/g).
    pub y_s1: f64,
    /// Glucose saturation constant (g/L).
    pub k_s1: f64,
    /// Glucose repression of differentiation and hyphal death (L/g).
    pub i1: f64,
    /// Maximum specific growth rate on glucose (1/h).
    pub mu_max_s1: f64,
    /// Sucrose maintenance coefficient.
    pub m_s2: f64,
    /// Biomass yield on sucrose (g/g).
    pub y_s2: f64,
    /// Sucrose saturation constant (g/L).
    pub k_s2: f64,
    /// Glucose repression of sucrose maintenance uptake.
    pub i2: f64,
    /// Maximum specific growth rate on sucrose (1/h).
    pub mu_max_s2: f64,
    /// Maximum hyphal death rate (1/h).
    pub d_h_max: f64,
    /// Maximum differentiation rate, hyphae → arthrospores (1/h).
    pub mu_t_max: f64,
    /// Arthrospore death rate (1/h).
    pub d_t: f64,
    /// Enzyme formed per unit differentiation flux.
    pub a: f64,
    /// Enzyme degradation rate (1/h).
    pub b: f64,
    /// Product degradation rate (1/h).
    pub gamma: f64,
    /// Glucose level (g/L) at or below which the sucrose phase is active.
    pub phase_threshold: f64,
    /// Feed stream composition.
    pub feed: FeedComposition,
    /// Feed-flow law.
    pub feed_policy: FeedPolicy,
}

impl Default for KineticParams {
    fn default() -> Self {
        Self {
            y_s1: 0.461_88,
            k_s1: 0.1,
            i1: 20.0,
            mu_max_s1: 0.042,
            m_s2: 0.022_67,
            y_s2: 0.4,
            k_s2: 10.199,
            i2: 300.0,
            mu_max_s2: 0.021,
            d_h_max: 0.006_68,
            mu_t_max: 0.045_26,
            d_t: 0.004_41,
            a: 9.0,
            b: 2.187_87,
            gamma: 0.010_76,
            phase_threshold: tolerances::GLUCOSE_DEPLETION_G_PER_L,
            feed: FeedComposition::default(),
            feed_policy: FeedPolicy::default(),
        }
    }
}

impl KineticParams {
    /// Diauxic regime at glucose level `s1`.
    #[must_use]
    pub fn phase(&self, s1: f64) -> Phase {
        Phase::of(s1, self.phase_threshold)
    }

    /// Sucrose-uptake switch φ at glucose level `s1`.
    #[must_use]
    pub fn phi(&self, s1: f64) -> f64 {
        self.phase(s1).phi()
    }

    /// Substrate whose specific rate feeds hyphal growth at glucose level `s1`.
    #[must_use]
    pub fn hyphal_growth_source(&self, s1: f64) -> Field {
        match self.phase(s1) {
            Phase::Glucose => Field::Glucose,
            Phase::Sucrose => Field::Sucrose,
        }
    }

    /// Reject parameter sets the evaluator cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any constant is non-finite, a
    /// yield or saturation constant is not positive, a rate or repression
    /// constant is negative, or the feed is invalid.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("y_s1", self.y_s1),
            ("y_s2", self.y_s2),
            ("k_s1", self.k_s1),
            ("k_s2", self.k_s2),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig(format!("{name} must be > 0, got {value}")));
            }
        }
        let non_negative = [
            ("i1", self.i1),
            ("mu_max_s1", self.mu_max_s1),
            ("m_s2", self.m_s2),
            ("i2", self.i2),
            ("mu_max_s2", self.mu_max_s2),
            ("d_h_max", self.d_h_max),
            ("mu_t_max", self.mu_t_max),
            ("d_t", self.d_t),
            ("a", self.a),
            ("b", self.b),
            ("gamma", self.gamma),
            ("feed.s1_in", self.feed.s1_in),
            ("feed.s2_in", self.feed.s2_in),
            ("feed.x_h_in", self.feed.x_h_in),
            ("feed.x_t_in", self.feed.x_t_in),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidConfig(format!("{name} must be >= 0, got {value}")));
            }
        }
        if !self.phase_threshold.is_finite() {
            return Err(Error::InvalidConfig("phase_threshold must be finite".into()));
        }
        self.feed_policy.validate()
    }
}

/// Instantaneous specific rates behind one derivative evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecificRates {
    /// Diauxic regime the rates were computed in.
    pub phase: Phase,
    /// Sucrose-uptake switch φ.
    pub phi: f64,
    /// Specific growth rate on glucose (1/h).
    pub mu_s1: f64,
    /// Specific growth rate on sucrose, already gated by φ (1/h).
    pub mu_s2: f64,
    /// Specific rate feeding hyphal growth (1/h).
    pub mu_h: f64,
    /// Substrate selected for `mu_h`.
    pub growth_source: Field,
    /// Differentiation rate (1/h).
    pub mu_t: f64,
    /// Hyphal death rate (1/h).
    pub d_h: f64,
    /// Sucrose maintenance term.
    pub maintenance_s2: f64,
    /// Feed flow Q (L/h).
    pub flow: f64,
    /// Dilution rate Q/V (1/h).
    pub dilution: f64,
}

/// Specific rates at `(t, state)`.
#[must_use]
#[allow(clippy::suboptimal_flops)] // unfused to match the baseline operation order
pub fn specific_rates(t: f64, state: &FermentationState, p: &KineticParams) -> SpecificRates {
    let phase = p.phase(state.s1);
    let phi = phase.phi();

    let flow = p.feed_policy.flow(t, phase);
    let dilution = flow / state.v;

    let mu_s1 = p.mu_max_s1 * state.s1 / (p.k_s1 + state.s1);
    let mu_s2 = phi * (p.mu_max_s2 * state.s2 / (p.k_s2 + state.s2));
    let maintenance_s2 = p.m_s2 / (p.k_s2 + state.s2 + p.i2 * state.s1);

    let repression = 1.0 + p.i1 * state.s1;
    let (mu_h, growth_source) = match phase {
        Phase::Glucose => (mu_s1, Field::Glucose),
        Phase::Sucrose => (mu_s2, Field::Sucrose),
    };

    SpecificRates {
        phase,
        phi,
        mu_s1,
        mu_s2,
        mu_h,
        growth_source,
        mu_t: p.mu_t_max / repression,
        d_h: p.d_h_max / repression,
        maintenance_s2,
        flow,
        dilution,
    }
}

/// Right-hand side `dy/dt` of the CPC model.
///
/// `t` only matters for time-dependent feed policies.
#[must_use]
#[allow(clippy::many_single_char_names, clippy::suboptimal_flops)]
pub fn rates(t: f64, state: &FermentationState, p: &KineticParams) -> FermentationState {
    let r = specific_rates(t, state, p);
    let FermentationState {
        x_h,
        x_t,
        s1,
        s2,
        e,
        p: product,
        ..
    } = *state;
    let x = x_h + x_t;
    let d = r.dilution;

    FermentationState {
        x_h: (r.mu_h * x - r.mu_t * x_h - r.d_h * x_h) + (p.feed.x_h_in - x_h) * d,
        x_t: (r.mu_t * x_h - p.d_t * x_t) + (p.feed.x_t_in - x_t) * d,
        s1: -(r.mu_s1 / p.y_s1) * x + (p.feed.s1_in - s1) * d,
        s2: -((r.mu_s2 / p.y_s2) + r.maintenance_s2) * x + (p.feed.s2_in - s2) * d,
        e: (p.a * r.mu_t * x_h - p.b * e) - e * d,
        p: (e * x_t - p.gamma * product) - product * d,
        v: r.flow,
    }
}

/// [`rates`] in the slice form the generic integrators take.
#[must_use]
pub fn rhs(params: &KineticParams) -> impl Fn(&[f64], f64) -> Vec<f64> + '_ {
    move |y, t| {
        let state = FermentationState::from_array([y[0], y[1], y[2], y[3], y[4], y[5], y[6]]);
        rates(t, &state, params).to_array().to_vec()
    }
}
