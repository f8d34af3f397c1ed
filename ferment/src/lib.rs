// SPDX-License-Identifier: AGPL-3.0-or-later

#![forbid(unsafe_code)]
#![deny(clippy::expect_used, clippy::unwrap_used)]

//! cpc-ferment — cephalosporin C fermentation modelling.
//!
//! A seven-state diauxic kinetic model of CPC production by an
//! *Acremonium chrysogenum* culture growing first on glucose, then on
//! sucrose, integrated over a fixed output grid. Alongside it sit the two
//! analyses run on the same strain work: a four-parameter log-logistic
//! dose-response fit of viability assays, and a one-way ANOVA with Tukey
//! HSD comparing quorum-sensing signal levels between strains.
//!
//! # Architecture
//!
//! ```text
//!    ┌──────────────────────────────┐
//!    │ config (JSON) / defaults     │  FermentationConfig → BatchRun
//!    └──────────┬───────────────────┘
//!               │ &BatchRun
//!    ┌──────────▼───────────────────┐
//!    │ bio::fermentation::simulate  │  validation, grid, cancellation
//!    └──────────┬───────────────────┘
//!               │ f(y, t)
//!    ┌──────────▼───────────────────┐      ┌──────────────────────┐
//!    │ bio::ode (Dormand–Prince/RK4)│ ───▶ │ bio::kinetics::rates │
//!    └──────────┬───────────────────┘      └──────────────────────┘
//!               │ Trajectory
//!    ┌──────────▼───────────────────┐
//!    │ ProductSummary / reports     │
//!    └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`bio`] | kinetics, fermentation runs, integrators, dose-response |
//! | [`stats`] | one-way ANOVA, Tukey HSD |
//! | [`special`] | erf, ln Γ, incomplete beta, studentized range |
//! | [`io`] | CSV assay tables |
//! | [`config`] | JSON run configuration |
//! | [`tolerances`] | every numeric threshold |
//! | [`validation`] | harness for the validation binaries |

pub mod bio;
pub mod config;
pub mod error;
pub mod io;
pub mod special;
pub mod stats;
pub mod tolerances;
pub mod validation;
