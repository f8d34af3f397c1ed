// SPDX-License-Identifier: AGPL-3.0-or-later
//! Biological models: fermentation kinetics and their integration, and
//! dose-response curves.

pub mod dose_response;
pub mod fermentation;
pub mod kinetics;
pub mod ode;
