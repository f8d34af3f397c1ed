// SPDX-License-Identifier: AGPL-3.0-or-later
//! Readers for the assay tables behind the dose-response fit and the
//! between-strain comparison.

pub mod table;
