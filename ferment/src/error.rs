// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for fermentation simulation, fitting, and table I/O.
//!
//! All model, solver, and parser errors use [`Error`], with variants for
//! each failure mode. Negative concentrations are only an error when the
//! caller opts into strict mode.

use std::fmt;
use std::path::PathBuf;

/// Errors produced by the fermentation model, the solvers, and parsers.
#[derive(Debug)]
pub enum Error {
    /// File I/O error with path context.
    Io {
        /// Path that caused the error.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Malformed tabular input (CSV header, row shape, cell content).
    Parse(String),
    /// JSON (de)serialization failure for parameter files.
    Json(String),
    /// Degenerate run configuration, rejected before integration starts.
    InvalidConfig(String),
    /// Invalid input to a numerical routine (dimensions, ranges).
    InvalidInput(String),
    /// Solver or fit could not satisfy its tolerances.
    NumericalFailure(String),
    /// Strict mode: a state component went negative.
    NegativeState {
        /// Time of the accepted step that produced the value.
        t: f64,
        /// State index (see `bio::kinetics::Field`).
        index: usize,
        /// Offending value.
        value: f64,
    },
    /// Cooperative cancellation observed between grid points.
    Cancelled {
        /// Last grid time that was completed.
        t: f64,
    },
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Parse(msg) => write!(f, "table parse error: {msg}"),
            Self::Json(msg) => write!(f, "config JSON error: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::NumericalFailure(msg) => write!(f, "numerical failure: {msg}"),
            Self::NegativeState { t, index, value } => write!(
                f,
                "negative state: component {index} = {value:e} at t = {t}"
            ),
            Self::Cancelled { t } => write!(f, "cancelled after t = {t}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(_)
            | Self::Json(_)
            | Self::InvalidConfig(_)
            | Self::InvalidInput(_)
            | Self::NumericalFailure(_)
            | Self::NegativeState { .. }
            | Self::Cancelled { .. } => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
