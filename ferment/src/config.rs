// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON run configuration.
//!
//! A [`FermentationConfig`] file holds everything a [`BatchRun`] needs.
//! Every section is optional; omitted sections and fields take the
//! reference-batch values, so `{}` is the reference run and
//!
//! ```json
//! { "params": { "feed_policy": { "policy": "threshold_triggered", "scale": 600.0, "rate": 0.021 } } }
//! ```
//!
//! is the reference run with the exponential feed switched on at glucose
//! depletion.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bio::fermentation::{BatchRun, TimeGrid};
use crate::bio::kinetics::{FermentationState, KineticParams};
use crate::bio::ode::Method;
use crate::error::{Error, Result};

/// Evenly spaced output grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    /// First output time (h).
    pub t_start: f64,
    /// Last output time (h).
    pub t_end: f64,
    /// Number of output times, both ends included.
    pub points: usize,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 100.0,
            points: 100,
        }
    }
}

impl GridSpec {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] per [`TimeGrid::linspace`].
    pub fn to_time_grid(&self) -> Result<TimeGrid> {
        TimeGrid::linspace(self.t_start, self.t_end, self.points)
    }
}

/// Serializable description of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FermentationConfig {
    /// Kinetic constants and feed.
    pub params: KineticParams,
    /// Inoculum.
    pub initial: FermentationState,
    /// Output grid.
    pub grid: GridSpec,
    /// Integration method.
    pub solver: Method,
    /// Fail on any negative state component.
    pub strict_non_negative: bool,
}

impl FermentationConfig {
    /// Read and validate a configuration file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, [`Error::Json`] if it is
    /// not a valid configuration document, [`Error::InvalidConfig`] if the
    /// values describe a degenerate run.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        log::info!("loaded fermentation config from {}", path.display());
        Ok(config)
    }

    /// [`Self::load`], falling back to the reference run on any failure.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                log::info!("{} not found, using reference batch", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("{}: {e}; using reference batch", path.display());
                Self::default()
            }
        }
    }

    /// Write as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] if a value cannot be represented in JSON (non-finite
    /// numbers), [`Error::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the run could not be integrated.
    pub fn validate(&self) -> Result<()> {
        self.to_batch_run().map(|_| ())
    }

    /// Build the validated run this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a degenerate grid, parameter
    /// set, initial state, or solver setting.
    pub fn to_batch_run(&self) -> Result<BatchRun> {
        let run = BatchRun {
            params: self.params.clone(),
            initial: self.initial,
            grid: self.grid.to_time_grid()?,
            method: self.solver,
            strict_non_negative: self.strict_non_negative,
        };
        run.validate()?;
        Ok(run)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bio::kinetics::FeedPolicy;
    use crate::bio::ode::OdeOptions;

    #[test]
    fn empty_document_is_reference_run() {
        let config: FermentationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FermentationConfig::default());
        let run = config.to_batch_run().unwrap();
        assert_eq!(run.grid, TimeGrid::reference());
        assert_eq!(run.initial, FermentationState::reference());
        assert_eq!(run.params, KineticParams::default());
        assert!(!run.strict_non_negative);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let json = r#"{
            "params": { "gamma": 0.02, "feed_policy": { "policy": "threshold_triggered", "scale": 600.0, "rate": 0.021 } },
            "initial": { "v": 10000.0 },
            "grid": { "points": 11 },
            "solver": { "method": "rk4", "dt": 0.05 }
        }"#;
        let config: FermentationConfig = serde_json::from_str(json).unwrap();
        assert!((config.params.gamma - 0.02).abs() < f64::EPSILON);
        assert!((config.params.b - KineticParams::default().b).abs() < f64::EPSILON);
        assert_eq!(
            config.params.feed_policy,
            FeedPolicy::ThresholdTriggered {
                scale: 600.0,
                rate: 0.021
            }
        );
        assert!((config.initial.v - 10_000.0).abs() < f64::EPSILON);
        assert!((config.initial.s1 - 40.0).abs() < f64::EPSILON);
        assert_eq!(config.grid.points, 11);
        assert!((config.grid.t_end - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.solver, Method::Rk4 { dt: 0.05 });
        assert_eq!(config.to_batch_run().unwrap().grid.len(), 11);
    }

    #[test]
    fn dormand_prince_options_in_json() {
        let json = r#"{ "solver": { "method": "dormand_prince", "rtol": 1e-10 } }"#;
        let config: FermentationConfig = serde_json::from_str(json).unwrap();
        let Method::DormandPrince(opts) = config.solver else {
            panic!("expected Dormand–Prince, got {:?}", config.solver);
        };
        assert!((opts.rtol - 1e-10).abs() < f64::EPSILON);
        assert!((opts.atol - OdeOptions::default().atol).abs() < f64::EPSILON);
    }

    #[test]
    fn degenerate_values_are_invalid_config() {
        let cases = [
            r#"{ "initial": { "v": 0.0 } }"#,
            r#"{ "params": { "y_s2": -0.4 } }"#,
            r#"{ "grid": { "points": 0 } }"#,
            r#"{ "grid": { "t_start": 5.0, "t_end": 1.0 } }"#,
            r#"{ "solver": { "method": "rk4", "dt": -1.0 } }"#,
            r#"{ "params": { "feed_policy": { "policy": "constant", "flow": -3.0 } } }"#,
        ];
        for json in cases {
            let config: FermentationConfig = serde_json::from_str(json).unwrap();
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn malformed_json_is_json_error() {
        let parsed: std::result::Result<FermentationConfig, _> =
            serde_json::from_str(r#"{ "solver": { "method": "euler" } }"#);
        let err: Error = parsed.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn missing_file_falls_back() {
        let config = FermentationConfig::load_or_default(Path::new("/nonexistent/run.json"));
        assert_eq!(config, FermentationConfig::default());
        assert!(matches!(
            FermentationConfig::load(Path::new("/nonexistent/run.json")),
            Err(Error::Io { .. })
        ));
    }
}
