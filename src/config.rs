//! Calculator settings
//!
//! Loaded from an optional TOML file; every field has a default.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LcaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Relative change in the amount required from a node below which
    /// iteration through that node stops.
    pub tolerance: f64,
    /// Recursion depth treated as divergence.
    pub max_nest_depth: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            tolerance: 1.0e-5,
            max_nest_depth: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Analysis year used to pick or interpolate year series.
    pub year: f64,
    /// Use lower heating values (true) or higher heating values (false).
    pub use_lhv: bool,
    /// Years subtracted from the analysis year for vehicle data.
    pub vehicle_lag: f64,
    pub solver: SolverConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            year: 2020.0,
            use_lhv: true,
            vehicle_lag: 0.0,
            solver: SolverConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings> {
        let text = fs::read_to_string(path)?;
        Settings::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Settings> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let tol = self.solver.tolerance;
        if !tol.is_finite() || tol <= 0.0 {
            return Err(LcaError::InvalidConfig(format!(
                "solver tolerance must be positive and finite, got {tol}"
            )));
        }
        if self.solver.max_nest_depth == 0 {
            return Err(LcaError::InvalidConfig(
                "solver max_nest_depth must be at least 1".to_string(),
            ));
        }
        if !self.year.is_finite() || !self.vehicle_lag.is_finite() {
            return Err(LcaError::InvalidConfig(
                "year and vehicle_lag must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.year, 2020.0);
        assert!(s.use_lhv);
        assert_eq!(s.solver.tolerance, 1e-5);
        assert_eq!(s.solver.max_nest_depth, 1000);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let s = Settings::from_toml("year = 2015\n[solver]\ntolerance = 1e-7\n").unwrap();
        assert_eq!(s.year, 2015.0);
        assert_eq!(s.solver.tolerance, 1e-7);
        assert_eq!(s.solver.max_nest_depth, 1000);
        assert!(s.use_lhv);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Settings::from_toml("[solver]\ntolerance = -1.0\n"),
            Err(LcaError::InvalidConfig(_))
        ));
        assert!(matches!(
            Settings::from_toml("[solver]\nmax_nest_depth = 0\n"),
            Err(LcaError::InvalidConfig(_))
        ));
        assert!(matches!(
            Settings::from_toml("year = \"soon\"\n"),
            Err(LcaError::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "use_lhv = false\n").unwrap();
        let s = Settings::load(&path).unwrap();
        assert!(!s.use_lhv);
    }
}
