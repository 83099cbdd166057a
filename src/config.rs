use crate::error::{MaxentError, MaxentResult};
use serde::{Deserialize, Serialize};

/// Tuning parameters of a maximum entropy reconstruction.
///
/// Missing fields in a serialized configuration fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxentConfig {
    pub max_iterations: usize,
    pub cycles: usize,
    pub default_level: f64,
    pub chi_target_factor: f64,
    pub chi_tolerance: f64,
    pub test_tolerance: f64,
    pub max_step_fraction: f64,
    pub bisection_tolerance: f64,
    pub max_bisections: usize,
    pub floor_fraction: f64,
    pub fix_total: bool,
    pub refit_phases: bool,
    pub max_singular_steps: usize,
}

impl Default for MaxentConfig {
    fn default() -> Self {
        MaxentConfig {
            max_iterations: 100,
            cycles: 1,
            default_level: 0.1,
            chi_target_factor: 1.0,
            chi_tolerance: 0.01,
            test_tolerance: 0.02,
            max_step_fraction: 0.1,
            bisection_tolerance: 1e-3,
            max_bisections: 100,
            floor_fraction: 1e-3,
            fix_total: false,
            refit_phases: false,
            max_singular_steps: 5,
        }
    }
}

impl MaxentConfig {
    /// Checks that every parameter is usable before a run starts.
    pub fn validate(&self) -> MaxentResult<()> {
        let counts = [
            ("max_iterations", self.max_iterations),
            ("cycles", self.cycles),
            ("max_bisections", self.max_bisections),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(MaxentError::InvalidConfig(format!(
                    "{name} must be at least 1"
                )));
            }
        }

        let positive = [
            ("default_level", self.default_level),
            ("chi_target_factor", self.chi_target_factor),
            ("chi_tolerance", self.chi_tolerance),
            ("test_tolerance", self.test_tolerance),
            ("max_step_fraction", self.max_step_fraction),
            ("bisection_tolerance", self.bisection_tolerance),
            ("floor_fraction", self.floor_fraction),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(MaxentError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }

        if self.floor_fraction >= 1.0 {
            return Err(MaxentError::InvalidConfig(format!(
                "floor_fraction must be below 1, got {}",
                self.floor_fraction
            )));
        }
        Ok(())
    }

    /// Smallest value an image channel may take.
    pub fn floor(&self) -> f64 {
        self.floor_fraction * self.default_level
    }
}
