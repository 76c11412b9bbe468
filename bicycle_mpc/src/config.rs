//! Controller configuration.
//!
//! Every field has a default, taken from the controller's canonical tuning, so a
//! config file only needs to name what it changes:
//!
//! ```toml
//! [horizon]
//! steps = 10
//!
//! [weights]
//! delta = 200.0
//! ```

use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layout::HorizonLayout;
use crate::solver::SqpSettings;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MpcConfig {
    pub horizon: HorizonConfig,
    pub vehicle: VehicleConfig,
    pub reference: ReferenceTargets,
    pub weights: CostWeights,
    pub bounds: BoundLimits,
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HorizonConfig {
    /// Number of predicted states `N`.
    pub steps: usize,

    /// Duration of one step.
    ///
    /// Units: seconds
    pub dt: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self { steps: 15, dt: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VehicleConfig {
    /// Front axle to centre of gravity.
    ///
    /// Units: meters
    pub lf: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self { lf: 2.67 }
    }
}

/// Values the tracking terms of the cost are pulled towards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceTargets {
    pub cte: f64,
    pub epsi: f64,

    /// Cruise speed.
    pub v: f64,
}

impl Default for ReferenceTargets {
    fn default() -> Self {
        Self {
            cte: 0.0,
            epsi: 0.0,
            v: 40.0,
        }
    }
}

/// Weights of the cost terms, each named after the term it scales.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostWeights {
    pub cte: f64,
    pub epsi: f64,
    pub v: f64,
    pub delta: f64,
    pub acc: f64,
    pub delta_rate: f64,
    pub acc_rate: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 1.0,
            epsi: 10.0,
            v: 1.0,
            delta: 500.0,
            acc: 1.0,
            delta_rate: 25.0,
            acc_rate: 1.0,
        }
    }
}

/// Symmetric box limits on the decision variables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundLimits {
    /// Magnitude bound on every state variable.
    ///
    /// Not a physical limit. Large values leave states effectively free but degrade
    /// the conditioning of the solve.
    pub state: f64,

    /// Steering actuator travel.
    ///
    /// Units: radians
    pub steering: f64,

    /// Normalised throttle/brake range.
    pub acceleration: f64,
}

impl Default for BoundLimits {
    fn default() -> Self {
        Self {
            state: 1.0e3,
            // 25 degrees
            steering: 0.436332,
            acceleration: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Wall-clock budget of one solve.
    ///
    /// Units: seconds
    pub time_budget_s: f64,

    pub max_iterations: usize,
    pub feasibility_tolerance: f64,
    pub step_tolerance: f64,
    pub max_qp_iterations: usize,
    pub max_line_search_steps: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let sqp = SqpSettings::default();
        Self {
            time_budget_s: 0.5,
            max_iterations: sqp.max_iterations,
            feasibility_tolerance: sqp.feasibility_tolerance,
            step_tolerance: sqp.step_tolerance,
            max_qp_iterations: sqp.max_qp_iterations,
            max_line_search_steps: sqp.max_line_search_steps,
        }
    }
}

impl SolverConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs_f64(self.time_budget_s)
    }

    pub fn sqp_settings(&self) -> SqpSettings {
        SqpSettings {
            max_iterations: self.max_iterations,
            feasibility_tolerance: self.feasibility_tolerance,
            step_tolerance: self.step_tolerance,
            max_qp_iterations: self.max_qp_iterations,
            max_line_search_steps: self.max_line_search_steps,
        }
    }
}

impl MpcConfig {
    /// Load and validate a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&config_str)
    }

    /// Parse and validate a TOML config string.
    pub fn from_toml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        HorizonLayout::new(self.horizon.steps)?;

        positive("horizon.dt", self.horizon.dt)?;
        positive("vehicle.lf", self.vehicle.lf)?;
        positive("bounds.state", self.bounds.state)?;
        positive("bounds.steering", self.bounds.steering)?;
        positive("bounds.acceleration", self.bounds.acceleration)?;
        positive("solver.feasibility_tolerance", self.solver.feasibility_tolerance)?;
        positive("solver.step_tolerance", self.solver.step_tolerance)?;

        if !(self.solver.time_budget_s.is_finite() && self.solver.time_budget_s >= 0.0) {
            return Err(invalid(
                "solver.time_budget_s",
                format!(
                    "must be a non-negative number of seconds, found {}",
                    self.solver.time_budget_s
                ),
            ));
        }

        for (name, value) in [
            ("solver.max_iterations", self.solver.max_iterations),
            ("solver.max_qp_iterations", self.solver.max_qp_iterations),
            ("solver.max_line_search_steps", self.solver.max_line_search_steps),
        ] {
            if value == 0 {
                return Err(invalid(name, "must be at least 1".to_string()));
            }
        }

        let w = &self.weights;
        for (name, value) in [
            ("weights.cte", w.cte),
            ("weights.epsi", w.epsi),
            ("weights.v", w.v),
            ("weights.delta", w.delta),
            ("weights.acc", w.acc),
            ("weights.delta_rate", w.delta_rate),
            ("weights.acc_rate", w.acc_rate),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(
                    name,
                    format!("must be finite and non-negative, found {value}"),
                ));
            }
        }

        let r = &self.reference;
        for (name, value) in [
            ("reference.cte", r.cte),
            ("reference.epsi", r.epsi),
            ("reference.v", r.v),
        ] {
            if !value.is_finite() {
                return Err(invalid(name, format!("must be finite, found {value}")));
            }
        }

        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("must be finite and positive, found {value}")))
    }
}

fn invalid(name: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidParameter { name, reason }
}
