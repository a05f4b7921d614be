//! Solver Configuration and Global Step Parameters
//!
//! [`SolverConfig`] fixes per-instance knobs (worker task count) at
//! construction; [`StepParams`] carries the per-step globals every
//! constraint sees (timestep, iteration count, error-reduction, cfm,
//! separation bias). Both validate eagerly so the hot loops never have to.

use crate::error::SolverError;

/// Per-instance solver configuration, fixed at construction.
#[derive(Clone, Copy, Debug)]
pub struct SolverConfig {
    /// Worker task count used for batch sizing and parallel dispatch.
    /// Typically the hardware parallelism; 1 forces sequential solving.
    pub num_tasks: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        #[cfg(feature = "parallel")]
        let num_tasks = rayon::current_num_threads().max(1);
        #[cfg(not(feature = "parallel"))]
        let num_tasks = 1;
        Self { num_tasks }
    }
}

impl SolverConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), SolverError> {
        if self.num_tasks == 0 {
            return Err(SolverError::InvalidConfiguration {
                reason: "num_tasks must be at least 1",
            });
        }
        Ok(())
    }
}

/// Global step parameters consumed by constraint setup and the solve loop.
#[derive(Clone, Copy, Debug)]
pub struct StepParams {
    /// Simulation timestep in seconds.
    pub time_step: f32,
    /// Gauss-Seidel sweep count. The driver runs `iterations + 1` passes;
    /// the extra zeroth pass applies already-accumulated impulses as a
    /// warm-start seed.
    pub iterations: u32,
    /// Error-reduction parameter handed to joint rows.
    pub erp: f32,
    /// Global constraint-force mixing applied to joint rows.
    pub cfm: f32,
    /// Fraction of contact penetration corrected per step (Baumgarte bias).
    pub separate_bias: f32,
}

impl Default for StepParams {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            iterations: 4,
            erp: 0.2,
            cfm: 0.0,
            separate_bias: 0.1,
        }
    }
}

impl StepParams {
    /// Validate the step parameters.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.time_step > 0.0) {
            return Err(SolverError::InvalidConfiguration {
                reason: "time_step must be positive",
            });
        }
        if !(0.0..=1.0).contains(&self.erp) {
            return Err(SolverError::InvalidConfiguration {
                reason: "erp must be in [0, 1]",
            });
        }
        if !(self.cfm >= 0.0) {
            return Err(SolverError::InvalidConfiguration {
                reason: "cfm must be non-negative",
            });
        }
        if !(self.separate_bias >= 0.0) {
            return Err(SolverError::InvalidConfiguration {
                reason: "separate_bias must be non-negative",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SolverConfig::default().validate().is_ok());
        assert!(StepParams::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_time_step() {
        let params = StepParams {
            time_step: 0.0,
            ..StepParams::default()
        };
        assert!(params.validate().is_err());

        let params = StepParams {
            time_step: f32::NAN,
            ..StepParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_tasks() {
        let config = SolverConfig { num_tasks: 0 };
        assert!(config.validate().is_err());
    }
}
