use glam::DVec3;
use rayon::prelude::*;
use yaml_rust::Yaml;

use crate::{
    cell::ComputationalCell,
    errors::{ConfigError, Diagnostics},
    gas_law::EquationOfState,
    mesh::Tessellation,
    HydroError,
};

/// Chooses the step of the next cycle.
pub trait TimeStepFunction<M: Tessellation>: Send + Sync {
    fn compute(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        eos: &dyn EquationOfState,
        vertex_velocities: &[DVec3],
        time: f64,
    ) -> Result<f64, HydroError>;
}

/// Courant condition: `cfl * min(width / (c + |v - w|))`, capped at `dt_max`.
///
/// When no cell carries a signal (everything at rest relative to the mesh and cold), the
/// signal speed is taken to be `quiescent_speed` instead.
pub struct SimpleCfl {
    cfl: f64,
    dt_max: f64,
    quiescent_speed: f64,
}

impl SimpleCfl {
    pub fn new(cfl: f64) -> Self {
        Self {
            cfl,
            dt_max: f64::INFINITY,
            quiescent_speed: 1.,
        }
    }

    pub fn with_dt_max(mut self, dt_max: f64) -> Self {
        self.dt_max = dt_max;
        self
    }

    pub fn with_quiescent_speed(mut self, quiescent_speed: f64) -> Self {
        self.quiescent_speed = quiescent_speed;
        self
    }

    pub fn init(cfg: &Yaml) -> Result<Self, ConfigError> {
        let cfl = cfg["cfl_criterion"]
            .as_f64()
            .ok_or(ConfigError::MissingParameter("time_integration:cfl_criterion".to_string()))?;
        if !(cfl > 0.) {
            return Err(ConfigError::InvalidValue {
                name: "time_integration:cfl_criterion".to_string(),
                value: cfg["cfl_criterion"].clone(),
            });
        }
        let dt_max = cfg["dt_max"].as_f64().unwrap_or(f64::INFINITY);
        let quiescent_speed = cfg["quiescent_speed"].as_f64().unwrap_or(1.);
        if !(quiescent_speed > 0.) || !quiescent_speed.is_finite() {
            return Err(ConfigError::InvalidValue {
                name: "time_integration:quiescent_speed".to_string(),
                value: cfg["quiescent_speed"].clone(),
            });
        }
        Ok(Self::new(cfl)
            .with_dt_max(dt_max)
            .with_quiescent_speed(quiescent_speed))
    }

    fn local_bound(
        mesh: &impl Tessellation,
        cell: &ComputationalCell,
        index: usize,
        eos: &dyn EquationOfState,
        vertex_velocity: DVec3,
    ) -> Result<f64, HydroError> {
        let width = mesh.cell_width(index);
        let degenerate = |reason| {
            HydroError::degenerate_timestep(reason)
                .with_entry("Cell index", index as f64)
                .with_entry("Cell width", width)
                .with_entry("Cell density", cell.density())
                .with_entry("Cell pressure", cell.pressure())
        };
        if !(width >= 0.) {
            return Err(degenerate("invalid cell width"));
        }
        if !(cell.density() >= 0. && cell.pressure() >= 0.) || !cell.velocity().is_finite() {
            return Err(degenerate("invalid cell state"));
        }
        let sound_speed = if cell.density() > 0. {
            eos.dp2c(cell.density(), cell.pressure(), &cell.tracers)
                .map_err(|err| err.with_entry("Cell index", index as f64))?
        } else {
            0.
        };
        let signal_speed = sound_speed + (cell.velocity() - vertex_velocity).length();
        if signal_speed.is_nan() {
            return Err(degenerate("invalid signal speed"));
        }
        Ok(if signal_speed > 0. {
            width / signal_speed
        } else {
            f64::INFINITY
        })
    }
}

impl<M: Tessellation> TimeStepFunction<M> for SimpleCfl {
    fn compute(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        eos: &dyn EquationOfState,
        vertex_velocities: &[DVec3],
        _time: f64,
    ) -> Result<f64, HydroError> {
        let min_bound = cells
            .par_iter()
            .enumerate()
            .map(|(i, cell)| Self::local_bound(mesh, cell, i, eos, vertex_velocities[i]))
            .try_reduce(|| f64::INFINITY, |a, b| Ok(a.min(b)))?;
        let min_bound = if min_bound.is_finite() {
            min_bound
        } else {
            let min_width = (0..cells.len())
                .map(|i| mesh.cell_width(i))
                .fold(f64::INFINITY, f64::min);
            min_width / self.quiescent_speed
        };

        let dt = (self.cfl * min_bound).min(self.dt_max);
        if !dt.is_finite() {
            return Err(HydroError::DegenerateTimeStep {
                reason: "no finite stability bound",
                context: Diagnostics::new().entry("Number of cells", cells.len() as f64),
            });
        }
        if dt <= 0. {
            return Err(HydroError::DegenerateTimeStep {
                reason: "non positive time step",
                context: Diagnostics::new().entry("Time step", dt),
            });
        }
        Ok(dt)
    }
}

/// Always the same step.
pub struct FixedTimeStep(pub f64);

impl<M: Tessellation> TimeStepFunction<M> for FixedTimeStep {
    fn compute(
        &self,
        _mesh: &M,
        _cells: &[ComputationalCell],
        _eos: &dyn EquationOfState,
        _vertex_velocities: &[DVec3],
        _time: f64,
    ) -> Result<f64, HydroError> {
        if self.0.is_finite() && self.0 > 0. {
            Ok(self.0)
        } else {
            Err(HydroError::degenerate_timestep("non positive time step").with_entry("Time step", self.0))
        }
    }
}
