use glam::DVec3;
use rayon::prelude::*;
use yaml_rust::Yaml;

use crate::{
    cell::{CellPredicate, ComputationalCell},
    errors::{ConfigError, Diagnostics},
    mesh::Tessellation,
    HydroError,
};

/// Computes the velocity of every mesh vertex.
pub trait VertexMotion<M: Tessellation>: Send + Sync {
    fn predict(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        time: f64,
    ) -> Result<Vec<DVec3>, HydroError>;

    /// Correct predicted velocities once the time step is known.
    fn regularize(
        &self,
        _mesh: &M,
        _cells: &[ComputationalCell],
        _time: f64,
        _dt: f64,
        velocities: Vec<DVec3>,
    ) -> Result<Vec<DVec3>, HydroError> {
        Ok(velocities)
    }
}

/// Vertices stay in place.
pub struct Eulerian;

impl<M: Tessellation> VertexMotion<M> for Eulerian {
    fn predict(
        &self,
        mesh: &M,
        _cells: &[ComputationalCell],
        _time: f64,
    ) -> Result<Vec<DVec3>, HydroError> {
        Ok(vec![DVec3::ZERO; mesh.vertex_count()])
    }
}

/// Vertices move with the fluid velocity of their cell.
pub struct Lagrangian;

impl<M: Tessellation> VertexMotion<M> for Lagrangian {
    fn predict(
        &self,
        _mesh: &M,
        cells: &[ComputationalCell],
        _time: f64,
    ) -> Result<Vec<DVec3>, HydroError> {
        Ok(cells.iter().map(|cell| cell.velocity()).collect())
    }
}

/// Lagrangian motion, steered towards the cell centroids to keep cells round.
pub struct CentroidMotion {
    reduce_factor: f64,
    max_iter: usize,
}

impl CentroidMotion {
    pub fn new(reduce_factor: f64, max_iter: usize) -> Self {
        Self {
            reduce_factor,
            max_iter,
        }
    }
}

/// Velocity taking `point` towards `centroid` over `dt`, limited to `reduce_factor` times the
/// distance to the centroid away from the uncorrected target.
fn corrected_velocity(
    centroid: DVec3,
    point: DVec3,
    w: DVec3,
    dt: f64,
    reduce_factor: f64,
    width: f64,
) -> DVec3 {
    let temp = centroid - point - dt * w;
    if temp.length() < 1e-6 * width {
        return (centroid - point) / dt;
    }
    let limiter = (centroid - point).length() * reduce_factor / temp.length();
    let new_centroid = point + dt * w + limiter.min(1.) * temp;
    (new_centroid - point) / dt
}

impl<M: Tessellation> VertexMotion<M> for CentroidMotion {
    fn predict(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        time: f64,
    ) -> Result<Vec<DVec3>, HydroError> {
        Lagrangian.predict(mesh, cells, time)
    }

    fn regularize(
        &self,
        mesh: &M,
        _cells: &[ComputationalCell],
        _time: f64,
        dt: f64,
        velocities: Vec<DVec3>,
    ) -> Result<Vec<DVec3>, HydroError> {
        let points = mesh.vertex_positions();
        let mut current = velocities.clone();
        for _ in 0..self.max_iter {
            let targets: Vec<DVec3> = points
                .iter()
                .zip(current.iter())
                .map(|(x, w)| *x + dt * *w)
                .collect();
            let mut moved = mesh.clone();
            moved.move_vertices(&targets);
            current = (0..points.len())
                .into_par_iter()
                .map(|i| {
                    // centroid in the frame of the unwrapped target position
                    let centroid = moved.cell_centroid(i) - moved.vertex_position(i) + targets[i];
                    corrected_velocity(
                        centroid,
                        points[i],
                        velocities[i],
                        dt,
                        self.reduce_factor,
                        mesh.cell_width(i),
                    )
                })
                .collect();
        }

        for (i, w) in current.iter().enumerate() {
            let width = mesh.cell_width(i);
            let displacement = w.length() * dt;
            if width < displacement {
                return Err(HydroError::MeshDegeneracy {
                    cell: i,
                    displacement,
                    width,
                    context: Diagnostics::new().entry("Time step", dt),
                });
            }
        }
        Ok(current)
    }
}

pub type VertexVelocityRule<M> = Box<dyn Fn(&M, &[ComputationalCell], usize, f64) -> DVec3 + Send + Sync>;

/// Per-cell overrides: the first predicate matching a cell supplies its velocity, all other
/// cells use the fallback motion.
pub struct ConditionalMotion<M: Tessellation> {
    rules: Vec<(Box<dyn CellPredicate>, VertexVelocityRule<M>)>,
    fallback: Box<dyn VertexMotion<M>>,
}

impl<M: Tessellation> ConditionalMotion<M> {
    pub fn new(fallback: Box<dyn VertexMotion<M>>) -> Self {
        Self {
            rules: vec![],
            fallback,
        }
    }

    pub fn with_rule(mut self, predicate: Box<dyn CellPredicate>, rule: VertexVelocityRule<M>) -> Self {
        self.rules.push((predicate, rule));
        self
    }

    fn apply_rules(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        time: f64,
        mut velocities: Vec<DVec3>,
    ) -> Vec<DVec3> {
        for (i, velocity) in velocities.iter_mut().enumerate() {
            if let Some((_, rule)) = self.rules.iter().find(|(predicate, _)| predicate.test(cells, i)) {
                *velocity = rule(mesh, cells, i, time);
            }
        }
        velocities
    }
}

impl<M: Tessellation> VertexMotion<M> for ConditionalMotion<M> {
    fn predict(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        time: f64,
    ) -> Result<Vec<DVec3>, HydroError> {
        let velocities = self.fallback.predict(mesh, cells, time)?;
        Ok(self.apply_rules(mesh, cells, time, velocities))
    }

    fn regularize(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        time: f64,
        dt: f64,
        velocities: Vec<DVec3>,
    ) -> Result<Vec<DVec3>, HydroError> {
        let velocities = self.fallback.regularize(mesh, cells, time, dt, velocities)?;
        Ok(self.apply_rules(mesh, cells, time, velocities))
    }
}

/// Build a vertex motion from the `kind` key (`fixed`, `lagrangian` or `centroid`).
pub fn from_config<M: Tessellation>(cfg: &Yaml) -> Result<Box<dyn VertexMotion<M>>, ConfigError> {
    match cfg["kind"].as_str().unwrap_or("lagrangian") {
        "fixed" => Ok(Box::new(Eulerian)),
        "lagrangian" => Ok(Box::new(Lagrangian)),
        "centroid" => {
            let reduce_factor = cfg["reduce_factor"].as_f64().unwrap_or(0.2);
            let iterations = cfg["iterations"].as_i64().unwrap_or(2);
            if iterations < 0 {
                return Err(ConfigError::InvalidValue {
                    name: "vertex_motion:iterations".to_string(),
                    value: cfg["iterations"].clone(),
                });
            }
            Ok(Box::new(CentroidMotion::new(reduce_factor, iterations as usize)))
        }
        kind => Err(ConfigError::UnknownVariant {
            kind: "vertex motion",
            name: kind.to_string(),
        }),
    }
}
