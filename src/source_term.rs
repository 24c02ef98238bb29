use glam::DVec3;
use yaml_rust::Yaml;

use crate::{
    cell::{ComputationalCell, Extensive},
    errors::ConfigError,
    mesh::Tessellation,
    HydroError,
};

/// Rate of change of the conserved totals of one cell caused by external physics.
///
/// The integrator multiplies the returned rate by the time step.
pub trait SourceTerm<M: Tessellation>: Send + Sync {
    fn contribute(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        index: usize,
        time: f64,
        dt: f64,
    ) -> Result<Extensive, HydroError>;
}

pub struct ZeroForce;

impl<M: Tessellation> SourceTerm<M> for ZeroForce {
    fn contribute(
        &self,
        _mesh: &M,
        _cells: &[ComputationalCell],
        _index: usize,
        _time: f64,
        _dt: f64,
    ) -> Result<Extensive, HydroError> {
        Ok(Extensive::default())
    }
}

pub struct KeplerianPotential {
    position: DVec3,
    softening_length: f64,
}

impl KeplerianPotential {
    pub fn new(position: DVec3, softening_length: f64) -> Self {
        Self {
            position,
            softening_length,
        }
    }

    /// Acceleration towards a unit point mass (G M = 1).
    fn acceleration(&self, position: DVec3) -> DVec3 {
        let dx = position - self.position;
        let r2 = dx.length_squared();
        let r = r2.sqrt();
        // soften if necessary
        let (r, r2) = if r < self.softening_length {
            (
                self.softening_length,
                r2 + self.softening_length * self.softening_length,
            )
        } else {
            (r, r2)
        };
        -dx / (r * r2)
    }
}

pub enum Potential {
    Constant { acceleration: DVec3 },
    Keplerian(KeplerianPotential),
}

impl Potential {
    fn acceleration(&self, position: DVec3) -> DVec3 {
        match self {
            Self::Constant { acceleration } => *acceleration,
            Self::Keplerian(potential) => potential.acceleration(position),
        }
    }
}

/// Gravity of a fixed external potential, evaluated at the cell centroids.
pub struct ExternalPotential(pub Potential);

fn read_vector(cfg: &Yaml, name: &str) -> Result<DVec3, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        name: format!("gravity:{name}"),
        value: cfg.clone(),
    };
    let values = cfg.as_vec().ok_or_else(invalid)?;
    let mut vector = DVec3::ZERO;
    for (i, value) in values.iter().take(3).enumerate() {
        vector[i] = value.as_f64().ok_or_else(invalid)?;
    }
    Ok(vector)
}

impl ExternalPotential {
    pub fn init(cfg: &Yaml) -> Result<Self, ConfigError> {
        let potential = match cfg["potential"].as_str() {
            Some("Constant") => Potential::Constant {
                acceleration: read_vector(&cfg["acceleration"], "acceleration")?,
            },
            Some("Keplerian") => Potential::Keplerian(KeplerianPotential::new(
                read_vector(&cfg["position"], "position")?,
                cfg["softening_length"].as_f64().unwrap_or(0.),
            )),
            Some(name) => {
                return Err(ConfigError::UnknownVariant {
                    kind: "potential",
                    name: name.to_string(),
                })
            }
            None => return Err(ConfigError::MissingParameter("gravity:potential".to_string())),
        };
        Ok(Self(potential))
    }
}

impl<M: Tessellation> SourceTerm<M> for ExternalPotential {
    fn contribute(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        index: usize,
        _time: f64,
        _dt: f64,
    ) -> Result<Extensive, HydroError> {
        let cell = &cells[index];
        let acceleration = self.0.acceleration(mesh.cell_centroid(index));
        let mass = cell.density() * mesh.cell_volume(index);
        let momentum = mass * cell.velocity();
        Ok(Extensive::new(
            0.,
            mass * acceleration,
            momentum.dot(acceleration),
        ))
    }
}

/// Sum of several source terms.
pub struct CombinedSources<M: Tessellation>(pub Vec<Box<dyn SourceTerm<M>>>);

impl<M: Tessellation> SourceTerm<M> for CombinedSources<M> {
    fn contribute(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        index: usize,
        time: f64,
        dt: f64,
    ) -> Result<Extensive, HydroError> {
        let mut total = Extensive::default();
        for source in self.0.iter() {
            total += &source.contribute(mesh, cells, index, time, dt)?;
        }
        Ok(total)
    }
}

/// Build the source term from the `gravity` section, if any.
pub fn from_config<M: Tessellation>(cfg: &Yaml) -> Result<Box<dyn SourceTerm<M>>, ConfigError> {
    if cfg["gravity"].is_badvalue() {
        return Ok(Box::new(ZeroForce));
    }
    Ok(Box::new(ExternalPotential::init(&cfg["gravity"])?))
}
