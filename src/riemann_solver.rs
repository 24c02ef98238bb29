use glam::DVec3;
use yaml_rust::Yaml;

use crate::{
    cell::Tracers,
    errors::ConfigError,
    gas_law::EquationOfState,
    physical_quantities::{Conserved, Primitives, State},
    HydroError,
};

mod hllc;

pub use hllc::HLLCRiemannSolver;

/// Two-state solver for the flux through an interface.
///
/// Both states are given in the frame co-moving with the interface; `n_unit` points from
/// `left` to `right`. The returned flux is per unit area and expressed in the lab frame.
pub trait RiemannFluxSolver: Send + Sync {
    fn solve_for_flux(
        &self,
        left: &Primitives,
        right: &Primitives,
        interface_velocity: DVec3,
        n_unit: DVec3,
        eos: &dyn EquationOfState,
        tracers: (&Tracers, &Tracers),
    ) -> Result<State<Conserved>, HydroError>;
}

pub fn riemann_solver_from_config(cfg: &Yaml) -> Result<Box<dyn RiemannFluxSolver>, ConfigError> {
    match cfg["riemann_solver"].as_str().unwrap_or("HLLC") {
        "HLLC" => Ok(Box::new(HLLCRiemannSolver)),
        name => Err(ConfigError::UnknownVariant {
            kind: "Riemann solver",
            name: name.to_string(),
        }),
    }
}

/// Transform a flux computed in the frame of the interface back to the lab frame.
fn deboost(flux: State<Conserved>, interface_velocity: DVec3) -> State<Conserved> {
    flux + State::<Conserved>::new(
        0.,
        interface_velocity * flux.mass(),
        interface_velocity.dot(flux.momentum())
            + 0.5 * interface_velocity.length_squared() * flux.mass(),
    )
}
