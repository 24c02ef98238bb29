//! Moving mesh (arbitrary Lagrangian-Eulerian) finite volume hydrodynamics, focussed on
//! flexibility rather than raw performance.
//!
//! An [`Engine`] integrates the conserved totals of every control volume over a
//! [`mesh::Tessellation`] whose vertices move between cycles. Every numerical choice is an
//! interchangeable policy collected in [`Policies`]: the equation of state, vertex motion,
//! time step, face fluxes, source terms and the two update stages. A cycle is transactional:
//! it either commits a consistent new state or leaves the previous one untouched.
//!
//! Control volumes can be inserted and removed between cycles with
//! [`Engine::adapt_mesh`], which only redistributes conserved totals. Several engines can be
//! coupled through ghost cells with a [`partition::PartitionedRun`], exchanging their state
//! with the fixed-length records of [`codec::ExtensiveCodec`].

pub use amr::{AmrReport, MeshAdaptation, SkipReason};
pub use cell::{ComputationalCell, Extensive};
pub use engine::{Engine, Phase, Policies};
pub use errors::{ConfigError, Diagnostics, HydroError};
pub use space::Space;
pub use utils::Dimensionality;

pub mod amr;
pub mod cell;
pub mod cell_updater;
pub mod codec;
mod engine;
mod errors;
pub mod extensive_updater;
pub mod flux;
pub mod gas_law;
pub mod mesh;
pub mod partition;
pub mod physical_quantities;
pub mod reconstruction;
pub mod riemann_solver;
pub mod source_term;
mod space;
pub mod timestep;
mod utils;
pub mod vertex_motion;
