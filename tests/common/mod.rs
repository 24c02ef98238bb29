#![allow(dead_code)]

use glam::DVec3;
use mvmm_ale::{
    mesh::{MeshBoundary, SegmentMesh},
    ComputationalCell, Engine, Policies, Space,
};
use yaml_rust::YamlLoader;

pub const GAMMA: f64 = 5. / 3.;

pub const CONFIG: &'static str = r###"
hydrodynamics:
  gamma: 1.66666666666666667
  riemann_solver: "HLLC"
  boundary: "reflective"

vertex_motion:
  kind: "lagrangian"

time_integration:
  cfl_criterion: 0.3
"###;

pub const FIXED_CONFIG: &'static str = r###"
hydrodynamics:
  gamma: 1.66666666666666667
  boundary: "reflective"

vertex_motion:
  kind: "fixed"

time_integration:
  cfl_criterion: 0.3
"###;

pub const CENTROID_CONFIG: &'static str = r###"
hydrodynamics:
  gamma: 1.66666666666666667

vertex_motion:
  kind: "centroid"
  reduce_factor: 0.2
  iterations: 2

time_integration:
  cfl_criterion: 0.3
  dt_max: 1e-2
"###;

pub const LINEAR_CONFIG: &'static str = r###"
hydrodynamics:
  gamma: 1.66666666666666667
  reconstruction: "linear"
  slope_limiter: true

vertex_motion:
  kind: "lagrangian"

time_integration:
  cfl_criterion: 0.3
"###;

pub const MESH_CONFIG: &'static str = r###"
num_cells: 32
box_size: 1.
boundary: "periodic"
perturbations: 0.2
seed: 42
"###;

pub fn get_policies(cfg: &str) -> Policies<SegmentMesh> {
    Policies::init(&YamlLoader::load_from_str(cfg).expect("Error loading policies cfg!")[0])
        .expect("Error creating policies!")
}

pub fn get_mesh(cfg: &str) -> SegmentMesh {
    SegmentMesh::init(&YamlLoader::load_from_str(cfg).expect("Error loading mesh cfg!")[0])
        .expect("Error creating mesh!")
}

/// An engine with the initial conditions sampled at the cell centroids.
pub fn get_engine<F>(cfg: &str, mesh: SegmentMesh, ic: F) -> Engine<SegmentMesh>
where
    F: Fn(DVec3) -> ComputationalCell,
{
    Engine::from_space(Space::from_ic(mesh, ic), get_policies(cfg))
        .expect("Error initializing engine!")
}

/// Sod shock tube between reflecting walls.
pub fn sod(num_cells: usize) -> SegmentMesh {
    SegmentMesh::uniform(num_cells, 0., 1., MeshBoundary::Walls)
}

pub fn sod_ic(x: DVec3) -> ComputationalCell {
    if x.x < 0.5 {
        ComputationalCell::new(1., DVec3::ZERO, 1.).with_tracer("dye", 1.)
    } else {
        ComputationalCell::new(0.125, DVec3::ZERO, 0.1).with_tracer("dye", 0.)
    }
}

/// Smooth density wave moving through a periodic box.
pub fn wave_ic(x: DVec3) -> ComputationalCell {
    let density = 1. + 0.5 * (2. * std::f64::consts::PI * x.x).sin();
    ComputationalCell::new(density, DVec3::new(0.3, 0., 0.), 1.).with_tracer("dye", density - 0.5)
}
