use glam::DVec3;
use rayon::prelude::*;

use crate::{
    cell::{ComputationalCell, Extensive},
    errors::Diagnostics,
    gas_law::EquationOfState,
    mesh::Tessellation,
    HydroError,
};

/// The mesh together with the physical state of its cells, index-aligned with the mesh
/// vertices.
#[derive(Clone, Debug)]
pub struct Space<M> {
    pub(crate) mesh: M,
    pub(crate) cells: Vec<ComputationalCell>,
}

impl<M: Tessellation> Space<M> {
    pub fn new(mesh: M, cells: Vec<ComputationalCell>) -> Result<Self, HydroError> {
        if cells.len() != mesh.vertex_count() {
            return Err(HydroError::InconsistentState {
                cells: cells.len(),
                vertices: mesh.vertex_count(),
                context: Diagnostics::new(),
            });
        }
        Ok(Self { mesh, cells })
    }

    /// Sample the initial conditions at the cell centroids.
    pub fn from_ic<F>(mesh: M, ic: F) -> Self
    where
        F: Fn(DVec3) -> ComputationalCell,
    {
        let cells = (0..mesh.vertex_count())
            .map(|i| ic(mesh.cell_centroid(i)))
            .collect();
        Self { mesh, cells }
    }

    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    pub fn cells(&self) -> &[ComputationalCell] {
        &self.cells
    }

    /// Conserved totals of all cells.
    pub fn extensives(&self, eos: &dyn EquationOfState) -> Result<Vec<Extensive>, HydroError> {
        self.cells
            .par_iter()
            .enumerate()
            .map(|(i, cell)| {
                Extensive::from_cell(cell, self.mesh.cell_volume(i), eos)
                    .map_err(|err| err.with_entry("Cell index", i as f64))
            })
            .collect()
    }

    /// Drift every vertex with its velocity for a time `dt`.
    pub fn move_vertices(&mut self, velocities: &[DVec3], dt: f64) {
        let positions: Vec<DVec3> = self
            .mesh
            .vertex_positions()
            .iter()
            .zip(velocities.iter())
            .map(|(x, w)| *x + dt * *w)
            .collect();
        self.mesh.move_vertices(&positions);
    }
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;

    use super::*;
    use crate::{
        gas_law::GasLaw,
        mesh::{MeshBoundary, SegmentMesh},
    };

    #[test]
    fn test_from_ic() {
        let mesh = SegmentMesh::uniform(4, 0., 1., MeshBoundary::Walls);
        let space = Space::from_ic(mesh, |x| {
            let density = if x.x < 0.5 { 1. } else { 0.125 };
            ComputationalCell::new(density, DVec3::ZERO, density)
        });
        assert_eq!(space.cells()[1].density(), 1.);
        assert_eq!(space.cells()[2].density(), 0.125);

        let extensives = space.extensives(&GasLaw::ideal(1.4)).unwrap();
        assert_approx_eq!(f64, extensives[0].mass(), 0.25);
        assert_approx_eq!(f64, extensives[3].energy(), 0.125 * 0.25 * 2.5);
    }

    #[test]
    fn test_mismatch_and_drift() {
        let mesh = SegmentMesh::uniform(2, 0., 1., MeshBoundary::Walls);
        let result = Space::new(mesh.clone(), vec![ComputationalCell::default()]);
        assert!(matches!(
            result,
            Err(HydroError::InconsistentState {
                cells: 1,
                vertices: 2,
                ..
            })
        ));

        let mut space = Space::new(mesh, vec![ComputationalCell::default(); 2]).unwrap();
        space.move_vertices(&[DVec3::X, DVec3::ZERO], 0.1);
        assert_approx_eq!(f64, space.mesh().vertex_position(0).x, 0.35);
        assert_approx_eq!(f64, space.mesh().cell_volume(0), 0.55);
    }
}
