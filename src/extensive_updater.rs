use rayon::prelude::*;

use crate::{
    cell::{ComputationalCell, Extensive},
    errors::Diagnostics,
    mesh::Tessellation,
    HydroError,
};

/// Accumulates face fluxes into the conserved totals of the cells.
pub trait ExtensiveUpdater<M: Tessellation>: Send + Sync {
    fn apply(
        &self,
        fluxes: &[Extensive],
        mesh: &M,
        cells: &[ComputationalCell],
        dt: f64,
        extensives: &mut [Extensive],
    ) -> Result<(), HydroError>;
}

/// `extensive[i] += dt * sum(outward_sign * flux)` over the faces of every cell.
///
/// Both cells of a face receive the same (negated) value, so the update is exactly
/// conservative across interior faces.
pub struct SimpleExtensiveUpdater;

impl<M: Tessellation> ExtensiveUpdater<M> for SimpleExtensiveUpdater {
    fn apply(
        &self,
        fluxes: &[Extensive],
        mesh: &M,
        _cells: &[ComputationalCell],
        dt: f64,
        extensives: &mut [Extensive],
    ) -> Result<(), HydroError> {
        if fluxes.len() != mesh.face_count() || extensives.len() != mesh.vertex_count() {
            return Err(HydroError::InconsistentState {
                cells: extensives.len(),
                vertices: mesh.vertex_count(),
                context: Diagnostics::new()
                    .entry("Number of fluxes", fluxes.len() as f64)
                    .entry("Number of faces", mesh.face_count() as f64),
            });
        }
        extensives
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, extensive)| {
                for &face_idx in mesh.faces_of(i) {
                    let face = mesh.face(face_idx);
                    // A cell facing its own periodic image
                    if face.right() == Some(face.left()) {
                        continue;
                    }
                    let delta = dt * &fluxes[face_idx];
                    if face.left() == i {
                        *extensive -= &delta;
                    } else {
                        *extensive += &delta;
                    }
                }
            });
        Ok(())
    }
}
