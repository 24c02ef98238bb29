//! Insertion and removal of control volumes between committed cycles.
//!
//! Every refinement and every removal runs on copies of the mesh, the cells and the conserved
//! totals. A candidate whose reconstruction fails is rolled back and reported as skipped; the
//! pass itself never fails. Conserved totals are only moved between cells, never created.

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use log::{debug, warn};

use crate::{
    cell::{ComputationalCell, Extensive},
    engine::Engine,
    mesh::Tessellation,
    HydroError,
};

pub trait CellsToRefine<M: Tessellation>: Send + Sync {
    fn to_refine(&self, mesh: &M, cells: &[ComputationalCell], time: f64) -> Vec<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemovalCandidate {
    pub index: usize,
    /// Candidates with a higher merit are removed first.
    pub merit: f64,
}

pub trait CellsToRemove<M: Tessellation>: Send + Sync {
    fn to_remove(&self, mesh: &M, cells: &[ComputationalCell], time: f64)
        -> Vec<RemovalCandidate>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Flagged for both refinement and removal.
    Conflict,
    Duplicate,
    OutOfRange,
    /// Removal would leave fewer than the minimal number of cells.
    TooFewCells,
    /// A neighbour is already being removed.
    AdjacentRemoval,
    NoNeighbor,
    UpdateFailed(HydroError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmrReport {
    /// Refined cells, in the numbering before the pass.
    pub refined: Vec<usize>,
    /// Removed cells, in the numbering before the pass.
    pub removed: Vec<usize>,
    pub skipped: Vec<(usize, SkipReason)>,
}

pub struct MeshAdaptation<M: Tessellation> {
    refine: Option<Box<dyn CellsToRefine<M>>>,
    remove: Option<Box<dyn CellsToRemove<M>>>,
    min_cells: usize,
}

impl<M: Tessellation> MeshAdaptation<M> {
    pub fn new(min_cells: usize) -> Self {
        Self {
            refine: None,
            remove: None,
            min_cells,
        }
    }

    pub fn with_refine(mut self, refine: Box<dyn CellsToRefine<M>>) -> Self {
        self.refine = Some(refine);
        self
    }

    pub fn with_remove(mut self, remove: Box<dyn CellsToRemove<M>>) -> Self {
        self.remove = Some(remove);
        self
    }
}

/// Refine every cell larger than `max_volume`.
pub struct VolumeRefine {
    pub max_volume: f64,
}

impl<M: Tessellation> CellsToRefine<M> for VolumeRefine {
    fn to_refine(&self, mesh: &M, _cells: &[ComputationalCell], _time: f64) -> Vec<usize> {
        (0..mesh.vertex_count())
            .filter(|&i| mesh.cell_volume(i) > self.max_volume)
            .collect()
    }
}

/// Remove every cell smaller than `min_volume`, smallest first.
pub struct VolumeRemove {
    pub min_volume: f64,
}

impl<M: Tessellation> CellsToRemove<M> for VolumeRemove {
    fn to_remove(
        &self,
        mesh: &M,
        _cells: &[ComputationalCell],
        _time: f64,
    ) -> Vec<RemovalCandidate> {
        (0..mesh.vertex_count())
            .filter(|&i| mesh.cell_volume(i) < self.min_volume)
            .map(|i| RemovalCandidate {
                index: i,
                merit: 1. / mesh.cell_volume(i),
            })
            .collect()
    }
}

/// Neighbours of a cell with their position in the frame of the cell and the total area of
/// the faces shared with it.
fn neighbor_faces<M: Tessellation>(mesh: &M, index: usize) -> BTreeMap<usize, (DVec3, f64)> {
    let mut neighbors: BTreeMap<usize, (DVec3, f64)> = BTreeMap::new();
    for &face_idx in mesh.faces_of(index) {
        let face = mesh.face(face_idx);
        let Some(other) = face.other(index) else {
            continue;
        };
        if other == index {
            continue;
        }
        let shift = face.shift().unwrap_or(DVec3::ZERO);
        let position = if face.left() == index {
            mesh.vertex_position(other) + shift
        } else {
            mesh.vertex_position(other) - shift
        };
        let entry = neighbors.entry(other).or_insert((position, 0.));
        entry.1 += face.area();
    }
    neighbors
}

impl<M: Tessellation> Engine<M> {
    /// Refine and remove the cells selected by the adaptation policies.
    pub fn adapt_mesh(&mut self, amr: &MeshAdaptation<M>) -> AmrReport {
        let mut report = AmrReport::default();
        let num_cells = self.space.cells.len();
        let time = self.time();
        let refine_list = amr
            .refine
            .as_ref()
            .map(|refine| refine.to_refine(&self.space.mesh, &self.space.cells, time))
            .unwrap_or_default();
        let remove_list = amr
            .remove
            .as_ref()
            .map(|remove| remove.to_remove(&self.space.mesh, &self.space.cells, time))
            .unwrap_or_default();

        let flagged_for_refinement: BTreeSet<usize> = refine_list.iter().copied().collect();
        let flagged_for_removal: BTreeSet<usize> =
            remove_list.iter().map(|candidate| candidate.index).collect();
        let mut conflicts = BTreeSet::new();

        // Refinement
        let mut seen = BTreeSet::new();
        for &index in refine_list.iter() {
            let result = if index >= num_cells {
                Err(SkipReason::OutOfRange)
            } else if !seen.insert(index) {
                Err(SkipReason::Duplicate)
            } else if flagged_for_removal.contains(&index) {
                conflicts.insert(index);
                Err(SkipReason::Conflict)
            } else {
                self.refine_cell(index)
            };
            match result {
                Ok(()) => report.refined.push(index),
                Err(reason) => report.skipped.push((index, reason)),
            }
        }

        // Removal planning, highest merit first
        let mut candidates = remove_list;
        candidates.sort_by(|a, b| b.merit.total_cmp(&a.merit).then(a.index.cmp(&b.index)));
        let mut seen = BTreeSet::new();
        let mut remaining = self.space.cells.len();
        let mut planned: Vec<(usize, usize)> = vec![];
        for candidate in candidates {
            let index = candidate.index;
            let reason = if index >= num_cells {
                Some(SkipReason::OutOfRange)
            } else if !seen.insert(index) {
                Some(SkipReason::Duplicate)
            } else if flagged_for_refinement.contains(&index) {
                // Already reported during refinement
                if conflicts.contains(&index) {
                    continue;
                }
                Some(SkipReason::Conflict)
            } else if remaining <= amr.min_cells {
                Some(SkipReason::TooFewCells)
            } else {
                None
            };
            if let Some(reason) = reason {
                report.skipped.push((index, reason));
                continue;
            }

            let neighbors = neighbor_faces(&self.space.mesh, index);
            if neighbors.is_empty() {
                report.skipped.push((index, SkipReason::NoNeighbor));
                continue;
            }
            let adjacent = planned.iter().any(|&(removed, _)| {
                neighbors.contains_key(&removed)
            });
            if adjacent {
                report.skipped.push((index, SkipReason::AdjacentRemoval));
                continue;
            }
            // Largest shared face, lowest index on ties
            let mut target = None;
            for (&neighbor, &(_, area)) in neighbors.iter() {
                match target {
                    Some((_, best_area)) if area <= best_area => {}
                    _ => target = Some((neighbor, area)),
                }
            }
            if let Some((target, _)) = target {
                planned.push((index, target));
                remaining -= 1;
            }
        }

        // Apply removals from the highest index down, so pending indices stay valid
        planned.sort_by(|a, b| b.0.cmp(&a.0));
        let mut targets: Vec<usize> = planned.iter().map(|&(_, target)| target).collect();
        for k in 0..planned.len() {
            let index = planned[k].0;
            match self.remove_cell(index, targets[k]) {
                Ok(()) => {
                    report.removed.push(index);
                    for target in targets.iter_mut().skip(k + 1) {
                        if *target > index {
                            *target -= 1;
                        }
                    }
                }
                Err(reason) => report.skipped.push((index, reason)),
            }
        }

        for (index, reason) in report.skipped.iter() {
            warn!("Mesh adaptation skipped cell {index}: {reason:?}");
        }
        debug!(
            "Mesh adaptation refined {} and removed {} cells, {} cells remain",
            report.refined.len(),
            report.removed.len(),
            self.space.cells.len()
        );
        report
    }

    /// Split a cell by inserting a vertex a quarter of the way towards its farthest neighbour.
    fn refine_cell(&mut self, index: usize) -> Result<(), SkipReason> {
        let mesh = &self.space.mesh;
        let position = mesh.vertex_position(index);
        let neighbors = neighbor_faces(mesh, index);
        let farthest = neighbors
            .values()
            .map(|(x, _)| *x)
            .max_by(|a, b| {
                a.distance_squared(position)
                    .total_cmp(&b.distance_squared(position))
            })
            .ok_or(SkipReason::NoNeighbor)?;

        let num_cells = mesh.vertex_count();
        let volumes_before: Vec<f64> = (0..num_cells).map(|i| mesh.cell_volume(i)).collect();
        let mut mesh = mesh.clone();
        let new_index = mesh.insert_vertex(position + 0.25 * (farthest - position));
        let mut cells = self.space.cells.clone();
        cells.push(cells[index].clone());
        let mut extensives = self.extensives.clone();

        // Every donor hands over the fraction of its total equal to the volume it lost
        let mut new_extensive = extensives[index].zero_like();
        let mut affected = vec![];
        for (j, volume_before) in volumes_before.iter().enumerate() {
            let lost = volume_before - mesh.cell_volume(j);
            if lost > 0. {
                let moved = (lost / volume_before) * &extensives[j];
                extensives[j] -= &moved;
                new_extensive += &moved;
                affected.push(j);
            }
        }
        extensives.push(new_extensive);
        affected.push(new_index);

        self.reconcile(&mesh, &mut cells, &mut extensives, &affected)
            .map_err(SkipReason::UpdateFailed)?;
        self.space.mesh = mesh;
        self.space.cells = cells;
        self.extensives = extensives;
        Ok(())
    }

    /// Merge a cell into `target` and delete its vertex.
    fn remove_cell(&mut self, index: usize, target: usize) -> Result<(), SkipReason> {
        let mut mesh = self.space.mesh.clone();
        let neighbors: Vec<usize> = mesh.neighbors(index).to_vec();
        let mut cells = self.space.cells.clone();
        let mut extensives = self.extensives.clone();

        let removed = extensives[index].clone();
        extensives[target] += &removed;
        mesh.remove_vertex(index);
        cells.remove(index);
        extensives.remove(index);

        let affected: Vec<usize> = neighbors
            .into_iter()
            .filter(|&j| j != index)
            .map(|j| if j > index { j - 1 } else { j })
            .collect();
        self.reconcile(&mesh, &mut cells, &mut extensives, &affected)
            .map_err(SkipReason::UpdateFailed)?;
        self.space.mesh = mesh;
        self.space.cells = cells;
        self.extensives = extensives;
        Ok(())
    }

    /// Re-run the cell updater on the given cells of a modified copy of the state.
    fn reconcile(
        &self,
        mesh: &M,
        cells: &mut [ComputationalCell],
        extensives: &mut [Extensive],
        affected: &[usize],
    ) -> Result<(), HydroError> {
        let eos = self.policies.eos.as_ref();
        let updater = self.policies.cell_updater.as_ref();
        let mut updated = Vec::with_capacity(affected.len());
        for &j in affected {
            let cell = updater.update_cell(mesh, eos, &mut extensives[j], cells, j, self.time())?;
            updated.push((j, cell));
        }
        for (j, cell) in updated {
            cells[j] = cell;
        }
        Ok(())
    }
}
