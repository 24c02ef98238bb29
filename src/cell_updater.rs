use glam::DVec3;
use rayon::prelude::*;

use crate::{
    cell::{CellPredicate, ComputationalCell, Extensive, Tracers},
    errors::Diagnostics,
    gas_law::EquationOfState,
    mesh::Tessellation,
    physical_quantities::Primitives,
    HydroError,
};

/// Reconstructs the physical state of the cells from their conserved totals and volumes.
pub trait CellUpdater<M: Tessellation>: Send + Sync {
    /// New physical state of one cell. May rewrite parts of the conserved total that are
    /// derived from the physical state.
    fn update_cell(
        &self,
        mesh: &M,
        eos: &dyn EquationOfState,
        extensive: &mut Extensive,
        old: &[ComputationalCell],
        index: usize,
        time: f64,
    ) -> Result<ComputationalCell, HydroError>;

    fn apply(
        &self,
        mesh: &M,
        eos: &dyn EquationOfState,
        extensives: &mut [Extensive],
        old: &[ComputationalCell],
        time: f64,
    ) -> Result<Vec<ComputationalCell>, HydroError> {
        extensives
            .par_iter_mut()
            .enumerate()
            .map(|(i, extensive)| self.update_cell(mesh, eos, extensive, old, i, time))
            .collect()
    }
}

/// Alternative reconstruction selected for a cell by a [`CellPredicate`].
pub trait CellAction<M: Tessellation>: Send + Sync {
    fn update(
        &self,
        mesh: &M,
        eos: &dyn EquationOfState,
        extensive: &mut Extensive,
        old: &[ComputationalCell],
        index: usize,
        time: f64,
    ) -> Result<ComputationalCell, HydroError>;
}

/// Keep the previous physical state.
///
/// The conserved total is left as the fluxes made it, so whatever crossed the faces of the
/// cell stays accounted for even though its state is frozen.
pub struct SkipUpdate;

impl<M: Tessellation> CellAction<M> for SkipUpdate {
    fn update(
        &self,
        _mesh: &M,
        _eos: &dyn EquationOfState,
        _extensive: &mut Extensive,
        old: &[ComputationalCell],
        index: usize,
        _time: f64,
    ) -> Result<ComputationalCell, HydroError> {
        Ok(old[index].clone())
    }
}

/// Invert the conserved total through the equation of state.
#[derive(Default)]
pub struct RegularUpdate {
    entropy_tracer: Option<String>,
}

fn with_cell_context(err: HydroError, index: usize, extensive: &Extensive) -> HydroError {
    err.with_entry("Cell index", index as f64)
        .with_entry("Cell mass", extensive.mass())
        .with_entry("Cell x momentum", extensive.momentum().x)
        .with_entry("Cell y momentum", extensive.momentum().y)
        .with_entry("Cell z momentum", extensive.momentum().z)
        .with_entry("Cell energy", extensive.energy())
}

impl RegularUpdate {
    pub(crate) fn invert(
        &self,
        volume: f64,
        eos: &dyn EquationOfState,
        extensive: &mut Extensive,
        old: &ComputationalCell,
    ) -> Result<ComputationalCell, HydroError> {
        let mass = extensive.mass();
        let density = mass / volume;
        let (velocity, tracers) = if mass > 0. {
            let tracers: Tracers = extensive
                .tracers
                .iter()
                .map(|(name, tracer_mass)| (name.clone(), tracer_mass / mass))
                .collect();
            (extensive.momentum() / mass, tracers)
        } else {
            (DVec3::ZERO, extensive.tracers.keys().map(|name| (name.clone(), 0.)).collect())
        };
        let thermal_energy = if mass > 0. {
            extensive.energy() / mass - 0.5 * velocity.length_squared()
        } else {
            0.
        };
        let pressure = eos.de2p(density, thermal_energy, &tracers)?;
        let mut cell = ComputationalCell {
            primitives: Primitives::new(density, velocity, pressure),
            tracers,
            stickers: old.stickers.clone(),
        };

        if let Some(name) = self.entropy_tracer.as_ref() {
            if cell.tracers.contains_key(name) {
                let entropy = eos.dp2s(density, pressure, &cell.tracers)?;
                cell.tracers.insert(name.clone(), entropy);
                extensive.tracers.insert(name.clone(), entropy * mass);
            }
        }
        Ok(cell)
    }
}

impl<M: Tessellation> CellAction<M> for RegularUpdate {
    fn update(
        &self,
        mesh: &M,
        eos: &dyn EquationOfState,
        extensive: &mut Extensive,
        old: &[ComputationalCell],
        index: usize,
        _time: f64,
    ) -> Result<ComputationalCell, HydroError> {
        self.invert(mesh.cell_volume(index), eos, extensive, &old[index])
            .map_err(|err| with_cell_context(err, index, extensive))
    }
}

pub type CellRule<M> = (Box<dyn CellPredicate>, Box<dyn CellAction<M>>);

/// Cell updater driven by an ordered list of cell rules, the first matching rule wins.
///
/// Cells matching no rule are reconstructed by the [`RegularUpdate`] fallback, unless the
/// fallback was removed, in which case they are an error.
pub struct SimpleCellUpdater<M: Tessellation> {
    rules: Vec<CellRule<M>>,
    fallback: Option<RegularUpdate>,
}

impl<M: Tessellation> Default for SimpleCellUpdater<M> {
    fn default() -> Self {
        Self::new(vec![])
    }
}

impl<M: Tessellation> SimpleCellUpdater<M> {
    pub fn new(rules: Vec<CellRule<M>>) -> Self {
        Self {
            rules,
            fallback: Some(RegularUpdate::default()),
        }
    }

    /// Only the given rules apply.
    pub fn strict(rules: Vec<CellRule<M>>) -> Self {
        Self {
            rules,
            fallback: None,
        }
    }

    /// Re-derive the named tracer from the entropy of the reconstructed state.
    pub fn with_entropy_tracer(mut self, name: &str) -> Self {
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.entropy_tracer = Some(name.to_string());
        }
        self
    }

    pub fn push(mut self, predicate: Box<dyn CellPredicate>, action: Box<dyn CellAction<M>>) -> Self {
        self.rules.push((predicate, action));
        self
    }
}

impl<M: Tessellation> CellUpdater<M> for SimpleCellUpdater<M> {
    fn update_cell(
        &self,
        mesh: &M,
        eos: &dyn EquationOfState,
        extensive: &mut Extensive,
        old: &[ComputationalCell],
        index: usize,
        time: f64,
    ) -> Result<ComputationalCell, HydroError> {
        if let Some((_, action)) = self.rules.iter().find(|(predicate, _)| predicate.test(old, index)) {
            return action.update(mesh, eos, extensive, old, index, time);
        }
        match self.fallback.as_ref() {
            Some(fallback) => fallback.update(mesh, eos, extensive, old, index, time),
            None => Err(HydroError::UnmatchedCell {
                cell: index,
                context: Diagnostics::new().entry("Cell mass", extensive.mass()),
            }),
        }
    }
}
