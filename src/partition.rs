//! Several engines advanced in lockstep, coupled through ghost cells on their shared
//! boundaries.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use glam::DVec3;
use log::debug;
use rayon::prelude::*;

use crate::{
    cell::{ComputationalCell, Extensive},
    cell_updater::RegularUpdate,
    codec::ExtensiveCodec,
    engine::Engine,
    errors::Diagnostics,
    flux::{riemann_flux, FaceAction, FaceCondition, FaceContext, ModularFluxCalculator},
    mesh::Tessellation,
    riemann_solver::RiemannFluxSolver,
    HydroError,
};

/// Minimal alignment of a ghost normal with a boundary face normal.
const NORMAL_ALIGNMENT: f64 = 0.99;

/// Ghost states of remote cells, keyed by the local boundary cell they face.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct GhostCells {
    store: Arc<RwLock<BTreeMap<usize, Vec<(DVec3, ComputationalCell)>>>>,
}

impl GhostCells {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ghost facing the boundary face of `cell` with outward normal `normal`.
    pub fn get(&self, cell: usize, normal: DVec3) -> Option<ComputationalCell> {
        let store = self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        store.get(&cell).and_then(|ghosts| {
            ghosts
                .iter()
                .find(|(n, _)| n.dot(normal) > NORMAL_ALIGNMENT)
                .map(|(_, ghost)| ghost.clone())
        })
    }

    fn replace(&self, ghosts: BTreeMap<usize, Vec<(DVec3, ComputationalCell)>>) {
        let mut store = self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *store = ghosts;
    }

    /// Give the ghost faces of this store priority in `calculator`.
    pub fn attach<M: Tessellation>(
        &self,
        calculator: ModularFluxCalculator<M>,
        solver: Box<dyn RiemannFluxSolver>,
    ) -> ModularFluxCalculator<M> {
        calculator.prepend(
            Box::new(HasGhost(self.clone())),
            Box::new(GhostFlux {
                solver,
                ghosts: self.clone(),
            }),
        )
    }
}

/// Matches boundary faces that have a ghost cell installed.
pub struct HasGhost(pub GhostCells);

impl<M> FaceCondition<M> for HasGhost {
    fn test(&self, ctx: &FaceContext<M>) -> bool {
        ctx.face.is_boundary() && self.0.get(ctx.face.left(), ctx.face.normal()).is_some()
    }
}

/// Riemann flux between a boundary cell and its ghost.
pub struct GhostFlux {
    pub solver: Box<dyn RiemannFluxSolver>,
    pub ghosts: GhostCells,
}

impl<M> FaceAction<M> for GhostFlux {
    fn flux(&self, ctx: &FaceContext<M>) -> Result<Extensive, HydroError> {
        let ghost = self
            .ghosts
            .get(ctx.face.left(), ctx.face.normal())
            .ok_or_else(|| HydroError::UnmatchedFace {
                face: ctx.index,
                context: Diagnostics::new().entry("Cell index", ctx.face.left() as f64),
            })?;
        riemann_flux(self.solver.as_ref(), ctx, ctx.left(), &ghost)
    }
}

/// `source` cell of partition `source.0` seen as a ghost by cell `target.1` of partition
/// `target.0`, across the boundary face with outward normal `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GhostLink {
    pub source: (usize, usize),
    pub target: (usize, usize),
    pub normal: DVec3,
}

pub struct Partition<M: Tessellation> {
    pub engine: Engine<M>,
    pub ghosts: GhostCells,
}

pub struct PartitionedRun<M: Tessellation> {
    partitions: Vec<Partition<M>>,
    links: Vec<GhostLink>,
    cycle: u64,
}

impl<M: Tessellation> PartitionedRun<M> {
    pub fn new(partitions: Vec<Partition<M>>, links: Vec<GhostLink>) -> Self {
        Self {
            partitions,
            links,
            cycle: 0,
        }
    }

    pub fn partitions(&self) -> &[Partition<M>] {
        &self.partitions
    }

    pub fn time(&self) -> f64 {
        self.partitions
            .iter()
            .map(|partition| partition.engine.time())
            .fold(f64::INFINITY, f64::min)
    }

    fn check_link(&self, partition: usize, cell: usize) -> Result<(), HydroError> {
        let num_cells = self
            .partitions
            .get(partition)
            .map(|p| p.engine.cells().len())
            .unwrap_or(0);
        if cell >= num_cells {
            return Err(HydroError::InconsistentState {
                cells: num_cells,
                vertices: cell + 1,
                context: Diagnostics::new().entry("Partition", partition as f64),
            });
        }
        Ok(())
    }

    /// Send the state of every linked cell, as totals per unit volume, to the partition that
    /// needs it as a ghost.
    pub fn exchange(&self) -> Result<(), HydroError> {
        let mut ghosts: Vec<BTreeMap<usize, Vec<(DVec3, ComputationalCell)>>> =
            vec![BTreeMap::new(); self.partitions.len()];
        let inversion = RegularUpdate::default();

        for (source, partition) in self.partitions.iter().enumerate() {
            let links: Vec<&GhostLink> =
                self.links.iter().filter(|link| link.source.0 == source).collect();
            if links.is_empty() {
                continue;
            }
            for link in links.iter() {
                self.check_link(link.source.0, link.source.1)?;
                self.check_link(link.target.0, link.target.1)?;
            }
            let engine = &partition.engine;
            let batch: Vec<_> = links
                .iter()
                .map(|link| {
                    let volume = engine.mesh().cell_volume(link.source.1);
                    (1. / volume) * &engine.extensives()[link.source.1]
                })
                .collect();
            let codec = ExtensiveCodec::for_batch(engine.mesh().dimensionality(), &batch);
            let buffer = codec.encode(&batch);

            for (link, mut density) in links.iter().zip(codec.decode(&buffer)?) {
                let eos = self.partitions[link.target.0].engine.policies().eos.as_ref();
                let ghost = inversion
                    .invert(1., eos, &mut density, &ComputationalCell::default())
                    .map_err(|err| {
                        err.with_entry("Partition", source as f64)
                            .with_entry("Cell index", link.source.1 as f64)
                    })?;
                ghosts[link.target.0]
                    .entry(link.target.1)
                    .or_default()
                    .push((link.normal, ghost));
            }
        }

        for (partition, ghosts) in self.partitions.iter().zip(ghosts) {
            partition.ghosts.replace(ghosts);
        }
        Ok(())
    }

    /// One coupled cycle: exchange ghosts, agree on the smallest proposed step and advance
    /// every partition by it.
    ///
    /// Partitions that advanced before another one failed stay advanced.
    pub fn advance(&mut self, dt_max: f64) -> Result<f64, HydroError> {
        self.exchange()?;
        let dt = self
            .partitions
            .par_iter()
            .map(|partition| partition.engine.propose_timestep())
            .try_reduce(|| f64::INFINITY, |a, b| Ok(a.min(b)))?
            .min(dt_max);
        self.partitions
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(i, partition)| {
                partition
                    .engine
                    .advance_by(dt)
                    .map(|_| ())
                    .map_err(|err| err.with_entry("Partition", i as f64))
            })?;
        self.cycle += 1;
        debug!("Partitioned cycle {} advanced by dt={dt:e}", self.cycle);
        Ok(dt)
    }

    /// Advance until `t_end` or until `max_cycles` cycles ran. Returns the number of cycles.
    pub fn run_until(&mut self, t_end: f64, max_cycles: u64) -> Result<u64, HydroError> {
        let mut cycles = 0;
        while cycles < max_cycles {
            let remaining = t_end - self.time();
            if remaining <= 0. {
                break;
            }
            self.advance(remaining)?;
            cycles += 1;
        }
        Ok(cycles)
    }
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;
    use yaml_rust::YamlLoader;

    use super::*;
    use crate::{
        engine::Policies,
        mesh::{MeshBoundary, SegmentMesh},
        riemann_solver::HLLCRiemannSolver,
    };

    const CONFIG: &str = r###"
hydrodynamics:
  gamma: 1.4
vertex_motion:
  kind: fixed
time_integration:
  cfl_criterion: 0.3
"###;

    fn partition(anchor: f64, pressure: f64) -> Partition<SegmentMesh> {
        let cfg = &YamlLoader::load_from_str(CONFIG).unwrap()[0];
        let ghosts = GhostCells::new();
        let mut policies = Policies::init(cfg).unwrap();
        policies.flux_calculator = Box::new(ghosts.attach(
            ModularFluxCalculator::default(),
            Box::new(HLLCRiemannSolver),
        ));
        let mesh = SegmentMesh::uniform(4, anchor, 0.5, MeshBoundary::Walls);
        let cells = vec![ComputationalCell::new(1., DVec3::ZERO, pressure).with_tracer("dye", anchor); 4];
        Partition {
            engine: Engine::new(mesh, cells, policies).unwrap(),
            ghosts,
        }
    }

    fn coupled() -> PartitionedRun<SegmentMesh> {
        PartitionedRun::new(
            vec![partition(0., 2.), partition(0.5, 1.)],
            vec![
                GhostLink {
                    source: (1, 0),
                    target: (0, 3),
                    normal: DVec3::X,
                },
                GhostLink {
                    source: (0, 3),
                    target: (1, 0),
                    normal: -DVec3::X,
                },
            ],
        )
    }

    #[test]
    fn test_exchange() {
        let run = coupled();
        run.exchange().unwrap();
        let ghost = run.partitions()[0].ghosts.get(3, DVec3::X).unwrap();
        assert_approx_eq!(f64, ghost.density(), 1.);
        assert_approx_eq!(f64, ghost.pressure(), 1., epsilon = 1e-12);
        assert_approx_eq!(f64, ghost.tracers["dye"], 0.5);
        assert!(run.partitions()[0].ghosts.get(3, -DVec3::X).is_none());
        assert!(run.partitions()[0].ghosts.get(0, DVec3::X).is_none());
    }

    #[test]
    fn test_coupled_run() {
        let mut run = coupled();
        let mass_before: f64 = run.partitions().iter().map(|p| p.engine.total().mass()).sum();
        let cycles = run.run_until(0.05, 100).unwrap();
        assert!(cycles > 0);
        assert_approx_eq!(f64, run.time(), 0.05, epsilon = 1e-12);
        for partition in run.partitions() {
            assert_eq!(partition.engine.time(), run.time());
        }
        let mass_after: f64 = run.partitions().iter().map(|p| p.engine.total().mass()).sum();
        assert_approx_eq!(f64, mass_before, mass_after, epsilon = 1e-10);
        // High pressure on the left pushes mass across the partition boundary
        assert!(run.partitions()[1].engine.total().mass() > 0.5);
    }

    #[test]
    fn test_bad_link() {
        let mut run = coupled();
        run.links[0].source = (1, 7);
        assert!(matches!(
            run.exchange(),
            Err(HydroError::InconsistentState { .. })
        ));
        assert!(matches!(
            run.run_until(1., 10),
            Err(HydroError::InconsistentState { .. })
        ));
        assert_eq!(run.partitions()[0].engine.cycle(), 0);
    }
}
