use glam::DVec3;
use log::{debug, trace};
use rayon::prelude::*;
use yaml_rust::Yaml;

use crate::{
    cell::{ComputationalCell, Extensive},
    cell_updater::{CellUpdater, SimpleCellUpdater},
    errors::ConfigError,
    extensive_updater::{ExtensiveUpdater, SimpleExtensiveUpdater},
    flux::{FluxCalculator, ModularFluxCalculator},
    gas_law::{EquationOfState, GasLaw},
    mesh::Tessellation,
    source_term::{self, SourceTerm},
    space::Space,
    timestep::{SimpleCfl, TimeStepFunction},
    vertex_motion::{self, VertexMotion},
    HydroError,
};

/// The interchangeable numerical strategies driven by the [`Engine`].
pub struct Policies<M: Tessellation> {
    pub eos: Box<dyn EquationOfState>,
    pub vertex_motion: Box<dyn VertexMotion<M>>,
    pub timestep: Box<dyn TimeStepFunction<M>>,
    pub flux_calculator: Box<dyn FluxCalculator<M>>,
    pub source_term: Box<dyn SourceTerm<M>>,
    pub extensive_updater: Box<dyn ExtensiveUpdater<M>>,
    pub cell_updater: Box<dyn CellUpdater<M>>,
}

impl<M: Tessellation> Policies<M> {
    /// Read the policies from the `hydrodynamics`, `vertex_motion`, `time_integration` and
    /// (optional) `gravity` sections of a configuration.
    pub fn init(cfg: &Yaml) -> Result<Self, ConfigError> {
        let hydro_cfg = &cfg["hydrodynamics"];
        let mut cell_updater = SimpleCellUpdater::default();
        if let Some(name) = hydro_cfg["entropy_tracer"].as_str() {
            cell_updater = cell_updater.with_entropy_tracer(name);
        }
        Ok(Self {
            eos: Box::new(GasLaw::init(hydro_cfg)?),
            vertex_motion: vertex_motion::from_config(&cfg["vertex_motion"])?,
            timestep: Box::new(SimpleCfl::init(&cfg["time_integration"])?),
            flux_calculator: Box::new(ModularFluxCalculator::from_config(hydro_cfg)?),
            source_term: source_term::from_config(cfg)?,
            extensive_updater: Box::new(SimpleExtensiveUpdater),
            cell_updater: Box::new(cell_updater),
        })
    }
}

/// Stages of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Predicting,
    Fluxing,
    Updating,
    Reconciling,
}

struct PhaseTracker {
    cycle: u64,
    phase: Phase,
}

impl PhaseTracker {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            phase: Phase::Idle,
        }
    }

    fn enter(&mut self, phase: Phase) {
        trace!("Cycle {}: {:?} -> {:?}", self.cycle, self.phase, phase);
        self.phase = phase;
    }
}

/// Owns the simulation state and advances it in time.
///
/// Every cycle runs on scratch copies of the mesh, the cells and the conserved totals; the
/// copies replace the committed state only after every policy succeeded. A failed cycle
/// leaves the engine exactly as it was.
pub struct Engine<M: Tessellation> {
    pub(crate) space: Space<M>,
    pub(crate) extensives: Vec<Extensive>,
    pub(crate) policies: Policies<M>,
    time: f64,
    cycle: u64,
}

impl<M: Tessellation> Engine<M> {
    pub fn new(
        mesh: M,
        cells: Vec<ComputationalCell>,
        policies: Policies<M>,
    ) -> Result<Self, HydroError> {
        Self::from_space(Space::new(mesh, cells)?, policies)
    }

    pub fn from_space(space: Space<M>, policies: Policies<M>) -> Result<Self, HydroError> {
        let extensives = space.extensives(policies.eos.as_ref())?;
        Ok(Self {
            space,
            extensives,
            policies,
            time: 0.,
            cycle: 0,
        })
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn mesh(&self) -> &M {
        &self.space.mesh
    }

    pub fn cells(&self) -> &[ComputationalCell] {
        &self.space.cells
    }

    pub fn extensives(&self) -> &[Extensive] {
        &self.extensives
    }

    pub fn policies(&self) -> &Policies<M> {
        &self.policies
    }

    pub fn vertex_positions(&self) -> Vec<DVec3> {
        self.space.mesh.vertex_positions()
    }

    /// Sum of all conserved totals.
    pub fn total(&self) -> Extensive {
        Extensive::sum(self.extensives.iter())
    }

    /// The time step the next [`Engine::advance`] would take.
    pub fn propose_timestep(&self) -> Result<f64, HydroError> {
        self.plan_step().map(|(_, dt)| dt)
    }

    /// Single stage cycle with the step chosen by the time step policy.
    pub fn advance(&mut self) -> Result<f64, HydroError> {
        let mut tracker = PhaseTracker::new(self.cycle);
        tracker.enter(Phase::Predicting);
        let (velocities, dt) = self.plan_step()?;
        self.advance_with(velocities, dt, tracker)
    }

    /// Single stage cycle with an imposed step.
    pub fn advance_by(&mut self, dt: f64) -> Result<f64, HydroError> {
        check_dt(dt)?;
        let mut tracker = PhaseTracker::new(self.cycle);
        tracker.enter(Phase::Predicting);
        let velocities = self.predict(&self.space, self.time)?;
        let velocities = self.regularize(&self.space.cells, velocities, dt)?;
        self.advance_with(velocities, dt, tracker)
    }

    /// Predictor-corrector cycle with the step chosen by the time step policy.
    pub fn advance_predictor_corrector(&mut self) -> Result<f64, HydroError> {
        let mut tracker = PhaseTracker::new(self.cycle);
        tracker.enter(Phase::Predicting);
        let (velocities, dt) = self.plan_step()?;
        self.advance_predictor_corrector_with(velocities, dt, tracker)
    }

    /// Predictor-corrector cycle with an imposed step.
    pub fn advance_predictor_corrector_by(&mut self, dt: f64) -> Result<f64, HydroError> {
        check_dt(dt)?;
        let mut tracker = PhaseTracker::new(self.cycle);
        tracker.enter(Phase::Predicting);
        let velocities = self.predict(&self.space, self.time)?;
        let velocities = self.regularize(&self.space.cells, velocities, dt)?;
        self.advance_predictor_corrector_with(velocities, dt, tracker)
    }

    fn predict(&self, space: &Space<M>, time: f64) -> Result<Vec<DVec3>, HydroError> {
        self.policies
            .vertex_motion
            .predict(&space.mesh, &space.cells, time)
    }

    /// Correct predicted velocities over the committed geometry for a step of `dt`.
    fn regularize(
        &self,
        cells: &[ComputationalCell],
        velocities: Vec<DVec3>,
        dt: f64,
    ) -> Result<Vec<DVec3>, HydroError> {
        self.policies
            .vertex_motion
            .regularize(&self.space.mesh, cells, self.time, dt, velocities)
    }

    /// Regularized vertex velocities and the step of the next cycle.
    ///
    /// The step proposed for the predicted velocities is checked again against the
    /// regularized ones and the smaller of both is kept.
    fn plan_step(&self) -> Result<(Vec<DVec3>, f64), HydroError> {
        let velocities = self.predict(&self.space, self.time)?;
        let provisional = self.compute_timestep(&velocities)?;
        let velocities = self.regularize(&self.space.cells, velocities, provisional)?;
        let dt = self.compute_timestep(&velocities)?.min(provisional);
        trace!("Planned step {dt:e} (provisional {provisional:e})");
        Ok((velocities, dt))
    }

    fn compute_timestep(&self, velocities: &[DVec3]) -> Result<f64, HydroError> {
        self.policies.timestep.compute(
            &self.space.mesh,
            &self.space.cells,
            self.policies.eos.as_ref(),
            velocities,
            self.time,
        )
    }

    /// Single stage with already regularized `velocities`.
    fn advance_with(
        &mut self,
        velocities: Vec<DVec3>,
        dt: f64,
        mut tracker: PhaseTracker,
    ) -> Result<f64, HydroError> {
        let (space, extensives) = self.stage(
            &self.space.cells,
            &velocities,
            &self.space,
            dt,
            &mut tracker,
        )?;
        self.commit(space, extensives, dt, tracker);
        Ok(dt)
    }

    fn advance_predictor_corrector_with(
        &mut self,
        velocities: Vec<DVec3>,
        dt: f64,
        mut tracker: PhaseTracker,
    ) -> Result<f64, HydroError> {
        // Predictor: half a step on scratch copies
        let half_dt = 0.5 * dt;
        let (midpoint, _) = self.stage(
            &self.space.cells,
            &velocities,
            &self.space,
            half_dt,
            &mut tracker,
        )?;

        // Corrector: fluxes of the midpoint state over the committed geometry
        tracker.enter(Phase::Predicting);
        let velocities = self.predict(&midpoint, self.time + half_dt)?;
        let velocities = self.regularize(&midpoint.cells, velocities, dt)?;
        let (space, extensives) = self.stage(
            &midpoint.cells,
            &velocities,
            &midpoint,
            dt,
            &mut tracker,
        )?;
        self.commit(space, extensives, dt, tracker);
        Ok(dt)
    }

    /// Update copies of the committed totals and geometry by `dt`.
    ///
    /// Fluxes are evaluated for `flux_cells` over the committed geometry, source terms for
    /// the state of `source_space`. The copied vertices move with `velocities`.
    fn stage(
        &self,
        flux_cells: &[ComputationalCell],
        velocities: &[DVec3],
        source_space: &Space<M>,
        dt: f64,
        tracker: &mut PhaseTracker,
    ) -> Result<(Space<M>, Vec<Extensive>), HydroError> {
        let policies = &self.policies;
        let eos = policies.eos.as_ref();
        let mesh = &self.space.mesh;

        tracker.enter(Phase::Fluxing);
        let fluxes =
            policies
                .flux_calculator
                .compute(mesh, flux_cells, velocities, eos, self.time, dt)?;

        tracker.enter(Phase::Updating);
        let mut extensives = self.extensives.clone();
        policies
            .extensive_updater
            .apply(&fluxes, mesh, flux_cells, dt, &mut extensives)?;
        self.add_sources(source_space, &mut extensives, self.time, dt)?;

        tracker.enter(Phase::Reconciling);
        let mut space = self.space.clone();
        space.move_vertices(velocities, dt);
        space.cells = policies.cell_updater.apply(
            &space.mesh,
            eos,
            &mut extensives,
            &self.space.cells,
            self.time + dt,
        )?;
        Ok((space, extensives))
    }

    fn add_sources(
        &self,
        source_space: &Space<M>,
        extensives: &mut [Extensive],
        time: f64,
        dt: f64,
    ) -> Result<(), HydroError> {
        let source_term = self.policies.source_term.as_ref();
        extensives
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(i, extensive)| {
                let rate = source_term.contribute(
                    &source_space.mesh,
                    &source_space.cells,
                    i,
                    time,
                    dt,
                )?;
                *extensive += &(dt * &rate);
                Ok(())
            })
    }

    fn commit(
        &mut self,
        space: Space<M>,
        extensives: Vec<Extensive>,
        dt: f64,
        mut tracker: PhaseTracker,
    ) {
        self.space = space;
        self.extensives = extensives;
        self.time += dt;
        self.cycle += 1;
        tracker.enter(Phase::Idle);
        debug!(
            "Committed cycle {} (dt = {:e}, t = {:e}, {} cells)",
            self.cycle,
            dt,
            self.time,
            self.extensives.len()
        );
    }

    /// Snapshot of the state as named flat sequences.
    pub fn fields(&self) -> Vec<(String, Vec<f64>)> {
        let dims = self.space.mesh.dimensionality().count();
        let axes = ["x", "y", "z"];
        let cells = &self.space.cells;
        let positions = self.vertex_positions();
        let mut fields = vec![];

        for (axis, name) in axes.iter().enumerate().take(dims) {
            fields.push((
                format!("position_{name}"),
                positions.iter().map(|x| x[axis]).collect(),
            ));
        }
        fields.push(("density".to_string(), cells.iter().map(|c| c.density()).collect()));
        fields.push(("pressure".to_string(), cells.iter().map(|c| c.pressure()).collect()));
        for (axis, name) in axes.iter().enumerate().take(dims) {
            fields.push((
                format!("velocity_{name}"),
                cells.iter().map(|c| c.velocity()[axis]).collect(),
            ));
        }
        let mut tracer_names: Vec<&String> = cells.iter().flat_map(|c| c.tracers.keys()).collect();
        tracer_names.sort();
        tracer_names.dedup();
        for name in tracer_names.iter() {
            fields.push((
                format!("tracer_{name}"),
                cells
                    .iter()
                    .map(|c| c.tracers.get(*name).copied().unwrap_or(0.))
                    .collect(),
            ));
        }
        let mut sticker_names: Vec<&String> = cells.iter().flat_map(|c| c.stickers.keys()).collect();
        sticker_names.sort();
        sticker_names.dedup();
        for name in sticker_names {
            fields.push((
                format!("sticker_{name}"),
                cells
                    .iter()
                    .map(|c| if c.has_sticker(name) { 1. } else { 0. })
                    .collect(),
            ));
        }

        let extensives = &self.extensives;
        fields.push(("mass".to_string(), extensives.iter().map(|e| e.mass()).collect()));
        for (axis, name) in axes.iter().enumerate().take(dims) {
            fields.push((
                format!("momentum_{name}"),
                extensives.iter().map(|e| e.momentum()[axis]).collect(),
            ));
        }
        fields.push(("energy".to_string(), extensives.iter().map(|e| e.energy()).collect()));
        for name in tracer_names {
            fields.push((
                format!("tracer_mass_{name}"),
                extensives
                    .iter()
                    .map(|e| e.tracers.get(name).copied().unwrap_or(0.))
                    .collect(),
            ));
        }
        fields
    }
}

fn check_dt(dt: f64) -> Result<(), HydroError> {
    if dt.is_finite() && dt > 0. {
        Ok(())
    } else {
        Err(HydroError::degenerate_timestep("imposed time step must be positive")
            .with_entry("Time step", dt))
    }
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;
    use yaml_rust::YamlLoader;

    use super::*;
    use crate::{
        mesh::{MeshBoundary, SegmentMesh},
        timestep::FixedTimeStep,
        vertex_motion::{Eulerian, VertexMotion},
    };

    const CONFIG: &str = r#"
hydrodynamics:
  gamma: 1.6666666666666667
  boundary: reflective
vertex_motion:
  kind: lagrangian
time_integration:
  cfl_criterion: 0.3
"#;

    fn policies() -> Policies<SegmentMesh> {
        let cfg = &YamlLoader::load_from_str(CONFIG).unwrap()[0];
        Policies::init(cfg).unwrap()
    }

    #[test]
    fn test_fields() {
        let mesh = SegmentMesh::uniform(2, 0., 1., MeshBoundary::Walls);
        let cells = vec![
            ComputationalCell::new(1., DVec3::X, 1.).with_tracer("dye", 1.),
            ComputationalCell::new(2., DVec3::ZERO, 1.).with_sticker("wall", true),
        ];
        let engine = Engine::new(mesh, cells, policies()).unwrap();
        let fields = engine.fields();
        let names: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "position_x",
                "density",
                "pressure",
                "velocity_x",
                "tracer_dye",
                "sticker_wall",
                "mass",
                "momentum_x",
                "energy",
                "tracer_mass_dye"
            ]
        );
        assert_eq!(fields[4].1, vec![1., 0.]);
        assert_eq!(fields[5].1, vec![0., 1.]);
        assert_approx_eq!(f64, fields[6].1[1], 1.);
        assert_approx_eq!(f64, fields[9].1[0], 0.5);
    }

    #[test]
    fn test_aborted_cycle() {
        let mesh = SegmentMesh::uniform(2, 0., 1., MeshBoundary::Walls);
        let cells = vec![ComputationalCell::new(1., DVec3::ZERO, 1.); 2];
        let mut policies = policies();
        policies.timestep = Box::new(FixedTimeStep(-1.));
        let mut engine = Engine::new(mesh, cells, policies).unwrap();
        let before = engine.extensives().to_vec();
        assert!(engine.advance().is_err());
        assert!(engine.advance_predictor_corrector_by(f64::NAN).is_err());
        assert_eq!(engine.time(), 0.);
        assert_eq!(engine.cycle(), 0);
        assert_eq!(engine.extensives(), &before[..]);

        let dt = engine.advance_by(1e-3).unwrap();
        assert_eq!(dt, 1e-3);
        assert_eq!(engine.cycle(), 1);
    }

    /// Predicts a mesh at rest, then drifts every vertex by a constant velocity.
    struct Drift(DVec3);

    impl VertexMotion<SegmentMesh> for Drift {
        fn predict(
            &self,
            mesh: &SegmentMesh,
            cells: &[ComputationalCell],
            time: f64,
        ) -> Result<Vec<DVec3>, HydroError> {
            Eulerian.predict(mesh, cells, time)
        }

        fn regularize(
            &self,
            _mesh: &SegmentMesh,
            _cells: &[ComputationalCell],
            _time: f64,
            _dt: f64,
            velocities: Vec<DVec3>,
        ) -> Result<Vec<DVec3>, HydroError> {
            Ok(velocities.iter().map(|_| self.0).collect())
        }
    }

    #[test]
    fn test_step_uses_regularized_velocities() {
        let mesh = SegmentMesh::uniform(4, 0., 1., MeshBoundary::Periodic);
        let cells = vec![ComputationalCell::new(1., DVec3::ZERO, 1.); 4];
        let mut policies = policies();
        policies.vertex_motion = Box::new(Drift(10. * DVec3::X));
        let mut engine = Engine::new(mesh, cells, policies).unwrap();
        let c = (5f64 / 3.).sqrt();
        let expected = 0.3 * 0.25 / (c + 10.);
        assert_approx_eq!(f64, engine.propose_timestep().unwrap(), expected, epsilon = 1e-12);
        let dt = engine.advance().unwrap();
        assert_approx_eq!(f64, dt, expected, epsilon = 1e-12);
        assert_approx_eq!(f64, engine.vertex_positions()[0].x, 0.125 + 10. * dt, epsilon = 1e-12);
    }

    #[test]
    fn test_quiescent_cycle() {
        let mesh = SegmentMesh::uniform(2, 0., 1., MeshBoundary::Walls);
        let cells = vec![ComputationalCell::new(1., DVec3::ZERO, 0.); 2];
        let mut policies = policies();
        policies.vertex_motion = Box::new(Eulerian);
        let mut engine = Engine::new(mesh, cells, policies).unwrap();
        let dt = engine.advance().unwrap();
        assert_approx_eq!(f64, dt, 0.3 * 0.5);
        assert_eq!(engine.cycle(), 1);
        assert_eq!(engine.cells()[0].velocity(), DVec3::ZERO);
    }

    #[test]
    fn test_inconsistent_construction() {
        let mesh = SegmentMesh::uniform(3, 0., 1., MeshBoundary::Walls);
        let cells = vec![ComputationalCell::new(1., DVec3::ZERO, 1.); 2];
        assert!(matches!(
            Engine::new(mesh, cells, policies()),
            Err(HydroError::InconsistentState { .. })
        ));
    }
}
