use common::{get_engine, get_policies, sod, sod_ic, CONFIG, FIXED_CONFIG, GAMMA};
use float_cmp::assert_approx_eq;
use glam::DVec3;
use mvmm_ale::{
    cell_updater::SimpleCellUpdater,
    mesh::{MeshBoundary, SegmentMesh},
    ComputationalCell, ConfigError, Engine, HydroError, Policies, Space,
};
use yaml_rust::YamlLoader;

mod common;

#[test]
fn test_single_cell() {
    let mesh = SegmentMesh::uniform(1, 0., 1., MeshBoundary::Walls);
    let mut engine = get_engine(FIXED_CONFIG, mesh, |_| {
        ComputationalCell::new(1., DVec3::ZERO, 1.)
    });
    let before = engine.total();
    let dt = engine.advance().expect("Error advancing engine!");

    assert_approx_eq!(f64, dt, 0.3 / GAMMA.sqrt(), epsilon = 1e-12);
    assert_approx_eq!(f64, engine.time(), dt);
    let after = engine.total();
    assert_approx_eq!(f64, after.mass(), before.mass(), epsilon = 1e-12);
    assert_approx_eq!(f64, after.momentum().x, 0., epsilon = 1e-12);
    assert_approx_eq!(f64, after.energy(), before.energy(), epsilon = 1e-12);
    assert_approx_eq!(f64, engine.cells()[0].pressure(), 1., epsilon = 1e-12);
}

#[test]
fn test_pressure_jump() {
    let mesh = SegmentMesh::uniform(2, 0., 1., MeshBoundary::Walls);
    let mut engine = get_engine(FIXED_CONFIG, mesh, |x| {
        let pressure = if x.x < 0.5 { 2. } else { 1. };
        ComputationalCell::new(1., DVec3::ZERO, pressure)
    });
    let before = engine.total();
    engine.advance().expect("Error advancing engine!");

    let extensives = engine.extensives();
    assert!(extensives[0].mass() < 0.5);
    assert!(extensives[1].mass() > 0.5);
    assert!(extensives[1].momentum().x > 0.);
    assert!(engine.cells()[1].velocity().x > 0.);
    let after = engine.total();
    assert_approx_eq!(f64, after.mass(), before.mass(), epsilon = 1e-12);
    assert_approx_eq!(f64, after.energy(), before.energy(), epsilon = 1e-12);
}

#[test]
fn test_time_monotonicity() {
    let mut engine = get_engine(CONFIG, sod(50), sod_ic);
    let mut elapsed = 0.;
    for cycle in 1..=10 {
        let previous = engine.time();
        let dt = engine.advance().expect("Error advancing engine!");
        assert!(dt > 0.);
        assert!(engine.time() > previous);
        assert_eq!(engine.cycle(), cycle);
        elapsed += dt;
    }
    assert_approx_eq!(f64, engine.time(), elapsed, epsilon = 1e-14);

    engine.advance_by(1e-4).expect("Error advancing engine!");
    assert_approx_eq!(f64, engine.time(), elapsed + 1e-4, epsilon = 1e-14);
}

#[test]
fn test_aborted_cycle() {
    let mut policies = get_policies(FIXED_CONFIG);
    policies.cell_updater = Box::new(SimpleCellUpdater::<SegmentMesh>::strict(vec![]));
    let mut engine = Engine::from_space(Space::from_ic(sod(16), sod_ic), policies)
        .expect("Error initializing engine!");
    let fields = engine.fields();
    let total = engine.total();

    assert!(matches!(
        engine.advance(),
        Err(HydroError::UnmatchedCell { .. })
    ));
    assert!(matches!(
        engine.advance_predictor_corrector(),
        Err(HydroError::UnmatchedCell { .. })
    ));
    assert!(matches!(
        engine.advance_by(0.),
        Err(HydroError::DegenerateTimeStep { .. })
    ));
    assert!(matches!(
        engine.advance_by(f64::NAN),
        Err(HydroError::DegenerateTimeStep { .. })
    ));

    assert_eq!(engine.time(), 0.);
    assert_eq!(engine.cycle(), 0);
    assert_eq!(engine.fields(), fields);
    assert_eq!(engine.total(), total);
}

#[test]
fn test_config_errors() {
    let load = |cfg: &str| YamlLoader::load_from_str(cfg).expect("Error loading cfg!");

    let cfg = &load("hydrodynamics:\n  gamma: 1.4\n  riemann_solver: \"Roe\"\ntime_integration:\n  cfl_criterion: 0.3")[0];
    assert!(matches!(
        Policies::<SegmentMesh>::init(cfg),
        Err(ConfigError::UnknownVariant { .. })
    ));

    let cfg = &load("hydrodynamics:\n  gamma: 1.4")[0];
    assert!(matches!(
        Policies::<SegmentMesh>::init(cfg),
        Err(ConfigError::MissingParameter(_))
    ));
}
