use common::{get_engine, get_mesh, CONFIG, MESH_CONFIG};
use float_cmp::assert_approx_eq;
use glam::DVec3;
use mvmm_ale::{mesh::SegmentMesh, ComputationalCell, Engine};

mod common;

fn get_engine_boosted(v: DVec3) -> Engine<SegmentMesh> {
    get_engine(CONFIG, get_mesh(MESH_CONFIG), |x| {
        let pressure = if (0.4..0.6).contains(&x.x) { 10. } else { 1. };
        ComputationalCell::new(1., v, pressure)
    })
}

#[test]
fn test_invariance() {
    let v = DVec3::new(0.7, 0., 0.);
    let mut engine = get_engine_boosted(DVec3::ZERO);
    let mut engine_boosted = get_engine_boosted(v);

    for _ in 0..20 {
        let dt = engine.advance().expect("Error advancing engine!");
        let dt_boosted = engine_boosted.advance().expect("Error advancing engine!");
        assert_approx_eq!(f64, dt, dt_boosted, epsilon = 1e-12);
    }

    for (cell, cell_boosted) in engine.cells().iter().zip(engine_boosted.cells()) {
        assert_approx_eq!(f64, cell.density(), cell_boosted.density(), epsilon = 1e-9);
        assert_approx_eq!(f64, cell.pressure(), cell_boosted.pressure(), epsilon = 1e-9);
        assert_approx_eq!(
            f64,
            cell.velocity().x + v.x,
            cell_boosted.velocity().x,
            epsilon = 1e-9
        );
    }
}
