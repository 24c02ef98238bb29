use std::borrow::Cow;

use glam::DVec3;
use rayon::prelude::*;
use yaml_rust::Yaml;

use crate::{
    cell::{ComputationalCell, Extensive, Tracers},
    errors::{ConfigError, Diagnostics},
    gas_law::EquationOfState,
    mesh::{Face, Tessellation},
    physical_quantities::{Conserved, State},
    reconstruction::{
        interpolate, reconstruction_from_config, Gradients, PiecewiseConstant,
        SpatialReconstruction,
    },
    riemann_solver::{riemann_solver_from_config, HLLCRiemannSolver, RiemannFluxSolver},
    HydroError,
};

/// Computes one flux per mesh face.
///
/// Fluxes are oriented from the left cell of a face to its right cell (or outward for
/// boundary faces), are already multiplied by the face area and are rates: the caller scales
/// them by the time step.
pub trait FluxCalculator<M: Tessellation>: Send + Sync {
    fn compute(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        vertex_velocities: &[DVec3],
        eos: &dyn EquationOfState,
        time: f64,
        dt: f64,
    ) -> Result<Vec<Extensive>, HydroError>;
}

/// Everything a face rule may inspect.
pub struct FaceContext<'a, M> {
    pub index: usize,
    pub face: &'a Face,
    pub mesh: &'a M,
    /// Cell averages
    pub cells: &'a [ComputationalCell],
    pub eos: &'a dyn EquationOfState,
    pub face_velocity: DVec3,
    pub time: f64,
    left_state: Cow<'a, ComputationalCell>,
    right_state: Option<Cow<'a, ComputationalCell>>,
}

impl<'a, M: Tessellation> FaceContext<'a, M> {
    /// Context of `face` with the cell states interpolated to its centroid.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        face: &'a Face,
        mesh: &'a M,
        cells: &'a [ComputationalCell],
        gradients: Option<&[Gradients]>,
        eos: &'a dyn EquationOfState,
        face_velocity: DVec3,
        time: f64,
    ) -> Self {
        let left = &cells[face.left()];
        let right = face.right().map(|right| &cells[right]);
        let (left_state, right_state) = match gradients {
            None => (Cow::Borrowed(left), right.map(Cow::Borrowed)),
            Some(gradients) => {
                let shift = face.shift().unwrap_or(DVec3::ZERO);
                let left_state = interpolate(
                    left,
                    &gradients[face.left()],
                    face.centroid() - mesh.cell_centroid(face.left()),
                );
                let right_state = face.right().map(|right| {
                    Cow::Owned(interpolate(
                        &cells[right],
                        &gradients[right],
                        face.centroid() - shift - mesh.cell_centroid(right),
                    ))
                });
                (Cow::Owned(left_state), right_state)
            }
        };
        Self {
            index,
            face,
            mesh,
            cells,
            eos,
            face_velocity,
            time,
            left_state,
            right_state,
        }
    }
}

impl<'a, M> FaceContext<'a, M> {
    /// State of the left cell at the face.
    pub fn left(&self) -> &ComputationalCell {
        &self.left_state
    }

    /// State of the right cell at the face, `None` on the domain boundary.
    pub fn right(&self) -> Option<&ComputationalCell> {
        self.right_state.as_deref()
    }
}

pub trait FaceCondition<M>: Send + Sync {
    fn test(&self, ctx: &FaceContext<M>) -> bool;
}

pub trait FaceAction<M>: Send + Sync {
    fn flux(&self, ctx: &FaceContext<M>) -> Result<Extensive, HydroError>;
}

/// Velocity of a face between two moving vertices (Springel (2010), eq. 33).
///
/// Faces on the domain boundary are static.
pub fn face_velocity<M: Tessellation>(mesh: &M, face: &Face, vertex_velocities: &[DVec3]) -> DVec3 {
    let Some(right) = face.right() else {
        return DVec3::ZERO;
    };
    let left = face.left();
    let shift = face.shift().unwrap_or(DVec3::ZERO);
    let x_left = mesh.vertex_position(left);
    let x_right = mesh.vertex_position(right) + shift;
    let dx = x_right - x_left;
    let (w_left, w_right) = (vertex_velocities[left], vertex_velocities[right]);
    let midpoint = 0.5 * (x_left + x_right);
    let fac = (w_right - w_left).dot(face.centroid() - midpoint) / dx.length_squared();
    0.5 * (w_left + w_right) - fac * dx
}

/// Tracer fluxes carried by `mass_flux`, using the fractions of the upwind cell.
pub fn upwind_tracers(
    mass_flux: f64,
    left: &ComputationalCell,
    right: &ComputationalCell,
) -> Tracers {
    let upwind = if mass_flux >= 0. { left } else { right };
    left.tracers
        .keys()
        .chain(right.tracers.keys())
        .map(|name| {
            let fraction = upwind.tracers.get(name).copied().unwrap_or(0.);
            (name.clone(), mass_flux * fraction)
        })
        .collect()
}

fn to_extensive(
    conserved: State<Conserved>,
    area: f64,
    left: &ComputationalCell,
    right: &ComputationalCell,
) -> Extensive {
    let conserved = area * conserved;
    Extensive {
        tracers: upwind_tracers(conserved.mass(), left, right),
        conserved,
    }
}

fn zero_flux(left: &ComputationalCell, right: Option<&ComputationalCell>) -> Extensive {
    Extensive {
        conserved: State::vacuum(),
        tracers: left
            .tracers
            .keys()
            .chain(right.into_iter().flat_map(|cell| cell.tracers.keys()))
            .map(|name| (name.clone(), 0.))
            .collect(),
    }
}

/// Solve the Riemann problem between `left` and `right` in the frame of the face.
pub(crate) fn riemann_flux<M>(
    solver: &dyn RiemannFluxSolver,
    ctx: &FaceContext<M>,
    left: &ComputationalCell,
    right: &ComputationalCell,
) -> Result<Extensive, HydroError> {
    let v_face = ctx.face_velocity;
    let conserved = solver.solve_for_flux(
        &left.primitives.boost(-v_face),
        &right.primitives.boost(-v_face),
        v_face,
        ctx.face.normal(),
        ctx.eos,
        (&left.tracers, &right.tracers),
    )?;
    Ok(to_extensive(conserved, ctx.face.area(), left, right))
}

/// Matches faces on the domain boundary.
pub struct IsBoundaryFace;

impl<M> FaceCondition<M> for IsBoundaryFace {
    fn test(&self, ctx: &FaceContext<M>) -> bool {
        ctx.face.is_boundary()
    }
}

/// Matches faces between two cells.
pub struct IsBulkFace;

impl<M> FaceCondition<M> for IsBulkFace {
    fn test(&self, ctx: &FaceContext<M>) -> bool {
        !ctx.face.is_boundary()
    }
}

/// Matches interior faces where at least one side carries the sticker.
pub struct IsStickerInterface(pub String);

impl<M> FaceCondition<M> for IsStickerInterface {
    fn test(&self, ctx: &FaceContext<M>) -> bool {
        match ctx.right() {
            Some(right) => ctx.left().has_sticker(&self.0) || right.has_sticker(&self.0),
            None => false,
        }
    }
}

pub struct Always;

impl<M> FaceCondition<M> for Always {
    fn test(&self, _ctx: &FaceContext<M>) -> bool {
        true
    }
}

/// Two-state Riemann solve between the cells on either side of an interior face.
pub struct RiemannFlux(pub Box<dyn RiemannFluxSolver>);

impl<M> FaceAction<M> for RiemannFlux {
    fn flux(&self, ctx: &FaceContext<M>) -> Result<Extensive, HydroError> {
        let left = ctx.left();
        let right = ctx.right().unwrap_or(left);
        riemann_flux(self.0.as_ref(), ctx, left, right)
    }
}

/// Mirror image of `cell` across the face, taken in the frame of the moving face.
fn mirror<M>(ctx: &FaceContext<M>, cell: &ComputationalCell) -> ComputationalCell {
    cell.reflect_in_frame(ctx.face.normal(), ctx.face_velocity)
}

/// A reflecting wall: the ghost state is the interior state with its normal velocity reversed.
pub struct RigidWallFlux(pub Box<dyn RiemannFluxSolver>);

impl<M> FaceAction<M> for RigidWallFlux {
    fn flux(&self, ctx: &FaceContext<M>) -> Result<Extensive, HydroError> {
        let interior = ctx.left();
        riemann_flux(self.0.as_ref(), ctx, interior, &mirror(ctx, interior))
    }
}

/// Zero-gradient outflow: the ghost state is a copy of the interior state.
pub struct FreeFlowFlux(pub Box<dyn RiemannFluxSolver>);

impl<M> FaceAction<M> for FreeFlowFlux {
    fn flux(&self, ctx: &FaceContext<M>) -> Result<Extensive, HydroError> {
        let interior = ctx.left();
        riemann_flux(self.0.as_ref(), ctx, interior, interior)
    }
}

/// Inflow or vacuum boundary with a prescribed ghost state.
pub struct ConstantStateFlux {
    pub solver: Box<dyn RiemannFluxSolver>,
    pub ghost: ComputationalCell,
}

impl<M> FaceAction<M> for ConstantStateFlux {
    fn flux(&self, ctx: &FaceContext<M>) -> Result<Extensive, HydroError> {
        riemann_flux(self.solver.as_ref(), ctx, ctx.left(), &self.ghost)
    }
}

/// Interface between a fluid cell and a solid region marked by the sticker.
///
/// The fluid side sees its own reflection in the frame of the face; two solid cells exchange
/// nothing.
pub struct WallInterfaceFlux {
    pub solver: Box<dyn RiemannFluxSolver>,
    pub sticker: String,
}

impl<M> FaceAction<M> for WallInterfaceFlux {
    fn flux(&self, ctx: &FaceContext<M>) -> Result<Extensive, HydroError> {
        let left = ctx.left();
        let Some(right) = ctx.right() else {
            return riemann_flux(self.solver.as_ref(), ctx, left, &mirror(ctx, left));
        };
        match (left.has_sticker(&self.sticker), right.has_sticker(&self.sticker)) {
            (false, true) => riemann_flux(self.solver.as_ref(), ctx, left, &mirror(ctx, left)),
            (true, false) => riemann_flux(self.solver.as_ref(), ctx, &mirror(ctx, right), right),
            (true, true) => Ok(zero_flux(left, Some(right))),
            (false, false) => riemann_flux(self.solver.as_ref(), ctx, left, right),
        }
    }
}

pub struct ZeroFlux;

impl<M> FaceAction<M> for ZeroFlux {
    fn flux(&self, ctx: &FaceContext<M>) -> Result<Extensive, HydroError> {
        Ok(zero_flux(ctx.left(), ctx.right()))
    }
}

pub type FaceRule<M> = (Box<dyn FaceCondition<M>>, Box<dyn FaceAction<M>>);

/// Flux calculator driven by an ordered list of face rules. The first matching rule computes
/// the flux of a face.
///
/// The rules see the cell states reconstructed at the face centroid, piecewise constant
/// unless another [`SpatialReconstruction`] is installed.
pub struct ModularFluxCalculator<M> {
    rules: Vec<FaceRule<M>>,
    reconstruction: Box<dyn SpatialReconstruction<M>>,
}

impl<M: Tessellation> ModularFluxCalculator<M> {
    pub fn new(rules: Vec<FaceRule<M>>) -> Self {
        Self {
            rules,
            reconstruction: Box::new(PiecewiseConstant),
        }
    }

    pub fn with_reconstruction(mut self, reconstruction: Box<dyn SpatialReconstruction<M>>) -> Self {
        self.reconstruction = reconstruction;
        self
    }

    /// Riemann fluxes between cells and the given action on the domain boundary.
    pub fn standard(solver: Box<dyn RiemannFluxSolver>, boundary: Box<dyn FaceAction<M>>) -> Self {
        Self::new(vec![
            (Box::new(IsBoundaryFace), boundary),
            (Box::new(IsBulkFace), Box::new(RiemannFlux(solver))),
        ])
    }

    /// Builds the standard rule sequence from the `boundary` and `riemann_solver` keys, with
    /// the reconstruction named by the `reconstruction` key.
    pub fn from_config(cfg: &Yaml) -> Result<Self, ConfigError> {
        let boundary: Box<dyn FaceAction<M>> =
            match cfg["boundary"].as_str().unwrap_or("reflective") {
                "reflective" => Box::new(RigidWallFlux(riemann_solver_from_config(cfg)?)),
                "open" => Box::new(FreeFlowFlux(riemann_solver_from_config(cfg)?)),
                "vacuum" => Box::new(ConstantStateFlux {
                    solver: riemann_solver_from_config(cfg)?,
                    ghost: ComputationalCell::default(),
                }),
                name => {
                    return Err(ConfigError::UnknownVariant {
                        kind: "boundary condition",
                        name: name.to_string(),
                    })
                }
            };
        Ok(Self::standard(riemann_solver_from_config(cfg)?, boundary)
            .with_reconstruction(reconstruction_from_config(cfg)?))
    }

    /// Add a rule with the highest priority.
    pub fn prepend(mut self, condition: Box<dyn FaceCondition<M>>, action: Box<dyn FaceAction<M>>) -> Self {
        self.rules.insert(0, (condition, action));
        self
    }

    pub fn push(mut self, condition: Box<dyn FaceCondition<M>>, action: Box<dyn FaceAction<M>>) -> Self {
        self.rules.push((condition, action));
        self
    }
}

impl<M: Tessellation> Default for ModularFluxCalculator<M> {
    fn default() -> Self {
        Self::standard(
            Box::new(HLLCRiemannSolver),
            Box::new(RigidWallFlux(Box::new(HLLCRiemannSolver))),
        )
    }
}

impl<M: Tessellation> FluxCalculator<M> for ModularFluxCalculator<M> {
    fn compute(
        &self,
        mesh: &M,
        cells: &[ComputationalCell],
        vertex_velocities: &[DVec3],
        eos: &dyn EquationOfState,
        time: f64,
        _dt: f64,
    ) -> Result<Vec<Extensive>, HydroError> {
        let gradients = self.reconstruction.gradients(mesh, cells);
        mesh.faces()
            .par_iter()
            .enumerate()
            .map(|(index, face)| {
                let ctx = FaceContext::new(
                    index,
                    face,
                    mesh,
                    cells,
                    gradients.as_deref(),
                    eos,
                    face_velocity(mesh, face, vertex_velocities),
                    time,
                );
                let Some((_, action)) = self.rules.iter().find(|(condition, _)| condition.test(&ctx))
                else {
                    return Err(HydroError::UnmatchedFace {
                        face: index,
                        context: Diagnostics::new()
                            .entry("Face area", face.area())
                            .entry("Left cell", face.left() as f64),
                    });
                };
                let flux = action
                    .flux(&ctx)
                    .map_err(|err| err.with_entry("Face index", index as f64))?;
                debug_assert!(flux.is_finite());
                Ok(flux)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;

    use super::*;
    use crate::{
        gas_law::GasLaw,
        mesh::{MeshBoundary, SegmentMesh},
        reconstruction::LinearReconstruction,
    };

    const GAMMA: f64 = 5. / 3.;

    #[test]
    fn test_face_velocity() {
        let mesh = SegmentMesh::new(vec![0.25, 0.75], 0., 1., MeshBoundary::Walls);
        let velocities = [DVec3::new(0.2, 0., 0.), DVec3::new(-0.4, 0., 0.)];
        // Midpoint face moves with the mean vertex velocity
        let v = face_velocity(&mesh, mesh.face(1), &velocities);
        assert_approx_eq!(f64, v.x, -0.1);
        assert_eq!(face_velocity(&mesh, mesh.face(0), &velocities), DVec3::ZERO);
    }

    #[test]
    fn test_flux_antisymmetry() {
        // Mirror the problem: the flux must flip sign
        let eos = GasLaw::ideal(GAMMA);
        let calculator = ModularFluxCalculator::<SegmentMesh>::default();
        let mesh = SegmentMesh::new(vec![0.25, 0.75], 0., 1., MeshBoundary::Walls);
        let cells = vec![
            ComputationalCell::new(1., 0.3 * DVec3::X, 1.).with_tracer("dye", 1.),
            ComputationalCell::new(0.5, -0.1 * DVec3::X, 0.2).with_tracer("dye", 0.),
        ];
        let mirrored: Vec<_> = cells.iter().rev().map(|c| c.reflect(DVec3::X)).collect();
        let velocities = vec![DVec3::ZERO; 2];
        let fluxes = calculator
            .compute(&mesh, &cells, &velocities, &eos, 0., 0.1)
            .unwrap();
        let fluxes_mirrored = calculator
            .compute(&mesh, &mirrored, &velocities, &eos, 0., 0.1)
            .unwrap();
        assert_eq!(fluxes.len(), 3);
        let (f, g) = (&fluxes[1], &fluxes_mirrored[1]);
        assert_approx_eq!(f64, f.mass(), -g.mass());
        assert_approx_eq!(f64, f.momentum().x, g.momentum().x);
        assert_approx_eq!(f64, f.energy(), -g.energy());
        assert!(f.mass() > 0.);
        // Dye is carried from the upwind (left) cell
        assert_approx_eq!(f64, f.tracers["dye"], f.mass());
        assert_approx_eq!(f64, g.tracers["dye"], g.mass());
    }

    #[test]
    fn test_boundary_rules() {
        let eos = GasLaw::ideal(GAMMA);
        let mesh = SegmentMesh::uniform(1, 0., 1., MeshBoundary::Walls);
        let cells = vec![ComputationalCell::new(1., DVec3::ZERO, 1.)];
        let velocities = vec![DVec3::ZERO];
        let calculator = ModularFluxCalculator::<SegmentMesh>::default();
        let fluxes = calculator
            .compute(&mesh, &cells, &velocities, &eos, 0., 0.1)
            .unwrap();
        // Pressure pushes outward on both walls
        assert_eq!(fluxes[0].mass(), 0.);
        assert_approx_eq!(f64, fluxes[0].momentum().x, -1.);
        assert_approx_eq!(f64, fluxes[1].momentum().x, 1.);

        let cfg = yaml_rust::YamlLoader::load_from_str("boundary: vacuum").unwrap();
        let calculator = ModularFluxCalculator::<SegmentMesh>::from_config(&cfg[0]).unwrap();
        let fluxes = calculator
            .compute(&mesh, &cells, &velocities, &eos, 0., 0.1)
            .unwrap();
        assert!(fluxes[1].mass() > 0.);
        assert!(fluxes[0].mass() > 0.);
    }

    #[test]
    fn test_unmatched_face() {
        let eos = GasLaw::ideal(GAMMA);
        let mesh = SegmentMesh::uniform(2, 0., 1., MeshBoundary::Walls);
        let cells = vec![ComputationalCell::new(1., DVec3::ZERO, 1.); 2];
        let calculator = ModularFluxCalculator::<SegmentMesh>::new(vec![(
            Box::new(IsBulkFace),
            Box::new(ZeroFlux),
        )]);
        let result = calculator.compute(&mesh, &cells, &[DVec3::ZERO; 2], &eos, 0., 0.1);
        assert!(matches!(result, Err(HydroError::UnmatchedFace { .. })));
    }

    #[test]
    fn test_sticker_interface() {
        let eos = GasLaw::ideal(GAMMA);
        let mesh = SegmentMesh::uniform(2, 0., 1., MeshBoundary::Walls);
        let cells = vec![
            ComputationalCell::new(1., 0.5 * DVec3::X, 1.),
            ComputationalCell::new(1., DVec3::ZERO, 1.).with_sticker("solid", true),
        ];
        let calculator = ModularFluxCalculator::<SegmentMesh>::default().prepend(
            Box::new(IsStickerInterface("solid".to_string())),
            Box::new(WallInterfaceFlux {
                solver: Box::new(HLLCRiemannSolver),
                sticker: "solid".to_string(),
            }),
        );
        let fluxes = calculator
            .compute(&mesh, &cells, &[DVec3::ZERO; 2], &eos, 0., 0.1)
            .unwrap();
        // No mass enters the solid, the fluid is pushed back
        assert_approx_eq!(f64, fluxes[1].mass(), 0., epsilon = 1e-12);
        assert!(fluxes[1].momentum().x > 1.);
    }

    #[test]
    fn test_sticker_interface_moving_face() {
        let eos = GasLaw::ideal(GAMMA);
        let mesh = SegmentMesh::uniform(2, 0., 1., MeshBoundary::Walls);
        let cells = vec![
            ComputationalCell::new(1., 0.5 * DVec3::X, 1.),
            ComputationalCell::new(1., DVec3::ZERO, 1.).with_sticker("solid", true),
        ];
        let calculator = ModularFluxCalculator::<SegmentMesh>::default().prepend(
            Box::new(IsStickerInterface("solid".to_string())),
            Box::new(WallInterfaceFlux {
                solver: Box::new(HLLCRiemannSolver),
                sticker: "solid".to_string(),
            }),
        );
        // The interface moves with the fluid, so the fluid is at rest relative to it
        let velocities = [DVec3::new(0.5, 0., 0.), DVec3::new(0.5, 0., 0.)];
        let fluxes = calculator
            .compute(&mesh, &cells, &velocities, &eos, 0., 0.1)
            .unwrap();
        assert_approx_eq!(f64, fluxes[1].mass(), 0., epsilon = 1e-12);
        // Only pressure work remains
        assert_approx_eq!(f64, fluxes[1].momentum().x, 1., epsilon = 1e-12);
        assert_approx_eq!(f64, fluxes[1].energy(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_reconstruction_fluxes() {
        let eos = GasLaw::ideal(GAMMA);
        let mesh = SegmentMesh::uniform(4, 0., 1., MeshBoundary::Walls);
        let cells: Vec<_> = (0..4)
            .map(|i| ComputationalCell::new(1., DVec3::ZERO, 1. + i as f64))
            .collect();
        let velocities = vec![DVec3::ZERO; 4];
        let constant = ModularFluxCalculator::<SegmentMesh>::default();
        let linear = ModularFluxCalculator::<SegmentMesh>::default()
            .with_reconstruction(Box::new(LinearReconstruction { limit: false }));
        let first = constant
            .compute(&mesh, &cells, &velocities, &eos, 0., 0.1)
            .unwrap();
        let second = linear
            .compute(&mesh, &cells, &velocities, &eos, 0., 0.1)
            .unwrap();
        // A pressure ramp is continuous at the interior faces once reconstructed: no mass
        // moves and the momentum flux is the pressure at the face
        for face in 1..4 {
            assert!(first[face].mass().abs() > 1e-3);
            assert_approx_eq!(f64, second[face].mass(), 0., epsilon = 1e-12);
            assert_approx_eq!(f64, second[face].momentum().x, face as f64 + 0.5, epsilon = 1e-12);
        }
    }
}
