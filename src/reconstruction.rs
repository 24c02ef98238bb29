//! Interpolation of cell states to face centroids before the face rules see them.

use glam::{DMat3, DVec3};
use rayon::prelude::*;
use yaml_rust::Yaml;

use crate::{
    cell::ComputationalCell,
    errors::ConfigError,
    mesh::{Face, Tessellation},
    physical_quantities::Primitives,
    Dimensionality,
};

/// Spatial derivatives of density, the three velocity components and pressure.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gradients([DVec3; 5]);

impl Gradients {
    pub fn new(density: DVec3, velocity: [DVec3; 3], pressure: DVec3) -> Self {
        Self([density, velocity[0], velocity[1], velocity[2], pressure])
    }

    pub fn density(&self) -> DVec3 {
        self.0[0]
    }

    /// Gradient of the velocity component along `axis`.
    pub fn velocity(&self, axis: usize) -> DVec3 {
        self.0[1 + axis]
    }

    pub fn pressure(&self) -> DVec3 {
        self.0[4]
    }

    /// Change of the primitives over the displacement `dx`.
    pub fn dot(&self, dx: DVec3) -> Primitives {
        from_components(self.0.map(|gradient| gradient.dot(dx)))
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|gradient| gradient.is_finite())
    }
}

fn components(primitives: &Primitives) -> [f64; 5] {
    let v = primitives.velocity();
    [primitives.density(), v.x, v.y, v.z, primitives.pressure()]
}

fn from_components(q: [f64; 5]) -> Primitives {
    Primitives::new(q[0], DVec3::new(q[1], q[2], q[3]), q[4])
}

/// Estimates the gradients of every cell from its neighbours.
pub trait SpatialReconstruction<M: Tessellation>: Send + Sync {
    /// `None` keeps every cell piecewise constant.
    fn gradients(&self, mesh: &M, cells: &[ComputationalCell]) -> Option<Vec<Gradients>>;
}

/// First order: faces see the cell averages.
pub struct PiecewiseConstant;

impl<M: Tessellation> SpatialReconstruction<M> for PiecewiseConstant {
    fn gradients(&self, _mesh: &M, _cells: &[ComputationalCell]) -> Option<Vec<Gradients>> {
        None
    }
}

/// Weighted least squares gradients from the centroids of neighbouring cells, optionally
/// scaled down so that no face value leaves the range spanned by the cell and its
/// neighbours.
pub struct LinearReconstruction {
    pub limit: bool,
}

impl Default for LinearReconstruction {
    fn default() -> Self {
        Self { limit: true }
    }
}

impl LinearReconstruction {
    /// The neighbour across `face` and its centroid in the frame of `cell`.
    fn neighbour<M: Tessellation>(mesh: &M, face: &Face, cell: usize) -> Option<(usize, DVec3)> {
        let other = face.other(cell)?;
        let shift = face.shift().unwrap_or(DVec3::ZERO);
        let shift = if face.left() == cell { shift } else { -shift };
        Some((other, mesh.cell_centroid(other) + shift))
    }

    /// Centroid of `face` in the frame of `cell`.
    fn face_centroid(face: &Face, cell: usize) -> DVec3 {
        if face.left() == cell {
            face.centroid()
        } else {
            face.centroid() - face.shift().unwrap_or(DVec3::ZERO)
        }
    }

    fn estimate<M: Tessellation>(mesh: &M, cells: &[ComputationalCell], index: usize) -> Gradients {
        // Unused directions get a unit diagonal so the matrix stays invertible
        let mut matrix_wls = match mesh.dimensionality() {
            Dimensionality::OneD => DMat3::from_diagonal(DVec3::new(0., 1., 1.)),
            Dimensionality::TwoD => DMat3::from_diagonal(DVec3::new(0., 0., 1.)),
            Dimensionality::ThreeD => DMat3::ZERO,
        };
        let centroid = mesh.cell_centroid(index);
        let q = components(&cells[index].primitives);
        let mut sums = [DVec3::ZERO; 5];
        for &face_idx in mesh.faces_of(index) {
            let face = mesh.face(face_idx);
            let Some((other, other_centroid)) = Self::neighbour(mesh, face, index) else {
                continue;
            };
            let ds = other_centroid - centroid;
            let distance2 = ds.length_squared();
            if distance2 == 0. {
                continue;
            }
            let w = face.area() / distance2;
            let q_other = components(&cells[other].primitives);
            for (sum, (q_l, q_r)) in sums.iter_mut().zip(q.iter().zip(q_other)) {
                *sum += w * (q_r - q_l) * ds;
            }
            matrix_wls += DMat3::from_cols(w * ds.x * ds, w * ds.y * ds, w * ds.z * ds);
        }
        if matrix_wls.determinant() == 0. {
            return Gradients::default();
        }
        let inverse = matrix_wls.inverse();
        Gradients(sums.map(|sum| inverse.mul_vec3(sum)))
    }

    fn limit<M: Tessellation>(
        mesh: &M,
        cells: &[ComputationalCell],
        index: usize,
        gradients: Gradients,
    ) -> Gradients {
        let centroid = mesh.cell_centroid(index);
        let q = components(&cells[index].primitives);
        let (mut min, mut max) = (q, q);
        let mut e_min = [f64::INFINITY; 5];
        let mut e_max = [f64::NEG_INFINITY; 5];
        for &face_idx in mesh.faces_of(index) {
            let face = mesh.face(face_idx);
            let extrapolated = components(&gradients.dot(Self::face_centroid(face, index) - centroid));
            for k in 0..5 {
                e_min[k] = e_min[k].min(extrapolated[k]);
                e_max[k] = e_max[k].max(extrapolated[k]);
            }
            if let Some((other, _)) = Self::neighbour(mesh, face, index) {
                let q_other = components(&cells[other].primitives);
                for k in 0..5 {
                    min[k] = min[k].min(q_other[k]);
                    max[k] = max[k].max(q_other[k]);
                }
            }
        }

        let mut limited = gradients.0;
        for k in 0..5 {
            limited[k] *= limiter_alpha(max[k] - q[k], min[k] - q[k], e_max[k], e_min[k]);
        }
        Gradients(limited)
    }
}

/// Largest fraction of the gradient whose extrapolations `e_min..e_max` stay inside the
/// allowed deviations `min..max`.
fn limiter_alpha(max: f64, min: f64, e_max: f64, e_min: f64) -> f64 {
    let alpha_max = if e_max > 0. { max / e_max } else { 1. };
    let alpha_min = if e_min < 0. { min / e_min } else { 1. };
    alpha_max.min(alpha_min).clamp(0., 1.)
}

impl<M: Tessellation> SpatialReconstruction<M> for LinearReconstruction {
    fn gradients(&self, mesh: &M, cells: &[ComputationalCell]) -> Option<Vec<Gradients>> {
        let gradients: Vec<Gradients> = (0..cells.len())
            .into_par_iter()
            .map(|index| {
                let gradients = Self::estimate(mesh, cells, index);
                let gradients = if self.limit {
                    Self::limit(mesh, cells, index, gradients)
                } else {
                    gradients
                };
                if gradients.is_finite() {
                    gradients
                } else {
                    Gradients::default()
                }
            })
            .collect();
        Some(gradients)
    }
}

/// The state of `cell` displaced by `dx` from its centroid.
///
/// Falls back to the cell average when the interpolated density or pressure is not positive.
pub fn interpolate(cell: &ComputationalCell, gradients: &Gradients, dx: DVec3) -> ComputationalCell {
    let primitives = cell.primitives + gradients.dot(dx);
    if cell.density() <= 0.
        || !primitives.is_finite()
        || primitives.density() <= 0.
        || primitives.pressure() <= 0.
    {
        return cell.clone();
    }
    ComputationalCell {
        primitives,
        ..cell.clone()
    }
}

/// Reads the `reconstruction` key: `constant` (the default) or `linear`, the latter with an
/// optional `slope_limiter` flag.
pub fn reconstruction_from_config<M: Tessellation>(
    cfg: &Yaml,
) -> Result<Box<dyn SpatialReconstruction<M>>, ConfigError> {
    match cfg["reconstruction"].as_str().unwrap_or("constant") {
        "constant" => Ok(Box::new(PiecewiseConstant)),
        "linear" => Ok(Box::new(LinearReconstruction {
            limit: cfg["slope_limiter"].as_bool().unwrap_or(true),
        })),
        name => Err(ConfigError::UnknownVariant {
            kind: "spatial reconstruction",
            name: name.to_string(),
        }),
    }
}
