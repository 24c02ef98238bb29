use glam::DVec3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use yaml_rust::Yaml;

use super::{Face, Tessellation};
use crate::{
    errors::ConfigError,
    utils::{box_reflect, box_wrap},
    Dimensionality,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshBoundary {
    /// Static walls at both ends of the domain.
    Walls,
    Periodic,
}

/// A one dimensional Voronoi tessellation of `[anchor, anchor + length]`.
///
/// Every vertex generates the cell of all points closer to it than to any other vertex. Faces
/// have unit area, so cell volumes are lengths.
#[derive(Clone, Debug)]
pub struct SegmentMesh {
    positions: Vec<f64>,
    anchor: f64,
    length: f64,
    boundary: MeshBoundary,
    lower: Vec<f64>,
    upper: Vec<f64>,
    faces: Vec<Face>,
    cell_faces: Vec<Vec<usize>>,
    neighbors: Vec<Vec<usize>>,
}

impl SegmentMesh {
    pub fn new(positions: Vec<f64>, anchor: f64, length: f64, boundary: MeshBoundary) -> Self {
        let mut mesh = Self {
            positions: vec![],
            anchor,
            length,
            boundary,
            lower: vec![],
            upper: vec![],
            faces: vec![],
            cell_faces: vec![],
            neighbors: vec![],
        };
        mesh.positions = positions.into_iter().map(|x| mesh.fix_in_domain(x)).collect();
        mesh.rebuild();
        mesh
    }

    /// Vertices at the centres of `num_cells` equal cells.
    pub fn uniform(num_cells: usize, anchor: f64, length: f64, boundary: MeshBoundary) -> Self {
        let dx = length / num_cells as f64;
        let positions = (0..num_cells)
            .map(|i| anchor + (i as f64 + 0.5) * dx)
            .collect();
        Self::new(positions, anchor, length, boundary)
    }

    /// Like [`SegmentMesh::uniform`], with every vertex displaced by a random fraction
    /// (at most `perturbation / 2`) of the cell size.
    pub fn perturbed<R: Rng>(
        num_cells: usize,
        anchor: f64,
        length: f64,
        boundary: MeshBoundary,
        perturbation: f64,
        rng: &mut R,
    ) -> Self {
        let dx = length / num_cells as f64;
        let positions = (0..num_cells)
            .map(|i| {
                anchor + (i as f64 + 0.5 + perturbation * rng.gen_range(-0.5..0.5)) * dx
            })
            .collect();
        Self::new(positions, anchor, length, boundary)
    }

    /// Reads `num_cells`, `box_size`, `anchor`, `boundary` and optionally `perturbations` with
    /// `seed`. A `dimensionality` other than 1 is rejected.
    pub fn init(cfg: &Yaml) -> Result<Self, ConfigError> {
        if Dimensionality::init(cfg)? != Dimensionality::OneD {
            return Err(ConfigError::InvalidValue {
                name: "mesh:dimensionality".to_string(),
                value: cfg["dimensionality"].clone(),
            });
        }
        let num_cells = cfg["num_cells"]
            .as_i64()
            .ok_or(ConfigError::MissingParameter("mesh:num_cells".to_string()))?;
        if num_cells <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "mesh:num_cells".to_string(),
                value: cfg["num_cells"].clone(),
            });
        }
        let length = cfg["box_size"].as_f64().unwrap_or(1.);
        let anchor = cfg["anchor"].as_f64().unwrap_or(0.);
        let boundary = match cfg["boundary"].as_str().unwrap_or("walls") {
            "walls" => MeshBoundary::Walls,
            "periodic" => MeshBoundary::Periodic,
            name => {
                return Err(ConfigError::UnknownVariant {
                    kind: "mesh boundary",
                    name: name.to_string(),
                })
            }
        };
        let mesh = match cfg["perturbations"].as_f64() {
            Some(perturbation) => {
                let seed = cfg["seed"].as_i64().unwrap_or(0) as u64;
                let mut rng = StdRng::seed_from_u64(seed);
                Self::perturbed(
                    num_cells as usize,
                    anchor,
                    length,
                    boundary,
                    perturbation,
                    &mut rng,
                )
            }
            None => Self::uniform(num_cells as usize, anchor, length, boundary),
        };
        Ok(mesh)
    }

    pub fn boundary(&self) -> MeshBoundary {
        self.boundary
    }

    fn fix_in_domain(&self, x: f64) -> f64 {
        let mut pos = DVec3::new(x, 0., 0.);
        let anchor = DVec3::new(self.anchor, 0., 0.);
        let box_size = DVec3::new(self.length, 0., 0.);
        match self.boundary {
            MeshBoundary::Walls => box_reflect(anchor, box_size, &mut pos, 1),
            MeshBoundary::Periodic => box_wrap(anchor, box_size, &mut pos, 1),
        }
        pos.x
    }

    /// Recompute cell bounds, faces and neighbours from the vertex positions.
    fn rebuild(&mut self) {
        let n = self.positions.len();
        self.lower = vec![0.; n];
        self.upper = vec![0.; n];
        self.faces.clear();
        self.cell_faces = vec![vec![]; n];
        self.neighbors = vec![vec![]; n];
        if n == 0 {
            return;
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| self.positions[a].total_cmp(&self.positions[b]).then(a.cmp(&b)));

        let x = |i: usize| self.positions[i];
        let (x_min, x_max) = (self.anchor, self.anchor + self.length);
        match self.boundary {
            MeshBoundary::Walls => {
                self.faces.push(Face::new(
                    order[0],
                    None,
                    1.,
                    -DVec3::X,
                    DVec3::new(x_min, 0., 0.),
                    None,
                ));
                for k in 0..n {
                    let i = order[k];
                    self.lower[i] = if k == 0 {
                        x_min
                    } else {
                        0.5 * (x(order[k - 1]) + x(i))
                    };
                    self.upper[i] = if k == n - 1 {
                        x_max
                    } else {
                        0.5 * (x(i) + x(order[k + 1]))
                    };
                    if k + 1 < n {
                        let j = order[k + 1];
                        self.faces.push(Face::new(
                            i,
                            Some(j),
                            1.,
                            DVec3::X,
                            DVec3::new(self.upper[i], 0., 0.),
                            None,
                        ));
                        self.neighbors[i].push(j);
                        self.neighbors[j].push(i);
                    }
                }
                self.faces.push(Face::new(
                    order[n - 1],
                    None,
                    1.,
                    DVec3::X,
                    DVec3::new(x_max, 0., 0.),
                    None,
                ));
            }
            MeshBoundary::Periodic => {
                for k in 0..n {
                    let i = order[k];
                    let prev = order[(k + n - 1) % n];
                    let next = order[(k + 1) % n];
                    let prev_x = if k == 0 { x(prev) - self.length } else { x(prev) };
                    let next_x = if k == n - 1 { x(next) + self.length } else { x(next) };
                    self.lower[i] = 0.5 * (prev_x + x(i));
                    self.upper[i] = 0.5 * (x(i) + next_x);
                    let shift = (k == n - 1).then(|| DVec3::new(self.length, 0., 0.));
                    self.faces.push(Face::new(
                        i,
                        Some(next),
                        1.,
                        DVec3::X,
                        DVec3::new(self.upper[i], 0., 0.),
                        shift,
                    ));
                    if next != i && !self.neighbors[i].contains(&next) {
                        self.neighbors[i].push(next);
                        self.neighbors[next].push(i);
                    }
                }
            }
        }

        for (face_idx, face) in self.faces.iter().enumerate() {
            self.cell_faces[face.left()].push(face_idx);
            if let Some(right) = face.right() {
                if right != face.left() {
                    self.cell_faces[right].push(face_idx);
                }
            }
        }
    }
}

impl Tessellation for SegmentMesh {
    fn dimensionality(&self) -> Dimensionality {
        Dimensionality::OneD
    }

    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn vertex_position(&self, index: usize) -> DVec3 {
        DVec3::new(self.positions[index], 0., 0.)
    }

    fn cell_volume(&self, index: usize) -> f64 {
        self.upper[index] - self.lower[index]
    }

    fn cell_centroid(&self, index: usize) -> DVec3 {
        DVec3::new(0.5 * (self.lower[index] + self.upper[index]), 0., 0.)
    }

    fn cell_width(&self, index: usize) -> f64 {
        self.cell_volume(index)
    }

    fn neighbors(&self, index: usize) -> &[usize] {
        &self.neighbors[index]
    }

    fn faces_of(&self, index: usize) -> &[usize] {
        &self.cell_faces[index]
    }

    fn faces(&self) -> &[Face] {
        &self.faces
    }

    fn move_vertices(&mut self, positions: &[DVec3]) {
        debug_assert_eq!(positions.len(), self.positions.len());
        self.positions = positions.iter().map(|p| self.fix_in_domain(p.x)).collect();
        self.rebuild();
    }

    fn insert_vertex(&mut self, position: DVec3) -> usize {
        let x = self.fix_in_domain(position.x);
        self.positions.push(x);
        self.rebuild();
        self.positions.len() - 1
    }

    fn remove_vertex(&mut self, index: usize) {
        self.positions.remove(index);
        self.rebuild();
    }
}
