//! The mesh collaborator consumed by the engine.
//!
//! The engine never builds a tessellation itself: it reads volumes, centroids, faces and
//! neighbours through [`Tessellation`] and asks the mesh to move, insert or remove vertices.

use glam::DVec3;

use crate::Dimensionality;

mod segment;

pub use segment::{MeshBoundary, SegmentMesh};

/// A face between two control volumes, or between a control volume and the domain exterior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    left: usize,
    right: Option<usize>,
    area: f64,
    normal: DVec3,
    centroid: DVec3,
    shift: Option<DVec3>,
}

impl Face {
    pub fn new(
        left: usize,
        right: Option<usize>,
        area: f64,
        normal: DVec3,
        centroid: DVec3,
        shift: Option<DVec3>,
    ) -> Self {
        Self {
            left,
            right,
            area,
            normal,
            centroid,
            shift,
        }
    }

    pub fn left(&self) -> usize {
        self.left
    }

    /// `None` for faces on the domain boundary.
    pub fn right(&self) -> Option<usize> {
        self.right
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// Unit normal pointing from the left cell to the right cell (or outward).
    pub fn normal(&self) -> DVec3 {
        self.normal
    }

    /// Centroid in the frame of the left cell.
    pub fn centroid(&self) -> DVec3 {
        self.centroid
    }

    /// Offset to add to the right vertex to bring it into the frame of the left one.
    pub fn shift(&self) -> Option<DVec3> {
        self.shift
    }

    pub fn is_boundary(&self) -> bool {
        self.right.is_none()
    }

    /// The cell on the other side of this face, seen from `index`.
    pub fn other(&self, index: usize) -> Option<usize> {
        if index == self.left {
            self.right
        } else {
            Some(self.left)
        }
    }
}

pub trait Tessellation: Clone + Send + Sync + 'static {
    fn dimensionality(&self) -> Dimensionality;

    fn vertex_count(&self) -> usize;

    fn vertex_position(&self, index: usize) -> DVec3;

    fn vertex_positions(&self) -> Vec<DVec3> {
        (0..self.vertex_count())
            .map(|i| self.vertex_position(i))
            .collect()
    }

    fn cell_volume(&self, index: usize) -> f64;

    fn cell_centroid(&self, index: usize) -> DVec3;

    /// Characteristic linear size of a cell.
    fn cell_width(&self, index: usize) -> f64;

    fn neighbors(&self, index: usize) -> &[usize];

    /// Indices of the faces bounding a cell.
    fn faces_of(&self, index: usize) -> &[usize];

    fn faces(&self) -> &[Face];

    fn face(&self, index: usize) -> &Face {
        &self.faces()[index]
    }

    fn face_count(&self) -> usize {
        self.faces().len()
    }

    /// Reposition every vertex and rebuild the connectivity.
    fn move_vertices(&mut self, positions: &[DVec3]);

    /// Insert a vertex and return its index, which is always `vertex_count() - 1` afterwards.
    fn insert_vertex(&mut self, position: DVec3) -> usize;

    /// Remove a vertex. Vertices with a larger index shift down by one.
    fn remove_vertex(&mut self, index: usize);
}
