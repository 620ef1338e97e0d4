//! # Luminara Math
//!
//! Robust geometric predicates and incremental Delaunay/regular
//! triangulation meshes (2D triangle meshes, 3D tetrahedral meshes).
//! Powered by `glam` for vector types and exact adaptive-precision
//! arithmetic for the predicates that drive topology decisions.

pub use glam::{self, DVec2, DVec3};

pub mod delaunay;
pub mod foundations;

pub use delaunay::error::MeshError;
pub use delaunay::tetmesh::TetMesh;
pub use delaunay::trimesh::TriMesh;
