//! Incremental Delaunay triangulation: 2D triangle meshes and 3D
//! tetrahedral meshes, built on the adaptive predicates in
//! [`crate::foundations`].
//!
//! The two engines share predicates, the arena, the auxiliary hash sets,
//! and the sample-set/listener/property-map machinery, but each owns its
//! own site/simplex representation since a triangle and a tetrahedron
//! genuinely differ in shape (3 vs 4 vertices, 2D vs 3D coordinates,
//! triangle-fan vs tetrahedron-fan cavity filling). The 3D engine is the
//! more complex of the two; the 2D engine is a structural simplification
//! of the same algorithm.

pub mod arena;
pub mod error;
pub mod hashset;
pub mod listener;
pub mod locate;
pub mod perturb;
pub mod property;
pub mod snapshot;
pub mod tetmesh;
pub mod trimesh;

pub use arena::{SimplexId, SiteId};
pub use error::MeshError;
pub use listener::{ListenerHandle, MeshEvent};
pub use locate::PointLocation;
pub use property::NodePropertyMap;

/// Construction-time tunables for a mesh, with defaults matching the
/// constants named in the component design (sample-set constant, recycler
/// capacity, mark-sweep overflow margin, debug validation toggle).
#[derive(Debug, Clone, Copy)]
pub struct MeshConfig {
    /// Sample-set sizing constant `k` in `ceil(k * N^(1/d))`. Defaults to
    /// the value appropriate for the engine's dimension; `TriMesh::new`/
    /// `TetMesh::new` override it via `MeshConfig::default_for_dim`.
    pub sample_set_k: f64,
    /// Capacity of the bounded free-list simplex recycler.
    pub recycler_capacity: usize,
    /// How many marks below the representable integer maximum the mesh
    /// triggers its one-time depth-first mark sweep, rather than waiting
    /// for actual overflow.
    pub mark_sweep_margin: u32,
    /// Whether `validate()` runs automatically after every mutation. Off
    /// by default in release builds; the `debug_validation` feature
    /// flips this crate-wide default on.
    pub debug_validation: bool,
}

impl MeshConfig {
    pub fn default_for_dim(dim: u32) -> Self {
        Self {
            sample_set_k: if dim == 2 { 2.22 } else { 2.0 },
            ..Self::default()
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            sample_set_k: 2.0,
            recycler_capacity: 256,
            mark_sweep_margin: 1024,
            debug_validation: cfg!(feature = "debug_validation"),
        }
    }
}

/// Which of the mesh's two mark colors an operation targets. Mirrors the
/// `mark_red`/`mark_blue` pair as a single parameterized operation, the
/// `mark` entry in spec.md §6's external surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    Red,
    Blue,
}

/// Mesh-wide mark counters implementing O(1) "clear all marks": marking
/// sets a simplex's mark to the current red or blue value; clearing
/// advances the counter instead of visiting every simplex. When a counter
/// approaches its representable range, the mesh falls back to a one-time
/// depth-first sweep that zeroes every mark (the only non-O(1) path).
/// Sites and simplices each hold their own `MarkCounters` instance, so
/// clearing node marks never disturbs simplex marks and vice versa.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkCounters {
    pub(crate) red: u32,
    pub(crate) blue: u32,
}

impl MarkCounters {
    pub(crate) fn clear_red(&mut self, margin: u32) -> bool {
        if self.red >= u32::MAX - margin {
            return true; // caller must sweep before continuing
        }
        self.red += 1;
        false
    }

    pub(crate) fn clear_blue(&mut self, margin: u32) -> bool {
        if self.blue <= margin {
            return true;
        }
        self.blue -= 1;
        false
    }
}
