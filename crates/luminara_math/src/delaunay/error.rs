//! Error taxonomy for the mesh: reserved for programmer errors and
//! debug-mode invariant failures. Benign refusals (duplicate insert, move
//! onto an occupied coordinate) return `bool`, not this type — see
//! `TriMesh::add_node`/`TetMesh::add_node`.

use thiserror::Error;

/// Errors raised by operations that accept malformed arguments or detect
/// mesh corruption. These are never part of normal control flow.
#[derive(Debug, Error)]
pub enum MeshError {
    /// An insertion was attempted at coordinates already occupied by an
    /// in-mesh site, in a context that cannot simply return `false`
    /// (e.g. building the initial seed simplex).
    #[error("duplicate site at the given coordinates")]
    DuplicateSite,

    /// The first `d+1` sites supplied to seed the mesh are collinear
    /// (2D) or coplanar (3D).
    #[error("seed sites are degenerate (collinear or coplanar)")]
    DegenerateSeed,

    /// A caller-supplied argument violates a documented precondition
    /// (e.g. a facet that does not belong to the tetrahedron it was
    /// passed with, or a traversal step bound above 256).
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// `validate()` found the mesh in a state that violates one of its
    /// structural invariants. Fatal; there is no recovery path.
    #[error("mesh invariant violated: {0}")]
    InvariantViolation(String),
}
