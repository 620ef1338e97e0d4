//! Versioned snapshot persistence (format tag 1).
//!
//! A `Snapshot` is a flat, serde-serializable mirror of a mesh's arena
//! contents. The 2D and 3D engines both produce one (sites/simplices are
//! variable-length per record so the same shape covers triangles and
//! tetrahedra); `TriMesh::snapshot`/`TetMesh::snapshot` fill it in and
//! `from_snapshot` revalidates on the way back in. Ron is used for the
//! crate's human-readable round-trip tests; bincode is offered as the
//! compact binary encoding for embedding applications that persist scene
//! data this way elsewhere in the engine.

use serde::{Deserialize, Serialize};

use super::arena::{SiteId, SimplexId};

pub const FORMAT_TAG: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRecord {
    pub handle: SiteId,
    /// Both perturbed coordinates (2 or 3 components depending on
    /// dimension — the caller knows which engine it's reading for).
    pub coords: Vec<f64>,
    pub payload: u64,
    pub prev: SiteId,
    pub next: SiteId,
    pub witness: SimplexId,
    pub properties: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimplexRecord {
    pub handle: SimplexId,
    pub sites: Vec<SiteId>,
    pub neighbors: Vec<SimplexId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OuterBoxRecord {
    pub enabled: bool,
    pub bounds: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_tag: u32,
    pub version: u64,
    pub sites: Vec<SiteRecord>,
    pub simplices: Vec<SimplexRecord>,
    pub root_site: SiteId,
    pub root_simplex: SimplexId,
    pub outer_box: OuterBoxRecord,
    pub property_map_names: Vec<String>,
}

impl Snapshot {
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    pub fn to_bincode(&self) -> Result<Vec<u8>, Box<bincode::ErrorKind>> {
        bincode::serialize(self)
    }

    pub fn from_bincode(bytes: &[u8]) -> Result<Self, Box<bincode::ErrorKind>> {
        bincode::deserialize(bytes)
    }
}

pub(crate) fn collect_properties(
    dir: &super::property::PropertyMapDirectory,
    site: SiteId,
) -> Vec<(String, f64)> {
    dir.names()
        .into_iter()
        .filter_map(|name| dir.get(&name).map(|m| (name, m.get(site))))
        .collect()
}
