//! Point location support shared by the 2D and 3D engines: the random
//! sample set that seeds jump-and-walk, and the classification an
//! in-progress walk settles on.
//!
//! The actual walk (choosing which facet to cross) is dimension-specific
//! and lives in `trimesh.rs`/`tetmesh.rs`, since it calls `orient2d`/
//! `incircle` or `orient3d`/`insphere` directly; this module only owns the
//! sample-set bookkeeping, which is pure index management.

use rand::seq::IteratorRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::arena::{SimplexId, SiteId};

/// Result of locating a query point against the mesh.
#[derive(Debug, Clone, Copy)]
pub enum PointLocation {
    /// The query coincides with an existing site.
    OnSite(SiteId),
    /// The query lies exactly on the edge between two sites (2D and 3D).
    OnEdge(SiteId, SiteId, SimplexId),
    /// The query lies exactly on a triangular face (3D only).
    OnFace(SiteId, SiteId, SiteId, SimplexId),
    /// The query lies strictly inside a simplex.
    Inside(SimplexId),
    /// The query lies outside the hull; `SimplexId` is a visible witness.
    Outside(SimplexId),
}

impl PointLocation {
    /// The witness simplex associated with this location, if any (always
    /// present except when the mesh has no simplex yet).
    pub fn witness(&self) -> Option<SimplexId> {
        match *self {
            PointLocation::OnSite(_) => None,
            PointLocation::OnEdge(_, _, s) => Some(s),
            PointLocation::OnFace(_, _, _, s) => Some(s),
            PointLocation::Inside(s) => Some(s),
            PointLocation::Outside(s) => Some(s),
        }
    }
}

/// Sample-site set used to seed jump-and-walk: a small subset of in-mesh
/// sites, resized to `ceil(k * N^(1/d))` as the mesh grows or shrinks.
pub struct SampleSet {
    sites: Vec<SiteId>,
    k: f64,
    dim: u32,
    rng: ChaCha8Rng,
}

impl SampleSet {
    pub fn new(k: f64, dim: u32) -> Self {
        Self {
            sites: Vec::new(),
            k,
            dim,
            rng: ChaCha8Rng::seed_from_u64(0x4c554d_4e415241), // fixed seed: deterministic topology across runs
        }
    }

    fn target_len(&self, site_count: usize) -> usize {
        if site_count == 0 {
            return 0;
        }
        (self.k * (site_count as f64).powf(1.0 / self.dim as f64)).ceil() as usize
    }

    pub fn sites(&self) -> &[SiteId] {
        &self.sites
    }

    /// Called after a site is inserted; grows the sample set by one slot
    /// of the formula requires it.
    pub fn on_insert(&mut self, new_site: SiteId, site_count: usize) {
        if self.sites.len() < self.target_len(site_count) {
            self.sites.push(new_site);
        }
    }

    /// Called after a site is removed; if it was sampled, drops it (the
    /// set is allowed to shrink below the formula until the next growth
    /// opportunity, matching jump-and-walk's tolerance for an
    /// approximately-sized sample).
    pub fn on_remove(&mut self, removed: SiteId) {
        self.sites.retain(|&s| s != removed);
    }

    /// Rebuilds the sample set by random selection, used after
    /// deserializing a snapshot (the serialized format does not persist
    /// the sample set itself).
    pub fn rebuild(&mut self, all_sites: impl Iterator<Item = SiteId>, site_count: usize) {
        let target = self.target_len(site_count);
        self.sites = all_sites.choose_multiple(&mut self.rng, target);
    }

    pub fn clear(&mut self) {
        self.sites.clear();
    }
}
