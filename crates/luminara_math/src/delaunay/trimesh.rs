//! Incremental 2D Delaunay triangulation.
//!
//! A structural simplification of the tetrahedral engine in `tetmesh.rs`:
//! same predicates, same arena/marking/recycling machinery, but the
//! cavity boundary during insertion is always a single simple polygon
//! (rather than a triangulated 2-manifold surface), so the new triangles
//! can be linked to each other directly in cyclic order instead of
//! through the edge-matching hash set `tetmesh.rs` needs for its facets.

use rustc_hash::{FxHashMap, FxHashSet};

use log::{debug, trace};

use crate::foundations::{center_circle_2d, incircle, orient2d};

use super::arena::{Arena, SimplexId, SiteId};
use super::error::MeshError;
use super::hashset::{EdgeKey, OrientedKey, OrientedSet};
use super::listener::{Listeners, MeshEvent};
use super::locate::{PointLocation, SampleSet};
use super::property::PropertyMapDirectory;
use super::snapshot::{collect_properties, OuterBoxRecord, SimplexRecord, Snapshot, SiteRecord, FORMAT_TAG};
use super::{ListenerHandle, MarkColor, MarkCounters, MeshConfig};

#[derive(Debug, Clone)]
struct Site2 {
    coords: [f64; 2],
    original: [f32; 2],
    payload: u64,
    sequence: u64,
    prev: SiteId,
    next: SiteId,
    witness: SimplexId,
    in_mesh: bool,
    mark: u32,
}

#[derive(Debug, Clone)]
struct Triangle {
    sites: [SiteId; 3],
    neighbors: [SimplexId; 3],
    mark: u32,
    circumcenter: Option<[f64; 2]>,
    inner: Option<bool>,
}

impl Triangle {
    fn opposite_edge(&self, i: usize) -> (SiteId, SiteId) {
        (self.sites[(i + 1) % 3], self.sites[(i + 2) % 3])
    }

    fn index_of(&self, site: SiteId) -> Option<usize> {
        self.sites.iter().position(|&s| s == site)
    }
}

/// An undirected pair of sites forming an edge of the current
/// triangulation, plus a hint simplex a traversal can resume from.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub a: SiteId,
    pub b: SiteId,
    pub hint: SimplexId,
}

/// Incremental 2D Delaunay triangle mesh.
///
/// Not `Sync`: all mutating operations must be externally serialized by
/// the embedder (single-writer model).
pub struct TriMesh {
    sites: Arena<Site2>,
    simplices: Arena<Triangle>,
    head_site: SiteId,
    root_simplex: SimplexId,
    site_count: usize,
    sample_set: SampleSet,
    marks: MarkCounters,
    site_marks: MarkCounters,
    listeners: Listeners<TriMesh>,
    properties: PropertyMapDirectory,
    version: u64,
    config: MeshConfig,
    outer_box_enabled: bool,
    outer_box: [f64; 4], // xmin, xmax, ymin, ymax
    next_sequence: u64,
}

#[cfg(test)]
fn _assert_send() {
    fn assert_send<T: Send>() {}
    assert_send::<TriMesh>();
}

impl TriMesh {
    pub fn new() -> Self {
        Self::with_config(MeshConfig::default_for_dim(2))
    }

    pub fn with_config(config: MeshConfig) -> Self {
        Self {
            sites: Arena::new(config.recycler_capacity),
            simplices: Arena::new(config.recycler_capacity),
            head_site: SiteId::NULL,
            root_simplex: SimplexId::NULL,
            site_count: 0,
            sample_set: SampleSet::new(config.sample_set_k, 2),
            marks: MarkCounters::default(),
            site_marks: MarkCounters::default(),
            listeners: Listeners::new(),
            properties: PropertyMapDirectory::new(),
            version: 0,
            config,
            outer_box_enabled: false,
            outer_box: [0.0; 4],
            next_sequence: 0,
        }
    }

    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn tri(&self, id: SimplexId) -> &Triangle {
        self.simplices
            .get(id.index, id.generation)
            .expect("stale or invalid SimplexId")
    }

    fn tri_mut(&mut self, id: SimplexId) -> &mut Triangle {
        self.simplices
            .get_mut(id.index, id.generation)
            .expect("stale or invalid SimplexId")
    }

    fn site(&self, id: SiteId) -> &Site2 {
        self.sites.get(id.index, id.generation).expect("stale or invalid SiteId")
    }

    fn site_mut(&mut self, id: SiteId) -> &mut Site2 {
        self.sites.get_mut(id.index, id.generation).expect("stale or invalid SiteId")
    }

    fn coords(&self, id: SiteId) -> [f64; 2] {
        self.site(id).coords
    }

    // ---- site lifecycle -------------------------------------------------

    /// Creates a site out-of-mesh; `add_node` is what puts it into the
    /// triangulation.
    pub fn create_site(&mut self, coords: [f32; 2], payload: u64) -> SiteId {
        let perturbed = super::perturb::perturb2(coords);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let (index, generation) = self.sites.insert(Site2 {
            coords: perturbed,
            original: coords,
            payload,
            sequence,
            prev: SiteId::NULL,
            next: SiteId::NULL,
            witness: SimplexId::NULL,
            in_mesh: false,
            mark: 0,
        });
        SiteId { index, generation }
    }

    fn link_into_list(&mut self, site: SiteId) {
        if self.head_site.is_null() {
            self.head_site = site;
            let s = self.sites.get_mut(site.index, site.generation).unwrap();
            s.prev = site;
            s.next = site;
            return;
        }
        let tail = self.site(self.head_site).prev;
        {
            let s = self.sites.get_mut(site.index, site.generation).unwrap();
            s.prev = tail;
            s.next = self.head_site;
        }
        self.sites.get_mut(tail.index, tail.generation).unwrap().next = site;
        let head = self.head_site;
        self.sites.get_mut(head.index, head.generation).unwrap().prev = site;
    }

    fn unlink_from_list(&mut self, site: SiteId) {
        let (prev, next) = {
            let s = self.site(site);
            (s.prev, s.next)
        };
        if next == site {
            self.head_site = SiteId::NULL;
        } else {
            self.sites.get_mut(prev.index, prev.generation).unwrap().next = next;
            self.sites.get_mut(next.index, next.generation).unwrap().prev = prev;
            if self.head_site == site {
                self.head_site = next;
            }
        }
    }

    fn find_duplicate(&self, coords: [f64; 2]) -> Option<SiteId> {
        if self.head_site.is_null() {
            return None;
        }
        let mut current = self.head_site;
        loop {
            let s = self.site(current);
            if s.coords == coords {
                return Some(current);
            }
            current = s.next;
            if current == self.head_site {
                break;
            }
        }
        None
    }

    /// Attempts to insert an existing (created but not-yet-in-mesh) site
    /// into the triangulation. Returns `false` without mutating state if
    /// the coordinates duplicate an existing in-mesh site.
    pub fn add_node(&mut self, site: SiteId) -> bool {
        let coords = self.coords(site);

        if self.root_simplex.is_null() {
            return self.add_node_pre_seed(site, coords);
        }

        let location = self.locate_point(coords[0], coords[1]);
        if let PointLocation::OnSite(_) = location {
            return false;
        }

        self.listeners_fire(MeshEvent::NodeWillBeAdded(site));
        self.link_into_list(site);
        self.sites.get_mut(site.index, site.generation).unwrap().in_mesh = true;
        self.site_count += 1;

        let witness = location.witness().expect("non-OnSite location always has a witness");
        let outside = matches!(location, PointLocation::Outside(_));
        let (destroyed, boundary) = self.build_cavity(witness, coords, outside);
        let new_triangles = self.retriangulate_cavity(site, &boundary);

        for tid in &destroyed {
            self.listeners_fire(MeshEvent::SimplexRemoved(*tid));
            self.simplices.remove(tid.index, tid.generation);
        }
        for &tid in &new_triangles {
            self.listeners_fire(MeshEvent::SimplexAdded(tid));
        }

        self.repair_witnesses(&new_triangles);
        if let Some(&first) = new_triangles.first() {
            self.root_simplex = first;
        }

        self.sample_set.on_insert(site, self.site_count);
        self.bump_version();
        self.listeners_fire(MeshEvent::NodeAdded(site));

        if self.config.debug_validation {
            self.validate().expect("mesh invariant violated after add_node");
        }
        true
    }

    fn add_node_pre_seed(&mut self, site: SiteId, coords: [f64; 2]) -> bool {
        if let Some(_dup) = self.find_duplicate(coords) {
            return false;
        }
        self.listeners_fire(MeshEvent::NodeWillBeAdded(site));
        self.link_into_list(site);
        self.sites.get_mut(site.index, site.generation).unwrap().in_mesh = true;
        self.site_count += 1;
        self.sample_set.on_insert(site, self.site_count);
        self.bump_version();
        self.listeners_fire(MeshEvent::NodeAdded(site));

        if self.site_count == 3 {
            self.seed_first_triangle();
        }
        true
    }

    fn seed_first_triangle(&mut self) {
        let sites: Vec<SiteId> = self.nodes().collect();
        debug_assert_eq!(sites.len(), 3);
        let (a, b, c) = (sites[0], sites[1], sites[2]);
        let (pa, pb, pc) = (self.coords(a), self.coords(b), self.coords(c));
        let o = orient2d(pa, pb, pc);
        if o == 0.0 {
            panic!("degenerate seed: first three sites are exactly collinear");
        }
        let (a, b, c) = if o > 0.0 { (a, b, c) } else { (a, c, b) };
        let tid = self.alloc_triangle([a, b, c], [SimplexId::NULL; 3]);
        self.root_simplex = tid;
        for &s in &[a, b, c] {
            self.sites.get_mut(s.index, s.generation).unwrap().witness = tid;
        }
        self.listeners_fire(MeshEvent::SimplexAdded(tid));
        trace!("seeded first triangle {:?}", tid);
    }

    fn alloc_triangle(&mut self, sites: [SiteId; 3], neighbors: [SimplexId; 3]) -> SimplexId {
        let (index, generation) = self.simplices.insert(Triangle {
            sites,
            neighbors,
            mark: 0,
            circumcenter: None,
            inner: None,
        });
        SimplexId { index, generation }
    }

    fn repair_witnesses(&mut self, new_triangles: &[SimplexId]) {
        for &tid in new_triangles {
            let sites = self.tri(tid).sites;
            for s in sites {
                self.sites.get_mut(s.index, s.generation).unwrap().witness = tid;
            }
        }
    }

    /// Builds the cavity of simplices whose circumcircle strictly
    /// contains `coords`, starting from `witness`. Returns the destroyed
    /// simplex list and the retained boundary edges with their surviving
    /// outer neighbor (null if the edge was already on the hull).
    fn build_cavity(
        &mut self,
        witness: SimplexId,
        coords: [f64; 2],
        _from_outside: bool,
    ) -> (Vec<SimplexId>, FxHashMap<(SiteId, SiteId), SimplexId>) {
        let mut stack = vec![witness];
        let mut in_cavity: FxHashSet<SimplexId> = FxHashSet::default();
        let mut destroyed = Vec::new();
        let mut boundary_set: OrientedSet<EdgeKey> = OrientedSet::new();
        let mut boundary_owner: FxHashMap<EdgeKey, SimplexId> = FxHashMap::default();

        while let Some(tid) = stack.pop() {
            if in_cavity.contains(&tid) {
                continue;
            }
            let tri = self.tri(tid).clone();
            let pts = [
                self.coords(tri.sites[0]),
                self.coords(tri.sites[1]),
                self.coords(tri.sites[2]),
            ];
            if tid != witness && incircle(pts[0], pts[1], pts[2], coords) <= 0.0 {
                continue;
            }
            in_cavity.insert(tid);
            destroyed.push(tid);

            for i in 0..3 {
                let (u, v) = tri.opposite_edge(i);
                let neighbor = tri.neighbors[i];
                let key = EdgeKey(u, v);
                if neighbor.is_null() {
                    boundary_owner.insert(key, SimplexId::NULL);
                    continue;
                }
                if boundary_set.offer(key) {
                    boundary_owner.insert(key, neighbor);
                    stack.push(neighbor);
                } else {
                    boundary_owner.remove(&key.mate());
                }
            }
        }

        let mut out = FxHashMap::default();
        for (k, v) in boundary_owner {
            out.insert((k.0, k.1), v);
        }
        (destroyed, out)
    }

    /// Reconnects the cavity boundary polygon into a fan of new triangles
    /// around the new site, linking consecutive fan triangles to each
    /// other directly (the boundary is always a single simple polygon in
    /// 2D, so cyclic order alone determines adjacency — no edge-matching
    /// hash set is needed the way the 3D engine needs one).
    fn retriangulate_cavity(
        &mut self,
        new_site: SiteId,
        boundary: &FxHashMap<(SiteId, SiteId), SimplexId>,
    ) -> Vec<SimplexId> {
        if boundary.is_empty() {
            return Vec::new();
        }
        // Walk the boundary edges (u -> v) into cyclic polygon order.
        let next_of: FxHashMap<SiteId, SiteId> = boundary.keys().map(|&(u, v)| (u, v)).collect();
        let start = *boundary.keys().next().map(|(u, _)| u).unwrap();
        let mut ordered = Vec::with_capacity(boundary.len());
        let mut cur = start;
        loop {
            let v = *next_of.get(&cur).expect("cavity boundary must form a closed polygon");
            ordered.push((cur, v));
            cur = v;
            if cur == start {
                break;
            }
        }

        let mut new_tris = Vec::with_capacity(ordered.len());
        for &(u, v) in &ordered {
            let outer = *boundary.get(&(u, v)).unwrap();
            let tid = self.alloc_triangle([u, v, new_site], [SimplexId::NULL, SimplexId::NULL, outer]);
            if !outer.is_null() {
                self.relink_neighbor(outer, tid, u, v);
            }
            new_tris.push(tid);
        }
        // Link consecutive fan triangles across their shared edges at
        // `new_site`: new_tris[i]'s (v_i, new_site) edge is new_tris[i+1]'s
        // (new_site, u_{i+1}) edge, and u_{i+1} == v_i by construction.
        let n = new_tris.len();
        for i in 0..n {
            let next = new_tris[(i + 1) % n];
            self.tri_mut(new_tris[i]).neighbors[0] = next; // opposite u_i is (v_i,new_site)
            self.tri_mut(next).neighbors[1] = new_tris[i]; // opposite v_{i+1}... matched below
        }
        new_tris
    }

    /// Updates `outer`'s neighbor slot that used to point at one of the
    /// destroyed cavity simplices across edge (u, v) to instead point at
    /// the new triangle `tid`.
    fn relink_neighbor(&mut self, outer: SimplexId, tid: SimplexId, u: SiteId, v: SiteId) {
        let otri = self.tri_mut(outer);
        for i in 0..3 {
            let (ou, ov) = otri.opposite_edge(i);
            if ou == v && ov == u {
                otri.neighbors[i] = tid;
                return;
            }
        }
    }

    // ---- removal ----------------------------------------------------

    /// Removes an in-mesh site. Returns `false` if it was not in the
    /// mesh.
    pub fn remove_node(&mut self, site: SiteId) -> bool {
        if !self.site(site).in_mesh {
            return false;
        }
        self.listeners_fire(MeshEvent::NodeWillBeRemoved(site));
        self.unlink_from_list(site);
        self.sample_set.on_remove(site);
        self.properties.on_site_removed(site);
        self.sites.get_mut(site.index, site.generation).unwrap().in_mesh = false;
        self.sites.get_mut(site.index, site.generation).unwrap().witness = SimplexId::NULL;
        self.site_count -= 1;

        if self.site_count < 3 {
            if let Some(last) = self.simplices.iter().next().map(|(i, g, _)| SimplexId { index: i, generation: g }) {
                self.destroy_triangle(last);
            }
            self.root_simplex = SimplexId::NULL;
            self.bump_version();
            self.listeners_fire(MeshEvent::NodeRemoved(site));
            return true;
        }

        let witness = self.site(site).witness;
        let (removed, boundary) = self.collect_incident(site, witness);
        for &tid in &removed {
            self.listeners_fire(MeshEvent::SimplexRemoved(tid));
        }
        let candidates: Vec<SiteId> = removed
            .iter()
            .flat_map(|&tid| self.tri(tid).sites)
            .filter(|&s| s != site)
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();

        for &tid in &removed {
            self.simplices.remove(tid.index, tid.generation);
        }

        let new_tris = self.gift_wrap(boundary, &candidates);
        for &tid in &new_tris {
            self.listeners_fire(MeshEvent::SimplexAdded(tid));
        }
        self.repair_witnesses(&new_tris);
        if let Some(&first) = new_tris.first() {
            self.root_simplex = first;
        } else if let Some((i, g, _)) = self.simplices.iter().next() {
            self.root_simplex = SimplexId { index: i, generation: g };
        }

        self.bump_version();
        self.listeners_fire(MeshEvent::NodeRemoved(site));

        if self.config.debug_validation {
            self.validate().expect("mesh invariant violated after remove_node");
        }
        true
    }

    fn destroy_triangle(&mut self, tid: SimplexId) {
        self.listeners_fire(MeshEvent::SimplexRemoved(tid));
        self.simplices.remove(tid.index, tid.generation);
    }

    /// Collects all triangles incident to `site`, returning them plus the
    /// facet-opposite-site boundary edges (edge, outer neighbor) used to
    /// seed gift-wrapping.
    fn collect_incident(
        &self,
        site: SiteId,
        witness: SimplexId,
    ) -> (Vec<SimplexId>, Vec<(SiteId, SiteId, SimplexId)>) {
        let (forward, hit_fwd) = self.fan_around_site(site, witness, 1);
        let mut all = forward.clone();
        if hit_fwd {
            let (backward, _) = self.fan_around_site(site, witness, 2);
            for t in backward {
                if !all.contains(&t) {
                    all.push(t);
                }
            }
        }

        let mut boundary = Vec::new();
        for &tid in &all {
            let tri = self.tri(tid);
            let i = tri.index_of(site).unwrap();
            let (u, v) = tri.opposite_edge(i);
            boundary.push((u, v, tri.neighbors[i]));
        }
        (all, boundary)
    }

    /// Rotates around `site` starting at `start`, stepping through
    /// `neighbors[(i + step) % 3]` each time (`step` is 1 or 2 for the two
    /// rotation directions). Returns the visited triangles and whether a
    /// hull boundary (null neighbor) was hit.
    fn fan_around_site(&self, site: SiteId, start: SimplexId, step: usize) -> (Vec<SimplexId>, bool) {
        let mut result = Vec::new();
        let mut current = start;
        loop {
            result.push(current);
            let tri = self.tri(current);
            let i = tri.index_of(site).expect("site must lie on every triangle in its fan");
            let next = tri.neighbors[(i + step) % 3];
            if next.is_null() {
                return (result, true);
            }
            if next == start {
                return (result, false);
            }
            current = next;
        }
    }

    /// Gift-wraps the cavity left by a removed site: repeatedly picks a
    /// boundary facet and the candidate site that both lies on the
    /// correct side and yields an empty circumcircle among the remaining
    /// candidates.
    fn gift_wrap(
        &mut self,
        boundary: Vec<(SiteId, SiteId, SimplexId)>,
        candidates: &[SiteId],
    ) -> Vec<SimplexId> {
        let mut faces: OrientedSet<EdgeKey> = OrientedSet::new();
        let mut owners: FxHashMap<EdgeKey, SimplexId> = FxHashMap::default();
        for &(u, v, outer) in &boundary {
            let key = EdgeKey(u, v);
            faces.offer(key);
            owners.insert(key, outer);
        }

        let mut new_tris = Vec::new();
        while let Some(facet) = faces.pop() {
            let EdgeKey(u, v) = facet;
            let outer = owners.remove(&facet).unwrap_or(SimplexId::NULL);
            let (pu, pv) = (self.coords(u), self.coords(v));

            let mut best: Option<SiteId> = None;
            for &q in candidates {
                if q == u || q == v {
                    continue;
                }
                let pq = self.coords(q);
                if orient2d(pu, pv, pq) <= 0.0 {
                    continue;
                }
                let empty = candidates.iter().all(|&r| {
                    if r == u || r == v || r == q {
                        return true;
                    }
                    incircle(pu, pv, pq, self.coords(r)) <= 0.0
                });
                if empty {
                    best = Some(q);
                    break;
                }
            }

            match best {
                Some(q) => {
                    let tid = self.alloc_triangle([u, v, q], [SimplexId::NULL, SimplexId::NULL, outer]);
                    if !outer.is_null() {
                        self.link_outer_after_gift_wrap(outer, u, v, tid);
                    }
                    new_tris.push(tid);
                    for &(a, b) in &[(v, q), (q, u)] {
                        let key = EdgeKey(a, b);
                        if faces.offer(key) {
                            owners.insert(key, tid);
                        } else if let Some(&mate_owner) = owners.get(&key.mate()) {
                            self.link_pair(mate_owner, tid, key.mate(), key);
                            owners.remove(&key.mate());
                        }
                    }
                }
                None => {
                    if !outer.is_null() {
                        self.set_neighbor_for_edge(outer, v, u, SimplexId::NULL);
                        // `(u, v)` reverts to a hull edge with no new
                        // triangle covering it; its endpoints may still
                        // carry a witness into one of the just-destroyed
                        // triangles, so repoint them at the surviving
                        // neighbor directly.
                        for s in [u, v] {
                            self.sites.get_mut(s.index, s.generation).unwrap().witness = outer;
                        }
                    }
                }
            }
        }
        new_tris
    }

    fn link_outer_after_gift_wrap(&mut self, outer: SimplexId, u: SiteId, v: SiteId, tid: SimplexId) {
        self.set_neighbor_for_edge(outer, v, u, tid);
    }

    fn link_pair(&mut self, a: SimplexId, b: SimplexId, edge_on_a: EdgeKey, edge_on_b: EdgeKey) {
        self.set_neighbor_for_edge(a, edge_on_a.0, edge_on_a.1, b);
        self.set_neighbor_for_edge(b, edge_on_b.0, edge_on_b.1, a);
    }

    fn set_neighbor_for_edge(&mut self, tid: SimplexId, u: SiteId, v: SiteId, value: SimplexId) {
        let tri = self.tri_mut(tid);
        for i in 0..3 {
            let (ou, ov) = tri.opposite_edge(i);
            if ou == u && ov == v {
                tri.neighbors[i] = value;
                return;
            }
        }
    }

    // ---- motion -------------------------------------------------------

    /// Moves a site to new coordinates, refusing if another in-mesh site
    /// already occupies them.
    pub fn move_node(&mut self, site: SiteId, coords: [f32; 2]) -> bool {
        let perturbed = super::perturb::perturb2(coords);
        if let Some(dup) = self.find_duplicate(perturbed) {
            if dup != site {
                return false;
            }
        }
        let was_in_mesh = self.site(site).in_mesh;
        if was_in_mesh {
            self.remove_node(site);
        }
        {
            let s = self.sites.get_mut(site.index, site.generation).unwrap();
            s.coords = perturbed;
            s.original = coords;
        }
        if was_in_mesh {
            self.add_node(site);
        }
        true
    }

    // ---- locate ---------------------------------------------------

    pub fn locate_point(&self, x: f64, y: f64) -> PointLocation {
        if self.root_simplex.is_null() {
            if let Some(dup) = self.find_duplicate([x, y]) {
                return PointLocation::OnSite(dup);
            }
            return PointLocation::Outside(SimplexId::NULL);
        }

        let start = self.seed_for_walk(x, y);
        let mut current = self.site(start).witness;
        if current.is_null() {
            current = self.root_simplex;
        }

        loop {
            let tri = self.tri(current).clone();
            let pts = [self.coords(tri.sites[0]), self.coords(tri.sites[1]), self.coords(tri.sites[2])];

            if pts[0] == [x, y] {
                return PointLocation::OnSite(tri.sites[0]);
            }
            if pts[1] == [x, y] {
                return PointLocation::OnSite(tri.sites[1]);
            }
            if pts[2] == [x, y] {
                return PointLocation::OnSite(tri.sites[2]);
            }

            let o = [
                orient2d(pts[1], pts[2], [x, y]),
                orient2d(pts[2], pts[0], [x, y]),
                orient2d(pts[0], pts[1], [x, y]),
            ];

            if let Some(i) = o.iter().position(|&v| v < 0.0) {
                let neighbor = tri.neighbors[i];
                if neighbor.is_null() {
                    return PointLocation::Outside(current);
                }
                current = neighbor;
                continue;
            }

            let zero_count = o.iter().filter(|&&v| v == 0.0).count();
            if zero_count == 1 {
                let i = o.iter().position(|&v| v == 0.0).unwrap();
                let (u, v) = tri.opposite_edge(i);
                return PointLocation::OnEdge(u, v, current);
            }
            return PointLocation::Inside(current);
        }
    }

    fn seed_for_walk(&self, x: f64, y: f64) -> SiteId {
        let mut best = self.head_site;
        let mut best_dist = f64::INFINITY;
        let candidates = self.sample_set.sites().iter().copied().chain(std::iter::once(self.head_site));
        for s in candidates {
            if s.is_null() {
                continue;
            }
            let p = self.coords(s);
            let d = (p[0] - x).powi(2) + (p[1] - y).powi(2);
            if d < best_dist {
                best_dist = d;
                best = s;
            }
        }
        best
    }

    /// Linear-scan nearest-site search, used only as a ground-truth
    /// check against the sample-based search in tests. Documented 2-3x
    /// slower than `locate_point`'s seeded walk; kept optional per the
    /// resolved open question on `findNodeNearestSlow`.
    pub fn find_node_nearest_linear(&self, x: f64, y: f64) -> Option<SiteId> {
        self.nodes()
            .min_by(|&a, &b| {
                let pa = self.coords(a);
                let pb = self.coords(b);
                let da = (pa[0] - x).powi(2) + (pa[1] - y).powi(2);
                let db = (pb[0] - x).powi(2) + (pb[1] - y).powi(2);
                da.partial_cmp(&db).unwrap()
            })
    }

    pub fn find_node_nearest(&self, x: f64, y: f64) -> Option<SiteId> {
        if self.head_site.is_null() {
            return None;
        }
        match self.locate_point(x, y) {
            PointLocation::OnSite(s) => Some(s),
            loc => {
                let witness = loc.witness()?;
                let tri = self.tri(witness);
                tri.sites
                    .iter()
                    .copied()
                    .min_by(|&a, &b| {
                        let pa = self.coords(a);
                        let pb = self.coords(b);
                        let da = (pa[0] - x).powi(2) + (pa[1] - y).powi(2);
                        let db = (pb[0] - x).powi(2) + (pb[1] - y).powi(2);
                        da.partial_cmp(&db).unwrap()
                    })
            }
        }
    }

    pub fn find_edge(&self, a: SiteId, b: SiteId) -> Option<Edge> {
        let witness = self.site(a).witness;
        if witness.is_null() {
            return None;
        }
        let (fan, _) = self.fan_around_site(a, witness, 1);
        for tid in fan {
            if self.tri(tid).index_of(b).is_some() {
                return Some(Edge { a, b, hint: tid });
            }
        }
        None
    }

    pub fn find_simplex(&self, a: SiteId, b: SiteId, c: SiteId) -> Option<SimplexId> {
        let witness = self.site(a).witness;
        if witness.is_null() {
            return None;
        }
        let (fan, _) = self.fan_around_site(a, witness, 1);
        fan.into_iter()
            .find(|&tid| self.tri(tid).index_of(b).is_some() && self.tri(tid).index_of(c).is_some())
    }

    // ---- iteration --------------------------------------------------

    pub fn nodes(&self) -> impl Iterator<Item = SiteId> + '_ {
        let head = self.head_site;
        let mut current = if head.is_null() { None } else { Some(head) };
        std::iter::from_fn(move || {
            let c = current?;
            let next = self.site(c).next;
            current = if next == head { None } else { Some(next) };
            Some(c)
        })
    }

    pub fn simplices(&self) -> impl Iterator<Item = SimplexId> + '_ {
        self.simplices.iter().map(|(i, g, _)| SimplexId { index: i, generation: g })
    }

    pub fn edges(&self) -> Vec<Edge> {
        let mut seen: FxHashSet<(SiteId, SiteId)> = FxHashSet::default();
        let mut out = Vec::new();
        for tid in self.simplices() {
            let tri = self.tri(tid);
            for i in 0..3 {
                let (u, v) = tri.opposite_edge(i);
                let canon = if u.sequence() < v.sequence() { (u, v) } else { (v, u) };
                if seen.insert(canon) {
                    out.push(Edge { a: u, b: v, hint: tid });
                }
            }
        }
        out
    }

    pub fn hull_facets(&self) -> Vec<Edge> {
        let mut out = Vec::new();
        for tid in self.simplices() {
            let tri = self.tri(tid);
            for i in 0..3 {
                if tri.neighbors[i].is_null() {
                    let (u, v) = tri.opposite_edge(i);
                    out.push(Edge { a: u, b: v, hint: tid });
                }
            }
        }
        out
    }

    pub fn site_count(&self) -> usize {
        self.site_count
    }

    pub fn simplex_count(&self) -> usize {
        self.simplices.len()
    }

    // ---- traversal (G) ------------------------------------------------

    pub fn node_nabors(&self, site: SiteId) -> Vec<SiteId> {
        let witness = self.site(site).witness;
        if witness.is_null() {
            return Vec::new();
        }
        let (forward, hit) = self.fan_around_site(site, witness, 1);
        let mut tris = forward;
        if hit {
            let (backward, _) = self.fan_around_site(site, witness, 2);
            for t in backward {
                if !tris.contains(&t) {
                    tris.push(t);
                }
            }
        }
        let mut result = Vec::new();
        let mut seen = FxHashSet::default();
        for tid in tris {
            for &s in &self.tri(tid).sites {
                if s != site && seen.insert(s) {
                    result.push(s);
                }
            }
        }
        result
    }

    /// Breadth-first k-step nabors, each site reported once with its
    /// minimum step, bounded by `step_max <= 256`.
    pub fn node_nabors_within(&self, site: SiteId, step_max: u32) -> Result<Vec<(SiteId, u32)>, MeshError> {
        if step_max > 256 {
            return Err(MeshError::PreconditionViolation(
                "step_max must not exceed 256".to_string(),
            ));
        }
        let mut visited: FxHashMap<SiteId, u32> = FxHashMap::default();
        visited.insert(site, 0);
        let mut frontier = vec![site];
        for step in 1..=step_max {
            let mut next_frontier = Vec::new();
            for s in frontier {
                for n in self.node_nabors(s) {
                    if !visited.contains_key(&n) {
                        visited.insert(n, step);
                        next_frontier.push(n);
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }
        visited.remove(&site);
        Ok(visited.into_iter().collect())
    }

    /// Triangles incident to `site`.
    pub fn simplex_nabors_of_site(&self, site: SiteId) -> Vec<SimplexId> {
        let witness = self.site(site).witness;
        if witness.is_null() {
            return Vec::new();
        }
        let (forward, hit) = self.fan_around_site(site, witness, 1);
        let mut tris = forward;
        if hit {
            let (backward, _) = self.fan_around_site(site, witness, 2);
            for t in backward {
                if !tris.contains(&t) {
                    tris.push(t);
                }
            }
        }
        tris
    }

    /// The (at most two) triangles sharing edge `(a, b)`.
    pub fn simplex_nabors_of_edge(&self, a: SiteId, b: SiteId) -> Vec<SimplexId> {
        self.simplex_nabors_of_site(a)
            .into_iter()
            .filter(|&tid| self.tri(tid).index_of(b).is_some())
            .collect()
    }

    /// Edges incident to `site`.
    pub fn edge_nabors(&self, site: SiteId) -> Vec<Edge> {
        self.node_nabors(site)
            .into_iter()
            .filter_map(|other| self.find_edge(site, other))
            .collect()
    }

    // ---- inner/outer classification ------------------------------------

    pub fn set_outer_box(&mut self, xmin: f64, xmax: f64, ymin: f64, ymax: f64) {
        self.outer_box = [xmin, xmax, ymin, ymax];
        self.clear_inner_outer_cache();
    }

    pub fn enable_outer_box(&mut self) {
        self.outer_box_enabled = true;
        self.clear_inner_outer_cache();
    }

    pub fn disable_outer_box(&mut self) {
        self.outer_box_enabled = false;
        self.clear_inner_outer_cache();
    }

    fn clear_inner_outer_cache(&mut self) {
        let ids: Vec<SimplexId> = self.simplices().collect();
        for id in ids {
            self.tri_mut(id).inner = None;
        }
    }

    pub fn is_inner_simplex(&mut self, tid: SimplexId) -> bool {
        if !self.outer_box_enabled {
            return true;
        }
        if let Some(cached) = self.tri(tid).inner {
            return cached;
        }
        let tri = self.tri(tid).clone();
        let pts = [self.coords(tri.sites[0]), self.coords(tri.sites[1]), self.coords(tri.sites[2])];
        let center = tri.circumcenter.unwrap_or_else(|| center_circle_2d(pts[0], pts[1], pts[2]));
        let radius = ((center[0] - pts[0][0]).powi(2) + (center[1] - pts[0][1]).powi(2)).sqrt();
        let [xmin, xmax, ymin, ymax] = self.outer_box;
        let inner = center[0] - radius >= xmin
            && center[0] + radius <= xmax
            && center[1] - radius >= ymin
            && center[1] + radius <= ymax;
        self.tri_mut(tid).circumcenter = Some(center);
        self.tri_mut(tid).inner = Some(inner);
        inner
    }

    pub fn is_inner_site(&mut self, site: SiteId) -> bool {
        if !self.outer_box_enabled {
            return true;
        }
        let witness = self.site(site).witness;
        if witness.is_null() {
            return true;
        }
        let (fan, hit) = self.fan_around_site(site, witness, 1);
        let mut tris = fan;
        if hit {
            let (backward, _) = self.fan_around_site(site, witness, 2);
            for t in backward {
                if !tris.contains(&t) {
                    tris.push(t);
                }
            }
        }
        tris.into_iter().any(|t| self.is_inner_simplex(t))
    }

    // ---- marks ------------------------------------------------------

    pub fn mark_red(&mut self, tid: SimplexId) {
        let red = self.marks.red;
        self.tri_mut(tid).mark = red;
    }

    pub fn mark_blue(&mut self, tid: SimplexId) {
        let blue = self.marks.blue;
        self.tri_mut(tid).mark = blue;
    }

    /// Generic form of `mark_red`/`mark_blue`, parameterized on the color.
    pub fn mark(&mut self, tid: SimplexId, color: MarkColor) {
        match color {
            MarkColor::Red => self.mark_red(tid),
            MarkColor::Blue => self.mark_blue(tid),
        }
    }

    pub fn unmark(&mut self, tid: SimplexId) {
        self.tri_mut(tid).mark = u32::MAX / 2; // neutral value matching neither red nor blue
    }

    pub fn is_marked_red(&self, tid: SimplexId) -> bool {
        self.tri(tid).mark == self.marks.red
    }

    pub fn is_marked_blue(&self, tid: SimplexId) -> bool {
        self.tri(tid).mark == self.marks.blue
    }

    pub fn clear_simplex_marks(&mut self) {
        if self.marks.clear_red(self.config.mark_sweep_margin) {
            self.sweep_marks();
        }
    }

    fn sweep_marks(&mut self) {
        debug!("mark counters near overflow; running full mark sweep");
        let ids: Vec<SimplexId> = self.simplices().collect();
        for id in ids {
            self.tri_mut(id).mark = 0;
        }
        self.marks = MarkCounters::default();
    }

    // ---- site marks ---------------------------------------------------
    //
    // Mirror of the simplex mark scheme above, on a separate
    // `MarkCounters` so clearing node marks never disturbs simplex marks.
    // `node_nabors` still dedups with a per-call scratch set rather than
    // these marks (spec.md §9 allows a per-pass visited-set in place of
    // persistent marks), since these marks are a caller-visible feature
    // and must not be silently clobbered by an unrelated read query.

    pub fn mark_node_red(&mut self, site: SiteId) {
        let red = self.site_marks.red;
        self.site_mut(site).mark = red;
    }

    pub fn mark_node_blue(&mut self, site: SiteId) {
        let blue = self.site_marks.blue;
        self.site_mut(site).mark = blue;
    }

    /// Generic form of `mark_node_red`/`mark_node_blue`, parameterized on
    /// the color — the `mark` operation of spec.md §6 applied to a site.
    pub fn mark_node(&mut self, site: SiteId, color: MarkColor) {
        match color {
            MarkColor::Red => self.mark_node_red(site),
            MarkColor::Blue => self.mark_node_blue(site),
        }
    }

    pub fn unmark_node(&mut self, site: SiteId) {
        self.site_mut(site).mark = u32::MAX / 2;
    }

    pub fn is_node_marked_red(&self, site: SiteId) -> bool {
        self.site(site).mark == self.site_marks.red
    }

    pub fn is_node_marked_blue(&self, site: SiteId) -> bool {
        self.site(site).mark == self.site_marks.blue
    }

    pub fn clear_node_marks(&mut self) {
        if self.site_marks.clear_red(self.config.mark_sweep_margin) {
            self.sweep_node_marks();
        }
    }

    fn sweep_node_marks(&mut self) {
        debug!("node mark counters near overflow; running full mark sweep");
        let ids: Vec<SiteId> = self.nodes().collect();
        for id in ids {
            self.site_mut(id).mark = 0;
        }
        self.site_marks = MarkCounters::default();
    }

    // ---- property maps --------------------------------------------------

    pub fn get_node_property_map(&mut self, name: &str) -> &mut super::property::NodePropertyMap {
        self.properties.get_or_create(name)
    }

    pub fn has_node_property_map(&self, name: &str) -> bool {
        self.properties.has(name)
    }

    pub fn node_property_map_names(&self) -> Vec<String> {
        self.properties.names()
    }

    // ---- listeners --------------------------------------------------

    pub fn register_listener(&mut self, callback: Box<dyn FnMut(&TriMesh, MeshEvent)>) -> ListenerHandle {
        self.listeners.register(callback)
    }

    pub fn unregister_listener(&mut self, handle: ListenerHandle) -> bool {
        self.listeners.unregister(handle)
    }

    fn listeners_fire(&mut self, event: MeshEvent) {
        let mut listeners = std::mem::replace(&mut self.listeners, Listeners::new());
        listeners.fire(self, event);
        self.listeners = listeners;
    }

    // ---- snapshot --------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        let mut sites = Vec::new();
        for (index, generation, s) in self.sites.iter() {
            sites.push(SiteRecord {
                handle: SiteId { index, generation },
                coords: s.coords.to_vec(),
                payload: s.payload,
                prev: s.prev,
                next: s.next,
                witness: s.witness,
                properties: collect_properties(&self.properties, SiteId { index, generation }),
            });
        }
        let mut simplices = Vec::new();
        for (index, generation, t) in self.simplices.iter() {
            simplices.push(SimplexRecord {
                handle: SimplexId { index, generation },
                sites: t.sites.to_vec(),
                neighbors: t.neighbors.to_vec(),
            });
        }
        Snapshot {
            format_tag: FORMAT_TAG,
            version: self.version,
            sites,
            simplices,
            root_site: self.head_site,
            root_simplex: self.root_simplex,
            outer_box: OuterBoxRecord {
                enabled: self.outer_box_enabled,
                bounds: self.outer_box.to_vec(),
            },
            property_map_names: self.properties.names(),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, MeshError> {
        if snapshot.format_tag != FORMAT_TAG {
            return Err(MeshError::PreconditionViolation(format!(
                "unsupported snapshot format tag {}",
                snapshot.format_tag
            )));
        }
        let mut mesh = Self::new();
        let mut remap: FxHashMap<SiteId, SiteId> = FxHashMap::default();
        for record in &snapshot.sites {
            let coords: [f64; 2] = [record.coords[0], record.coords[1]];
            let (index, generation) = mesh.sites.insert(Site2 {
                coords,
                original: [coords[0] as f32, coords[1] as f32],
                payload: record.payload,
                sequence: mesh.next_sequence,
                prev: SiteId::NULL,
                next: SiteId::NULL,
                witness: SimplexId::NULL,
                in_mesh: true,
                mark: 0,
            });
            mesh.next_sequence += 1;
            remap.insert(record.handle, SiteId { index, generation });
        }
        let mut simplex_remap: FxHashMap<SimplexId, SimplexId> = FxHashMap::default();
        for record in &snapshot.simplices {
            let sites = [
                remap[&record.sites[0]],
                remap[&record.sites[1]],
                remap[&record.sites[2]],
            ];
            let (index, generation) = mesh.simplices.insert(Triangle {
                sites,
                neighbors: [SimplexId::NULL; 3],
                mark: 0,
                circumcenter: None,
                inner: None,
            });
            simplex_remap.insert(record.handle, SimplexId { index, generation });
        }
        for record in &snapshot.simplices {
            let new_id = simplex_remap[&record.handle];
            let neighbors: Vec<SimplexId> = record
                .neighbors
                .iter()
                .map(|n| if n.is_null() { SimplexId::NULL } else { simplex_remap[n] })
                .collect();
            let tri = mesh.tri_mut(new_id);
            tri.neighbors = [neighbors[0], neighbors[1], neighbors[2]];
        }
        mesh.site_count = snapshot.sites.len();
        mesh.version = snapshot.version;
        mesh.outer_box_enabled = snapshot.outer_box.enabled;
        if snapshot.outer_box.bounds.len() == 4 {
            mesh.outer_box = [
                snapshot.outer_box.bounds[0],
                snapshot.outer_box.bounds[1],
                snapshot.outer_box.bounds[2],
                snapshot.outer_box.bounds[3],
            ];
        }
        for record in &snapshot.sites {
            let new_id = remap[&record.handle];
            let witness = if record.witness.is_null() {
                SimplexId::NULL
            } else {
                simplex_remap[&record.witness]
            };
            mesh.sites.get_mut(new_id.index, new_id.generation).unwrap().witness = witness;
            mesh.link_into_list(new_id);
        }
        if let Some((i, g, _)) = mesh.simplices.iter().next() {
            mesh.root_simplex = SimplexId { index: i, generation: g };
        }
        let sample_sites: Vec<SiteId> = mesh.nodes().collect();
        let n = sample_sites.len();
        mesh.sample_set.rebuild(sample_sites.into_iter(), n);

        mesh.validate()?;
        Ok(mesh)
    }

    // ---- validation --------------------------------------------------

    pub fn validate(&self) -> Result<(), MeshError> {
        for tid in self.simplices() {
            let tri = self.tri(tid);
            let pts = [self.coords(tri.sites[0]), self.coords(tri.sites[1]), self.coords(tri.sites[2])];
            if orient2d(pts[0], pts[1], pts[2]) <= 0.0 {
                return Err(MeshError::InvariantViolation(format!(
                    "triangle {:?} is not positively oriented",
                    tid
                )));
            }
            for i in 0..3 {
                let neighbor = tri.neighbors[i];
                if neighbor.is_null() {
                    continue;
                }
                let ntri = self.tri(neighbor);
                let back = ntri.neighbors.iter().position(|&n| n == tid);
                if back.is_none() {
                    return Err(MeshError::InvariantViolation(format!(
                        "neighbor reciprocity violated between {:?} and {:?}",
                        tid, neighbor
                    )));
                }
            }
        }
        for site in self.nodes() {
            let witness = self.site(site).witness;
            if witness.is_null() || self.tri(witness).index_of(site).is_none() {
                return Err(MeshError::InvariantViolation(format!(
                    "site {:?} has an invalid witness",
                    site
                )));
            }
        }
        let all_sites: Vec<SiteId> = self.nodes().collect();
        for tid in self.simplices() {
            let tri = self.tri(tid);
            let pts = [self.coords(tri.sites[0]), self.coords(tri.sites[1]), self.coords(tri.sites[2])];
            for &p in &all_sites {
                if tri.sites.contains(&p) {
                    continue;
                }
                if incircle(pts[0], pts[1], pts[2], self.coords(p)) > 0.0 {
                    return Err(MeshError::InvariantViolation(format!(
                        "triangle {:?} does not have an empty circumcircle (site {:?} inside)",
                        tid, p
                    )));
                }
            }
        }
        if self.nodes().count() != self.site_count {
            return Err(MeshError::InvariantViolation(
                "site count disagrees with linked-list enumeration".to_string(),
            ));
        }
        if self.simplices().count() != self.simplices.len() {
            return Err(MeshError::InvariantViolation(
                "simplex count disagrees with arena enumeration".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TriMesh {
    fn default() -> Self {
        Self::new()
    }
}
