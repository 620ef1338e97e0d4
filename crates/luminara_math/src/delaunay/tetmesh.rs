//! Incremental 3D Delaunay (tetrahedral) triangulation.
//!
//! The most complex engine in the crate: cavity insertion and gift-wrap
//! deletion both operate over a genuinely two-dimensional boundary
//! surface (the facets of the destroyed tetrahedra), so unlike the 2D
//! engine's simple cyclic polygon, linking the new tetrahedra to each
//! other requires the [`FaceKey`] add-or-cancel matching the auxiliary
//! hash set was built for.
//!
//! Facet convention: for a positively oriented tetrahedron
//! `(v0, v1, v2, v3)` (`orient3d(v0, v1, v2, v3) > 0`), the face opposite
//! vertex `i` is listed CCW as seen from outside the tetrahedron:
//! opposite v0 is `(v1, v3, v2)`, opposite v1 is `(v0, v2, v3)`, opposite
//! v2 is `(v0, v3, v1)`, opposite v3 is `(v0, v1, v2)`.

use rustc_hash::{FxHashMap, FxHashSet};

use log::{debug, trace};

use crate::foundations::{center_sphere_3d, insphere, orient3d};

use super::arena::{Arena, SimplexId, SiteId};
use super::error::MeshError;
use super::hashset::{FaceKey, OrientedKey, OrientedSet};
use super::listener::{Listeners, MeshEvent};
use super::locate::{PointLocation, SampleSet};
use super::property::PropertyMapDirectory;
use super::snapshot::{collect_properties, OuterBoxRecord, SimplexRecord, Snapshot, SiteRecord, FORMAT_TAG};
use super::{ListenerHandle, MarkColor, MarkCounters, MeshConfig};

#[derive(Debug, Clone)]
struct Site3 {
    coords: [f64; 3],
    original: [f32; 3],
    payload: u64,
    sequence: u64,
    prev: SiteId,
    next: SiteId,
    witness: SimplexId,
    in_mesh: bool,
    mark: u32,
}

#[derive(Debug, Clone)]
struct Tetra {
    sites: [SiteId; 4],
    neighbors: [SimplexId; 4],
    mark: u32,
    circumcenter: Option<[f64; 3]>,
    circumradius: Option<f64>,
    inner: Option<bool>,
}

impl Tetra {
    fn facet_opposite(&self, i: usize) -> (SiteId, SiteId, SiteId) {
        let [v0, v1, v2, v3] = self.sites;
        match i {
            0 => (v1, v3, v2),
            1 => (v0, v2, v3),
            2 => (v0, v3, v1),
            _ => (v0, v1, v2),
        }
    }

    fn index_of(&self, site: SiteId) -> Option<usize> {
        self.sites.iter().position(|&s| s == site)
    }

    /// Quality metric `12 / sqrt(2) * volume / max_edge_length^3`, the
    /// resolved form of a regular tetrahedron scoring 1.0.
    fn quality(&self, coords: &[[f64; 3]; 4]) -> f64 {
        let vol = tetra_volume(coords).abs();
        let mut max_edge_sq = 0.0f64;
        for i in 0..4 {
            for j in (i + 1)..4 {
                let d = sq_dist(coords[i], coords[j]);
                if d > max_edge_sq {
                    max_edge_sq = d;
                }
            }
        }
        let max_edge = max_edge_sq.sqrt();
        if max_edge == 0.0 {
            return 0.0;
        }
        (12.0 / std::f64::consts::SQRT_2) * vol / max_edge.powi(3)
    }
}

fn sq_dist(a: [f64; 3], b: [f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn tetra_volume(c: &[[f64; 3]; 4]) -> f64 {
    let a = [c[1][0] - c[0][0], c[1][1] - c[0][1], c[1][2] - c[0][2]];
    let b = [c[2][0] - c[0][0], c[2][1] - c[0][1], c[2][2] - c[0][2]];
    let d = [c[3][0] - c[0][0], c[3][1] - c[0][1], c[3][2] - c[0][2]];
    let cross = [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ];
    (cross[0] * d[0] + cross[1] * d[1] + cross[2] * d[2]) / 6.0
}

/// A facet (triangle) of the current triangulation.
#[derive(Debug, Clone, Copy)]
pub struct Facet {
    pub a: SiteId,
    pub b: SiteId,
    pub c: SiteId,
    pub hint: SimplexId,
}

/// A directed edge of the current triangulation.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub a: SiteId,
    pub b: SiteId,
    pub hint: SimplexId,
}

/// Incremental 3D Delaunay tetrahedral mesh.
///
/// Not `Sync`: all mutating operations must be externally serialized by
/// the embedder (single-writer model).
pub struct TetMesh {
    sites: Arena<Site3>,
    simplices: Arena<Tetra>,
    head_site: SiteId,
    root_simplex: SimplexId,
    site_count: usize,
    sample_set: SampleSet,
    marks: MarkCounters,
    site_marks: MarkCounters,
    listeners: Listeners<TetMesh>,
    properties: PropertyMapDirectory,
    version: u64,
    config: MeshConfig,
    outer_box_enabled: bool,
    outer_box: [f64; 6], // xmin,xmax,ymin,ymax,zmin,zmax
    next_sequence: u64,
}

#[cfg(test)]
fn _assert_send() {
    fn assert_send<T: Send>() {}
    assert_send::<TetMesh>();
}

impl TetMesh {
    pub fn new() -> Self {
        Self::with_config(MeshConfig::default_for_dim(3))
    }

    pub fn with_config(config: MeshConfig) -> Self {
        Self {
            sites: Arena::new(config.recycler_capacity),
            simplices: Arena::new(config.recycler_capacity),
            head_site: SiteId::NULL,
            root_simplex: SimplexId::NULL,
            site_count: 0,
            sample_set: SampleSet::new(config.sample_set_k, 3),
            marks: MarkCounters::default(),
            site_marks: MarkCounters::default(),
            listeners: Listeners::new(),
            properties: PropertyMapDirectory::new(),
            version: 0,
            config,
            outer_box_enabled: false,
            outer_box: [0.0; 6],
            next_sequence: 0,
        }
    }

    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn tet(&self, id: SimplexId) -> &Tetra {
        self.simplices.get(id.index, id.generation).expect("stale or invalid SimplexId")
    }

    fn tet_mut(&mut self, id: SimplexId) -> &mut Tetra {
        self.simplices
            .get_mut(id.index, id.generation)
            .expect("stale or invalid SimplexId")
    }

    fn site(&self, id: SiteId) -> &Site3 {
        self.sites.get(id.index, id.generation).expect("stale or invalid SiteId")
    }

    fn site_mut(&mut self, id: SiteId) -> &mut Site3 {
        self.sites.get_mut(id.index, id.generation).expect("stale or invalid SiteId")
    }

    fn coords(&self, id: SiteId) -> [f64; 3] {
        self.site(id).coords
    }

    // ---- site lifecycle -------------------------------------------------

    pub fn create_site(&mut self, coords: [f32; 3], payload: u64) -> SiteId {
        let perturbed = super::perturb::perturb3(coords);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let (index, generation) = self.sites.insert(Site3 {
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

    fn find_duplicate(&self, coords: [f64; 3]) -> Option<SiteId> {
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

    pub fn add_node(&mut self, site: SiteId) -> bool {
        let coords = self.coords(site);

        if self.root_simplex.is_null() {
            return self.add_node_pre_seed(site, coords);
        }

        let location = self.locate_point(coords[0], coords[1], coords[2]);
        if let PointLocation::OnSite(_) = location {
            return false;
        }

        self.listeners_fire(MeshEvent::NodeWillBeAdded(site));
        self.link_into_list(site);
        self.sites.get_mut(site.index, site.generation).unwrap().in_mesh = true;
        self.site_count += 1;

        let witness = location.witness().expect("non-OnSite location always has a witness");
        let (destroyed, boundary) = self.build_cavity(witness, coords);
        for tid in &destroyed {
            self.listeners_fire(MeshEvent::SimplexRemoved(*tid));
            self.simplices.remove(tid.index, tid.generation);
        }
        let new_tets = self.retriangulate_cavity(site, &boundary);
        for &tid in &new_tets {
            self.listeners_fire(MeshEvent::SimplexAdded(tid));
        }

        self.repair_witnesses(&new_tets);
        if let Some(&first) = new_tets.first() {
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

    fn add_node_pre_seed(&mut self, site: SiteId, coords: [f64; 3]) -> bool {
        if self.find_duplicate(coords).is_some() {
            return false;
        }
        self.listeners_fire(MeshEvent::NodeWillBeAdded(site));
        self.link_into_list(site);
        self.sites.get_mut(site.index, site.generation).unwrap().in_mesh = true;
        self.site_count += 1;
        self.sample_set.on_insert(site, self.site_count);
        self.bump_version();
        self.listeners_fire(MeshEvent::NodeAdded(site));

        if self.site_count == 4 {
            self.seed_first_tetra();
        }
        true
    }

    fn seed_first_tetra(&mut self) {
        let sites: Vec<SiteId> = self.nodes().collect();
        debug_assert_eq!(sites.len(), 4);
        let (a, b, c, d) = (sites[0], sites[1], sites[2], sites[3]);
        let (pa, pb, pc, pd) = (self.coords(a), self.coords(b), self.coords(c), self.coords(d));
        let o = orient3d(pa, pb, pc, pd);
        if o == 0.0 {
            panic!("degenerate seed: first four sites are exactly coplanar");
        }
        let (a, b, c, d) = if o > 0.0 { (a, b, c, d) } else { (a, b, d, c) };
        let tid = self.alloc_tetra([a, b, c, d], [SimplexId::NULL; 4]);
        self.root_simplex = tid;
        for &s in &[a, b, c, d] {
            self.sites.get_mut(s.index, s.generation).unwrap().witness = tid;
        }
        self.listeners_fire(MeshEvent::SimplexAdded(tid));
        trace!("seeded first tetrahedron {:?}", tid);
    }

    fn alloc_tetra(&mut self, sites: [SiteId; 4], neighbors: [SimplexId; 4]) -> SimplexId {
        let (index, generation) = self.simplices.insert(Tetra {
            sites,
            neighbors,
            mark: 0,
            circumcenter: None,
            circumradius: None,
            inner: None,
        });
        SimplexId { index, generation }
    }

    fn repair_witnesses(&mut self, new_tets: &[SimplexId]) {
        for &tid in new_tets {
            let sites = self.tet(tid).sites;
            for s in sites {
                self.sites.get_mut(s.index, s.generation).unwrap().witness = tid;
            }
        }
    }

    /// Builds the cavity of tetrahedra whose circumsphere strictly
    /// contains `coords`, starting from `witness`. Returns the destroyed
    /// simplex list and the retained boundary facets with their
    /// surviving outer neighbor (null if the facet was already on the
    /// hull).
    fn build_cavity(
        &mut self,
        witness: SimplexId,
        coords: [f64; 3],
    ) -> (Vec<SimplexId>, FxHashMap<(SiteId, SiteId, SiteId), SimplexId>) {
        let mut stack = vec![witness];
        let mut in_cavity: FxHashSet<SimplexId> = FxHashSet::default();
        let mut destroyed = Vec::new();
        let mut boundary_set: OrientedSet<FaceKey> = OrientedSet::new();
        let mut boundary_owner: FxHashMap<FaceKey, SimplexId> = FxHashMap::default();

        while let Some(tid) = stack.pop() {
            if in_cavity.contains(&tid) {
                continue;
            }
            let tet = self.tet(tid).clone();
            let pts = [
                self.coords(tet.sites[0]),
                self.coords(tet.sites[1]),
                self.coords(tet.sites[2]),
                self.coords(tet.sites[3]),
            ];
            if tid != witness && insphere(pts[0], pts[1], pts[2], pts[3], coords) <= 0.0 {
                continue;
            }
            in_cavity.insert(tid);
            destroyed.push(tid);

            for i in 0..4 {
                let (a, b, c) = tet.facet_opposite(i);
                let neighbor = tet.neighbors[i];
                let key = FaceKey(a, b, c);
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
            out.insert((k.0, k.1, k.2), v);
        }
        (destroyed, out)
    }

    /// Builds one new tetrahedron per retained boundary facet, apex at
    /// `new_site`, then links the new tetrahedra to each other across
    /// their shared internal faces using the same add-or-cancel matching
    /// the auxiliary facet set performs for cavity bookkeeping — the
    /// cavity surface is a genuine 2-manifold here, not a simple cycle,
    /// so (unlike the 2D engine) this matching cannot be replaced by
    /// walking a cyclic order.
    fn retriangulate_cavity(
        &mut self,
        new_site: SiteId,
        boundary: &FxHashMap<(SiteId, SiteId, SiteId), SimplexId>,
    ) -> Vec<SimplexId> {
        let mut new_tets = Vec::with_capacity(boundary.len());
        let mut internal: OrientedSet<FaceKey> = OrientedSet::new();
        let mut internal_owner: FxHashMap<FaceKey, (SimplexId, usize)> = FxHashMap::default();

        for (&(a, b, c), &outer) in boundary {
            // New tetra (new_site, a, b, c); facet opposite new_site is
            // (a, b, c), matching `facet_opposite(0)` convention's
            // ordering given sites = [new_site, a, b, c].
            let tid = self.alloc_tetra([new_site, a, b, c], [outer, SimplexId::NULL, SimplexId::NULL, SimplexId::NULL]);
            if !outer.is_null() {
                self.relink_neighbor_facet(outer, tid, FaceKey(a, b, c).mate());
            }
            new_tets.push(tid);

            for i in 1..4 {
                let (fa, fb, fc) = self.tet(tid).facet_opposite(i);
                let key = FaceKey(fa, fb, fc);
                if internal.offer(key) {
                    internal_owner.insert(key, (tid, i));
                } else if let Some(&(owner_tid, owner_i)) = internal_owner.get(&key.mate()) {
                    self.tet_mut(tid).neighbors[i] = owner_tid;
                    self.tet_mut(owner_tid).neighbors[owner_i] = tid;
                    internal_owner.remove(&key.mate());
                }
            }
        }
        new_tets
    }

    fn relink_neighbor_facet(&mut self, outer: SimplexId, tid: SimplexId, expected: FaceKey) {
        let otet = self.tet_mut(outer);
        for i in 0..4 {
            let (a, b, c) = otet.facet_opposite(i);
            if FaceKey(a, b, c) == expected {
                otet.neighbors[i] = tid;
                return;
            }
        }
    }

    // ---- removal ----------------------------------------------------

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

        if self.site_count < 4 {
            let leftover: Vec<SimplexId> = self.simplices().collect();
            for tid in leftover {
                self.listeners_fire(MeshEvent::SimplexRemoved(tid));
                self.simplices.remove(tid.index, tid.generation);
            }
            self.root_simplex = SimplexId::NULL;
            self.bump_version();
            self.listeners_fire(MeshEvent::NodeRemoved(site));
            return true;
        }

        let witness = self.site(site).witness;
        let removed = self.incident_tetrahedra(site, witness);
        for &tid in &removed {
            self.listeners_fire(MeshEvent::SimplexRemoved(tid));
        }
        let mut boundary = Vec::new();
        for &tid in &removed {
            let tet = self.tet(tid);
            let i = tet.index_of(site).unwrap();
            let (a, b, c) = tet.facet_opposite(i);
            boundary.push((a, b, c, tet.neighbors[i]));
        }
        let candidates: Vec<SiteId> = removed
            .iter()
            .flat_map(|&tid| self.tet(tid).sites)
            .filter(|&s| s != site)
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();

        for &tid in &removed {
            self.simplices.remove(tid.index, tid.generation);
        }

        let new_tets = self.gift_wrap(boundary, &candidates);
        for &tid in &new_tets {
            self.listeners_fire(MeshEvent::SimplexAdded(tid));
        }
        self.repair_witnesses(&new_tets);
        if let Some(&first) = new_tets.first() {
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

    /// Breadth-first collection of every tetrahedron incident to `site`,
    /// starting from its witness and expanding across shared faces that
    /// also contain `site`.
    fn incident_tetrahedra(&self, site: SiteId, witness: SimplexId) -> Vec<SimplexId> {
        let mut visited = FxHashSet::default();
        let mut stack = vec![witness];
        let mut out = Vec::new();
        while let Some(tid) = stack.pop() {
            if !visited.insert(tid) {
                continue;
            }
            out.push(tid);
            let tet = self.tet(tid);
            for i in 0..4 {
                if tet.sites[i] == site {
                    continue; // neighbor[i] is opposite site, doesn't touch it
                }
                let neighbor = tet.neighbors[i];
                if !neighbor.is_null() && self.tet(neighbor).index_of(site).is_some() {
                    stack.push(neighbor);
                }
            }
        }
        out
    }

    /// Gift-wraps the polyhedral cavity left by a removed site: repeatedly
    /// picks a boundary facet and the candidate site on its outward side
    /// with an empty circumsphere among the remaining candidates.
    fn gift_wrap(
        &mut self,
        boundary: Vec<(SiteId, SiteId, SiteId, SimplexId)>,
        candidates: &[SiteId],
    ) -> Vec<SimplexId> {
        let mut faces: OrientedSet<FaceKey> = OrientedSet::new();
        let mut owners: FxHashMap<FaceKey, SimplexId> = FxHashMap::default();
        for &(a, b, c, outer) in &boundary {
            let key = FaceKey(a, b, c);
            faces.offer(key);
            owners.insert(key, outer);
        }

        let mut new_tets = Vec::new();
        while let Some(facet) = faces.pop() {
            let FaceKey(a, b, c) = facet;
            let outer = owners.remove(&facet).unwrap_or(SimplexId::NULL);
            let (pa, pb, pc) = (self.coords(a), self.coords(b), self.coords(c));

            let mut best: Option<SiteId> = None;
            for &q in candidates {
                if q == a || q == b || q == c {
                    continue;
                }
                let pq = self.coords(q);
                if orient3d(pa, pb, pc, pq) >= 0.0 {
                    continue; // q must be strictly below the facet plane to extend outward
                }
                // `orient3d(pa,pb,pc,pq) < 0` here (the guard above only lets
                // such `q` through), which is the reverse of insphere's
                // documented `orient3d(pa,pb,pc,pd) > 0` precondition, so its
                // sign is flipped relative to the usual inside/outside
                // reading: `>= 0.0` is "r is outside or on", not "<= 0.0`.
                let empty = candidates.iter().all(|&r| {
                    if r == a || r == b || r == c || r == q {
                        return true;
                    }
                    insphere(pa, pb, pc, pq, self.coords(r)) >= 0.0
                });
                if empty {
                    best = Some(q);
                    break;
                }
            }

            match best {
                Some(q) => {
                    // `q` must be first, mirroring `retriangulate_cavity`: the
                    // facet opposite v0 is the one matched against `outer`,
                    // and that's only the boundary facet `(a, b, c)` when the
                    // apex occupies v0.
                    let tid = self.alloc_tetra([q, a, b, c], [outer, SimplexId::NULL, SimplexId::NULL, SimplexId::NULL]);
                    if !outer.is_null() {
                        self.relink_neighbor_facet(outer, tid, FaceKey(a, b, c).mate());
                    }
                    new_tets.push(tid);
                    for i in 1..4 {
                        let (fa, fb, fc) = self.tet(tid).facet_opposite(i);
                        let key = FaceKey(fa, fb, fc);
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
                        self.set_neighbor_for_facet(outer, FaceKey(a, b, c).mate(), SimplexId::NULL);
                        // `F` reverts to a hull facet with no new tetrahedron
                        // covering it; its sites may still carry a witness
                        // into one of the just-destroyed tetrahedra, so
                        // repoint them at the surviving neighbor directly.
                        for s in [a, b, c] {
                            self.sites.get_mut(s.index, s.generation).unwrap().witness = outer;
                        }
                    }
                }
            }
        }
        new_tets
    }

    fn link_pair(&mut self, a: SimplexId, b: SimplexId, facet_on_a: FaceKey, facet_on_b: FaceKey) {
        self.set_neighbor_for_facet(a, facet_on_a, b);
        self.set_neighbor_for_facet(b, facet_on_b, a);
    }

    fn set_neighbor_for_facet(&mut self, tid: SimplexId, facet: FaceKey, value: SimplexId) {
        let tet = self.tet_mut(tid);
        for i in 0..4 {
            let (a, b, c) = tet.facet_opposite(i);
            if FaceKey(a, b, c) == facet {
                tet.neighbors[i] = value;
                return;
            }
        }
    }

    // ---- motion -------------------------------------------------------

    pub fn move_node(&mut self, site: SiteId, coords: [f32; 3]) -> bool {
        let perturbed = super::perturb::perturb3(coords);
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

    pub fn locate_point(&self, x: f64, y: f64, z: f64) -> PointLocation {
        if self.root_simplex.is_null() {
            if let Some(dup) = self.find_duplicate([x, y, z]) {
                return PointLocation::OnSite(dup);
            }
            return PointLocation::Outside(SimplexId::NULL);
        }

        let start = self.seed_for_walk(x, y, z);
        let mut current = self.site(start).witness;
        if current.is_null() {
            current = self.root_simplex;
        }

        loop {
            let tet = self.tet(current).clone();
            let pts = [
                self.coords(tet.sites[0]),
                self.coords(tet.sites[1]),
                self.coords(tet.sites[2]),
                self.coords(tet.sites[3]),
            ];
            for (idx, &p) in pts.iter().enumerate() {
                if p == [x, y, z] {
                    return PointLocation::OnSite(tet.sites[idx]);
                }
            }

            let mut orientations = [0.0f64; 4];
            for i in 0..4 {
                let (a, b, c) = tet.facet_opposite(i);
                orientations[i] = orient3d(self.coords(a), self.coords(b), self.coords(c), [x, y, z]);
            }

            if let Some(i) = orientations.iter().position(|&v| v < 0.0) {
                let neighbor = tet.neighbors[i];
                if neighbor.is_null() {
                    return PointLocation::Outside(current);
                }
                current = neighbor;
                continue;
            }

            let zero_count = orientations.iter().filter(|&&v| v == 0.0).count();
            if zero_count == 1 {
                let i = orientations.iter().position(|&v| v == 0.0).unwrap();
                let (a, b, c) = tet.facet_opposite(i);
                return PointLocation::OnFace(a, b, c, current);
            }
            if zero_count == 2 {
                let zeros: Vec<usize> = orientations
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| v == 0.0)
                    .map(|(i, _)| i)
                    .collect();
                let shared = shared_edge_of_two_facets(&tet, zeros[0], zeros[1]);
                if let Some((u, v)) = shared {
                    return PointLocation::OnEdge(u, v, current);
                }
            }
            return PointLocation::Inside(current);
        }
    }

    fn seed_for_walk(&self, x: f64, y: f64, z: f64) -> SiteId {
        let mut best = self.head_site;
        let mut best_dist = f64::INFINITY;
        let candidates = self.sample_set.sites().iter().copied().chain(std::iter::once(self.head_site));
        for s in candidates {
            if s.is_null() {
                continue;
            }
            let p = self.coords(s);
            let d = sq_dist(p, [x, y, z]);
            if d < best_dist {
                best_dist = d;
                best = s;
            }
        }
        best
    }

    pub fn find_node_nearest_linear(&self, x: f64, y: f64, z: f64) -> Option<SiteId> {
        self.nodes().min_by(|&a, &b| {
            let da = sq_dist(self.coords(a), [x, y, z]);
            let db = sq_dist(self.coords(b), [x, y, z]);
            da.partial_cmp(&db).unwrap()
        })
    }

    pub fn find_node_nearest(&self, x: f64, y: f64, z: f64) -> Option<SiteId> {
        if self.head_site.is_null() {
            return None;
        }
        match self.locate_point(x, y, z) {
            PointLocation::OnSite(s) => Some(s),
            loc => {
                let witness = loc.witness()?;
                let tet = self.tet(witness);
                tet.sites
                    .iter()
                    .copied()
                    .min_by(|&a, &b| {
                        let da = sq_dist(self.coords(a), [x, y, z]);
                        let db = sq_dist(self.coords(b), [x, y, z]);
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
        for tid in self.tets_around_site(a, witness) {
            if self.tet(tid).index_of(b).is_some() {
                return Some(Edge { a, b, hint: tid });
            }
        }
        None
    }

    pub fn find_facet(&self, a: SiteId, b: SiteId, c: SiteId) -> Option<Facet> {
        let witness = self.site(a).witness;
        if witness.is_null() {
            return None;
        }
        for tid in self.tets_around_site(a, witness) {
            let tet = self.tet(tid);
            if tet.index_of(b).is_some() && tet.index_of(c).is_some() {
                return Some(Facet { a, b, c, hint: tid });
            }
        }
        None
    }

    pub fn find_simplex(&self, a: SiteId, b: SiteId, c: SiteId, d: SiteId) -> Option<SimplexId> {
        let witness = self.site(a).witness;
        if witness.is_null() {
            return None;
        }
        self.tets_around_site(a, witness).into_iter().find(|&tid| {
            let tet = self.tet(tid);
            tet.index_of(b).is_some() && tet.index_of(c).is_some() && tet.index_of(d).is_some()
        })
    }

    fn tets_around_site(&self, site: SiteId, witness: SimplexId) -> Vec<SimplexId> {
        self.incident_tetrahedra(site, witness)
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

    pub fn facets(&self) -> Vec<Facet> {
        let mut seen: FxHashSet<FaceKey> = FxHashSet::default();
        let mut out = Vec::new();
        for tid in self.simplices() {
            let tet = self.tet(tid);
            for i in 0..4 {
                let (a, b, c) = tet.facet_opposite(i);
                let key = FaceKey(a, b, c);
                if !seen.contains(&key.mate()) && seen.insert(key) {
                    out.push(Facet { a, b, c, hint: tid });
                }
            }
        }
        out
    }

    /// Every distinct edge of the triangulation, one entry per unordered
    /// site pair sharing a tetrahedron.
    pub fn edges(&self) -> Vec<Edge> {
        let mut seen: FxHashSet<(SiteId, SiteId)> = FxHashSet::default();
        let mut out = Vec::new();
        for tid in self.simplices() {
            let tet = self.tet(tid);
            for i in 0..4 {
                for j in (i + 1)..4 {
                    let (u, v) = (tet.sites[i], tet.sites[j]);
                    let canon = if u.sequence() < v.sequence() { (u, v) } else { (v, u) };
                    if seen.insert(canon) {
                        out.push(Edge { a: u, b: v, hint: tid });
                    }
                }
            }
        }
        out
    }

    pub fn hull_facets(&self) -> Vec<Facet> {
        let mut out = Vec::new();
        for tid in self.simplices() {
            let tet = self.tet(tid);
            for i in 0..4 {
                if tet.neighbors[i].is_null() {
                    let (a, b, c) = tet.facet_opposite(i);
                    out.push(Facet { a, b, c, hint: tid });
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

    // ---- traversal ------------------------------------------------

    pub fn node_nabors(&self, site: SiteId) -> Vec<SiteId> {
        let witness = self.site(site).witness;
        if witness.is_null() {
            return Vec::new();
        }
        let mut result = Vec::new();
        let mut seen = FxHashSet::default();
        for tid in self.tets_around_site(site, witness) {
            for &s in &self.tet(tid).sites {
                if s != site && seen.insert(s) {
                    result.push(s);
                }
            }
        }
        result
    }

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

    /// Tetrahedra incident to `site`.
    pub fn simplex_nabors_of_site(&self, site: SiteId) -> Vec<SimplexId> {
        let witness = self.site(site).witness;
        if witness.is_null() {
            return Vec::new();
        }
        self.tets_around_site(site, witness)
    }

    /// Tetrahedra in the ring around edge `(a, b)`, by the outer site they
    /// pair with the edge (one tetrahedron per edge-ring entry — see
    /// [`Self::edge_ring`] for the opposite-site rotation itself).
    pub fn simplex_nabors_of_edge(&self, a: SiteId, b: SiteId) -> Vec<SimplexId> {
        self.simplex_nabors_of_site(a)
            .into_iter()
            .filter(|&tid| self.tet(tid).index_of(b).is_some())
            .collect()
    }

    /// The (at most two) tetrahedra sharing facet `(a, b, c)`.
    pub fn simplex_nabors_of_face(&self, a: SiteId, b: SiteId, c: SiteId) -> Vec<SimplexId> {
        self.simplex_nabors_of_site(a)
            .into_iter()
            .filter(|&tid| {
                let tet = self.tet(tid);
                tet.index_of(b).is_some() && tet.index_of(c).is_some()
            })
            .collect()
    }

    /// Edges incident to `site`.
    pub fn edge_nabors(&self, site: SiteId) -> Vec<Edge> {
        self.node_nabors(site)
            .into_iter()
            .filter_map(|other| self.find_edge(site, other))
            .collect()
    }

    /// Facets sharing edge `(a, b)`: one per tetrahedron in the edge's ring,
    /// each the facet opposite the ring tetrahedron's site that is neither
    /// `a` nor `b`.
    pub fn face_nabors(&self, a: SiteId, b: SiteId) -> Vec<Facet> {
        self.simplex_nabors_of_edge(a, b)
            .into_iter()
            .filter_map(|tid| {
                let tet = self.tet(tid);
                let opposite = tet.sites.iter().copied().find(|&s| s != a && s != b)?;
                let i = tet.index_of(opposite)?;
                let (fa, fb, fc) = tet.facet_opposite(i);
                Some(Facet { a: fa, b: fb, c: fc, hint: tid })
            })
            .collect()
    }

    /// Walks the ring of tetrahedra sharing edge `(a, b)`, returning the
    /// "opposite" site of each ring tetrahedron in rotation order. Used
    /// by quality-mesh refinement passes to enumerate an edge's star.
    pub fn edge_ring(&self, a: SiteId, b: SiteId) -> Result<Vec<SiteId>, MeshError> {
        let start = self
            .find_edge(a, b)
            .ok_or_else(|| MeshError::PreconditionViolation("edge does not exist in the mesh".to_string()))?;
        let mut ring = Vec::new();
        let mut current = start.hint;
        let mut visited = FxHashSet::default();
        loop {
            if !visited.insert(current) {
                break;
            }
            let tet = self.tet(current);
            if let Some(opposite) = tet.sites.iter().copied().find(|&s| s != a && s != b && !ring.contains(&s)) {
                ring.push(opposite);
            }
            let next = tet
                .neighbors
                .iter()
                .copied()
                .find(|&n| !n.is_null() && self.tet(n).index_of(a).is_some() && self.tet(n).index_of(b).is_some() && n != current);
            match next {
                Some(n) if !visited.contains(&n) => current = n,
                _ => break,
            }
        }
        Ok(ring)
    }

    fn signed_dist(&self, normal: [f64; 3], d: f64, p: [f64; 3]) -> f64 {
        normal[0] * p[0] + normal[1] * p[1] + normal[2] * p[2] - d
    }

    /// Tetrahedra whose four sites straddle the plane `normal . x = d`
    /// (signs not all `<= 0` and not all `>= 0`). Seeded from the
    /// tetrahedron whose circumcenter lies nearest the plane, then
    /// expanded by flood-filling across neighbors that also straddle it.
    pub fn tets_in_plane(&self, normal: [f64; 3], d: f64) -> Vec<SimplexId> {
        let straddles = |tid: SimplexId| {
            let tet = self.tet(tid);
            let signs = tet.sites.map(|s| self.signed_dist(normal, d, self.coords(s)));
            signs.iter().any(|&s| s >= 0.0) && signs.iter().any(|&s| s <= 0.0)
        };
        let seed = self.simplices().min_by(|&a, &b| {
            let ca = self.circumcenter_of(a);
            let cb = self.circumcenter_of(b);
            self.signed_dist(normal, d, ca)
                .abs()
                .partial_cmp(&self.signed_dist(normal, d, cb).abs())
                .unwrap()
        });
        let Some(seed) = seed else { return Vec::new() };
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut frontier = vec![seed];
        seen.insert(seed);
        while let Some(tid) = frontier.pop() {
            if !straddles(tid) {
                continue;
            }
            out.push(tid);
            for n in self.tet(tid).neighbors {
                if !n.is_null() && seen.insert(n) {
                    frontier.push(n);
                }
            }
        }
        out
    }

    fn circumcenter_of(&self, tid: SimplexId) -> [f64; 3] {
        let tet = self.tet(tid);
        if let Some(c) = tet.circumcenter {
            return c;
        }
        let pts = tet.sites.map(|s| self.coords(s));
        center_sphere_3d(pts[0], pts[1], pts[2], pts[3])
    }

    /// Sites whose Voronoi cell intersects the plane `normal . x = d`:
    /// BFS from the site nearest the plane over tetrahedral neighbors,
    /// admitting any site whose incident tetrahedron's circumcenter sits
    /// on a different side of the plane than at least one of that
    /// tetrahedron's sites (the Voronoi polyhedron straddles the plane).
    pub fn nodes_nearest_plane(&self, normal: [f64; 3], d: f64) -> Vec<SiteId> {
        let seed = self.nodes().min_by(|&a, &b| {
            self.signed_dist(normal, d, self.coords(a))
                .abs()
                .partial_cmp(&self.signed_dist(normal, d, self.coords(b)).abs())
                .unwrap()
        });
        let Some(seed) = seed else { return Vec::new() };
        let straddles_site = |site: SiteId| {
            self.simplex_nabors_of_site(site).into_iter().any(|tid| {
                let c = self.circumcenter_of(tid);
                let c_side = self.signed_dist(normal, d, c) >= 0.0;
                self.tet(tid)
                    .sites
                    .iter()
                    .any(|&s| (self.signed_dist(normal, d, self.coords(s)) >= 0.0) != c_side)
            })
        };
        let mut result = Vec::new();
        let mut seen = FxHashSet::default();
        let mut frontier = vec![seed];
        seen.insert(seed);
        while let Some(site) = frontier.pop() {
            if !straddles_site(site) {
                continue;
            }
            result.push(site);
            for n in self.node_nabors(site) {
                if seen.insert(n) {
                    frontier.push(n);
                }
            }
        }
        result
    }

    pub fn simplex_quality(&self, tid: SimplexId) -> f64 {
        let tet = self.tet(tid);
        let pts = [
            self.coords(tet.sites[0]),
            self.coords(tet.sites[1]),
            self.coords(tet.sites[2]),
            self.coords(tet.sites[3]),
        ];
        tet.quality(&pts)
    }

    // ---- inner/outer classification ------------------------------------

    pub fn set_outer_box(&mut self, xmin: f64, xmax: f64, ymin: f64, ymax: f64, zmin: f64, zmax: f64) {
        self.outer_box = [xmin, xmax, ymin, ymax, zmin, zmax];
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
            self.tet_mut(id).inner = None;
        }
    }

    pub fn is_inner_simplex(&mut self, tid: SimplexId) -> bool {
        if !self.outer_box_enabled {
            return true;
        }
        if let Some(cached) = self.tet(tid).inner {
            return cached;
        }
        let tet = self.tet(tid).clone();
        let pts = [
            self.coords(tet.sites[0]),
            self.coords(tet.sites[1]),
            self.coords(tet.sites[2]),
            self.coords(tet.sites[3]),
        ];
        let center = tet.circumcenter.unwrap_or_else(|| center_sphere_3d(pts[0], pts[1], pts[2], pts[3]));
        let radius = sq_dist(center, pts[0]).sqrt();
        let [xmin, xmax, ymin, ymax, zmin, zmax] = self.outer_box;
        let inner = center[0] - radius >= xmin
            && center[0] + radius <= xmax
            && center[1] - radius >= ymin
            && center[1] + radius <= ymax
            && center[2] - radius >= zmin
            && center[2] + radius <= zmax;
        let tet_mut = self.tet_mut(tid);
        tet_mut.circumcenter = Some(center);
        tet_mut.circumradius = Some(radius);
        tet_mut.inner = Some(inner);
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
        self.tets_around_site(site, witness)
            .into_iter()
            .any(|t| self.is_inner_simplex(t))
    }

    /// An edge is inner iff at least one tetrahedron in its ring is inner
    /// (spec.md §4.8: "Same rule for edges and faces").
    pub fn is_inner_edge(&mut self, a: SiteId, b: SiteId) -> bool {
        if !self.outer_box_enabled {
            return true;
        }
        self.simplex_nabors_of_edge(a, b).into_iter().any(|t| self.is_inner_simplex(t))
    }

    /// A face is inner iff at least one of its (at most two) adjacent
    /// tetrahedra is inner.
    pub fn is_inner_face(&mut self, a: SiteId, b: SiteId, c: SiteId) -> bool {
        if !self.outer_box_enabled {
            return true;
        }
        self.simplex_nabors_of_face(a, b, c)
            .into_iter()
            .any(|t| self.is_inner_simplex(t))
    }

    // ---- marks ------------------------------------------------------

    pub fn mark_red(&mut self, tid: SimplexId) {
        let red = self.marks.red;
        self.tet_mut(tid).mark = red;
    }

    pub fn mark_blue(&mut self, tid: SimplexId) {
        let blue = self.marks.blue;
        self.tet_mut(tid).mark = blue;
    }

    /// Generic form of `mark_red`/`mark_blue`, parameterized on the color.
    pub fn mark(&mut self, tid: SimplexId, color: MarkColor) {
        match color {
            MarkColor::Red => self.mark_red(tid),
            MarkColor::Blue => self.mark_blue(tid),
        }
    }

    pub fn unmark(&mut self, tid: SimplexId) {
        self.tet_mut(tid).mark = u32::MAX / 2;
    }

    pub fn is_marked_red(&self, tid: SimplexId) -> bool {
        self.tet(tid).mark == self.marks.red
    }

    pub fn is_marked_blue(&self, tid: SimplexId) -> bool {
        self.tet(tid).mark == self.marks.blue
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
            self.tet_mut(id).mark = 0;
        }
        self.marks = MarkCounters::default();
    }

    // ---- site marks ---------------------------------------------------
    //
    // Mirror of the simplex mark scheme above, on a separate `MarkCounters`
    // so clearing node marks never disturbs simplex marks. Nabor queries
    // like `node_nabors` still dedup with a per-call scratch set rather
    // than these marks (spec.md §9 explicitly allows a per-pass
    // visited-set in place of persistent marks), since these marks are a
    // caller-visible feature callers may hold across mesh operations and
    // must not be silently clobbered by an unrelated read query.

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

    pub fn register_listener(&mut self, callback: Box<dyn FnMut(&TetMesh, MeshEvent)>) -> ListenerHandle {
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
            let coords: [f64; 3] = [record.coords[0], record.coords[1], record.coords[2]];
            let (index, generation) = mesh.sites.insert(Site3 {
                coords,
                original: [coords[0] as f32, coords[1] as f32, coords[2] as f32],
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
                remap[&record.sites[3]],
            ];
            let (index, generation) = mesh.simplices.insert(Tetra {
                sites,
                neighbors: [SimplexId::NULL; 4],
                mark: 0,
                circumcenter: None,
                circumradius: None,
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
            let tet = mesh.tet_mut(new_id);
            tet.neighbors = [neighbors[0], neighbors[1], neighbors[2], neighbors[3]];
        }
        mesh.site_count = snapshot.sites.len();
        mesh.version = snapshot.version;
        mesh.outer_box_enabled = snapshot.outer_box.enabled;
        if snapshot.outer_box.bounds.len() == 6 {
            mesh.outer_box = [
                snapshot.outer_box.bounds[0],
                snapshot.outer_box.bounds[1],
                snapshot.outer_box.bounds[2],
                snapshot.outer_box.bounds[3],
                snapshot.outer_box.bounds[4],
                snapshot.outer_box.bounds[5],
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
            let tet = self.tet(tid);
            let pts = [
                self.coords(tet.sites[0]),
                self.coords(tet.sites[1]),
                self.coords(tet.sites[2]),
                self.coords(tet.sites[3]),
            ];
            if orient3d(pts[0], pts[1], pts[2], pts[3]) <= 0.0 {
                return Err(MeshError::InvariantViolation(format!(
                    "tetrahedron {:?} is not positively oriented",
                    tid
                )));
            }
            for i in 0..4 {
                let neighbor = tet.neighbors[i];
                if neighbor.is_null() {
                    continue;
                }
                let ntet = self.tet(neighbor);
                if !ntet.neighbors.contains(&tid) {
                    return Err(MeshError::InvariantViolation(format!(
                        "neighbor reciprocity violated between {:?} and {:?}",
                        tid, neighbor
                    )));
                }
            }
        }
        for site in self.nodes() {
            let witness = self.site(site).witness;
            if witness.is_null() || self.tet(witness).index_of(site).is_none() {
                return Err(MeshError::InvariantViolation(format!(
                    "site {:?} has an invalid witness",
                    site
                )));
            }
        }
        let all_sites: Vec<SiteId> = self.nodes().collect();
        for tid in self.simplices() {
            let tet = self.tet(tid);
            let pts = [
                self.coords(tet.sites[0]),
                self.coords(tet.sites[1]),
                self.coords(tet.sites[2]),
                self.coords(tet.sites[3]),
            ];
            for &p in &all_sites {
                if tet.sites.contains(&p) {
                    continue;
                }
                if insphere(pts[0], pts[1], pts[2], pts[3], self.coords(p)) > 0.0 {
                    return Err(MeshError::InvariantViolation(format!(
                        "tetrahedron {:?} does not have an empty circumsphere (site {:?} inside)",
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

impl Default for TetMesh {
    fn default() -> Self {
        Self::new()
    }
}

fn shared_edge_of_two_facets(tet: &Tetra, zero_a: usize, zero_b: usize) -> Option<(SiteId, SiteId)> {
    let mut sites_a = [tet.facet_opposite(zero_a).0, tet.facet_opposite(zero_a).1, tet.facet_opposite(zero_a).2];
    let sites_b = [tet.facet_opposite(zero_b).0, tet.facet_opposite(zero_b).1, tet.facet_opposite(zero_b).2];
    sites_a.sort_by_key(|s| s.sequence());
    let mut shared: Vec<SiteId> = sites_b.iter().copied().filter(|s| sites_a.contains(s)).collect();
    shared.sort_by_key(|s| s.sequence());
    if shared.len() == 2 {
        Some((shared[0], shared[1]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_regular_simplex(mesh: &mut TetMesh) -> [SiteId; 4] {
        let sites = [
            mesh.create_site([0.0, 0.0, 0.0], 0),
            mesh.create_site([1.0, 0.0, 0.0], 1),
            mesh.create_site([0.0, 1.0, 0.0], 2),
            mesh.create_site([0.0, 0.0, 1.0], 3),
        ];
        for &s in &sites {
            assert!(mesh.add_node(s));
        }
        sites
    }

    #[test]
    fn test_fewer_than_four_sites_produce_no_simplex() {
        let mut mesh = TetMesh::new();
        mesh.add_node(mesh.create_site([0.0, 0.0, 0.0], 0));
        mesh.add_node(mesh.create_site([1.0, 0.0, 0.0], 1));
        mesh.add_node(mesh.create_site([0.0, 1.0, 0.0], 2));
        assert_eq!(mesh.simplex_count(), 0);
    }

    #[test]
    fn test_fourth_generic_site_creates_one_tetrahedron() {
        let mut mesh = TetMesh::new();
        insert_regular_simplex(&mut mesh);
        assert_eq!(mesh.simplex_count(), 1);
    }

    #[test]
    fn test_seed_tetrahedron_is_positively_oriented() {
        let mut mesh = TetMesh::new();
        insert_regular_simplex(&mut mesh);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_duplicate_insert_refused() {
        let mut mesh = TetMesh::new();
        let sites = insert_regular_simplex(&mut mesh);
        let dup = mesh.create_site([0.0, 0.0, 0.0], 99);
        assert!(!mesh.add_node(dup));
        assert_eq!(mesh.site_count(), sites.len());
    }

    #[test]
    fn test_internal_point_insertion_splits_into_four() {
        let mut mesh = TetMesh::new();
        insert_regular_simplex(&mut mesh);
        let interior = mesh.create_site([0.2, 0.2, 0.2], 4);
        assert!(mesh.add_node(interior));
        assert_eq!(mesh.simplex_count(), 4);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_insert_then_remove_restores_counts() {
        let mut mesh = TetMesh::new();
        insert_regular_simplex(&mut mesh);
        let before_sites = mesh.site_count();
        let before_tets = mesh.simplex_count();

        let interior = mesh.create_site([0.2, 0.2, 0.2], 4);
        mesh.add_node(interior);
        assert!(mesh.remove_node(interior));

        assert_eq!(mesh.site_count(), before_sites);
        assert_eq!(mesh.simplex_count(), before_tets);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_version_strictly_increases_on_mutation() {
        let mut mesh = TetMesh::new();
        let v0 = mesh.version();
        mesh.add_node(mesh.create_site([0.0, 0.0, 0.0], 0));
        assert!(mesh.version() > v0);
    }

    #[test]
    fn test_snapshot_roundtrip_through_bincode() {
        let mut mesh = TetMesh::new();
        insert_regular_simplex(&mut mesh);
        let snap = mesh.snapshot();
        let bytes = snap.to_bincode().unwrap();
        let restored = Snapshot::from_bincode(&bytes).unwrap();
        let rebuilt = TetMesh::from_snapshot(restored).unwrap();
        assert_eq!(rebuilt.site_count(), mesh.site_count());
        assert_eq!(rebuilt.simplex_count(), mesh.simplex_count());
    }

    #[test]
    fn test_node_nabors_of_simplex_vertex() {
        let mut mesh = TetMesh::new();
        let sites = insert_regular_simplex(&mut mesh);
        let nabors = mesh.node_nabors(sites[0]);
        assert_eq!(nabors.len(), 3);
    }

    #[test]
    fn test_simplex_nabors_of_face_has_at_most_two() {
        let mut mesh = TetMesh::new();
        let sites = insert_regular_simplex(&mut mesh);
        let facet = mesh.tet(mesh.root_simplex).facet_opposite(0);
        let tets = mesh.simplex_nabors_of_face(facet.0, facet.1, facet.2);
        assert!(tets.len() <= 2 && !tets.is_empty());
    }

    #[test]
    fn test_edge_nabors_match_node_nabor_count() {
        let mut mesh = TetMesh::new();
        let sites = insert_regular_simplex(&mut mesh);
        let edges = mesh.edge_nabors(sites[0]);
        assert_eq!(edges.len(), mesh.node_nabors(sites[0]).len());
    }

    #[test]
    fn test_outer_box_classification() {
        let mut mesh = TetMesh::new();
        insert_regular_simplex(&mut mesh);
        mesh.set_outer_box(-10.0, 10.0, -10.0, 10.0, -10.0, 10.0);
        mesh.enable_outer_box();
        for tid in mesh.simplices().collect::<Vec<_>>() {
            assert!(mesh.is_inner_simplex(tid));
        }
    }

    #[test]
    fn test_simplex_quality_of_regular_tetrahedron_is_positive() {
        let mut mesh = TetMesh::new();
        insert_regular_simplex(&mut mesh);
        let tid = mesh.simplices().next().unwrap();
        assert!(mesh.simplex_quality(tid) > 0.0);
    }

    #[test]
    fn test_edges_of_regular_simplex_is_six() {
        let mut mesh = TetMesh::new();
        insert_regular_simplex(&mut mesh);
        assert_eq!(mesh.edges().len(), 6);
    }

    #[test]
    fn test_is_inner_edge_and_face_follow_simplex_classification() {
        let mut mesh = TetMesh::new();
        let sites = insert_regular_simplex(&mut mesh);
        mesh.set_outer_box(-10.0, 10.0, -10.0, 10.0, -10.0, 10.0);
        mesh.enable_outer_box();
        assert!(mesh.is_inner_edge(sites[0], sites[1]));
        assert!(mesh.is_inner_face(sites[0], sites[1], sites[2]));

        mesh.set_outer_box(100.0, 101.0, 100.0, 101.0, 100.0, 101.0);
        assert!(!mesh.is_inner_edge(sites[0], sites[1]));
        assert!(!mesh.is_inner_face(sites[0], sites[1], sites[2]));
    }

    #[test]
    fn test_node_marks_independent_of_simplex_marks() {
        let mut mesh = TetMesh::new();
        let sites = insert_regular_simplex(&mut mesh);
        let tid = mesh.simplices().next().unwrap();

        mesh.mark_node_red(sites[0]);
        mesh.mark_red(tid);
        assert!(mesh.is_node_marked_red(sites[0]));
        assert!(mesh.is_marked_red(tid));

        // Clearing node marks must not disturb simplex marks.
        mesh.clear_node_marks();
        assert!(!mesh.is_node_marked_red(sites[0]));
        assert!(mesh.is_marked_red(tid));
    }

    #[test]
    fn test_generic_mark_matches_mark_red_mark_blue() {
        let mut mesh = TetMesh::new();
        let sites = insert_regular_simplex(&mut mesh);
        let tid = mesh.simplices().next().unwrap();

        mesh.mark(tid, MarkColor::Blue);
        assert!(mesh.is_marked_blue(tid));

        mesh.mark_node(sites[0], MarkColor::Red);
        assert!(mesh.is_node_marked_red(sites[0]));
    }
}
