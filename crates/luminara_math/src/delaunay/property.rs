//! Per-site property maps, keyed by stable site identity rather than an
//! inline per-node slot array — the per-node array in the original design
//! is an optimization, not a contract; here each named map is a single
//! growable vector indexed by the site's arena slot index.

use std::collections::HashMap;

use super::arena::SiteId;

/// A single named property map over sites, holding one `f64` value per
/// site (the value type used throughout the mesh's own property
/// bookkeeping; user-level wrappers can narrow/widen as needed).
#[derive(Debug, Clone, Default)]
pub struct NodePropertyMap {
    values: HashMap<SiteId, f64>,
    default: f64,
}

impl NodePropertyMap {
    fn new(default: f64) -> Self {
        Self {
            values: HashMap::new(),
            default,
        }
    }

    pub fn get(&self, site: SiteId) -> f64 {
        self.values.get(&site).copied().unwrap_or(self.default)
    }

    pub fn put(&mut self, site: SiteId, value: f64) {
        self.values.insert(site, value);
    }

    pub(crate) fn remove(&mut self, site: SiteId) {
        self.values.remove(&site);
    }
}

/// Directory of named property maps, created on first access.
#[derive(Debug, Default)]
pub struct PropertyMapDirectory {
    maps: HashMap<String, NodePropertyMap>,
}

impl PropertyMapDirectory {
    pub(crate) fn new() -> Self {
        Self {
            maps: HashMap::new(),
        }
    }

    /// Returns the named map, creating it (default value 0.0) if absent.
    pub fn get_or_create(&mut self, name: &str) -> &mut NodePropertyMap {
        self.maps
            .entry(name.to_string())
            .or_insert_with(|| NodePropertyMap::new(0.0))
    }

    pub fn has(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&NodePropertyMap> {
        self.maps.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.maps.keys().cloned().collect()
    }

    pub(crate) fn on_site_removed(&mut self, site: SiteId) {
        for map in self.maps.values_mut() {
            map.remove(site);
        }
    }
}
