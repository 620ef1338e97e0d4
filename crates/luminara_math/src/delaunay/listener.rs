//! Mutation notifications dispatched during insert/remove.
//!
//! A small tagged enum plus a caller-supplied `FnMut` callback, rather than
//! a heap-allocated registry of named listener objects — see the design
//! note on listeners-as-effects.

use super::arena::SiteId;

/// Mutation event reported to registered listeners. Carries the site or
/// simplex identity the event concerns; callbacks read further detail
/// through the mesh reference they're also given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshEvent {
    NodeWillBeAdded(SiteId),
    NodeAdded(SiteId),
    NodeWillBeRemoved(SiteId),
    NodeRemoved(SiteId),
    SimplexAdded(super::arena::SimplexId),
    SimplexRemoved(super::arena::SimplexId),
}

/// A registered callback and the handle used to unregister it.
pub struct ListenerHandle(pub(crate) u64);

pub(crate) struct ListenerSlot<M> {
    pub(crate) id: u64,
    pub(crate) callback: Box<dyn FnMut(&M, MeshEvent)>,
}

/// Ordered collection of registered listeners for a single mesh instance.
///
/// Dispatch order is registration order. A panic inside a callback
/// propagates to the caller of the mutating method that triggered it; the
/// mesh is left in its post-mutation, pre-listener state (mutation has
/// already completed by the time listeners fire).
pub(crate) struct Listeners<M> {
    slots: Vec<ListenerSlot<M>>,
    next_id: u64,
}

impl<M> Default for Listeners<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Listeners<M> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn register(&mut self, callback: Box<dyn FnMut(&M, MeshEvent)>) -> ListenerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push(ListenerSlot { id, callback });
        ListenerHandle(id)
    }

    pub(crate) fn unregister(&mut self, handle: ListenerHandle) -> bool {
        let before = self.slots.len();
        self.slots.retain(|s| s.id != handle.0);
        self.slots.len() != before
    }

    pub(crate) fn fire(&mut self, mesh: &M, event: MeshEvent) {
        for slot in &mut self.slots {
            (slot.callback)(mesh, event);
        }
    }
}
