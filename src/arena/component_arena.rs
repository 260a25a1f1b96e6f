// Component arena - storage for component state
//
// Components are addressed by a generational ComponentId like watchers are.
// Handles are Copy and can be captured freely by evaluators and callbacks;
// once a component is destroyed its id resolves to nothing.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use slab::Slab;

use crate::arena::WatcherId;
use crate::computed::ComputedEntry;
use crate::dirty::DirtyBuffer;
use crate::hash::FastIndexMap;
use crate::observer::Observed;

thread_local! {
    static COMPONENT_ARENA: RefCell<Slab<ComponentNode>> = const { RefCell::new(Slab::new()) };
    static NEXT_COMPONENT_UID: Cell<u32> = const { Cell::new(0) };
}

/// Generational identifier of a component.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ComponentId {
    slot: u32,
    uid: u32,
}

impl ComponentId {
    pub(crate) fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&ComponentNode) -> R,
    {
        COMPONENT_ARENA.with(|arena| {
            let arena = arena.borrow();
            arena
                .get(self.slot as usize)
                .filter(|node| node.uid == self.uid)
                .map(f)
        })
    }

    pub(crate) fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut ComponentNode) -> R,
    {
        COMPONENT_ARENA.with(|arena| {
            let mut arena = arena.borrow_mut();
            arena
                .get_mut(self.slot as usize)
                .filter(|node| node.uid == self.uid)
                .map(f)
        })
    }
}

pub(crate) struct ComponentNode {
    uid: u32,
    pub(crate) name: Arc<str>,
    pub(crate) dirty: DirtyBuffer,
    /// Every watcher created for this component, in creation order.
    pub(crate) watchers: Vec<WatcherId>,
    pub(crate) computed: FastIndexMap<Arc<str>, ComputedEntry>,
    pub(crate) data: Option<Observed>,
    pub(crate) being_destroyed: bool,
}

pub(crate) fn component_arena_insert(name: Arc<str>) -> ComponentId {
    let uid = NEXT_COMPONENT_UID.with(|next| {
        let uid = next.get();
        next.set(uid.wrapping_add(1));
        uid
    });
    let node = ComponentNode {
        uid,
        name,
        dirty: DirtyBuffer::default(),
        watchers: Vec::new(),
        computed: FastIndexMap::default(),
        data: None,
        being_destroyed: false,
    };
    COMPONENT_ARENA.with(|arena| {
        let slot = arena.borrow_mut().insert(node) as u32;
        ComponentId { slot, uid }
    })
}

pub(crate) fn component_arena_remove(id: ComponentId) -> Option<ComponentNode> {
    COMPONENT_ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        let live = arena
            .get(id.slot as usize)
            .is_some_and(|node| node.uid == id.uid);
        live.then(|| arena.remove(id.slot as usize))
    })
}
