// Watcher arena - storage for watcher state
//
// Watchers live in a thread-local slab and are addressed by a generational
// WatcherId: the slab slot plus the watcher's creation uid. The uid is
// monotonic per thread and doubles as the scheduler's ordering key, so a
// watcher created earlier always flushes before one created later.
//
// A removed watcher leaves its id behind in dependency sets or the scheduler
// queue only transiently; lookups compare the uid and treat a mismatch as
// stale, returning None.
//
// The evaluation-target stack also lives here. Reads performed while a
// watcher evaluates are attributed to the top of the stack.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::sync::Arc;

use slab::Slab;

use crate::component::Component;
use crate::dep::{Dep, DepId};
use crate::error::Result;
use crate::hash::FastIndexMap;
use crate::value::Value;

/// Evaluator of a watcher: computes the watched value.
pub type Getter = Box<dyn FnMut(&Component) -> Result<Value>>;

/// Callback of a watcher, invoked with `(new_value, old_value)`.
pub type Callback = Box<dyn FnMut(&Component, &Value, &Value) -> Result<()>>;

pub(crate) const FLAG_LAZY: u8 = 1 << 0;
pub(crate) const FLAG_USER: u8 = 1 << 1;
pub(crate) const FLAG_SYNC: u8 = 1 << 2;
pub(crate) const FLAG_DEEP: u8 = 1 << 3;

thread_local! {
    static WATCHER_ARENA: RefCell<Slab<WatcherNode>> = const { RefCell::new(Slab::new()) };
    static NEXT_WATCHER_UID: Cell<u32> = const { Cell::new(0) };
    static TARGET_STACK: RefCell<Vec<Option<WatcherId>>> = const { RefCell::new(Vec::new()) };
}

/// Generational identifier of a watcher.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct WatcherId {
    slot: u32,
    uid: u32,
}

impl Ord for WatcherId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uid.cmp(&other.uid)
    }
}

impl PartialOrd for WatcherId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl WatcherId {
    /// Creation order of the watcher; lower uids were created first.
    pub fn uid(self) -> u32 {
        self.uid
    }

    /// Access the watcher state (read-only).
    ///
    /// Returns None if the watcher has been removed.
    pub(crate) fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&WatcherNode) -> R,
    {
        WATCHER_ARENA.with(|arena| {
            let arena = arena.borrow();
            arena
                .get(self.slot as usize)
                .filter(|node| node.uid == self.uid)
                .map(f)
        })
    }

    /// Access the watcher state mutably.
    ///
    /// The closure must not call back into user code: the arena stays
    /// borrowed for its duration.
    pub(crate) fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut WatcherNode) -> R,
    {
        WATCHER_ARENA.with(|arena| {
            let mut arena = arena.borrow_mut();
            arena
                .get_mut(self.slot as usize)
                .filter(|node| node.uid == self.uid)
                .map(f)
        })
    }

    #[cfg(test)]
    pub(crate) fn exists(self) -> bool {
        self.with(|_| ()).is_some()
    }

    pub(crate) fn has_flag(self, flag: u8) -> bool {
        self.with(|node| node.flags & flag != 0).unwrap_or(false)
    }

    /// Register `dep` as read during the current evaluation.
    ///
    /// Reads are deduplicated per evaluation; the watcher subscribes to the
    /// dependency only the first time it shows up across evaluations.
    pub(crate) fn add_dep(self, dep: &Dep) {
        let subscribe = self
            .with_mut(|node| {
                let id = dep.id();
                if node.new_deps.contains_key(&id) {
                    return false;
                }
                node.new_deps.insert(id, dep.clone());
                !node.deps.contains_key(&id)
            })
            .unwrap_or(false);

        if subscribe {
            dep.add_sub(self);
        }
    }

    /// Run the evaluator with the arena released.
    ///
    /// The evaluator is moved out of the arena for the duration of the call so
    /// it can create watchers or read other watchers, and moved back when done
    /// (even on panic). Returns None if the watcher is gone or already
    /// evaluating further up the stack.
    pub(crate) fn run_getter(self, component: &Component) -> Option<Result<Value>> {
        struct GetterGuard {
            id: WatcherId,
            getter: Option<Getter>,
        }

        impl Drop for GetterGuard {
            fn drop(&mut self) {
                if let Some(getter) = self.getter.take() {
                    self.id.with_mut(|node| node.getter = Some(getter));
                }
            }
        }

        let getter = self.with_mut(|node| node.getter.take()).flatten()?;
        let mut guard = GetterGuard {
            id: self,
            getter: Some(getter),
        };
        let result = guard.getter.as_mut().map(|getter| getter(component));
        result
    }

    /// Run the callback with the arena released, like [`run_getter`](Self::run_getter).
    pub(crate) fn run_callback(
        self,
        component: &Component,
        value: &Value,
        old: &Value,
    ) -> Option<Result<()>> {
        struct CallbackGuard {
            id: WatcherId,
            callback: Option<Callback>,
        }

        impl Drop for CallbackGuard {
            fn drop(&mut self) {
                if let Some(callback) = self.callback.take() {
                    self.id.with_mut(|node| node.callback = Some(callback));
                }
            }
        }

        let callback = self.with_mut(|node| node.callback.take()).flatten()?;
        let mut guard = CallbackGuard {
            id: self,
            callback: Some(callback),
        };
        let result = guard
            .callback
            .as_mut()
            .map(|callback| callback(component, value, old));
        result
    }

    /// Promote this evaluation's dependencies and unsubscribe from the ones
    /// that were not read again.
    pub(crate) fn cleanup_deps(self) {
        let stale = self
            .with_mut(|node| {
                let stale: Vec<Dep> = node
                    .deps
                    .iter()
                    .filter(|(id, _)| !node.new_deps.contains_key(*id))
                    .map(|(_, dep)| dep.clone())
                    .collect();
                std::mem::swap(&mut node.deps, &mut node.new_deps);
                node.new_deps.clear();
                stale
            })
            .unwrap_or_default();

        for dep in stale {
            cov_mark::hit!(stale_dependency_pruned);
            dep.remove_sub(self);
        }
    }
}

/// State of one watcher.
pub struct WatcherNode {
    pub(crate) uid: u32,
    pub(crate) component: Component,
    pub(crate) expression: Arc<str>,
    pub(crate) flags: u8,
    /// Taken out while the evaluator runs.
    pub(crate) getter: Option<Getter>,
    /// Taken out while the callback runs.
    pub(crate) callback: Option<Callback>,
    pub(crate) value: Value,
    pub(crate) deps: FastIndexMap<DepId, Dep>,
    pub(crate) new_deps: FastIndexMap<DepId, Dep>,
    /// Lazy watchers only: the cached value is stale.
    pub(crate) dirty: bool,
    pub(crate) active: bool,
    /// Computed key this watcher publishes under.
    pub(crate) key: Option<Arc<str>>,
}

impl WatcherNode {
    pub(crate) fn new(
        component: Component,
        expression: Arc<str>,
        flags: u8,
        getter: Getter,
        callback: Callback,
    ) -> Self {
        Self {
            uid: 0,
            component,
            expression,
            flags,
            getter: Some(getter),
            callback: Some(callback),
            value: Value::Null,
            deps: FastIndexMap::default(),
            new_deps: FastIndexMap::default(),
            dirty: flags & FLAG_LAZY != 0,
            active: true,
            key: None,
        }
    }
}

/// Insert a watcher, assigning the next creation uid.
pub(crate) fn watcher_arena_insert(mut node: WatcherNode) -> WatcherId {
    let uid = NEXT_WATCHER_UID.with(|next| {
        let uid = next.get();
        next.set(uid.wrapping_add(1));
        uid
    });
    node.uid = uid;
    WATCHER_ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        let slot = arena.insert(node) as u32;
        WatcherId { slot, uid }
    })
}

/// Remove a watcher; stale ids resolve to nothing afterwards.
pub(crate) fn watcher_arena_remove(id: WatcherId) -> Option<WatcherNode> {
    WATCHER_ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        let live = arena
            .get(id.slot as usize)
            .is_some_and(|node| node.uid == id.uid);
        live.then(|| arena.remove(id.slot as usize))
    })
}

/// The watcher whose evaluation is currently collecting dependencies.
pub fn current_target() -> Option<WatcherId> {
    TARGET_STACK.with(|stack| stack.borrow().last().copied().flatten())
}

/// Depth of the evaluation-target stack (nested evaluations).
#[cfg(test)]
pub(crate) fn target_depth() -> usize {
    TARGET_STACK.with(|stack| stack.borrow().len())
}

/// RAII guard that pushes an evaluation target and pops it when dropped,
/// including during unwinding.
pub(crate) struct TargetGuard {
    depth: usize,
}

impl TargetGuard {
    pub(crate) fn push(target: Option<WatcherId>) -> Self {
        let depth = TARGET_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(target);
            stack.len()
        });
        Self { depth }
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.truncate(self.depth - 1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(component: Component) -> WatcherNode {
        WatcherNode::new(
            component,
            Arc::from("test"),
            0,
            Box::new(|_| Ok(Value::Null)),
            Box::new(|_, _, _| Ok(())),
        )
    }

    #[test]
    fn removed_slot_reuse_does_not_revive_old_id() {
        let component = Component::new("arena");
        let first = watcher_arena_insert(node(component));
        watcher_arena_remove(first);
        let second = watcher_arena_insert(node(component));

        assert!(!first.exists());
        assert!(second.exists());
        assert!(second > first);
        assert!(first.with(|n| n.uid).is_none());

        watcher_arena_remove(second);
        component.destroy();
    }

    #[test]
    fn target_guard_restores_on_panic() {
        let component = Component::new("arena");
        let outer = watcher_arena_insert(node(component));
        let inner = watcher_arena_insert(node(component));

        let _outer_guard = TargetGuard::push(Some(outer));
        let result = std::panic::catch_unwind(|| {
            let _guard = TargetGuard::push(Some(inner));
            assert_eq!(current_target(), Some(inner));
            panic!("evaluation failed");
        });

        assert!(result.is_err());
        assert_eq!(current_target(), Some(outer));
        assert_eq!(target_depth(), 1);

        watcher_arena_remove(outer);
        watcher_arena_remove(inner);
        component.destroy();
    }

    #[test]
    fn untracked_frame_hides_outer_target() {
        let component = Component::new("arena");
        let outer = watcher_arena_insert(node(component));
        let _outer_guard = TargetGuard::push(Some(outer));
        {
            let _untracked = TargetGuard::push(None);
            assert_eq!(current_target(), None);
        }
        assert_eq!(current_target(), Some(outer));
        watcher_arena_remove(outer);
        component.destroy();
    }
}
