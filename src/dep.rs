//! Dependencies: the subscriber registry of one reactive slot.
//!
//! Every reactive slot and every observed composite owns a [`Dep`]. Reading
//! the slot while a watcher evaluates subscribes that watcher; writing the
//! slot notifies every subscriber.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::arena::{WatcherId, current_target};
use crate::error::Result;
use crate::hash::FastIndexSet;
use crate::watcher::Watcher;

thread_local! {
    static NEXT_DEP_ID: Cell<u64> = const { Cell::new(0) };
}

/// Unique, monotonically assigned dependency id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

struct DepNode {
    id: DepId,
    subs: RefCell<FastIndexSet<WatcherId>>,
}

/// Shared handle to a dependency. Clones refer to the same registry.
#[derive(Clone)]
pub struct Dep(Rc<DepNode>);

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subs", &self.0.subs.borrow().len())
            .finish()
    }
}

impl Dep {
    /// A dependency with no subscribers.
    pub fn new() -> Self {
        let id = NEXT_DEP_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            DepId(id)
        });
        Dep(Rc::new(DepNode {
            id,
            subs: RefCell::new(FastIndexSet::default()),
        }))
    }

    /// Id of this dependency.
    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// Register this dependency with the watcher currently evaluating, if any.
    pub fn depend(&self) {
        if let Some(target) = current_target() {
            target.add_dep(self);
        }
    }

    /// Notify every subscriber, in subscription order.
    ///
    /// Subscribers are snapshotted first, so watchers that subscribe or
    /// unsubscribe while being notified do not disturb this round. A failing
    /// subscriber does not stop the others; the first error is returned.
    pub fn notify(&self) -> Result<()> {
        let subs: Vec<WatcherId> = self.0.subs.borrow().iter().copied().collect();
        let mut first_error = None;
        for id in subs {
            if let Err(err) = Watcher::from_id(id).update() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Subscribe a watcher. Subscribing twice is a no-op.
    pub fn add_sub(&self, id: WatcherId) {
        self.0.subs.borrow_mut().insert(id);
    }

    /// Unsubscribe a watcher, keeping the order of the others.
    pub fn remove_sub(&self, id: WatcherId) {
        self.0.subs.borrow_mut().shift_remove(&id);
    }

    /// Current subscribers in subscription order.
    pub fn subscribers(&self) -> Vec<WatcherId> {
        self.0.subs.borrow().iter().copied().collect()
    }

    /// Number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.0.subs.borrow().len()
    }

    /// Whether both handles refer to the same dependency.
    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Component, Value, WatchOptions};
    use std::rc::Rc;

    #[test]
    fn ids_are_monotonic() {
        let a = Dep::new();
        let b = Dep::new();
        assert!(b.id() > a.id());
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn depend_without_target_is_a_no_op() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn notify_reaches_every_subscriber_despite_failures() {
        let component = Component::new("dep");
        let dep = Dep::new();
        let evaluations = Rc::new(Cell::new(0));
        let runs = Rc::new(Cell::new(0));

        // Each evaluation yields a fresh number, so every notify fires the callbacks.
        let counter = |dep: &Dep, evaluations: &Rc<Cell<i32>>| {
            let dep = dep.clone();
            let evaluations = evaluations.clone();
            move |_: &Component| {
                dep.depend();
                evaluations.set(evaluations.get() + 1);
                Ok(Value::from(evaluations.get()))
            }
        };

        let failing = Watcher::new(
            component,
            "failing",
            counter(&dep, &evaluations),
            |_, _, _| Err(crate::Error::msg("first")),
            WatchOptions::default().sync(true),
        )
        .unwrap();
        let counting = Watcher::new(
            component,
            "counting",
            counter(&dep, &evaluations),
            {
                let runs = runs.clone();
                move |_, _, _| {
                    runs.set(runs.get() + 1);
                    Ok(())
                }
            },
            WatchOptions::default().sync(true),
        )
        .unwrap();

        assert_eq!(dep.subscribers(), [failing.id(), counting.id()]);
        let err = dep.notify().unwrap_err();
        assert_eq!(err.to_string(), "first");
        assert_eq!(runs.get(), 1);

        counting.teardown();
        assert_eq!(dep.subscribers(), [failing.id()]);
        component.destroy();
    }
}
