//! Batched watcher scheduler.
//!
//! Watchers notified by a write are queued, deduplicated by id, and run
//! together on the next tick in creation order. That order runs parents'
//! watchers before children's and user watchers before the render watcher
//! created after them.
//!
//! ## Flush
//!
//! 1. Sort the queue by watcher uid.
//! 2. Walk it, re-reading the length each step: watchers queued mid-flush
//!    are inserted at their sorted position but never before the scan
//!    pointer, so they run in this same flush.
//! 3. Count how often each watcher re-queues itself. Past
//!    [`Config::max_update_count`](crate::Config::max_update_count) it is
//!    reported as an infinite update loop and abandoned for the rest of the
//!    flush; the other watchers still run.
//! 4. Reset all state, even if a watcher panicked.

use std::cell::RefCell;

use crate::arena::WatcherId;
use crate::config;
use crate::error::Result;
use crate::hash::{FastHashMap, FastHashSet};
use crate::next_tick::next_tick;
use crate::watcher::Watcher;

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

#[derive(Default)]
struct SchedulerState {
    queue: Vec<WatcherId>,
    /// Queued and not yet run in the current flush.
    has: FastHashSet<WatcherId>,
    circular: FastHashMap<WatcherId, u32>,
    /// Runaway watchers, ignored until the flush ends.
    aborted: FastHashSet<WatcherId>,
    /// A flush is scheduled on the tick queue.
    waiting: bool,
    flushing: bool,
    /// Position of the watcher currently running.
    index: usize,
}

impl SchedulerState {
    fn reset(&mut self) {
        self.queue.clear();
        self.has.clear();
        self.circular.clear();
        self.aborted.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
    }
}

/// Queue a watcher for the next flush.
///
/// A watcher already waiting is skipped. Outside a flush the watcher is
/// appended; during a flush it is inserted by id, never before the watcher
/// currently running. The first queued watcher schedules the flush.
pub fn queue_watcher(id: WatcherId) {
    let schedule = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        if state.aborted.contains(&id) {
            cov_mark::hit!(aborted_watcher_requeue_ignored);
            return false;
        }
        if !state.has.insert(id) {
            cov_mark::hit!(duplicate_watcher_skipped);
            return false;
        }

        if state.flushing {
            let mut at = state.queue.len();
            while at > state.index + 1 && state.queue[at - 1] > id {
                at -= 1;
            }
            state.queue.insert(at, id);
        } else {
            state.queue.push(id);
        }

        !std::mem::replace(&mut state.waiting, true)
    });

    if schedule {
        next_tick(flush_scheduler_queue);
    }
}

/// Run every queued watcher. Normally invoked from the tick queue.
///
/// Errors of non-user watchers do not stop the flush; the first one is
/// returned once every watcher had its turn.
pub fn flush_scheduler_queue() -> Result<()> {
    struct ResetGuard;

    impl Drop for ResetGuard {
        fn drop(&mut self) {
            SCHEDULER.with(|state| state.borrow_mut().reset());
        }
    }

    let _reset = ResetGuard;
    SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = true;
        state.queue.sort();
    });

    let max_update_count = config::max_update_count();
    let mut first_error = None;
    let mut index = 0;
    let mut ran = 0usize;

    loop {
        let next = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            state.index = index;
            let id = state.queue.get(index).copied()?;
            state.has.remove(&id);
            Some(id)
        });
        let Some(id) = next else {
            break;
        };
        index += 1;

        let watcher = Watcher::from_id(id);
        if let Err(err) = watcher.run() {
            first_error.get_or_insert(err);
        }
        ran += 1;

        let runaway = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&id) {
                return false;
            }
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            if *count <= max_update_count {
                return false;
            }

            state.has.remove(&id);
            state.aborted.insert(id);
            let mut at = index;
            while at < state.queue.len() {
                if state.queue[at] == id {
                    state.queue.remove(at);
                } else {
                    at += 1;
                }
            }
            true
        });

        if runaway {
            cov_mark::hit!(runaway_watcher_aborted);
            let message = if watcher.is_user() {
                format!(
                    "you may have an infinite update loop in watcher with expression \"{}\"",
                    watcher.expression()
                )
            } else {
                "you may have an infinite update loop in a component render function".to_string()
            };
            config::warn(&message, watcher.component());
        }
    }

    tracing::debug!(ran, "scheduler flush finished");
    first_error.map_or(Ok(()), Err)
}

/// Number of watchers waiting in the queue.
pub fn queued_watchers() -> usize {
    SCHEDULER.with(|state| state.borrow().has.len())
}

/// Whether a flush is currently running.
pub fn is_flushing() -> bool {
    SCHEDULER.with(|state| state.borrow().flushing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::next_tick::tick;
    use crate::{Component, Dep, Value, WatchOptions};
    use std::cell::Cell;
    use std::rc::Rc;

    fn counting_watcher(component: Component, dep: &Dep, runs: &Rc<Cell<u32>>) -> Watcher {
        let dep = dep.clone();
        let runs = runs.clone();
        Watcher::new(
            component,
            "counting",
            move |_| {
                dep.depend();
                Ok(Value::object([("fresh", true)]))
            },
            move |_, _, _| {
                runs.set(runs.get() + 1);
                Ok(())
            },
            WatchOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn duplicate_notifications_queue_once() {
        cov_mark::check!(duplicate_watcher_skipped);
        let component = Component::new("scheduler");
        let dep = Dep::new();
        let runs = Rc::new(Cell::new(0));
        counting_watcher(component, &dep, &runs);

        dep.notify().unwrap();
        dep.notify().unwrap();
        assert_eq!(queued_watchers(), 1);

        tick().unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(queued_watchers(), 0);
        assert!(!is_flushing());
        component.destroy();
    }

    #[test]
    fn torn_down_watcher_in_queue_does_nothing() {
        let component = Component::new("scheduler");
        let dep = Dep::new();
        let runs = Rc::new(Cell::new(0));
        let watcher = counting_watcher(component, &dep, &runs);

        dep.notify().unwrap();
        watcher.teardown();
        tick().unwrap();
        assert_eq!(runs.get(), 0);
        component.destroy();
    }
}
