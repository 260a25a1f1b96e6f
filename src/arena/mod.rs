// Arena-based storage for engine state
//
// This module provides two separate arenas:
// - Watcher arena: stores WatcherNode (evaluator, callback, dependencies, flags)
// - Component arena: stores ComponentNode (dirty buffer, watcher list, data root)
//
// Both arenas are thread-local slabs. WatcherId and ComponentId are Copy
// generational handles that index into them.

pub mod component_arena;
pub mod watcher_arena;

pub(crate) use component_arena::{ComponentId, component_arena_insert, component_arena_remove};
pub(crate) use watcher_arena::{
    FLAG_DEEP, FLAG_LAZY, FLAG_SYNC, FLAG_USER, TargetGuard, WatcherNode, watcher_arena_insert,
    watcher_arena_remove,
};
pub use watcher_arena::{Callback, Getter, WatcherId, current_target};
