#![deny(missing_docs)]

//! Path-addressed fine-grained reactivity.
//!
//! This crate makes a plain data tree observable, records which watchers read
//! which properties, and on every write collects the minimal set of changed
//! `(path, value)` pairs a rendering layer needs to apply. Paths are the
//! canonical strings a host renderer understands: `user.name`, `list[2].title`.
//!
//! # Quick Start
//!
//! ```ignore
//! use pathflux::{Component, WatchOptions, tick};
//! use serde_json::json;
//!
//! let page = Component::new("page");
//! let data = page.init_data(json!({"todos": [{"title": "write docs"}]}))?;
//!
//! // Watchers re-run when anything they read changes
//! page.watch("todos[0].title", |_, new, old| {
//!     println!("{old:?} -> {new:?}");
//!     Ok(())
//! }, WatchOptions::default())?;
//!
//! let todos = data.peek("todos");
//! let todos = todos.as_observed().unwrap();
//! todos.push(json!({"title": "ship"}))?;
//!
//! tick()?;                        // Flush queued watchers
//! let patch = page.take_dirty();  // {"todos[1]": {"title": "ship"}}
//! ```
//!
//! # Core Types
//!
//! - [`Component`] - Owner of a data root, its watchers and its dirty buffer.
//! - [`Observed`] - Handle to an observed object or array. All reads and writes
//!   go through it.
//! - [`Watcher`] - Evaluator plus callback. Re-runs when its dependencies change.
//! - [`Dep`] - Subscriber registry of one reactive slot.
//! - [`Value`] - The data model: primitives, plain composites, observed composites.
//!
//! # Writes
//!
//! ```ignore
//! user.set("name", "bob")?;           // Slot write: dirty "user.name"
//! data.set("flag", true)?;            // New key: defined reactively
//! data.delete("flag")?;               // Nulled, then removed
//! list.push(1)?;                      // Dirty "list[n]" only
//! list.sort_by(|a, b| a.as_f64().partial_cmp(&b.as_f64()).unwrap())?;  // Dirty "list"
//! ```
//!
//! # Computed values
//!
//! ```ignore
//! page.init_computed("count", |page| {
//!     let todos = page.get("todos")?;
//!     Ok(todos.as_observed().map_or(0, |t| t.len()).into())
//! })?;
//! page.computed("count")?;  // Evaluates lazily, publishes "count" as dirty
//!
//! // Writable and uncached forms
//! page.init_computed_with("doubled", Computed::new(|page| {
//!     Ok((page.get("n")?.as_f64().unwrap_or_default() * 2.0).into())
//! }).setter(|page, value| {
//!     page.assign("n", value.as_f64().unwrap_or_default() / 2.0).map(drop)
//! }).cache(false))?;
//! page.assign("doubled", 10)?;  // Routed to the setter: n = 5
//! ```
//!
//! # Processing updates
//!
//! ```ignore
//! tick()?;                      // Run deferred work, including the watcher flush
//! next_tick(|| Ok(()));         // Defer a callback past the next flush
//! next_tick_future().await;     // Same, as a future
//! untracked(|| data.get("a"));  // Read without subscribing
//! ```

// Internal modules
pub(crate) mod arena;
mod component;
mod computed;
pub mod config;
mod dep;
mod dirty;
mod error;
mod hash;
mod next_tick;
pub mod observer;
pub mod path;
mod scheduler;
mod value;
mod watcher;

// Core types
pub use component::{Component, Unwatch};
pub use computed::{Computed, ComputedSetter};
pub use config::Config;
pub use dep::{Dep, DepId};
pub use dirty::DirtyBuffer;
pub use error::{Error, Result, report_error};
pub use observer::{Observed, delete, observe, set};
pub use value::{Key, Plain, Value};
pub use watcher::{Expression, WatchOptions, Watcher, parse_path};

// Arena handles and closure types
pub use arena::{Callback, Getter, WatcherId, current_target};

// Key functions
pub use next_tick::{NextTick, is_tick_pending, next_tick, next_tick_future, tick};
pub use scheduler::{flush_scheduler_queue, is_flushing, queue_watcher, queued_watchers};
pub use watcher::untracked;
