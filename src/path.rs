//! Canonical paths of observed values.
//!
//! Every observer records the set of routes by which it is reachable from the
//! data root, rendered as strings the host renderer understands
//! (`list[0].name`). A value referenced from N live places has N entries.
//!
//! Routes change when values are assigned, removed or moved inside arrays.
//! [`add_paths`] and [`clean_paths`] apply such a change to one value and
//! carry it down into everything nested inside it, stopping at subtrees the
//! change does not touch.

use crate::hash::FastIndexMap;
use crate::observer::Observed;
use crate::value::Key;

/// Paths keyed by their canonical string.
pub type PathMap = FastIndexMap<String, PathEntry>;

/// One route to a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathEntry {
    /// Last step of the route.
    pub key: Key,
    /// First step of the route (the top-level data key).
    pub root: Key,
    /// Full canonical path.
    pub path: String,
}

/// The routes of one observer.
///
/// A value that was observed without a parent is a root: it has no route of
/// its own and its properties are addressed by their bare key. A root stays a
/// root when it is later placed inside another tree; those aliases are kept
/// as routes but never used to address its own properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathState {
    root: bool,
    paths: PathMap,
}

/// Compose one path step.
pub fn compose(parent: &str, key: &Key) -> String {
    match key {
        Key::Index(i) => format!("{parent}[{i}]"),
        Key::Name(name) => format!("{parent}.{name}"),
    }
}

/// Extend every path of `parent` by `key`. A root parent yields the bare key.
pub fn combine_with_key(parent: Option<&PathMap>, key: &Key) -> PathMap {
    let mut combined = PathMap::default();
    match parent {
        Some(paths) => {
            for entry in paths.values() {
                let path = compose(&entry.path, key);
                combined.insert(
                    path.clone(),
                    PathEntry {
                        key: key.clone(),
                        root: entry.root.clone(),
                        path,
                    },
                );
            }
        }
        None => {
            let path = key.to_string();
            combined.insert(
                path.clone(),
                PathEntry {
                    key: key.clone(),
                    root: key.clone(),
                    path,
                },
            );
        }
    }
    combined
}

impl PathState {
    /// State of a value observed without a parent.
    pub fn root() -> Self {
        Self {
            root: true,
            paths: PathMap::default(),
        }
    }

    /// State of a value first reached through `parent` + `key`.
    pub fn under(parent: &PathState, key: &Key) -> Self {
        Self {
            root: false,
            paths: combine_with_key(parent.as_map(), key),
        }
    }

    /// Whether this value was observed without a parent.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Number of live routes. A root counts only the aliases it gained.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no route leads here.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether `path` is one of the live routes.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// The oldest live route, which is the one used for dirty entries. `None`
    /// for a root, whose own address is empty.
    pub fn first(&self) -> Option<&PathEntry> {
        if self.root {
            return None;
        }
        self.paths.values().next()
    }

    /// All live routes in the order they were established.
    pub fn iter(&self) -> impl Iterator<Item = &PathEntry> {
        self.paths.values()
    }

    /// The routes that address this value's properties; `None` for a root.
    pub fn as_map(&self) -> Option<&PathMap> {
        (!self.root).then_some(&self.paths)
    }

    /// Canonical paths `key` takes under this value. Used to address a slot.
    pub fn child_paths(&self, key: &Key) -> PathMap {
        combine_with_key(self.as_map(), key)
    }

    fn insert(&mut self, entry: PathEntry) -> bool {
        if self.paths.contains_key(&entry.path) {
            return false;
        }
        self.paths.insert(entry.path.clone(), entry);
        true
    }

    fn remove(&mut self, path: &str) {
        self.paths.shift_remove(path);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PathOp {
    Add,
    Clean,
}

/// Record that `value` is now reachable as `key` under a parent whose routes
/// are `parent`, and propagate the new routes into its children.
pub fn add_paths(value: &Observed, key: &Key, parent: &PathState) {
    propagate(value, key, parent.as_map(), PathOp::Add);
}

/// Record that `value` is no longer reachable as `key` under a parent whose
/// routes are `parent`, and drop the severed routes from its children.
pub fn clean_paths(value: &Observed, key: &Key, parent: &PathState) {
    propagate(value, key, parent.as_map(), PathOp::Clean);
}

fn propagate(value: &Observed, key: &Key, parent: Option<&PathMap>, op: PathOp) {
    let candidates = combine_with_key(parent, key);
    let mut changed = PathMap::default();

    value.with_paths_mut(|state| {
        for (path, entry) in candidates {
            match op {
                PathOp::Add => {
                    if state.insert(entry.clone()) {
                        changed.insert(path, entry);
                    }
                }
                PathOp::Clean => {
                    state.remove(&path);
                    changed.insert(path, entry);
                }
            }
        }
    });

    if changed.is_empty() {
        cov_mark::hit!(path_propagation_stopped_early);
        return;
    }

    for (child_key, child) in value.observed_children() {
        propagate(&child, &child_key, Some(&changed), op);
    }
}
