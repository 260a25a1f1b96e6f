//! Per-component accumulator of `(path, value)` updates.
//!
//! Every reactive write records the canonical path it touched together with
//! the newest value. Writes to the same path collapse into one entry holding
//! the last value, while the first write fixes the entry's position. The host
//! drains the buffer once per render.

use std::sync::Arc;

use crate::hash::FastIndexMap;
use crate::path::PathState;
use crate::value::{Key, Value};

/// Insertion-ordered `path -> latest value` map.
#[derive(Clone, Debug, Default)]
pub struct DirtyBuffer {
    entries: FastIndexMap<String, Value>,
}

impl DirtyBuffer {
    /// A buffer with no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` under `path`, overwriting an earlier value for it.
    pub fn record(&mut self, path: impl Into<String>, value: Value) {
        self.entries.insert(path.into(), value);
    }

    /// Record a write of `key` inside a container whose routes are `paths`.
    ///
    /// Only the container's first route is used: one entry is enough for the
    /// host to apply the change.
    pub fn set(&mut self, paths: &PathState, key: &Key, value: Value) {
        if let Some((path, _)) = paths.child_paths(key).into_iter().next() {
            self.record(path, value);
        }
    }

    /// Record that a whole container changed, under its first route.
    ///
    /// Root containers have no route of their own and are skipped; their
    /// children are addressed by bare keys instead.
    pub fn replace(&mut self, paths: &PathState, value: Value) {
        match paths.first() {
            Some(entry) => {
                let path = entry.path.clone();
                self.record(path, value);
            }
            None => {
                cov_mark::hit!(root_replace_skipped);
            }
        }
    }

    /// Record a computed value under its bare key.
    pub fn push(&mut self, key: &Arc<str>, value: Value) {
        self.record(key.to_string(), value);
    }

    /// Hand out every entry in first-write order and leave the buffer empty.
    pub fn drain_and_reset(&mut self) -> FastIndexMap<String, Value> {
        std::mem::take(&mut self.entries)
    }

    /// Number of distinct dirty paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is dirty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest value recorded for `path`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    /// Dirty paths in first-write order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_to_one_path_collapse_to_the_last_value() {
        let mut buffer = DirtyBuffer::new();
        buffer.record("a", Value::from(1));
        buffer.record("b", Value::from(2));
        buffer.record("a", Value::from(3));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.get("a"), Some(&Value::from(3)));
        assert_eq!(buffer.paths().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn set_uses_first_composed_path() {
        let user = PathState::under(&PathState::root(), &Key::from("user"));
        let mut buffer = DirtyBuffer::new();
        buffer.set(&user, &Key::from("name"), Value::from("ann"));
        buffer.set(&PathState::root(), &Key::from("count"), Value::from(1));

        let drained = buffer.drain_and_reset();
        assert_eq!(drained.keys().collect::<Vec<_>>(), ["user.name", "count"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn replace_of_root_is_skipped() {
        cov_mark::check!(root_replace_skipped);
        let mut buffer = DirtyBuffer::new();
        buffer.replace(&PathState::root(), Value::Null);
        assert!(buffer.is_empty());

        let list = PathState::under(&PathState::root(), &Key::from("list"));
        buffer.replace(&list, Value::array([1]));
        assert_eq!(buffer.get("list"), Some(&Value::array([1])));
    }

    #[test]
    fn computed_values_use_bare_keys() {
        let mut buffer = DirtyBuffer::new();
        buffer.push(&Arc::from("total"), Value::from(4));
        assert_eq!(buffer.get("total"), Some(&Value::from(4)));
    }
}
