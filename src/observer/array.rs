//! The seven mutators of observed arrays.
//!
//! Each mutator runs the same sequence around the raw `Vec` operation:
//!
//! 1. drop the routes of items that are removed or may move,
//! 2. mutate,
//! 3. re-observe every item under its current index,
//! 4. record the change in the dirty buffer (the new last index for `push`,
//!    the whole array for everything else),
//! 5. notify the array's own dependency.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::path::clean_paths;
use crate::value::{Key, Value};

use super::{Body, Observed};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Displaced {
    None,
    Last,
    All,
}

/// Puts the items back into the observer even if the mutation panics.
struct ItemsGuard<'a> {
    ob: &'a Observed,
    items: Vec<Value>,
}

impl Drop for ItemsGuard<'_> {
    fn drop(&mut self) {
        if let Body::Array(slot) = &mut *self.ob.0.body.borrow_mut() {
            *slot = std::mem::take(&mut self.items);
        }
    }
}

impl Observed {
    fn mutate<R>(
        &self,
        displaced: Displaced,
        record_last: bool,
        f: impl FnOnce(&mut Vec<Value>) -> R,
    ) -> Result<R> {
        let items = match &mut *self.0.body.borrow_mut() {
            Body::Array(items) => std::mem::take(items),
            Body::Object(_) => {
                return Err(Error::WrongKind {
                    expected: "array",
                    found: "object",
                });
            }
        };

        let parent = self.paths();
        let len = items.len();
        let start = match displaced {
            Displaced::None => len,
            Displaced::Last => len.saturating_sub(1),
            Displaced::All => 0,
        };
        for (i, item) in items.iter().enumerate().skip(start) {
            if let Value::Observed(ob) = item {
                clean_paths(ob, &Key::Index(i), &parent);
            }
        }

        let result = {
            let mut guard = ItemsGuard { ob: self, items };
            f(&mut guard.items)
        };

        self.observe_array();

        let items = self.items();
        let component = self.component();
        match items.last() {
            Some(last) if record_last => {
                let key = Key::Index(items.len() - 1);
                component.record_dirty(|dirty| dirty.set(&parent, &key, last.clone()));
            }
            _ => {
                let whole = Value::Observed(self.clone());
                component.record_dirty(|dirty| dirty.replace(&parent, whole));
            }
        }

        self.dep().notify()?;
        Ok(result)
    }

    /// Append an item, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();
        self.mutate(Displaced::None, true, |items| {
            items.push(value);
            items.len()
        })
    }

    /// Remove and return the last item (`Null` when empty).
    pub fn pop(&self) -> Result<Value> {
        self.mutate(Displaced::Last, false, |items| items.pop().unwrap_or_default())
    }

    /// Remove and return the first item (`Null` when empty).
    pub fn shift(&self) -> Result<Value> {
        self.mutate(Displaced::All, false, |items| {
            if items.is_empty() {
                Value::Null
            } else {
                items.remove(0)
            }
        })
    }

    /// Prepend an item, returning the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();
        self.mutate(Displaced::All, false, |items| {
            items.insert(0, value);
            items.len()
        })
    }

    /// Remove `delete_count` items at `start` and insert `insert` in their
    /// place. Out-of-range bounds are clamped. Returns the removed items.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        insert: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>> {
        self.mutate(Displaced::All, false, |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    /// Sort in place with a comparator. The sort is stable.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<()> {
        self.mutate(Displaced::All, false, |items| items.sort_by(compare))
    }

    /// Reverse in place.
    pub fn reverse(&self) -> Result<()> {
        self.mutate(Displaced::All, false, |items| items.reverse())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Component, Value, observe};
    use serde_json::json;

    fn list(component: Component) -> crate::Observed {
        let root = observe(
            component,
            Value::from(json!({"list": [{"id": 1}, {"id": 2}, {"id": 3}]})),
            None,
        )
        .unwrap();
        root.peek("list").as_observed().unwrap().clone()
    }

    fn item_paths(list: &crate::Observed, index: usize) -> Vec<String> {
        list.peek(index)
            .as_observed()
            .unwrap()
            .paths()
            .iter()
            .map(|e| e.path.clone())
            .collect()
    }

    #[test]
    fn push_records_only_the_new_index() {
        let component = Component::new("array");
        let list = list(component);
        assert_eq!(list.push(json!({"id": 4})).unwrap(), 4);

        let dirty = component.take_dirty();
        assert_eq!(dirty.keys().collect::<Vec<_>>(), ["list[3]"]);
        assert_eq!(item_paths(&list, 3), ["list[3]"]);
        component.destroy();
    }

    #[test]
    fn reverse_records_whole_array_and_rederives_paths() {
        let component = Component::new("array");
        let list = list(component);
        list.reverse().unwrap();

        let dirty = component.take_dirty();
        assert_eq!(dirty.keys().collect::<Vec<_>>(), ["list"]);
        assert_eq!(list.to_json(), json!([{"id": 3.0}, {"id": 2.0}, {"id": 1.0}]));
        for i in 0..3 {
            assert_eq!(item_paths(&list, i), [format!("list[{i}]")]);
        }
        component.destroy();
    }

    #[test]
    fn pop_and_shift_sever_removed_items() {
        let component = Component::new("array");
        let list = list(component);

        let last = list.pop().unwrap();
        let first = list.shift().unwrap();

        assert!(last.as_observed().unwrap().paths().is_empty());
        assert!(first.as_observed().unwrap().paths().is_empty());
        assert_eq!(item_paths(&list, 0), ["list[0]"]);
        assert_eq!(list.items().len(), 1);
        component.destroy();
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let component = Component::new("array");
        let list = list(component);
        let removed = list
            .splice(1, 10, [Value::from("a"), Value::from("b")])
            .unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(list.to_json(), json!([{"id": 1.0}, "a", "b"]));
        assert_eq!(list.splice(99, 1, []).unwrap(), Vec::<Value>::new());
        component.destroy();
    }

    #[test]
    fn sort_by_uses_comparator_and_unshift_moves_paths() {
        let component = Component::new("array");
        let list = list(component);
        let id = |v: &Value| {
            v.as_observed()
                .and_then(|o| o.peek("id").as_f64())
                .unwrap_or_default()
        };

        list.sort_by(|a, b| id(b).total_cmp(&id(a))).unwrap();
        assert_eq!(list.to_json(), json!([{"id": 3.0}, {"id": 2.0}, {"id": 1.0}]));

        list.unshift(json!({"id": 0})).unwrap();
        assert_eq!(item_paths(&list, 1), ["list[1]"]);
        assert_eq!(item_paths(&list, 3), ["list[3]"]);
        component.destroy();
    }

    #[test]
    fn mutators_reject_objects() {
        let component = Component::new("array");
        let root = observe(component, Value::object([("a", 1)]), None).unwrap();
        assert!(root.push(1).is_err());
        assert!(root.reverse().is_err());
        component.destroy();
    }
}
