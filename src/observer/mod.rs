//! Observed composites and their reactive slots.
//!
//! [`observe`] turns a [`Plain`] object or array into an [`Observed`] value.
//! From then on the value is only reachable through the handle: reads go
//! through [`Observed::get`], which registers the evaluating watcher, and
//! writes go through [`Observed::set`], [`Observed::delete`] or the array
//! mutators in [`array`], which keep paths, the dirty buffer and subscribers
//! in sync.
//!
//! Every object property is a slot holding its value and its own [`Dep`].
//! The observer itself carries a second [`Dep`] that fires when the shape of
//! the container changes (keys added or removed, array mutated).

pub mod array;
pub mod traverse;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::arena::current_target;
use crate::component::Component;
use crate::dep::Dep;
use crate::error::{Error, Result};
use crate::hash::FastIndexMap;
use crate::path::{PathState, add_paths, clean_paths};
use crate::value::{Key, Plain, Value};

struct Slot {
    value: Value,
    dep: Dep,
}

enum Body {
    Object(FastIndexMap<Arc<str>, Slot>),
    Array(Vec<Value>),
}

struct ObserverNode {
    component: Component,
    dep: Dep,
    paths: RefCell<PathState>,
    body: RefCell<Body>,
}

/// Handle to an observed object or array.
///
/// Clones share the same observer; equality is identity.
#[derive(Clone)]
pub struct Observed(Rc<ObserverNode>);

/// Make `value` reactive.
///
/// Primitives yield `None`. An already observed value is returned as is, and
/// if a `route` is given the value additionally becomes reachable through it.
/// A plain composite gets a fresh observer whose nested composites are
/// observed recursively.
pub fn observe(
    component: Component,
    value: Value,
    route: Option<(&Observed, Key)>,
) -> Option<Observed> {
    match value {
        Value::Observed(ob) => {
            if let Some((parent, key)) = route {
                add_paths(&ob, &normalize_key(parent, key), &parent.paths());
            }
            Some(ob)
        }
        Value::Plain(plain) => {
            let paths = match route {
                Some((parent, key)) => {
                    PathState::under(&parent.paths(), &normalize_key(parent, key))
                }
                None => PathState::root(),
            };
            Some(Observed::from_plain(component, plain, paths))
        }
        _ => None,
    }
}

/// Assign `key` of `target`, adding the key reactively if it is new.
///
/// Returns the value as installed, which is the observed handle when a plain
/// composite was assigned.
pub fn set(target: &Observed, key: impl Into<Key>, value: impl Into<Value>) -> Result<Value> {
    target.set(key, value)
}

/// Remove `key` from `target`. Missing object keys are ignored.
pub fn delete(target: &Observed, key: impl Into<Key>) -> Result<()> {
    target.delete(key)
}

fn normalize_key(parent: &Observed, key: Key) -> Key {
    if parent.is_array() {
        match array_index(&key) {
            Some(i) => Key::Index(i),
            None => key,
        }
    } else {
        Key::Name(object_key(&key))
    }
}

fn object_key(key: &Key) -> Arc<str> {
    match key {
        Key::Name(name) => name.clone(),
        Key::Index(i) => Arc::from(i.to_string()),
    }
}

fn array_index(key: &Key) -> Option<usize> {
    match key {
        Key::Index(i) => Some(*i),
        Key::Name(name) => name.parse().ok(),
    }
}

impl Observed {
    fn from_plain(component: Component, plain: Plain, paths: PathState) -> Observed {
        let empty = match &plain {
            Plain::Object(_) => Body::Object(FastIndexMap::default()),
            Plain::Array(_) => Body::Array(Vec::new()),
        };
        let ob = Observed(Rc::new(ObserverNode {
            component,
            dep: Dep::new(),
            paths: RefCell::new(paths),
            body: RefCell::new(empty),
        }));

        let body = match plain {
            Plain::Object(map) => {
                let mut slots = FastIndexMap::default();
                for (name, value) in map {
                    let value = ob.attach(value, &Key::Name(name.clone()));
                    slots.insert(
                        name,
                        Slot {
                            value,
                            dep: Dep::new(),
                        },
                    );
                }
                Body::Object(slots)
            }
            Plain::Array(items) => Body::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| ob.attach(item, &Key::Index(i)))
                    .collect(),
            ),
        };
        *ob.0.body.borrow_mut() = body;
        ob
    }

    /// Observe `value` as reachable through `key` of this container.
    fn attach(&self, value: Value, key: &Key) -> Value {
        match value {
            Value::Plain(plain) => {
                let paths = PathState::under(&self.paths(), key);
                Value::Observed(Observed::from_plain(self.0.component, plain, paths))
            }
            Value::Observed(ob) => {
                add_paths(&ob, key, &self.paths());
                Value::Observed(ob)
            }
            primitive => primitive,
        }
    }

    /// Re-observe every item of an array under its current index.
    pub(crate) fn observe_array(&self) {
        let items = match &mut *self.0.body.borrow_mut() {
            Body::Array(items) => std::mem::take(items),
            Body::Object(_) => return,
        };
        let items: Vec<Value> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| self.attach(item, &Key::Index(i)))
            .collect();
        if let Body::Array(slot) = &mut *self.0.body.borrow_mut() {
            *slot = items;
        }
    }

    /// Whether both handles refer to the same observer.
    pub fn ptr_eq(&self, other: &Observed) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether this observer wraps an array.
    pub fn is_array(&self) -> bool {
        matches!(&*self.0.body.borrow(), Body::Array(_))
    }

    /// Component the value belongs to.
    pub fn component(&self) -> Component {
        self.0.component
    }

    /// The "container changed" dependency.
    pub fn dep(&self) -> &Dep {
        &self.0.dep
    }

    /// Snapshot of the routes by which this value is reachable.
    pub fn paths(&self) -> PathState {
        self.0.paths.borrow().clone()
    }

    pub(crate) fn with_paths_mut<R>(&self, f: impl FnOnce(&mut PathState) -> R) -> R {
        f(&mut self.0.paths.borrow_mut())
    }

    /// Observed values held directly by this container, with their keys.
    pub(crate) fn observed_children(&self) -> Vec<(Key, Observed)> {
        match &*self.0.body.borrow() {
            Body::Object(slots) => slots
                .iter()
                .filter_map(|(name, slot)| {
                    slot.value
                        .as_observed()
                        .map(|ob| (Key::Name(name.clone()), ob.clone()))
                })
                .collect(),
            Body::Array(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| item.as_observed().map(|ob| (Key::Index(i), ob.clone())))
                .collect(),
        }
    }

    /// Number of properties or items. Tracks the container dependency.
    pub fn len(&self) -> usize {
        self.0.dep.depend();
        match &*self.0.body.borrow() {
            Body::Object(slots) => slots.len(),
            Body::Array(items) => items.len(),
        }
    }

    /// Whether the container is empty. Tracks the container dependency.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Property names of an object (empty for arrays). Tracks the container
    /// dependency.
    pub fn keys(&self) -> Vec<Arc<str>> {
        self.0.dep.depend();
        match &*self.0.body.borrow() {
            Body::Object(slots) => slots.keys().cloned().collect(),
            Body::Array(_) => Vec::new(),
        }
    }

    /// Whether `key` exists. Does not track.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        match &*self.0.body.borrow() {
            Body::Object(slots) => slots.contains_key(&*object_key(&key)),
            Body::Array(items) => array_index(&key).is_some_and(|i| i < items.len()),
        }
    }

    /// Items of an array without tracking (empty for objects).
    pub fn items(&self) -> Vec<Value> {
        match &*self.0.body.borrow() {
            Body::Array(items) => items.clone(),
            Body::Object(_) => Vec::new(),
        }
    }

    /// Reactive read.
    ///
    /// While a watcher evaluates, reading an object property subscribes it to
    /// the property's slot, to the nested observer if the value is observed,
    /// and to every observed element when the value is an array. Reading an
    /// array element subscribes to the array itself. Missing keys read as
    /// [`Value::Null`].
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        let (value, slot_dep) = match &*self.0.body.borrow() {
            Body::Object(slots) => match slots.get(&*object_key(&key)) {
                Some(slot) => (slot.value.clone(), Some(slot.dep.clone())),
                None => return Value::Null,
            },
            Body::Array(items) => {
                let item = array_index(&key)
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or_default();
                (item, None)
            }
        };

        if current_target().is_none() {
            return value;
        }
        match slot_dep {
            Some(dep) => {
                dep.depend();
                if let Value::Observed(child) = &value {
                    child.dep().depend();
                    if child.is_array() {
                        child.depend_array();
                    }
                }
            }
            None => self.0.dep.depend(),
        }
        value
    }

    /// Untracked read.
    pub fn peek(&self, key: impl Into<Key>) -> Value {
        crate::untracked(|| self.get(key))
    }

    /// Subscribe the current watcher to every observed element, recursively
    /// through nested arrays.
    pub(crate) fn depend_array(&self) {
        for item in self.items() {
            if let Value::Observed(ob) = item {
                ob.dep().depend();
                if ob.is_array() {
                    ob.depend_array();
                }
            }
        }
    }

    /// Reactive write.
    ///
    /// A write that is the same under SameValueZero does nothing. Otherwise
    /// the old value loses the route through this slot, the new value is
    /// observed under it, the slot path is recorded dirty and subscribers of
    /// the slot are notified. A new object key becomes a reactive slot and
    /// notifies the container instead. Writing an array index replaces that
    /// element as a one-element splice, padding with nulls past the end.
    ///
    /// Returns the installed value.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Value> {
        let key = key.into();
        let value = value.into();
        if self.is_array() {
            let index = array_index(&key).ok_or(Error::WrongKind {
                expected: "array index",
                found: "property name",
            })?;
            return self.set_index(index, value);
        }

        let name = object_key(&key);
        let existing = match &*self.0.body.borrow() {
            Body::Object(slots) => slots
                .get(&*name)
                .map(|slot| (slot.value.clone(), slot.dep.clone())),
            Body::Array(_) => None,
        };
        match existing {
            Some((old, dep)) => self.write_slot(name, old, dep, value),
            None => self.define(name, value),
        }
    }

    fn write_slot(&self, name: Arc<str>, old: Value, dep: Dep, value: Value) -> Result<Value> {
        if old.same_value_zero(&value) {
            cov_mark::hit!(same_value_zero_write_skipped);
            return Ok(old);
        }

        let key = Key::Name(name.clone());
        let parent = self.paths();
        if let Value::Observed(old) = &old {
            clean_paths(old, &key, &parent);
        }

        let installed = self.attach(value, &key);
        if let Body::Object(slots) = &mut *self.0.body.borrow_mut() {
            if let Some(slot) = slots.get_mut(&*name) {
                slot.value = installed.clone();
            }
        }
        self.0
            .component
            .record_dirty(|dirty| dirty.set(&parent, &key, installed.clone()));
        dep.notify()?;
        Ok(installed)
    }

    fn define(&self, name: Arc<str>, value: Value) -> Result<Value> {
        let key = Key::Name(name.clone());
        let installed = self.attach(value, &key);
        if let Body::Object(slots) = &mut *self.0.body.borrow_mut() {
            slots.insert(
                name,
                Slot {
                    value: installed.clone(),
                    dep: Dep::new(),
                },
            );
        }
        let parent = self.paths();
        self.0
            .component
            .record_dirty(|dirty| dirty.set(&parent, &key, installed.clone()));
        self.0.dep.notify()?;
        Ok(installed)
    }

    fn set_index(&self, index: usize, value: Value) -> Result<Value> {
        let len = self.items().len();
        if index > len {
            cov_mark::hit!(array_write_padded);
            let mut padding = vec![Value::Null; index - len];
            padding.push(value);
            self.splice(len, 0, padding)?;
        } else {
            self.splice(index, 1, vec![value])?;
        }
        Ok(self.items().get(index).cloned().unwrap_or_default())
    }

    /// Remove `key`.
    ///
    /// For objects the slot is first written `null` (recording the path dirty
    /// and notifying readers of the slot), then dropped, then the container is
    /// notified. Missing keys are a no-op. For arrays this is a one-element
    /// splice.
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        if self.is_array() {
            return match array_index(&key) {
                Some(index) => self.splice(index, 1, Vec::new()).map(drop),
                None => Ok(()),
            };
        }

        let name = object_key(&key);
        let existing = match &*self.0.body.borrow() {
            Body::Object(slots) => slots
                .get(&*name)
                .map(|slot| (slot.value.clone(), slot.dep.clone())),
            Body::Array(_) => None,
        };
        let Some((old, dep)) = existing else {
            cov_mark::hit!(delete_missing_key_ignored);
            return Ok(());
        };

        let written = self.write_slot(name.clone(), old, dep, Value::Null);
        if let Body::Object(slots) = &mut *self.0.body.borrow_mut() {
            slots.shift_remove(&*name);
        }
        let notified = self.0.dep.notify();
        written.and(notified)
    }

    /// Untracked JSON snapshot.
    pub fn to_json(&self) -> serde_json::Value {
        match &*self.0.body.borrow() {
            Body::Object(slots) => serde_json::Value::Object(
                slots
                    .iter()
                    .map(|(name, slot)| (name.to_string(), slot.value.to_json()))
                    .collect(),
            ),
            Body::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observed").field(&self.to_json()).finish()
    }
}

impl Serialize for Observed {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &*self.0.body.borrow() {
            Body::Object(slots) => {
                let mut out = serializer.serialize_map(Some(slots.len()))?;
                for (name, slot) in slots {
                    out.serialize_entry(&**name, &slot.value)?;
                }
                out.end()
            }
            Body::Array(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(item)?;
                }
                out.end()
            }
        }
    }
}
