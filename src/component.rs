//! Components: the owner of a data root, its watchers and its dirty buffer.
//!
//! A [`Component`] is a `Copy` handle. Evaluators and callbacks receive it
//! and can capture it freely; after [`destroy`](Component::destroy) every
//! operation on it becomes a no-op or reports [`Error::ComponentDestroyed`].
//!
//! ```ignore
//! let page = Component::new("page");
//! let data = page.init_data(json!({"user": {"name": "ann"}}))?;
//! page.watch("user.name", |_, new, old| {
//!     println!("{old:?} -> {new:?}");
//!     Ok(())
//! }, WatchOptions::default())?;
//!
//! data.get("user").as_observed().unwrap().set("name", "bob")?;
//! tick()?;
//! let patch = page.take_dirty(); // {"user.name": "bob"}
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::arena::{
    ComponentId, WatcherId, component_arena_insert, component_arena_remove, current_target,
    watcher_arena_remove,
};
use crate::computed::{Computed, ComputedEntry};
use crate::config;
use crate::dirty::DirtyBuffer;
use crate::error::{Error, Result, report_error};
use crate::hash::FastIndexMap;
use crate::observer::{Observed, observe};
use crate::value::{Key, Plain, Value};
use crate::watcher::{Expression, WatchOptions, Watcher};

/// Handle to a component.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Component {
    id: ComponentId,
}

/// Returned by [`Component::watch`]; tears the watcher down on request.
#[derive(Debug)]
pub struct Unwatch {
    watcher: Watcher,
}

impl Unwatch {
    /// Stop watching.
    pub fn unwatch(self) {
        self.watcher.teardown();
    }

    /// The underlying watcher.
    pub fn watcher(&self) -> Watcher {
        self.watcher
    }
}

impl Component {
    /// Create a component. `name` appears in warnings and reported errors.
    pub fn new(name: impl Into<Arc<str>>) -> Component {
        let id = component_arena_insert(name.into());
        Component { id }
    }

    /// Diagnostic name.
    pub fn name(self) -> Arc<str> {
        self.id
            .with(|node| node.name.clone())
            .unwrap_or_else(|| Arc::from("<destroyed>"))
    }

    /// Whether the component has not been destroyed.
    pub fn is_alive(self) -> bool {
        self.id.with(|_| ()).is_some()
    }

    pub(crate) fn is_being_destroyed(self) -> bool {
        self.id.with(|node| node.being_destroyed).unwrap_or(true)
    }

    /// Observe `data` and make it the component's data root.
    ///
    /// The root is an object; its properties are addressed by bare keys in
    /// dirty paths.
    pub fn init_data(self, data: impl Into<Value>) -> Result<Observed> {
        let data = data.into();
        let is_object = match &data {
            Value::Plain(Plain::Object(_)) => true,
            Value::Observed(ob) => !ob.is_array(),
            _ => false,
        };
        if !is_object {
            return Err(Error::WrongKind {
                expected: "object",
                found: data.kind_name(),
            });
        }
        let Some(root) = observe(self, data, None) else {
            return Err(Error::WrongKind {
                expected: "object",
                found: "primitive",
            });
        };
        self.id
            .with_mut(|node| node.data = Some(root.clone()))
            .ok_or(Error::ComponentDestroyed)?;
        Ok(root)
    }

    /// The data root, if initialized.
    pub fn data(self) -> Option<Observed> {
        self.id.with(|node| node.data.clone()).flatten()
    }

    /// Read a top-level key: data first, then computed values. Unknown keys
    /// read as `Null`.
    pub fn get(self, key: &str) -> Result<Value> {
        if let Some(data) = self.data() {
            if data.has(key) {
                return Ok(data.get(key));
            }
        }
        if self.computed_entry(key).is_some() {
            return self.computed(key);
        }
        Ok(Value::Null)
    }

    /// Declare a computed value.
    ///
    /// The getter runs lazily, the first time the value is read and then
    /// whenever something it read has changed. Each evaluation publishes
    /// `key -> value` to the dirty buffer.
    pub fn init_computed<F>(self, key: &str, getter: F) -> Result<Watcher>
    where
        F: FnMut(&Component) -> Result<Value> + 'static,
    {
        self.init_computed_with(key, Computed::new(getter))
    }

    /// Declare a computed value from a full definition: getter, optional
    /// setter and caching mode.
    pub fn init_computed_with(self, key: &str, definition: Computed) -> Result<Watcher> {
        let Computed {
            getter,
            setter,
            cache,
        } = definition;
        let key: Arc<str> = Arc::from(key);
        let watcher = Watcher::with_expression(
            self,
            Expression::Function {
                label: key.clone(),
                getter,
            },
            Box::new(|_, _, _| Ok(())),
            WatchOptions::default().lazy(true),
        )?;
        watcher.set_key(key.clone());
        let entry = ComputedEntry {
            watcher: watcher.id(),
            cache,
            setter: setter.map(|setter| Rc::new(RefCell::new(setter))),
        };
        self.id.with_mut(|node| node.computed.insert(key, entry));
        Ok(watcher)
    }

    fn computed_entry(self, key: &str) -> Option<ComputedEntry> {
        self.id.with(|node| node.computed.get(key).cloned()).flatten()
    }

    /// Read a computed value, re-evaluating it if stale.
    ///
    /// A watcher reading the computed value also subscribes to everything
    /// the computed getter read, so it is notified directly when those change.
    /// Uncached values call the getter on every read instead.
    pub fn computed(self, key: &str) -> Result<Value> {
        let Some(entry) = self.computed_entry(key) else {
            return Ok(Value::Null);
        };
        let watcher = Watcher::from_id(entry.watcher);
        if !entry.cache {
            cov_mark::hit!(uncached_computed_read);
            return watcher
                .id()
                .run_getter(&self)
                .unwrap_or_else(|| Ok(watcher.value()));
        }
        if watcher.is_dirty() {
            watcher.evaluate()?;
        }
        if current_target().is_some() {
            watcher.depend();
        }
        Ok(watcher.value())
    }

    /// Route a write of `key` to the computed setter. `None` if `key` is not
    /// a computed value.
    fn write_computed(self, key: &str, value: Value) -> Option<Result<Value>> {
        let entry = self.computed_entry(key)?;
        let Some(setter) = entry.setter else {
            cov_mark::hit!(computed_write_without_setter);
            config::warn(
                &format!("computed \"{key}\" was assigned but has no setter"),
                Some(self),
            );
            return Some(Ok(value));
        };
        let Ok(mut run) = setter.try_borrow_mut() else {
            return Some(Err(Error::msg(format!(
                "setter of computed \"{key}\" assigned to itself"
            ))));
        };
        Some((*run)(&self, value.clone()).map(|()| value))
    }

    /// Watch a path or evaluator.
    ///
    /// The watcher is always user-declared: its failures are reported rather
    /// than returned. With `immediate` the callback fires once right away with
    /// `(value, Null)`.
    pub fn watch<C>(
        self,
        expression: impl Into<Expression>,
        callback: C,
        options: WatchOptions,
    ) -> Result<Unwatch>
    where
        C: FnMut(&Component, &Value, &Value) -> Result<()> + 'static,
    {
        let options = options.user(true);
        let watcher =
            Watcher::with_expression(self, expression.into(), Box::new(callback), options)?;

        if options.immediate {
            let value = watcher.value();
            if let Some(Err(err)) = watcher.id().run_callback(&self, &value, &Value::Null) {
                let info = format!("callback for immediate watcher \"{}\"", watcher.expression());
                report_error(&err, self, &info);
            }
        }
        Ok(Unwatch { watcher })
    }

    /// Assign `key` of `target` reactively, defining it if new.
    ///
    /// On the data root, a key that is not a data property but a computed
    /// value goes to the computed setter.
    pub fn set(
        self,
        target: &Observed,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(name) = key.as_name() {
            let on_root = self.data().is_some_and(|data| data.ptr_eq(target));
            if on_root && !target.has(name) {
                if let Some(result) = self.write_computed(name, value.clone()) {
                    return result;
                }
            }
        }
        target.set(key, value)
    }

    /// Write a top-level key: data first, then computed setters, otherwise a
    /// new data property. The counterpart of [`get`](Self::get).
    pub fn assign(self, key: &str, value: impl Into<Value>) -> Result<Value> {
        match self.data() {
            Some(data) => self.set(&data, key, value),
            None => self.write_computed(key, value.into()).unwrap_or_else(|| {
                Err(Error::WrongKind {
                    expected: "data root",
                    found: "nothing",
                })
            }),
        }
    }

    /// Remove `key` from `target` reactively.
    pub fn delete(self, target: &Observed, key: impl Into<Key>) -> Result<()> {
        target.delete(key)
    }

    /// Drain the dirty buffer: every path changed since the last drain with
    /// its latest value, in first-write order.
    pub fn take_dirty(self) -> FastIndexMap<String, Value> {
        self.id
            .with_mut(|node| node.dirty.drain_and_reset())
            .unwrap_or_default()
    }

    /// Number of paths currently dirty.
    pub fn dirty_len(self) -> usize {
        self.id.with(|node| node.dirty.len()).unwrap_or(0)
    }

    pub(crate) fn record_dirty(self, f: impl FnOnce(&mut DirtyBuffer)) {
        self.id.with_mut(|node| f(&mut node.dirty));
    }

    /// Watchers owned by this component, in creation order.
    pub fn watchers(self) -> Vec<Watcher> {
        self.id
            .with(|node| node.watchers.iter().copied().map(Watcher::from_id).collect())
            .unwrap_or_default()
    }

    pub(crate) fn register_watcher(self, id: WatcherId) {
        self.id.with_mut(|node| node.watchers.push(id));
    }

    pub(crate) fn unregister_watcher(self, id: WatcherId) {
        self.id
            .with_mut(|node| node.watchers.retain(|watcher| *watcher != id));
    }

    /// Tear down every watcher and release the component's state.
    ///
    /// Queued watchers of a destroyed component are skipped by the next flush.
    pub fn destroy(self) {
        let Some(watchers) = self
            .id
            .with_mut(|node| {
                if node.being_destroyed {
                    return None;
                }
                node.being_destroyed = true;
                Some(std::mem::take(&mut node.watchers))
            })
            .flatten()
        else {
            return;
        };

        tracing::debug!(component = %self.name(), watchers = watchers.len(), "destroying component");
        for id in watchers {
            Watcher::from_id(id).teardown();
            drop(watcher_arena_remove(id));
        }
        drop(component_arena_remove(self.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_root_must_be_an_object() {
        let component = Component::new("component");
        let err = component.init_data(Value::array([1])).unwrap_err();
        assert_eq!(err.to_string(), "expected object, found array");
        assert!(component.init_data(Value::from(1)).is_err());
        component.destroy();
    }

    #[test]
    fn get_prefers_data_over_computed() {
        let component = Component::new("component");
        component.init_data(json!({"a": 1})).unwrap();
        component.init_computed("a", |_| Ok(Value::from(2))).unwrap();
        component.init_computed("b", |_| Ok(Value::from(3))).unwrap();

        assert_eq!(component.get("a").unwrap(), Value::from(1));
        assert_eq!(component.get("b").unwrap(), Value::from(3));
        assert_eq!(component.get("missing").unwrap(), Value::Null);
        component.destroy();
    }

    #[test]
    fn destroy_releases_everything() {
        let component = Component::new("component");
        component.init_data(json!({"a": 1})).unwrap();
        let unwatch = component
            .watch("a", |_, _, _| Ok(()), WatchOptions::default())
            .unwrap();
        let watcher = unwatch.watcher();

        component.destroy();
        assert!(!component.is_alive());
        assert!(!watcher.is_active());
        assert_eq!(&*component.name(), "<destroyed>");
        assert!(component.take_dirty().is_empty());
        assert!(matches!(
            component.init_data(json!({})),
            Err(Error::ComponentDestroyed)
        ));
        // Destroying twice is harmless.
        component.destroy();
    }

    #[test]
    fn unwatch_removes_watcher_from_component() {
        let component = Component::new("component");
        component.init_data(json!({"a": 1})).unwrap();
        let unwatch = component
            .watch("a", |_, _, _| Ok(()), WatchOptions::default())
            .unwrap();
        assert_eq!(component.watchers().len(), 1);
        unwatch.unwatch();
        assert!(component.watchers().is_empty());
        component.destroy();
    }
}
