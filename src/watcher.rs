//! Watchers: an evaluator bound to a callback.
//!
//! A watcher evaluates its expression with itself as the evaluation target,
//! so every reactive read subscribes it to the read slot. When one of those
//! slots changes the watcher is queued (or run inline when `sync`, or merely
//! marked dirty when `lazy`); running it re-evaluates, re-collects its
//! dependencies and fires the callback if the value changed.
//!
//! Watchers are `Copy` handles into a thread-local arena. A handle to a
//! torn-down watcher stays valid to hold but does nothing.

use std::fmt;
use std::sync::Arc;

use crate::arena::{
    Callback, FLAG_DEEP, FLAG_LAZY, FLAG_SYNC, FLAG_USER, Getter, TargetGuard, WatcherId,
    WatcherNode, current_target, watcher_arena_insert,
};
use crate::component::Component;
use crate::config;
use crate::dep::Dep;
use crate::error::{Error, Result, report_error};
use crate::observer::traverse::traverse;
use crate::scheduler;
use crate::value::{Key, Value};

/// Options of a watcher.
///
/// ```ignore
/// let options = WatchOptions::default().deep(true).immediate(true);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub(crate) deep: bool,
    pub(crate) immediate: bool,
    pub(crate) user: bool,
    pub(crate) sync: bool,
    pub(crate) lazy: bool,
}

impl WatchOptions {
    /// Also fire for changes nested anywhere inside the watched value.
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// Invoke the callback once with the initial value right after creation.
    /// Only honored by [`Component::watch`].
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Mark the watcher as user-declared: its failures are reported through
    /// [`report_error`] instead of being returned.
    pub fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    /// Run inline when a dependency changes instead of queueing.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Defer evaluation until the value is asked for (computed values).
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    fn flags(self) -> u8 {
        let mut flags = 0;
        if self.lazy {
            flags |= FLAG_LAZY;
        }
        if self.user {
            flags |= FLAG_USER;
        }
        if self.sync {
            flags |= FLAG_SYNC;
        }
        if self.deep {
            flags |= FLAG_DEEP;
        }
        flags
    }
}

/// What a watcher evaluates.
pub enum Expression {
    /// A dotted/bracketed path resolved from the component, e.g. `list[0].name`.
    Path(Arc<str>),
    /// An arbitrary evaluator. `label` names it in diagnostics.
    Function {
        /// Diagnostic name.
        label: Arc<str>,
        /// The evaluator.
        getter: Getter,
    },
}

impl Expression {
    /// Wrap a closure as an expression.
    pub fn function<F>(label: impl Into<Arc<str>>, getter: F) -> Self
    where
        F: FnMut(&Component) -> Result<Value> + 'static,
    {
        Expression::Function {
            label: label.into(),
            getter: Box::new(getter),
        }
    }

    fn label(&self) -> Arc<str> {
        match self {
            Expression::Path(path) => path.clone(),
            Expression::Function { label, .. } => label.clone(),
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Expression::Function { label, .. } => f.debug_tuple("Function").field(label).finish(),
        }
    }
}

impl From<&str> for Expression {
    fn from(path: &str) -> Self {
        Expression::Path(Arc::from(path))
    }
}

impl From<String> for Expression {
    fn from(path: String) -> Self {
        Expression::Path(Arc::from(path))
    }
}

/// Split a watch path into keys.
///
/// Accepts identifier segments (letters, digits, `_`, `$`) joined by dots,
/// each optionally followed by `[digits]` indices: `a.b`, `list[0].name`,
/// `grid[1][2]`.
pub fn parse_path(path: &str) -> Result<Vec<Key>> {
    let invalid = |reason| Error::InvalidPath {
        path: path.to_string(),
        reason,
    };
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';

    let mut keys = Vec::new();
    let mut chars = path.chars().peekable();
    loop {
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if !is_ident(c) {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            return Err(invalid("empty segment"));
        }
        keys.push(Key::from(name));

        while chars.peek() == Some(&'[') {
            chars.next();
            let mut digits = String::new();
            loop {
                match chars.next() {
                    Some(']') => break,
                    Some(c) if c.is_ascii_digit() => digits.push(c),
                    Some(_) => return Err(invalid("bracket index must be digits")),
                    None => return Err(invalid("unclosed bracket")),
                }
            }
            let index = digits
                .parse::<usize>()
                .map_err(|_| invalid("bracket index must be digits"))?;
            keys.push(Key::Index(index));
        }

        match chars.next() {
            None => return Ok(keys),
            Some('.') => continue,
            Some(_) => return Err(invalid("unexpected character")),
        }
    }
}

/// Evaluator for a parsed path: the first key is looked up on the component
/// (data, then computed), the rest through reactive reads. A missing or
/// primitive intermediate value yields `Null`.
fn path_getter(keys: Vec<Key>) -> Getter {
    Box::new(move |component: &Component| {
        let mut keys = keys.iter();
        let Some(first) = keys.next() else {
            return Ok(Value::Null);
        };
        let mut value = component.get(&first.to_string())?;
        for key in keys {
            value = match &value {
                Value::Observed(ob) => ob.get(key.clone()),
                _ => return Ok(Value::Null),
            };
        }
        Ok(value)
    })
}

/// Handle to a watcher.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Watcher {
    id: WatcherId,
}

impl Watcher {
    /// Create a watcher over a closure.
    ///
    /// Unless `lazy`, the evaluator runs once right away to record the
    /// initial value and dependencies. A failing initial evaluation of a
    /// non-user watcher tears it down and returns the error.
    pub fn new<G, C>(
        component: Component,
        label: &str,
        getter: G,
        callback: C,
        options: WatchOptions,
    ) -> Result<Watcher>
    where
        G: FnMut(&Component) -> Result<Value> + 'static,
        C: FnMut(&Component, &Value, &Value) -> Result<()> + 'static,
    {
        Self::with_expression(
            component,
            Expression::function(label, getter),
            Box::new(callback),
            options,
        )
    }

    /// Create a watcher over any [`Expression`].
    ///
    /// An invalid path is not an error: it logs a warning and the watcher
    /// evaluates to `Null` forever.
    pub fn with_expression(
        component: Component,
        expression: Expression,
        callback: Callback,
        options: WatchOptions,
    ) -> Result<Watcher> {
        if !component.is_alive() {
            return Err(Error::ComponentDestroyed);
        }

        let label = expression.label();
        let getter: Getter = match expression {
            Expression::Function { getter, .. } => getter,
            Expression::Path(path) => match parse_path(&path) {
                Ok(keys) => path_getter(keys),
                Err(err) => {
                    cov_mark::hit!(invalid_watch_path_degraded);
                    config::warn(
                        &format!(
                            "failed watching path \"{path}\": {err}. \
                             Watchers only accept dot-delimited paths; use a function instead"
                        ),
                        Some(component),
                    );
                    Box::new(|_: &Component| Ok(Value::Null))
                }
            },
        };

        let id = watcher_arena_insert(WatcherNode::new(
            component,
            label,
            options.flags(),
            getter,
            callback,
        ));
        component.register_watcher(id);
        let watcher = Watcher { id };

        if !options.lazy {
            match watcher.get() {
                Ok(value) => {
                    id.with_mut(|node| node.value = value);
                }
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            }
        }
        tracing::trace!(watcher = id.uid(), expression = %watcher.expression(), "watcher created");
        Ok(watcher)
    }

    pub(crate) fn from_id(id: WatcherId) -> Watcher {
        Watcher { id }
    }

    /// Arena id; its uid is the flush order.
    pub fn id(self) -> WatcherId {
        self.id
    }

    /// Evaluate with this watcher as the target and refresh its dependencies.
    ///
    /// Failures of user watchers are reported and yield `Null`; other
    /// failures are returned. Dependencies are pruned in both cases.
    pub fn get(self) -> Result<Value> {
        let Some((component, flags)) = self.id.with(|node| (node.component, node.flags)) else {
            return Ok(Value::Null);
        };

        let result = {
            let _target = TargetGuard::push(Some(self.id));
            let result = match self.id.run_getter(&component) {
                Some(result) => result,
                None => {
                    cov_mark::hit!(reentrant_evaluation_skipped);
                    config::warn(
                        &format!(
                            "watcher \"{}\" read itself while evaluating",
                            self.expression()
                        ),
                        Some(component),
                    );
                    Ok(self.value())
                }
            };
            let result = match result {
                Err(err) if flags & FLAG_USER != 0 => {
                    let info = format!("getter for watcher \"{}\"", self.expression());
                    report_error(&err, component, &info);
                    Ok(Value::Null)
                }
                other => other,
            };
            if flags & FLAG_DEEP != 0 {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.id.cleanup_deps();
        result
    }

    /// Register a dependency read during the current evaluation.
    pub fn add_dep(self, dep: &Dep) {
        self.id.add_dep(dep);
    }

    /// Swap in this evaluation's dependencies, unsubscribing from stale ones.
    pub fn cleanup_deps(self) {
        self.id.cleanup_deps();
    }

    /// React to a dependency change.
    pub fn update(self) -> Result<()> {
        let Some(flags) = self.id.with(|node| node.flags) else {
            return Ok(());
        };
        if flags & FLAG_LAZY != 0 {
            self.id.with_mut(|node| node.dirty = true);
            Ok(())
        } else if flags & FLAG_SYNC != 0 {
            self.run()
        } else {
            scheduler::queue_watcher(self.id);
            Ok(())
        }
    }

    /// Re-evaluate and fire the callback if the value changed, is a
    /// composite, or the watcher is deep.
    pub fn run(self) -> Result<()> {
        let Some((active, flags, component)) = self
            .id
            .with(|node| (node.active, node.flags, node.component))
        else {
            return Ok(());
        };
        if !active {
            return Ok(());
        }

        let value = self.get()?;
        let deep = flags & FLAG_DEEP != 0;
        let Some(Some(old)) = self.id.with_mut(|node| {
            let fire = !value.same_value_zero(&node.value) || value.is_composite() || deep;
            fire.then(|| std::mem::replace(&mut node.value, value.clone()))
        }) else {
            return Ok(());
        };

        match self.id.run_callback(&component, &value, &old) {
            Some(Err(err)) if flags & FLAG_USER != 0 => {
                let info = format!("callback for watcher \"{}\"", self.expression());
                report_error(&err, component, &info);
                Ok(())
            }
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        }
    }

    /// Recompute a lazy watcher and publish `key -> value` to the owning
    /// component's dirty buffer.
    pub fn evaluate(self) -> Result<()> {
        let value = self.get()?;
        let Some((component, key)) = self.id.with_mut(|node| {
            node.value = value.clone();
            node.dirty = false;
            (node.component, node.key.clone())
        }) else {
            return Ok(());
        };
        if let Some(key) = key {
            component.record_dirty(|dirty| dirty.push(&key, value));
        }
        Ok(())
    }

    /// Expose this watcher's dependencies to the evaluating target, so that
    /// whoever read a computed value also depends on what the computed read.
    pub fn depend(self) {
        if current_target().is_none() {
            return;
        }
        let deps: Vec<Dep> = self
            .id
            .with(|node| node.deps.values().cloned().collect())
            .unwrap_or_default();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency and deactivate. Idempotent.
    ///
    /// The watcher leaves its component's watcher list too, except while the
    /// whole component is being destroyed.
    pub fn teardown(self) {
        let Some((component, deps)) = self.id.with_mut(|node| {
            if !node.active {
                return None;
            }
            node.active = false;
            let deps: Vec<Dep> = node.deps.drain(..).map(|(_, dep)| dep).collect();
            Some((node.component, deps))
        })
        .flatten() else {
            return;
        };

        if !component.is_being_destroyed() {
            component.unregister_watcher(self.id);
        }
        for dep in deps {
            dep.remove_sub(self.id);
        }
        tracing::trace!(watcher = self.id.uid(), "watcher torn down");
    }

    /// Last evaluated value.
    pub fn value(self) -> Value {
        self.id.with(|node| node.value.clone()).unwrap_or_default()
    }

    /// Whether a lazy watcher needs re-evaluation.
    pub fn is_dirty(self) -> bool {
        self.id.with(|node| node.dirty).unwrap_or(false)
    }

    /// Whether the watcher has not been torn down.
    pub fn is_active(self) -> bool {
        self.id.with(|node| node.active).unwrap_or(false)
    }

    /// Whether the watcher was declared by the user.
    pub fn is_user(self) -> bool {
        self.id.has_flag(FLAG_USER)
    }

    /// The watched path or the evaluator's label.
    pub fn expression(self) -> Arc<str> {
        self.id
            .with(|node| node.expression.clone())
            .unwrap_or_else(|| Arc::from(""))
    }

    /// Number of dependencies collected by the last evaluation.
    pub fn dep_count(self) -> usize {
        self.id.with(|node| node.deps.len()).unwrap_or(0)
    }

    /// Owning component.
    pub fn component(self) -> Option<Component> {
        self.id.with(|node| node.component)
    }

    pub(crate) fn set_key(self, key: Arc<str>) {
        self.id.with_mut(|node| node.key = Some(key));
    }
}

/// Run `f` without a current target: reads inside it subscribe nothing.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TargetGuard::push(None);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dots_and_brackets() {
        assert_eq!(
            parse_path("list[0].name").unwrap(),
            [Key::from("list"), Key::from(0usize), Key::from("name")]
        );
        assert_eq!(
            parse_path("$data.grid[1][2]").unwrap(),
            [
                Key::from("$data"),
                Key::from("grid"),
                Key::from(1usize),
                Key::from(2usize)
            ]
        );
        assert_eq!(parse_path("a.0").unwrap(), [Key::from("a"), Key::from("0")]);
    }

    #[test]
    fn rejects_malformed_paths() {
        let reason = |path: &str| match parse_path(path) {
            Err(Error::InvalidPath { reason, .. }) => reason,
            other => panic!("expected invalid path for {path:?}, got {other:?}"),
        };
        assert_eq!(reason("a-b"), "unexpected character");
        assert_eq!(reason("a..b"), "empty segment");
        assert_eq!(reason(""), "empty segment");
        assert_eq!(reason("a[1"), "unclosed bracket");
        assert_eq!(reason("a[x]"), "bracket index must be digits");
        assert_eq!(reason("a[]"), "bracket index must be digits");
    }

    #[test]
    fn options_map_to_flags() {
        let flags = WatchOptions::default().deep(true).sync(true).flags();
        assert_eq!(flags, FLAG_DEEP | FLAG_SYNC);
        assert_eq!(WatchOptions::default().flags(), 0);
    }

    #[test]
    fn untracked_reads_subscribe_nothing() {
        let component = Component::new("watcher");
        let dep = Dep::new();
        let watcher = {
            let dep = dep.clone();
            Watcher::new(
                component,
                "untracked",
                move |_| {
                    untracked(|| dep.depend());
                    Ok(Value::Null)
                },
                |_, _, _| Ok(()),
                WatchOptions::default(),
            )
            .unwrap()
        };
        assert_eq!(watcher.dep_count(), 0);
        assert_eq!(dep.subscriber_count(), 0);
        component.destroy();
    }

    #[test]
    fn failing_non_user_getter_tears_down() {
        let component = Component::new("watcher");
        let err = Watcher::new(
            component,
            "broken",
            |_| Err(Error::msg("nope")),
            |_, _, _| Ok(()),
            WatchOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert!(component.watchers().is_empty());
        component.destroy();
    }

    #[test]
    fn lazy_watchers_start_dirty() {
        let component = Component::new("watcher");
        let watcher = Watcher::new(
            component,
            "lazy",
            |_| Ok(Value::from(1)),
            |_, _, _| Ok(()),
            WatchOptions::default().lazy(true),
        )
        .unwrap();
        assert!(watcher.is_dirty());
        assert!(watcher.value().is_null());
        watcher.evaluate().unwrap();
        assert!(!watcher.is_dirty());
        assert_eq!(watcher.value(), Value::from(1));
        component.destroy();
    }
}
