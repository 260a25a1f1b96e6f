//! Computed value definitions.
//!
//! A computed value is declared from a getter, optionally with a setter that
//! receives writes to its key, and optionally uncached.
//!
//! ```ignore
//! page.init_computed_with(
//!     "full_name",
//!     Computed::new(|page| {
//!         let first = page.get("first")?;
//!         let last = page.get("last")?;
//!         Ok(format!("{} {}", first.as_str().unwrap_or(""), last.as_str().unwrap_or("")).into())
//!     })
//!     .setter(|page, value| {
//!         let name = value.as_str().unwrap_or_default().to_string();
//!         let (first, last) = name.split_once(' ').unwrap_or((&name, ""));
//!         page.assign("first", first)?;
//!         page.assign("last", last)?;
//!         Ok(())
//!     }),
//! )?;
//! page.assign("full_name", "Ada Lovelace")?; // Routed to the setter
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::arena::{Getter, WatcherId};
use crate::component::Component;
use crate::error::Result;
use crate::value::Value;

/// Receives writes to a computed key.
pub type ComputedSetter = Box<dyn FnMut(&Component, Value) -> Result<()>>;

/// Definition of a computed value.
pub struct Computed {
    pub(crate) getter: Getter,
    pub(crate) setter: Option<ComputedSetter>,
    pub(crate) cache: bool,
}

impl Computed {
    /// A cached computed value without a setter.
    pub fn new<F>(getter: F) -> Self
    where
        F: FnMut(&Component) -> Result<Value> + 'static,
    {
        Self {
            getter: Box::new(getter),
            setter: None,
            cache: true,
        }
    }

    /// Handle writes to the computed key. Without a setter such writes are
    /// ignored with a warning.
    pub fn setter<F>(mut self, setter: F) -> Self
    where
        F: FnMut(&Component, Value) -> Result<()> + 'static,
    {
        self.setter = Some(Box::new(setter));
        self
    }

    /// With `false` every read calls the getter directly: nothing is cached,
    /// nothing is published to the dirty buffer, and the reader subscribes to
    /// whatever the getter reads.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("setter", &self.setter.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

/// A computed value registered on a component.
#[derive(Clone)]
pub(crate) struct ComputedEntry {
    pub(crate) watcher: WatcherId,
    pub(crate) cache: bool,
    pub(crate) setter: Option<Rc<RefCell<ComputedSetter>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_default_to_cached_and_read_only() {
        let computed = Computed::new(|_| Ok(Value::Null));
        assert!(computed.cache);
        assert!(computed.setter.is_none());

        let computed = computed.cache(false).setter(|_, _| Ok(()));
        let rendered = format!("{computed:?}");
        assert_eq!(rendered, "Computed { setter: true, cache: false }");
    }
}
