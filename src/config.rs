//! Per-thread engine configuration.
//!
//! The engine is single-threaded, so configuration lives next to the rest of
//! its state in a thread-local. Build a [`Config`] and [`install`](Config::install)
//! it; the previous configuration is handed back so it can be restored.
//!
//! ```ignore
//! let previous = Config::new()
//!     .max_update_count(50)
//!     .silent(true)
//!     .install();
//! // ...
//! previous.install();
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::component::Component;
use crate::error::Error;

/// Default re-entry threshold for the runaway-update detector.
pub const DEFAULT_MAX_UPDATE_COUNT: u32 = 100;

/// Handler invoked by [`report_error`](crate::report_error).
pub type ErrorHandler = Rc<dyn Fn(&Error, Component, &str)>;

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::new());
}

/// Builder for the engine configuration of the current thread.
#[derive(Clone)]
pub struct Config {
    max_update_count: u32,
    silent: bool,
    error_handler: Option<ErrorHandler>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_update_count", &self.max_update_count)
            .field("silent", &self.silent)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl Config {
    /// Defaults:
    /// - `max_update_count`: 100
    /// - `silent`: false
    /// - `error_handler`: none (errors are logged)
    pub fn new() -> Self {
        Self {
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
            silent: false,
            error_handler: None,
        }
    }

    /// How many times one watcher may re-enqueue itself within a single flush
    /// before it is abandoned as an infinite update loop.
    pub fn max_update_count(mut self, count: u32) -> Self {
        self.max_update_count = count;
        self
    }

    /// Suppress engine warnings (runaway loops, invalid watch paths).
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Route user watcher failures to `handler` instead of the log.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error, Component, &str) + 'static,
    {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    /// Make this the configuration of the current thread, returning the old one.
    pub fn install(self) -> Config {
        CONFIG.with(|c| c.replace(self))
    }
}

/// Snapshot of the current thread's configuration.
pub fn current() -> Config {
    CONFIG.with(|c| c.borrow().clone())
}

pub(crate) fn max_update_count() -> u32 {
    CONFIG.with(|c| c.borrow().max_update_count)
}

pub(crate) fn error_handler() -> Option<ErrorHandler> {
    CONFIG.with(|c| c.borrow().error_handler.clone())
}

/// Emit an engine warning unless the configuration is silent.
pub(crate) fn warn(message: &str, component: Option<Component>) {
    if CONFIG.with(|c| c.borrow().silent) {
        return;
    }
    match component {
        Some(component) => {
            tracing::warn!(component = %component.name(), "{message}");
        }
        None => tracing::warn!("{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_returns_previous_configuration() {
        let previous = Config::new().max_update_count(7).install();
        assert_eq!(max_update_count(), 7);
        assert_eq!(previous.max_update_count, DEFAULT_MAX_UPDATE_COUNT);

        previous.install();
        assert_eq!(current().max_update_count, DEFAULT_MAX_UPDATE_COUNT);
    }

    #[test]
    fn debug_hides_handler_body() {
        let config = Config::new().error_handler(|_, _, _| {});
        let rendered = format!("{config:?}");
        assert!(rendered.contains("error_handler: true"));
    }
}
