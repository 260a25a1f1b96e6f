use thiserror::Error;

use crate::component::Component;
use crate::config;

/// Result alias used throughout the engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by evaluators, callbacks and reactive mutations.
#[derive(Debug, Error)]
pub enum Error {
    /// Free-form failure raised by user evaluators or callbacks.
    #[error("{0}")]
    Message(String),

    /// A watch expression that is not a valid dotted/bracketed path.
    #[error("invalid watch path \"{path}\": {reason}")]
    InvalidPath {
        /// The rejected expression.
        path: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// An operation was applied to the wrong kind of container.
    #[error("expected {expected}, found {found}")]
    WrongKind {
        /// Kind the operation needs.
        expected: &'static str,
        /// Kind that was supplied.
        found: &'static str,
    },

    /// The owning component was destroyed before the operation ran.
    #[error("component has been destroyed")]
    ComponentDestroyed,
}

impl Error {
    /// Build an [`Error::Message`].
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }
}

/// Error-reporting collaborator.
///
/// Invoked for failures of user-declared watchers, which must not abort the
/// surrounding flush. `info` names the failing hook, e.g.
/// `callback for watcher "user.name"`. If a handler is configured through
/// [`Config::error_handler`](crate::Config::error_handler) it takes over,
/// otherwise the error is logged.
pub fn report_error(error: &Error, component: Component, info: &str) {
    if let Some(handler) = config::error_handler() {
        handler(error, component, info);
        return;
    }
    tracing::error!(component = %component.name(), %error, "error in {info}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn invalid_path_message_names_the_expression() {
        let err = Error::InvalidPath {
            path: "a-b".into(),
            reason: "unexpected character",
        };
        assert_eq!(
            err.to_string(),
            "invalid watch path \"a-b\": unexpected character"
        );
    }

    #[test]
    fn configured_handler_receives_context() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let previous = Config::new()
            .error_handler(move |err, component, info| {
                sink.borrow_mut()
                    .push(format!("{}|{}|{}", component.name(), info, err));
            })
            .install();

        let component = Component::new("page");
        report_error(&Error::msg("boom"), component, "getter for watcher \"x\"");
        previous.install();

        assert_eq!(
            seen.borrow().as_slice(),
            ["page|getter for watcher \"x\"|boom"]
        );
        component.destroy();
    }
}
