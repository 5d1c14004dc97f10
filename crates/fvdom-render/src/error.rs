#![forbid(unsafe_code)]

//! Error and warning types.
//!
//! Two channels leave the engine:
//!
//! - **Errors** ([`ComponentError`]) come out of user code: setup, render
//!   functions, lifecycle hooks, event handlers, watchers, async loaders.
//!   They are routed through the owning component's `error_captured` chain
//!   and then to the configured error handler. They never abort a patch.
//! - **Warnings** ([`Warning`]) are usage diagnostics. The engine logs them
//!   with `tracing::warn!`, hands them to the configured warn handler, and
//!   carries on with best-effort behavior.
//!
//! [`AppError`] covers misuse of the application entry points and is the
//! only error returned directly to the caller.

use std::fmt;
use std::rc::Rc;

use fvdom_runtime::SchedulerError;

use crate::component::HookKind;
use crate::scene::Key;

/// Error raised by user code running inside the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComponentError {
    /// Free-form failure from a setup, render, hook, or handler.
    #[error("{0}")]
    Message(Rc<str>),
    /// An async component loader failed permanently.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The scheduler refused to run a job again.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ComponentError {
    /// Build a [`ComponentError::Message`].
    #[must_use]
    pub fn msg(message: impl Into<Rc<str>>) -> Self {
        Self::Message(message.into())
    }
}

impl From<&str> for ComponentError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for ComponentError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

/// Failure reported by an async component loader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The loader rejected.
    #[error("async component loader failed: {0}")]
    Failed(Rc<str>),
}

impl LoadError {
    /// Build a [`LoadError::Failed`].
    #[must_use]
    pub fn failed(reason: impl Into<Rc<str>>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Misuse of the application entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    /// `mount` called on an application that is already mounted.
    #[error("application is already mounted")]
    AlreadyMounted,
    /// `unmount` called on an application that was never mounted.
    #[error("application is not mounted")]
    NotMounted,
}

/// Where an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorOrigin {
    /// The component's setup closure.
    Setup,
    /// The component's render function.
    Render,
    /// A component lifecycle hook.
    Hook(HookKind),
    /// An element vnode hook prop (`onVnodeMounted` and friends).
    VnodeHook,
    /// An event handler invoked through `emit`.
    EventHandler,
    /// A pre-flush watcher.
    Watcher,
    /// An async component loader.
    AsyncLoader,
    /// The deferred returned by an async setup.
    AsyncSetup,
    /// The scheduler itself (recursion limit).
    Scheduler,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => write!(f, "setup function"),
            Self::Render => write!(f, "render function"),
            Self::Hook(kind) => write!(f, "{kind} hook"),
            Self::VnodeHook => write!(f, "vnode hook"),
            Self::EventHandler => write!(f, "component event handler"),
            Self::Watcher => write!(f, "watcher callback"),
            Self::AsyncLoader => write!(f, "async component loader"),
            Self::AsyncSetup => write!(f, "async setup"),
            Self::Scheduler => write!(f, "scheduler flush"),
        }
    }
}

/// Non-fatal usage diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Two siblings in one keyed range share a key. The first one wins.
    DuplicateKey {
        /// The repeated key.
        key: Key,
    },
    /// `emit` called with an event the component did not declare.
    UndeclaredEmit {
        /// Emitting component.
        component: Rc<str>,
        /// Event name as passed to `emit`.
        event: Rc<str>,
    },
    /// A declared emit validator rejected the arguments.
    InvalidEmitArguments {
        /// Emitting component.
        component: Rc<str>,
        /// Event name.
        event: Rc<str>,
    },
    /// A component returned an async setup with no enclosing async boundary.
    AsyncSetupWithoutBoundary {
        /// The component.
        component: Rc<str>,
    },
    /// A teleport target could not be resolved.
    InvalidTeleportTarget {
        /// The selector that failed to resolve.
        target: Rc<str>,
    },
    /// A render function asked for a slot the parent did not pass.
    MissingSlot {
        /// The component.
        component: Rc<str>,
        /// Slot name.
        slot: Rc<str>,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey { key } => {
                write!(f, "duplicate key {key} among siblings; later occurrences are unmatched")
            }
            Self::UndeclaredEmit { component, event } => write!(
                f,
                "component <{component}> emitted \"{event}\" but it is not declared in emits"
            ),
            Self::InvalidEmitArguments { component, event } => write!(
                f,
                "invalid arguments for event \"{event}\" emitted by <{component}>"
            ),
            Self::AsyncSetupWithoutBoundary { component } => write!(
                f,
                "component <{component}> returned an async setup but no async boundary was found; it renders once the setup settles"
            ),
            Self::InvalidTeleportTarget { target } => {
                write!(f, "teleport target \"{target}\" could not be resolved")
            }
            Self::MissingSlot { component, slot } => {
                write!(f, "component <{component}> rendered missing slot \"{slot}\"")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_error_from_load_error() {
        let err: ComponentError = LoadError::failed("offline").into();
        assert_eq!(err.to_string(), "async component loader failed: offline");
    }

    #[test]
    fn origin_display_names_the_hook() {
        let origin = ErrorOrigin::Hook(HookKind::BeforeUpdate);
        assert_eq!(origin.to_string(), "beforeUpdate hook");
    }

    #[test]
    fn warning_display_mentions_key() {
        let warning = Warning::DuplicateKey { key: Key::from("a") };
        assert!(warning.to_string().contains("\"a\""));
    }
}
