#![forbid(unsafe_code)]

//! Renderer configuration and the shared diagnostics sink.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fvdom_runtime::DEFAULT_RECURSION_LIMIT;

use crate::arena::InstanceId;
use crate::error::{ComponentError, ErrorOrigin, Warning};

/// Process-wide handler for errors no `error_captured` hook handled.
/// Receives the error, its origin, and the owning component's name.
pub type ErrorHandler = Rc<dyn Fn(&ComponentError, ErrorOrigin, Option<&str>)>;

/// Receiver for usage warnings.
pub type WarnHandler = Rc<dyn Fn(&Warning)>;

const MAX_RECURSION_LIMIT: u32 = 10_000;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`Renderer`](crate::Renderer).
#[derive(Clone)]
pub struct RendererConfig {
    /// Maximum runs of one job within a single flush.
    /// Default: 100
    pub recursion_limit: u32,

    /// Emit [`Warning::DuplicateKey`] during keyed reconciliation.
    /// Default: true
    pub warn_duplicate_keys: bool,

    /// Handler for uncaptured errors. When unset, errors are logged with
    /// `tracing::error!`.
    pub error_handler: Option<ErrorHandler>,

    /// Handler for warnings, called in addition to `tracing::warn!`.
    pub warn_handler: Option<WarnHandler>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            warn_duplicate_keys: true,
            error_handler: None,
            warn_handler: None,
        }
    }
}

impl fmt::Debug for RendererConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererConfig")
            .field("recursion_limit", &self.recursion_limit)
            .field("warn_duplicate_keys", &self.warn_duplicate_keys)
            .field("error_handler", &self.error_handler.is_some())
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}

impl RendererConfig {
    /// Set the per-flush recursion limit.
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Toggle duplicate-key warnings.
    #[must_use]
    pub fn with_duplicate_key_warnings(mut self, enabled: bool) -> Self {
        self.warn_duplicate_keys = enabled;
        self
    }

    /// Install the uncaptured-error handler.
    #[must_use]
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&ComponentError, ErrorOrigin, Option<&str>) + 'static,
    ) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    /// Install the warning handler.
    #[must_use]
    pub fn with_warn_handler(mut self, handler: impl Fn(&Warning) + 'static) -> Self {
        self.warn_handler = Some(Rc::new(handler));
        self
    }

    /// Copy with out-of-range values clamped.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();
        config.recursion_limit = config.recursion_limit.clamp(1, MAX_RECURSION_LIMIT);
        config
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// An error raised outside the renderer's call stack (event handlers, loader
/// continuations), waiting to be routed through the capture chain.
#[derive(Debug, Clone)]
pub(crate) struct ReportedError {
    pub(crate) owner: Option<InstanceId>,
    pub(crate) error: ComponentError,
    pub(crate) origin: ErrorOrigin,
}

/// Shared sink for warnings and deferred errors. Emitters and async
/// continuations hold a clone; the renderer drains it.
#[derive(Default)]
pub(crate) struct Diagnostics {
    warn_handler: RefCell<Option<WarnHandler>>,
    reported: RefCell<Vec<ReportedError>>,
}

impl Diagnostics {
    pub(crate) fn set_warn_handler(&self, handler: Option<WarnHandler>) {
        *self.warn_handler.borrow_mut() = handler;
    }

    pub(crate) fn warn(&self, warning: Warning) {
        tracing::warn!(%warning, "fvdom usage warning");
        let handler = self.warn_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(&warning);
        }
    }

    pub(crate) fn report(&self, owner: Option<InstanceId>, error: ComponentError, origin: ErrorOrigin) {
        self.reported.borrow_mut().push(ReportedError {
            owner,
            error,
            origin,
        });
    }

    pub(crate) fn take_reported(&self) -> Vec<ReportedError> {
        std::mem::take(&mut *self.reported.borrow_mut())
    }

    pub(crate) fn has_reported(&self) -> bool {
        !self.reported.borrow().is_empty()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("reported", &self.reported.borrow().len())
            .finish_non_exhaustive()
    }
}
