#![forbid(unsafe_code)]

//! Lazily loaded components.
//!
//! [`define_async_component`] wraps a loader in a component definition.
//! The loader runs at most once at a time; all instances mounted while it
//! is pending share the request, and once it succeeds the resolved
//! definition is cached for every later mount.
//!
//! Inside an async boundary (and with `suspensible` left on) the wrapper
//! uses an async setup, so the boundary shows its fallback until the load
//! settles. Elsewhere it renders the loading component, then the loaded
//! one.
//!
//! A failed load goes to `on_error` when set, which may retry or give up.
//! A load that gives up is reported with [`ErrorOrigin::AsyncLoader`] and
//! the error component (if any) is rendered with an `error` prop.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use fvdom_runtime::{Deferred, Observable};

use crate::component::{ComponentDef, RenderContext, RenderFn, SetupOutcome};
use crate::error::{ComponentError, ErrorOrigin, LoadError};
use crate::scene::{PropValue, SceneNode};

/// Produces a definition asynchronously.
pub type Loader = Rc<dyn Fn() -> Deferred<Result<ComponentDef, LoadError>>>;

/// Called when a load attempt fails, with the error, retry and fail
/// continuations, and the attempt number (1 for the first failure).
/// Exactly one continuation should be consumed.
pub type LoadErrorHandler = Rc<dyn Fn(&LoadError, Retry, Fail, u32)>;

/// Options for [`define_async_component`].
#[derive(Clone)]
pub struct AsyncComponentOptions {
    loader: Loader,
    loading_component: Option<ComponentDef>,
    error_component: Option<ComponentDef>,
    suspensible: bool,
    on_error: Option<LoadErrorHandler>,
}

impl AsyncComponentOptions {
    /// Options around `loader`, suspensible, with no placeholders.
    pub fn new(loader: impl Fn() -> Deferred<Result<ComponentDef, LoadError>> + 'static) -> Self {
        Self {
            loader: Rc::new(loader),
            loading_component: None,
            error_component: None,
            suspensible: true,
            on_error: None,
        }
    }

    /// Shown while loading outside an async boundary.
    #[must_use]
    pub fn with_loading_component(mut self, def: ComponentDef) -> Self {
        self.loading_component = Some(def);
        self
    }

    /// Shown after the load failed for good. Receives an `error` prop.
    #[must_use]
    pub fn with_error_component(mut self, def: ComponentDef) -> Self {
        self.error_component = Some(def);
        self
    }

    /// Whether an enclosing async boundary should wait for the load.
    /// Default: true
    #[must_use]
    pub fn suspensible(mut self, suspensible: bool) -> Self {
        self.suspensible = suspensible;
        self
    }

    /// Install the failure handler.
    #[must_use]
    pub fn with_on_error(mut self, handler: impl Fn(&LoadError, Retry, Fail, u32) + 'static) -> Self {
        self.on_error = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for AsyncComponentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncComponentOptions")
            .field("loading_component", &self.loading_component)
            .field("error_component", &self.error_component)
            .field("suspensible", &self.suspensible)
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

type LoadResult = Result<ComponentDef, LoadError>;

struct LoaderState {
    options: AsyncComponentOptions,
    resolved: RefCell<Option<ComponentDef>>,
    pending: RefCell<Option<Deferred<LoadResult>>>,
    retries: Cell<u32>,
}

impl LoaderState {
    /// The shared in-flight request, starting one if none is pending.
    fn load(self: &Rc<Self>) -> Deferred<LoadResult> {
        if let Some(pending) = self.pending.borrow().clone() {
            return pending;
        }
        let out = Deferred::new();
        *self.pending.borrow_mut() = Some(out.clone());
        self.attempt(out.clone());
        out
    }

    fn attempt(self: &Rc<Self>, out: Deferred<LoadResult>) {
        let this = Rc::clone(self);
        tracing::debug!(retries = self.retries.get(), "async component load");
        (self.options.loader)().on_settle(move |result| match result {
            Ok(def) => {
                *this.resolved.borrow_mut() = Some(def.clone());
                out.settle(Ok(def.clone()));
            }
            Err(error) => match this.options.on_error.clone() {
                Some(handler) => {
                    let attempt = this.retries.get() + 1;
                    let retry = Retry {
                        state: Rc::clone(&this),
                        out: out.clone(),
                    };
                    let fail = Fail {
                        state: Rc::clone(&this),
                        out: out.clone(),
                        error: error.clone(),
                    };
                    handler(error, retry, fail, attempt);
                }
                None => this.fail(&out, error.clone()),
            },
        });
    }

    fn fail(&self, out: &Deferred<LoadResult>, error: LoadError) {
        *self.pending.borrow_mut() = None;
        out.settle(Err(error));
    }
}

/// Continuation that runs the loader again.
pub struct Retry {
    state: Rc<LoaderState>,
    out: Deferred<LoadResult>,
}

impl Retry {
    /// Start another load attempt.
    pub fn retry(self) {
        self.state.retries.set(self.state.retries.get() + 1);
        self.state.attempt(self.out);
    }
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("retries", &self.state.retries.get())
            .finish()
    }
}

/// Continuation that gives up with the failing error.
pub struct Fail {
    state: Rc<LoaderState>,
    out: Deferred<LoadResult>,
    error: LoadError,
}

impl Fail {
    /// Settle the load as failed. The next mount starts a fresh request.
    pub fn fail(self) {
        self.state.fail(&self.out, self.error);
    }
}

impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fail").field("error", &self.error).finish()
    }
}

#[derive(Clone, PartialEq)]
enum LoadStatus {
    Loading,
    Loaded(ComponentDef),
    Failed(LoadError),
}

/// Render the loaded definition with the wrapper's props and slots.
fn inner_node(def: &ComponentDef, ctx: &RenderContext) -> SceneNode {
    SceneNode::component(def)
        .props(ctx.props())
        .slots(ctx.slots().clone())
}

fn error_node(def: &ComponentDef, error: &LoadError) -> SceneNode {
    SceneNode::component(def).prop("error", PropValue::Str(error.to_string().into()))
}

fn render_loaded(def: ComponentDef) -> RenderFn {
    Rc::new(move |ctx: &RenderContext| -> Result<SceneNode, ComponentError> {
        Ok(inner_node(&def, ctx))
    })
}

/// Wrap `options.loader` in a component definition.
#[must_use]
pub fn define_async_component(options: AsyncComponentOptions) -> ComponentDef {
    let state = Rc::new(LoaderState {
        options,
        resolved: RefCell::new(None),
        pending: RefCell::new(None),
        retries: Cell::new(0),
    });

    ComponentDef::new("AsyncComponentWrapper", move |cx| {
        if let Some(def) = state.resolved.borrow().clone() {
            return Ok(SetupOutcome::Render(render_loaded(def)));
        }
        let reporter = cx.error_reporter();
        let error_component = state.options.error_component.clone();

        if state.options.suspensible && cx.has_async_boundary() {
            let deferred = state.load().map(move |result| -> Result<RenderFn, ComponentError> {
                match result {
                    Ok(def) => Ok(render_loaded(def.clone())),
                    Err(error) => {
                        reporter.report(ComponentError::Load(error.clone()), ErrorOrigin::AsyncLoader);
                        let fallback = error_component.map(|ec| error_node(&ec, error));
                        let render: RenderFn =
                            Rc::new(move |_: &RenderContext| -> Result<SceneNode, ComponentError> {
                                Ok(fallback.clone().unwrap_or_else(|| SceneNode::comment("")))
                            });
                        Ok(render)
                    }
                }
            });
            return Ok(SetupOutcome::Async(deferred));
        }

        let status = Observable::new(LoadStatus::Loading);
        let sink = status.clone();
        state.load().on_settle(move |result| match result {
            Ok(def) => sink.set(LoadStatus::Loaded(def.clone())),
            Err(error) => {
                reporter.report(ComponentError::Load(error.clone()), ErrorOrigin::AsyncLoader);
                sink.set(LoadStatus::Failed(error.clone()));
            }
        });
        let loading_component = state.options.loading_component.clone();
        Ok(SetupOutcome::render(move |ctx| {
            let node = match status.get() {
                LoadStatus::Loaded(def) => inner_node(&def, ctx),
                LoadStatus::Failed(error) => match &error_component {
                    Some(ec) => error_node(ec, &error),
                    None => SceneNode::comment(""),
                },
                LoadStatus::Loading => match &loading_component {
                    Some(lc) => SceneNode::component(lc),
                    None => SceneNode::comment(""),
                },
            };
            Ok(node)
        }))
    })
}
