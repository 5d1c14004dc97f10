#![forbid(unsafe_code)]

//! Component definitions and the contexts handed to user code.
//!
//! A [`ComponentDef`] is a named `setup` closure plus declarations. Setup
//! runs once per instance and receives a [`SetupContext`]: the explicit
//! context through which it registers lifecycle hooks and watchers, reads
//! props, and obtains an [`Emitter`]. It returns how the instance renders:
//! a render function right away, or a [`Deferred`] one (async setup).
//!
//! Render functions receive a [`RenderContext`]. Observables read while
//! rendering become dependencies of the instance's render computation; a
//! change queues the instance's update job.
//!
//! # Lifecycle
//!
//! ```text
//! Created -> Mounting -> Mounted <-> Updating
//!                           |
//!                           v
//!                      Unmounting -> Unmounted
//! ```
//!
//! Before-hooks run inline with the instance's self re-queue disabled.
//! After-hooks (`mounted`, `updated`, `unmounted`) run as post-flush
//! callbacks once the structural pass has committed.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use fvdom_runtime::{Computation, Deferred, JobHandle, JobId, Observable, Scheduler};

use crate::arena::InstanceId;
use crate::config::Diagnostics;
use crate::emit::Emitter;
use crate::error::{ComponentError, ErrorOrigin, Warning};
use crate::renderer::RenderTask;
use crate::scene::{PropValue, Props, SceneNode, Slots};

/// A component render function.
pub type RenderFn = Rc<dyn Fn(&RenderContext) -> Result<SceneNode, ComponentError>>;

/// A lifecycle hook.
pub type Hook = Rc<dyn Fn() -> Result<(), ComponentError>>;

/// An error-captured hook. Returns `true` when it handled the error, which
/// stops propagation.
pub type ErrorCapturedHook = Rc<dyn Fn(&ComponentError, ErrorOrigin) -> bool>;

/// Validator for emitted event arguments.
pub type EmitValidator = Rc<dyn Fn(&[PropValue]) -> bool>;

/// Result of an async setup.
pub type AsyncSetup = Deferred<Result<RenderFn, ComponentError>>;

type SetupFn = Rc<dyn Fn(&mut SetupContext) -> Result<SetupOutcome, ComponentError>>;

/// What setup produced.
pub enum SetupOutcome {
    /// Render synchronously with this function.
    Render(RenderFn),
    /// Render once the deferred settles. Inside an async boundary the
    /// instance counts as a pending dependency until then.
    Async(AsyncSetup),
}

impl SetupOutcome {
    /// Wrap a render closure.
    pub fn render(
        f: impl Fn(&RenderContext) -> Result<SceneNode, ComponentError> + 'static,
    ) -> Self {
        Self::Render(Rc::new(f))
    }
}

impl fmt::Debug for SetupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render(_) => write!(f, "SetupOutcome::Render"),
            Self::Async(d) => write!(f, "SetupOutcome::Async(settled: {})", d.is_settled()),
        }
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle hook kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before the first render.
    BeforeMount,
    /// After the subtree is in the host tree.
    Mounted,
    /// Before a re-render.
    BeforeUpdate,
    /// After a re-render is committed.
    Updated,
    /// Before teardown, while the subtree is still mounted.
    BeforeUnmount,
    /// After teardown.
    Unmounted,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeMount => "beforeMount",
            Self::Mounted => "mounted",
            Self::BeforeUpdate => "beforeUpdate",
            Self::Updated => "updated",
            Self::BeforeUnmount => "beforeUnmount",
            Self::Unmounted => "unmounted",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Setup ran; nothing rendered yet.
    Created,
    /// First render and mount in progress.
    Mounting,
    /// Subtree is live.
    Mounted,
    /// Re-render in progress.
    Updating,
    /// Teardown in progress.
    Unmounting,
    /// Torn down; the instance never runs again.
    Unmounted,
}

/// Ordered hook lists of one instance.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    before_mount: Vec<Hook>,
    mounted: Vec<Hook>,
    before_update: Vec<Hook>,
    updated: Vec<Hook>,
    before_unmount: Vec<Hook>,
    unmounted: Vec<Hook>,
    error_captured: Vec<ErrorCapturedHook>,
}

impl LifecycleHooks {
    /// Hooks of one kind, in registration order.
    #[must_use]
    pub fn get(&self, kind: HookKind) -> &[Hook] {
        match kind {
            HookKind::BeforeMount => &self.before_mount,
            HookKind::Mounted => &self.mounted,
            HookKind::BeforeUpdate => &self.before_update,
            HookKind::Updated => &self.updated,
            HookKind::BeforeUnmount => &self.before_unmount,
            HookKind::Unmounted => &self.unmounted,
        }
    }

    /// Register a hook.
    pub fn push(&mut self, kind: HookKind, hook: Hook) {
        match kind {
            HookKind::BeforeMount => self.before_mount.push(hook),
            HookKind::Mounted => self.mounted.push(hook),
            HookKind::BeforeUpdate => self.before_update.push(hook),
            HookKind::Updated => self.updated.push(hook),
            HookKind::BeforeUnmount => self.before_unmount.push(hook),
            HookKind::Unmounted => self.unmounted.push(hook),
        }
    }

    /// Error-captured hooks.
    #[must_use]
    pub fn error_captured(&self) -> &[ErrorCapturedHook] {
        &self.error_captured
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("before_mount", &self.before_mount.len())
            .field("mounted", &self.mounted.len())
            .field("before_update", &self.before_update.len())
            .field("updated", &self.updated.len())
            .field("before_unmount", &self.before_unmount.len())
            .field("unmounted", &self.unmounted.len())
            .field("error_captured", &self.error_captured.len())
            .finish()
    }
}

// =============================================================================
// Definitions
// =============================================================================

#[derive(Clone)]
pub(crate) struct EmitDecl {
    pub(crate) name: Rc<str>,
    pub(crate) validator: Option<EmitValidator>,
}

#[derive(Clone)]
struct ComponentDefInner {
    name: Rc<str>,
    props: Vec<Rc<str>>,
    emits: Option<Vec<EmitDecl>>,
    setup: SetupFn,
}

/// A component definition. Cheap to clone; identity is by pointer.
#[derive(Clone)]
pub struct ComponentDef(Rc<ComponentDefInner>);

impl ComponentDef {
    /// Define a component from a setup closure.
    pub fn new(
        name: impl Into<Rc<str>>,
        setup: impl Fn(&mut SetupContext) -> Result<SetupOutcome, ComponentError> + 'static,
    ) -> Self {
        Self(Rc::new(ComponentDefInner {
            name: name.into(),
            props: Vec::new(),
            emits: None,
            setup: Rc::new(setup),
        }))
    }

    /// Define a stateless component from a render closure.
    pub fn functional(
        name: impl Into<Rc<str>>,
        render: impl Fn(&RenderContext) -> Result<SceneNode, ComponentError> + 'static,
    ) -> Self {
        let render: RenderFn = Rc::new(render);
        Self::new(name, move |_| Ok(SetupOutcome::Render(Rc::clone(&render))))
    }

    /// Declare props. Undeclared incoming props are exposed as attrs.
    #[must_use]
    pub fn with_props<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Rc<str>>,
    {
        Rc::make_mut(&mut self.0).props = names.into_iter().map(Into::into).collect();
        self
    }

    /// Declare emitted events.
    #[must_use]
    pub fn with_emits<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Rc<str>>,
    {
        let decls = names
            .into_iter()
            .map(|name| EmitDecl {
                name: name.into(),
                validator: None,
            })
            .collect();
        Rc::make_mut(&mut self.0).emits = Some(decls);
        self
    }

    /// Declare an emitted event with an argument validator.
    #[must_use]
    pub fn with_emit_validator(
        mut self,
        name: impl Into<Rc<str>>,
        validator: impl Fn(&[PropValue]) -> bool + 'static,
    ) -> Self {
        let name = name.into();
        let validator: EmitValidator = Rc::new(validator);
        let inner = Rc::make_mut(&mut self.0);
        let emits = inner.emits.get_or_insert_with(Vec::new);
        match emits.iter_mut().find(|d| d.name == name) {
            Some(decl) => decl.validator = Some(validator),
            None => emits.push(EmitDecl {
                name,
                validator: Some(validator),
            }),
        }
        self
    }

    /// Component name (used in warnings and error reports).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Declared prop names.
    #[must_use]
    pub fn declared_props(&self) -> &[Rc<str>] {
        &self.0.props
    }

    /// Whether `name` is a declared prop.
    #[must_use]
    pub fn declares_prop(&self, name: &str) -> bool {
        self.0.props.iter().any(|p| p.as_ref() == name)
    }

    pub(crate) fn emits(&self) -> Option<&[EmitDecl]> {
        self.0.emits.as_deref()
    }

    pub(crate) fn run_setup(&self, cx: &mut SetupContext) -> Result<SetupOutcome, ComponentError> {
        (self.0.setup)(cx)
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ComponentDef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.0.name)
            .field("props", &self.0.props)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Watchers
// =============================================================================

/// A pre-flush side effect that re-runs when the observables it read change.
pub(crate) struct Watcher {
    pub(crate) job: JobHandle,
    pub(crate) computation: Computation,
    pub(crate) effect: Rc<dyn Fn() -> Result<(), ComponentError>>,
}

impl Watcher {
    pub(crate) fn run(&self) -> Result<(), ComponentError> {
        if !self.job.is_active() {
            return Ok(());
        }
        let effect = Rc::clone(&self.effect);
        self.computation.run(|| effect())
    }

    pub(crate) fn stop(&self) {
        self.job.deactivate();
        self.computation.stop();
    }
}

// =============================================================================
// Contexts
// =============================================================================

/// Context passed to `setup`.
pub struct SetupContext {
    pub(crate) instance: InstanceId,
    pub(crate) name: Rc<str>,
    pub(crate) props: Observable<Props>,
    pub(crate) slots: Slots,
    pub(crate) hooks: LifecycleHooks,
    pub(crate) watchers: Vec<Rc<Watcher>>,
    pub(crate) emitter: Emitter,
    pub(crate) scheduler: Scheduler<RenderTask>,
    pub(crate) watch_ids: Rc<Cell<JobId>>,
    pub(crate) in_boundary: bool,
    pub(crate) diagnostics: Rc<Diagnostics>,
}

impl SetupContext {
    /// Reactive handle to the instance's props.
    #[must_use]
    pub fn props(&self) -> Observable<Props> {
        self.props.clone()
    }

    /// Current value of one prop (not tracked).
    #[must_use]
    pub fn prop(&self, name: &str) -> Option<PropValue> {
        self.props.get_untracked().get(name).cloned()
    }

    /// Slots passed by the parent.
    #[must_use]
    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    /// Emitter for this instance's declared events.
    #[must_use]
    pub fn emitter(&self) -> Emitter {
        self.emitter.clone()
    }

    /// Whether an async boundary encloses this instance.
    #[must_use]
    pub fn has_async_boundary(&self) -> bool {
        self.in_boundary
    }

    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a hook.
    pub fn on(&mut self, kind: HookKind, hook: impl Fn() -> Result<(), ComponentError> + 'static) {
        self.hooks.push(kind, Rc::new(hook));
    }

    /// Register a before-mount hook.
    pub fn on_before_mount(&mut self, hook: impl Fn() -> Result<(), ComponentError> + 'static) {
        self.on(HookKind::BeforeMount, hook);
    }

    /// Register a mounted hook.
    pub fn on_mounted(&mut self, hook: impl Fn() -> Result<(), ComponentError> + 'static) {
        self.on(HookKind::Mounted, hook);
    }

    /// Register a before-update hook.
    pub fn on_before_update(&mut self, hook: impl Fn() -> Result<(), ComponentError> + 'static) {
        self.on(HookKind::BeforeUpdate, hook);
    }

    /// Register an updated hook.
    pub fn on_updated(&mut self, hook: impl Fn() -> Result<(), ComponentError> + 'static) {
        self.on(HookKind::Updated, hook);
    }

    /// Register a before-unmount hook.
    pub fn on_before_unmount(&mut self, hook: impl Fn() -> Result<(), ComponentError> + 'static) {
        self.on(HookKind::BeforeUnmount, hook);
    }

    /// Register an unmounted hook.
    pub fn on_unmounted(&mut self, hook: impl Fn() -> Result<(), ComponentError> + 'static) {
        self.on(HookKind::Unmounted, hook);
    }

    /// Register an error-captured hook for errors raised by this instance
    /// or its descendants.
    pub fn on_error_captured(
        &mut self,
        hook: impl Fn(&ComponentError, ErrorOrigin) -> bool + 'static,
    ) {
        self.hooks.error_captured.push(Rc::new(hook));
    }

    /// Run `effect` now, tracking the observables it reads, and again in
    /// the pre-flush lane whenever one of them changes. The watcher stops
    /// when the instance unmounts.
    pub fn watch(
        &mut self,
        effect: impl Fn() -> Result<(), ComponentError> + 'static,
    ) -> Result<(), ComponentError> {
        let id = self.watch_ids.get();
        self.watch_ids.set(id + 1);
        let scheduler = self.scheduler.clone();
        let owner = self.instance;
        let effect: Rc<dyn Fn() -> Result<(), ComponentError>> = Rc::new(effect);
        let watcher = Rc::new_cyclic(|weak: &Weak<Watcher>| {
            let weak = weak.clone();
            Watcher {
                job: JobHandle::new(id),
                computation: Computation::new(move || {
                    if let Some(watcher) = weak.upgrade() {
                        let job = watcher.job.clone();
                        scheduler.queue_pre(&job, RenderTask::Watch { owner, watcher });
                    }
                }),
                effect,
            }
        });
        self.watchers.push(Rc::clone(&watcher));
        watcher.run()
    }

    pub(crate) fn error_reporter(&self) -> ErrorReporter {
        ErrorReporter {
            owner: self.instance,
            diagnostics: Rc::clone(&self.diagnostics),
        }
    }
}

impl fmt::Debug for SetupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupContext")
            .field("name", &self.name)
            .field("hooks", &self.hooks)
            .field("watchers", &self.watchers.len())
            .field("in_boundary", &self.in_boundary)
            .finish()
    }
}

/// Reports errors raised after setup returned (loader continuations).
#[derive(Clone)]
pub(crate) struct ErrorReporter {
    owner: InstanceId,
    diagnostics: Rc<Diagnostics>,
}

impl ErrorReporter {
    pub(crate) fn report(&self, error: ComponentError, origin: ErrorOrigin) {
        self.diagnostics.report(Some(self.owner), error, origin);
    }
}

/// Context passed to render functions.
pub struct RenderContext {
    pub(crate) def: ComponentDef,
    pub(crate) props: Observable<Props>,
    pub(crate) slots: Slots,
    pub(crate) emitter: Emitter,
    pub(crate) diagnostics: Rc<Diagnostics>,
}

impl RenderContext {
    /// All incoming props (tracked).
    #[must_use]
    pub fn props(&self) -> Props {
        self.props.get()
    }

    /// One incoming prop (tracked).
    #[must_use]
    pub fn prop(&self, name: &str) -> Option<PropValue> {
        self.props.with(|props| props.get(name).cloned())
    }

    /// Incoming props that are neither declared props nor listeners for
    /// declared events. Empty when the component declares no props.
    #[must_use]
    pub fn attrs(&self) -> Props {
        if self.def.declared_props().is_empty() {
            return Props::new();
        }
        self.props.with(|props| {
            props
                .iter()
                .filter(|(k, _)| !self.def.declares_prop(k) && !self.emitter.is_declared_listener(k))
                .map(|(k, v)| (k, v.clone()))
                .collect()
        })
    }

    /// Slots passed by the parent.
    #[must_use]
    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    /// Render a slot. A missing slot warns and yields nothing.
    #[must_use]
    pub fn slot(&self, name: &str, props: &Props) -> Vec<SceneNode> {
        match self.slots.get(name) {
            Some(slot) => slot(props),
            None => {
                self.diagnostics.warn(Warning::MissingSlot {
                    component: self.def.name().into(),
                    slot: name.into(),
                });
                Vec::new()
            }
        }
    }

    /// Render a slot if the parent passed it.
    #[must_use]
    pub fn try_slot(&self, name: &str, props: &Props) -> Option<Vec<SceneNode>> {
        self.slots.get(name).map(|slot| slot(props))
    }

    /// Emit an event to the parent's `on{Event}` listener.
    pub fn emit(&self, event: &str, args: &[PropValue]) {
        self.emitter.emit(event, args);
    }

    /// This instance's emitter.
    #[must_use]
    pub fn emitter(&self) -> Emitter {
        self.emitter.clone()
    }

    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.def.name()
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("component", &self.def.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_keep_registration_order() {
        let mut hooks = LifecycleHooks::default();
        let first: Hook = Rc::new(|| Ok(()));
        let second: Hook = Rc::new(|| Err(ComponentError::msg("second")));
        hooks.push(HookKind::Mounted, Rc::clone(&first));
        hooks.push(HookKind::Mounted, Rc::clone(&second));
        let mounted = hooks.get(HookKind::Mounted);
        assert_eq!(mounted.len(), 2);
        assert!(Rc::ptr_eq(&mounted[0], &first));
        assert!(mounted[1]().is_err());
        assert!(hooks.get(HookKind::Updated).is_empty());
    }

    #[test]
    fn definitions_compare_by_identity() {
        let a = ComponentDef::functional("A", |_| Ok(SceneNode::text("a")));
        let b = ComponentDef::functional("A", |_| Ok(SceneNode::text("a")));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn declarations_are_recorded() {
        let def = ComponentDef::functional("Field", |_| Ok(SceneNode::comment("")))
            .with_props(["value", "label"])
            .with_emits(["change"])
            .with_emit_validator("submit", |args| args.len() == 1);
        assert!(def.declares_prop("value"));
        assert!(!def.declares_prop("class"));
        let emits = def.emits().unwrap_or_default();
        assert_eq!(emits.len(), 2);
        assert!(emits[1].validator.is_some());
    }

    #[test]
    fn hook_kind_names() {
        assert_eq!(HookKind::BeforeUnmount.to_string(), "beforeUnmount");
        assert_eq!(HookKind::Mounted.to_string(), "mounted");
    }
}
