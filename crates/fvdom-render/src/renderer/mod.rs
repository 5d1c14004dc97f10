#![forbid(unsafe_code)]

//! The patch engine.
//!
//! [`Renderer`] owns a [`HostAdapter`], the mounted node tree, component
//! instances, async boundaries, and the scheduler that drives re-renders.
//! Given an old mounted tree and a new scene tree it issues the minimal
//! host mutations to make the host match.
//!
//! # Architecture
//!
//! ```text
//!  render(tree, container)            flush()
//!        |                               |
//!        v                               v
//!     patch() <---- Update(job) ---- Scheduler { pre | main | post }
//!        |                               ^
//!        +-- element / fragment / text   |  Computation trigger
//!        +-- component ------------------+  (observable write)
//!        +-- teleport / suspense
//!        v
//!   HostAdapter calls
//! ```
//!
//! Mounted nodes, instances, and boundaries live in generational arenas and
//! refer to each other by id. A stale id resolves to nothing, so unmounting
//! an already unmounted node is a no-op.
//!
//! # Invariants
//!
//! 1. **Host mirror**: after `render` or `flush` returns, the host tree under
//!    each container matches the latest scene tree.
//! 2. **Order**: keyed children end in new-list order; unkeyed children keep
//!    position.
//! 3. **Hook order**: before-hooks run inline; after-hooks run in the post
//!    lane, or are held by a pending async boundary until it resolves.
//! 4. **No double removal**: every mounted host node is removed at most once.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Setup/render error | User code returns `Err` | Routed to error-captured hooks, then the global handler; the instance renders an empty comment |
//! | Recursion limit | A job re-queues itself past the limit | Job skipped for the rest of the flush; error routed to its owner |
//! | Invalid teleport target | Selector does not resolve | Warning; children stay unmounted |
//! | Duplicate key | Two new siblings share a key | Warning; the first one wins |

mod children;
mod lifecycle;
mod patch;
mod suspense;
mod teleport;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use fvdom_runtime::{FlushReport, JobId, Scheduler, SchedulerError};

use crate::arena::{
    Arena, BoundaryId, BoundaryMarker, InstanceId, InstanceMarker, NodeId, NodeMarker,
};
use crate::component::{Hook, HookKind, RenderFn, Watcher};
use crate::config::{Diagnostics, RendererConfig};
use crate::error::{ComponentError, ErrorOrigin};
use crate::host::HostAdapter;
use crate::scene::{Handler, SceneNode};

pub(crate) use lifecycle::ComponentInstance;
pub(crate) use suspense::Boundary;

// =============================================================================
// Tasks
// =============================================================================

/// Unit of work carried by the scheduler.
#[derive(Clone)]
pub(crate) enum RenderTask {
    /// Re-render a component instance.
    Update(InstanceId),
    /// Re-run a watcher.
    Watch {
        owner: InstanceId,
        watcher: Rc<Watcher>,
    },
    /// A deferred lifecycle hook.
    Hook {
        owner: Option<InstanceId>,
        kind: HookKind,
        hook: Hook,
    },
    /// A deferred vnode hook prop.
    VnodeHook {
        owner: Option<InstanceId>,
        handler: Handler,
    },
    /// An async setup settled.
    AsyncSettled {
        instance: InstanceId,
        outcome: Result<RenderFn, ComponentError>,
    },
}

impl fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update(id) => write!(f, "Update({id:?})"),
            Self::Watch { owner, .. } => write!(f, "Watch({owner:?})"),
            Self::Hook { owner, kind, .. } => write!(f, "Hook({kind}, {owner:?})"),
            Self::VnodeHook { owner, .. } => write!(f, "VnodeHook({owner:?})"),
            Self::AsyncSettled { instance, outcome } => {
                write!(f, "AsyncSettled({instance:?}, ok: {})", outcome.is_ok())
            }
        }
    }
}

// =============================================================================
// Mounted tree
// =============================================================================

/// Component and boundary a node was mounted under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PatchCtx {
    pub(crate) parent: Option<InstanceId>,
    pub(crate) boundary: Option<BoundaryId>,
}

/// What is mounted below a node.
#[derive(Debug, Clone, Default)]
pub(crate) enum MountedChildren {
    #[default]
    None,
    Text(Rc<str>),
    Nodes(Vec<NodeId>),
}

impl MountedChildren {
    fn ids(&self) -> &[NodeId] {
        match self {
            Self::Nodes(ids) => ids,
            _ => &[],
        }
    }
}

/// A scene node that is live in the host.
pub(crate) struct MountedNode<H: HostAdapter> {
    /// The scene node last patched into this slot.
    pub(crate) vnode: SceneNode,
    /// Primary host node (element, text, comment, start anchor, first
    /// static node).
    pub(crate) el: Option<H::Handle>,
    /// End anchor (fragments, teleports, suspense, last static node).
    pub(crate) anchor: Option<H::Handle>,
    pub(crate) children: MountedChildren,
    pub(crate) component: Option<InstanceId>,
    pub(crate) boundary: Option<BoundaryId>,
    pub(crate) target: Option<H::Handle>,
    pub(crate) target_anchor: Option<H::Handle>,
    pub(crate) cx: PatchCtx,
}

impl<H: HostAdapter> MountedNode<H> {
    fn new(vnode: SceneNode, cx: PatchCtx) -> Self {
        Self {
            vnode,
            el: None,
            anchor: None,
            children: MountedChildren::None,
            component: None,
            boundary: None,
            target: None,
            target_anchor: None,
            cx,
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Counters of host work, for tests and benchmarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Nodes mounted.
    pub mounts: u64,
    /// Nodes patched in place.
    pub patches: u64,
    /// Nodes unmounted.
    pub unmounts: u64,
    /// Keyed children moved.
    pub moves: u64,
    /// Text writes (text nodes and element text).
    pub text_writes: u64,
    /// `patch_prop` calls.
    pub prop_writes: u64,
    /// Component render function runs.
    pub component_renders: u64,
}

// =============================================================================
// Renderer
// =============================================================================

/// Retained-mode renderer over a host adapter.
pub struct Renderer<H: HostAdapter> {
    host: H,
    nodes: Arena<NodeMarker, MountedNode<H>>,
    instances: Arena<InstanceMarker, ComponentInstance>,
    boundaries: Arena<BoundaryMarker, Boundary<H>>,
    roots: Vec<(H::Handle, NodeId)>,
    scheduler: Scheduler<RenderTask>,
    config: RendererConfig,
    diagnostics: Rc<Diagnostics>,
    next_uid: JobId,
    watch_ids: Rc<Cell<JobId>>,
    job_owners: AHashMap<JobId, InstanceId>,
    stats: RenderStats,
}

impl<H: HostAdapter> Renderer<H> {
    /// Create a renderer with default configuration.
    pub fn new(host: H) -> Self {
        Self::with_config(host, RendererConfig::default())
    }

    /// Create a renderer with `config` (sanitized).
    pub fn with_config(host: H, config: RendererConfig) -> Self {
        let config = config.sanitized();
        let renderer = Self {
            host,
            nodes: Arena::new(),
            instances: Arena::new(),
            boundaries: Arena::new(),
            roots: Vec::new(),
            scheduler: Scheduler::with_recursion_limit(config.recursion_limit),
            config,
            diagnostics: Rc::new(Diagnostics::default()),
            next_uid: 0,
            watch_ids: Rc::new(Cell::new(1)),
            job_owners: AHashMap::new(),
            stats: RenderStats::default(),
        };
        renderer.sync_config();
        renderer
    }

    /// Patch `tree` into `container`, or unmount what is there when `tree`
    /// is `None`. Pre-flush and post-flush work runs before returning;
    /// component updates queued along the way wait for [`flush`](Self::flush).
    pub fn render(&mut self, tree: Option<SceneNode>, container: &H::Handle) {
        self.sync_config();
        let _span = tracing::debug_span!("render", mount = tree.is_some()).entered();
        let existing = self.roots.iter().position(|(c, _)| c == container);
        match (tree, existing) {
            (None, None) => {}
            (None, Some(pos)) => {
                let (_, root) = self.roots.remove(pos);
                self.unmount(root, true);
            }
            (Some(tree), pos) => {
                let prev = pos.map(|p| self.roots[p].1);
                let id = self.patch(prev, &tree, container, None, PatchCtx::default());
                match pos {
                    Some(p) => self.roots[p].1 = id,
                    None => self.roots.push((container.clone(), id)),
                }
            }
        }
        self.flush_side_lanes();
    }

    /// Run every queued job until the scheduler is idle.
    pub fn flush(&mut self) -> FlushReport {
        self.sync_config();
        self.drain_reported_errors();
        let scheduler = self.scheduler.clone();
        let report = scheduler.flush(|task| {
            self.run_task(task);
            self.drain_reported_errors();
        });
        for error in &report.errors {
            let SchedulerError::RecursionLimitExceeded { job, .. } = error;
            let owner = self.job_owners.get(job).copied();
            self.handle_error(owner, ComponentError::Scheduler(error.clone()), ErrorOrigin::Scheduler);
        }
        self.drain_reported_errors();
        tracing::trace!(
            jobs = report.jobs_run,
            pre = report.pre_run,
            post = report.post_run,
            "flush complete"
        );
        report
    }

    /// Whether any scheduler lane holds work.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.scheduler.has_pending() || self.diagnostics.has_reported()
    }

    /// The host adapter.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host adapter, mutably (for event dispatch in tests).
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Work counters since creation or the last reset.
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Zero the work counters.
    pub fn reset_stats(&mut self) {
        self.stats = RenderStats::default();
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Mutable configuration. Changes apply at the next `render` or `flush`.
    pub fn config_mut(&mut self) -> &mut RendererConfig {
        &mut self.config
    }

    /// Number of live component instances.
    #[must_use]
    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }

    /// Number of live mounted nodes.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn sync_config(&self) {
        let config = self.config.sanitized();
        self.scheduler.set_recursion_limit(config.recursion_limit);
        self.diagnostics.set_warn_handler(config.warn_handler);
    }

    fn flush_side_lanes(&mut self) {
        let scheduler = self.scheduler.clone();
        scheduler.flush_pre(|task| self.run_task(task));
        self.drain_reported_errors();
        scheduler.flush_post(|task| self.run_task(task));
        self.drain_reported_errors();
    }

    fn run_task(&mut self, task: RenderTask) {
        match task {
            RenderTask::Update(id) => self.update_component_job(id),
            RenderTask::Watch { owner, watcher } => {
                if let Err(error) = watcher.run() {
                    self.handle_error(Some(owner), error, ErrorOrigin::Watcher);
                }
            }
            RenderTask::Hook { owner, kind, hook } => {
                if let Err(error) = fvdom_runtime::untracked(|| hook()) {
                    self.handle_error(owner, error, ErrorOrigin::Hook(kind));
                }
            }
            RenderTask::VnodeHook { owner, handler } => {
                if let Err(error) = handler.call(&[]) {
                    self.handle_error(owner, error, ErrorOrigin::VnodeHook);
                }
            }
            RenderTask::AsyncSettled { instance, outcome } => {
                self.resolve_async_setup(instance, outcome);
            }
        }
    }

    fn drain_reported_errors(&mut self) {
        loop {
            let reported = self.diagnostics.take_reported();
            if reported.is_empty() {
                break;
            }
            for r in reported {
                self.handle_error(r.owner, r.error, r.origin);
            }
        }
    }

    /// Route `error` through error-captured hooks from `owner` upward, then
    /// to the global handler.
    pub(crate) fn handle_error(
        &mut self,
        owner: Option<InstanceId>,
        error: ComponentError,
        origin: ErrorOrigin,
    ) {
        let name: Option<Rc<str>> = owner
            .and_then(|id| self.instances.get(id))
            .map(|inst| inst.def.name().into());
        let mut cursor = owner;
        while let Some(id) = cursor {
            let Some(inst) = self.instances.get(id) else {
                break;
            };
            let hooks = inst.hooks.error_captured().to_vec();
            cursor = inst.parent;
            for hook in hooks {
                if hook(&error, origin) {
                    tracing::debug!(%error, %origin, "error captured");
                    return;
                }
            }
        }
        match self.config.error_handler.clone() {
            Some(handler) => handler(&error, origin, name.as_deref()),
            None => tracing::error!(
                %error,
                %origin,
                component = name.as_deref().unwrap_or("<root>"),
                "unhandled error"
            ),
        }
    }

    /// Run `task` in the post lane, or hold it in the nearest pending
    /// boundary.
    fn queue_effect(&mut self, boundary: Option<BoundaryId>, task: RenderTask) {
        if let Some(id) = boundary
            && let Some(b) = self.boundaries.get_mut(id)
            && b.is_pending
        {
            b.effects.push(task);
            return;
        }
        self.scheduler.queue_post(task);
    }

    /// Call a handler prop of `vnode` now.
    fn invoke_prop_hook(&mut self, vnode: &SceneNode, name: &str, owner: Option<InstanceId>) {
        let handler = vnode.props_ref().get(name).and_then(|v| v.as_handler()).cloned();
        if let Some(handler) = handler
            && let Err(error) = handler.call(&[])
        {
            self.handle_error(owner, error, ErrorOrigin::VnodeHook);
        }
    }

    /// Defer a handler prop of `vnode` to the post lane.
    fn queue_prop_hook(&mut self, vnode: &SceneNode, name: &str, cx: PatchCtx) {
        let handler = vnode.props_ref().get(name).and_then(|v| v.as_handler()).cloned();
        if let Some(handler) = handler {
            self.queue_effect(
                cx.boundary,
                RenderTask::VnodeHook {
                    owner: cx.parent,
                    handler,
                },
            );
        }
    }

    // =========================================================================
    // Host positions
    // =========================================================================

    /// First host node of a mounted node.
    fn host_el(&self, id: NodeId) -> Option<H::Handle> {
        let node = self.nodes.get(id)?;
        if let Some(inst) = node.component {
            let subtree = self.instances.get(inst)?.subtree?;
            return self.host_el(subtree);
        }
        if let Some(bid) = node.boundary {
            let active = self.boundaries.get(bid).and_then(|b| b.active_branch);
            return active.and_then(|a| self.host_el(a)).or_else(|| node.anchor.clone());
        }
        node.el.clone()
    }

    /// Host node right after a mounted node (its insertion anchor).
    fn next_host_node(&self, id: NodeId) -> Option<H::Handle> {
        let node = self.nodes.get(id)?;
        if let Some(inst) = node.component {
            let subtree = self.instances.get(inst)?.subtree?;
            return self.next_host_node(subtree);
        }
        let last = node.anchor.as_ref().or(node.el.as_ref())?;
        self.host.next_sibling_of(last)
    }

    /// Move a mounted node's host nodes before `anchor` in `container`.
    fn move_node(&mut self, id: NodeId, container: &H::Handle, anchor: Option<&H::Handle>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if let Some(inst) = node.component {
            if let Some(subtree) = self.instances.get(inst).and_then(|i| i.subtree) {
                self.move_node(subtree, container, anchor);
            }
            return;
        }
        if node.boundary.is_some() {
            self.move_suspense(id, container, anchor);
            return;
        }
        match node.vnode.kind() {
            crate::scene::NodeKind::Teleport => self.move_teleport(id, container, anchor),
            crate::scene::NodeKind::Fragment => {
                let (start, end) = (node.el.clone(), node.anchor.clone());
                let children = node.children.ids().to_vec();
                if let Some(start) = &start {
                    self.host.insert(start, container, anchor);
                }
                for child in children {
                    self.move_node(child, container, anchor);
                }
                if let Some(end) = &end {
                    self.host.insert(end, container, anchor);
                }
            }
            crate::scene::NodeKind::StaticBlob => {
                let range = self.static_range(node.el.clone(), node.anchor.clone());
                for n in &range {
                    self.host.insert(n, container, anchor);
                }
            }
            _ => {
                if let Some(el) = node.el.clone() {
                    self.host.insert(&el, container, anchor);
                }
            }
        }
    }

    /// Host nodes from `first` through `last` (inclusive).
    fn static_range(&self, first: Option<H::Handle>, last: Option<H::Handle>) -> Vec<H::Handle> {
        let mut out = Vec::new();
        let mut cursor = first;
        while let Some(current) = cursor {
            let done = Some(&current) == last.as_ref();
            cursor = if done {
                None
            } else {
                self.host.next_sibling_of(&current)
            };
            out.push(current);
        }
        out
    }
}

impl<H: HostAdapter> fmt::Debug for Renderer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("roots", &self.roots.len())
            .field("nodes", &self.nodes.len())
            .field("instances", &self.instances.len())
            .field("boundaries", &self.boundaries.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
