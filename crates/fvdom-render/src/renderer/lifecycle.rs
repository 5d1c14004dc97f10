#![forbid(unsafe_code)]

//! Component instances: setup, render effect, updates, teardown.
//!
//! # Update paths
//!
//! - **Self-triggered**: an observable read by the last render changes, the
//!   render computation queues the instance's `Update` job, and the flush
//!   re-renders it.
//! - **Parent-driven**: the parent re-rendered with changed props or slots.
//!   The new vnode is staged as `pending_next`, any queued self-update is
//!   dropped, and the update runs inline within the parent's patch.
//!
//! Either way the instance re-renders at most once per cause.

use std::rc::Rc;

use fvdom_runtime::{Computation, JobHandle, Observable, untracked};

use crate::arena::{BoundaryId, InstanceId, NodeId};
use crate::component::{
    AsyncSetup, ComponentDef, HookKind, LifecycleHooks, LifecycleState, RenderContext, RenderFn,
    SetupContext, SetupOutcome, Watcher,
};
use crate::emit::Emitter;
use crate::error::{ComponentError, ErrorOrigin, Warning};
use crate::host::HostAdapter;
use crate::scene::{Children, Props, SceneNode, Slots};

use super::{MountedNode, PatchCtx, RenderTask, Renderer};

/// A live component instance.
pub(crate) struct ComponentInstance {
    pub(crate) def: ComponentDef,
    pub(crate) vnode: SceneNode,
    pub(crate) node: NodeId,
    pub(crate) parent: Option<InstanceId>,
    pub(crate) boundary: Option<BoundaryId>,
    pub(crate) state: LifecycleState,
    pub(crate) props: Observable<Props>,
    pub(crate) slots: Slots,
    pub(crate) render: Option<RenderFn>,
    pub(crate) hooks: LifecycleHooks,
    pub(crate) watchers: Vec<Rc<Watcher>>,
    pub(crate) job: JobHandle,
    pub(crate) computation: Option<Computation>,
    pub(crate) subtree: Option<NodeId>,
    pub(crate) pending_next: Option<SceneNode>,
    pub(crate) emitter: Emitter,
    /// Setup returned a deferred that has not been applied yet.
    pub(crate) async_pending: bool,
    /// Pending id of the boundary that counted this instance as a
    /// dependency, if one did.
    pub(crate) suspense_id: Option<u64>,
}

fn slots_of(vnode: &SceneNode) -> Slots {
    match vnode.children_ref() {
        Children::Slots(slots) => slots.clone(),
        _ => Slots::new(),
    }
}

impl<H: HostAdapter> Renderer<H> {
    // =========================================================================
    // Mount
    // =========================================================================

    pub(super) fn mount_component(
        &mut self,
        vnode: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> NodeId {
        let Some(def) = vnode.component_def().cloned() else {
            let placeholder = SceneNode::comment("");
            return self.patch(None, &placeholder, container, anchor, cx);
        };
        let node_id = self.nodes.insert(MountedNode::new(vnode.clone(), cx));

        self.next_uid += 1;
        let job = JobHandle::new(self.next_uid);
        let props = Observable::new(vnode.props_ref().clone());
        let slots = slots_of(vnode);
        let diagnostics = Rc::clone(&self.diagnostics);
        let inst_id = self.instances.insert_with(|id| ComponentInstance {
            def: def.clone(),
            vnode: vnode.clone(),
            node: node_id,
            parent: cx.parent,
            boundary: cx.boundary,
            state: LifecycleState::Created,
            props: props.clone(),
            slots: slots.clone(),
            render: None,
            hooks: LifecycleHooks::default(),
            watchers: Vec::new(),
            job: job.clone(),
            computation: None,
            subtree: None,
            pending_next: None,
            emitter: Emitter::new(id, def.clone(), vnode.props_ref().clone(), diagnostics),
            async_pending: false,
            suspense_id: None,
        });
        self.job_owners.insert(job.id(), inst_id);
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.component = Some(inst_id);
        }

        let Some(emitter) = self.instances.get(inst_id).map(|i| i.emitter.clone()) else {
            return node_id;
        };
        let mut setup_cx = SetupContext {
            instance: inst_id,
            name: def.name().into(),
            props,
            slots,
            hooks: LifecycleHooks::default(),
            watchers: Vec::new(),
            emitter,
            scheduler: self.scheduler.clone(),
            watch_ids: Rc::clone(&self.watch_ids),
            in_boundary: cx.boundary.is_some(),
            diagnostics: Rc::clone(&self.diagnostics),
        };
        let span = tracing::debug_span!("component_setup", component = def.name()).entered();
        let outcome = untracked(|| def.run_setup(&mut setup_cx));
        drop(span);
        if let Some(inst) = self.instances.get_mut(inst_id) {
            inst.hooks = setup_cx.hooks;
            inst.watchers = setup_cx.watchers;
        }

        match outcome {
            Ok(SetupOutcome::Render(render)) => {
                if let Some(inst) = self.instances.get_mut(inst_id) {
                    inst.render = Some(render);
                }
                self.setup_render_effect(inst_id, container, anchor);
            }
            Ok(SetupOutcome::Async(deferred)) => {
                self.register_async_setup(inst_id, deferred, container, anchor);
            }
            Err(error) => {
                self.handle_error(Some(inst_id), error, ErrorOrigin::Setup);
                self.setup_render_effect(inst_id, container, anchor);
            }
        }
        self.stats.mounts += 1;
        node_id
    }

    /// Create the render computation, run before-mount hooks, render, and
    /// patch the first subtree.
    fn setup_render_effect(&mut self, id: InstanceId, container: &H::Handle, anchor: Option<H::Handle>) {
        let Some(inst) = self.instances.get_mut(id) else {
            return;
        };
        let job = inst.job.clone();
        let vnode = inst.vnode.clone();
        let sub_cx = PatchCtx {
            parent: Some(id),
            boundary: inst.boundary,
        };
        let parent = inst.parent;
        let scheduler = self.scheduler.clone();
        let trigger_job = job.clone();
        inst.computation = Some(Computation::new(move || {
            scheduler.queue_job(&trigger_job, RenderTask::Update(id));
        }));

        job.set_allow_recurse(false);
        self.run_hooks_inline(id, HookKind::BeforeMount);
        self.invoke_prop_hook(&vnode, "onVnodeBeforeMount", parent);
        job.set_allow_recurse(true);
        if !self.set_state(id, LifecycleState::Mounting) {
            return;
        }

        let tree = self.render_component_root(id);
        let subtree = self.patch(None, &tree, container, anchor, sub_cx);
        if let Some(inst) = self.instances.get_mut(id) {
            inst.subtree = Some(subtree);
            inst.state = LifecycleState::Mounted;
        }
        self.queue_hooks(id, HookKind::Mounted);
        self.queue_prop_hook(&vnode, "onVnodeMounted", PatchCtx { parent, boundary: sub_cx.boundary });
    }

    /// Run the render function inside the instance's computation. A render
    /// error is routed and replaced by an empty comment.
    fn render_component_root(&mut self, id: InstanceId) -> SceneNode {
        let Some(inst) = self.instances.get(id) else {
            return SceneNode::comment("");
        };
        let Some(render) = inst.render.clone() else {
            return SceneNode::comment("");
        };
        let computation = inst.computation.clone();
        let ctx = RenderContext {
            def: inst.def.clone(),
            props: inst.props.clone(),
            slots: inst.slots.clone(),
            emitter: inst.emitter.clone(),
            diagnostics: Rc::clone(&self.diagnostics),
        };
        let _span = tracing::trace_span!("component_render", component = inst.def.name()).entered();
        self.stats.component_renders += 1;
        let result = match computation {
            Some(computation) => computation.run(|| render(&ctx)),
            None => untracked(|| render(&ctx)),
        };
        match result {
            Ok(tree) => tree,
            Err(error) => {
                self.handle_error(Some(id), error, ErrorOrigin::Render);
                SceneNode::comment("")
            }
        }
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Scheduler entry point for `Update` tasks.
    pub(super) fn update_component_job(&mut self, id: InstanceId) {
        self.run_component_update(id);
    }

    /// Parent-driven patch of component node `node_id` to `next`.
    pub(super) fn update_component(&mut self, node_id: NodeId, next: &SceneNode) -> NodeId {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return node_id;
        };
        let old = std::mem::replace(&mut node.vnode, next.clone());
        let Some(id) = node.component else {
            return node_id;
        };
        self.stats.patches += 1;

        if !self.should_update_component(id, &old, next) {
            if let Some(inst) = self.instances.get_mut(id) {
                inst.vnode = next.clone();
                inst.emitter.set_props(next.props_ref().clone());
            }
            return node_id;
        }

        let Some(inst) = self.instances.get_mut(id) else {
            return node_id;
        };
        if inst.async_pending {
            // Only props and slots change until the setup settles.
            self.apply_next_vnode(id, next);
            return node_id;
        }
        inst.pending_next = Some(next.clone());
        let job = inst.job.clone();
        self.scheduler.invalidate(&job);
        self.run_component_update(id);
        node_id
    }

    fn should_update_component(&self, id: InstanceId, prev: &SceneNode, next: &SceneNode) -> bool {
        let Some(inst) = self.instances.get(id) else {
            return false;
        };
        match (prev.children_ref(), next.children_ref()) {
            (Children::Slots(a), Children::Slots(b)) => {
                if !a.ptr_eq(b) {
                    return true;
                }
            }
            (Children::Slots(_), _) | (_, Children::Slots(_)) => return true,
            _ => {}
        }
        let (prev_props, next_props) = (prev.props_ref(), next.props_ref());
        if prev_props.len() != next_props.len() {
            return true;
        }
        next_props
            .iter()
            .any(|(key, value)| prev_props.get(key) != Some(value) && !inst.emitter.is_declared_listener(key))
    }

    /// Install `next` as the instance's vnode: props, slots, listeners.
    fn apply_next_vnode(&mut self, id: InstanceId, next: &SceneNode) {
        let Some(inst) = self.instances.get_mut(id) else {
            return;
        };
        inst.vnode = next.clone();
        inst.slots = slots_of(next);
        inst.emitter.set_props(next.props_ref().clone());
        let props = inst.props.clone();
        props.set(next.props_ref().clone());
    }

    /// Re-render a mounted instance and patch its subtree in place.
    fn run_component_update(&mut self, id: InstanceId) {
        let Some(inst) = self.instances.get_mut(id) else {
            return;
        };
        if inst.state != LifecycleState::Mounted || inst.async_pending {
            return;
        }
        let next = inst.pending_next.take();
        let job = inst.job.clone();
        let parent = inst.parent;
        let _span = tracing::debug_span!("component_update", component = inst.def.name(), parent_driven = next.is_some()).entered();

        job.set_allow_recurse(false);
        if let Some(next) = &next {
            self.apply_next_vnode(id, next);
            let scheduler = self.scheduler.clone();
            scheduler.flush_pre(|task| self.run_task(task));
            self.scheduler.invalidate(&job);
        }
        let vnode = match self.instances.get(id) {
            Some(inst) => inst.vnode.clone(),
            None => return,
        };
        self.run_hooks_inline(id, HookKind::BeforeUpdate);
        if next.is_some() {
            self.invoke_prop_hook(&vnode, "onVnodeBeforeUpdate", parent);
        }
        job.set_allow_recurse(true);
        if !self.set_state(id, LifecycleState::Updating) {
            return;
        }

        let tree = self.render_component_root(id);
        let Some(inst) = self.instances.get(id) else {
            return;
        };
        let prev_subtree = inst.subtree;
        let sub_cx = PatchCtx {
            parent: Some(id),
            boundary: inst.boundary,
        };
        let container = prev_subtree
            .and_then(|sub| self.host_el(sub))
            .and_then(|el| self.host.parent_of(&el));
        let Some(container) = container else {
            self.set_state(id, LifecycleState::Mounted);
            return;
        };
        let anchor = prev_subtree.and_then(|sub| self.next_host_node(sub));
        let subtree = self.patch(prev_subtree, &tree, &container, anchor, sub_cx);
        if let Some(inst) = self.instances.get_mut(id) {
            inst.subtree = Some(subtree);
            inst.state = LifecycleState::Mounted;
        }
        self.queue_hooks(id, HookKind::Updated);
        if next.is_some() {
            self.queue_prop_hook(&vnode, "onVnodeUpdated", PatchCtx { parent, boundary: sub_cx.boundary });
        }
    }

    // =========================================================================
    // Unmount
    // =========================================================================

    pub(super) fn unmount_component(&mut self, id: InstanceId, do_remove: bool) {
        let Some(inst) = self.instances.get(id) else {
            return;
        };
        if matches!(inst.state, LifecycleState::Unmounting | LifecycleState::Unmounted) {
            return;
        }
        let _span = tracing::debug_span!("component_unmount", component = inst.def.name()).entered();
        self.set_state(id, LifecycleState::Unmounting);
        self.run_hooks_inline(id, HookKind::BeforeUnmount);

        let Some(inst) = self.instances.get_mut(id) else {
            return;
        };
        for watcher in inst.watchers.drain(..) {
            watcher.stop();
        }
        if let Some(computation) = &inst.computation {
            computation.stop();
        }
        inst.job.deactivate();
        inst.emitter.mark_unmounted();
        let subtree = inst.subtree.take();
        let (boundary, counted) = (inst.boundary, inst.async_pending.then_some(inst.suspense_id).flatten());
        let uid = inst.job.id();

        if let Some(subtree) = subtree {
            self.unmount(subtree, do_remove);
        }
        self.queue_hooks(id, HookKind::Unmounted);
        self.set_state(id, LifecycleState::Unmounted);

        if let (Some(bid), Some(suspense_id)) = (boundary, counted) {
            self.release_dependency(bid, suspense_id);
        }
        self.job_owners.remove(&uid);
        self.instances.remove(id);
    }

    // =========================================================================
    // Async setup
    // =========================================================================

    fn register_async_setup(
        &mut self,
        id: InstanceId,
        deferred: AsyncSetup,
        container: &H::Handle,
        anchor: Option<H::Handle>,
    ) {
        let Some(inst) = self.instances.get_mut(id) else {
            return;
        };
        inst.async_pending = true;
        let boundary = inst.boundary;
        let job = inst.job.clone();
        let name: Rc<str> = inst.def.name().into();

        match boundary.and_then(|b| self.boundaries.get_mut(b)) {
            Some(b) if b.is_pending => {
                b.deps += 1;
                let pending_id = b.pending_id;
                if let Some(inst) = self.instances.get_mut(id) {
                    inst.suspense_id = Some(pending_id);
                }
            }
            Some(_) => {}
            None => self
                .diagnostics
                .warn(Warning::AsyncSetupWithoutBoundary { component: name }),
        }

        let placeholder = SceneNode::comment("");
        let sub_cx = PatchCtx {
            parent: Some(id),
            boundary,
        };
        let subtree = self.patch(None, &placeholder, container, anchor, sub_cx);
        if let Some(inst) = self.instances.get_mut(id) {
            inst.subtree = Some(subtree);
        }

        let scheduler = self.scheduler.clone();
        deferred.on_settle(move |outcome| {
            scheduler.queue_job(
                &job,
                RenderTask::AsyncSettled {
                    instance: id,
                    outcome: outcome.clone(),
                },
            );
        });
    }

    /// Apply a settled async setup: mount the real subtree where the
    /// placeholder is, then release the boundary dependency.
    pub(super) fn resolve_async_setup(
        &mut self,
        id: InstanceId,
        outcome: Result<RenderFn, ComponentError>,
    ) {
        let Some(inst) = self.instances.get_mut(id) else {
            return;
        };
        if !inst.async_pending || inst.state != LifecycleState::Created {
            return;
        }
        let (boundary, counted) = (inst.boundary, inst.suspense_id);
        if let (Some(bid), Some(suspense_id)) = (boundary, counted) {
            match self.boundaries.get(bid) {
                Some(b) if b.pending_id == suspense_id => {}
                _ => return,
            }
        }
        let Some(inst) = self.instances.get_mut(id) else {
            return;
        };
        inst.async_pending = false;
        let placeholder = inst.subtree.take();
        match outcome {
            Ok(render) => inst.render = Some(render),
            Err(error) => self.handle_error(Some(id), error, ErrorOrigin::AsyncSetup),
        }

        let placeholder_el = placeholder.and_then(|p| self.host_el(p));
        let container = placeholder_el.as_ref().and_then(|el| self.host.parent_of(el));
        if let Some(container) = container {
            let anchor = placeholder_el.as_ref().and_then(|el| self.host.next_sibling_of(el));
            self.setup_render_effect(id, &container, anchor);
        }
        if let Some(placeholder) = placeholder {
            self.unmount(placeholder, true);
        }
        if let (Some(bid), Some(suspense_id)) = (boundary, counted) {
            self.release_dependency(bid, suspense_id);
        }
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    fn run_hooks_inline(&mut self, id: InstanceId, kind: HookKind) {
        let hooks = match self.instances.get(id) {
            Some(inst) => inst.hooks.get(kind).to_vec(),
            None => return,
        };
        for hook in hooks {
            if let Err(error) = untracked(|| hook()) {
                self.handle_error(Some(id), error, ErrorOrigin::Hook(kind));
            }
        }
    }

    /// Defer the instance's hooks of `kind`. Unmounted hooks route errors
    /// to the parent, since the instance is gone when they run.
    fn queue_hooks(&mut self, id: InstanceId, kind: HookKind) {
        let Some(inst) = self.instances.get(id) else {
            return;
        };
        let hooks = inst.hooks.get(kind).to_vec();
        let owner = if kind == HookKind::Unmounted {
            inst.parent
        } else {
            Some(id)
        };
        let boundary = inst.boundary;
        for hook in hooks {
            self.queue_effect(boundary, RenderTask::Hook { owner, kind, hook });
        }
    }

    fn set_state(&mut self, id: InstanceId, state: LifecycleState) -> bool {
        match self.instances.get_mut(id) {
            Some(inst) => {
                inst.state = state;
                true
            }
            None => false,
        }
    }

    /// Lifecycle state of the root component rendered into `container`,
    /// if the root is a component.
    #[must_use]
    pub fn root_component_state(&self, container: &H::Handle) -> Option<LifecycleState> {
        let (_, node) = self.roots.iter().find(|(c, _)| c == container)?;
        let inst = self.nodes.get(*node)?.component?;
        self.instances.get(inst).map(|i| i.state)
    }
}
