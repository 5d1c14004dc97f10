#![forbid(unsafe_code)]

//! Async boundaries.
//!
//! A boundary mounts its default branch into a detached hidden container.
//! Components in that branch whose setup is asynchronous register as
//! dependencies. While any are outstanding the fallback branch is shown in
//! the real container; when the count reaches zero the boundary resolves:
//! the fallback is unmounted, the pending branch is moved in front of the
//! boundary's end anchor, and the post-flush effects it collected are
//! released (to an enclosing pending boundary if there is one).
//!
//! # Props
//!
//! | Prop | Effect |
//! |------|--------|
//! | `timeout` | `0` shows the fallback immediately when a new pending branch replaces a resolved one; otherwise the old content stays until resolution |
//! | `onPending` | Called when a new pending branch starts |
//! | `onFallback` | Called when the fallback is shown |
//! | `onResolve` | Called after resolution |
//!
//! # Invariants
//!
//! 1. Effects from a pending branch never run before the branch is visible.
//! 2. A dependency settling for a superseded pending branch is ignored
//!    (matched by pending id).
//! 3. Unmounting a boundary abandons its pending dependencies silently.

use crate::arena::{BoundaryId, NodeId};
use crate::host::HostAdapter;
use crate::scene::{Props, SceneNode, is_same_type};

use super::{MountedNode, PatchCtx, RenderTask, Renderer};

/// A mounted async boundary.
pub(crate) struct Boundary<H: HostAdapter> {
    pub(crate) node: NodeId,
    /// Context of the boundary itself (enclosing component and boundary).
    pub(crate) cx: PatchCtx,
    pub(crate) container: H::Handle,
    pub(crate) hidden: H::Handle,
    pub(crate) active_branch: Option<NodeId>,
    pub(crate) pending_branch: Option<NodeId>,
    pub(crate) is_pending: bool,
    pub(crate) deps: usize,
    pub(crate) pending_id: u64,
    pub(crate) timeout: Option<i64>,
    pub(crate) in_fallback: bool,
    pub(crate) effects: Vec<RenderTask>,
}

fn branches(vnode: &SceneNode) -> (SceneNode, SceneNode) {
    match vnode.children_ref().as_nodes() {
        Some([default, fallback, ..]) => (default.clone(), fallback.clone()),
        Some([default]) => (default.clone(), SceneNode::comment("")),
        _ => (SceneNode::comment(""), SceneNode::comment("")),
    }
}

impl<H: HostAdapter> Renderer<H> {
    pub(super) fn mount_suspense(
        &mut self,
        vnode: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> NodeId {
        let _span = tracing::debug_span!("suspense_mount").entered();
        let (default, fallback) = branches(vnode);
        let end = self.host.create_text("");
        self.host.insert(&end, container, anchor.as_ref());
        let mut node = MountedNode::new(vnode.clone(), cx);
        node.anchor = Some(end);
        let node_id = self.nodes.insert(node);

        let hidden = self.host.create_element("div", &Props::new());
        let bid = self.boundaries.insert(Boundary {
            node: node_id,
            cx,
            container: container.clone(),
            hidden: hidden.clone(),
            active_branch: None,
            pending_branch: None,
            is_pending: true,
            deps: 0,
            pending_id: 0,
            timeout: vnode.props_ref().get("timeout").and_then(|v| v.as_int()),
            in_fallback: false,
            effects: Vec::new(),
        });
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.boundary = Some(bid);
        }

        let pending = self.patch(None, &default, &hidden, None, self.branch_cx(bid));
        let deps = match self.boundaries.get_mut(bid) {
            Some(b) => {
                b.pending_branch = Some(pending);
                b.deps
            }
            None => 0,
        };
        if deps > 0 {
            self.invoke_prop_hook(vnode, "onPending", cx.parent);
            self.show_fallback(bid, &fallback);
        } else {
            self.resolve_suspense(bid);
        }
        self.stats.mounts += 1;
        node_id
    }

    pub(super) fn patch_suspense(&mut self, node_id: NodeId, next: &SceneNode) -> NodeId {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return node_id;
        };
        node.vnode = next.clone();
        let (Some(bid), end) = (node.boundary, node.anchor.clone()) else {
            return node_id;
        };
        let (default, fallback) = branches(next);
        let Some(b) = self.boundaries.get_mut(bid) else {
            return node_id;
        };
        b.timeout = next.props_ref().get("timeout").and_then(|v| v.as_int());
        let (container, active, pending, in_fallback) =
            (b.container.clone(), b.active_branch, b.pending_branch, b.in_fallback);
        let branch_cx = self.branch_cx(bid);
        let fallback_cx = self.fallback_cx(bid);
        self.stats.patches += 1;

        if let Some(pending) = pending {
            if self.same_branch(pending, &default) {
                let Some(hidden) = self.boundary_hidden(bid) else {
                    return node_id;
                };
                let patched = self.patch(Some(pending), &default, &hidden, None, branch_cx);
                self.set_pending_branch(bid, Some(patched));
                if self.boundary_deps(bid) == 0 {
                    self.resolve_suspense(bid);
                } else if in_fallback && let Some(active) = active {
                    let patched = self.patch(Some(active), &fallback, &container, end, fallback_cx);
                    self.set_active_branch(bid, Some(patched));
                }
                return node_id;
            }

            // The pending branch is replaced; dependencies of the old one
            // no longer count.
            let hidden = self.host.create_element("div", &Props::new());
            if let Some(b) = self.boundaries.get_mut(bid) {
                b.pending_id += 1;
                b.deps = 0;
                b.effects.clear();
                b.pending_branch = None;
                b.hidden = hidden.clone();
            }
            self.unmount(pending, true);

            if in_fallback {
                let p = self.patch(None, &default, &hidden, None, branch_cx);
                self.set_pending_branch(bid, Some(p));
                if self.boundary_deps(bid) == 0 {
                    self.resolve_suspense(bid);
                } else if let Some(active) = active {
                    let patched = self.patch(Some(active), &fallback, &container, end, fallback_cx);
                    self.set_active_branch(bid, Some(patched));
                }
            } else if let Some(active) = active
                && self.same_branch(active, &default)
            {
                let patched = self.patch(Some(active), &default, &container, end, branch_cx);
                self.set_active_branch(bid, Some(patched));
                self.finish_resolve(bid);
            } else {
                let p = self.patch(None, &default, &hidden, None, branch_cx);
                self.set_pending_branch(bid, Some(p));
                self.settle_new_pending(bid, &fallback);
            }
            return node_id;
        }

        if let Some(active) = active
            && self.same_branch(active, &default)
        {
            let patched = self.patch(Some(active), &default, &container, end, branch_cx);
            self.set_active_branch(bid, Some(patched));
            return node_id;
        }

        self.invoke_prop_hook(next, "onPending", self.boundary_parent(bid));
        let hidden = self.host.create_element("div", &Props::new());
        if let Some(b) = self.boundaries.get_mut(bid) {
            b.pending_id += 1;
            b.is_pending = true;
            b.deps = 0;
            b.hidden = hidden.clone();
        }
        let p = self.patch(None, &default, &hidden, None, branch_cx);
        self.set_pending_branch(bid, Some(p));
        self.settle_new_pending(bid, &fallback);
        node_id
    }

    /// After mounting a fresh pending branch over resolved content: resolve
    /// now, show the fallback for `timeout == 0`, or keep the old content.
    fn settle_new_pending(&mut self, bid: BoundaryId, fallback: &SceneNode) {
        let Some(b) = self.boundaries.get(bid) else {
            return;
        };
        if b.deps == 0 {
            self.resolve_suspense(bid);
        } else if b.timeout == Some(0) {
            self.show_fallback(bid, fallback);
        }
    }

    /// Unmount the active branch and mount `fallback` in its place.
    fn show_fallback(&mut self, bid: BoundaryId, fallback: &SceneNode) {
        let Some(b) = self.boundaries.get_mut(bid) else {
            return;
        };
        let active = b.active_branch.take();
        b.in_fallback = true;
        let container = b.container.clone();
        let node = b.node;
        let Some(vnode) = self.nodes.get(node).map(|n| n.vnode.clone()) else {
            return;
        };
        let end = self.nodes.get(node).and_then(|n| n.anchor.clone());
        self.invoke_prop_hook(&vnode, "onFallback", self.boundary_parent(bid));
        if let Some(active) = active {
            self.unmount(active, true);
        }
        let fallback_cx = self.fallback_cx(bid);
        let mounted = self.patch(None, fallback, &container, end, fallback_cx);
        self.set_active_branch(bid, Some(mounted));
    }

    /// Swap the pending branch in: unmount the active one, move the pending
    /// branch before the end anchor, release effects.
    pub(super) fn resolve_suspense(&mut self, bid: BoundaryId) {
        let Some(b) = self.boundaries.get_mut(bid) else {
            return;
        };
        let Some(pending) = b.pending_branch.take() else {
            return;
        };
        let active = b.active_branch.take();
        let container = b.container.clone();
        let end = self.nodes.get(b.node).and_then(|n| n.anchor.clone());
        let _span = tracing::debug_span!("suspense_resolve").entered();

        if let Some(active) = active {
            self.unmount(active, true);
        }
        self.move_node(pending, &container, end.as_ref());
        self.set_active_branch(bid, Some(pending));
        self.finish_resolve(bid);
    }

    /// Mark resolved, hand collected effects outward, and fire `onResolve`.
    fn finish_resolve(&mut self, bid: BoundaryId) {
        let Some(b) = self.boundaries.get_mut(bid) else {
            return;
        };
        b.is_pending = false;
        b.in_fallback = false;
        b.pending_branch = None;
        let mut effects = std::mem::take(&mut b.effects);
        let (node, mut parent) = (b.node, b.cx.boundary);

        while let Some(pid) = parent {
            let Some(pb) = self.boundaries.get_mut(pid) else {
                break;
            };
            if pb.is_pending {
                pb.effects.append(&mut effects);
                break;
            }
            parent = pb.cx.boundary;
        }
        for task in effects {
            self.scheduler.queue_post(task);
        }
        if let Some(vnode) = self.nodes.get(node).map(|n| n.vnode.clone()) {
            self.invoke_prop_hook(&vnode, "onResolve", self.boundary_parent(bid));
        }
    }

    /// An async dependency of pending branch `suspense_id` finished or went
    /// away.
    pub(super) fn release_dependency(&mut self, bid: BoundaryId, suspense_id: u64) {
        let Some(b) = self.boundaries.get_mut(bid) else {
            return;
        };
        if !b.is_pending || b.pending_id != suspense_id || b.deps == 0 {
            return;
        }
        b.deps -= 1;
        if b.deps == 0 {
            self.resolve_suspense(bid);
        }
    }

    pub(super) fn unmount_suspense(&mut self, node_id: NodeId, do_remove: bool) {
        let Some(node) = self.nodes.get(node_id) else {
            return;
        };
        let end = node.anchor.clone();
        let Some(b) = node.boundary.and_then(|bid| self.boundaries.remove(bid)) else {
            return;
        };
        if let Some(active) = b.active_branch {
            self.unmount(active, do_remove);
        }
        if let Some(pending) = b.pending_branch {
            self.unmount(pending, do_remove);
        }
        if do_remove && let Some(end) = end {
            self.host.remove(&end);
        }
    }

    pub(super) fn move_suspense(
        &mut self,
        node_id: NodeId,
        container: &H::Handle,
        anchor: Option<&H::Handle>,
    ) {
        let Some(node) = self.nodes.get(node_id) else {
            return;
        };
        let end = node.anchor.clone();
        let Some(bid) = node.boundary else {
            return;
        };
        let active = match self.boundaries.get_mut(bid) {
            Some(b) => {
                b.container = container.clone();
                b.active_branch
            }
            None => None,
        };
        if let Some(active) = active {
            self.move_node(active, container, anchor);
        }
        if let Some(end) = end {
            self.host.insert(&end, container, anchor);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    fn branch_cx(&self, bid: BoundaryId) -> PatchCtx {
        PatchCtx {
            parent: self.boundary_parent(bid),
            boundary: Some(bid),
        }
    }

    /// Fallback content belongs to the enclosing boundary, not this one.
    fn fallback_cx(&self, bid: BoundaryId) -> PatchCtx {
        self.boundaries.get(bid).map_or_else(PatchCtx::default, |b| b.cx)
    }

    fn boundary_parent(&self, bid: BoundaryId) -> Option<crate::arena::InstanceId> {
        self.boundaries.get(bid).and_then(|b| b.cx.parent)
    }

    fn boundary_deps(&self, bid: BoundaryId) -> usize {
        self.boundaries.get(bid).map_or(0, |b| b.deps)
    }

    fn boundary_hidden(&self, bid: BoundaryId) -> Option<H::Handle> {
        self.boundaries.get(bid).map(|b| b.hidden.clone())
    }

    fn same_branch(&self, branch: NodeId, next: &SceneNode) -> bool {
        self.nodes
            .get(branch)
            .is_some_and(|n| is_same_type(&n.vnode, next))
    }

    fn set_pending_branch(&mut self, bid: BoundaryId, branch: Option<NodeId>) {
        if let Some(b) = self.boundaries.get_mut(bid) {
            b.pending_branch = branch;
        }
    }

    fn set_active_branch(&mut self, bid: BoundaryId, branch: Option<NodeId>) {
        if let Some(b) = self.boundaries.get_mut(bid) {
            b.active_branch = branch;
        }
    }
}
