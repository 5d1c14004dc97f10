#![forbid(unsafe_code)]

//! Teleports: children rendered into a container resolved from the `to`
//! prop instead of the teleport's own position.
//!
//! The teleport leaves two comment placeholders at its position and a
//! text anchor at the end of the target. With `disabled` set the children
//! render between the placeholders instead. Toggling `disabled` or changing
//! `to` moves the existing children; they are never re-created.

use crate::arena::NodeId;
use crate::error::Warning;
use crate::host::HostAdapter;
use crate::scene::{Children, SceneNode};

use super::{MountedChildren, MountedNode, PatchCtx, Renderer};

fn is_disabled(vnode: &SceneNode) -> bool {
    vnode.props_ref().get("disabled").is_some_and(|v| v.is_truthy())
}

fn target_selector(vnode: &SceneNode) -> Option<&str> {
    vnode.props_ref().get("to").and_then(|v| v.as_str())
}

impl<H: HostAdapter> Renderer<H> {
    pub(super) fn mount_teleport(
        &mut self,
        vnode: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> NodeId {
        let start = self.host.create_comment("teleport start");
        let end = self.host.create_comment("teleport end");
        self.host.insert(&start, container, anchor.as_ref());
        self.host.insert(&end, container, anchor.as_ref());

        let disabled = is_disabled(vnode);
        let target = self.resolve_teleport_target(vnode);
        let target_anchor = target.as_ref().map(|t| {
            let a = self.host.create_text("");
            self.host.insert(&a, t, None);
            a
        });

        let mut node = MountedNode::new(vnode.clone(), cx);
        node.el = Some(start);
        node.anchor = Some(end.clone());
        node.target = target.clone();
        node.target_anchor = target_anchor.clone();
        let id = self.nodes.insert(node);

        let placement = if disabled {
            Some((container.clone(), Some(end)))
        } else {
            target.map(|t| (t, target_anchor))
        };
        let children = match (placement, vnode.children_ref()) {
            (Some((into, before)), Children::Nodes(list)) => {
                let list = list.clone();
                MountedChildren::Nodes(self.mount_children(&list, &into, before.as_ref(), cx))
            }
            _ => MountedChildren::None,
        };
        if let Some(node) = self.nodes.get_mut(id) {
            node.children = children;
        }
        self.stats.mounts += 1;
        id
    }

    pub(super) fn patch_teleport(&mut self, id: NodeId, next: &SceneNode, cx: PatchCtx) -> NodeId {
        let Some(node) = self.nodes.get_mut(id) else {
            return id;
        };
        let old = std::mem::replace(&mut node.vnode, next.clone());
        let (start, end) = (node.el.clone(), node.anchor.clone());
        let (target, target_anchor) = (node.target.clone(), node.target_anchor.clone());
        let was_disabled = is_disabled(&old);
        let now_disabled = is_disabled(next);

        // Patch children where they currently live.
        let current = if was_disabled {
            start.as_ref().and_then(|s| self.host.parent_of(s)).map(|c| (c, end.clone()))
        } else {
            target.clone().map(|t| (t, target_anchor.clone()))
        };
        if let Some((into, before)) = &current {
            self.patch_children(id, &old, next, into, before.clone(), cx);
        }

        if now_disabled && !was_disabled {
            if let Some(main) = start.as_ref().and_then(|s| self.host.parent_of(s)) {
                self.place_children(id, &main, end.as_ref());
            }
        } else if !now_disabled {
            let retarget = target_selector(&old) != target_selector(next) || target.is_none();
            if retarget {
                if let Some(new_target) = self.resolve_teleport_target(next) {
                    self.retarget(id, new_target);
                }
            } else if was_disabled && let Some(t) = &target {
                self.place_children(id, t, target_anchor.as_ref());
            }
        }
        self.stats.patches += 1;
        id
    }

    /// Point the teleport at `new_target`, moving its anchor and children.
    fn retarget(&mut self, id: NodeId, new_target: H::Handle) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let anchor = match node.target_anchor.clone() {
            Some(a) => a,
            None => self.host.create_text(""),
        };
        self.host.insert(&anchor, &new_target, None);
        if let Some(node) = self.nodes.get_mut(id) {
            node.target = Some(new_target.clone());
            node.target_anchor = Some(anchor.clone());
        }
        self.place_children(id, &new_target, Some(&anchor));
    }

    /// Move mounted children into `container`, or mount them there if the
    /// teleport never had a place for them.
    fn place_children(&mut self, id: NodeId, container: &H::Handle, anchor: Option<&H::Handle>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if matches!(node.children, MountedChildren::Nodes(_)) {
            self.move_teleport_children(id, container, anchor);
            return;
        }
        let cx = node.cx;
        let Children::Nodes(list) = node.vnode.children_ref() else {
            return;
        };
        let list = list.clone();
        let mounted = self.mount_children(&list, container, anchor, cx);
        if let Some(node) = self.nodes.get_mut(id) {
            node.children = MountedChildren::Nodes(mounted);
        }
    }

    fn move_teleport_children(&mut self, id: NodeId, container: &H::Handle, anchor: Option<&H::Handle>) {
        let children = match self.nodes.get(id) {
            Some(node) => node.children.ids().to_vec(),
            None => return,
        };
        for child in children {
            self.move_node(child, container, anchor);
        }
    }

    /// Reorder among siblings: placeholders always move; children only
    /// when they live at the teleport's own position.
    pub(super) fn move_teleport(&mut self, id: NodeId, container: &H::Handle, anchor: Option<&H::Handle>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let (start, end) = (node.el.clone(), node.anchor.clone());
        let disabled = is_disabled(&node.vnode);
        if let Some(start) = &start {
            self.host.insert(start, container, anchor);
        }
        if disabled {
            self.move_teleport_children(id, container, anchor);
        }
        if let Some(end) = &end {
            self.host.insert(end, container, anchor);
        }
    }

    pub(super) fn unmount_teleport(&mut self, id: NodeId, do_remove: bool) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let remove_children = do_remove || !is_disabled(&node.vnode);
        let children = node.children.ids().to_vec();
        let (start, end, target_anchor) = (node.el.clone(), node.anchor.clone(), node.target_anchor.clone());
        if let Some(anchor) = target_anchor {
            self.host.remove(&anchor);
        }
        self.unmount_children(&children, remove_children);
        if do_remove {
            for placeholder in [start, end].into_iter().flatten() {
                self.host.remove(&placeholder);
            }
        }
    }

    fn resolve_teleport_target(&self, vnode: &SceneNode) -> Option<H::Handle> {
        let selector = target_selector(vnode).unwrap_or_default();
        let target = if selector.is_empty() {
            None
        } else {
            self.host.resolve_target(selector)
        };
        if target.is_none() && !is_disabled(vnode) {
            self.diagnostics.warn(Warning::InvalidTeleportTarget {
                target: selector.into(),
            });
        }
        target
    }
}
