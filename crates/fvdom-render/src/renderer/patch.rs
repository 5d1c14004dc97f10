#![forbid(unsafe_code)]

//! Per-kind mount, patch, and unmount.

use std::rc::Rc;

use crate::arena::NodeId;
use crate::diff_strategy::{ChildrenShape, ChildrenStrategy};
use crate::host::HostAdapter;
use crate::scene::{Children, NodeKind, PatchHint, PropValue, Props, SceneNode, is_reserved_prop, is_same_type};

use super::{MountedChildren, MountedNode, PatchCtx, Renderer};

impl<H: HostAdapter> Renderer<H> {
    /// Reconcile `prev` (if any) into `next`, returning the mounted id.
    ///
    /// Identical nodes are skipped; type-incompatible ones are replaced at
    /// the old position.
    pub(crate) fn patch(
        &mut self,
        prev: Option<NodeId>,
        next: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> NodeId {
        let mut anchor = anchor;
        let mut prev = prev.filter(|id| self.nodes.contains(*id));
        if let Some(old) = prev {
            let (identical, compatible) = match self.nodes.get(old) {
                Some(node) => (node.vnode.ptr_eq(next), is_same_type(&node.vnode, next)),
                None => (false, false),
            };
            if identical {
                return old;
            }
            if !compatible {
                anchor = self.next_host_node(old);
                self.unmount(old, true);
                prev = None;
            }
        }

        match next.kind() {
            NodeKind::Text | NodeKind::Comment => self.process_leaf(prev, next, container, anchor, cx),
            NodeKind::StaticBlob => self.process_static(prev, next, container, anchor, cx),
            NodeKind::Fragment => self.process_fragment(prev, next, container, anchor, cx),
            NodeKind::Element(_) => match prev {
                Some(id) => self.patch_element(id, next, cx),
                None => self.mount_element(next, container, anchor, cx),
            },
            NodeKind::Component(_) => match prev {
                Some(id) => self.update_component(id, next),
                None => self.mount_component(next, container, anchor, cx),
            },
            NodeKind::Teleport => match prev {
                Some(id) => self.patch_teleport(id, next, cx),
                None => self.mount_teleport(next, container, anchor, cx),
            },
            NodeKind::Suspense => match prev {
                Some(id) => self.patch_suspense(id, next),
                None => self.mount_suspense(next, container, anchor, cx),
            },
        }
    }

    // =========================================================================
    // Leaves
    // =========================================================================

    fn process_leaf(
        &mut self,
        prev: Option<NodeId>,
        next: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> NodeId {
        let content = next.text_ref().unwrap_or_default();
        if let Some(id) = prev
            && let Some(node) = self.nodes.get_mut(id)
        {
            let changed = node.vnode.text_ref() != next.text_ref();
            node.vnode = next.clone();
            if changed && let Some(el) = &node.el {
                self.host.set_text(el, content);
                self.stats.text_writes += 1;
            }
            self.stats.patches += 1;
            return id;
        }
        let el = match next.kind() {
            NodeKind::Comment => self.host.create_comment(content),
            _ => self.host.create_text(content),
        };
        self.host.insert(&el, container, anchor.as_ref());
        self.stats.mounts += 1;
        let mut node = MountedNode::new(next.clone(), cx);
        node.el = Some(el);
        self.nodes.insert(node)
    }

    fn process_static(
        &mut self,
        prev: Option<NodeId>,
        next: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> NodeId {
        if let Some(id) = prev
            && let Some(node) = self.nodes.get_mut(id)
        {
            node.vnode = next.clone();
            return id;
        }
        let content = next.text_ref().unwrap_or_default();
        let (first, last) = self
            .host
            .insert_static_content(content, container, anchor.as_ref());
        self.stats.mounts += 1;
        let mut node = MountedNode::new(next.clone(), cx);
        node.el = Some(first);
        node.anchor = Some(last);
        self.nodes.insert(node)
    }

    fn process_fragment(
        &mut self,
        prev: Option<NodeId>,
        next: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> NodeId {
        if let Some(id) = prev
            && let Some(node) = self.nodes.get_mut(id)
        {
            let old = std::mem::replace(&mut node.vnode, next.clone());
            let end = node.anchor.clone();
            self.patch_children(id, &old, next, container, end, cx);
            self.stats.patches += 1;
            return id;
        }
        let start = self.host.create_text("");
        let end = self.host.create_text("");
        self.host.insert(&start, container, anchor.as_ref());
        self.host.insert(&end, container, anchor.as_ref());
        let mut node = MountedNode::new(next.clone(), cx);
        node.el = Some(start);
        node.anchor = Some(end.clone());
        let id = self.nodes.insert(node);
        let children = match next.children_ref() {
            Children::Nodes(list) => {
                let list = Rc::clone(list);
                MountedChildren::Nodes(self.mount_children(&list, container, Some(&end), cx))
            }
            _ => MountedChildren::None,
        };
        if let Some(node) = self.nodes.get_mut(id) {
            node.children = children;
        }
        self.stats.mounts += 1;
        id
    }

    // =========================================================================
    // Elements
    // =========================================================================

    fn mount_element(
        &mut self,
        vnode: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> NodeId {
        let tag = vnode.tag().unwrap_or("div");
        let el = self.host.create_element(tag, vnode.props_ref());
        let mut node = MountedNode::new(vnode.clone(), cx);
        node.el = Some(el.clone());
        let id = self.nodes.insert(node);

        let children = match vnode.children_ref() {
            Children::Text(text) => {
                if !text.is_empty() {
                    self.host.set_element_text(&el, text);
                    self.stats.text_writes += 1;
                }
                MountedChildren::Text(Rc::clone(text))
            }
            Children::Nodes(list) => {
                let list = Rc::clone(list);
                MountedChildren::Nodes(self.mount_children(&list, &el, None, cx))
            }
            Children::None | Children::Slots(_) => MountedChildren::None,
        };
        if let Some(node) = self.nodes.get_mut(id) {
            node.children = children;
        }

        self.mount_props(&el, vnode.props_ref());
        self.invoke_prop_hook(vnode, "onVnodeBeforeMount", cx.parent);
        self.host.insert(&el, container, anchor.as_ref());
        self.queue_prop_hook(vnode, "onVnodeMounted", cx);
        self.stats.mounts += 1;
        id
    }

    fn patch_element(&mut self, id: NodeId, next: &SceneNode, cx: PatchCtx) -> NodeId {
        let Some(node) = self.nodes.get_mut(id) else {
            return id;
        };
        let Some(el) = node.el.clone() else {
            return id;
        };
        let old = std::mem::replace(&mut node.vnode, next.clone());
        self.invoke_prop_hook(next, "onVnodeBeforeUpdate", cx.parent);
        self.patch_children(id, &old, next, &el, None, cx);
        self.patch_element_props(&el, &old, next);
        self.queue_prop_hook(next, "onVnodeUpdated", cx);
        self.stats.patches += 1;
        id
    }

    fn mount_props(&mut self, el: &H::Handle, props: &Props) {
        for (key, value) in props.iter() {
            if is_reserved_prop(key) || key == "value" {
                continue;
            }
            self.host.patch_prop(el, key, None, Some(value));
            self.stats.prop_writes += 1;
        }
        // `value` last so min/max-style constraints are already in place.
        if let Some(value) = props.get("value") {
            self.host.patch_prop(el, "value", None, Some(value));
            self.stats.prop_writes += 1;
        }
    }

    fn patch_element_props(&mut self, el: &H::Handle, old: &SceneNode, next: &SceneNode) {
        let hint = next.patch_hint();
        let (prev_props, next_props) = (old.props_ref(), next.props_ref());
        if hint.is_optimized() && !hint.contains(PatchHint::FULL_PROPS) {
            if hint.contains(PatchHint::CLASS) {
                self.patch_one_prop(el, "class", prev_props.get("class"), next_props.get("class"), false);
            }
            if hint.contains(PatchHint::STYLE) {
                self.patch_one_prop(el, "style", prev_props.get("style"), next_props.get("style"), false);
            }
            if hint.contains(PatchHint::PROPS) {
                for name in next.dynamic_prop_names() {
                    let force = name.as_ref() == "value";
                    self.patch_one_prop(el, name, prev_props.get(name), next_props.get(name), force);
                }
            }
            return;
        }

        if prev_props == next_props {
            return;
        }
        for (key, value) in next_props.iter() {
            if is_reserved_prop(key) || key == "value" {
                continue;
            }
            self.patch_one_prop(el, key, prev_props.get(key), Some(value), false);
        }
        for (key, value) in prev_props.iter() {
            if !is_reserved_prop(key) && !next_props.contains(key) {
                self.host.patch_prop(el, key, Some(value), None);
                self.stats.prop_writes += 1;
            }
        }
        if let Some(value) = next_props.get("value") {
            self.patch_one_prop(el, "value", prev_props.get("value"), Some(value), false);
        }
    }

    fn patch_one_prop(
        &mut self,
        el: &H::Handle,
        key: &str,
        prev: Option<&PropValue>,
        next: Option<&PropValue>,
        force: bool,
    ) {
        if prev != next || force {
            self.host.patch_prop(el, key, prev, next);
            self.stats.prop_writes += 1;
        }
    }

    // =========================================================================
    // Children
    // =========================================================================

    pub(super) fn mount_children(
        &mut self,
        list: &[SceneNode],
        container: &H::Handle,
        anchor: Option<&H::Handle>,
        cx: PatchCtx,
    ) -> Vec<NodeId> {
        list.iter()
            .map(|child| self.patch(None, child, container, anchor.cloned(), cx))
            .collect()
    }

    /// Reconcile the children of node `id` from `old` to `next`, inside
    /// `container` before `anchor`.
    pub(super) fn patch_children(
        &mut self,
        id: NodeId,
        old: &SceneNode,
        next: &SceneNode,
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let mounted = std::mem::take(&mut node.children);
        let shape = match &mounted {
            MountedChildren::None => ChildrenShape::Empty,
            MountedChildren::Text(t) => ChildrenShape::Text(t.as_ref()),
            MountedChildren::Nodes(_) => ChildrenShape::Nodes,
        };
        let strategy = ChildrenStrategy::select(shape, next.children_ref(), next.patch_hint());
        tracing::trace!(%strategy, kind = ?old.kind(), "children diff");

        let old_ids = match &mounted {
            MountedChildren::Nodes(ids) => ids.clone(),
            _ => Vec::new(),
        };
        if strategy.clears_nodes() {
            self.unmount_children(&old_ids, true);
        }
        let new_text: Option<Rc<str>> = next.children_ref().as_text().map(Rc::from);
        let new_nodes = match next.children_ref() {
            Children::Nodes(list) => Some(Rc::clone(list)),
            _ => None,
        };

        let result = match strategy {
            ChildrenStrategy::Keep => mounted,
            ChildrenStrategy::SetText | ChildrenStrategy::ReplaceNodesWithText => {
                let text: Rc<str> = new_text.unwrap_or_else(|| Rc::from(""));
                self.host.set_element_text(container, &text);
                self.stats.text_writes += 1;
                MountedChildren::Text(text)
            }
            ChildrenStrategy::MountAll => {
                if matches!(mounted, MountedChildren::Text(_)) {
                    self.host.set_element_text(container, "");
                    self.stats.text_writes += 1;
                }
                let list = new_nodes.unwrap_or_else(|| Rc::from(Vec::new()));
                MountedChildren::Nodes(self.mount_children(&list, container, anchor.as_ref(), cx))
            }
            ChildrenStrategy::Unkeyed => {
                let list = new_nodes.unwrap_or_else(|| Rc::from(Vec::new()));
                MountedChildren::Nodes(self.patch_unkeyed(&old_ids, &list, container, anchor, cx))
            }
            ChildrenStrategy::Keyed => {
                let list = new_nodes.unwrap_or_else(|| Rc::from(Vec::new()));
                MountedChildren::Nodes(self.patch_keyed(&old_ids, &list, container, anchor, cx))
            }
            ChildrenStrategy::UnmountAll => MountedChildren::None,
            ChildrenStrategy::ClearText => {
                self.host.set_element_text(container, "");
                self.stats.text_writes += 1;
                MountedChildren::None
            }
        };
        if let Some(node) = self.nodes.get_mut(id) {
            node.children = result;
        }
    }

    pub(super) fn unmount_children(&mut self, ids: &[NodeId], do_remove: bool) {
        for &child in ids {
            self.unmount(child, do_remove);
        }
    }

    // =========================================================================
    // Unmount
    // =========================================================================

    /// Tear down a mounted node. With `do_remove` its host nodes are
    /// detached; without, an ancestor's removal takes them along.
    pub(crate) fn unmount(&mut self, id: NodeId, do_remove: bool) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let vnode = node.vnode.clone();
        let cx = node.cx;

        if let Some(inst) = node.component {
            self.invoke_prop_hook(&vnode, "onVnodeBeforeUnmount", cx.parent);
            self.unmount_component(inst, do_remove);
            self.queue_prop_hook(&vnode, "onVnodeUnmounted", cx);
        } else {
            match vnode.kind() {
                NodeKind::Suspense => self.unmount_suspense(id, do_remove),
                NodeKind::Teleport => self.unmount_teleport(id, do_remove),
                NodeKind::Fragment => {
                    let children = node.children.ids().to_vec();
                    let (start, end) = (node.el.clone(), node.anchor.clone());
                    self.unmount_children(&children, do_remove);
                    if do_remove {
                        for anchor in [start, end].into_iter().flatten() {
                            self.host.remove(&anchor);
                        }
                    }
                }
                NodeKind::StaticBlob => {
                    if do_remove {
                        for n in self.static_range(node.el.clone(), node.anchor.clone()) {
                            self.host.remove(&n);
                        }
                    }
                }
                NodeKind::Element(_) => {
                    let children = node.children.ids().to_vec();
                    let el = node.el.clone();
                    self.invoke_prop_hook(&vnode, "onVnodeBeforeUnmount", cx.parent);
                    self.unmount_children(&children, false);
                    if do_remove && let Some(el) = el {
                        self.host.remove(&el);
                    }
                    self.queue_prop_hook(&vnode, "onVnodeUnmounted", cx);
                }
                NodeKind::Text | NodeKind::Comment | NodeKind::Component(_) => {
                    if do_remove && let Some(el) = node.el.clone() {
                        self.host.remove(&el);
                    }
                }
            }
        }
        self.nodes.remove(id);
        self.stats.unmounts += 1;
    }
}
