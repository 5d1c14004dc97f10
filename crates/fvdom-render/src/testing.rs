#![forbid(unsafe_code)]

//! In-memory recording host.
//!
//! [`RecordingHost`] keeps a plain node tree and logs every adapter call as
//! a [`HostOp`]. Tests read the tree back as HTML with
//! [`serialize`](RecordingHost::serialize) and check the op log for
//! minimality (moves, creations, double removals).
//!
//! Available under `cfg(test)` and the `test-helpers` feature.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::emit::handler_key;
use crate::error::ComponentError;
use crate::host::HostAdapter;
use crate::scene::{PropValue, Props};

/// Handle to a node of a [`RecordingHost`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostNodeId(usize);

impl fmt::Debug for HostNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum HostKind {
    Element {
        tag: Rc<str>,
        attrs: Vec<(Rc<str>, PropValue)>,
    },
    Text(String),
    Comment(String),
    /// Verbatim markup produced by `insert_static_content`.
    Static(String),
}

#[derive(Debug, Clone)]
struct HostNode {
    kind: HostKind,
    parent: Option<HostNodeId>,
    children: Vec<HostNodeId>,
    removed: bool,
}

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    /// `create_element`.
    CreateElement { node: HostNodeId, tag: Rc<str> },
    /// `create_text`.
    CreateText { node: HostNodeId },
    /// `create_comment`.
    CreateComment { node: HostNodeId },
    /// `insert`. `moved` is set when the node already had a parent.
    Insert {
        node: HostNodeId,
        parent: HostNodeId,
        anchor: Option<HostNodeId>,
        moved: bool,
    },
    /// `remove`.
    Remove { node: HostNodeId },
    /// `set_text`.
    SetText { node: HostNodeId, text: String },
    /// `set_element_text`.
    SetElementText { node: HostNodeId, text: String },
    /// `patch_prop`.
    PatchProp {
        node: HostNodeId,
        key: Rc<str>,
        value: Option<PropValue>,
    },
    /// `insert_static_content`.
    InsertStatic {
        first: HostNodeId,
        last: HostNodeId,
    },
}

/// Host adapter over an in-memory tree that records every call.
#[derive(Debug, Clone)]
pub struct RecordingHost {
    nodes: Vec<HostNode>,
    root: HostNodeId,
    targets: AHashMap<String, HostNodeId>,
    ops: Vec<HostOp>,
    double_removes: usize,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHost {
    /// A host with one empty root container.
    #[must_use]
    pub fn new() -> Self {
        let mut host = Self {
            nodes: Vec::new(),
            root: HostNodeId(0),
            targets: AHashMap::new(),
            ops: Vec::new(),
            double_removes: 0,
        };
        host.root = host.alloc(HostKind::Element {
            tag: "root".into(),
            attrs: Vec::new(),
        });
        host
    }

    /// The root container.
    #[must_use]
    pub fn root(&self) -> HostNodeId {
        self.root
    }

    /// Register a detached container that teleports can resolve as
    /// `selector`.
    pub fn add_target(&mut self, selector: &str) -> HostNodeId {
        let id = self.alloc(HostKind::Element {
            tag: "target".into(),
            attrs: Vec::new(),
        });
        self.targets.insert(selector.to_owned(), id);
        id
    }

    /// Inner HTML of `node`.
    #[must_use]
    pub fn serialize(&self, node: &HostNodeId) -> String {
        let mut out = String::new();
        if let Some(n) = self.node(*node) {
            for child in &n.children {
                self.write_node(*child, &mut out);
            }
        }
        out
    }

    /// Outer HTML of `node`.
    #[must_use]
    pub fn outer_html(&self, node: &HostNodeId) -> String {
        let mut out = String::new();
        self.write_node(*node, &mut out);
        out
    }

    /// Concatenated text below `node`, markup stripped.
    #[must_use]
    pub fn text_of(&self, node: &HostNodeId) -> String {
        let mut out = String::new();
        self.collect_text(*node, &mut out);
        out
    }

    /// Elements with `tag` below `node`, in document order.
    #[must_use]
    pub fn find_all(&self, node: &HostNodeId, tag: &str) -> Vec<HostNodeId> {
        let mut out = Vec::new();
        self.collect_tag(*node, tag, &mut out);
        out
    }

    /// First element with `tag` below `node`.
    #[must_use]
    pub fn find(&self, node: &HostNodeId, tag: &str) -> Option<HostNodeId> {
        self.find_all(node, tag).into_iter().next()
    }

    /// Current value of an attribute.
    #[must_use]
    pub fn attr(&self, node: &HostNodeId, key: &str) -> Option<PropValue> {
        match &self.node(*node)?.kind {
            HostKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.as_ref() == key)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Direct children of `node`.
    #[must_use]
    pub fn children_of(&self, node: &HostNodeId) -> Vec<HostNodeId> {
        self.node(*node).map(|n| n.children.clone()).unwrap_or_default()
    }

    /// Invoke the `on<Event>` listener attached to `node`. Returns
    /// `Ok(false)` when no listener is attached.
    pub fn dispatch(
        &self,
        node: &HostNodeId,
        event: &str,
        args: &[PropValue],
    ) -> Result<bool, ComponentError> {
        let key = handler_key(event);
        match self.attr(node, &key).as_ref().and_then(PropValue::as_handler) {
            Some(handler) => handler.call(args).map(|()| true),
            None => Ok(false),
        }
    }

    /// Every call recorded since creation or the last [`clear_ops`](Self::clear_ops).
    #[must_use]
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Forget recorded calls.
    pub fn clear_ops(&mut self) {
        self.ops.clear();
        self.double_removes = 0;
    }

    /// Inserts of nodes that were already attached.
    #[must_use]
    pub fn moved_inserts(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, HostOp::Insert { moved: true, .. }))
            .count()
    }

    /// Elements created.
    #[must_use]
    pub fn created_elements(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, HostOp::CreateElement { .. }))
            .count()
    }

    /// Prop writes.
    #[must_use]
    pub fn prop_writes(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, HostOp::PatchProp { .. }))
            .count()
    }

    /// Removals of a node that had already been removed.
    #[must_use]
    pub fn double_removes(&self) -> usize {
        self.double_removes
    }

    /// Number of nodes ever created (including the root and targets).
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.nodes.len()
    }

    // =========================================================================
    // Tree internals
    // =========================================================================

    fn alloc(&mut self, kind: HostKind) -> HostNodeId {
        let id = HostNodeId(self.nodes.len());
        self.nodes.push(HostNode {
            kind,
            parent: None,
            children: Vec::new(),
            removed: false,
        });
        id
    }

    fn node(&self, id: HostNodeId) -> Option<&HostNode> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: HostNodeId) -> Option<&mut HostNode> {
        self.nodes.get_mut(id.0)
    }

    fn detach(&mut self, id: HostNodeId) -> bool {
        let Some(parent) = self.node(id).and_then(|n| n.parent) else {
            return false;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = None;
        }
        true
    }

    fn attach(&mut self, id: HostNodeId, parent: HostNodeId, anchor: Option<HostNodeId>) {
        let Some(p) = self.node_mut(parent) else {
            return;
        };
        let at = anchor
            .and_then(|a| p.children.iter().position(|c| *c == a))
            .unwrap_or(p.children.len());
        p.children.insert(at, id);
        if let Some(n) = self.node_mut(id) {
            n.parent = Some(parent);
            n.removed = false;
        }
    }

    fn write_node(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            HostKind::Text(text) => out.push_str(text),
            HostKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            HostKind::Static(markup) => out.push_str(markup),
            HostKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attrs {
                    match value {
                        PropValue::Handler(_) | PropValue::Null | PropValue::Bool(false) => {}
                        PropValue::Bool(true) => {
                            out.push(' ');
                            out.push_str(key);
                        }
                        other => {
                            out.push(' ');
                            out.push_str(key);
                            out.push_str("=\"");
                            out.push_str(&other.to_string());
                            out.push('"');
                        }
                    }
                }
                out.push('>');
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn collect_text(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            HostKind::Text(text) => out.push_str(text),
            HostKind::Static(markup) => out.push_str(&strip_tags(markup)),
            HostKind::Comment(_) => {}
            HostKind::Element { .. } => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    fn collect_tag(&self, id: HostNodeId, tag: &str, out: &mut Vec<HostNodeId>) {
        let Some(node) = self.node(id) else {
            return;
        };
        for child in &node.children {
            if let Some(HostKind::Element { tag: t, .. }) = self.node(*child).map(|n| &n.kind)
                && t.as_ref() == tag
            {
                out.push(*child);
            }
            self.collect_tag(*child, tag, out);
        }
    }
}

/// Split markup into top-level chunks (elements and text runs).
fn split_top_level(markup: &str) -> Vec<String> {
    let bytes = markup.as_bytes();
    let mut chunks = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let close = bytes.get(i + 1) == Some(&b'/');
        let end = markup[i..].find('>').map_or(bytes.len(), |e| i + e + 1);
        let self_closing = end >= 2 && bytes[end - 2] == b'/';
        if close {
            depth = depth.saturating_sub(1);
            i = end;
            if depth == 0 {
                chunks.push(markup[start..i].to_owned());
                start = i;
            }
            continue;
        }
        if depth == 0 && start < i {
            chunks.push(markup[start..i].to_owned());
            start = i;
        }
        i = end;
        if self_closing {
            if depth == 0 {
                chunks.push(markup[start..i].to_owned());
                start = i;
            }
        } else {
            depth += 1;
        }
    }
    if start < bytes.len() {
        chunks.push(markup[start..].to_owned());
    }
    chunks
}

fn strip_tags(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut in_tag = false;
    for c in markup.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

impl HostAdapter for RecordingHost {
    type Handle = HostNodeId;

    fn create_element(&mut self, tag: &str, _props: &Props) -> HostNodeId {
        let tag: Rc<str> = tag.into();
        let node = self.alloc(HostKind::Element {
            tag: Rc::clone(&tag),
            attrs: Vec::new(),
        });
        self.ops.push(HostOp::CreateElement { node, tag });
        node
    }

    fn create_text(&mut self, content: &str) -> HostNodeId {
        let node = self.alloc(HostKind::Text(content.to_owned()));
        self.ops.push(HostOp::CreateText { node });
        node
    }

    fn create_comment(&mut self, content: &str) -> HostNodeId {
        let node = self.alloc(HostKind::Comment(content.to_owned()));
        self.ops.push(HostOp::CreateComment { node });
        node
    }

    fn insert(&mut self, child: &HostNodeId, parent: &HostNodeId, anchor: Option<&HostNodeId>) {
        // Inserting a node before itself leaves it where it is.
        let anchor = anchor.copied().filter(|a| a != child);
        let moved = self.detach(*child);
        self.attach(*child, *parent, anchor);
        self.ops.push(HostOp::Insert {
            node: *child,
            parent: *parent,
            anchor,
            moved,
        });
    }

    fn remove(&mut self, child: &HostNodeId) {
        if self.node(*child).is_some_and(|n| n.removed) {
            self.double_removes += 1;
        }
        self.detach(*child);
        if let Some(n) = self.node_mut(*child) {
            n.removed = true;
        }
        self.ops.push(HostOp::Remove { node: *child });
    }

    fn set_text(&mut self, node: &HostNodeId, content: &str) {
        if let Some(n) = self.node_mut(*node) {
            match &mut n.kind {
                HostKind::Text(text) | HostKind::Comment(text) => {
                    content.clone_into(text);
                }
                _ => {}
            }
        }
        self.ops.push(HostOp::SetText {
            node: *node,
            text: content.to_owned(),
        });
    }

    fn set_element_text(&mut self, element: &HostNodeId, content: &str) {
        let old = self.node(*element).map(|n| n.children.clone()).unwrap_or_default();
        for child in old {
            self.detach(child);
        }
        if !content.is_empty() {
            let text = self.alloc(HostKind::Text(content.to_owned()));
            self.attach(text, *element, None);
        }
        self.ops.push(HostOp::SetElementText {
            node: *element,
            text: content.to_owned(),
        });
    }

    fn patch_prop(
        &mut self,
        element: &HostNodeId,
        key: &str,
        _prev: Option<&PropValue>,
        next: Option<&PropValue>,
    ) {
        if let Some(HostNode {
            kind: HostKind::Element { attrs, .. },
            ..
        }) = self.node_mut(*element)
        {
            let pos = attrs.iter().position(|(k, _)| k.as_ref() == key);
            match (pos, next) {
                (Some(p), Some(value)) => attrs[p].1 = value.clone(),
                (Some(p), None) => {
                    attrs.remove(p);
                }
                (None, Some(value)) => attrs.push((key.into(), value.clone())),
                (None, None) => {}
            }
        }
        self.ops.push(HostOp::PatchProp {
            node: *element,
            key: key.into(),
            value: next.cloned(),
        });
    }

    fn parent_of(&self, node: &HostNodeId) -> Option<HostNodeId> {
        self.node(*node)?.parent
    }

    fn next_sibling_of(&self, node: &HostNodeId) -> Option<HostNodeId> {
        let parent = self.node(self.node(*node)?.parent?)?;
        let pos = parent.children.iter().position(|c| c == node)?;
        parent.children.get(pos + 1).copied()
    }

    fn insert_static_content(
        &mut self,
        content: &str,
        parent: &HostNodeId,
        anchor: Option<&HostNodeId>,
    ) -> (HostNodeId, HostNodeId) {
        let mut chunks = split_top_level(content);
        if chunks.is_empty() {
            chunks.push(String::new());
        }
        let mut created = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let node = self.alloc(HostKind::Static(chunk));
            self.attach(node, *parent, anchor.copied());
            created.push(node);
        }
        let first = created[0];
        let last = created[created.len() - 1];
        self.ops.push(HostOp::InsertStatic { first, last });
        (first, last)
    }

    fn resolve_target(&self, selector: &str) -> Option<HostNodeId> {
        self.targets.get(selector).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_anchor_and_move() {
        let mut host = RecordingHost::new();
        let root = host.root();
        let a = host.create_text("a");
        let b = host.create_text("b");
        host.insert(&a, &root, None);
        host.insert(&b, &root, Some(&a));
        assert_eq!(host.serialize(&root), "ba");
        host.insert(&b, &root, None);
        assert_eq!(host.serialize(&root), "ab");
        assert_eq!(host.moved_inserts(), 1);
    }

    #[test]
    fn second_remove_is_counted() {
        let mut host = RecordingHost::new();
        let root = host.root();
        let el = host.create_element("p", &Props::new());
        host.insert(&el, &root, None);
        host.remove(&el);
        host.remove(&el);
        assert_eq!(host.double_removes(), 1);
        assert_eq!(host.serialize(&root), "");
    }

    #[test]
    fn attributes_serialize_in_insertion_order() {
        let mut host = RecordingHost::new();
        let root = host.root();
        let el = host.create_element("input", &Props::new());
        host.patch_prop(&el, "id", None, Some(&PropValue::from("x")));
        host.patch_prop(&el, "disabled", None, Some(&PropValue::Bool(true)));
        host.patch_prop(&el, "hidden", None, Some(&PropValue::Bool(false)));
        host.insert(&el, &root, None);
        assert_eq!(host.serialize(&root), "<input id=\"x\" disabled></input>");
        host.patch_prop(&el, "id", None, None);
        assert_eq!(host.attr(&el, "id"), None);
    }

    #[test]
    fn static_content_splits_top_level_nodes() {
        let mut host = RecordingHost::new();
        let root = host.root();
        let (first, last) = host.insert_static_content("<p>a</p>tail<br/><p><b>b</b></p>", &root, None);
        assert_ne!(first, last);
        assert_eq!(host.children_of(&root).len(), 4);
        assert_eq!(host.serialize(&root), "<p>a</p>tail<br/><p><b>b</b></p>");
        assert_eq!(host.text_of(&root), "atailb");
    }

    #[test]
    fn element_text_replaces_children() {
        let mut host = RecordingHost::new();
        let root = host.root();
        let el = host.create_element("div", &Props::new());
        let t = host.create_text("old");
        host.insert(&t, &el, None);
        host.insert(&el, &root, None);
        host.set_element_text(&el, "new");
        assert_eq!(host.serialize(&root), "<div>new</div>");
        assert_eq!(host.parent_of(&t), None);
    }
}
