#![forbid(unsafe_code)]

//! Host adapter: the mutation primitives of a platform target.
//!
//! The patch engine never touches a host tree directly. Every structural or
//! content change goes through one of these calls, so a target only has to
//! implement them to get the whole engine.
//!
//! # Contract
//!
//! - All calls are synchronous and infallible for well-formed input. Platform
//!   validation happens inside the adapter, before it mutates anything.
//! - `insert` of a node that already has a parent moves it.
//! - `remove` of a detached node is a no-op.
//! - Handles stay valid after removal; the engine just never uses them again.

use std::fmt;

use crate::scene::{PropValue, Props};

/// Platform mutation primitives.
pub trait HostAdapter {
    /// Reference to a live host object.
    type Handle: Clone + PartialEq + fmt::Debug;

    /// Create a detached element.
    fn create_element(&mut self, tag: &str, props: &Props) -> Self::Handle;

    /// Create a detached text node.
    fn create_text(&mut self, content: &str) -> Self::Handle;

    /// Create a detached comment node.
    fn create_comment(&mut self, content: &str) -> Self::Handle;

    /// Insert `child` into `parent` before `anchor` (append when `None`).
    fn insert(&mut self, child: &Self::Handle, parent: &Self::Handle, anchor: Option<&Self::Handle>);

    /// Detach `child` from its parent.
    fn remove(&mut self, child: &Self::Handle);

    /// Replace the content of a text or comment node.
    fn set_text(&mut self, node: &Self::Handle, content: &str);

    /// Replace all children of an element with a single text.
    fn set_element_text(&mut self, element: &Self::Handle, content: &str);

    /// Apply one prop change. `prev`/`next` of `None` mean absent.
    fn patch_prop(
        &mut self,
        element: &Self::Handle,
        key: &str,
        prev: Option<&PropValue>,
        next: Option<&PropValue>,
    );

    /// Parent of a node, if attached.
    fn parent_of(&self, node: &Self::Handle) -> Option<Self::Handle>;

    /// Next sibling of a node, if any.
    fn next_sibling_of(&self, node: &Self::Handle) -> Option<Self::Handle>;

    /// Insert pre-rendered content before `anchor`, returning the first and
    /// last host nodes it produced (the same node when it produced one).
    fn insert_static_content(
        &mut self,
        content: &str,
        parent: &Self::Handle,
        anchor: Option<&Self::Handle>,
    ) -> (Self::Handle, Self::Handle);

    /// Resolve a teleport target selector.
    fn resolve_target(&self, selector: &str) -> Option<Self::Handle> {
        let _ = selector;
        None
    }
}
