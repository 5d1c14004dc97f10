#![forbid(unsafe_code)]

//! Children diff strategy selection.
//!
//! Before touching an element's or fragment's children, the patch engine
//! classifies the (old, new) pair into one [`ChildrenStrategy`]. The choice
//! depends only on the two children shapes and the new node's
//! [`PatchHint`], so it is made once and logged per patch.
//!
//! # Decision Table
//!
//! | Old | New | Hint | Strategy |
//! |-----|-----|------|----------|
//! | text `a` | text `a` | any | `Keep` |
//! | text `a` | text `b` | any | `SetText` |
//! | nodes | text | any | `ReplaceNodesWithText` |
//! | none / text | nodes | any | `MountAll` |
//! | nodes | nodes | `UNKEYED_CHILDREN` | `Unkeyed` |
//! | nodes | nodes | otherwise | `Keyed` |
//! | nodes | none | any | `UnmountAll` |
//! | text | none | any | `ClearText` |
//! | none | none | any | `Keep` |
//!
//! `Keyed` is the default for node lists: with keyless children it degrades
//! to type-based matching, which is still correct.
//!
//! # Invariants
//!
//! 1. **Deterministic**: same shapes and hint select the same strategy.
//! 2. **Total**: every shape pair maps to exactly one strategy.
//! 3. **Text-safe**: old text is always cleared before nodes are mounted.

use std::fmt;

use crate::scene::{Children, PatchHint};

/// Shape of the currently mounted children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildrenShape<'a> {
    /// Nothing mounted.
    Empty,
    /// Element text.
    Text(&'a str),
    /// Mounted child nodes.
    Nodes,
}

/// How to reconcile one children pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildrenStrategy {
    /// Nothing to do.
    Keep,
    /// Element text changed.
    SetText,
    /// Unmount old nodes, then set element text.
    ReplaceNodesWithText,
    /// Clear old text (if any), then mount all new nodes.
    MountAll,
    /// Pairwise patch by position.
    Unkeyed,
    /// Five-phase keyed reconciliation.
    Keyed,
    /// Unmount every old node.
    UnmountAll,
    /// Clear element text.
    ClearText,
}

impl fmt::Display for ChildrenStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => write!(f, "Keep"),
            Self::SetText => write!(f, "SetText"),
            Self::ReplaceNodesWithText => write!(f, "ReplaceNodesWithText"),
            Self::MountAll => write!(f, "MountAll"),
            Self::Unkeyed => write!(f, "Unkeyed"),
            Self::Keyed => write!(f, "Keyed"),
            Self::UnmountAll => write!(f, "UnmountAll"),
            Self::ClearText => write!(f, "ClearText"),
        }
    }
}

impl ChildrenStrategy {
    /// Pick the strategy for `old` -> `new` under `hint`.
    #[must_use]
    pub fn select(old: ChildrenShape<'_>, new: &Children, hint: PatchHint) -> Self {
        match (old, new) {
            (ChildrenShape::Text(a), Children::Text(b)) => {
                if a == b.as_ref() {
                    Self::Keep
                } else {
                    Self::SetText
                }
            }
            (ChildrenShape::Empty, Children::Text(b)) => {
                if b.is_empty() {
                    Self::Keep
                } else {
                    Self::SetText
                }
            }
            (ChildrenShape::Nodes, Children::Text(_)) => Self::ReplaceNodesWithText,
            (ChildrenShape::Empty | ChildrenShape::Text(_), Children::Nodes(_)) => Self::MountAll,
            (ChildrenShape::Nodes, Children::Nodes(_)) => {
                if hint.contains(PatchHint::UNKEYED_CHILDREN) {
                    Self::Unkeyed
                } else {
                    Self::Keyed
                }
            }
            (ChildrenShape::Nodes, Children::None | Children::Slots(_)) => Self::UnmountAll,
            (ChildrenShape::Text(_), Children::None | Children::Slots(_)) => Self::ClearText,
            (ChildrenShape::Empty, Children::None | Children::Slots(_)) => Self::Keep,
        }
    }

    /// Whether the strategy unmounts old nodes before doing anything else.
    #[must_use]
    pub fn clears_nodes(self) -> bool {
        matches!(self, Self::ReplaceNodesWithText | Self::UnmountAll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneNode;
    use std::rc::Rc;

    fn nodes() -> Children {
        Children::Nodes(Rc::from(vec![SceneNode::text("x")]))
    }

    #[test]
    fn text_pairs() {
        let same = Children::Text("a".into());
        let other = Children::Text("b".into());
        let empty = Children::Text("".into());
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Text("a"), &same, PatchHint::empty()),
            ChildrenStrategy::Keep
        );
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Text("a"), &other, PatchHint::TEXT),
            ChildrenStrategy::SetText
        );
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Empty, &empty, PatchHint::empty()),
            ChildrenStrategy::Keep
        );
    }

    #[test]
    fn node_lists_default_to_keyed() {
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Nodes, &nodes(), PatchHint::empty()),
            ChildrenStrategy::Keyed
        );
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Nodes, &nodes(), PatchHint::UNKEYED_CHILDREN),
            ChildrenStrategy::Unkeyed
        );
    }

    #[test]
    fn shape_changes() {
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Text("a"), &nodes(), PatchHint::empty()),
            ChildrenStrategy::MountAll
        );
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Nodes, &Children::Text("t".into()), PatchHint::empty()),
            ChildrenStrategy::ReplaceNodesWithText
        );
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Nodes, &Children::None, PatchHint::empty()),
            ChildrenStrategy::UnmountAll
        );
        assert_eq!(
            ChildrenStrategy::select(ChildrenShape::Text("a"), &Children::None, PatchHint::empty()),
            ChildrenStrategy::ClearText
        );
        assert!(ChildrenStrategy::UnmountAll.clears_nodes());
        assert!(!ChildrenStrategy::Keyed.clears_nodes());
    }

    #[test]
    fn display_names() {
        assert_eq!(ChildrenStrategy::Keyed.to_string(), "Keyed");
        assert_eq!(ChildrenStrategy::ReplaceNodesWithText.to_string(), "ReplaceNodesWithText");
    }
}
