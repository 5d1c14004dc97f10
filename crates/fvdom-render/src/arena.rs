#![forbid(unsafe_code)]

//! Generational arena for mounted nodes, component instances, and async
//! boundaries.
//!
//! The patch engine's tree has back-references (component to subtree,
//! subtree to owning component, boundary to branches). Every such link is a
//! plain [`Id`]; nothing in the tree owns anything else through `Rc`.
//!
//! Slots are reused after removal, with a generation bump so that a stale id
//! never resolves to the new occupant. Lookups through a stale id return
//! `None`, which is how double unmounts become no-ops.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A typed, generation-checked index into an [`Arena`].
pub struct Id<M> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Id<M> {
    const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index (stable while the entry is live).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }
}

impl<M> Clone for Id<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Id<M> {}

impl<M> PartialEq for Id<M> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<M> Eq for Id<M> {}

impl<M> Hash for Id<M> {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<M> fmt::Debug for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Marker for mounted scene nodes.
#[derive(Debug)]
pub enum NodeMarker {}

/// Marker for component instances.
#[derive(Debug)]
pub enum InstanceMarker {}

/// Marker for async boundaries.
#[derive(Debug)]
pub enum BoundaryMarker {}

/// Id of a mounted scene node.
pub type NodeId = Id<NodeMarker>;
/// Id of a component instance.
pub type InstanceId = Id<InstanceMarker>;
/// Id of an async boundary.
pub type BoundaryId = Id<BoundaryMarker>;

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Slot arena with generational ids.
pub struct Arena<M, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _marker: PhantomData<fn() -> M>,
}

impl<M, T> Default for Arena<M, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, T> fmt::Debug for Arena<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

impl<M, T> Arena<M, T> {
    /// Create an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Store `value`, returning its id.
    pub fn insert(&mut self, value: T) -> Id<M> {
        self.insert_with(|_| value)
    }

    /// Store the value built by `f`, which receives the id it will live at.
    pub fn insert_with(&mut self, f: impl FnOnce(Id<M>) -> T) -> Id<M> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let generation = match &self.slots[index as usize] {
                Slot::Vacant { generation } => generation.wrapping_add(1),
                Slot::Occupied { generation, .. } => *generation,
            };
            let id = Id::new(index, generation);
            self.slots[index as usize] = Slot::Occupied {
                generation,
                value: f(id),
            };
            return id;
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        let id = Id::new(index, 0);
        self.slots.push(Slot::Occupied {
            generation: 0,
            value: f(id),
        });
        id
    }

    /// Remove and return the entry. Stale ids return `None`.
    pub fn remove(&mut self, id: Id<M>) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        let vacant = Slot::Vacant {
            generation: id.generation,
        };
        let Slot::Occupied { value, .. } =
            std::mem::replace(&mut self.slots[id.index as usize], vacant)
        else {
            return None;
        };
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Borrow a live entry.
    #[must_use]
    pub fn get(&self, id: Id<M>) -> Option<&T> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow a live entry.
    pub fn get_mut(&mut self, id: Id<M>) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Whether `id` refers to a live entry.
    #[must_use]
    pub fn contains(&self, id: Id<M>) -> bool {
        self.get(id).is_some()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena has no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate live entries with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (Id<M>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((Id::new(index as u32, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Tag {}

    #[test]
    fn insert_get_remove() {
        let mut arena: Arena<Tag, &str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn reused_slot_rejects_stale_id() {
        let mut arena: Arena<Tag, u8> = Arena::new();
        let first = arena.insert(1);
        arena.remove(first);
        let second = arena.insert(2);
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&2));
    }

    #[test]
    fn insert_with_sees_final_id() {
        let mut arena: Arena<Tag, Option<Id<Tag>>> = Arena::new();
        let id = arena.insert_with(Some);
        assert_eq!(arena.get(id), Some(&Some(id)));
        arena.remove(id);
        let again = arena.insert_with(Some);
        assert_eq!(arena.get(again), Some(&Some(again)));
    }

    #[test]
    fn iter_skips_vacant_slots() {
        let mut arena: Arena<Tag, u8> = Arena::new();
        let ids: Vec<_> = (0..4).map(|v| arena.insert(v)).collect();
        arena.remove(ids[1]);
        let live: Vec<u8> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![0, 2, 3]);
    }
}
