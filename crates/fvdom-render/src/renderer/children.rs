#![forbid(unsafe_code)]

//! Child list reconciliation.
//!
//! Keyed lists go through five phases:
//!
//! 1. patch the common prefix (same type and key, left to right);
//! 2. patch the common suffix (right to left);
//! 3. if only new nodes remain, mount them;
//! 4. if only old nodes remain, unmount them;
//! 5. otherwise map the remaining old nodes onto new positions by key
//!    (keyless old nodes match the first unclaimed keyless new node of the
//!    same type), unmount the unmatched, then walk the new range from the
//!    end, mounting new nodes and moving every node not on the longest
//!    increasing subsequence of old positions.
//!
//! Phase 5 issues the minimum number of moves for the given match.

use ahash::AHashMap;

use crate::arena::NodeId;
use crate::error::Warning;
use crate::host::HostAdapter;
use crate::scene::{Key, SceneNode, is_same_type};
use crate::sequence::longest_increasing_subsequence;

use super::{PatchCtx, Renderer};

impl<H: HostAdapter> Renderer<H> {
    /// Patch by position; extra old nodes are unmounted, extra new ones
    /// mounted before `anchor`.
    pub(super) fn patch_unkeyed(
        &mut self,
        old: &[NodeId],
        new: &[SceneNode],
        container: &H::Handle,
        anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> Vec<NodeId> {
        let common = old.len().min(new.len());
        let mut out = Vec::with_capacity(new.len());
        for (prev, next) in old.iter().zip(new).take(common) {
            out.push(self.patch(Some(*prev), next, container, None, cx));
        }
        if old.len() > new.len() {
            self.unmount_children(&old[common..], true);
        } else {
            for next in &new[common..] {
                out.push(self.patch(None, next, container, anchor.clone(), cx));
            }
        }
        out
    }

    /// Five-phase keyed reconciliation.
    pub(super) fn patch_keyed(
        &mut self,
        old: &[NodeId],
        new: &[SceneNode],
        container: &H::Handle,
        parent_anchor: Option<H::Handle>,
        cx: PatchCtx,
    ) -> Vec<NodeId> {
        let _span = tracing::debug_span!("keyed_diff", old = old.len(), new = new.len()).entered();
        let mut out: Vec<Option<NodeId>> = vec![None; new.len()];
        let mut start = 0;
        let mut old_end = old.len();
        let mut new_end = new.len();

        // 1. common prefix
        while start < old_end && start < new_end && self.same_type(old[start], &new[start]) {
            out[start] = Some(self.patch(Some(old[start]), &new[start], container, None, cx));
            start += 1;
        }

        // 2. common suffix
        while start < old_end
            && start < new_end
            && self.same_type(old[old_end - 1], &new[new_end - 1])
        {
            out[new_end - 1] =
                Some(self.patch(Some(old[old_end - 1]), &new[new_end - 1], container, None, cx));
            old_end -= 1;
            new_end -= 1;
        }

        if start >= old_end {
            // 3. only additions
            if start < new_end {
                let anchor = self.anchor_after(&out, new_end, &parent_anchor);
                for j in start..new_end {
                    out[j] = Some(self.patch(None, &new[j], container, anchor.clone(), cx));
                }
            }
        } else if start >= new_end {
            // 4. only removals
            self.unmount_children(&old[start..old_end], true);
        } else {
            // 5. unknown sequence
            self.patch_unknown_range(
                old,
                new,
                &mut out,
                (start, old_end, new_end),
                container,
                &parent_anchor,
                cx,
            );
        }

        out.into_iter().flatten().collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn patch_unknown_range(
        &mut self,
        old: &[NodeId],
        new: &[SceneNode],
        out: &mut [Option<NodeId>],
        (start, old_end, new_end): (usize, usize, usize),
        container: &H::Handle,
        parent_anchor: &Option<H::Handle>,
        cx: PatchCtx,
    ) {
        let mut key_to_new: AHashMap<Key, usize> = AHashMap::with_capacity(new_end - start);
        for (j, node) in new.iter().enumerate().take(new_end).skip(start) {
            let Some(key) = node.key_ref() else { continue };
            if key_to_new.contains_key(key) {
                if self.config.warn_duplicate_keys {
                    self.diagnostics.warn(Warning::DuplicateKey { key: key.clone() });
                }
                continue;
            }
            key_to_new.insert(key.clone(), j);
        }

        let to_patch = new_end - start;
        let mut new_to_old = vec![0usize; to_patch];
        let mut patched = 0;
        let mut moved = false;
        let mut max_new_index = 0;

        for (k, &prev) in old.iter().enumerate().take(old_end).skip(start) {
            if patched >= to_patch {
                self.unmount(prev, true);
                continue;
            }
            let prev_key = self.nodes.get(prev).and_then(|n| n.vnode.key_ref().cloned());
            let new_index = match prev_key {
                Some(key) => key_to_new.get(&key).copied(),
                None => (start..new_end).find(|&j| {
                    new_to_old[j - start] == 0
                        && new[j].key_ref().is_none()
                        && self.same_type(prev, &new[j])
                }),
            };
            let Some(j) = new_index else {
                self.unmount(prev, true);
                continue;
            };
            if new_to_old[j - start] != 0 {
                // Slot already claimed by an earlier old node with this key.
                self.unmount(prev, true);
                continue;
            }
            new_to_old[j - start] = k + 1;
            if j >= max_new_index {
                max_new_index = j;
            } else {
                moved = true;
            }
            out[j] = Some(self.patch(Some(prev), &new[j], container, None, cx));
            patched += 1;
        }

        let stable = if moved {
            longest_increasing_subsequence(&new_to_old)
        } else {
            Vec::new()
        };
        let mut tail = stable.len();
        for offset in (0..to_patch).rev() {
            let j = start + offset;
            let anchor = self.anchor_after(out, j + 1, parent_anchor);
            if new_to_old[offset] == 0 {
                out[j] = Some(self.patch(None, &new[j], container, anchor, cx));
            } else if moved {
                if tail > 0 && stable[tail - 1] == offset {
                    tail -= 1;
                } else if let Some(id) = out[j] {
                    self.move_node(id, container, anchor.as_ref());
                    self.stats.moves += 1;
                }
            }
        }
    }

    /// Insertion anchor for position `index`: the first host node of the
    /// already placed node there, or the parent anchor past the end.
    fn anchor_after(
        &self,
        out: &[Option<NodeId>],
        index: usize,
        parent_anchor: &Option<H::Handle>,
    ) -> Option<H::Handle> {
        match out.get(index) {
            Some(Some(id)) => self.host_el(*id).or_else(|| parent_anchor.clone()),
            _ => parent_anchor.clone(),
        }
    }

    fn same_type(&self, old: NodeId, next: &SceneNode) -> bool {
        self.nodes
            .get(old)
            .is_some_and(|node| is_same_type(&node.vnode, next))
    }
}
