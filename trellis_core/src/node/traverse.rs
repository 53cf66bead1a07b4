// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use crate::component::TreeTypes;

use super::id::{INVALID, NodeId};
use super::store::NodeStore;

/// An iterator over the direct children of a node.
///
/// Created by [`NodeStore::children`].
pub struct Children<'a, T: TreeTypes> {
    store: &'a NodeStore<T>,
    current: u32,
}

impl<T: TreeTypes> core::fmt::Debug for Children<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Children")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl<'a, T: TreeTypes> Children<'a, T> {
    pub(crate) fn new(store: &'a NodeStore<T>, first: u32) -> Self {
        Self {
            store,
            current: first,
        }
    }
}

impl<T: TreeTypes> Iterator for Children<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store.next_sibling[idx as usize];
        Some(NodeId {
            idx,
            generation: self.store.generation[idx as usize],
        })
    }
}

/// Pre-order iterator over the raw indices of a subtree, root included.
///
/// Created by [`NodeStore::descendants_at`].
pub struct Descendants<'a, T: TreeTypes> {
    store: &'a NodeStore<T>,
    root: u32,
    next: u32,
}

impl<T: TreeTypes> core::fmt::Debug for Descendants<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Descendants")
            .field("root", &self.root)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

impl<T: TreeTypes> Iterator for Descendants<'_, T> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let idx = self.next;
        if idx == INVALID {
            return None;
        }
        let s = self.store;
        self.next = if s.first_child[idx as usize] != INVALID {
            s.first_child[idx as usize]
        } else {
            let mut n = idx;
            loop {
                if n == self.root {
                    break INVALID;
                }
                if s.next_sibling[n as usize] != INVALID {
                    break s.next_sibling[n as usize];
                }
                n = s.parent[n as usize];
                if n == INVALID {
                    break INVALID;
                }
            }
        };
        Some(idx)
    }
}

impl<T: TreeTypes> NodeStore<T> {
    /// Returns a pre-order iterator over the raw indices of the subtree
    /// rooted at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn descendants_at(&self, idx: u32) -> Descendants<'_, T> {
        assert!(
            idx < self.len && self.alive[idx as usize],
            "node index {idx} out of bounds or freed"
        );
        Descendants {
            store: self,
            root: idx,
            next: idx,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::node::KindId;

    struct Unit;

    impl TreeTypes for Unit {
        type Input = u8;
        type Output = ();
    }

    #[test]
    fn descendants_walk_pre_order_and_stay_in_subtree() {
        let mut store = NodeStore::<Unit>::new();
        let root = store.create_node(KindId::ROOT, None, None);
        let a = store.create_node(KindId(1), None, Some(0));
        let a1 = store.create_node(KindId(1), None, Some(1));
        let a2 = store.create_node(KindId(1), None, Some(2));
        let b = store.create_node(KindId(1), None, Some(3));

        store.first_child[root as usize] = a;
        store.parent[a as usize] = root;
        store.next_sibling[a as usize] = b;
        store.parent[b as usize] = root;
        store.first_child[a as usize] = a1;
        store.parent[a1 as usize] = a;
        store.next_sibling[a1 as usize] = a2;
        store.parent[a2 as usize] = a;

        let all: Vec<u32> = store.descendants_at(root).collect();
        assert_eq!(all, [root, a, a1, a2, b]);

        let sub: Vec<u32> = store.descendants_at(a).collect();
        assert_eq!(sub, [a, a1, a2], "sibling of the subtree root is excluded");
    }
}
