// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Child reconciliation: matching a node's new child elements against its
//! committed children.
//!
//! Matching is by key when a key is present and by position otherwise. A
//! match with the same kind reuses the committed child's alternate, so its
//! state survives; anything else creates a fresh node and deletes the old
//! one. Reused children whose committed position is left of the rightmost
//! child already kept in place are flagged for a move, which keeps the
//! number of moves small for the common reorderings.

use alloc::collections::{BTreeMap, BTreeSet};

use super::Engine;
use crate::component::{Element, TreeTypes};
use crate::effect::EffectSink;
use crate::error::BuildError;
use crate::host::Host;
use crate::node::{EffectFlags, INVALID, Key};

/// How a remaining old child is looked up.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ChildKey {
    Key(Key),
    Index(u32),
}

/// The new child list being linked together.
struct ChildList {
    parent: u32,
    tracking: bool,
    first: u32,
    last: u32,
    last_placed: u32,
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "child counts are bounded by the u32 node index space"
)]
const fn index_u32(index: usize) -> u32 {
    index as u32
}

impl<T: TreeTypes, H: Host, S: EffectSink<T>> Engine<T, H, S> {
    /// Rebuilds the child list of `wip` from `elements`.
    ///
    /// On a node being mounted nothing is tracked: children are created
    /// without placement flags because the whole subtree is inserted at once.
    pub(super) fn reconcile_children(
        &mut self,
        wip: u32,
        elements: &[Element<T>],
    ) -> Result<(), BuildError> {
        let mut keys = BTreeSet::new();
        for element in elements {
            if self.registry.get(element.kind).is_none() {
                return Err(BuildError::UnknownKind(element.kind));
            }
            if let Some(key) = &element.key {
                if !keys.insert(key) {
                    return Err(BuildError::DuplicateKey { key: key.clone() });
                }
            }
        }

        let current = self.store.alternate[wip as usize];
        let tracking = current != INVALID;
        let mut old = if tracking {
            self.store.first_child[current as usize]
        } else {
            INVALID
        };
        let mut list = ChildList {
            parent: wip,
            tracking,
            first: INVALID,
            last: INVALID,
            last_placed: 0,
        };

        // Walk both lists while the keys line up.
        let mut next = 0;
        while old != INVALID && next < elements.len() {
            let element = &elements[next];
            if self.store.key[old as usize] != element.key {
                break;
            }
            let following = self.store.next_sibling[old as usize];
            let child = self.update_child(wip, old, element);
            self.place_child(&mut list, child, next);
            old = following;
            next += 1;
        }

        if next == elements.len() {
            while old != INVALID {
                let following = self.store.next_sibling[old as usize];
                self.delete_child(wip, old);
                old = following;
            }
        } else if old == INVALID {
            for (index, element) in elements.iter().enumerate().skip(next) {
                let child = self.create_child(element);
                self.place_child(&mut list, child, index);
            }
        } else {
            let mut existing = BTreeMap::new();
            while old != INVALID {
                let o = old as usize;
                let key = match &self.store.key[o] {
                    Some(key) => ChildKey::Key(key.clone()),
                    None => ChildKey::Index(self.store.child_index[o]),
                };
                existing.insert(key, old);
                old = self.store.next_sibling[o];
            }
            for (index, element) in elements.iter().enumerate().skip(next) {
                let lookup = match &element.key {
                    Some(key) => ChildKey::Key(key.clone()),
                    None => ChildKey::Index(index_u32(index)),
                };
                let child = match existing.remove(&lookup) {
                    Some(matched) => self.update_child(wip, matched, element),
                    None => self.create_child(element),
                };
                self.place_child(&mut list, child, index);
            }
            for leftover in existing.into_values() {
                self.delete_child(wip, leftover);
            }
        }

        self.store.first_child[wip as usize] = list.first;
        Ok(())
    }

    /// Reuses `old` for `element` when the kinds agree, otherwise replaces it.
    fn update_child(&mut self, wip: u32, old: u32, element: &Element<T>) -> u32 {
        if self.store.kind[old as usize] == element.kind {
            self.store
                .build_alternate(old, Some(element.input.clone()))
        } else {
            self.delete_child(wip, old);
            self.create_child(element)
        }
    }

    fn create_child(&mut self, element: &Element<T>) -> u32 {
        self.store.create_node(
            element.kind,
            element.key.clone(),
            Some(element.input.clone()),
        )
    }

    fn delete_child(&mut self, wip: u32, old: u32) {
        if self.store.alternate[wip as usize] == INVALID {
            return;
        }
        let w = wip as usize;
        self.store.deletions[w].push(old);
        self.store.flags[w] |= EffectFlags::CHILD_DELETION;
    }

    fn place_child(&mut self, list: &mut ChildList, child: u32, index: usize) {
        let c = child as usize;
        if list.tracking {
            let current = self.store.alternate[c];
            if current == INVALID {
                self.store.flags[c] |= EffectFlags::PLACEMENT;
            } else {
                let old_index = self.store.child_index[current as usize];
                if old_index < list.last_placed {
                    self.store.flags[c] |= EffectFlags::PLACEMENT;
                } else {
                    list.last_placed = old_index;
                }
            }
        }
        self.store.child_index[c] = index_u32(index);
        self.store.parent[c] = list.parent;
        self.store.next_sibling[c] = INVALID;

        if list.last == INVALID {
            list.first = child;
        } else {
            self.store.next_sibling[list.last as usize] = child;
        }
        list.last = child;
    }
}
