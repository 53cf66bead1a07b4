// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays node storage with double buffering and collection.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use crate::component::TreeTypes;
use crate::error::CapturedError;
use crate::lane::Lanes;
use crate::state::Slot;

use super::flags::EffectFlags;
use super::id::{INVALID, InstanceId, Key, KindId, NodeId};
use super::traverse::Children;

/// Struct-of-arrays storage for every physical node.
///
/// Each logical tree position occupies at most two slots: the committed
/// (current) copy and its work-in-progress alternate. Slots that become
/// unreachable from the committed root are recycled through a free list by
/// [`collect_garbage`](Self::collect_garbage), and generation counters make
/// old [`NodeId`] handles detectably stale.
pub struct NodeStore<T: TreeTypes> {
    // -- Identity --
    pub(crate) kind: Vec<KindId>,
    pub(crate) key: Vec<Option<Key>>,
    pub(crate) instance: Vec<InstanceId>,

    // -- Inputs and outputs --
    pub(crate) pending_input: Vec<Option<T::Input>>,
    pub(crate) memoized_input: Vec<Option<T::Input>>,
    pub(crate) memoized_output: Vec<T::Output>,

    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) child_index: Vec<u32>,
    pub(crate) alternate: Vec<u32>,

    // -- Work bookkeeping --
    pub(crate) flags: Vec<EffectFlags>,
    pub(crate) subtree_flags: Vec<EffectFlags>,
    pub(crate) lanes: Vec<Lanes>,
    pub(crate) child_lanes: Vec<Lanes>,
    pub(crate) state: Vec<Vec<Slot>>,
    pub(crate) deletions: Vec<Vec<u32>>,
    pub(crate) captured: Vec<Option<Rc<CapturedError>>>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,
    next_instance: u64,
}

impl<T: TreeTypes> fmt::Debug for NodeStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStore")
            .field("len", &self.len)
            .field("live", &self.live_count())
            .finish_non_exhaustive()
    }
}

impl<T: TreeTypes> Default for NodeStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TreeTypes> NodeStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: Vec::new(),
            key: Vec::new(),
            instance: Vec::new(),
            pending_input: Vec::new(),
            memoized_input: Vec::new(),
            memoized_output: Vec::new(),
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            child_index: Vec::new(),
            alternate: Vec::new(),
            flags: Vec::new(),
            subtree_flags: Vec::new(),
            lanes: Vec::new(),
            child_lanes: Vec::new(),
            state: Vec::new(),
            deletions: Vec::new(),
            captured: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            next_instance: 0,
        }
    }

    // -- Allocation --

    /// Allocates a fresh node for a new tree position.
    pub(crate) fn create_node(
        &mut self,
        kind: KindId,
        key: Option<Key>,
        input: Option<T::Input>,
    ) -> u32 {
        let instance = InstanceId(self.next_instance);
        self.next_instance += 1;

        if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.generation[i] += 1;
            self.kind[i] = kind;
            self.key[i] = key;
            self.instance[i] = instance;
            self.pending_input[i] = input;
            self.memoized_input[i] = None;
            self.memoized_output[i] = T::Output::default();
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.child_index[i] = 0;
            self.alternate[i] = INVALID;
            self.flags[i] = EffectFlags::empty();
            self.subtree_flags[i] = EffectFlags::empty();
            self.lanes[i] = Lanes::NONE;
            self.child_lanes[i] = Lanes::NONE;
            self.state[i].clear();
            self.deletions[i].clear();
            self.captured[i] = None;
            self.alive[i] = true;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.kind.push(kind);
            self.key.push(key);
            self.instance.push(instance);
            self.pending_input.push(input);
            self.memoized_input.push(None);
            self.memoized_output.push(T::Output::default());
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.child_index.push(0);
            self.alternate.push(INVALID);
            self.flags.push(EffectFlags::empty());
            self.subtree_flags.push(EffectFlags::empty());
            self.lanes.push(Lanes::NONE);
            self.child_lanes.push(Lanes::NONE);
            self.state.push(Vec::new());
            self.deletions.push(Vec::new());
            self.captured.push(None);
            self.generation.push(0);
            self.alive.push(true);
            idx
        }
    }

    /// Returns the work-in-progress copy of `current`, ready to be mutated
    /// without touching the committed tree.
    ///
    /// The alternate is allocated and linked on first use and reused on
    /// every later render, so a position never holds more than two slots.
    /// Diffing state (children, memoized values, lanes, state slots, captured
    /// error) is copied over from `current`; per-render bookkeeping (flags,
    /// deletions) is cleared.
    pub(crate) fn build_alternate(&mut self, current: u32, input: Option<T::Input>) -> u32 {
        let c = current as usize;
        let mut alt = self.alternate[c];
        if alt == INVALID {
            alt = self.create_node(self.kind[c], self.key[c].clone(), input);
            let a = alt as usize;
            // Both copies share one stable identity.
            self.instance[a] = self.instance[c];
            self.alternate[a] = current;
            self.alternate[c] = alt;
        } else {
            let a = alt as usize;
            self.pending_input[a] = input;
            self.flags[a] = EffectFlags::empty();
            self.subtree_flags[a] = EffectFlags::empty();
            self.deletions[a].clear();
        }

        let a = alt as usize;
        self.parent[a] = self.parent[c];
        self.first_child[a] = self.first_child[c];
        self.next_sibling[a] = INVALID;
        self.child_index[a] = self.child_index[c];
        self.lanes[a] = self.lanes[c];
        self.child_lanes[a] = self.child_lanes[c];
        let (src, dst) = pair_mut(&mut self.captured, c, a);
        dst.clone_from(src);
        let (src, dst) = pair_mut(&mut self.memoized_input, c, a);
        dst.clone_from(src);
        let (src, dst) = pair_mut(&mut self.memoized_output, c, a);
        dst.clone_from(src);
        let (src, dst) = pair_mut(&mut self.state, c, a);
        dst.clone_from(src);
        alt
    }

    /// Frees every slot that is not reachable from `root` (or the alternate
    /// of a reachable node) and returns how many were freed.
    ///
    /// Only called when no render is in progress. Surviving alternates are
    /// dormant afterwards: their links mirror their committed counterpart so
    /// that no live node points at a freed slot.
    pub(crate) fn collect_garbage(&mut self, root: u32) -> usize {
        let mut reached = alloc::vec![false; self.len as usize];
        let mut marked = alloc::vec![false; self.len as usize];
        let mut stack = Vec::new();
        if root != INVALID {
            stack.push(root);
        }
        while let Some(idx) = stack.pop() {
            let i = idx as usize;
            if reached[i] {
                continue;
            }
            reached[i] = true;
            marked[i] = true;
            let alt = self.alternate[i];
            if alt != INVALID {
                marked[alt as usize] = true;
            }
            let mut child = self.first_child[i];
            while child != INVALID {
                stack.push(child);
                child = self.next_sibling[child as usize];
            }
        }

        let mut freed = 0;
        for idx in 0..self.len {
            let i = idx as usize;
            if !self.alive[i] {
                continue;
            }
            if !marked[i] {
                self.free(idx);
                freed += 1;
            } else if !reached[i] {
                let c = self.alternate[i] as usize;
                self.parent[i] = self.parent[c];
                self.first_child[i] = self.first_child[c];
                self.next_sibling[i] = INVALID;
            }
        }
        freed
    }

    fn free(&mut self, idx: u32) {
        let i = idx as usize;
        self.alive[i] = false;
        // Bump generation so old handles immediately fail validation.
        self.generation[i] += 1;
        self.alternate[i] = INVALID;
        self.pending_input[i] = None;
        self.memoized_input[i] = None;
        self.memoized_output[i] = T::Output::default();
        self.state[i].clear();
        self.deletions[i].clear();
        self.captured[i] = None;
        self.free_list.push(idx);
    }

    // -- Handles --

    /// Returns whether the given handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        id.idx < self.len
            && self.alive[id.idx as usize]
            && self.generation[id.idx as usize] == id.generation
    }

    /// Returns the handle for a live slot index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn node_id(&self, idx: u32) -> NodeId {
        self.check_index(idx);
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Number of allocated slots, live or free.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns whether no slot was ever allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live physical nodes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|alive| **alive).count()
    }

    // -- Query API (handles) --

    /// Returns the parent of a node, or `None` for a root.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        let p = self.parent[id.idx as usize];
        (p != INVALID).then(|| self.node_id(p))
    }

    /// Returns an iterator over the direct children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Children<'_, T> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Returns the other physical copy of a node's position, if allocated.
    #[must_use]
    pub fn alternate(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        let alt = self.alternate[id.idx as usize];
        (alt != INVALID).then(|| self.node_id(alt))
    }

    /// Returns the component kind of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> KindId {
        self.validate(id);
        self.kind[id.idx as usize]
    }

    /// Returns the lanes with unprocessed work on a node.
    #[must_use]
    pub fn lanes(&self, id: NodeId) -> Lanes {
        self.validate(id);
        self.lanes[id.idx as usize]
    }

    /// Returns the union of lanes with unprocessed work below a node.
    #[must_use]
    pub fn child_lanes(&self, id: NodeId) -> Lanes {
        self.validate(id);
        self.child_lanes[id.idx as usize]
    }

    /// Returns the effect flags currently recorded on a node.
    #[must_use]
    pub fn flags(&self, id: NodeId) -> EffectFlags {
        self.validate(id);
        self.flags[id.idx as usize]
    }

    // -- Query API (raw indices, for effect sinks) --

    /// Returns the kind at a raw slot index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn kind_at(&self, idx: u32) -> KindId {
        self.check_index(idx);
        self.kind[idx as usize]
    }

    /// Returns the key at a raw slot index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn key_at(&self, idx: u32) -> Option<&Key> {
        self.check_index(idx);
        self.key[idx as usize].as_ref()
    }

    /// Returns the stable instance id at a raw slot index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn instance_at(&self, idx: u32) -> InstanceId {
        self.check_index(idx);
        self.instance[idx as usize]
    }

    /// Returns the input the node was last built with.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn input_at(&self, idx: u32) -> Option<&T::Input> {
        self.check_index(idx);
        self.memoized_input[idx as usize].as_ref()
    }

    /// Returns the output the node last completed with.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn output_at(&self, idx: u32) -> &T::Output {
        self.check_index(idx);
        &self.memoized_output[idx as usize]
    }

    /// Returns the parent index at a raw slot index ([`INVALID`] for roots).
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn parent_at(&self, idx: u32) -> u32 {
        self.check_index(idx);
        self.parent[idx as usize]
    }

    /// Returns the first child index at a raw slot index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn first_child_at(&self, idx: u32) -> u32 {
        self.check_index(idx);
        self.first_child[idx as usize]
    }

    /// Returns the next sibling index at a raw slot index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds or refers to a freed slot.
    #[must_use]
    pub fn next_sibling_at(&self, idx: u32) -> u32 {
        self.check_index(idx);
        self.next_sibling[idx as usize]
    }

    // -- Validation --

    fn validate(&self, id: NodeId) {
        assert!(
            self.is_alive(id),
            "stale NodeId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    fn check_index(&self, idx: u32) {
        assert!(
            idx < self.len && self.alive[idx as usize],
            "node index {idx} out of bounds or freed (len {})",
            self.len
        );
    }
}

/// Borrows element `src` immutably and element `dst` mutably.
fn pair_mut<V>(v: &mut [V], src: usize, dst: usize) -> (&V, &mut V) {
    assert!(src != dst, "source and destination must differ");
    if src < dst {
        let (lo, hi) = v.split_at_mut(dst);
        (&lo[src], &mut hi[0])
    } else {
        let (lo, hi) = v.split_at_mut(src);
        (&hi[0], &mut lo[dst])
    }
}
