// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Committing a finished work-in-progress tree.

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use super::Engine;
use crate::component::{Capabilities, TreeTypes};
use crate::effect::{EffectList, EffectOp, EffectSink};
use crate::error::FatalError;
use crate::host::Host;
use crate::lane::Lanes;
use crate::node::{EffectFlags, INVALID, InstanceId};
use crate::trace::CommitEvent;

impl<T: TreeTypes, H: Host, S: EffectSink<T>> Engine<T, H, S> {
    /// Makes the finished work-in-progress tree current.
    ///
    /// Builds the effect list, swaps the root, hands the list to the sink
    /// and collects every node no longer reachable.
    pub(super) fn commit_root(&mut self) -> Result<(), FatalError> {
        let finished = self.wip_root;
        if finished == INVALID || self.cursor.is_some() {
            return Err(FatalError::Invariant("commit without a finished render"));
        }
        let lanes = self.wip_lanes;
        self.flush_concurrent_updates();
        let f = finished as usize;
        let remaining = self.store.lanes[f] | self.store.child_lanes[f];
        self.lanes.mark_finished(remaining);

        let mut effects = EffectList {
            generation: self.generation + 1,
            lanes,
            effects: Vec::new(),
        };
        self.commit_mutations(finished, &mut effects);

        self.root = finished;
        self.wip_root = INVALID;
        self.wip_lanes = Lanes::NONE;
        self.generation += 1;
        if !effects.is_empty() {
            self.sink.apply(&self.store, &effects);
        }
        self.stats.commits += 1;
        let e = CommitEvent {
            generation: self.generation,
            lanes,
            effects: effects.len(),
            remaining,
            at: self.last_now,
        };
        self.tracer().commit(&e);
        self.store.collect_garbage(self.root);
        Ok(())
    }

    /// Walks the finished tree in pre-order, emitting effects and clearing
    /// per-render bookkeeping. Subtrees without flags are skipped.
    fn commit_mutations(&mut self, finished: u32, effects: &mut EffectList) {
        let mut stack = vec![finished];
        let mut children = Vec::new();
        while let Some(node) = stack.pop() {
            let n = node as usize;

            let deletions = mem::take(&mut self.store.deletions[n]);
            if !deletions.is_empty() {
                let parent = self.host_parent(node);
                for deleted in deletions {
                    self.emit_deletion(deleted, parent, effects);
                }
            }

            let flags = self.store.flags[n];
            if flags.contains(EffectFlags::PLACEMENT) {
                self.emit_placement(node, effects);
            }
            if flags.contains(EffectFlags::UPDATE) && self.is_host(node) {
                effects.push(node, self.store.instance[n], EffectOp::Update);
            }
            self.store.flags[n] = EffectFlags::empty();

            // The old copy no longer carries work the new one finished.
            let alt = self.store.alternate[n];
            if alt != INVALID {
                self.store.lanes[alt as usize] = self.store.lanes[n];
                self.store.child_lanes[alt as usize] = self.store.child_lanes[n];
            }

            if !self.store.subtree_flags[n].is_empty() {
                self.store.subtree_flags[n] = EffectFlags::empty();
                children.clear();
                let mut child = self.store.first_child[n];
                while child != INVALID {
                    children.push(child);
                    child = self.store.next_sibling[child as usize];
                }
                stack.extend(children.iter().rev());
            }
        }
    }

    /// Deletes the top-level host nodes of a removed subtree.
    fn emit_deletion(&self, deleted: u32, parent: Option<InstanceId>, effects: &mut EffectList) {
        let mut stack = vec![deleted];
        while let Some(node) = stack.pop() {
            if self.is_host(node) {
                let instance = self.store.instance[node as usize];
                effects.push(node, instance, EffectOp::Delete { parent });
            } else {
                self.push_children_reversed(node, &mut stack);
            }
        }
    }

    /// Inserts a new subtree, or moves an existing one, at `node`'s position.
    ///
    /// A new subtree is inserted host by host in pre-order, each nested host
    /// appended to its host parent. A moved subtree only moves its top-level
    /// hosts; anything newly placed inside it is handled when reached.
    fn emit_placement(&self, node: u32, effects: &mut EffectList) {
        let parent = self.host_parent(self.store.parent[node as usize]);
        let before = self.host_sibling(node);
        let fresh = self.store.alternate[node as usize] == INVALID;

        let mut stack = vec![(node, parent, true)];
        while let Some((n, host_parent, top)) = stack.pop() {
            let i = n as usize;
            if n != node && self.store.flags[i].contains(EffectFlags::PLACEMENT) {
                continue;
            }
            if !self.is_host(n) {
                let mut children = Vec::new();
                self.push_children_reversed(n, &mut children);
                stack.extend(children.into_iter().map(|c| (c, host_parent, top)));
                continue;
            }
            let instance = self.store.instance[i];
            if fresh {
                let before = if top { before } else { None };
                effects.push(
                    n,
                    instance,
                    EffectOp::Insert {
                        parent: host_parent,
                        before,
                    },
                );
                let mut children = Vec::new();
                self.push_children_reversed(n, &mut children);
                stack.extend(children.into_iter().map(|c| (c, Some(instance), false)));
            } else {
                effects.push(
                    n,
                    instance,
                    EffectOp::Move {
                        parent: host_parent,
                        before,
                    },
                );
            }
        }
    }

    /// The nearest host at or above `node`, or `None` for the root container.
    fn host_parent(&self, mut node: u32) -> Option<InstanceId> {
        while node != INVALID {
            if self.is_host(node) {
                return Some(self.store.instance[node as usize]);
            }
            node = self.store.parent[node as usize];
        }
        None
    }

    /// The first host node after `node` in the same host parent that is
    /// already in the target tree, to insert before.
    fn host_sibling(&self, node: u32) -> Option<InstanceId> {
        let s = &self.store;
        let mut node = node;
        'siblings: loop {
            while s.next_sibling[node as usize] == INVALID {
                let parent = s.parent[node as usize];
                if parent == INVALID
                    || s.parent[parent as usize] == INVALID
                    || self.is_host(parent)
                {
                    return None;
                }
                node = parent;
            }
            node = s.next_sibling[node as usize];
            while !self.is_host(node) {
                if s.flags[node as usize].contains(EffectFlags::PLACEMENT) {
                    continue 'siblings;
                }
                let child = s.first_child[node as usize];
                if child == INVALID {
                    continue 'siblings;
                }
                node = child;
            }
            if !s.flags[node as usize].contains(EffectFlags::PLACEMENT) {
                return Some(s.instance[node as usize]);
            }
        }
    }

    fn is_host(&self, node: u32) -> bool {
        self.registry
            .capabilities(self.store.kind[node as usize])
            .contains(Capabilities::HOST)
    }

    fn push_children_reversed(&self, node: u32, out: &mut Vec<u32>) {
        let start = out.len();
        let mut child = self.store.first_child[node as usize];
        while child != INVALID {
            out.push(child);
            child = self.store.next_sibling[child as usize];
        }
        out[start..].reverse();
    }
}
