// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An effect sink that rebuilds the target tree in memory.

use std::collections::BTreeMap;

use trellis_core::component::{Capabilities, Registry, TreeTypes};
use trellis_core::effect::{EffectList, EffectOp, EffectSink};
use trellis_core::node::{INVALID, InstanceId, KindId, NodeId, NodeStore};

/// The mirror disagrees with the committed tree.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("children of {parent:?} differ: mirror has {mirror:?}, tree has {tree:?}")]
pub struct Mismatch {
    /// The host parent whose children differ, `None` for the container.
    pub parent: Option<InstanceId>,
    /// Children in the mirror.
    pub mirror: Vec<InstanceId>,
    /// Host children in the committed tree.
    pub tree: Vec<InstanceId>,
}

/// One host node in the mirrored target.
#[derive(Clone, Debug, PartialEq)]
pub struct MirrorNode<T: TreeTypes> {
    /// Component kind.
    pub kind: KindId,
    /// Input as of the last insert or update.
    pub input: Option<T::Input>,
    /// Output as of the last insert or update.
    pub output: T::Output,
    /// Host parent, `None` for the container.
    pub parent: Option<InstanceId>,
    /// Host children, in order.
    pub children: Vec<InstanceId>,
}

/// An [`EffectSink`] that applies effects to an in-memory tree keyed by
/// [`InstanceId`], and keeps every effect list it receives.
///
/// Effects that cannot apply (inserting a node twice, moving or deleting an
/// unknown node, an unknown parent) panic: they mean the effect list was
/// built wrong.
#[derive(Debug)]
pub struct MirrorSink<T: TreeTypes> {
    nodes: BTreeMap<InstanceId, MirrorNode<T>>,
    container: Vec<InstanceId>,
    log: Vec<EffectList>,
}

impl<T: TreeTypes> Default for MirrorSink<T> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            container: Vec::new(),
            log: Vec::new(),
        }
    }
}

impl<T: TreeTypes> MirrorSink<T> {
    /// An empty target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of host nodes in the target.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the target is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A host node.
    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&MirrorNode<T>> {
        self.nodes.get(&id)
    }

    /// Children of a host node, or of the container for `None`.
    #[must_use]
    pub fn children(&self, parent: Option<InstanceId>) -> &[InstanceId] {
        match parent {
            None => &self.container,
            Some(id) => self.nodes.get(&id).map_or(&[][..], |n| n.children.as_slice()),
        }
    }

    /// Outputs of the children of `parent`, in order.
    #[must_use]
    pub fn child_outputs(&self, parent: Option<InstanceId>) -> Vec<&T::Output> {
        self.children(parent)
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|n| &n.output))
            .collect()
    }

    /// Every effect list applied, oldest first.
    #[must_use]
    pub fn commits(&self) -> &[EffectList] {
        &self.log
    }

    /// The most recent effect list.
    #[must_use]
    pub fn last_commit(&self) -> Option<&EffectList> {
        self.log.last()
    }

    /// Counts effects in the most recent list that satisfy `pred`.
    #[must_use]
    pub fn count_last(&self, pred: impl Fn(&EffectOp) -> bool) -> usize {
        self.last_commit().map_or(0, |list| {
            list.effects.iter().filter(|e| pred(&e.op)).count()
        })
    }

    /// Compares the mirror against the committed tree under `root`.
    ///
    /// # Errors
    ///
    /// The first host parent whose children differ.
    pub fn verify(
        &self,
        store: &NodeStore<T>,
        registry: &Registry<T>,
        root: NodeId,
    ) -> Result<(), Mismatch> {
        let is_host =
            |idx: u32| registry.capabilities(store.kind_at(idx)).contains(Capabilities::HOST);
        let mut pending = vec![(None, root.index())];
        while let Some((parent, node)) = pending.pop() {
            let hosts = host_children(store, &is_host, node);
            let tree: Vec<_> = hosts.iter().map(|&h| store.instance_at(h)).collect();
            let mirror = self.children(parent);
            if mirror != tree.as_slice() {
                return Err(Mismatch {
                    parent,
                    mirror: mirror.to_vec(),
                    tree,
                });
            }
            for h in hosts {
                pending.push((Some(store.instance_at(h)), h));
            }
        }
        Ok(())
    }

    fn list_mut(&mut self, parent: Option<InstanceId>) -> &mut Vec<InstanceId> {
        match parent {
            None => &mut self.container,
            Some(id) => match self.nodes.get_mut(&id) {
                Some(node) => &mut node.children,
                None => panic!("unknown host parent {id:?}"),
            },
        }
    }

    fn attach(&mut self, id: InstanceId, parent: Option<InstanceId>, before: Option<InstanceId>) {
        let list = self.list_mut(parent);
        let at = match before {
            Some(b) => match list.iter().position(|&c| c == b) {
                Some(at) => at,
                None => panic!("insert before {b:?}, which is not a child of {parent:?}"),
            },
            None => list.len(),
        };
        list.insert(at, id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
    }

    fn detach(&mut self, id: InstanceId, parent: Option<InstanceId>) {
        let list = self.list_mut(parent);
        match list.iter().position(|&c| c == id) {
            Some(at) => {
                list.remove(at);
            }
            None => panic!("{id:?} is not a child of {parent:?}"),
        }
    }

    fn remove_subtree(&mut self, id: InstanceId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
        }
    }
}

impl<T: TreeTypes> EffectSink<T> for MirrorSink<T> {
    fn apply(&mut self, tree: &NodeStore<T>, effects: &EffectList) {
        for effect in &effects.effects {
            let id = effect.instance;
            match effect.op {
                EffectOp::Insert { parent, before } => {
                    assert!(!self.nodes.contains_key(&id), "{id:?} inserted twice");
                    self.nodes.insert(
                        id,
                        MirrorNode {
                            kind: tree.kind_at(effect.node),
                            input: tree.input_at(effect.node).cloned(),
                            output: tree.output_at(effect.node).clone(),
                            parent,
                            children: Vec::new(),
                        },
                    );
                    self.attach(id, parent, before);
                }
                EffectOp::Move { parent, before } => {
                    let old = match self.nodes.get(&id) {
                        Some(node) => node.parent,
                        None => panic!("moved {id:?}, which is not in the target"),
                    };
                    self.detach(id, old);
                    self.attach(id, parent, before);
                }
                EffectOp::Update => match self.nodes.get_mut(&id) {
                    Some(node) => {
                        node.input = tree.input_at(effect.node).cloned();
                        node.output = tree.output_at(effect.node).clone();
                    }
                    None => panic!("updated {id:?}, which is not in the target"),
                },
                EffectOp::Delete { parent } => {
                    self.detach(id, parent);
                    self.remove_subtree(id);
                }
            }
        }
        self.log.push(effects.clone());
    }
}

/// Top-level host descendants of `node`, in order.
fn host_children<T: TreeTypes>(
    store: &NodeStore<T>,
    is_host: &impl Fn(u32) -> bool,
    node: u32,
) -> Vec<u32> {
    let mut out = Vec::new();
    let mut stack = Vec::new();
    let mut child = store.first_child_at(node);
    while child != INVALID {
        stack.push(child);
        child = store.next_sibling_at(child);
    }
    stack.reverse();
    while let Some(n) = stack.pop() {
        if is_host(n) {
            out.push(n);
            continue;
        }
        let start = stack.len();
        let mut child = store.first_child_at(n);
        while child != INVALID {
            stack.push(child);
            child = store.next_sibling_at(child);
        }
        stack[start..].reverse();
    }
    out
}
