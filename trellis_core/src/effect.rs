// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Effect lists produced by a commit, and the sink that applies them.
//!
//! Only nodes whose component has [`Capabilities::HOST`] appear in an
//! effect list. Other nodes are transparent: inserting, moving or deleting
//! one of them is expressed as the same operation on each of its top-level
//! host descendants.
//!
//! Positions are expressed with [`InstanceId`]s, which are stable across
//! commits. A `parent` of `None` means the sink's root container. A `before`
//! of `None` means "append".
//!
//! Within one list, effects are ordered so that applying them front to back
//! is always valid: a node's child deletions come first, then its own
//! placement, then its own update, then the effects of its children.
//!
//! [`Capabilities::HOST`]: crate::component::Capabilities::HOST

use alloc::vec::Vec;

use crate::component::TreeTypes;
use crate::lane::Lanes;
use crate::node::{InstanceId, NodeStore};

/// One operation on the target tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectOp {
    /// Insert a node that is not in the target tree yet.
    Insert {
        /// Host parent, or `None` for the root container.
        parent: Option<InstanceId>,
        /// Host sibling to insert before, or `None` to append.
        before: Option<InstanceId>,
    },
    /// Move a node that is already in the target tree.
    Move {
        /// Host parent, or `None` for the root container.
        parent: Option<InstanceId>,
        /// Host sibling to move before, or `None` to append.
        before: Option<InstanceId>,
    },
    /// The node's input or output changed.
    Update,
    /// Remove the node and everything below it.
    Delete {
        /// Host parent, or `None` for the root container.
        parent: Option<InstanceId>,
    },
}

/// One effect on one host node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Effect {
    /// Raw store index of the node. Valid for reads during
    /// [`EffectSink::apply`]; deleted nodes are collected right after.
    pub node: u32,
    /// Stable identity of the node.
    pub instance: InstanceId,
    /// The operation.
    pub op: EffectOp,
}

/// Everything one commit changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectList {
    /// Generation number of the commit.
    pub generation: u64,
    /// Lanes the commit rendered.
    pub lanes: Lanes,
    /// Effects in application order.
    pub effects: Vec<Effect>,
}

impl EffectList {
    /// Returns whether the commit changed nothing in the target tree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of effects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub(crate) fn push(&mut self, node: u32, instance: InstanceId, op: EffectOp) {
        self.effects.push(Effect { node, instance, op });
    }
}

/// Applies effect lists to a concrete target.
pub trait EffectSink<T: TreeTypes> {
    /// Called once per commit with a non-empty effect list.
    ///
    /// `tree` is the freshly committed tree; every node named in `effects`
    /// can be read through its raw-index accessors.
    fn apply(&mut self, tree: &NodeStore<T>, effects: &EffectList);
}

/// An [`EffectSink`] that ignores every effect.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl<T: TreeTypes> EffectSink<T> for NullSink {
    fn apply(&mut self, tree: &NodeStore<T>, effects: &EffectList) {
        _ = (tree, effects);
    }
}
