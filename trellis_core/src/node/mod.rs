// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node tree data model.
//!
//! A *node* is one physical copy of one logical tree position. Each node has:
//!
//! - An identity ([`NodeId`]), a generational handle that becomes stale when
//!   the slot is collected, plus an [`InstanceId`] shared by both copies of
//!   the same position.
//! - Topology: parent, first-child, and next-sibling links forming an ordered
//!   tree, plus `child_index` (position among siblings) and `alternate` (the
//!   other copy of the same position).
//! - Inputs and outputs: `pending_input` for the render in progress,
//!   `memoized_input` / `memoized_output` from the last completed render.
//! - Work bookkeeping: [`EffectFlags`], subtree flags, [`Lanes`](crate::lane::Lanes)
//!   with unprocessed work on the node and below it, state slots, pending
//!   child deletions, and the error captured by a boundary.
//!
//! Nodes are stored in struct-of-arrays layout with index-based links.
//!
//! # Double buffering
//!
//! The committed tree is never mutated by a render. Instead,
//! `build_alternate` produces (or recycles) the other copy of each visited
//! position and the render mutates that copy. Committing is an index swap
//! of the root; abandoned copies are recycled by a mark-and-sweep pass.

mod flags;
mod id;
mod store;
mod traverse;

pub use flags::EffectFlags;
pub use id::{INVALID, InstanceId, Key, KindId, NodeId};
pub use store::NodeStore;
pub use traverse::{Children, Descendants};
