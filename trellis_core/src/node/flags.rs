// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node effect flags.

bitflags::bitflags! {
    /// Side effects recorded on a work-in-progress node.
    ///
    /// `PLACEMENT`, `UPDATE` and `CHILD_DELETION` become entries in the
    /// [`EffectList`](crate::effect::EffectList). `DID_CAPTURE` and
    /// `PERFORMED_WORK` only steer the render and are cleared at commit.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EffectFlags: u16 {
        /// The node is new, or an existing node that moved.
        const PLACEMENT = 1 << 0;
        /// A host node whose input or output changed.
        const UPDATE = 1 << 1;
        /// The node's `deletions` list is non-empty.
        const CHILD_DELETION = 1 << 2;
        /// An error boundary caught an error during this render.
        const DID_CAPTURE = 1 << 3;
        /// The node's component ran during this render.
        const PERFORMED_WORK = 1 << 4;
    }
}

impl EffectFlags {
    /// Flags that produce entries in the effect list.
    pub const MUTATION_MASK: Self = Self::PLACEMENT
        .union(Self::UPDATE)
        .union(Self::CHILD_DELETION);
}
