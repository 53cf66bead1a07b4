// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! - [`BuildError`] is raised while building a node. It is recoverable: the
//!   nearest error-boundary ancestor captures it as a [`CapturedError`].
//! - [`FatalError`] aborts a render. The committed tree stays as it was and
//!   the effect sink is not called.
//! - [`EngineError`] reports misuse of the public API outside of a render.

use alloc::string::String;

use crate::lane::Lanes;
use crate::node::{Key, KindId, NodeId};

/// An error raised while building a node.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A component reported a failure.
    #[error("{0}")]
    Failed(String),
    /// A state slot was requested at an index other than the next one.
    #[error("state slot {got} requested out of order (expected {expected})")]
    SlotOrder {
        /// The index the node expected next.
        expected: usize,
        /// The index that was requested.
        got: usize,
    },
    /// A rebuild requested a slot that the first build never created.
    #[error("state slot {index} does not exist on this node")]
    SlotMissing {
        /// The requested index.
        index: usize,
    },
    /// A slot was requested with a different state or action type.
    #[error("state slot {index} was requested with a different type")]
    SlotType {
        /// The requested index.
        index: usize,
    },
    /// A rebuild touched fewer slots than the node owns.
    #[error("build touched {touched} state slots but the node owns {owned}")]
    SlotCount {
        /// Slots requested during this build.
        touched: usize,
        /// Slots the node owns.
        owned: usize,
    },
    /// Two children of the same parent share a key.
    #[error("duplicate key {key:?} among siblings")]
    DuplicateKey {
        /// The repeated key.
        key: Key,
    },
    /// An element referenced a kind the registry does not know.
    #[error("unknown component kind {0:?}")]
    UnknownKind(KindId),
}

impl BuildError {
    /// Convenience constructor for [`BuildError::Failed`].
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A [`BuildError`] held by the error boundary that caught it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedError {
    /// The error that was raised.
    pub error: BuildError,
    /// The kind of the node that raised it.
    pub source_kind: KindId,
}

/// An error that aborts a render.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    /// A build error with no error boundary above it.
    #[error("uncaught error in `{component}`: {error}")]
    Uncaught {
        /// Name of the component that raised the error.
        component: String,
        /// The error itself.
        error: BuildError,
    },
    /// A render was requested for a lane set the engine never assigns.
    #[error("malformed lane set {0:?}")]
    InvalidLanes(Lanes),
    /// Internal bookkeeping was found inconsistent.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}

/// Misuse of the engine's public API.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The node behind a slot handle no longer exists.
    #[error("node {0:?} no longer exists")]
    StaleNode(NodeId),
    /// The node owns no slot at this index.
    #[error("node has no state slot {index}")]
    SlotIndex {
        /// The slot's index.
        index: u32,
    },
    /// The action does not match the slot's reducer.
    #[error("action type does not match the reducer of slot {index}")]
    ActionType {
        /// The slot's index.
        index: u32,
    },
}
