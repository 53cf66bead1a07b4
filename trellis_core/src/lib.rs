// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental, interruptible tree reconciliation with cooperative priority
//! scheduling.
//!
//! `trellis_core` keeps a committed tree of nodes and, when updates arrive,
//! builds the next version of that tree one unit of work at a time. A render
//! can pause at any unit boundary, be resumed in a later host callback, or be
//! thrown away when something more urgent comes in. Only a finished tree is
//! committed, and a commit produces a single ordered [`EffectList`] that an
//! [`EffectSink`] applies to whatever concrete tree the nodes describe.
//!
//! It is `no_std` compatible (with `alloc`) and stores nodes struct-of-arrays
//! with index links and generational handles.
//!
//! # Architecture
//!
//! ```text
//!   enqueue_update / render
//!       │  lane marked on node and ancestors
//!       ▼
//!   WorkQueue ──► Host::request_callback
//!       │
//!       ▼  on_host_callback
//!   render: begin ─► children ─► complete   (yields at slice end)
//!       │
//!       ▼
//!   commit ──► EffectList ──► EffectSink::apply
//! ```
//!
//! **[`node`]**: Struct-of-arrays node store. Every tree position has at
//! most two physical nodes, the committed one and its work-in-progress
//! alternate.
//!
//! **[`lane`]**: Bitset priority lanes, per-root pending and expired sets,
//! and starvation timeouts.
//!
//! **[`state`]**: Per-node state slots with two-tier update queues. Updates
//! skipped by a render stay queued and replay in order later.
//!
//! **[`component`]**: The [`Component`] trait, elements and the
//! registry of component kinds.
//!
//! **[`scheduler`]**: A deadline-ordered task queue with delayed tasks and
//! time-sliced execution.
//!
//! **[`reconciler`]**: The [`Reconciler`] that ties it all together.
//!
//! **[`effect`]**: Effect lists and the [`EffectSink`] trait.
//!
//! **[`host`]**: The [`Host`] trait: a clock plus callback and timeout
//! requests.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! engine instrumentation, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-unit-of-work
//!   events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod component;
pub mod config;
pub mod effect;
pub mod error;
pub mod host;
pub mod lane;
pub mod node;
pub mod reconciler;
pub mod scheduler;
pub mod state;
pub mod time;
pub mod trace;

pub use component::{
    BuildContext, Capabilities, Component, CompleteContext, Element, Registry, TreeTypes,
};
pub use config::EngineConfig;
pub use effect::{Effect, EffectList, EffectOp, EffectSink};
pub use error::{BuildError, EngineError, FatalError};
pub use host::Host;
pub use lane::{Lanes, UpdatePriority};
pub use reconciler::{EnqueueOutcome, EngineStats, Reconciler};
pub use state::SlotRef;
pub use time::{Duration, HostTime};
