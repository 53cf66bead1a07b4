// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the work loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! the reconciler calls as it schedules, renders and commits. All method
//! bodies default to no-ops, so implementing only the events you care about
//! is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates per-node [`UnitOfWorkEvent`]s
//!   plus the corresponding `TraceSink` method.

use alloc::rc::Rc;
use core::cell::RefCell;

#[cfg(feature = "trace-rich")]
use crate::node::{KindId, NodeId};
use crate::lane::Lanes;
use crate::scheduler::{Priority, TaskHandle};
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which half of a unit of work ran.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkPhase {
    /// The node's component produced its children.
    Begin,
    /// The node's input and lanes matched; its component was skipped.
    Bailout,
    /// The node's output was derived from its children.
    Complete,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a task is added to the work queue.
#[derive(Clone, Copy, Debug)]
pub struct TaskScheduledEvent {
    /// The new task.
    pub task: TaskHandle,
    /// Its scheduling class.
    pub priority: Priority,
    /// Host time of scheduling.
    pub at: HostTime,
}

/// Emitted when the work queue runs a task.
#[derive(Clone, Copy, Debug)]
pub struct TaskRunEvent {
    /// The running task.
    pub task: TaskHandle,
    /// Its scheduling class.
    pub priority: Priority,
    /// Whether the task had expired.
    pub did_timeout: bool,
    /// Host time the task started running.
    pub at: HostTime,
}

/// Emitted when a fresh work-in-progress tree is started.
#[derive(Clone, Copy, Debug)]
pub struct RenderBeginEvent {
    /// Lanes being rendered.
    pub lanes: Lanes,
    /// Whether the render runs without yielding.
    pub sync: bool,
    /// Host time.
    pub at: HostTime,
}

/// Emitted when a render pauses at the end of a slice.
#[derive(Clone, Copy, Debug)]
pub struct YieldEvent {
    /// Lanes being rendered.
    pub lanes: Lanes,
    /// Units of work performed in this slice.
    pub units: u32,
    /// Host time.
    pub at: HostTime,
}

/// Emitted when an in-progress render is discarded for more urgent work.
#[derive(Clone, Copy, Debug)]
pub struct InterruptEvent {
    /// Lanes of the discarded render.
    pub discarded: Lanes,
    /// Lanes of the render replacing it.
    pub next: Lanes,
    /// Host time.
    pub at: HostTime,
}

/// Emitted when the work-in-progress tree is complete and ready to commit.
#[derive(Clone, Copy, Debug)]
pub struct RenderCompleteEvent {
    /// Lanes rendered.
    pub lanes: Lanes,
    /// Host time.
    pub at: HostTime,
}

/// Emitted after a commit.
#[derive(Clone, Copy, Debug)]
pub struct CommitEvent {
    /// Generation number of the new tree.
    pub generation: u64,
    /// Lanes committed.
    pub lanes: Lanes,
    /// Number of effects handed to the sink.
    pub effects: usize,
    /// Lanes still pending after the commit.
    pub remaining: Lanes,
    /// Host time.
    pub at: HostTime,
}

/// Emitted when an update is absorbed without scheduling a render.
#[derive(Clone, Copy, Debug)]
pub struct EagerBailoutEvent {
    /// Raw index of the node owning the slot.
    pub node: u32,
    /// The slot's index.
    pub slot: u32,
    /// Host time.
    pub at: HostTime,
}

/// Emitted when a delayed update is dropped because its node is gone.
#[derive(Clone, Copy, Debug)]
pub struct UpdateDroppedEvent {
    /// Raw index the node had when the update was scheduled.
    pub node: u32,
    /// The slot's index.
    pub slot: u32,
    /// Host time.
    pub at: HostTime,
}

/// Emitted when starving lanes are promoted to expired.
#[derive(Clone, Copy, Debug)]
pub struct LaneExpiredEvent {
    /// Lanes promoted by this check.
    pub lanes: Lanes,
    /// Host time.
    pub at: HostTime,
}

/// Emitted when an error boundary captures a build error.
#[derive(Clone, Copy, Debug)]
pub struct ErrorCapturedEvent {
    /// Raw index of the boundary node.
    pub boundary: u32,
    /// Raw index of the node that failed.
    pub source: u32,
    /// Lanes being rendered.
    pub lanes: Lanes,
    /// Host time.
    pub at: HostTime,
}

/// Emitted when a render is aborted by a fatal error.
#[derive(Clone, Copy, Debug)]
pub struct FatalErrorEvent {
    /// Lanes dropped from the pending set.
    pub lanes: Lanes,
    /// Host time.
    pub at: HostTime,
}

/// One begin, bailout or complete step.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct UnitOfWorkEvent {
    /// The node worked on.
    pub node: NodeId,
    /// Its component kind.
    pub kind: KindId,
    /// Which step ran.
    pub phase: WorkPhase,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the reconciler.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a task is scheduled.
    fn on_task_scheduled(&mut self, e: &TaskScheduledEvent) {
        _ = e;
    }

    /// Called when a task starts running.
    fn on_task_run(&mut self, e: &TaskRunEvent) {
        _ = e;
    }

    /// Called when a fresh render starts.
    fn on_render_begin(&mut self, e: &RenderBeginEvent) {
        _ = e;
    }

    /// Called when a render yields to the host.
    fn on_yield(&mut self, e: &YieldEvent) {
        _ = e;
    }

    /// Called when a render is discarded for more urgent work.
    fn on_interrupt(&mut self, e: &InterruptEvent) {
        _ = e;
    }

    /// Called when a render completes.
    fn on_render_complete(&mut self, e: &RenderCompleteEvent) {
        _ = e;
    }

    /// Called after a commit.
    fn on_commit(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called when an update bails out eagerly.
    fn on_eager_bailout(&mut self, e: &EagerBailoutEvent) {
        _ = e;
    }

    /// Called when a delayed update is dropped.
    fn on_update_dropped(&mut self, e: &UpdateDroppedEvent) {
        _ = e;
    }

    /// Called when lanes are promoted to expired.
    fn on_lane_expired(&mut self, e: &LaneExpiredEvent) {
        _ = e;
    }

    /// Called when an error boundary captures an error.
    fn on_error_captured(&mut self, e: &ErrorCapturedEvent) {
        _ = e;
    }

    /// Called when a render is aborted.
    fn on_fatal_error(&mut self, e: &FatalErrorEvent) {
        _ = e;
    }

    /// Called for every unit of work (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_unit_of_work(&mut self, e: &UnitOfWorkEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// Shared sinks
// ---------------------------------------------------------------------------

/// Lets a caller keep a handle to a sink the engine owns.
impl<S: TraceSink + ?Sized> TraceSink for Rc<RefCell<S>> {
    fn on_task_scheduled(&mut self, e: &TaskScheduledEvent) {
        self.borrow_mut().on_task_scheduled(e);
    }

    fn on_task_run(&mut self, e: &TaskRunEvent) {
        self.borrow_mut().on_task_run(e);
    }

    fn on_render_begin(&mut self, e: &RenderBeginEvent) {
        self.borrow_mut().on_render_begin(e);
    }

    fn on_yield(&mut self, e: &YieldEvent) {
        self.borrow_mut().on_yield(e);
    }

    fn on_interrupt(&mut self, e: &InterruptEvent) {
        self.borrow_mut().on_interrupt(e);
    }

    fn on_render_complete(&mut self, e: &RenderCompleteEvent) {
        self.borrow_mut().on_render_complete(e);
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.borrow_mut().on_commit(e);
    }

    fn on_eager_bailout(&mut self, e: &EagerBailoutEvent) {
        self.borrow_mut().on_eager_bailout(e);
    }

    fn on_update_dropped(&mut self, e: &UpdateDroppedEvent) {
        self.borrow_mut().on_update_dropped(e);
    }

    fn on_lane_expired(&mut self, e: &LaneExpiredEvent) {
        self.borrow_mut().on_lane_expired(e);
    }

    fn on_error_captured(&mut self, e: &ErrorCapturedEvent) {
        self.borrow_mut().on_error_captured(e);
    }

    fn on_fatal_error(&mut self, e: &FatalErrorEvent) {
        self.borrow_mut().on_fatal_error(e);
    }

    #[cfg(feature = "trace-rich")]
    fn on_unit_of_work(&mut self, e: &UnitOfWorkEvent) {
        self.borrow_mut().on_unit_of_work(e);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`TaskScheduledEvent`].
    #[inline]
    pub fn task_scheduled(&mut self, e: &TaskScheduledEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_task_scheduled(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`TaskRunEvent`].
    #[inline]
    pub fn task_run(&mut self, e: &TaskRunEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_task_run(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RenderBeginEvent`].
    #[inline]
    pub fn render_begin(&mut self, e: &RenderBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_render_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`YieldEvent`].
    #[inline]
    pub fn yielded(&mut self, e: &YieldEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_yield(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`InterruptEvent`].
    #[inline]
    pub fn interrupt(&mut self, e: &InterruptEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_interrupt(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RenderCompleteEvent`].
    #[inline]
    pub fn render_complete(&mut self, e: &RenderCompleteEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_render_complete(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CommitEvent`].
    #[inline]
    pub fn commit(&mut self, e: &CommitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_commit(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`EagerBailoutEvent`].
    #[inline]
    pub fn eager_bailout(&mut self, e: &EagerBailoutEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_eager_bailout(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`UpdateDroppedEvent`].
    #[inline]
    pub fn update_dropped(&mut self, e: &UpdateDroppedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_update_dropped(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`LaneExpiredEvent`].
    #[inline]
    pub fn lane_expired(&mut self, e: &LaneExpiredEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_lane_expired(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`ErrorCapturedEvent`].
    #[inline]
    pub fn error_captured(&mut self, e: &ErrorCapturedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_error_captured(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FatalErrorEvent`].
    #[inline]
    pub fn fatal_error(&mut self, e: &FatalErrorEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_fatal_error(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`UnitOfWorkEvent`] (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn unit_of_work(&mut self, e: &UnitOfWorkEvent) {
        if let Some(s) = &mut self.sink {
            s.on_unit_of_work(e);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
