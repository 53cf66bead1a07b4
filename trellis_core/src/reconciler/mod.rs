// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The reconciler: scheduling, rendering and committing.
//!
//! A [`Reconciler`] owns the node store, the component registry, the work
//! queue, the host and the effect sink. Its life cycle is:
//!
//! 1. An update is enqueued ([`Reconciler::render`] or
//!    [`Reconciler::enqueue_update`]). Its lane is marked on the node and on
//!    every ancestor, and a root task is scheduled at the priority of the most
//!    urgent pending lane.
//! 2. The host calls [`Reconciler::on_host_callback`]. The root task builds a
//!    work-in-progress tree one unit of work at a time, yielding whenever the
//!    slice budget is spent. Sync and expired lanes render without yielding.
//! 3. A more urgent update arriving while a render is paused discards the
//!    work-in-progress tree; the next slice starts over on the new lanes.
//! 4. A finished tree is committed in one step: the effect list is built,
//!    the root swaps to the new tree, the [`EffectSink`] is called once and
//!    unreachable nodes are collected.
//!
//! [`Reconciler::commit`] and [`Reconciler::flush_sync`] bypass the host and
//! render synchronously.

mod children;
mod commit;
mod update;
mod work;

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::RefCell;
use core::fmt;

use crate::component::{Element, Registry, TreeTypes, root_slot};
use crate::config::EngineConfig;
use crate::effect::EffectSink;
use crate::error::{EngineError, FatalError};
use crate::host::Host;
use crate::lane::{Lanes, RootLanes, UpdatePriority};
use crate::node::{INVALID, KindId, NodeId, NodeStore};
use crate::scheduler::{Priority, RunOutcome, TaskContext, TaskHandle, TaskStatus, WorkQueue};
use crate::state::{SharedQueue, SlotRef, Update};
use crate::time::{Duration, HostTime};
use crate::trace::{TaskRunEvent, TraceSink, Tracer, UpdateDroppedEvent};

/// Result of enqueuing an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The update was queued on the given lane and a render is scheduled.
    Scheduled(Lanes),
    /// The update cannot change the slot's value; no render was scheduled.
    EagerBailout,
}

/// Running counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Root and delivery tasks run.
    pub tasks_run: u64,
    /// Begin and complete steps performed.
    pub units_of_work: u64,
    /// Renders paused at the end of a slice.
    pub yields: u64,
    /// Fresh work-in-progress trees started.
    pub renders_started: u64,
    /// Work-in-progress trees discarded for more urgent lanes.
    pub renders_interrupted: u64,
    /// Generations committed.
    pub commits: u64,
    /// Updates absorbed by the eager bailout.
    pub eager_bailouts: u64,
    /// Build errors captured by a boundary.
    pub errors_captured: u64,
    /// Renders aborted by a fatal error.
    pub fatal_errors: u64,
    /// Lanes promoted to expired by starvation.
    pub starved_lanes_promoted: u64,
    /// Delayed updates whose node was gone by delivery time.
    pub updates_dropped: u64,
}

/// A unit of work in the reconciler's task queue.
pub(crate) enum Job {
    /// Render and commit the root.
    RenderRoot,
    /// Enqueue an update whose delay has elapsed.
    Deliver(DeferredUpdate),
}

pub(crate) struct DeferredUpdate {
    node: NodeId,
    index: u32,
    queue: Rc<RefCell<SharedQueue>>,
    action: Rc<dyn Any>,
    priority: UpdatePriority,
}

/// Where the walk is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cursor {
    node: u32,
    phase: Phase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Begin,
    Complete,
}

impl Cursor {
    const fn begin(node: u32) -> Self {
        Self {
            node,
            phase: Phase::Begin,
        }
    }

    const fn complete(node: u32) -> Self {
        Self {
            node,
            phase: Phase::Complete,
        }
    }
}

/// An update enqueued while a render was in progress.
struct ConcurrentUpdate {
    node: NodeId,
    queue: Rc<RefCell<SharedQueue>>,
    update: Update,
}

/// Everything the work loop mutates, apart from the task queue.
pub(crate) struct Engine<T: TreeTypes, H: Host, S: EffectSink<T>> {
    registry: Registry<T>,
    store: NodeStore<T>,
    host: H,
    sink: S,
    config: EngineConfig,
    trace: Option<Box<dyn TraceSink>>,

    // -- Root --
    root: u32,
    root_slot: SlotRef<Element<T>>,
    lanes: RootLanes,
    generation: u64,

    // -- Scheduling --
    callback_task: Option<TaskHandle>,
    callback_priority: Option<Priority>,
    callback_requested: bool,
    timeout_at: Option<HostTime>,
    last_now: HostTime,

    // -- Render in progress --
    wip_root: u32,
    wip_lanes: Lanes,
    cursor: Option<Cursor>,
    concurrent: Vec<ConcurrentUpdate>,

    // -- Outcomes --
    fatal: Option<FatalError>,
    stats: EngineStats,
}

/// An incremental, interruptible tree reconciler.
pub struct Reconciler<T: TreeTypes, H: Host, S: EffectSink<T>> {
    queue: WorkQueue<Job>,
    engine: Engine<T, H, S>,
}

impl<T: TreeTypes, H: Host, S: EffectSink<T>> fmt::Debug for Reconciler<T, H, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.engine;
        f.debug_struct("Reconciler")
            .field("queue", &self.queue)
            .field("store", &e.store)
            .field("pending", &e.lanes.pending())
            .field("wip_lanes", &e.wip_lanes)
            .field("generation", &e.generation)
            .finish_non_exhaustive()
    }
}

impl<T: TreeTypes, H: Host, S: EffectSink<T>> Reconciler<T, H, S> {
    /// Creates a reconciler with an empty committed tree.
    pub fn new(registry: Registry<T>, host: H, sink: S, config: EngineConfig) -> Self {
        let mut store = NodeStore::new();
        let root = store.create_node(KindId::ROOT, None, None);
        let slot = root_slot::<T>();
        let root_slot = SlotRef::new(store.node_id(root), 0, Rc::clone(&slot.queue));
        store.state[root as usize] = vec![slot];

        Self {
            queue: WorkQueue::new(config.priority_timeouts),
            engine: Engine {
                registry,
                store,
                host,
                sink,
                config,
                trace: None,
                root,
                root_slot,
                lanes: RootLanes::new(),
                generation: 0,
                callback_task: None,
                callback_priority: None,
                callback_requested: false,
                timeout_at: None,
                last_now: HostTime(0),
                wip_root: INVALID,
                wip_lanes: Lanes::NONE,
                cursor: None,
                concurrent: Vec::new(),
                fatal: None,
                stats: EngineStats::default(),
            },
        }
    }

    // -- Updates --

    /// Replaces the element rendered under the root.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches
    /// [`enqueue_update`](Self::enqueue_update).
    pub fn render(
        &mut self,
        element: Element<T>,
        priority: UpdatePriority,
    ) -> Result<EnqueueOutcome, EngineError> {
        let slot = self.engine.root_slot.clone();
        self.enqueue_update(&slot, element, priority)
    }

    /// Enqueues `action` on a state slot at the given priority.
    ///
    /// When neither copy of the node has pending work, the slot's reducer is
    /// applied right away to the last rendered value. If the result equals
    /// that value the update is queued without scheduling a render.
    ///
    /// # Errors
    ///
    /// [`EngineError::StaleNode`] if the slot's node no longer exists.
    pub fn enqueue_update<A: 'static>(
        &mut self,
        slot: &SlotRef<A>,
        action: A,
        priority: UpdatePriority,
    ) -> Result<EnqueueOutcome, EngineError> {
        let outcome = self.engine.enqueue(
            &mut self.queue,
            slot.node,
            slot.index,
            &slot.queue,
            Rc::new(action),
            priority,
        );
        self.engine.sync_host(&self.queue);
        outcome
    }

    /// Enqueues `action` once `delay` has elapsed.
    ///
    /// The update is held in the task queue and delivered by
    /// [`on_host_timeout`](Self::on_host_timeout) followed by
    /// [`on_host_callback`](Self::on_host_callback).
    ///
    /// # Errors
    ///
    /// [`EngineError::StaleNode`] if the slot's node no longer exists now.
    pub fn enqueue_update_after<A: 'static>(
        &mut self,
        slot: &SlotRef<A>,
        action: A,
        priority: UpdatePriority,
        delay: Duration,
    ) -> Result<TaskHandle, EngineError> {
        if !self.engine.store.is_alive(slot.node) {
            return Err(EngineError::StaleNode(slot.node));
        }
        let now = self.engine.now();
        let job = Job::Deliver(DeferredUpdate {
            node: slot.node,
            index: slot.index,
            queue: Rc::clone(&slot.queue),
            action: Rc::new(action),
            priority,
        });
        let task = self
            .queue
            .schedule(now, update::task_priority(priority), job, delay);
        self.engine.trace_task_scheduled(task, update::task_priority(priority));
        self.engine.sync_host(&self.queue);
        Ok(task)
    }

    /// Cancels an update scheduled with
    /// [`enqueue_update_after`](Self::enqueue_update_after) before it is
    /// delivered. Returns `false` if it was already delivered.
    pub fn cancel_delayed(&mut self, task: TaskHandle) -> bool {
        if self.engine.callback_task == Some(task) {
            return false;
        }
        let cancelled = self.queue.cancel(task);
        self.engine.sync_host(&self.queue);
        cancelled
    }

    // -- Host entry points --

    /// Runs scheduled work for one slice. Returns whether work remains.
    pub fn on_host_callback(&mut self) -> bool {
        self.engine.callback_requested = false;
        let start = self.engine.now();
        let deadline = start.saturating_add(self.engine.config.frame_budget);
        let outcome = self.queue.run_until_deadline(
            &mut self.engine,
            |e| e.host.now(),
            deadline,
            |engine, queue, job, tcx| engine.run_job(queue, job, tcx),
        );
        self.engine.sync_host(&self.queue);
        outcome != RunOutcome::Idle
    }

    /// Moves delayed tasks whose start time has passed into the ready set.
    pub fn on_host_timeout(&mut self) {
        self.engine.timeout_at = None;
        let now = self.engine.now();
        self.queue.advance_timers(now);
        self.engine.sync_host(&self.queue);
    }

    // -- Synchronous rendering --

    /// Renders the next pending lanes without yielding and commits the
    /// result. Returns `false` if nothing was pending.
    ///
    /// A render already in progress on the same lanes is resumed.
    ///
    /// # Errors
    ///
    /// The [`FatalError`] that aborted the render. The committed tree is left
    /// as it was and the rendered lanes are dropped.
    pub fn commit(&mut self) -> Result<bool, FatalError> {
        let result = self.engine.render_and_commit_sync();
        self.engine.ensure_root_is_scheduled(&mut self.queue);
        self.engine.sync_host(&self.queue);
        result
    }

    /// Commits until no lane is pending. Returns the number of commits.
    ///
    /// # Errors
    ///
    /// The first [`FatalError`] encountered.
    pub fn flush_sync(&mut self) -> Result<usize, FatalError> {
        let mut commits = 0;
        while self.commit()? {
            commits += 1;
        }
        Ok(commits)
    }

    // -- Queries --

    /// Lanes with outstanding updates.
    #[must_use]
    pub fn pending_lanes(&self) -> Lanes {
        self.engine.lanes.pending()
    }

    /// Lanes promoted by starvation and not yet rendered.
    #[must_use]
    pub fn expired_lanes(&self) -> Lanes {
        self.engine.lanes.expired()
    }

    /// Returns whether a work-in-progress tree exists.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.engine.wip_root != INVALID
    }

    /// Lanes of the render in progress, or empty.
    #[must_use]
    pub fn rendering_lanes(&self) -> Lanes {
        self.engine.wip_lanes
    }

    /// Running counters.
    #[must_use]
    pub fn stats(&self) -> &EngineStats {
        &self.engine.stats
    }

    /// Takes the fatal error recorded by a time-sliced render, if any.
    pub fn take_fatal_error(&mut self) -> Option<FatalError> {
        self.engine.fatal.take()
    }

    /// The node store. Only the committed tree is meaningful between renders.
    #[must_use]
    pub fn store(&self) -> &NodeStore<T> {
        &self.engine.store
    }

    /// The component registry.
    #[must_use]
    pub fn registry(&self) -> &Registry<T> {
        &self.engine.registry
    }

    /// The committed root.
    #[must_use]
    pub fn current_root(&self) -> NodeId {
        self.engine.store.node_id(self.engine.root)
    }

    /// The committed root's output: the output of the rendered element.
    #[must_use]
    pub fn root_output(&self) -> &T::Output {
        &self.engine.store.memoized_output[self.engine.root as usize]
    }

    /// Number of generations committed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.engine.generation
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    /// Number of tasks in the work queue.
    #[must_use]
    pub fn scheduled_tasks(&self) -> usize {
        self.queue.len()
    }

    /// The host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.engine.host
    }

    /// The host, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.engine.host
    }

    /// The effect sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.engine.sink
    }

    /// The effect sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.engine.sink
    }

    /// Installs a trace sink, returning the previous one.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) -> Option<Box<dyn TraceSink>> {
        self.engine.trace.replace(sink)
    }

    /// Removes the trace sink.
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink>> {
        self.engine.trace.take()
    }
}

impl<T: TreeTypes, H: Host, S: EffectSink<T>> Engine<T, H, S> {
    /// Reads the host clock.
    fn now(&mut self) -> HostTime {
        let now = self.host.now();
        self.last_now = now;
        now
    }

    fn tracer(&mut self) -> Tracer<'_> {
        match self.trace.as_deref_mut() {
            Some(sink) => Tracer::new(sink),
            None => Tracer::none(),
        }
    }

    fn run_job(
        &mut self,
        queue: &mut WorkQueue<Job>,
        job: &mut Job,
        tcx: TaskContext,
    ) -> TaskStatus {
        self.stats.tasks_run += 1;
        let at = self.now();
        self.tracer().task_run(&TaskRunEvent {
            task: tcx.handle,
            priority: tcx.priority,
            did_timeout: tcx.did_timeout,
            at,
        });
        match job {
            Job::RenderRoot => self.perform_work_on_root(queue, tcx),
            Job::Deliver(update) => {
                // The delivery is the update's only record; a stale node drops it.
                let delivered = self.enqueue(
                    queue,
                    update.node,
                    update.index,
                    &update.queue,
                    Rc::clone(&update.action),
                    update.priority,
                );
                if delivered.is_err() {
                    self.stats.updates_dropped += 1;
                    self.tracer().update_dropped(&UpdateDroppedEvent {
                        node: update.node.index(),
                        slot: update.index,
                        at,
                    });
                }
                TaskStatus::Done
            }
        }
    }

    /// Brings the host's callback and timeout requests in line with the queue.
    fn sync_host(&mut self, queue: &WorkQueue<Job>) {
        if queue.has_ready() && !self.callback_requested {
            self.callback_requested = true;
            self.host.request_callback();
        }
        match queue.next_timer() {
            Some(at) if self.timeout_at != Some(at) => {
                let now = self.now();
                self.timeout_at = Some(at);
                self.host.request_timeout(at.saturating_duration_since(now));
            }
            Some(_) => {}
            None => {
                if self.timeout_at.take().is_some() {
                    self.host.cancel_timeout();
                }
            }
        }
    }
}
