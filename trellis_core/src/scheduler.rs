// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative task queue with priority classes and delayed tasks.
//!
//! A [`WorkQueue`] holds callbacks of an arbitrary type `C`. Each task gets
//! an expiration time derived from its [`Priority`]; ready tasks run in
//! expiration order, and delayed tasks move to the ready set once their start
//! time has passed. The queue owns no clock and no globals: the caller passes
//! the current time in and drives [`WorkQueue::run_until_deadline`] from its
//! host callback.
//!
//! A running task may ask to continue by returning [`TaskStatus::Continue`].
//! It then keeps its id and expiration and runs again on the next slice.

use alloc::collections::{BTreeMap, BinaryHeap};
use core::cmp::Reverse;
use core::fmt;

use crate::time::{Duration, HostTime};

/// Scheduling class of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Expires immediately.
    Immediate,
    /// Direct user input.
    UserBlocking,
    /// Ordinary work.
    Normal,
    /// Work that can wait several seconds.
    Low,
    /// Work that effectively never expires.
    Idle,
}

/// How long a task of each class may wait before it expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriorityTimeouts {
    /// Timeout for [`Priority::Immediate`].
    pub immediate: Duration,
    /// Timeout for [`Priority::UserBlocking`].
    pub user_blocking: Duration,
    /// Timeout for [`Priority::Normal`].
    pub normal: Duration,
    /// Timeout for [`Priority::Low`].
    pub low: Duration,
    /// Timeout for [`Priority::Idle`].
    pub idle: Duration,
}

impl PriorityTimeouts {
    /// Immediate 0, user-blocking 250 ms, normal 5 s, low 10 s, idle about
    /// 12.4 days.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            immediate: Duration::ZERO,
            user_blocking: Duration::from_millis(250),
            normal: Duration::from_millis(5_000),
            low: Duration::from_millis(10_000),
            idle: Duration::from_millis(1_073_741_823),
        }
    }

    /// Timeout for one class.
    #[must_use]
    pub const fn timeout_for(&self, priority: Priority) -> Duration {
        match priority {
            Priority::Immediate => self.immediate,
            Priority::UserBlocking => self.user_blocking,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
            Priority::Idle => self.idle,
        }
    }
}

impl Default for PriorityTimeouts {
    fn default() -> Self {
        Self::standard()
    }
}

/// Identifies a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(pub(crate) u64);

impl TaskHandle {
    /// The task's sequence number. Later tasks have larger ids.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// What a task sees when it runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskContext {
    /// The running task.
    pub handle: TaskHandle,
    /// The task's class.
    pub priority: Priority,
    /// Whether the task's expiration time had passed when it was picked.
    pub did_timeout: bool,
    /// End of the current slice.
    pub deadline: HostTime,
}

/// Result of running a task once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task is finished and is dropped.
    Done,
    /// The task has more work. It is re-queued and the slice ends.
    Continue,
}

/// Why [`WorkQueue::run_until_deadline`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing is scheduled.
    Idle,
    /// Ready work remains; the host should call back soon.
    Yielded,
    /// Only delayed work remains; the earliest starts at the given time.
    Waiting(HostTime),
}

struct Task<C> {
    /// `None` while the task is running.
    callback: Option<C>,
    priority: Priority,
    start: HostTime,
    expiration: HostTime,
}

/// Returns whether a slice should end.
#[inline]
#[must_use]
pub const fn should_yield(now: HostTime, deadline: HostTime) -> bool {
    now.0 >= deadline.0
}

/// A priority queue of cooperative tasks.
pub struct WorkQueue<C> {
    timeouts: PriorityTimeouts,
    tasks: BTreeMap<u64, Task<C>>,
    /// Ready tasks keyed by `(expiration, id)`.
    ready: BinaryHeap<Reverse<(HostTime, u64)>>,
    /// Delayed tasks keyed by `(start, id)`.
    delayed: BinaryHeap<Reverse<(HostTime, u64)>>,
    next_id: u64,
    current: Option<u64>,
}

impl<C> fmt::Debug for WorkQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("tasks", &self.tasks.len())
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl<C> Default for WorkQueue<C> {
    fn default() -> Self {
        Self::new(PriorityTimeouts::standard())
    }
}

impl<C> WorkQueue<C> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(timeouts: PriorityTimeouts) -> Self {
        Self {
            timeouts,
            tasks: BTreeMap::new(),
            ready: BinaryHeap::new(),
            delayed: BinaryHeap::new(),
            next_id: 1,
            current: None,
        }
    }

    /// Schedules `callback` to run no earlier than `now + delay`.
    pub fn schedule(
        &mut self,
        now: HostTime,
        priority: Priority,
        callback: C,
        delay: Duration,
    ) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        let start = now.saturating_add(delay);
        let expiration = start.saturating_add(self.timeouts.timeout_for(priority));
        self.tasks.insert(
            id,
            Task {
                callback: Some(callback),
                priority,
                start,
                expiration,
            },
        );
        if delay == Duration::ZERO {
            self.ready.push(Reverse((expiration, id)));
        } else {
            self.delayed.push(Reverse((start, id)));
        }
        TaskHandle(id)
    }

    /// Cancels a task. Returns `false` if it already finished or was
    /// cancelled.
    ///
    /// A task may cancel itself while running; it is then dropped even if it
    /// returns [`TaskStatus::Continue`].
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        self.tasks.remove(&handle.0).is_some()
    }

    /// Returns whether a task is still scheduled (or running).
    #[must_use]
    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.tasks.contains_key(&handle.0)
    }

    /// The task currently running, if any.
    #[must_use]
    pub fn current(&self) -> Option<TaskHandle> {
        self.current.map(TaskHandle)
    }

    /// Expiration time of a scheduled task.
    #[must_use]
    pub fn expiration(&self, handle: TaskHandle) -> Option<HostTime> {
        self.tasks.get(&handle.0).map(|t| t.expiration)
    }

    /// Number of scheduled tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns whether some task is ready to run.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        self.ready
            .iter()
            .any(|Reverse((_, id))| self.tasks.contains_key(id))
    }

    /// Moves every delayed task whose start time has passed to the ready set.
    pub fn advance_timers(&mut self, now: HostTime) {
        while let Some(&Reverse((start, id))) = self.delayed.peek() {
            if start > now {
                break;
            }
            self.delayed.pop();
            if let Some(task) = self.tasks.get(&id) {
                self.ready.push(Reverse((task.expiration, id)));
            }
        }
    }

    /// Start time of the earliest delayed task.
    #[must_use]
    pub fn next_timer(&self) -> Option<HostTime> {
        self.delayed
            .iter()
            .filter(|Reverse((_, id))| self.tasks.contains_key(id))
            .map(|Reverse((start, _))| *start)
            .min()
    }

    /// Runs ready tasks in expiration order until the queue drains or the
    /// deadline passes.
    ///
    /// Expired tasks run even past the deadline. `clock` reads the current
    /// time from `cx` between tasks. `exec` receives the queue itself so a
    /// task can schedule or cancel work.
    pub fn run_until_deadline<X>(
        &mut self,
        cx: &mut X,
        clock: impl Fn(&X) -> HostTime,
        deadline: HostTime,
        mut exec: impl FnMut(&mut X, &mut Self, &mut C, TaskContext) -> TaskStatus,
    ) -> RunOutcome {
        let mut now = clock(cx);
        self.advance_timers(now);
        while let Some(&Reverse((expiration, id))) = self.ready.peek() {
            let Some(task) = self.tasks.get_mut(&id) else {
                // Cancelled.
                self.ready.pop();
                continue;
            };
            if expiration > now && should_yield(now, deadline) {
                return RunOutcome::Yielded;
            }
            self.ready.pop();
            let Some(mut callback) = task.callback.take() else {
                continue;
            };
            let tcx = TaskContext {
                handle: TaskHandle(id),
                priority: task.priority,
                did_timeout: expiration <= now,
                deadline,
            };

            self.current = Some(id);
            let status = exec(cx, self, &mut callback, tcx);
            self.current = None;
            now = clock(cx);

            match status {
                TaskStatus::Continue => {
                    if let Some(task) = self.tasks.get_mut(&id) {
                        task.callback = Some(callback);
                        self.ready.push(Reverse((expiration, id)));
                        self.advance_timers(now);
                        return RunOutcome::Yielded;
                    }
                }
                TaskStatus::Done => {
                    self.tasks.remove(&id);
                }
            }
            self.advance_timers(now);
        }
        match self.next_timer() {
            Some(at) => RunOutcome::Waiting(at),
            None => RunOutcome::Idle,
        }
    }

    /// Start time of a scheduled task.
    #[must_use]
    pub fn start_time(&self, handle: TaskHandle) -> Option<HostTime> {
        self.tasks.get(&handle.0).map(|t| t.start)
    }
}
