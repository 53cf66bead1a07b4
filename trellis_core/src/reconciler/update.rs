// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Enqueuing updates and keeping the root task scheduled.

use alloc::rc::Rc;
use core::any::Any;
use core::cell::RefCell;

use super::{ConcurrentUpdate, Engine, EnqueueOutcome, Job};
use crate::component::TreeTypes;
use crate::effect::EffectSink;
use crate::error::EngineError;
use crate::host::Host;
use crate::lane::{Lanes, UpdatePriority};
use crate::node::{INVALID, NodeId};
use crate::scheduler::{Priority, TaskHandle, WorkQueue};
use crate::state::{SharedQueue, Update};
use crate::time::Duration;
use crate::trace::{EagerBailoutEvent, LaneExpiredEvent, TaskScheduledEvent};

/// Task priority used to deliver a delayed update.
pub(super) const fn task_priority(priority: UpdatePriority) -> Priority {
    match priority {
        UpdatePriority::Sync => Priority::Immediate,
        UpdatePriority::InputContinuous => Priority::UserBlocking,
        UpdatePriority::Default | UpdatePriority::Transition => Priority::Normal,
        UpdatePriority::Idle => Priority::Idle,
    }
}

/// Task priority for rendering a lane set.
const fn lanes_priority(lanes: Lanes) -> Priority {
    let lane = lanes.highest_priority_lane();
    if lane.intersects(Lanes::SYNC) {
        Priority::Immediate
    } else if lane.intersects(Lanes::INPUT_CONTINUOUS) {
        Priority::UserBlocking
    } else if lane.intersects(Lanes::DEFAULT) || lane.intersects(Lanes::TRANSITIONS) {
        Priority::Normal
    } else {
        Priority::Idle
    }
}

impl<T: TreeTypes, H: Host, S: EffectSink<T>> Engine<T, H, S> {
    pub(super) fn enqueue(
        &mut self,
        queue: &mut WorkQueue<Job>,
        node: NodeId,
        index: u32,
        slot_queue: &Rc<RefCell<SharedQueue>>,
        action: Rc<dyn Any>,
        priority: UpdatePriority,
    ) -> Result<EnqueueOutcome, EngineError> {
        if !self.store.is_alive(node) {
            return Err(EngineError::StaleNode(node));
        }
        if index as usize >= self.store.state[node.idx as usize].len() {
            return Err(EngineError::SlotIndex { index });
        }
        if Any::type_id(&*action) != slot_queue.borrow().action_type {
            return Err(EngineError::ActionType { index });
        }
        let lane = self.lanes.request_lane(priority);

        let idx = node.idx as usize;
        let alt = self.store.alternate[idx];
        let idle = self.store.lanes[idx].is_empty()
            && (alt == INVALID || self.store.lanes[alt as usize].is_empty());

        let mut eager = None;
        if idle {
            let shared = slot_queue.borrow();
            let value = shared
                .reduce_last_rendered(&*action)
                .ok_or(EngineError::ActionType { index })?;
            if shared.reducer.same(&*value, &*shared.last_rendered) {
                drop(shared);
                self.push_update(
                    node,
                    slot_queue,
                    Update {
                        lane: Lanes::NONE,
                        action,
                        eager: Some(value),
                    },
                );
                self.stats.eager_bailouts += 1;
                let at = self.now();
                self.tracer().eager_bailout(&EagerBailoutEvent {
                    node: node.idx,
                    slot: index,
                    at,
                });
                return Ok(EnqueueOutcome::EagerBailout);
            }
            eager = Some(value);
        }

        self.push_update(node, slot_queue, Update { lane, action, eager });
        self.lanes.mark_updated(lane);
        self.ensure_root_is_scheduled(queue);
        Ok(EnqueueOutcome::Scheduled(lane))
    }

    /// Queues an update on its slot, or buffers it while a render is in
    /// progress.
    fn push_update(&mut self, node: NodeId, slot_queue: &Rc<RefCell<SharedQueue>>, update: Update) {
        if self.wip_root != INVALID {
            self.concurrent.push(ConcurrentUpdate {
                node,
                queue: Rc::clone(slot_queue),
                update,
            });
            return;
        }
        let lane = update.lane;
        slot_queue.borrow_mut().pending.push_back(update);
        if !lane.is_empty() {
            self.mark_lanes_to_root(node.idx, lane);
        }
    }

    /// Moves buffered updates onto their slots.
    pub(super) fn flush_concurrent_updates(&mut self) {
        for ConcurrentUpdate {
            node,
            queue,
            update,
        } in core::mem::take(&mut self.concurrent)
        {
            if !self.store.is_alive(node) {
                continue;
            }
            let lane = update.lane;
            queue.borrow_mut().pending.push_back(update);
            if !lane.is_empty() {
                self.mark_lanes_to_root(node.idx, lane);
                self.lanes.mark_updated(lane);
            }
        }
    }

    /// Marks `lane` on a node and its alternate, and in the child lanes of
    /// every ancestor (both copies).
    fn mark_lanes_to_root(&mut self, node: u32, lane: Lanes) {
        let s = &mut self.store;
        s.lanes[node as usize] |= lane;
        let alt = s.alternate[node as usize];
        if alt != INVALID {
            s.lanes[alt as usize] |= lane;
        }
        let mut parent = s.parent[node as usize];
        while parent != INVALID {
            s.child_lanes[parent as usize] |= lane;
            let alt = s.alternate[parent as usize];
            if alt != INVALID {
                s.child_lanes[alt as usize] |= lane;
            }
            parent = s.parent[parent as usize];
        }
    }

    /// Makes sure exactly one root task exists, at the priority of the next
    /// lanes, or none when nothing is pending.
    pub(super) fn ensure_root_is_scheduled(&mut self, queue: &mut WorkQueue<Job>) {
        let now = self.now();
        let promoted = self
            .lanes
            .mark_starved_lanes_as_expired(now, &self.config.lane_timeouts);
        if !promoted.is_empty() {
            self.stats.starved_lanes_promoted += u64::from(promoted.0.count_ones());
            self.tracer().lane_expired(&LaneExpiredEvent {
                lanes: promoted,
                at: now,
            });
        }

        let next = self.lanes.next_lanes(self.wip_lanes);
        if next.is_empty() {
            if let Some(task) = self.callback_task.take() {
                queue.cancel(task);
            }
            self.callback_priority = None;
            return;
        }

        let priority = if next.intersects(self.lanes.expired()) {
            Priority::Immediate
        } else {
            lanes_priority(next)
        };
        if let Some(task) = self.callback_task {
            if queue.is_scheduled(task) && self.callback_priority == Some(priority) {
                return;
            }
            queue.cancel(task);
        }
        let task = queue.schedule(now, priority, Job::RenderRoot, Duration::ZERO);
        self.callback_task = Some(task);
        self.callback_priority = Some(priority);
        self.trace_task_scheduled(task, priority);
    }

    pub(super) fn trace_task_scheduled(&mut self, task: TaskHandle, priority: Priority) {
        let at = self.last_now;
        self.tracer().task_scheduled(&TaskScheduledEvent { task, priority, at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanes_map_onto_task_priorities() {
        assert_eq!(
            lanes_priority(Lanes::SYNC | Lanes::DEFAULT),
            Priority::Immediate
        );
        assert_eq!(
            lanes_priority(Lanes::INPUT_CONTINUOUS),
            Priority::UserBlocking
        );
        assert_eq!(lanes_priority(Lanes::DEFAULT), Priority::Normal);
        assert_eq!(lanes_priority(Lanes::TRANSITIONS), Priority::Normal);
        assert_eq!(lanes_priority(Lanes::IDLE), Priority::Idle);
    }

    #[test]
    fn delayed_updates_use_matching_task_priority() {
        assert_eq!(task_priority(UpdatePriority::Sync), Priority::Immediate);
        assert_eq!(task_priority(UpdatePriority::Transition), Priority::Normal);
        assert_eq!(task_priority(UpdatePriority::Idle), Priority::Idle);
    }
}
