// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The work loop: begin and complete steps over the work-in-progress tree.

use alloc::rc::Rc;
use alloc::string::String;
use core::mem;

use super::{Cursor, Engine, Job, Phase};
use crate::component::{BuildContext, Capabilities, CompleteContext, TreeTypes};
use crate::effect::EffectSink;
use crate::error::{BuildError, CapturedError, FatalError};
use crate::host::Host;
use crate::lane::Lanes;
use crate::node::{EffectFlags, INVALID};
use crate::scheduler::{TaskContext, TaskStatus, WorkQueue, should_yield};
use crate::time::HostTime;
#[cfg(feature = "trace-rich")]
use crate::trace::{UnitOfWorkEvent, WorkPhase};
use crate::trace::{
    ErrorCapturedEvent, FatalErrorEvent, InterruptEvent, RenderBeginEvent, RenderCompleteEvent,
    YieldEvent,
};

/// How far a call to `render_root` got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum RenderStatus {
    /// The slice ended with the cursor saved.
    Yielded,
    /// The work-in-progress tree is complete.
    Complete,
}

impl<T: TreeTypes, H: Host, S: EffectSink<T>> Engine<T, H, S> {
    // -- Entry points --

    /// Body of the root task.
    pub(super) fn perform_work_on_root(
        &mut self,
        queue: &mut WorkQueue<Job>,
        tcx: TaskContext,
    ) -> TaskStatus {
        if self.callback_task != Some(tcx.handle) {
            return TaskStatus::Done;
        }
        let lanes = self.lanes.next_lanes(self.wip_lanes);
        if lanes.is_empty() {
            self.callback_task = None;
            self.callback_priority = None;
            return TaskStatus::Done;
        }

        let sync = tcx.did_timeout
            || lanes.intersects(Lanes::SYNC)
            || lanes.intersects(self.lanes.expired());
        let deadline = (!sync).then_some(tcx.deadline);
        let result = match self.render_root(lanes, deadline) {
            Ok(RenderStatus::Complete) => self.commit_root(),
            Ok(RenderStatus::Yielded) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.fatal = Some(e);
        }

        self.ensure_root_is_scheduled(queue);
        if self.callback_task == Some(tcx.handle) {
            TaskStatus::Continue
        } else {
            TaskStatus::Done
        }
    }

    /// Renders the next lanes to completion and commits them.
    pub(super) fn render_and_commit_sync(&mut self) -> Result<bool, FatalError> {
        let lanes = self.lanes.next_lanes(self.wip_lanes);
        if lanes.is_empty() {
            return Ok(false);
        }
        match self.render_root(lanes, None)? {
            RenderStatus::Complete => {
                self.commit_root()?;
                Ok(true)
            }
            RenderStatus::Yielded => Err(FatalError::Invariant("synchronous render yielded")),
        }
    }

    /// Works on `lanes` until the tree is complete or, when a deadline is
    /// given, until the slice runs out.
    pub(super) fn render_root(
        &mut self,
        lanes: Lanes,
        deadline: Option<HostTime>,
    ) -> Result<RenderStatus, FatalError> {
        if lanes.is_empty() || lanes.has_unknown_bits() {
            return Err(FatalError::InvalidLanes(lanes));
        }
        if self.wip_root == INVALID || self.wip_lanes != lanes {
            if self.wip_root != INVALID {
                self.stats.renders_interrupted += 1;
                let e = InterruptEvent {
                    discarded: self.wip_lanes,
                    next: lanes,
                    at: self.last_now,
                };
                self.tracer().interrupt(&e);
            }
            self.prepare_fresh_stack(lanes, deadline.is_none());
        }

        let mut units = 0_u32;
        while let Some(cursor) = self.cursor {
            self.perform_unit(cursor)?;
            units = units.saturating_add(1);
            if self.cursor.is_none() {
                break;
            }
            if let Some(deadline) = deadline {
                let now = self.now();
                if should_yield(now, deadline) {
                    self.stats.yields += 1;
                    self.tracer().yielded(&YieldEvent {
                        lanes,
                        units,
                        at: now,
                    });
                    return Ok(RenderStatus::Yielded);
                }
            }
        }

        let at = self.last_now;
        self.tracer()
            .render_complete(&RenderCompleteEvent { lanes, at });
        Ok(RenderStatus::Complete)
    }

    /// Discards any work-in-progress tree and starts a new one on `lanes`.
    fn prepare_fresh_stack(&mut self, lanes: Lanes, sync: bool) {
        if self.wip_root != INVALID {
            self.wip_root = INVALID;
            self.cursor = None;
            self.store.collect_garbage(self.root);
        }
        self.flush_concurrent_updates();

        let wip = self.store.build_alternate(self.root, None);
        self.wip_root = wip;
        self.wip_lanes = lanes;
        self.cursor = Some(Cursor::begin(wip));
        self.stats.renders_started += 1;
        let at = self.last_now;
        self.tracer()
            .render_begin(&RenderBeginEvent { lanes, sync, at });
    }

    /// Drops the work-in-progress tree after a fatal error.
    fn abort_render(&mut self) {
        let lanes = self.wip_lanes;
        self.wip_root = INVALID;
        self.wip_lanes = Lanes::NONE;
        self.cursor = None;
        self.lanes.discard(lanes);
        self.store.collect_garbage(self.root);
        self.flush_concurrent_updates();
        self.stats.fatal_errors += 1;
        let at = self.last_now;
        self.tracer().fatal_error(&FatalErrorEvent { lanes, at });
    }

    // -- Units of work --

    fn perform_unit(&mut self, cursor: Cursor) -> Result<(), FatalError> {
        self.stats.units_of_work += 1;
        let node = cursor.node;
        let result = match cursor.phase {
            Phase::Begin => self.begin_work(node).map(|next| match next {
                Some(child) => Cursor::begin(child),
                None => Cursor::complete(node),
            }),
            Phase::Complete => self.complete_work(node).map(|()| {
                let sibling = self.store.next_sibling[node as usize];
                if sibling != INVALID {
                    Cursor::begin(sibling)
                } else {
                    Cursor::complete(self.store.parent[node as usize])
                }
            }),
        };
        match result {
            Ok(next) => {
                let done = cursor.phase == Phase::Complete && node == self.wip_root;
                self.cursor = (!done).then_some(next);
                Ok(())
            }
            Err(error) => self.handle_error(node, error),
        }
    }

    /// Returns the first child to work on next, or `None` to complete the
    /// node.
    fn begin_work(&mut self, wip: u32) -> Result<Option<u32>, BuildError> {
        let w = wip as usize;
        let current = self.store.alternate[w];
        let render_lanes = self.wip_lanes;

        if current != INVALID
            && self.store.memoized_input[current as usize] == self.store.pending_input[w]
            && !self.store.lanes[w].intersects(render_lanes)
            && !self.store.flags[w].contains(EffectFlags::DID_CAPTURE)
        {
            #[cfg(feature = "trace-rich")]
            self.trace_unit(wip, WorkPhase::Bailout);
            if !self.store.child_lanes[w].intersects(render_lanes) {
                return Ok(None);
            }
            self.clone_children(wip);
            let first = self.store.first_child[w];
            return Ok((first != INVALID).then_some(first));
        }

        self.store.lanes[w] = Lanes::NONE;
        let kind = self.store.kind[w];
        let component = self
            .registry
            .get(kind)
            .ok_or(BuildError::UnknownKind(kind))?;
        let node = self.store.node_id(wip);
        let mut slots = mem::take(&mut self.store.state[w]);
        let mut current_slots =
            (current != INVALID).then(|| mem::take(&mut self.store.state[current as usize]));

        let (result, remaining, clear_captured) = {
            let mut cx = BuildContext {
                node,
                input: self.store.pending_input[w].as_ref(),
                prior_output: (current != INVALID)
                    .then(|| &self.store.memoized_output[current as usize]),
                captured: self.store.captured[w].as_deref(),
                slots: &mut slots,
                current_slots: current_slots.as_mut(),
                render_lanes,
                remaining_lanes: Lanes::NONE,
                touched: 0,
                clear_captured: false,
            };
            let result = component
                .begin(&mut cx)
                .and_then(|children| cx.finish().map(|()| children));
            (result, cx.remaining_lanes, cx.clear_captured)
        };

        self.store.state[w] = slots;
        if let Some(slots) = current_slots {
            self.store.state[current as usize] = slots;
        }
        let children = result?;
        self.store.lanes[w] |= remaining;
        if clear_captured {
            self.store.captured[w] = None;
        }
        self.store.flags[w] |= EffectFlags::PERFORMED_WORK;
        #[cfg(feature = "trace-rich")]
        self.trace_unit(wip, WorkPhase::Begin);

        self.reconcile_children(wip, &children)?;
        let first = self.store.first_child[w];
        Ok((first != INVALID).then_some(first))
    }

    /// Gives a bailed-out node work-in-progress copies of its current
    /// children so the walk can reach the work below them.
    fn clone_children(&mut self, wip: u32) {
        let current = self.store.alternate[wip as usize];
        let mut old = self.store.first_child[current as usize];
        let mut prev = INVALID;
        while old != INVALID {
            let input = self.store.memoized_input[old as usize].clone();
            let child = self.store.build_alternate(old, input);
            self.store.parent[child as usize] = wip;
            if prev == INVALID {
                self.store.first_child[wip as usize] = child;
            } else {
                self.store.next_sibling[prev as usize] = child;
            }
            prev = child;
            old = self.store.next_sibling[old as usize];
        }
    }

    fn complete_work(&mut self, wip: u32) -> Result<(), BuildError> {
        let w = wip as usize;
        let current = self.store.alternate[w];
        let kind = self.store.kind[w];
        let mounting = current == INVALID;
        let children_changed =
            mounting || self.store.first_child[w] != self.store.first_child[current as usize];

        if children_changed || self.store.flags[w].contains(EffectFlags::PERFORMED_WORK) {
            let component = self
                .registry
                .get(kind)
                .ok_or(BuildError::UnknownKind(kind))?;
            let output = component.complete(&CompleteContext {
                store: &self.store,
                node: wip,
            })?;
            if !mounting && self.registry.capabilities(kind).contains(Capabilities::HOST) {
                let c = current as usize;
                if output != self.store.memoized_output[c]
                    || self.store.pending_input[w] != self.store.memoized_input[c]
                {
                    self.store.flags[w] |= EffectFlags::UPDATE;
                }
            }
            self.store.memoized_output[w] = output;
        }
        self.store.memoized_input[w] = self.store.pending_input[w].clone();

        let mut subtree_flags = EffectFlags::empty();
        let mut child_lanes = Lanes::NONE;
        let mut child = self.store.first_child[w];
        while child != INVALID {
            let c = child as usize;
            subtree_flags |= self.store.flags[c] | self.store.subtree_flags[c];
            child_lanes |= self.store.lanes[c] | self.store.child_lanes[c];
            self.store.parent[c] = wip;
            child = self.store.next_sibling[c];
        }
        self.store.subtree_flags[w] = subtree_flags;
        self.store.child_lanes[w] = child_lanes;
        #[cfg(feature = "trace-rich")]
        self.trace_unit(wip, WorkPhase::Complete);
        Ok(())
    }

    // -- Errors --

    /// Routes a build error to the nearest boundary above `failed`, or aborts
    /// the render when there is none.
    fn handle_error(&mut self, failed: u32, error: BuildError) -> Result<(), FatalError> {
        let source_kind = self.store.kind[failed as usize];
        let mut boundary = self.store.parent[failed as usize];
        while boundary != INVALID {
            let b = boundary as usize;
            let caps = self.registry.capabilities(self.store.kind[b]);
            if caps.contains(Capabilities::ERROR_BOUNDARY)
                && !self.store.flags[b].contains(EffectFlags::DID_CAPTURE)
            {
                break;
            }
            boundary = self.store.parent[b];
        }

        if boundary == INVALID {
            let component = String::from(self.registry.name(source_kind));
            self.abort_render();
            return Err(FatalError::Uncaught { component, error });
        }

        let b = boundary as usize;
        let current = self.store.alternate[b];
        self.store.captured[b] = Some(Rc::new(CapturedError { error, source_kind }));
        self.store.flags[b] |= EffectFlags::DID_CAPTURE;
        self.store.flags[b].remove(EffectFlags::CHILD_DELETION);
        self.store.subtree_flags[b] = EffectFlags::empty();
        self.store.lanes[b] |= self.wip_lanes;
        self.store.deletions[b].clear();
        self.store.first_child[b] = if current == INVALID {
            INVALID
        } else {
            self.store.first_child[current as usize]
        };
        self.cursor = Some(Cursor::begin(boundary));

        self.stats.errors_captured += 1;
        let e = ErrorCapturedEvent {
            boundary,
            source: failed,
            lanes: self.wip_lanes,
            at: self.last_now,
        };
        self.tracer().error_captured(&e);
        Ok(())
    }

    #[cfg(feature = "trace-rich")]
    fn trace_unit(&mut self, node: u32, phase: WorkPhase) {
        let e = UnitOfWorkEvent {
            node: self.store.node_id(node),
            kind: self.store.kind[node as usize],
            phase,
        };
        self.tracer().unit_of_work(&e);
    }
}
