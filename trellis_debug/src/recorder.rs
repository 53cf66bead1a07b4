// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory event recording.
//!
//! [`RecorderSink`] implements [`TraceSink`] and appends every event it
//! receives to a `Vec<RecordedEvent>`. Events are small `Copy` values, so the
//! recording is a plain list that can be inspected in tests, filtered, or
//! handed to [`chrome::export`](crate::chrome::export).

use trellis_core::time::HostTime;
use trellis_core::trace::{
    CommitEvent, EagerBailoutEvent, ErrorCapturedEvent, FatalErrorEvent, InterruptEvent,
    LaneExpiredEvent, RenderBeginEvent, RenderCompleteEvent, TaskRunEvent, TaskScheduledEvent,
    TraceSink, UnitOfWorkEvent, UpdateDroppedEvent, YieldEvent,
};

// ---------------------------------------------------------------------------
// RecordedEvent
// ---------------------------------------------------------------------------

/// One recorded event.
#[derive(Clone, Copy, Debug)]
pub enum RecordedEvent {
    /// A [`TaskScheduledEvent`].
    TaskScheduled(TaskScheduledEvent),
    /// A [`TaskRunEvent`].
    TaskRun(TaskRunEvent),
    /// A [`RenderBeginEvent`].
    RenderBegin(RenderBeginEvent),
    /// A [`YieldEvent`].
    Yield(YieldEvent),
    /// An [`InterruptEvent`].
    Interrupt(InterruptEvent),
    /// A [`RenderCompleteEvent`].
    RenderComplete(RenderCompleteEvent),
    /// A [`CommitEvent`].
    Commit(CommitEvent),
    /// An [`EagerBailoutEvent`].
    EagerBailout(EagerBailoutEvent),
    /// An [`UpdateDroppedEvent`].
    UpdateDropped(UpdateDroppedEvent),
    /// A [`LaneExpiredEvent`].
    LaneExpired(LaneExpiredEvent),
    /// An [`ErrorCapturedEvent`].
    ErrorCaptured(ErrorCapturedEvent),
    /// A [`FatalErrorEvent`].
    FatalError(FatalErrorEvent),
    /// A [`UnitOfWorkEvent`].
    UnitOfWork(UnitOfWorkEvent),
}

impl RecordedEvent {
    /// Host time of the event. Unit-of-work events carry no timestamp.
    #[must_use]
    pub fn at(&self) -> Option<HostTime> {
        Some(match self {
            Self::TaskScheduled(e) => e.at,
            Self::TaskRun(e) => e.at,
            Self::RenderBegin(e) => e.at,
            Self::Yield(e) => e.at,
            Self::Interrupt(e) => e.at,
            Self::RenderComplete(e) => e.at,
            Self::Commit(e) => e.at,
            Self::EagerBailout(e) => e.at,
            Self::UpdateDropped(e) => e.at,
            Self::LaneExpired(e) => e.at,
            Self::ErrorCaptured(e) => e.at,
            Self::FatalError(e) => e.at,
            Self::UnitOfWork(_) => return None,
        })
    }

    /// Short event name, as used in exports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskScheduled(_) => "TaskScheduled",
            Self::TaskRun(_) => "TaskRun",
            Self::RenderBegin(_) => "RenderBegin",
            Self::Yield(_) => "Yield",
            Self::Interrupt(_) => "Interrupt",
            Self::RenderComplete(_) => "RenderComplete",
            Self::Commit(_) => "Commit",
            Self::EagerBailout(_) => "EagerBailout",
            Self::UpdateDropped(_) => "UpdateDropped",
            Self::LaneExpired(_) => "LaneExpired",
            Self::ErrorCaptured(_) => "ErrorCaptured",
            Self::FatalError(_) => "FatalError",
            Self::UnitOfWork(_) => "UnitOfWork",
        }
    }
}

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecorderSink {
    events: Vec<RecordedEvent>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Consumes the recorder and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<RecordedEvent> {
        self.events
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops everything recorded so far.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Names of the recorded events, skipping unit-of-work events.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.events
            .iter()
            .filter(|e| !matches!(e, RecordedEvent::UnitOfWork(_)))
            .map(RecordedEvent::name)
    }
}

impl TraceSink for RecorderSink {
    fn on_task_scheduled(&mut self, e: &TaskScheduledEvent) {
        self.events.push(RecordedEvent::TaskScheduled(*e));
    }

    fn on_task_run(&mut self, e: &TaskRunEvent) {
        self.events.push(RecordedEvent::TaskRun(*e));
    }

    fn on_render_begin(&mut self, e: &RenderBeginEvent) {
        self.events.push(RecordedEvent::RenderBegin(*e));
    }

    fn on_yield(&mut self, e: &YieldEvent) {
        self.events.push(RecordedEvent::Yield(*e));
    }

    fn on_interrupt(&mut self, e: &InterruptEvent) {
        self.events.push(RecordedEvent::Interrupt(*e));
    }

    fn on_render_complete(&mut self, e: &RenderCompleteEvent) {
        self.events.push(RecordedEvent::RenderComplete(*e));
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.events.push(RecordedEvent::Commit(*e));
    }

    fn on_eager_bailout(&mut self, e: &EagerBailoutEvent) {
        self.events.push(RecordedEvent::EagerBailout(*e));
    }

    fn on_update_dropped(&mut self, e: &UpdateDroppedEvent) {
        self.events.push(RecordedEvent::UpdateDropped(*e));
    }

    fn on_lane_expired(&mut self, e: &LaneExpiredEvent) {
        self.events.push(RecordedEvent::LaneExpired(*e));
    }

    fn on_error_captured(&mut self, e: &ErrorCapturedEvent) {
        self.events.push(RecordedEvent::ErrorCaptured(*e));
    }

    fn on_fatal_error(&mut self, e: &FatalErrorEvent) {
        self.events.push(RecordedEvent::FatalError(*e));
    }

    fn on_unit_of_work(&mut self, e: &UnitOfWorkEvent) {
        self.events.push(RecordedEvent::UnitOfWork(*e));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use trellis_core::lane::Lanes;

    use super::*;

    #[test]
    fn events_are_kept_in_order() {
        let mut rec = RecorderSink::new();
        rec.on_render_begin(&RenderBeginEvent {
            lanes: Lanes::DEFAULT,
            sync: false,
            at: HostTime(10),
        });
        rec.on_yield(&YieldEvent {
            lanes: Lanes::DEFAULT,
            units: 12,
            at: HostTime(5_010),
        });
        rec.on_commit(&CommitEvent {
            generation: 1,
            lanes: Lanes::DEFAULT,
            effects: 4,
            remaining: Lanes::NONE,
            at: HostTime(7_000),
        });

        assert_eq!(rec.len(), 3);
        assert_eq!(
            rec.names().collect::<Vec<_>>(),
            ["RenderBegin", "Yield", "Commit"]
        );
        match rec.events()[1] {
            RecordedEvent::Yield(e) => assert_eq!(e.units, 12),
            other => panic!("expected Yield, got {other:?}"),
        }
        assert_eq!(rec.events()[2].at(), Some(HostTime(7_000)));
    }

    #[test]
    fn clear_empties_the_recording() {
        let mut rec = RecorderSink::new();
        rec.on_lane_expired(&LaneExpiredEvent {
            lanes: Lanes::IDLE,
            at: HostTime(0),
        });
        assert!(!rec.is_empty());
        rec.clear();
        assert!(rec.is_empty());
        assert!(rec.into_events().is_empty());
    }
}
