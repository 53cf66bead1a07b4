// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.

use std::io::{self, Write};

use trellis_core::trace::{
    CommitEvent, EagerBailoutEvent, ErrorCapturedEvent, FatalErrorEvent, InterruptEvent,
    LaneExpiredEvent, RenderBeginEvent, RenderCompleteEvent, TaskRunEvent, TaskScheduledEvent,
    TraceSink, UnitOfWorkEvent, UpdateDroppedEvent, YieldEvent,
};

/// A [`TraceSink`] that writes one line per event.
///
/// Lines start with the host time in milliseconds. Write errors are ignored;
/// tracing never interrupts the engine.
///
/// ```text
/// [    12.500ms] render begin   lanes=0b100 sync=false
/// [    17.500ms] yield          lanes=0b100 units=40
/// ```
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    units: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Writes to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Writes to `writer`. Unit-of-work events are skipped.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            units: false,
        }
    }

    /// Also prints one line per unit of work.
    #[must_use]
    pub fn with_units(mut self, units: bool) -> Self {
        self.units = units;
        self
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, at: u64, args: std::fmt::Arguments<'_>) {
        _ = writeln!(
            self.writer,
            "[{:>8}.{:03}ms] {args}",
            at / 1_000,
            at % 1_000
        );
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_task_scheduled(&mut self, e: &TaskScheduledEvent) {
        self.line(
            e.at.micros(),
            format_args!("task scheduled #{} {:?}", e.task.id(), e.priority),
        );
    }

    fn on_task_run(&mut self, e: &TaskRunEvent) {
        let timeout = if e.did_timeout { " (expired)" } else { "" };
        self.line(
            e.at.micros(),
            format_args!("task run       #{} {:?}{timeout}", e.task.id(), e.priority),
        );
    }

    fn on_render_begin(&mut self, e: &RenderBeginEvent) {
        self.line(
            e.at.micros(),
            format_args!("render begin   lanes={:#b} sync={}", e.lanes.0, e.sync),
        );
    }

    fn on_yield(&mut self, e: &YieldEvent) {
        self.line(
            e.at.micros(),
            format_args!("yield          lanes={:#b} units={}", e.lanes.0, e.units),
        );
    }

    fn on_interrupt(&mut self, e: &InterruptEvent) {
        self.line(
            e.at.micros(),
            format_args!(
                "interrupt      discarded={:#b} next={:#b}",
                e.discarded.0, e.next.0
            ),
        );
    }

    fn on_render_complete(&mut self, e: &RenderCompleteEvent) {
        self.line(
            e.at.micros(),
            format_args!("render done    lanes={:#b}", e.lanes.0),
        );
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.line(
            e.at.micros(),
            format_args!(
                "commit         gen={} lanes={:#b} effects={} remaining={:#b}",
                e.generation, e.lanes.0, e.effects, e.remaining.0
            ),
        );
    }

    fn on_eager_bailout(&mut self, e: &EagerBailoutEvent) {
        self.line(
            e.at.micros(),
            format_args!("eager bailout  node={} slot={}", e.node, e.slot),
        );
    }

    fn on_update_dropped(&mut self, e: &UpdateDroppedEvent) {
        self.line(
            e.at.micros(),
            format_args!("update dropped node={} slot={}", e.node, e.slot),
        );
    }

    fn on_lane_expired(&mut self, e: &LaneExpiredEvent) {
        self.line(
            e.at.micros(),
            format_args!("lanes expired  lanes={:#b}", e.lanes.0),
        );
    }

    fn on_error_captured(&mut self, e: &ErrorCapturedEvent) {
        self.line(
            e.at.micros(),
            format_args!(
                "error captured boundary={} source={} lanes={:#b}",
                e.boundary, e.source, e.lanes.0
            ),
        );
    }

    fn on_fatal_error(&mut self, e: &FatalErrorEvent) {
        self.line(
            e.at.micros(),
            format_args!("fatal error    dropped={:#b}", e.lanes.0),
        );
    }

    fn on_unit_of_work(&mut self, e: &UnitOfWorkEvent) {
        if self.units {
            _ = writeln!(
                self.writer,
                "               {:?} {:?} {:?}",
                e.phase, e.node, e.kind
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::lane::Lanes;
    use trellis_core::node::KindId;
    use trellis_core::time::HostTime;
    use trellis_core::trace::WorkPhase;

    use super::*;

    fn output(sink: PrettyPrintSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn one_line_per_event() {
        let mut sink = PrettyPrintSink::new(Vec::new());
        sink.on_render_begin(&RenderBeginEvent {
            lanes: Lanes::DEFAULT,
            sync: false,
            at: HostTime(12_500),
        });
        sink.on_commit(&CommitEvent {
            generation: 3,
            lanes: Lanes::DEFAULT,
            effects: 1,
            remaining: Lanes::NONE,
            at: HostTime(20_000),
        });

        let text = output(sink);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(
            lines[0].starts_with("[      12.500ms] render begin"),
            "{}",
            lines[0]
        );
        assert!(lines[0].ends_with("sync=false"), "{}", lines[0]);
        assert!(lines[1].contains("gen=3"), "{}", lines[1]);
        assert!(lines[1].contains("effects=1"), "{}", lines[1]);
    }

    #[test]
    fn units_are_opt_in() {
        let event = UnitOfWorkEvent {
            node: root_id(),
            kind: KindId::ROOT,
            phase: WorkPhase::Begin,
        };

        let mut quiet = PrettyPrintSink::new(Vec::new());
        quiet.on_unit_of_work(&event);
        assert!(output(quiet).is_empty());

        let mut verbose = PrettyPrintSink::new(Vec::new()).with_units(true);
        verbose.on_unit_of_work(&event);
        assert!(output(verbose).contains("Begin"));
    }

    #[derive(Debug)]
    struct Unit;

    impl trellis_core::TreeTypes for Unit {
        type Input = ();
        type Output = ();
    }

    fn root_id() -> trellis_core::node::NodeId {
        let reconciler = trellis_core::Reconciler::new(
            trellis_core::Registry::<Unit>::new(),
            NoHost,
            trellis_core::effect::NullSink,
            trellis_core::EngineConfig::default(),
        );
        reconciler.current_root()
    }

    struct NoHost;

    impl trellis_core::Host for NoHost {
        fn now(&self) -> HostTime {
            HostTime(0)
        }

        fn request_callback(&mut self) {}

        fn request_timeout(&mut self, _: trellis_core::Duration) {}

        fn cancel_timeout(&mut self) {}
    }
}
