// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads a recording from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Renders become duration events: a `B` at render begin, closed by an `E` at
//! yield, interrupt, fatal error or completion, and reopened at the next task
//! run that resumes the same lanes. Everything else is an instant event.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use trellis_core::lane::Lanes;
use trellis_core::time::HostTime;

use crate::recorder::RecordedEvent;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
/// Host times are already microseconds and are written as is. Unit-of-work
/// events carry no timestamp and are attached to the previous event's time.
pub fn export(events: &[RecordedEvent], writer: &mut dyn Write) -> io::Result<()> {
    let mut out: Vec<Value> = Vec::new();
    let mut last = HostTime(0);
    let mut open: Option<Lanes> = None;
    let mut paused: Option<Lanes> = None;

    for recorded in events {
        let ts = match recorded.at() {
            Some(at) => {
                last = at;
                at
            }
            None => last,
        };
        match recorded {
            RecordedEvent::TaskScheduled(e) => out.push(instant(
                "TaskScheduled",
                "Scheduler",
                ts,
                json!({ "task": e.task.id(), "priority": format!("{:?}", e.priority) }),
            )),
            RecordedEvent::TaskRun(e) => {
                out.push(instant(
                    "TaskRun",
                    "Scheduler",
                    ts,
                    json!({
                        "task": e.task.id(),
                        "priority": format!("{:?}", e.priority),
                        "did_timeout": e.did_timeout,
                    }),
                ));
                if let Some(lanes) = paused.take() {
                    out.push(begin(lanes, ts));
                    open = Some(lanes);
                }
            }
            RecordedEvent::RenderBegin(e) => {
                if let Some(lanes) = open.take() {
                    out.push(end(lanes, ts));
                }
                paused = None;
                out.push(begin(e.lanes, ts));
                open = Some(e.lanes);
            }
            RecordedEvent::Yield(e) => {
                if let Some(lanes) = open.take() {
                    out.push(end(lanes, ts));
                    paused = Some(lanes);
                }
                out.push(instant(
                    "Yield",
                    "Render",
                    ts,
                    json!({ "lanes": lanes_arg(e.lanes), "units": e.units }),
                ));
            }
            RecordedEvent::Interrupt(e) => {
                if let Some(lanes) = open.take() {
                    out.push(end(lanes, ts));
                }
                paused = None;
                out.push(instant(
                    "Interrupt",
                    "Render",
                    ts,
                    json!({ "discarded": lanes_arg(e.discarded), "next": lanes_arg(e.next) }),
                ));
            }
            RecordedEvent::RenderComplete(e) => {
                if let Some(lanes) = open.take() {
                    out.push(end(lanes, ts));
                }
                paused = None;
                out.push(instant(
                    "RenderComplete",
                    "Render",
                    ts,
                    json!({ "lanes": lanes_arg(e.lanes) }),
                ));
            }
            RecordedEvent::Commit(e) => out.push(instant(
                "Commit",
                "Commit",
                ts,
                json!({
                    "generation": e.generation,
                    "lanes": lanes_arg(e.lanes),
                    "effects": e.effects,
                    "remaining": lanes_arg(e.remaining),
                }),
            )),
            RecordedEvent::EagerBailout(e) => out.push(instant(
                "EagerBailout",
                "Update",
                ts,
                json!({ "node": e.node, "slot": e.slot }),
            )),
            RecordedEvent::UpdateDropped(e) => out.push(instant(
                "UpdateDropped",
                "Update",
                ts,
                json!({ "node": e.node, "slot": e.slot }),
            )),
            RecordedEvent::LaneExpired(e) => out.push(instant(
                "LaneExpired",
                "Scheduler",
                ts,
                json!({ "lanes": lanes_arg(e.lanes) }),
            )),
            RecordedEvent::ErrorCaptured(e) => out.push(instant(
                "ErrorCaptured",
                "Render",
                ts,
                json!({
                    "boundary": e.boundary,
                    "source": e.source,
                    "lanes": lanes_arg(e.lanes),
                }),
            )),
            RecordedEvent::FatalError(e) => {
                if let Some(lanes) = open.take() {
                    out.push(end(lanes, ts));
                }
                paused = None;
                out.push(instant(
                    "FatalError",
                    "Render",
                    ts,
                    json!({ "lanes": lanes_arg(e.lanes) }),
                ));
            }
            RecordedEvent::UnitOfWork(e) => out.push(json!({
                "ph": "i",
                "name": format!("{:?}", e.phase),
                "cat": "Rich",
                "ts": ts.micros(),
                "pid": 0,
                "tid": 1,
                "s": "t",
                "args": {
                    "node": e.node.index(),
                    "generation": e.node.generation(),
                    "kind": e.kind.0,
                }
            })),
        }
    }
    if let Some(lanes) = open {
        out.push(end(lanes, last));
    }

    serde_json::to_writer_pretty(writer, &out)?;
    Ok(())
}

fn instant(name: &str, cat: &str, ts: HostTime, args: Value) -> Value {
    json!({
        "ph": "i",
        "name": name,
        "cat": cat,
        "ts": ts.micros(),
        "pid": 0,
        "tid": 0,
        "s": "g",
        "args": args,
    })
}

fn begin(lanes: Lanes, ts: HostTime) -> Value {
    json!({
        "ph": "B",
        "name": "Render",
        "cat": "Render",
        "ts": ts.micros(),
        "pid": 0,
        "tid": 0,
        "args": { "lanes": lanes_arg(lanes) },
    })
}

fn end(lanes: Lanes, ts: HostTime) -> Value {
    json!({
        "ph": "E",
        "name": "Render",
        "cat": "Render",
        "ts": ts.micros(),
        "pid": 0,
        "tid": 0,
        "args": { "lanes": lanes_arg(lanes) },
    })
}

fn lanes_arg(lanes: Lanes) -> String {
    format!("{:#b}", lanes.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use trellis_core::trace::{CommitEvent, RenderBeginEvent, TraceSink, YieldEvent};

    fn to_json(events: &[RecordedEvent]) -> Vec<Value> {
        let mut out = Vec::new();
        export(events, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        serde_json::from_str(&json_str).unwrap()
    }

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_render_begin(&RenderBeginEvent {
            lanes: Lanes::DEFAULT,
            sync: false,
            at: HostTime(1_000),
        });
        rec.on_yield(&YieldEvent {
            lanes: Lanes::DEFAULT,
            units: 3,
            at: HostTime(6_000),
        });
        rec.on_commit(&CommitEvent {
            generation: 1,
            lanes: Lanes::DEFAULT,
            effects: 2,
            remaining: Lanes::NONE,
            at: HostTime(9_000),
        });

        let parsed = to_json(rec.events());
        assert_eq!(parsed.len(), 4);

        assert_eq!(parsed[0]["ph"], "B");
        assert_eq!(parsed[0]["name"], "Render");
        assert_eq!(parsed[0]["ts"], 1_000);

        // The yield closes the open render span before its own instant.
        assert_eq!(parsed[1]["ph"], "E");
        assert_eq!(parsed[1]["ts"], 6_000);
        assert_eq!(parsed[2]["name"], "Yield");
        assert_eq!(parsed[2]["args"]["units"], 3);

        assert_eq!(parsed[3]["name"], "Commit");
        assert_eq!(parsed[3]["args"]["effects"], 2);
    }

    #[test]
    fn unfinished_render_is_closed() {
        let mut rec = RecorderSink::new();
        rec.on_render_begin(&RenderBeginEvent {
            lanes: Lanes::SYNC,
            sync: true,
            at: HostTime(50),
        });
        let parsed = to_json(rec.events());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["ph"], "E");
        assert_eq!(parsed[1]["ts"], 50);
    }

    #[test]
    fn export_empty_recording() {
        assert!(to_json(&[]).is_empty());
    }
}
