// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated host loop that exercises the scheduler and the tracing pipeline.
//!
//! Mounts a small app (a text input above a long keyed feed), then plays
//! three episodes against a [`ManualHost`] whose clock advances on every
//! read:
//!
//! 1. a long feed update is time sliced, and keystrokes arriving mid-render
//!    interrupt it;
//! 2. a feed update left waiting past its lane timeout is promoted and
//!    rendered without yielding;
//! 3. a delayed update lands after its timeout fires.
//!
//! Events go to a [`PrettyPrintSink`] on stdout and a [`RecorderSink`],
//! which is exported as a Chrome trace file at the end.

use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::rc::Rc;

use trellis_core::component::{
    BuildContext, Capabilities, Component, CompleteContext, Element, Registry, TreeTypes,
};
use trellis_core::error::BuildError;
use trellis_core::lane::UpdatePriority;
use trellis_core::node::KindId;
use trellis_core::state::SlotRef;
use trellis_core::time::Duration;
use trellis_core::trace::{
    CommitEvent, EagerBailoutEvent, ErrorCapturedEvent, FatalErrorEvent, InterruptEvent,
    LaneExpiredEvent, RenderBeginEvent, RenderCompleteEvent, TaskRunEvent, TaskScheduledEvent,
    TraceSink, UnitOfWorkEvent, UpdateDroppedEvent, YieldEvent,
};
use trellis_core::{EngineConfig, Reconciler};

use trellis_debug::pretty::PrettyPrintSink;
use trellis_debug::recorder::RecorderSink;
use trellis_harness::{ManualHost, MirrorSink, run_slice, run_until_idle};

const FEED_LEN: u32 = 400;
/// Cost of one clock read, which is roughly one unit of work.
const CLOCK_STEP: Duration = Duration::from_micros(250);

// -- Tree -------------------------------------------------------------------

#[derive(Debug)]
struct Demo;

impl TreeTypes for Demo {
    type Input = Props;
    type Output = String;
}

#[derive(Clone, Debug, PartialEq)]
enum Props {
    Text(String),
    Feed(Vec<u32>),
    Input,
}

struct Text;

impl Component<Demo> for Text {
    fn name(&self) -> &str {
        "text"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::HOST
    }

    fn begin(&self, _: &mut BuildContext<'_, Demo>) -> Result<Vec<Element<Demo>>, BuildError> {
        Ok(Vec::new())
    }

    fn complete(&self, cx: &CompleteContext<'_, Demo>) -> Result<String, BuildError> {
        match cx.input() {
            Some(Props::Text(s)) => Ok(s.clone()),
            _ => Err(BuildError::failed("text without a string")),
        }
    }
}

struct Feed {
    text: KindId,
}

impl Component<Demo> for Feed {
    fn name(&self) -> &str {
        "feed"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::HOST
    }

    fn begin(&self, cx: &mut BuildContext<'_, Demo>) -> Result<Vec<Element<Demo>>, BuildError> {
        let Some(Props::Feed(items)) = cx.input() else {
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .map(|&id| {
                Element::new(self.text, Props::Text(format!("item {id}"))).with_key(u64::from(id))
            })
            .collect())
    }

    fn complete(&self, cx: &CompleteContext<'_, Demo>) -> Result<String, BuildError> {
        Ok(format!("{} items", cx.child_outputs().count()))
    }
}

fn type_char(text: &String, c: &char) -> String {
    let mut text = text.clone();
    text.push(*c);
    text
}

struct Input {
    text: KindId,
    handle: Rc<RefCell<Option<SlotRef<char>>>>,
}

impl Component<Demo> for Input {
    fn name(&self) -> &str {
        "input"
    }

    fn begin(&self, cx: &mut BuildContext<'_, Demo>) -> Result<Vec<Element<Demo>>, BuildError> {
        let (text, handle) = cx.slot(0, String::new, type_char)?;
        *self.handle.borrow_mut() = Some(handle);
        Ok(vec![Element::new(self.text, Props::Text((*text).clone()))])
    }

    fn complete(&self, cx: &CompleteContext<'_, Demo>) -> Result<String, BuildError> {
        Ok(cx.child_outputs().next().cloned().unwrap_or_default())
    }
}

struct App {
    input: KindId,
    feed: KindId,
}

impl Component<Demo> for App {
    fn name(&self) -> &str {
        "app"
    }

    fn begin(&self, cx: &mut BuildContext<'_, Demo>) -> Result<Vec<Element<Demo>>, BuildError> {
        let feed = cx.input().cloned().unwrap_or(Props::Feed(Vec::new()));
        Ok(vec![
            Element::new(self.input, Props::Input),
            Element::new(self.feed, feed),
        ])
    }

    fn complete(&self, cx: &CompleteContext<'_, Demo>) -> Result<String, BuildError> {
        let parts: Vec<&str> = cx.child_outputs().map(String::as_str).collect();
        Ok(parts.join(" | "))
    }
}

// -- Sinks ------------------------------------------------------------------

/// Forwards every event to both sinks.
struct Tee {
    pretty: PrettyPrintSink,
    recorder: Rc<RefCell<RecorderSink>>,
}

macro_rules! tee {
    ($($method:ident($event:ty);)*) => {
        $(
            fn $method(&mut self, e: &$event) {
                self.pretty.$method(e);
                self.recorder.borrow_mut().$method(e);
            }
        )*
    };
}

impl TraceSink for Tee {
    tee! {
        on_task_scheduled(TaskScheduledEvent);
        on_task_run(TaskRunEvent);
        on_render_begin(RenderBeginEvent);
        on_yield(YieldEvent);
        on_interrupt(InterruptEvent);
        on_render_complete(RenderCompleteEvent);
        on_commit(CommitEvent);
        on_eager_bailout(EagerBailoutEvent);
        on_update_dropped(UpdateDroppedEvent);
        on_lane_expired(LaneExpiredEvent);
        on_error_captured(ErrorCapturedEvent);
        on_fatal_error(FatalErrorEvent);
    }

    fn on_unit_of_work(&mut self, e: &UnitOfWorkEvent) {
        // Too many to print; the recorder keeps them for the export.
        self.recorder.borrow_mut().on_unit_of_work(e);
    }
}

// -- Host loop --------------------------------------------------------------

fn main() {
    let mut registry = Registry::new();
    let text = registry.register(Text);
    let feed = registry.register(Feed { text });
    let typing = Rc::new(RefCell::new(None));
    let input = registry.register(Input {
        text,
        handle: Rc::clone(&typing),
    });
    let app = registry.register(App { input, feed });

    let host = ManualHost::new().with_auto_advance(CLOCK_STEP);
    let mut reconciler = Reconciler::new(
        registry,
        host,
        MirrorSink::<Demo>::new(),
        EngineConfig::interactive(),
    );
    let recorder = Rc::new(RefCell::new(RecorderSink::new()));
    reconciler.set_trace_sink(Box::new(Tee {
        pretty: PrettyPrintSink::new(Box::new(std::io::stdout())),
        recorder: Rc::clone(&recorder),
    }));

    println!("-- mount");
    let feed_items = |n: u32, offset: u32| (0..n).map(|i| (i + offset) % n).collect::<Vec<_>>();
    reconciler
        .render(
            Element::new(app, Props::Feed(feed_items(FEED_LEN / 4, 0))),
            UpdatePriority::Sync,
        )
        .expect("root is always alive");
    reconciler.flush_sync().expect("mount failed");
    let handle = typing
        .borrow()
        .clone()
        .expect("input registered its slot");

    println!("-- sliced feed update, interrupted by typing");
    reconciler
        .render(
            Element::new(app, Props::Feed(feed_items(FEED_LEN, 7))),
            UpdatePriority::Default,
        )
        .expect("root is always alive");
    for c in "trellis".chars() {
        run_slice(&mut reconciler);
        run_slice(&mut reconciler);
        reconciler
            .enqueue_update(&handle, c, UpdatePriority::Sync)
            .expect("input is mounted");
    }
    run_until_idle(&mut reconciler, 10_000);
    println!("   => {}", reconciler.root_output());

    println!("-- starved feed update");
    reconciler
        .render(
            Element::new(app, Props::Feed(feed_items(FEED_LEN, 13))),
            UpdatePriority::Default,
        )
        .expect("root is always alive");
    reconciler.host().advance(Duration::from_millis(6_000));
    reconciler
        .enqueue_update(&handle, '!', UpdatePriority::Default)
        .expect("input is mounted");
    run_until_idle(&mut reconciler, 10_000);
    println!("   => {}", reconciler.root_output());

    println!("-- delayed update");
    reconciler
        .enqueue_update_after(
            &handle,
            '?',
            UpdatePriority::Default,
            Duration::from_millis(250),
        )
        .expect("input is mounted");
    run_until_idle(&mut reconciler, 10_000);
    println!("   => {}", reconciler.root_output());

    let r = &reconciler;
    if let Err(mismatch) = r.sink().verify(r.store(), r.registry(), r.current_root()) {
        panic!("target diverged from the committed tree: {mismatch}");
    }
    println!("-- stats\n{:#?}", r.stats());

    // Drop the engine's handle so the recording can be taken.
    drop(reconciler.take_trace_sink());
    let recorder = Rc::try_unwrap(recorder)
        .map(RefCell::into_inner)
        .expect("engine released the recorder");

    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    trellis_debug::chrome::export(recorder.events(), &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path} ({} events)", recorder.len());
}
