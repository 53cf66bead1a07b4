// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end behavior of the reconciler against the manual host and the
//! mirroring sink.

use std::cell::RefCell;
use std::rc::Rc;

use trellis_core::component::{
    BuildContext, Capabilities, Component, CompleteContext, Element, Registry, TreeTypes,
};
use trellis_core::effect::EffectOp;
use trellis_core::error::{BuildError, FatalError};
use trellis_core::lane::{Lanes, UpdatePriority};
use trellis_core::node::{KindId, NodeId};
use trellis_core::state::SlotRef;
use trellis_core::time::Duration;
use trellis_core::trace::{TraceSink, UnitOfWorkEvent, UpdateDroppedEvent, WorkPhase};
use trellis_core::{EngineConfig, EnqueueOutcome, Reconciler};

use crate::host::{HostRequest, ManualHost, run_slice, run_until_idle};
use crate::mirror::MirrorSink;

// ---------------------------------------------------------------------------
// A small widget tree
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Ui;

impl TreeTypes for Ui {
    type Input = Props;
    type Output = String;
}

#[derive(Clone, Debug, PartialEq)]
enum Props {
    Text(String),
    Items(Vec<u32>),
    Wide(u32),
    Fail(bool),
    /// Builds fine but fails to complete.
    Late,
    /// A boundary over a thrower, next to a list.
    Pair(bool, Vec<u32>),
    Unit,
}

type Handle<A> = Rc<RefCell<Option<SlotRef<A>>>>;

fn first_child(cx: &CompleteContext<'_, Ui>) -> String {
    cx.child_outputs().next().cloned().unwrap_or_default()
}

/// A host leaf showing a string.
struct Text;

impl Component<Ui> for Text {
    fn name(&self) -> &str {
        "text"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::HOST
    }

    fn begin(&self, _: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        Ok(Vec::new())
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        match cx.input() {
            Some(Props::Text(s)) => Ok(s.clone()),
            Some(Props::Late) => Err(BuildError::failed("late")),
            other => Err(BuildError::failed(format!("text got {other:?}"))),
        }
    }
}

/// A host container with one keyed text per item.
struct List {
    text: KindId,
}

impl Component<Ui> for List {
    fn name(&self) -> &str {
        "list"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::HOST
    }

    fn begin(&self, cx: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        let Some(Props::Items(items)) = cx.input() else {
            return Err(BuildError::failed("list needs items"));
        };
        Ok(items
            .iter()
            .map(|&id| Element::new(self.text, Props::Text(id.to_string())).with_key(u64::from(id)))
            .collect())
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        Ok(cx
            .child_outputs()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(","))
    }
}

/// A transparent node with many unkeyed texts.
struct Wide {
    text: KindId,
}

impl Component<Ui> for Wide {
    fn name(&self) -> &str {
        "wide"
    }

    fn begin(&self, cx: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        let n = match cx.input() {
            Some(Props::Wide(n)) => *n,
            _ => 0,
        };
        Ok((0..n)
            .map(|i| Element::new(self.text, Props::Text(i.to_string())))
            .collect())
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        Ok(cx.child_outputs().count().to_string())
    }
}

fn append(log: &String, c: &char) -> String {
    let mut log = log.clone();
    log.push(*c);
    log
}

/// Shows a string built by appending characters.
struct Log {
    text: KindId,
    handle: Handle<char>,
}

impl Component<Ui> for Log {
    fn name(&self) -> &str {
        "log"
    }

    fn begin(&self, cx: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        let (log, handle) = cx.slot(0, String::new, append)?;
        *self.handle.borrow_mut() = Some(handle);
        Ok(vec![Element::new(self.text, Props::Text((*log).clone()))])
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        Ok(first_child(cx))
    }
}

fn replace(_: &i32, next: &i32) -> i32 {
    *next
}

/// Shows a number that is set, not accumulated.
struct Value {
    text: KindId,
    handle: Handle<i32>,
}

impl Component<Ui> for Value {
    fn name(&self) -> &str {
        "value"
    }

    fn begin(&self, cx: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        let (value, handle) = cx.slot(0, || 0, replace)?;
        *self.handle.borrow_mut() = Some(handle);
        let text = Props::Text(value.to_string());
        Ok(vec![Element::new(self.text, text)])
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        Ok(first_child(cx))
    }
}

/// A log followed by a wide subtree.
struct Stack {
    log: KindId,
    wide: KindId,
}

impl Component<Ui> for Stack {
    fn name(&self) -> &str {
        "stack"
    }

    fn begin(&self, cx: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        let input = cx.input().cloned().unwrap_or(Props::Wide(0));
        Ok(vec![
            Element::new(self.log, Props::Unit),
            Element::new(self.wide, input),
        ])
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        Ok(first_child(cx))
    }
}

/// Fails to build when its input says so.
struct Thrower {
    text: KindId,
}

impl Component<Ui> for Thrower {
    fn name(&self) -> &str {
        "thrower"
    }

    fn begin(&self, cx: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        match cx.input() {
            Some(Props::Fail(true)) => Err(BuildError::failed("boom")),
            Some(Props::Late) => Ok(vec![Element::new(self.text, Props::Late)]),
            _ => Ok(vec![Element::new(self.text, Props::Text("ok".into()))]),
        }
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        Ok(first_child(cx))
    }
}

/// Renders a thrower, or a message once one has failed.
struct Boundary {
    text: KindId,
    thrower: KindId,
}

impl Component<Ui> for Boundary {
    fn name(&self) -> &str {
        "boundary"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ERROR_BOUNDARY
    }

    fn begin(&self, cx: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        let input = cx.input().cloned().unwrap_or(Props::Fail(false));
        if let Some(captured) = cx.captured_error() {
            if input != Props::Fail(false) {
                let message = format!("caught: {}", captured.error);
                return Ok(vec![Element::new(self.text, Props::Text(message))]);
            }
            cx.clear_captured_error();
        }
        Ok(vec![Element::new(self.thrower, input)])
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        Ok(first_child(cx))
    }
}

/// A boundary and a list side by side.
struct Pair {
    boundary: KindId,
    list: KindId,
}

impl Component<Ui> for Pair {
    fn name(&self) -> &str {
        "pair"
    }

    fn begin(&self, cx: &mut BuildContext<'_, Ui>) -> Result<Vec<Element<Ui>>, BuildError> {
        let Some(Props::Pair(fail, items)) = cx.input() else {
            return Err(BuildError::failed("pair needs a flag and items"));
        };
        Ok(vec![
            Element::new(self.boundary, Props::Fail(*fail)),
            Element::new(self.list, Props::Items(items.clone())),
        ])
    }

    fn complete(&self, cx: &CompleteContext<'_, Ui>) -> Result<String, BuildError> {
        Ok(cx
            .child_outputs()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("|"))
    }
}

/// Every begin, bailout and complete step, in order.
#[derive(Debug, Default)]
struct Visits(Vec<(NodeId, WorkPhase)>);

impl TraceSink for Visits {
    fn on_unit_of_work(&mut self, e: &UnitOfWorkEvent) {
        self.0.push((e.node, e.phase));
    }
}

/// Slot indices of dropped delayed updates.
#[derive(Debug, Default)]
struct Drops(Vec<u32>);

impl TraceSink for Drops {
    fn on_update_dropped(&mut self, e: &UpdateDroppedEvent) {
        self.0.push(e.slot);
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Kinds {
    list: KindId,
    wide: KindId,
    log: KindId,
    value: KindId,
    stack: KindId,
    thrower: KindId,
    boundary: KindId,
    pair: KindId,
}

struct Fixture {
    r: Reconciler<Ui, ManualHost, MirrorSink<Ui>>,
    kinds: Kinds,
    log: Handle<char>,
    value: Handle<i32>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_host(ManualHost::new())
    }

    fn with_host(host: ManualHost) -> Self {
        let mut registry = Registry::new();
        let text = registry.register(Text);
        let list = registry.register(List { text });
        let wide = registry.register(Wide { text });
        let log = Handle::default();
        let log_kind = registry.register(Log {
            text,
            handle: Rc::clone(&log),
        });
        let value = Handle::default();
        let value_kind = registry.register(Value {
            text,
            handle: Rc::clone(&value),
        });
        let stack = registry.register(Stack {
            log: log_kind,
            wide,
        });
        let thrower = registry.register(Thrower { text });
        let boundary = registry.register(Boundary { text, thrower });
        let pair = registry.register(Pair { boundary, list });

        Self {
            r: Reconciler::new(
                registry,
                host,
                MirrorSink::new(),
                EngineConfig::interactive(),
            ),
            kinds: Kinds {
                list,
                wide,
                log: log_kind,
                value: value_kind,
                stack,
                thrower,
                boundary,
                pair,
            },
            log,
            value,
        }
    }

    fn mount(&mut self, kind: KindId, input: Props) {
        self.r
            .render(Element::new(kind, input), UpdatePriority::Sync)
            .unwrap();
        assert_eq!(self.r.flush_sync(), Ok(1));
        self.verify();
    }

    fn rerender(&mut self, kind: KindId, input: Props) {
        self.r
            .render(Element::new(kind, input), UpdatePriority::Default)
            .unwrap();
        self.r.flush_sync().unwrap();
        self.verify();
    }

    fn log_handle(&self) -> SlotRef<char> {
        self.log.borrow().clone().unwrap()
    }

    fn value_handle(&self) -> SlotRef<i32> {
        self.value.borrow().clone().unwrap()
    }

    fn output(&self) -> &str {
        self.r.root_output()
    }

    fn verify(&self) {
        let r = &self.r;
        if let Err(mismatch) = r.sink().verify(r.store(), r.registry(), r.current_root()) {
            panic!("{mismatch}");
        }
    }

    fn committed_nodes(&self) -> usize {
        let store = self.r.store();
        store.descendants_at(self.r.current_root().index()).count()
    }
}

fn is_move(op: &EffectOp) -> bool {
    matches!(op, EffectOp::Move { .. })
}

fn is_insert(op: &EffectOp) -> bool {
    matches!(op, EffectOp::Insert { .. })
}

fn is_delete(op: &EffectOp) -> bool {
    matches!(op, EffectOp::Delete { .. })
}

// ---------------------------------------------------------------------------
// Mounting and child reconciliation
// ---------------------------------------------------------------------------

#[test]
fn mount_inserts_hosts_in_order() {
    let mut f = Fixture::new();
    f.mount(f.kinds.list, Props::Items(vec![1, 2, 3]));

    assert_eq!(f.output(), "1,2,3");
    assert_eq!(f.r.generation(), 1);
    let sink = f.r.sink();
    assert_eq!(sink.len(), 4);
    let list = sink.children(None)[0];
    assert_eq!(sink.child_outputs(Some(list)), ["1", "2", "3"]);
    assert_eq!(sink.count_last(is_insert), 4);
}

#[test]
fn keyed_rotation_moves_one_node() {
    let mut f = Fixture::new();
    f.mount(f.kinds.list, Props::Items(vec![1, 2, 3, 4]));
    f.rerender(f.kinds.list, Props::Items(vec![2, 3, 4, 1]));

    assert_eq!(f.output(), "2,3,4,1");
    let sink = f.r.sink();
    assert_eq!(sink.count_last(is_move), 1);
    assert_eq!(sink.count_last(is_insert), 0);
    assert_eq!(sink.count_last(is_delete), 0);
    let list = sink.children(None)[0];
    assert_eq!(sink.child_outputs(Some(list)), ["2", "3", "4", "1"]);
}

#[test]
fn keyed_insert_delete_and_move() {
    let mut f = Fixture::new();
    f.mount(f.kinds.list, Props::Items(vec![1, 2, 3]));
    let list = f.r.sink().children(None)[0];
    let kept: Vec<_> = f.r.sink().children(Some(list)).to_vec();

    f.rerender(f.kinds.list, Props::Items(vec![3, 4, 1]));

    let sink = f.r.sink();
    assert_eq!(sink.child_outputs(Some(list)), ["3", "4", "1"]);
    assert_eq!(sink.count_last(is_delete), 1);
    assert_eq!(sink.count_last(is_insert), 1);
    assert_eq!(sink.count_last(is_move), 1);
    // Reused positions keep their instance.
    let now = sink.children(Some(list));
    assert_eq!(now[0], kept[2]);
    assert_eq!(now[2], kept[0]);
}

#[test]
fn replacing_the_root_kind_swaps_the_subtree() {
    let mut f = Fixture::new();
    f.mount(f.kinds.list, Props::Items(vec![1, 2]));
    f.rerender(f.kinds.wide, Props::Wide(3));

    assert_eq!(f.output(), "3");
    let sink = f.r.sink();
    assert_eq!(sink.count_last(is_delete), 1);
    assert_eq!(sink.count_last(is_insert), 3);
    assert_eq!(sink.child_outputs(None), ["0", "1", "2"]);
}

#[test]
fn duplicate_keys_are_fatal_without_a_boundary() {
    let mut f = Fixture::new();
    f.mount(f.kinds.list, Props::Items(vec![1]));
    f.r.render(
        Element::new(f.kinds.list, Props::Items(vec![5, 5])),
        UpdatePriority::Default,
    )
    .unwrap();
    let err = f.r.flush_sync().unwrap_err();
    assert!(
        matches!(
            err,
            FatalError::Uncaught {
                error: BuildError::DuplicateKey { .. },
                ..
            }
        ),
        "{err:?}"
    );
    assert_eq!(f.output(), "1");
}

#[test]
fn double_buffering_bounds_node_count() {
    let mut f = Fixture::new();
    f.mount(f.kinds.list, Props::Items(vec![1, 2, 3, 4, 5]));
    let mut items = vec![1, 2, 3, 4, 5];
    for round in 0..10_u32 {
        items.rotate_left(1);
        if round % 3 == 0 {
            items.push(10 + round);
        }
        f.rerender(f.kinds.list, Props::Items(items.clone()));
        let live = f.r.store().live_count();
        let committed = f.committed_nodes();
        assert!(
            live <= 2 * committed,
            "round {round}: {live} live nodes for {committed} positions"
        );
    }
}

#[test]
fn rendering_is_deterministic() {
    fn script() -> (Fixture, Vec<(NodeId, WorkPhase)>) {
        let mut f = Fixture::new();
        let visits = Rc::new(RefCell::new(Visits::default()));
        f.r.set_trace_sink(Box::new(Rc::clone(&visits)));
        f.mount(f.kinds.list, Props::Items(vec![1, 2, 3]));
        f.rerender(f.kinds.list, Props::Items(vec![3, 1, 4]));
        f.rerender(f.kinds.stack, Props::Wide(2));
        f.rerender(f.kinds.stack, Props::Wide(3));
        drop(f.r.take_trace_sink());
        let visits = visits.borrow().0.clone();
        (f, visits)
    }
    let (a, a_visits) = script();
    let (b, b_visits) = script();

    assert!(!a_visits.is_empty());
    assert_eq!(a_visits, b_visits, "same pre and post order");
    let opened = a_visits
        .iter()
        .filter(|(_, phase)| *phase != WorkPhase::Complete)
        .count();
    assert_eq!(opened * 2, a_visits.len(), "every visit is closed once");
    assert!(
        a_visits.iter().any(|(_, phase)| *phase == WorkPhase::Bailout),
        "the last render skips the unchanged log"
    );
    assert_eq!(a.r.sink().commits(), b.r.sink().commits());
}

// ---------------------------------------------------------------------------
// State updates and lanes
// ---------------------------------------------------------------------------

#[test]
fn eager_bailout_skips_render() {
    let mut f = Fixture::new();
    f.mount(f.kinds.value, Props::Unit);
    assert_eq!(f.output(), "0");
    let handle = f.value_handle();

    let outcome = f.r.enqueue_update(&handle, 0, UpdatePriority::Default);
    assert_eq!(outcome, Ok(EnqueueOutcome::EagerBailout));
    assert_eq!(f.r.pending_lanes(), Lanes::NONE);
    assert_eq!(f.r.scheduled_tasks(), 0);

    let outcome = f.r.enqueue_update(&handle, 5, UpdatePriority::Default);
    assert_eq!(outcome, Ok(EnqueueOutcome::Scheduled(Lanes::DEFAULT)));
    run_until_idle(&mut f.r, 10);
    assert_eq!(f.output(), "5");

    // The node rendered once already; the bailout still applies.
    let outcome = f.r.enqueue_update(&handle, 5, UpdatePriority::Default);
    assert_eq!(outcome, Ok(EnqueueOutcome::EagerBailout));
    assert_eq!(f.r.stats().eager_bailouts, 2);
    f.verify();
}

#[test]
fn sync_update_commits_before_default() {
    let mut f = Fixture::new();
    f.mount(f.kinds.log, Props::Unit);
    let handle = f.log_handle();

    f.r.enqueue_update(&handle, 'a', UpdatePriority::Default)
        .unwrap();
    f.r.enqueue_update(&handle, 'b', UpdatePriority::Sync).unwrap();

    assert_eq!(f.r.commit(), Ok(true));
    assert_eq!(f.output(), "b");
    assert_eq!(f.r.pending_lanes(), Lanes::DEFAULT);

    assert_eq!(f.r.commit(), Ok(true));
    assert_eq!(f.output(), "ab");
    assert_eq!(f.r.commit(), Ok(false));

    let lanes: Vec<_> = f.r.sink().commits().iter().map(|c| c.lanes).collect();
    assert_eq!(lanes, [Lanes::SYNC, Lanes::SYNC, Lanes::DEFAULT]);
    f.verify();
}

#[test]
fn lane_order_does_not_change_the_result() {
    let mut split = Fixture::new();
    split.mount(split.kinds.log, Props::Unit);
    let handle = split.log_handle();
    for (c, priority) in [
        ('a', UpdatePriority::Default),
        ('b', UpdatePriority::Sync),
        ('c', UpdatePriority::Default),
    ] {
        split.r.enqueue_update(&handle, c, priority).unwrap();
    }
    assert_eq!(split.r.flush_sync(), Ok(2));

    let mut direct = Fixture::new();
    direct.mount(direct.kinds.log, Props::Unit);
    let handle = direct.log_handle();
    for c in ['a', 'b', 'c'] {
        direct
            .r
            .enqueue_update(&handle, c, UpdatePriority::Default)
            .unwrap();
    }
    assert_eq!(direct.r.flush_sync(), Ok(1));

    assert_eq!(split.output(), "abc");
    assert_eq!(direct.output(), "abc");
}

#[test]
fn stale_handles_are_rejected() {
    let mut f = Fixture::new();
    f.mount(f.kinds.value, Props::Unit);
    let handle = f.value_handle();
    f.rerender(f.kinds.list, Props::Items(vec![]));

    let err = f.r.enqueue_update(&handle, 3, UpdatePriority::Default);
    assert!(
        matches!(err, Err(trellis_core::EngineError::StaleNode(_))),
        "{err:?}"
    );
}

// ---------------------------------------------------------------------------
// Time slicing, interruption and starvation
// ---------------------------------------------------------------------------

/// Clock cost of one read, which is roughly one unit of work.
const READ_COST: Duration = Duration::from_millis(1);
const DELAY: Duration = Duration::from_millis(100);

fn sliced() -> Fixture {
    Fixture::with_host(ManualHost::new().with_auto_advance(READ_COST))
}

#[test]
fn long_renders_yield_and_resume() {
    let mut f = sliced();
    f.r.render(
        Element::new(f.kinds.wide, Props::Wide(60)),
        UpdatePriority::Default,
    )
    .unwrap();

    assert!(run_slice(&mut f.r));
    assert!(f.r.is_rendering(), "one slice cannot finish 60 nodes");
    assert_eq!(f.r.generation(), 0);

    let slices = run_until_idle(&mut f.r, 100);
    assert!(slices > 1);
    assert!(f.r.stats().yields > 0);
    assert_eq!(f.r.generation(), 1);
    assert_eq!(f.output(), "60");
    assert_eq!(f.r.sink().len(), 60);
    f.verify();
}

#[test]
fn urgent_update_interrupts_and_keeps_order() {
    let mut f = sliced();
    f.mount(f.kinds.stack, Props::Wide(10));
    let handle = f.log_handle();

    f.r.enqueue_update(&handle, 'a', UpdatePriority::Default)
        .unwrap();
    f.r.render(
        Element::new(f.kinds.stack, Props::Wide(80)),
        UpdatePriority::Default,
    )
    .unwrap();
    assert!(run_slice(&mut f.r));
    assert!(f.r.is_rendering());
    assert_eq!(f.r.rendering_lanes(), Lanes::DEFAULT);

    f.r.enqueue_update(&handle, 'b', UpdatePriority::Sync).unwrap();
    run_until_idle(&mut f.r, 200);

    assert_eq!(f.r.stats().renders_interrupted, 1);
    assert_eq!(f.output(), "ab");
    let lanes: Vec<_> = f.r.sink().commits().iter().map(|c| c.lanes).collect();
    assert_eq!(lanes, [Lanes::SYNC, Lanes::SYNC, Lanes::DEFAULT]);
    f.verify();
}

#[test]
fn starved_lanes_render_without_yielding() {
    let mut f = sliced();
    f.mount(f.kinds.stack, Props::Wide(10));
    let handle = f.log_handle();

    f.r.enqueue_update(&handle, 'a', UpdatePriority::Default)
        .unwrap();
    f.r.host().advance(Duration::from_millis(6_000));
    f.r.render(
        Element::new(f.kinds.stack, Props::Wide(80)),
        UpdatePriority::Default,
    )
    .unwrap();
    assert!(f.r.expired_lanes().intersects(Lanes::DEFAULT));
    assert!(f.r.stats().starved_lanes_promoted >= 1);

    assert!(run_slice(&mut f.r));
    assert!(!f.r.is_rendering());
    assert_eq!(f.r.stats().yields, 0);
    assert_eq!(f.output(), "a");
    assert_eq!(f.r.expired_lanes(), Lanes::NONE);
    f.verify();
}

#[test]
fn delayed_update_waits_for_timeout() {
    let mut f = Fixture::new();
    f.mount(f.kinds.value, Props::Unit);
    let handle = f.value_handle();
    f.r.host_mut().clear_requests();

    f.r.enqueue_update_after(&handle, 7, UpdatePriority::Default, DELAY)
        .unwrap();
    assert_eq!(f.r.host().requests(), [HostRequest::Timeout(DELAY)]);
    assert_eq!(f.r.pending_lanes(), Lanes::NONE);

    run_until_idle(&mut f.r, 10);
    assert_eq!(f.output(), "7");
    f.verify();
}

#[test]
fn cancelled_delayed_update_never_lands() {
    let mut f = Fixture::new();
    f.mount(f.kinds.value, Props::Unit);
    let handle = f.value_handle();

    let task = f
        .r
        .enqueue_update_after(&handle, 7, UpdatePriority::Default, DELAY)
        .unwrap();
    assert!(f.r.cancel_delayed(task));
    assert!(!f.r.cancel_delayed(task));
    assert_eq!(f.r.host().timeout_at(), None);

    run_until_idle(&mut f.r, 10);
    assert_eq!(f.output(), "0");
    assert_eq!(f.r.scheduled_tasks(), 0);
}

#[test]
fn delayed_update_for_a_removed_node_is_dropped() {
    let mut f = Fixture::new();
    f.mount(f.kinds.value, Props::Unit);
    let handle = f.value_handle();
    let drops = Rc::new(RefCell::new(Drops::default()));
    f.r.set_trace_sink(Box::new(Rc::clone(&drops)));
    f.r.enqueue_update_after(&handle, 7, UpdatePriority::Default, DELAY)
        .unwrap();
    f.rerender(f.kinds.list, Props::Items(vec![1]));

    run_until_idle(&mut f.r, 10);
    assert_eq!(f.r.stats().updates_dropped, 1);
    assert_eq!(drops.borrow().0, [0]);
    assert_eq!(f.output(), "1");
    assert_eq!(f.r.pending_lanes(), Lanes::NONE);
    assert_eq!(f.r.scheduled_tasks(), 0);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn boundary_captures_and_recovers() {
    let mut f = Fixture::new();
    f.mount(f.kinds.boundary, Props::Fail(false));
    assert_eq!(f.output(), "ok");

    f.rerender(f.kinds.boundary, Props::Fail(true));
    assert_eq!(f.output(), "caught: boom");
    assert_eq!(f.r.stats().errors_captured, 1);
    assert_eq!(f.r.sink().child_outputs(None), ["caught: boom"]);

    f.rerender(f.kinds.boundary, Props::Fail(false));
    assert_eq!(f.output(), "ok");
    assert_eq!(f.r.sink().child_outputs(None), ["ok"]);
}

#[test]
fn boundary_captures_errors_from_complete() {
    let mut f = Fixture::new();
    f.mount(f.kinds.boundary, Props::Fail(false));

    f.rerender(f.kinds.boundary, Props::Late);
    assert_eq!(f.output(), "caught: late");
    assert_eq!(f.r.stats().errors_captured, 1);
    assert_eq!(f.r.sink().child_outputs(None), ["caught: late"]);
}

#[test]
fn boundary_captures_while_mounting() {
    let mut f = Fixture::new();
    f.mount(f.kinds.boundary, Props::Fail(true));

    assert_eq!(f.output(), "caught: boom");
    assert_eq!(f.r.stats().errors_captured, 1);
    assert_eq!(f.r.sink().count_last(is_insert), 1);
    assert_eq!(f.r.sink().child_outputs(None), ["caught: boom"]);
}

#[test]
fn boundary_siblings_are_untouched() {
    let mut f = Fixture::new();
    f.mount(f.kinds.pair, Props::Pair(false, vec![1, 2]));
    assert_eq!(f.output(), "ok|1,2");
    let list = f.r.sink().children(None)[1];
    let items = f.r.sink().children(Some(list)).to_vec();

    f.rerender(f.kinds.pair, Props::Pair(true, vec![1, 2]));
    assert_eq!(f.output(), "caught: boom|1,2");
    let sink = f.r.sink();
    assert_eq!(sink.child_outputs(None), ["caught: boom", "1,2"]);
    assert_eq!(sink.children(None)[1], list);
    assert_eq!(sink.children(Some(list)), items.as_slice());
    let last = sink.last_commit().unwrap();
    assert!(
        last.effects
            .iter()
            .all(|e| e.instance != list && !items.contains(&e.instance)),
        "{last:?}"
    );
}

#[test]
fn uncaught_error_leaves_tree_untouched() {
    let mut f = Fixture::new();
    f.mount(f.kinds.list, Props::Items(vec![1, 2]));
    let commits = f.r.sink().commits().len();

    f.r.render(
        Element::new(f.kinds.thrower, Props::Fail(true)),
        UpdatePriority::Default,
    )
    .unwrap();
    let err = f.r.flush_sync().unwrap_err();
    assert_eq!(
        err,
        FatalError::Uncaught {
            component: "thrower".into(),
            error: BuildError::failed("boom"),
        }
    );
    assert_eq!(f.r.generation(), 1);
    assert_eq!(f.r.sink().commits().len(), commits);
    assert_eq!(f.r.pending_lanes(), Lanes::NONE);
    assert_eq!(f.output(), "1,2");
    assert_eq!(f.r.stats().fatal_errors, 1);
    f.verify();

    f.rerender(f.kinds.list, Props::Items(vec![1, 2, 3]));
    assert_eq!(f.output(), "1,2,3");
}

#[test]
fn sliced_fatal_error_is_recorded() {
    let mut f = Fixture::new();
    f.r.render(
        Element::new(f.kinds.thrower, Props::Fail(true)),
        UpdatePriority::Default,
    )
    .unwrap();
    run_until_idle(&mut f.r, 10);

    assert!(matches!(
        f.r.take_fatal_error(),
        Some(FatalError::Uncaught { .. })
    ));
    assert!(f.r.take_fatal_error().is_none());
    assert_eq!(f.r.generation(), 0);
    assert!(f.r.sink().is_empty());
}
