// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node state slots and their two-tier update queues.
//!
//! Each node owns an ordered list of [`Slot`]s, addressed by index. A slot
//! holds a value plus two queues:
//!
//! - the **pending** queue, shared between the node's two physical copies,
//!   where [`Reconciler::enqueue_update`](crate::reconciler::Reconciler::enqueue_update)
//!   appends new updates;
//! - the **base** queue, owned by each copy, holding updates that a previous
//!   render skipped because their lane was not being rendered.
//!
//! Processing splices pending onto base and folds the result. Updates whose
//! lane is outside the render lanes are kept, in order, for a later pass;
//! once one update has been skipped, every later update is also kept so the
//! later pass replays them in their original order on top of the right base
//! value.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData;

use crate::lane::Lanes;
use crate::node::NodeId;

/// Type-erased reducer stored with a slot's queue.
pub(crate) trait ErasedReducer {
    /// Applies `action` to `state`, or returns `None` on a type mismatch.
    fn reduce(&self, state: &dyn Any, action: &dyn Any) -> Option<Rc<dyn Any>>;

    /// Structural equality of two values of the slot's state type.
    fn same(&self, a: &dyn Any, b: &dyn Any) -> bool;
}

struct TypedReducer<S, A> {
    reducer: fn(&S, &A) -> S,
}

impl<S: PartialEq + 'static, A: 'static> ErasedReducer for TypedReducer<S, A> {
    fn reduce(&self, state: &dyn Any, action: &dyn Any) -> Option<Rc<dyn Any>> {
        let state = state.downcast_ref::<S>()?;
        let action = action.downcast_ref::<A>()?;
        Some(Rc::new((self.reducer)(state, action)))
    }

    fn same(&self, a: &dyn Any, b: &dyn Any) -> bool {
        match (a.downcast_ref::<S>(), b.downcast_ref::<S>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// One pending mutation of a slot.
#[derive(Clone, Debug)]
pub(crate) struct Update {
    pub(crate) lane: Lanes,
    pub(crate) action: Rc<dyn Any>,
    /// Result precomputed at enqueue time against the last rendered value.
    pub(crate) eager: Option<Rc<dyn Any>>,
}

/// Queue state shared by both physical copies of a slot.
pub(crate) struct SharedQueue {
    pub(crate) pending: VecDeque<Update>,
    pub(crate) last_rendered: Rc<dyn Any>,
    pub(crate) reducer: Rc<dyn ErasedReducer>,
    pub(crate) action_type: TypeId,
}

impl fmt::Debug for SharedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedQueue")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SharedQueue {
    /// Runs the reducer against the last rendered value.
    pub(crate) fn reduce_last_rendered(&self, action: &dyn Any) -> Option<Rc<dyn Any>> {
        self.reducer.reduce(&*self.last_rendered, action)
    }
}

/// One unit of node-local state.
#[derive(Clone)]
pub(crate) struct Slot {
    pub(crate) value: Rc<dyn Any>,
    pub(crate) base_value: Rc<dyn Any>,
    pub(crate) base_queue: Vec<Update>,
    pub(crate) queue: Rc<RefCell<SharedQueue>>,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("base_queue", &self.base_queue.len())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl Slot {
    /// Creates a slot holding `initial` with a reducer fixed for its lifetime.
    pub(crate) fn new<S, A>(initial: S, reducer: fn(&S, &A) -> S) -> Self
    where
        S: PartialEq + 'static,
        A: 'static,
    {
        let value: Rc<dyn Any> = Rc::new(initial);
        Self {
            base_value: Rc::clone(&value),
            base_queue: Vec::new(),
            queue: Rc::new(RefCell::new(SharedQueue {
                pending: VecDeque::new(),
                last_rendered: Rc::clone(&value),
                reducer: Rc::new(TypedReducer { reducer }),
                action_type: TypeId::of::<A>(),
            })),
            value,
        }
    }

    /// Returns whether this slot was created for state `S` and action `A`.
    pub(crate) fn matches<S: 'static, A: 'static>(&self) -> bool {
        self.value.is::<S>() && self.queue.borrow().action_type == TypeId::of::<A>()
    }
}

/// Splices the pending queue onto the base queue and folds every update
/// whose lane is in `render_lanes`.
///
/// `current` is the committed copy of the slot, if any. It receives the
/// merged base queue so that discarding this render loses no update.
///
/// Returns the lanes of the updates that were skipped, or `None` if the
/// reducer rejected an action's type.
pub(crate) fn process_slot(
    wip: &mut Slot,
    current: Option<&mut Slot>,
    render_lanes: Lanes,
) -> Option<Lanes> {
    let queue = Rc::clone(&wip.queue);
    let mut shared = queue.borrow_mut();

    if !shared.pending.is_empty() {
        wip.base_queue.extend(shared.pending.drain(..));
        if let Some(current) = current {
            current.base_queue.clone_from(&wip.base_queue);
        }
    }
    if wip.base_queue.is_empty() {
        return Some(Lanes::NONE);
    }

    let mut state = Rc::clone(&wip.base_value);
    let mut rebase: Option<Rc<dyn Any>> = None;
    let mut deferred = Vec::new();
    let mut remaining = Lanes::NONE;

    for update in &wip.base_queue {
        if render_lanes.is_subset(update.lane) {
            if rebase.is_some() {
                // Replays after the first skipped update, whatever its lane.
                deferred.push(Update {
                    lane: Lanes::NONE,
                    ..update.clone()
                });
            }
            state = match &update.eager {
                Some(value) => Rc::clone(value),
                None => shared.reducer.reduce(&*state, &*update.action)?,
            };
        } else {
            if rebase.is_none() {
                rebase = Some(Rc::clone(&state));
            }
            deferred.push(update.clone());
            remaining |= update.lane;
        }
    }

    wip.base_value = rebase.unwrap_or_else(|| Rc::clone(&state));
    wip.base_queue = deferred;
    shared.last_rendered = Rc::clone(&state);
    wip.value = state;
    Some(remaining)
}

/// A handle for enqueuing updates into one state slot.
///
/// Handed out by [`BuildContext::slot`](crate::component::BuildContext::slot).
/// The handle stays valid for as long as the node's tree position exists;
/// after that, enqueuing through it fails with
/// [`EngineError::StaleNode`](crate::error::EngineError::StaleNode).
pub struct SlotRef<A> {
    pub(crate) node: NodeId,
    pub(crate) index: u32,
    pub(crate) queue: Rc<RefCell<SharedQueue>>,
    _action: PhantomData<fn(A)>,
}

impl<A> SlotRef<A> {
    pub(crate) fn new(node: NodeId, index: u32, queue: Rc<RefCell<SharedQueue>>) -> Self {
        Self {
            node,
            index,
            queue,
            _action: PhantomData,
        }
    }

    /// The node that owned the slot when the handle was created.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The slot's index within its node.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Number of updates waiting to be processed.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.borrow().pending.len()
    }
}

impl<A> Clone for SlotRef<A> {
    fn clone(&self) -> Self {
        Self::new(self.node, self.index, Rc::clone(&self.queue))
    }
}

impl<A> fmt::Debug for SlotRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRef")
            .field("node", &self.node)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn push(list: &Vec<u32>, item: &u32) -> Vec<u32> {
        let mut next = list.clone();
        next.push(*item);
        next
    }

    fn enqueue(slot: &Slot, lane: Lanes, item: u32) {
        slot.queue.borrow_mut().pending.push_back(Update {
            lane,
            action: Rc::new(item),
            eager: None,
        });
    }

    fn value(slot: &Slot) -> Vec<u32> {
        slot.value.downcast_ref::<Vec<u32>>().cloned().unwrap()
    }

    #[test]
    fn same_lane_updates_fold_in_order() {
        let mut slot = Slot::new(Vec::<u32>::new(), push);
        enqueue(&slot, Lanes::DEFAULT, 1);
        enqueue(&slot, Lanes::DEFAULT, 2);
        enqueue(&slot, Lanes::DEFAULT, 3);

        let remaining = process_slot(&mut slot, None, Lanes::DEFAULT).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(value(&slot), vec![1, 2, 3]);
        assert!(slot.base_queue.is_empty());
    }

    #[test]
    fn skipped_update_is_replayed_in_enqueue_order() {
        let mut current = Slot::new(Vec::<u32>::new(), push);
        enqueue(&current, Lanes::DEFAULT, 1);
        enqueue(&current, Lanes::SYNC, 2);

        let mut wip = current.clone();
        let remaining = process_slot(&mut wip, Some(&mut current), Lanes::SYNC).unwrap();
        assert_eq!(remaining, Lanes::DEFAULT);
        assert_eq!(value(&wip), vec![2], "sync pass sees only the sync update");
        assert_eq!(wip.base_queue.len(), 2, "skipped update plus its replay");
        assert_eq!(
            current.base_queue.len(),
            2,
            "current keeps the merged queue"
        );

        let mut next = wip.clone();
        let remaining = process_slot(&mut next, Some(&mut wip), Lanes::DEFAULT).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(value(&next), vec![1, 2], "replay restores enqueue order");
        assert!(next.base_queue.is_empty());
    }

    #[test]
    fn discarded_render_loses_nothing() {
        let mut current = Slot::new(Vec::<u32>::new(), push);
        enqueue(&current, Lanes::DEFAULT, 7);

        let mut abandoned = current.clone();
        process_slot(&mut abandoned, Some(&mut current), Lanes::DEFAULT).unwrap();

        let mut retry = current.clone();
        process_slot(&mut retry, Some(&mut current), Lanes::DEFAULT).unwrap();
        assert_eq!(value(&retry), vec![7]);
    }

    #[test]
    fn reprocessing_is_idempotent() {
        let mut slot = Slot::new(Vec::<u32>::new(), push);
        enqueue(&slot, Lanes::IDLE, 1);
        enqueue(&slot, Lanes::DEFAULT, 2);
        process_slot(&mut slot, None, Lanes::DEFAULT).unwrap();
        let first = value(&slot);
        process_slot(&mut slot, None, Lanes::DEFAULT).unwrap();
        assert_eq!(value(&slot), first);
    }

    #[test]
    fn eager_value_is_used_verbatim() {
        let mut slot = Slot::new(Vec::<u32>::new(), push);
        slot.queue.borrow_mut().pending.push_back(Update {
            lane: Lanes::DEFAULT,
            action: Rc::new(5_u32),
            eager: Some(Rc::new(vec![42_u32])),
        });
        process_slot(&mut slot, None, Lanes::DEFAULT).unwrap();
        assert_eq!(value(&slot), vec![42]);
    }

    #[test]
    fn mismatched_action_type_is_rejected() {
        let mut slot = Slot::new(Vec::<u32>::new(), push);
        slot.queue.borrow_mut().pending.push_back(Update {
            lane: Lanes::DEFAULT,
            action: Rc::new("wrong"),
            eager: None,
        });
        assert!(process_slot(&mut slot, None, Lanes::DEFAULT).is_none());
    }

    #[test]
    fn slot_type_matching() {
        let slot = Slot::new(0_i32, |s: &i32, a: &i32| s + a);
        assert!(slot.matches::<i32, i32>());
        assert!(!slot.matches::<i32, u8>());
        assert!(!slot.matches::<u8, i32>());
    }
}
