// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Components: the per-kind build logic the reconciler dispatches to.
//!
//! A tree is parameterized by [`TreeTypes`], which fixes the input every
//! node is configured with and the output every node derives. Each node kind
//! is a [`Component`] registered in a [`Registry`]. During a render the
//! reconciler calls [`Component::begin`] on the way down (to produce the
//! node's children as [`Element`]s) and [`Component::complete`] on the way
//! up (to derive the node's output from its children's outputs).
//!
//! Component code is pure with respect to the committed tree. The only
//! persistent state it may touch is its own state slots, through
//! [`BuildContext::slot`].

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;

use crate::error::{BuildError, CapturedError};
use crate::lane::Lanes;
use crate::node::{INVALID, Key, KindId, NodeId, NodeStore};
use crate::state::{Slot, SlotRef, process_slot};

/// The input and output types of a tree.
pub trait TreeTypes: 'static {
    /// Configuration a node is built with.
    type Input: Clone + PartialEq + fmt::Debug + 'static;
    /// Value a node derives in its complete phase.
    type Output: Clone + PartialEq + Default + fmt::Debug + 'static;
}

bitflags::bitflags! {
    /// What a component kind is allowed to do.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Nodes of this kind exist in the effect sink's target tree.
        const HOST = 1 << 0;
        /// Nodes of this kind catch build errors raised below them.
        const ERROR_BOUNDARY = 1 << 1;
    }
}

/// A description of one child: which kind builds it, its key among its
/// siblings, and its input.
pub struct Element<T: TreeTypes> {
    /// The component kind.
    pub kind: KindId,
    /// Stable identity among siblings; `None` matches by position.
    pub key: Option<Key>,
    /// The node's input.
    pub input: T::Input,
}

impl<T: TreeTypes> Element<T> {
    /// Creates an unkeyed element.
    #[must_use]
    pub fn new(kind: KindId, input: T::Input) -> Self {
        Self {
            kind,
            key: None,
            input,
        }
    }

    /// Sets the element's key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl<T: TreeTypes> Clone for Element<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            key: self.key.clone(),
            input: self.input.clone(),
        }
    }
}

impl<T: TreeTypes> PartialEq for Element<T> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.key == other.key && self.input == other.input
    }
}

impl<T: TreeTypes> fmt::Debug for Element<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("input", &self.input)
            .finish()
    }
}

/// Build logic for one node kind.
pub trait Component<T: TreeTypes> {
    /// Human-readable name used in errors and traces.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// What nodes of this kind are allowed to do.
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Produces the node's children.
    ///
    /// # Errors
    ///
    /// Any error is routed to the nearest error boundary above the node.
    fn begin(&self, cx: &mut BuildContext<'_, T>) -> Result<Vec<Element<T>>, BuildError>;

    /// Derives the node's output once every child has completed.
    ///
    /// The default returns `T::Output::default()`.
    ///
    /// # Errors
    ///
    /// Any error is routed to the nearest error boundary above the node.
    fn complete(&self, cx: &CompleteContext<'_, T>) -> Result<T::Output, BuildError> {
        _ = cx;
        Ok(T::Output::default())
    }
}

/// The set of component kinds a reconciler can build.
///
/// Kind `0` is reserved for the built-in root.
pub struct Registry<T: TreeTypes> {
    components: Vec<Box<dyn Component<T>>>,
}

impl<T: TreeTypes> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.components.iter().map(|c| c.name()))
            .finish()
    }
}

impl<T: TreeTypes> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TreeTypes> Registry<T> {
    /// Creates a registry holding only the root kind.
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: alloc::vec![Box::new(RootComponent::<T>(PhantomData))],
        }
    }

    /// Registers a component and returns its kind id.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "kind ids are u32; no registry holds 2^32 kinds"
    )]
    pub fn register(&mut self, component: impl Component<T> + 'static) -> KindId {
        let kind = KindId(self.components.len() as u32);
        self.components.push(Box::new(component));
        kind
    }

    /// Returns the component for a kind.
    #[must_use]
    pub fn get(&self, kind: KindId) -> Option<&dyn Component<T>> {
        self.components.get(kind.0 as usize).map(|c| &**c)
    }

    /// Returns the capabilities of a kind (empty for unknown kinds).
    #[must_use]
    pub fn capabilities(&self, kind: KindId) -> Capabilities {
        self.get(kind).map_or(Capabilities::empty(), |c| c.capabilities())
    }

    /// Returns the name of a kind.
    #[must_use]
    pub fn name(&self, kind: KindId) -> &str {
        self.get(kind).map_or("<unknown>", |c| c.name())
    }

    /// Number of registered kinds, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always `false`: the root kind is always registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// The root renders the single element most recently passed to
/// [`Reconciler::render`](crate::reconciler::Reconciler::render), held in
/// state slot 0.
struct RootComponent<T>(PhantomData<fn() -> T>);

impl<T: TreeTypes> Component<T> for RootComponent<T> {
    fn name(&self) -> &str {
        "root"
    }

    fn begin(&self, cx: &mut BuildContext<'_, T>) -> Result<Vec<Element<T>>, BuildError> {
        let (element, _) = cx.slot(0, || None, replace_root::<T>)?;
        Ok(Option::clone(&element).into_iter().collect())
    }

    fn complete(&self, cx: &CompleteContext<'_, T>) -> Result<T::Output, BuildError> {
        Ok(cx.child_outputs().next().cloned().unwrap_or_default())
    }
}

fn replace_root<T: TreeTypes>(_: &Option<Element<T>>, next: &Element<T>) -> Option<Element<T>> {
    Some(next.clone())
}

/// Creates the root's element slot.
pub(crate) fn root_slot<T: TreeTypes>() -> Slot {
    Slot::new::<Option<Element<T>>, Element<T>>(None, replace_root::<T>)
}

/// What a component sees in its begin phase.
pub struct BuildContext<'a, T: TreeTypes> {
    pub(crate) node: NodeId,
    pub(crate) input: Option<&'a T::Input>,
    pub(crate) prior_output: Option<&'a T::Output>,
    pub(crate) captured: Option<&'a CapturedError>,
    pub(crate) slots: &'a mut Vec<Slot>,
    pub(crate) current_slots: Option<&'a mut Vec<Slot>>,
    pub(crate) render_lanes: Lanes,
    pub(crate) remaining_lanes: Lanes,
    pub(crate) touched: usize,
    pub(crate) clear_captured: bool,
}

impl<T: TreeTypes> fmt::Debug for BuildContext<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("node", &self.node)
            .field("input", &self.input)
            .field("render_lanes", &self.render_lanes)
            .field("touched", &self.touched)
            .finish_non_exhaustive()
    }
}

impl<'a, T: TreeTypes> BuildContext<'a, T> {
    /// The node being built.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The node's input. `None` only for the root.
    #[must_use]
    pub fn input(&self) -> Option<&'a T::Input> {
        self.input
    }

    /// The output from the node's last completed render, if any.
    #[must_use]
    pub fn prior_output(&self) -> Option<&'a T::Output> {
        self.prior_output
    }

    /// Returns whether the node has never been committed.
    #[must_use]
    pub fn is_mounting(&self) -> bool {
        self.prior_output.is_none()
    }

    /// The lanes being rendered.
    #[must_use]
    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    /// The error this boundary has caught, if any.
    ///
    /// A captured error stays visible on later renders until
    /// [`clear_captured_error`](Self::clear_captured_error) is called.
    #[must_use]
    pub fn captured_error(&self) -> Option<&'a CapturedError> {
        if self.clear_captured {
            None
        } else {
            self.captured
        }
    }

    /// Drops the captured error once this render commits.
    pub fn clear_captured_error(&mut self) {
        self.clear_captured = true;
    }

    /// Returns state slot `index`, creating it with `init` on first build.
    ///
    /// Slots must be requested in index order, with the same state and action
    /// types, and every slot the node owns must be requested on each build.
    /// `reducer` is fixed when the slot is created; later calls may pass any
    /// function of the same type.
    ///
    /// Updates whose lane is being rendered are applied; the rest stay queued
    /// for a later render and keep their lanes on the node.
    ///
    /// # Errors
    ///
    /// [`BuildError::SlotOrder`], [`BuildError::SlotMissing`] or
    /// [`BuildError::SlotType`] when the request does not match the node's
    /// slot list.
    pub fn slot<S, A>(
        &mut self,
        index: usize,
        init: impl FnOnce() -> S,
        reducer: fn(&S, &A) -> S,
    ) -> Result<(Rc<S>, SlotRef<A>), BuildError>
    where
        S: PartialEq + 'static,
        A: 'static,
    {
        if index != self.touched {
            return Err(BuildError::SlotOrder {
                expected: self.touched,
                got: index,
            });
        }
        if self.current_slots.is_none() && index == self.slots.len() {
            self.slots.push(Slot::new(init(), reducer));
        } else if index >= self.slots.len() {
            return Err(BuildError::SlotMissing { index });
        } else {
            let slot = &mut self.slots[index];
            if !slot.matches::<S, A>() {
                return Err(BuildError::SlotType { index });
            }
            let current = self
                .current_slots
                .as_deref_mut()
                .and_then(|slots| slots.get_mut(index));
            let remaining = process_slot(slot, current, self.render_lanes)
                .ok_or(BuildError::SlotType { index })?;
            self.remaining_lanes |= remaining;
        }
        self.touched += 1;

        let slot = &self.slots[index];
        let value =
            Rc::downcast::<S>(Rc::clone(&slot.value)).map_err(|_| BuildError::SlotType { index })?;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "slot indices are bounded by the slot list length"
        )]
        let handle = SlotRef::new(self.node, index as u32, Rc::clone(&slot.queue));
        Ok((value, handle))
    }

    /// Checks that the build touched every slot the node owns.
    pub(crate) fn finish(&self) -> Result<(), BuildError> {
        if self.touched == self.slots.len() {
            Ok(())
        } else {
            Err(BuildError::SlotCount {
                touched: self.touched,
                owned: self.slots.len(),
            })
        }
    }
}

/// What a component sees in its complete phase.
pub struct CompleteContext<'a, T: TreeTypes> {
    pub(crate) store: &'a NodeStore<T>,
    pub(crate) node: u32,
}

impl<T: TreeTypes> fmt::Debug for CompleteContext<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompleteContext")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl<'a, T: TreeTypes> CompleteContext<'a, T> {
    /// The node being completed.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.store.node_id(self.node)
    }

    /// The node's input. `None` only for the root.
    #[must_use]
    pub fn input(&self) -> Option<&'a T::Input> {
        self.store.pending_input[self.node as usize].as_ref()
    }

    /// Outputs of the node's children, in sibling order.
    pub fn child_outputs(&self) -> impl Iterator<Item = &'a T::Output> + 'a {
        let store = self.store;
        let first = store.first_child[self.node as usize];
        core::iter::successors((first != INVALID).then_some(first), move |&child| {
            let next = store.next_sibling[child as usize];
            (next != INVALID).then_some(next)
        })
        .map(move |child| &store.memoized_output[child as usize])
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[derive(Debug)]
    struct Counter;

    impl TreeTypes for Counter {
        type Input = i32;
        type Output = i32;
    }

    struct Leaf;

    impl Component<Counter> for Leaf {
        fn name(&self) -> &str {
            "leaf"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::HOST
        }

        fn begin(
            &self,
            _: &mut BuildContext<'_, Counter>,
        ) -> Result<Vec<Element<Counter>>, BuildError> {
            Ok(Vec::new())
        }
    }

    fn context<'a>(
        slots: &'a mut Vec<Slot>,
        current: Option<&'a mut Vec<Slot>>,
    ) -> BuildContext<'a, Counter> {
        BuildContext {
            node: NodeId {
                idx: 0,
                generation: 0,
            },
            input: None,
            prior_output: None,
            captured: None,
            slots,
            current_slots: current,
            render_lanes: Lanes::DEFAULT,
            remaining_lanes: Lanes::NONE,
            touched: 0,
            clear_captured: false,
        }
    }

    fn add(s: &i32, a: &i32) -> i32 {
        s + a
    }

    #[test]
    fn registry_reserves_root() {
        let mut registry = Registry::<Counter>::new();
        let leaf = registry.register(Leaf);
        assert_eq!(leaf, KindId(1));
        assert_eq!(registry.name(KindId::ROOT), "root");
        assert_eq!(registry.name(leaf), "leaf");
        assert!(registry.capabilities(leaf).contains(Capabilities::HOST));
        assert!(registry.get(KindId(9)).is_none());
    }

    #[test]
    fn element_builder_sets_key() {
        let el = Element::<Counter>::new(KindId(1), 5).with_key("a");
        assert_eq!(el.key, Some(Key::from("a")));
        assert_eq!(el.clone(), el);
    }

    #[test]
    fn mount_creates_slots_in_order() {
        let mut slots = Vec::new();
        let mut cx = context(&mut slots, None);
        let (a, _) = cx.slot(0, || 1, add).unwrap();
        let (b, _) = cx.slot(1, || 2, add).unwrap();
        assert_eq!((*a, *b), (1, 2));
        assert!(cx.finish().is_ok());
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn out_of_order_slot_is_rejected() {
        let mut slots = Vec::new();
        let mut cx = context(&mut slots, None);
        let err = cx.slot(1, || 1, add).unwrap_err();
        assert_eq!(
            err,
            BuildError::SlotOrder {
                expected: 0,
                got: 1
            }
        );
    }

    #[test]
    fn rebuild_validates_type_and_count() {
        let mut current = vec![Slot::new(0_i32, add), Slot::new(0_i32, add)];
        let mut wip = current.clone();

        let mut cx = context(&mut wip, Some(&mut current));
        cx.slot(0, || 0, add).unwrap();
        assert_eq!(
            cx.finish(),
            Err(BuildError::SlotCount {
                touched: 1,
                owned: 2
            })
        );

        let mut wip = current.clone();
        let mut cx = context(&mut wip, Some(&mut current));
        let err = cx.slot(0, || 0_u8, |s: &u8, _: &u8| *s).unwrap_err();
        assert_eq!(err, BuildError::SlotType { index: 0 });
    }

    #[test]
    fn rebuild_cannot_add_slots() {
        let mut current = vec![Slot::new(0_i32, add)];
        let mut wip = current.clone();
        let mut cx = context(&mut wip, Some(&mut current));
        cx.slot(0, || 0, add).unwrap();
        let err = cx.slot(1, || 0, add).unwrap_err();
        assert_eq!(err, BuildError::SlotMissing { index: 1 });
    }

    #[test]
    fn captured_error_can_be_cleared() {
        let captured = CapturedError {
            error: BuildError::failed("boom"),
            source_kind: KindId(2),
        };
        let mut slots = Vec::new();
        let mut cx = context(&mut slots, None);
        cx.captured = Some(&captured);
        assert_eq!(cx.captured_error(), Some(&captured));
        cx.clear_captured_error();
        assert_eq!(cx.captured_error(), None);
    }
}
