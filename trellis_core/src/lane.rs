// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Priority lanes and starvation tracking.
//!
//! A [`Lanes`] value is a bitset where each bit is one priority lane. Lower
//! bits are more urgent:
//!
//! ```text
//!   bit 0        SYNC              discrete, must not be time-sliced
//!   bit 1        INPUT_CONTINUOUS  drags, scrolls, pointer moves
//!   bit 2        DEFAULT           ordinary updates
//!   bits 3..=10  TRANSITIONS       deferrable, claimed round-robin
//!   bit 29       IDLE              only when nothing else is pending
//! ```
//!
//! [`RootLanes`] keeps the per-root bookkeeping: which lanes are pending,
//! when each pending lane starves, and which lanes have already starved and
//! must now run to completion without yielding.

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign};

use crate::time::{Duration, HostTime};

/// Number of bit positions a [`Lanes`] value can hold.
pub const LANE_BITS: usize = 32;

/// A set of priority lanes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lanes(pub u32);

impl Lanes {
    /// The empty set.
    pub const NONE: Self = Self(0);
    /// Discrete, synchronous work.
    pub const SYNC: Self = Self(1 << 0);
    /// Continuous input such as drags.
    pub const INPUT_CONTINUOUS: Self = Self(1 << 1);
    /// Ordinary updates.
    pub const DEFAULT: Self = Self(1 << 2);
    /// All transition lanes.
    pub const TRANSITIONS: Self = Self(0b1111_1111 << 3);
    /// Work that only runs when nothing else is pending.
    pub const IDLE: Self = Self(1 << 29);
    /// Every lane the engine assigns.
    pub const ALL: Self = Self(
        Self::SYNC.0
            | Self::INPUT_CONTINUOUS.0
            | Self::DEFAULT.0
            | Self::TRANSITIONS.0
            | Self::IDLE.0,
    );

    const FIRST_TRANSITION: u32 = 1 << 3;

    /// Returns whether no lane is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two sets.
    #[inline]
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Removes `subset` from `self`.
    #[inline]
    #[must_use]
    pub const fn subtract(self, subset: Self) -> Self {
        Self(self.0 & !subset.0)
    }

    /// Intersection of two sets.
    #[inline]
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Returns whether the two sets share any lane.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns whether every lane of `subset` is in `self`.
    ///
    /// The empty set is a subset of everything.
    #[inline]
    #[must_use]
    pub const fn is_subset(self, subset: Self) -> bool {
        self.0 & subset.0 == subset.0
    }

    /// The single most urgent lane in the set, or [`Lanes::NONE`].
    #[inline]
    #[must_use]
    pub const fn highest_priority_lane(self) -> Self {
        Self(self.0 & self.0.wrapping_neg())
    }

    /// The most urgent lane group in the set.
    ///
    /// Transition lanes are batched: if the most urgent lane is a transition,
    /// every pending transition lane is returned together.
    #[must_use]
    pub const fn highest_priority_lanes(self) -> Self {
        let lane = self.highest_priority_lane();
        if lane.intersects(Self::TRANSITIONS) {
            self.intersection(Self::TRANSITIONS)
        } else {
            lane
        }
    }

    /// Bit position of the most urgent lane, or `None` for the empty set.
    #[inline]
    #[must_use]
    pub const fn lane_index(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Iterates over the single lanes in the set, most urgent first.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        let mut rest = self.0;
        core::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let lane = rest & rest.wrapping_neg();
            rest &= !lane;
            Some(Self(lane))
        })
    }

    /// Returns whether the set contains a lane outside [`Lanes::ALL`].
    #[inline]
    #[must_use]
    pub const fn has_unknown_bits(self) -> bool {
        self.0 & !Self::ALL.0 != 0
    }
}

impl BitOr for Lanes {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.merge(rhs)
    }
}

impl BitOrAssign for Lanes {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Lanes {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl fmt::Debug for Lanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lanes({:#b})", self.0)
    }
}

/// The urgency a caller attaches to an update.
///
/// Each class maps onto one lane when the update is enqueued; transitions
/// claim the next transition lane in round-robin order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdatePriority {
    /// Discrete input. Renders without yielding.
    Sync,
    /// Continuous input.
    InputContinuous,
    /// Ordinary work.
    Default,
    /// Deferrable work that can be interrupted by anything above it.
    Transition,
    /// Background work.
    Idle,
}

/// Per-class starvation timeouts.
///
/// A pending lane that has not been rendered within its timeout is promoted
/// into the expired set. `None` means the class never expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneTimeouts {
    /// Timeout for [`Lanes::SYNC`].
    pub sync: Option<Duration>,
    /// Timeout for [`Lanes::INPUT_CONTINUOUS`].
    pub input_continuous: Option<Duration>,
    /// Timeout for [`Lanes::DEFAULT`].
    pub default: Option<Duration>,
    /// Timeout for each transition lane.
    pub transition: Option<Duration>,
    /// Timeout for [`Lanes::IDLE`].
    pub idle: Option<Duration>,
}

impl LaneTimeouts {
    /// 250 ms for input classes, 5 s for default and transitions, idle never
    /// expires.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            sync: Some(Duration::from_millis(250)),
            input_continuous: Some(Duration::from_millis(250)),
            default: Some(Duration::from_millis(5_000)),
            transition: Some(Duration::from_millis(5_000)),
            idle: None,
        }
    }

    /// Timeout for a single lane.
    #[must_use]
    pub const fn timeout_for(&self, lane: Lanes) -> Option<Duration> {
        if lane.intersects(Lanes::SYNC) {
            self.sync
        } else if lane.intersects(Lanes::INPUT_CONTINUOUS) {
            self.input_continuous
        } else if lane.intersects(Lanes::DEFAULT) {
            self.default
        } else if lane.intersects(Lanes::TRANSITIONS) {
            self.transition
        } else if lane.intersects(Lanes::IDLE) {
            self.idle
        } else {
            None
        }
    }
}

impl Default for LaneTimeouts {
    fn default() -> Self {
        Self::standard()
    }
}

/// Lane bookkeeping for one root.
#[derive(Clone, Debug)]
pub struct RootLanes {
    pending: Lanes,
    expired: Lanes,
    expiration_times: [Option<HostTime>; LANE_BITS],
    next_transition: u32,
}

impl Default for RootLanes {
    fn default() -> Self {
        Self::new()
    }
}

impl RootLanes {
    /// Creates bookkeeping with nothing pending.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Lanes::NONE,
            expired: Lanes::NONE,
            expiration_times: [None; LANE_BITS],
            next_transition: Lanes::FIRST_TRANSITION,
        }
    }

    /// Lanes with outstanding updates somewhere in the tree.
    #[inline]
    #[must_use]
    pub const fn pending(&self) -> Lanes {
        self.pending
    }

    /// Lanes that have starved and must render without yielding.
    #[inline]
    #[must_use]
    pub const fn expired(&self) -> Lanes {
        self.expired
    }

    /// Expiration timestamp recorded for a single lane.
    #[must_use]
    pub fn expiration_time(&self, lane: Lanes) -> Option<HostTime> {
        lane.lane_index().and_then(|i| self.expiration_times[i])
    }

    /// Maps an update priority onto a concrete lane.
    pub fn request_lane(&mut self, priority: UpdatePriority) -> Lanes {
        match priority {
            UpdatePriority::Sync => Lanes::SYNC,
            UpdatePriority::InputContinuous => Lanes::INPUT_CONTINUOUS,
            UpdatePriority::Default => Lanes::DEFAULT,
            UpdatePriority::Transition => self.claim_next_transition_lane(),
            UpdatePriority::Idle => Lanes::IDLE,
        }
    }

    /// Returns the next transition lane, cycling through all eight.
    pub fn claim_next_transition_lane(&mut self) -> Lanes {
        let lane = Lanes(self.next_transition);
        self.next_transition <<= 1;
        if self.next_transition & Lanes::TRANSITIONS.0 == 0 {
            self.next_transition = Lanes::FIRST_TRANSITION;
        }
        lane
    }

    /// Records that `lane` has a new pending update.
    pub fn mark_updated(&mut self, lane: Lanes) {
        self.pending |= lane;
    }

    /// Assigns expiration times to newly observed pending lanes and promotes
    /// lanes whose time has passed into the expired set.
    ///
    /// Returns the lanes promoted by this call.
    pub fn mark_starved_lanes_as_expired(
        &mut self,
        now: HostTime,
        timeouts: &LaneTimeouts,
    ) -> Lanes {
        let mut promoted = Lanes::NONE;
        for lane in self.pending.iter() {
            let Some(index) = lane.lane_index() else {
                continue;
            };
            match self.expiration_times[index] {
                None => {
                    self.expiration_times[index] =
                        timeouts.timeout_for(lane).map(|t| now.saturating_add(t));
                }
                Some(at) if at <= now && !self.expired.intersects(lane) => {
                    self.expired |= lane;
                    promoted |= lane;
                }
                Some(_) => {}
            }
        }
        promoted
    }

    /// Chooses the lanes for the next render.
    ///
    /// Picks the most urgent pending group and folds in every expired lane.
    /// When a render is already in progress on `wip_lanes`, those lanes are
    /// kept unless the new group is strictly more urgent.
    #[must_use]
    pub fn next_lanes(&self, wip_lanes: Lanes) -> Lanes {
        if self.pending.is_empty() {
            return Lanes::NONE;
        }
        let next = self
            .pending
            .highest_priority_lanes()
            .merge(self.expired.intersection(self.pending));
        if !wip_lanes.is_empty() && wip_lanes != next {
            let next_lane = next.highest_priority_lane();
            let wip_lane = wip_lanes.highest_priority_lane();
            if next_lane.0 >= wip_lane.0 {
                return wip_lanes;
            }
        }
        next
    }

    /// Records a finished render: `remaining` lanes stay pending, every
    /// other lane is cleared along with its expiration bookkeeping.
    pub fn mark_finished(&mut self, remaining: Lanes) {
        let finished = self.pending.subtract(remaining);
        self.pending = remaining;
        self.expired = self.expired.intersection(remaining);
        for lane in finished.iter() {
            if let Some(index) = lane.lane_index() {
                self.expiration_times[index] = None;
            }
        }
    }

    /// Drops `lanes` from the pending set without rendering them.
    pub fn discard(&mut self, lanes: Lanes) {
        self.mark_finished(self.pending.subtract(lanes));
    }
}
