//! Slot timing: the `SlotPoint` counter and the slot clock that drives it
//!
//! A slot point is a `(numerology, count)` pair where `count` runs over one
//! hyper-period of 1024 system frames. Arithmetic wraps modulo that period and
//! comparisons use the signed circular distance, so a slot just after the SFN
//! wrap compares greater than one just before it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

use crate::types::{SubcarrierSpacing, NOF_SFNS};

/// Point in time measured in slots
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotPoint {
    scs: SubcarrierSpacing,
    count: u32,
}

impl SlotPoint {
    /// Creates a slot point from a raw slot count. The count is reduced modulo
    /// the hyper-period.
    pub fn new(scs: SubcarrierSpacing, count: u32) -> Self {
        let period = Self::period_of(scs);
        Self {
            scs,
            count: count % period,
        }
    }

    /// Creates a slot point from SFN and slot index within the frame.
    pub fn from_sfn_slot(scs: SubcarrierSpacing, sfn: u32, slot_index: u32) -> Self {
        assert!(
            slot_index < scs.nof_slots_per_frame(),
            "slot index {slot_index} out of range for {scs}"
        );
        Self::new(scs, (sfn % NOF_SFNS) * scs.nof_slots_per_frame() + slot_index)
    }

    fn period_of(scs: SubcarrierSpacing) -> u32 {
        NOF_SFNS * scs.nof_slots_per_frame()
    }

    /// Number of slots before the counter wraps.
    pub fn nof_slots_per_period(&self) -> u32 {
        Self::period_of(self.scs)
    }

    /// Number of slots in a 10 ms frame.
    pub fn nof_slots_per_frame(&self) -> u32 {
        self.scs.nof_slots_per_frame()
    }

    /// Subcarrier spacing of this slot.
    pub fn scs(&self) -> SubcarrierSpacing {
        self.scs
    }

    /// Numerology index µ.
    pub fn numerology(&self) -> u8 {
        self.scs.numerology()
    }

    /// Raw slot count within the hyper-period.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// System frame number.
    pub fn sfn(&self) -> u32 {
        self.count / self.nof_slots_per_frame()
    }

    /// Slot index within the frame.
    pub fn slot_index(&self) -> u32 {
        self.count % self.nof_slots_per_frame()
    }

    /// Subframe index within the frame.
    pub fn subframe_index(&self) -> u32 {
        self.slot_index() / self.scs.nof_slots_per_subframe()
    }

    /// Signed circular distance `self - other` in slots.
    ///
    /// The result lies in `[-period/2, period/2)`.
    pub fn distance(&self, other: &SlotPoint) -> i32 {
        debug_assert_eq!(self.scs, other.scs, "comparing slots of different numerologies");
        let period = self.nof_slots_per_period() as i64;
        let half = period / 2;
        let diff = (self.count as i64 - other.count as i64).rem_euclid(period);
        if diff >= half {
            (diff - period) as i32
        } else {
            diff as i32
        }
    }

    /// Returns the slot shifted by a signed offset.
    pub fn offset(&self, delta: i64) -> SlotPoint {
        let period = self.nof_slots_per_period() as i64;
        let count = (self.count as i64 + delta).rem_euclid(period);
        SlotPoint {
            scs: self.scs,
            count: count as u32,
        }
    }
}

impl PartialOrd for SlotPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.scs != other.scs {
            return None;
        }
        Some(self.distance(other).cmp(&0))
    }
}

impl Add<u32> for SlotPoint {
    type Output = SlotPoint;

    fn add(self, rhs: u32) -> SlotPoint {
        self.offset(rhs as i64)
    }
}

impl AddAssign<u32> for SlotPoint {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<u32> for SlotPoint {
    type Output = SlotPoint;

    fn sub(self, rhs: u32) -> SlotPoint {
        self.offset(-(rhs as i64))
    }
}

impl Sub<SlotPoint> for SlotPoint {
    type Output = i32;

    fn sub(self, rhs: SlotPoint) -> i32 {
        self.distance(&rhs)
    }
}

impl fmt::Debug for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotPoint({}.{}, µ={})", self.sfn(), self.slot_index(), self.numerology())
    }
}

impl fmt::Display for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sfn(), self.slot_index())
    }
}

/// Slot clock
///
/// Hands out consecutive slot points and knows the wall-clock duration of a
/// slot for real-time pacing.
#[derive(Debug, Clone)]
pub struct SlotClock {
    next: SlotPoint,
    nof_ticks: u64,
}

impl SlotClock {
    /// Creates a clock whose first tick returns `start`.
    pub fn new(start: SlotPoint) -> Self {
        Self {
            next: start,
            nof_ticks: 0,
        }
    }

    /// Creates a clock starting at SFN 0, slot 0.
    pub fn starting_at_zero(scs: SubcarrierSpacing) -> Self {
        Self::new(SlotPoint::new(scs, 0))
    }

    /// Returns the current slot and advances the clock.
    pub fn tick(&mut self) -> SlotPoint {
        let current = self.next;
        self.next += 1;
        self.nof_ticks += 1;
        current
    }

    /// Slot that the next tick will return.
    pub fn peek(&self) -> SlotPoint {
        self.next
    }

    /// Number of slots handed out so far.
    pub fn nof_ticks(&self) -> u64 {
        self.nof_ticks
    }

    /// Wall-clock duration of one slot.
    pub fn slot_duration(&self) -> Duration {
        Duration::from_micros(self.next.scs().slot_duration_us())
    }
}
