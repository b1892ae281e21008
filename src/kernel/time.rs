//! Simulated time.
//!
//! A [`SimTime`] is a pair of a coarse cycle count and a delta sub-step
//! index. The delta index orders zero-time work within one cycle: an event
//! notified with a zero-cycle delay fires in the *same* cycle but a later
//! delta, so producers and consumers that hand off "instantly" still resolve
//! in a well-defined order.
//!
//! # Arithmetic
//!
//! Addition and subtraction follow the delta-cycle rules:
//!
//! - If either operand's `cycle` is zero, cycles add and deltas add. A pure
//!   delta delay therefore advances only the sub-step.
//! - Otherwise cycles add and the result's `delta` is zero: crossing a cycle
//!   boundary cancels any sub-step ordering accumulated so far.
//! - Subtraction mirrors this: the left operand's delta survives only when
//!   the right operand's `cycle` is zero.
//!
//! Exactly one variant of these rules exists in the wild and this module
//! pins it down; see `DESIGN.md` for the rationale.

use std::fmt;
use std::ops::{Add, Sub};

/// A point in simulated time: `(cycle, delta)`.
///
/// Totally ordered lexicographically, `cycle` first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime {
    /// Coarse simulated-time unit.
    pub cycle: u64,
    /// Sub-step index ordering zero-time events within one cycle.
    pub delta: u64,
}

impl SimTime {
    /// The zero point of simulated time.
    pub const ZERO: SimTime = SimTime { cycle: 0, delta: 0 };

    /// A single delta sub-step. Used as the canonical zero-time delay.
    pub const DELTA: SimTime = SimTime { cycle: 0, delta: 1 };

    /// Create a time from explicit cycle and delta components.
    #[inline]
    pub const fn new(cycle: u64, delta: u64) -> Self {
        SimTime { cycle, delta }
    }

    /// The canonical delay of `n` cycles.
    ///
    /// Carries a delta component of 1 so that `cycles(0)` is a pure delta
    /// step rather than a no-op: notifying an event with a zero delay must
    /// still move it strictly into the future.
    #[inline]
    pub const fn cycles(n: u64) -> Self {
        SimTime { cycle: n, delta: 1 }
    }

    /// Returns `true` for the zero time.
    #[inline]
    pub fn is_zero(self) -> bool {
        self == SimTime::ZERO
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        if self.cycle == 0 || rhs.cycle == 0 {
            SimTime {
                cycle: self.cycle + rhs.cycle,
                delta: self.delta + rhs.delta,
            }
        } else {
            SimTime {
                cycle: self.cycle + rhs.cycle,
                delta: 0,
            }
        }
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        assert!(
            self.cycle >= rhs.cycle,
            "simulated time underflow: {} - {}",
            self,
            rhs
        );
        // The delta index never decreases; it survives only when no cycle
        // boundary is involved on the right-hand side.
        let delta = if rhs.cycle == 0 { self.delta } else { 0 };
        SimTime {
            cycle: self.cycle - rhs.cycle,
            delta,
        }
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cycle, self.delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        let a = SimTime::new(1, 0);
        let b = SimTime::new(1, 1);
        let c = SimTime::new(2, 0);

        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
        assert_eq!(a, SimTime::new(1, 0));

        // Exactly one of <, ==, > holds for each pair.
        assert!(!(a > b) && a != b);
    }

    #[test]
    fn test_add_zero_cycle_accumulates_delta() {
        // Either operand at cycle 0 keeps delta ordering alive.
        assert_eq!(SimTime::ZERO + SimTime::DELTA, SimTime::new(0, 1));
        assert_eq!(SimTime::new(0, 2) + SimTime::new(3, 1), SimTime::new(3, 3));
        assert_eq!(SimTime::new(5, 0) + SimTime::new(0, 1), SimTime::new(5, 1));
    }

    #[test]
    fn test_add_nonzero_cycles_resets_delta() {
        // Crossing a cycle boundary cancels delta ordering.
        assert_eq!(SimTime::new(2, 7) + SimTime::new(1, 1), SimTime::new(3, 0));
        assert_eq!(
            SimTime::new(100, 3) + SimTime::cycles(10),
            SimTime::new(110, 0)
        );
    }

    #[test]
    fn test_sub_mirrors_add() {
        // Subtracting a zero-cycle time preserves delta.
        assert_eq!(SimTime::new(4, 3) - SimTime::new(0, 1), SimTime::new(4, 3));
        // Subtracting across a cycle boundary drops it.
        assert_eq!(SimTime::new(4, 3) - SimTime::new(1, 0), SimTime::new(3, 0));
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn test_sub_underflow_is_fatal() {
        let _ = SimTime::new(1, 0) - SimTime::new(2, 0);
    }

    #[test]
    fn test_cycles_constructor_is_a_delay() {
        // cycles(0) is a pure delta step, not a no-op.
        assert_eq!(SimTime::cycles(0), SimTime::DELTA);
        assert_eq!(SimTime::ZERO + SimTime::cycles(0), SimTime::new(0, 1));
        // cycles(n) added to a mid-run clock lands on a clean cycle.
        assert_eq!(
            SimTime::new(7, 2) + SimTime::cycles(1),
            SimTime::new(8, 0)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SimTime::new(12, 3).to_string(), "12:3");
    }
}
