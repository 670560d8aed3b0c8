//! Fixed-point simulation time.
//!
//! All scheduling in the engine happens on an integer time base so that gate
//! delays add up exactly. One tick is 100 ps.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

/// Ticks per second.
pub const RESOLUTION: i64 = 10_000_000_000;

const TICKS_PER_NSEC: i64 = RESOLUTION / 1_000_000_000;

/// A point in (or span of) simulated time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetlistTime(i64);

impl NetlistTime {
    /// Build from raw ticks.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw tick count.
    pub const fn as_raw(self) -> i64 {
        self.0
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    /// Smallest representable step.
    pub const fn quantum() -> Self {
        Self(1)
    }

    /// Sentinel later than any real event.
    pub const fn never() -> Self {
        Self(i64::MAX)
    }

    pub const fn from_nsec(ns: i64) -> Self {
        Self(ns * TICKS_PER_NSEC)
    }

    pub const fn from_usec(us: i64) -> Self {
        Self(us * TICKS_PER_NSEC * 1_000)
    }

    pub const fn from_msec(ms: i64) -> Self {
        Self(ms * TICKS_PER_NSEC * 1_000_000)
    }

    pub const fn from_sec(s: i64) -> Self {
        Self(s * RESOLUTION)
    }

    /// Convert from seconds, truncating towards zero.
    pub fn from_fp(seconds: f64) -> Self {
        Self((seconds * RESOLUTION as f64) as i64)
    }

    /// Seconds as floating point.
    pub fn as_fp(self) -> f64 {
        self.0 as f64 / RESOLUTION as f64
    }

    pub fn is_never(self) -> bool {
        self.0 == i64::MAX
    }
}

impl Add for NetlistTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for NetlistTime {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for NetlistTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<i64> for NetlistTime {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }
}

impl fmt::Display for NetlistTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "never")
        } else {
            write!(f, "{:.10}s", self.as_fp())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_constructors() {
        assert_eq!(NetlistTime::from_nsec(1).as_raw(), 10);
        assert_eq!(NetlistTime::from_usec(1), NetlistTime::from_nsec(1_000));
        assert_eq!(NetlistTime::from_msec(1), NetlistTime::from_usec(1_000));
        assert_eq!(NetlistTime::from_sec(1).as_raw(), RESOLUTION);
    }

    #[test]
    fn test_fp_conversion() {
        let t = NetlistTime::from_fp(1.0 / 48000.0);
        assert_eq!(t.as_raw(), 208_333);
        assert_relative_eq!(NetlistTime::from_msec(5).as_fp(), 0.005);
    }

    #[test]
    fn test_never_saturates() {
        let t = NetlistTime::never() + NetlistTime::from_nsec(10);
        assert!(t.is_never());
        assert!(NetlistTime::from_sec(1000) < NetlistTime::never());
    }

    #[test]
    fn test_gate_delays_add_exactly() {
        let a = NetlistTime::from_nsec(10);
        let b = NetlistTime::from_nsec(15);
        assert_eq!((a + b) * 100, NetlistTime::from_nsec(2500));
    }
}
