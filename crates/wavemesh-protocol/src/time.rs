//! Wrapping millisecond clock.
//!
//! Devices count milliseconds in a 32-bit register that rolls over roughly
//! every 49.7 days. Ordering two ticks uses wrapping subtraction read as a
//! signed value, so comparisons stay correct across rollover as long as the
//! two ticks are less than 2^31 ms apart.

use core::fmt;
use core::ops::Add;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(pub u32);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub const fn from_millis(ms: u32) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Signed distance from `earlier` to `self` in milliseconds.
    pub const fn since(self, earlier: Tick) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` lies ahead.
    pub const fn elapsed_since(self, earlier: Tick) -> u32 {
        let d = self.since(earlier);
        if d < 0 { 0 } else { d as u32 }
    }

    /// Whether `self` lies strictly before `other`.
    pub const fn is_before(self, other: Tick) -> bool {
        self.since(other) < 0
    }

    /// Whether `deadline` has been reached at `self`.
    pub const fn has_reached(self, deadline: Tick) -> bool {
        !self.is_before(deadline)
    }
}

impl Add<u32> for Tick {
    type Output = Tick;

    fn add(self, ms: u32) -> Tick {
        Tick(self.0.wrapping_add(ms))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
