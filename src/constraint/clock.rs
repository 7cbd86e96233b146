//! The change clock
//!
//! Each batch reserves four consecutive values starting at `clock`. An arc
//! stamp `v` is read relative to the current clock:
//!
//! | stamp         | meaning                                    |
//! |---------------|--------------------------------------------|
//! | `< clock - 2` | untouched, persistent rigidity applies     |
//! | `clock - 2`   | untouched, temporarily rigid               |
//! | `clock - 1`   | untouched, temporarily flexible            |
//! | `clock`       | moved this pass as a rigid arc             |
//! | `clock + 1`   | moved this pass as a flexible arc          |
//!
//! A node whose stamp equals the clock has been modified in this pass.

/// Monotonic pass counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeClock {
    value: u64,
}

/// Stride between two passes
pub const CLOCK_STRIDE: u64 = 4;

impl ChangeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.value
    }

    /// Reserve the next block of four values and return its base
    pub fn begin_batch(&mut self) -> u64 {
        self.value += CLOCK_STRIDE;
        self.value
    }

    /// Stamp that reads as "temporarily rigid" (or flexible) once the next
    /// batch begins
    pub fn temporary_stamp(&self, rigid: bool) -> u64 {
        if rigid {
            self.value + 2
        } else {
            self.value + 3
        }
    }
}

/// State of an arc relative to the current clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcStamp {
    Untouched,
    TempRigid,
    TempFlexible,
    MovedRigid,
    MovedFlexible,
}

impl ArcStamp {
    pub fn classify(stamp: u64, clock: u64) -> Self {
        if stamp == clock {
            ArcStamp::MovedRigid
        } else if stamp == clock + 1 {
            ArcStamp::MovedFlexible
        } else if stamp + 2 == clock {
            ArcStamp::TempRigid
        } else if stamp + 1 == clock {
            ArcStamp::TempFlexible
        } else {
            ArcStamp::Untouched
        }
    }

    pub fn moved(self) -> bool {
        matches!(self, ArcStamp::MovedRigid | ArcStamp::MovedFlexible)
    }

    /// Whether an arc with persistent rigidity `rigid` belongs to the rigid
    /// class this pass
    pub fn is_rigid(self, rigid: bool) -> bool {
        match self {
            ArcStamp::TempRigid | ArcStamp::MovedRigid => true,
            ArcStamp::TempFlexible | ArcStamp::MovedFlexible => false,
            ArcStamp::Untouched => rigid,
        }
    }
}
