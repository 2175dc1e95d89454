use std::fmt;

use crate::gc::Slot;

bitflags::bitflags! {
    /// Flags passed with every reported root.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct GcCallFlags: u32 {
        const INTERIOR = 0x1;
        const PINNED = 0x2;
        const CHECK_APP_DOMAIN = 0x4;
    }
}

bitflags::bitflags! {
    /// Stack walker state for the frame being enumerated.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct CodeManagerFlags: u32 {
        const ACTIVE_STACK_FRAME = 0x1;
        const EXECUTION_ABORTED = 0x2;
        const PARENT_OF_FUNCLET_STACK_FRAME = 0x40;
        const NO_REPORT_UNTRACKED = 0x80;
    }
}

/// Describes where a root came from: a register (`offset` 0) or a stack slot
/// relative to `reg`. A negative `reg` stands for the caller's SP of register
/// `-(reg + 1)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SlotLocation {
    pub reg: i32,
    pub offset: i32,
    pub is_stack: bool,
}

impl SlotLocation {
    pub fn register(reg: u32) -> SlotLocation {
        SlotLocation {
            reg: reg as i32,
            offset: 0,
            is_stack: false,
        }
    }

    pub fn stack(reg: i32, offset: i32) -> SlotLocation {
        SlotLocation {
            reg,
            offset,
            is_stack: true,
        }
    }
}

impl fmt::Display for SlotLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_stack {
            write!(f, "r{}", self.reg)
        } else if self.reg < 0 {
            write!(f, "[caller-sp{:+}]", self.offset)
        } else {
            write!(f, "[r{}{:+}]", self.reg, self.offset)
        }
    }
}

/// Receives the roots of a frame.
pub trait RootCallback {
    /// True while the collector marks. Roots that cannot be updated in place
    /// are only reported then.
    fn is_promotion(&self) -> bool;

    fn report(&mut self, slot: Slot, flags: GcCallFlags, location: SlotLocation);
}

/// Adapts a closure to `RootCallback`.
pub struct RootReporter<F>
where
    F: FnMut(Slot, GcCallFlags, SlotLocation),
{
    promotion: bool,
    callback: F,
}

impl<F> RootReporter<F>
where
    F: FnMut(Slot, GcCallFlags, SlotLocation),
{
    pub fn promotion(callback: F) -> RootReporter<F> {
        RootReporter {
            promotion: true,
            callback,
        }
    }

    pub fn relocation(callback: F) -> RootReporter<F> {
        RootReporter {
            promotion: false,
            callback,
        }
    }
}

impl<F> RootCallback for RootReporter<F>
where
    F: FnMut(Slot, GcCallFlags, SlotLocation),
{
    fn is_promotion(&self) -> bool {
        self.promotion
    }

    fn report(&mut self, slot: Slot, flags: GcCallFlags, location: SlotLocation) {
        (self.callback)(slot, flags, location);
    }
}

/// Collects all roots of a frame, mostly useful for tools and tests.
#[derive(Default)]
pub struct RootSet {
    pub promotion: bool,
    pub roots: Vec<(Slot, GcCallFlags, SlotLocation)>,
}

impl RootSet {
    pub fn promotion() -> RootSet {
        RootSet {
            promotion: true,
            roots: Vec::new(),
        }
    }

    pub fn relocation() -> RootSet {
        RootSet {
            promotion: false,
            roots: Vec::new(),
        }
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.roots.iter().map(|&(slot, _, _)| slot).collect()
    }
}

impl RootCallback for RootSet {
    fn is_promotion(&self) -> bool {
        self.promotion
    }

    fn report(&mut self, slot: Slot, flags: GcCallFlags, location: SlotLocation) {
        self.roots.push((slot, flags, location));
    }
}
