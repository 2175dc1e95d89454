pub mod cpu;
pub mod decoder;
pub mod gc;
pub mod root;
pub mod stack;

pub use cpu::{HostTarget, Target};
pub use decoder::{DecodeFlags, GcInfoDecoder, GcSlotDecoder};
pub use gc::{Address, Slot};
pub use root::{CodeManagerFlags, GcCallFlags, RootCallback, RootReporter, RootSet, SlotLocation};
pub use stack::{Context, ContextPointers, RegDisplay};
