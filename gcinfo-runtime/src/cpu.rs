use gcinfo_format::{GcInfoEncoding, GcStackSlotBase, NO_STACK_BASE_REGISTER};

use crate::gc::{Address, Slot};
use crate::stack::RegDisplay;

pub use self::arm::Arm;
pub use self::arm64::Arm64;
pub use self::interp::Interpreter;
pub use self::loongarch64::LoongArch64;
pub use self::riscv64::RiscV64;
pub use self::x64::X64;

pub mod arm;
pub mod arm64;
pub mod interp;
pub mod loongarch64;
pub mod riscv64;
pub mod x64;

/// Register file of a code generation target.
///
/// Ties the encoding the code generator used to the way registers of a
/// suspended frame are found in a `RegDisplay`.
pub trait Target: 'static {
    type Encoding: GcInfoEncoding;

    const NAME: &'static str;
    const SP_REGISTER: u32;

    /// Registers without a saved location may be reported from the captured
    /// context. Such roots are pinned and only reported while promoting.
    const REPORTS_CAPTURED_REGISTERS: bool;

    fn is_valid_register(reg: u32) -> bool;

    /// Location of the register's value for this frame, `None` if the
    /// unwinder didn't record one.
    fn register_slot(reg: u32, rd: &RegDisplay) -> Option<Address>;

    fn captured_register(reg: u32, rd: &RegDisplay) -> Address {
        rd.current_context.reg_address(reg)
    }

    fn is_scratch_register(reg: u32) -> bool;

    /// Address of a stack slot. Frame register relative slots read the frame
    /// register through its saved location, or the captured value.
    fn stack_slot(
        offset: i32,
        base: GcStackSlotBase,
        stack_base_register: u32,
        rd: &RegDisplay,
    ) -> Address {
        let start = match base {
            GcStackSlotBase::SpRel => rd.sp,
            GcStackSlotBase::CallerSpRel => rd.caller_sp,
            GcStackSlotBase::FrameRegRel => {
                debug_assert!(stack_base_register != NO_STACK_BASE_REGISTER);
                let location = Self::register_slot(stack_base_register, rd)
                    .unwrap_or_else(|| Self::captured_register(stack_base_register, rd));
                Slot::at(location).get()
            }
        };

        start.ioffset(offset as isize)
    }

    /// Register a stack slot is relative to, for debug slot locations.
    /// Caller SP relative slots use `-(SP + 1)`.
    fn stack_slot_register(base: GcStackSlotBase, stack_base_register: u32) -> i32 {
        match base {
            GcStackSlotBase::SpRel => Self::SP_REGISTER as i32,
            GcStackSlotBase::CallerSpRel => -(Self::SP_REGISTER as i32 + 1),
            GcStackSlotBase::FrameRegRel => stack_base_register as i32,
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub type HostTarget = X64;

#[cfg(target_arch = "arm")]
pub type HostTarget = Arm;

#[cfg(target_arch = "aarch64")]
pub type HostTarget = Arm64;

#[cfg(target_arch = "loongarch64")]
pub type HostTarget = LoongArch64;

#[cfg(target_arch = "riscv64")]
pub type HostTarget = RiscV64;

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "arm",
    target_arch = "aarch64",
    target_arch = "loongarch64",
    target_arch = "riscv64"
)))]
pub type HostTarget = Interpreter;
