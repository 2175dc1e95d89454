use gcinfo_format::Arm64Encoding;

use crate::cpu::Target;
use crate::gc::Address;
use crate::stack::RegDisplay;

pub const X0: u32 = 0;
pub const X17: u32 = 17;
pub const X18: u32 = 18;
pub const X19: u32 = 19;
pub const X28: u32 = 28;
pub const FP: u32 = 29;
pub const LR: u32 = 30;
pub const SP: u32 = 31;

pub struct Arm64;

impl Target for Arm64 {
    type Encoding = Arm64Encoding;

    const NAME: &'static str = "arm64";
    const SP_REGISTER: u32 = SP;
    const REPORTS_CAPTURED_REGISTERS: bool = true;

    fn is_valid_register(reg: u32) -> bool {
        // x18 is the platform register
        reg <= LR && reg != X18
    }

    fn register_slot(reg: u32, rd: &RegDisplay) -> Option<Address> {
        debug_assert!(Self::is_valid_register(reg));

        if reg <= X17 {
            rd.volatile_context_pointers.get(reg)
        } else {
            rd.current_context_pointers.get(reg)
        }
    }

    fn is_scratch_register(reg: u32) -> bool {
        debug_assert!(Self::is_valid_register(reg));
        reg <= X17 || reg >= FP
    }
}
