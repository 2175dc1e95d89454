use gcinfo_format::ArmEncoding;

use crate::cpu::Target;
use crate::gc::Address;
use crate::stack::RegDisplay;

pub const R0: u32 = 0;
pub const R3: u32 = 3;
pub const R4: u32 = 4;
pub const R11: u32 = 11;
pub const R12: u32 = 12;
pub const SP: u32 = 13;
pub const LR: u32 = 14;

pub struct Arm;

impl Target for Arm {
    type Encoding = ArmEncoding;

    const NAME: &'static str = "arm";
    const SP_REGISTER: u32 = SP;

    // the unwinder always records the nonvolatile registers
    const REPORTS_CAPTURED_REGISTERS: bool = false;

    fn is_valid_register(reg: u32) -> bool {
        reg <= LR && reg != SP
    }

    fn register_slot(reg: u32, rd: &RegDisplay) -> Option<Address> {
        debug_assert!(Self::is_valid_register(reg));

        if reg <= R3 || reg == R12 {
            rd.volatile_context_pointers.get(reg)
        } else {
            rd.current_context_pointers.get(reg)
        }
    }

    fn is_scratch_register(reg: u32) -> bool {
        debug_assert!(Self::is_valid_register(reg));
        reg <= R3 || reg >= R12
    }
}
