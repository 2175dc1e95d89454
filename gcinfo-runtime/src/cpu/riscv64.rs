use gcinfo_format::RiscV64Encoding;

use crate::cpu::Target;
use crate::gc::Address;
use crate::stack::RegDisplay;

pub const RA: u32 = 1;
pub const SP: u32 = 2;
pub const T0: u32 = 5;
pub const T2: u32 = 7;
pub const S0: u32 = 8;
pub const S1: u32 = 9;
pub const A0: u32 = 10;
pub const A7: u32 = 17;
pub const S2: u32 = 18;
pub const S11: u32 = 27;
pub const T3: u32 = 28;
pub const T6: u32 = 31;

pub struct RiscV64;

fn is_volatile(reg: u32) -> bool {
    (T0..=T2).contains(&reg) || (A0..=A7).contains(&reg) || (T3..=T6).contains(&reg)
}

impl Target for RiscV64 {
    type Encoding = RiscV64Encoding;

    const NAME: &'static str = "riscv64";
    const SP_REGISTER: u32 = SP;
    const REPORTS_CAPTURED_REGISTERS: bool = true;

    fn is_valid_register(reg: u32) -> bool {
        // gp, tp and zero never hold references
        reg == RA || (T0..=T6).contains(&reg)
    }

    fn register_slot(reg: u32, rd: &RegDisplay) -> Option<Address> {
        debug_assert!(Self::is_valid_register(reg));

        if is_volatile(reg) {
            rd.volatile_context_pointers.get(reg)
        } else {
            rd.current_context_pointers.get(reg)
        }
    }

    fn is_scratch_register(reg: u32) -> bool {
        debug_assert!(Self::is_valid_register(reg));
        is_volatile(reg) || reg == RA
    }
}
