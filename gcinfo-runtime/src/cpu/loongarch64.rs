use gcinfo_format::LoongArch64Encoding;

use crate::cpu::Target;
use crate::gc::Address;
use crate::stack::RegDisplay;

pub const RA: u32 = 1;
pub const SP: u32 = 3;
pub const A0: u32 = 4;
pub const T8: u32 = 20;
pub const R21: u32 = 21;
pub const FP: u32 = 22;
pub const S0: u32 = 23;
pub const S8: u32 = 31;

pub struct LoongArch64;

impl Target for LoongArch64 {
    type Encoding = LoongArch64Encoding;

    const NAME: &'static str = "loongarch64";
    const SP_REGISTER: u32 = SP;
    const REPORTS_CAPTURED_REGISTERS: bool = true;

    fn is_valid_register(reg: u32) -> bool {
        reg == RA || (A0..=S8).contains(&reg)
    }

    fn register_slot(reg: u32, rd: &RegDisplay) -> Option<Address> {
        debug_assert!(Self::is_valid_register(reg));

        if (A0..=R21).contains(&reg) {
            rd.volatile_context_pointers.get(reg)
        } else {
            rd.current_context_pointers.get(reg)
        }
    }

    fn is_scratch_register(reg: u32) -> bool {
        debug_assert!(Self::is_valid_register(reg));
        reg <= R21 && (reg >= A0 || reg == RA)
    }
}
