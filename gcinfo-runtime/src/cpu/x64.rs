use gcinfo_format::Amd64Encoding;

use crate::cpu::Target;
use crate::gc::Address;
use crate::stack::RegDisplay;

pub const RAX: u32 = 0;
pub const RCX: u32 = 1;
pub const RDX: u32 = 2;
pub const RBX: u32 = 3;
pub const RSP: u32 = 4;
pub const RBP: u32 = 5;
pub const RSI: u32 = 6;
pub const RDI: u32 = 7;

pub const R8: u32 = 8;
pub const R9: u32 = 9;
pub const R10: u32 = 10;
pub const R11: u32 = 11;
pub const R12: u32 = 12;
pub const R13: u32 = 13;
pub const R14: u32 = 14;
pub const R15: u32 = 15;

pub const RIP: u32 = 16;

#[cfg(target_family = "windows")]
pub const PRESERVED_REGS: [u32; 8] = [RBX, RBP, RSI, RDI, R12, R13, R14, R15];
#[cfg(not(target_family = "windows"))]
pub const PRESERVED_REGS: [u32; 6] = [RBX, RBP, R12, R13, R14, R15];

pub struct X64;

impl Target for X64 {
    type Encoding = Amd64Encoding;

    const NAME: &'static str = "x64";
    const SP_REGISTER: u32 = RSP;
    const REPORTS_CAPTURED_REGISTERS: bool = true;

    fn is_valid_register(reg: u32) -> bool {
        reg <= RIP && reg != RSP
    }

    fn register_slot(reg: u32, rd: &RegDisplay) -> Option<Address> {
        debug_assert!(Self::is_valid_register(reg));
        rd.current_context_pointers.get(reg)
    }

    fn is_scratch_register(reg: u32) -> bool {
        debug_assert!(Self::is_valid_register(reg));
        !PRESERVED_REGS.contains(&reg)
    }
}
