use gcinfo_format::{GcStackSlotBase, InterpreterEncoding};

use crate::cpu::Target;
use crate::gc::Address;
use crate::stack::RegDisplay;

/// Context register holding the frame pointer of an interpreter frame.
pub const FP: u32 = 0;
pub const SP: u32 = 1;

/// Interpreter frames keep every value on the interpreter stack, all slots
/// are relative to the frame pointer.
pub struct Interpreter;

impl Target for Interpreter {
    type Encoding = InterpreterEncoding;

    const NAME: &'static str = "interpreter";
    const SP_REGISTER: u32 = SP;
    const REPORTS_CAPTURED_REGISTERS: bool = false;

    fn is_valid_register(_reg: u32) -> bool {
        false
    }

    fn register_slot(_reg: u32, _rd: &RegDisplay) -> Option<Address> {
        debug_assert!(false, "interpreter frames have no registers");
        None
    }

    fn is_scratch_register(_reg: u32) -> bool {
        false
    }

    fn stack_slot(
        offset: i32,
        base: GcStackSlotBase,
        _stack_base_register: u32,
        rd: &RegDisplay,
    ) -> Address {
        debug_assert_eq!(GcStackSlotBase::FrameRegRel, base);
        Address::from(rd.current_context.reg(FP)).ioffset(offset as isize)
    }

    fn stack_slot_register(_base: GcStackSlotBase, _stack_base_register: u32) -> i32 {
        FP as i32
    }
}
