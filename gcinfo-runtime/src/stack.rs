use crate::gc::Address;

/// Register numbers index directly into the register arrays below.
pub const MAX_REGISTERS: usize = 32;

/// Register values of a frame as captured by the stack walker.
#[derive(Clone, Debug, Default)]
#[repr(C)]
pub struct Context {
    pub regs: [usize; MAX_REGISTERS],
}

impl Context {
    pub fn reg(&self, reg: u32) -> usize {
        self.regs[reg as usize]
    }

    pub fn reg_address(&self, reg: u32) -> Address {
        Address::from_ptr(&self.regs[reg as usize])
    }
}

/// Where register values of a frame are stored in memory. `None` when the
/// unwinder could not tell.
#[derive(Clone, Debug, Default)]
pub struct ContextPointers {
    pub regs: [Option<Address>; MAX_REGISTERS],
}

impl ContextPointers {
    pub fn get(&self, reg: u32) -> Option<Address> {
        self.regs[reg as usize]
    }

    pub fn set(&mut self, reg: u32, location: Address) {
        self.regs[reg as usize] = Some(location);
    }
}

/// Unwind state of a single frame handed to the decoder.
///
/// `current_context_pointers` locates the nonvolatile registers, usually in
/// the callee's save area. `volatile_context_pointers` is only populated for
/// the active frame, where scratch registers still hold meaningful values.
#[derive(Clone, Debug, Default)]
pub struct RegDisplay {
    pub current_context: Context,
    pub current_context_pointers: ContextPointers,
    pub volatile_context_pointers: ContextPointers,
    pub sp: Address,
    pub caller_sp: Address,
}

impl RegDisplay {
    pub fn new(sp: Address, caller_sp: Address) -> RegDisplay {
        RegDisplay {
            sp,
            caller_sp,
            ..RegDisplay::default()
        }
    }
}
