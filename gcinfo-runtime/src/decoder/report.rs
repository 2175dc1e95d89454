use tracing::{trace, warn};

use gcinfo_format::{GcInfoEncoding, GcSlot, GcSlotFlags, GcStackSlotBase};

use crate::cpu::Target;
use crate::decoder::{GcInfoDecoder, GcSlotDecoder};
use crate::gc::Slot;
use crate::root::{CodeManagerFlags, GcCallFlags, RootCallback, SlotLocation};
use crate::stack::RegDisplay;

fn call_flags(flags: GcSlotFlags) -> GcCallFlags {
    let mut result = GcCallFlags::empty();

    if flags.contains(GcSlotFlags::INTERIOR) {
        result |= GcCallFlags::INTERIOR;
    }

    if flags.contains(GcSlotFlags::PINNED) {
        result |= GcCallFlags::PINNED;
    }

    result
}

impl<'a, T: Target> GcInfoDecoder<'a, T> {
    pub(super) fn report_slot_to_gc<C: RootCallback>(
        &self,
        slots: &mut GcSlotDecoder<'a, T::Encoding>,
        index: u32,
        rd: &RegDisplay,
        report_scratch_slots: bool,
        input_flags: CodeManagerFlags,
        callback: &mut C,
    ) {
        let desc = slots.slot_desc(index);
        let flags = call_flags(desc.flags);

        match desc.slot {
            GcSlot::Register(reg) => {
                if report_scratch_slots || !T::is_scratch_register(reg) {
                    self.report_register_to_gc(reg, flags, rd, input_flags, callback);
                } else {
                    trace!(reg, "live scratch register not reported");
                }
            }

            GcSlot::Stack { offset, base } => {
                if report_scratch_slots || !self.is_scratch_stack_slot(offset, base, rd) {
                    self.report_stack_slot_to_gc(offset, base, flags, rd, callback);
                } else {
                    trace!(offset, %base, "live scratch stack slot not reported");
                }
            }
        }
    }

    /// Slots in the outgoing argument area belong to the callee once the
    /// frame makes a call.
    fn is_scratch_stack_slot(&self, offset: i32, base: GcStackSlotBase, rd: &RegDisplay) -> bool {
        if !T::Encoding::HAS_FIXED_STACK_PARAMETER_SCRATCH_AREA {
            return false;
        }

        let address = T::stack_slot(offset, base, self.stack_base_register, rd);
        debug_assert!(address >= rd.sp);

        address < rd.sp.offset(self.size_of_stack_outgoing_and_scratch_area as usize)
    }

    fn report_register_to_gc<C: RootCallback>(
        &self,
        reg: u32,
        mut flags: GcCallFlags,
        rd: &RegDisplay,
        input_flags: CodeManagerFlags,
        callback: &mut C,
    ) {
        debug_assert!(T::is_valid_register(reg), "invalid register r{}", reg);
        debug_assert!(
            !T::is_scratch_register(reg)
                || input_flags.contains(CodeManagerFlags::ACTIVE_STACK_FRAME),
            "scratch register r{} reported for a non-leaf frame",
            reg
        );

        let location = match T::register_slot(reg, rd) {
            Some(location) => location,

            None if T::REPORTS_CAPTURED_REGISTERS => {
                // the value can't be updated in place, keep the object where it is
                if !callback.is_promotion() {
                    return;
                }

                flags |= GcCallFlags::PINNED;
                T::captured_register(reg, rd)
            }

            None => {
                warn!(reg, "no saved location for register, root not reported");
                return;
            }
        };

        flags |= GcCallFlags::CHECK_APP_DOMAIN;
        trace!(reg, %location, ?flags, "reporting register");

        callback.report(Slot::at(location), flags, SlotLocation::register(reg));
    }

    fn report_stack_slot_to_gc<C: RootCallback>(
        &self,
        offset: i32,
        base: GcStackSlotBase,
        mut flags: GcCallFlags,
        rd: &RegDisplay,
        callback: &mut C,
    ) {
        let address = T::stack_slot(offset, base, self.stack_base_register, rd);
        let reg = T::stack_slot_register(base, self.stack_base_register);

        flags |= GcCallFlags::CHECK_APP_DOMAIN;
        trace!(offset, %base, %address, ?flags, "reporting stack slot");

        callback.report(Slot::at(address), flags, SlotLocation::stack(reg, offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_flags_map_to_call_flags() {
        assert_eq!(GcCallFlags::empty(), call_flags(GcSlotFlags::BASE));
        assert_eq!(GcCallFlags::INTERIOR, call_flags(GcSlotFlags::INTERIOR));
        assert_eq!(
            GcCallFlags::INTERIOR | GcCallFlags::PINNED,
            call_flags(GcSlotFlags::INTERIOR | GcSlotFlags::PINNED)
        );
    }
}
