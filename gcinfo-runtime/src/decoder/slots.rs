use std::marker::PhantomData;

use gcinfo_format::{
    BitStreamReader, GcInfoEncoding, GcSlot, GcSlotDesc, GcSlotFlags, GcStackSlotBase,
};

/// Slots decoded up front, the rest is decoded on demand.
pub const MAX_PREDECODED_SLOTS: usize = 64;

/// Decoded slot table of a method.
///
/// Slot indices follow the table order: registers, tracked stack slots,
/// untracked stack slots. Only the first `MAX_PREDECODED_SLOTS` slots are
/// kept, later ones are decoded by a cursor that caches its last result.
pub struct GcSlotDecoder<'a, E: GcInfoEncoding> {
    num_registers: u32,
    num_stack_slots: u32,
    num_untracked: u32,
    slots: [GcSlotDesc; MAX_PREDECODED_SLOTS],
    cursor: Option<SlotCursor<'a>>,
    _encoding: PhantomData<E>,
}

/// Replays the slot table behind the predecoded prefix.
#[derive(Copy, Clone)]
struct SlotCursor<'a> {
    start: BitStreamReader<'a>,
    start_slot: GcSlotDesc,
    reader: BitStreamReader<'a>,
    last_slot: GcSlotDesc,
    num_decoded: u32,
}

impl<'a, E: GcInfoEncoding> GcSlotDecoder<'a, E> {
    /// Decodes the slot table, leaving `reader` behind it.
    pub fn decode_slot_table(reader: &mut BitStreamReader<'a>) -> GcSlotDecoder<'a, E> {
        let num_registers = if reader.read_one() {
            reader.decode_var_length_unsigned(E::NUM_REGISTERS_ENCBASE) as u32
        } else {
            0
        };

        let (num_stack_slots, num_untracked) = if reader.read_one() {
            let num_stack_slots = reader.decode_var_length_unsigned(E::NUM_STACK_SLOTS_ENCBASE) as u32;
            let num_untracked =
                reader.decode_var_length_unsigned(E::NUM_UNTRACKED_SLOTS_ENCBASE) as u32;
            (num_stack_slots, num_untracked)
        } else {
            (0, 0)
        };

        let mut decoder = GcSlotDecoder {
            num_registers,
            num_stack_slots,
            num_untracked,
            slots: [GcSlotDesc::register(0, GcSlotFlags::BASE); MAX_PREDECODED_SLOTS],
            cursor: None,
            _encoding: PhantomData,
        };

        let num_slots = decoder.num_slots();
        let num_predecoded = (num_slots as usize).min(MAX_PREDECODED_SLOTS);
        let mut previous = None;

        for index in 0..num_predecoded {
            let slot = decoder.decode_slot(reader, index as u32, previous.as_ref());
            decoder.slots[index] = slot;
            previous = Some(slot);
        }

        if num_predecoded < num_slots as usize {
            let last_slot = decoder.slots[MAX_PREDECODED_SLOTS - 1];
            let cursor = SlotCursor {
                start: *reader,
                start_slot: last_slot,
                reader: *reader,
                last_slot,
                num_decoded: MAX_PREDECODED_SLOTS as u32,
            };

            // run a copy of the cursor over the rest of the table to find its end
            let mut skip = cursor;
            decoder.advance(&mut skip, num_slots - 1);
            *reader = skip.reader;

            decoder.cursor = Some(cursor);
        }

        decoder
    }

    pub fn num_registers(&self) -> u32 {
        self.num_registers
    }

    pub fn num_stack_slots(&self) -> u32 {
        self.num_stack_slots
    }

    pub fn num_untracked(&self) -> u32 {
        self.num_untracked
    }

    pub fn num_tracked(&self) -> u32 {
        self.num_registers + self.num_stack_slots
    }

    pub fn num_slots(&self) -> u32 {
        self.num_tracked() + self.num_untracked
    }

    pub fn is_untracked(&self, index: u32) -> bool {
        index >= self.num_tracked()
    }

    pub fn slot_desc(&mut self, index: u32) -> GcSlotDesc {
        debug_assert!(index < self.num_slots());

        if (index as usize) < MAX_PREDECODED_SLOTS {
            return self.slots[index as usize];
        }

        let Some(mut cursor) = self.cursor else {
            unreachable!("slot {} beyond a table of {} slots", index, self.num_slots());
        };

        if index + 1 < cursor.num_decoded {
            cursor.reader = cursor.start;
            cursor.last_slot = cursor.start_slot;
            cursor.num_decoded = MAX_PREDECODED_SLOTS as u32;
        }

        self.advance(&mut cursor, index);
        self.cursor = Some(cursor);
        cursor.last_slot
    }

    /// Decodes forward until `cursor.last_slot` is the slot at `index`.
    fn advance(&self, cursor: &mut SlotCursor<'a>, index: u32) {
        while cursor.num_decoded <= index {
            cursor.last_slot =
                self.decode_slot(&mut cursor.reader, cursor.num_decoded, Some(&cursor.last_slot));
            cursor.num_decoded += 1;
        }
    }

    /// The first slot of each group and every slot following one with
    /// flags is stored in full, other slots as a delta to their predecessor.
    fn decode_slot(
        &self,
        reader: &mut BitStreamReader<'a>,
        index: u32,
        previous: Option<&GcSlotDesc>,
    ) -> GcSlotDesc {
        let group_start = index == 0 || index == self.num_registers || index == self.num_tracked();
        let delta_base = previous.filter(|previous| !group_start && previous.flags.is_empty());

        if index < self.num_registers {
            match delta_base.map(|previous| previous.slot) {
                Some(GcSlot::Register(previous_reg)) => {
                    let delta = reader.decode_var_length_unsigned(E::REGISTER_DELTA_ENCBASE) as u32;
                    GcSlotDesc::register(previous_reg + delta + 1, GcSlotFlags::BASE)
                }
                _ => {
                    let reg = reader.decode_var_length_unsigned(E::REGISTER_ENCBASE) as u32;
                    GcSlotDesc::register(reg, read_flags(reader))
                }
            }
        } else {
            let base = read_stack_base(reader);

            match delta_base.map(|previous| previous.slot) {
                Some(GcSlot::Stack { offset, .. }) => {
                    let delta = reader.decode_var_length_unsigned(E::STACK_SLOT_DELTA_ENCBASE) as i32;
                    let norm_offset = E::normalize_stack_slot(offset) + delta;
                    GcSlotDesc::stack(E::denormalize_stack_slot(norm_offset), base, GcSlotFlags::BASE)
                }
                _ => {
                    let norm_offset = reader.decode_var_length_signed(E::STACK_SLOT_ENCBASE) as i32;
                    GcSlotDesc::stack(
                        E::denormalize_stack_slot(norm_offset),
                        base,
                        read_flags(reader),
                    )
                }
            }
        }
    }
}

fn read_flags(reader: &mut BitStreamReader<'_>) -> GcSlotFlags {
    GcSlotFlags::from_bits_retain(reader.read(GcSlotFlags::ENCODED_BITS) as u8)
}

fn read_stack_base(reader: &mut BitStreamReader<'_>) -> GcStackSlotBase {
    let bits = reader.read(GcStackSlotBase::ENCODED_BITS) as u8;
    debug_assert!(bits <= GcStackSlotBase::FrameRegRel as u8, "invalid stack base {}", bits);
    GcStackSlotBase::try_from(bits).unwrap_or(GcStackSlotBase::SpRel)
}
