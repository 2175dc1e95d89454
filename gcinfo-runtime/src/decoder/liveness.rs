use tracing::{debug, trace};

use gcinfo_format::{BitStreamReader, GcInfoEncoding};

use crate::cpu::Target;
use crate::decoder::ranges::PseudoOffset;
use crate::decoder::{DecodeFlags, GcInfoDecoder, GcSlotDecoder};
use crate::root::{CodeManagerFlags, RootCallback};
use crate::stack::RegDisplay;

fn align_to_byte(position: usize) -> usize {
    (position + 7) & !7
}

/// Calls `f` for every set bit of a live state vector. The vector is stored
/// either as plain bits or run-length encoded, as chosen by a leading bit.
fn for_each_live_slot<E, F>(reader: &mut BitStreamReader<'_>, num_slots: u32, mut f: F)
where
    E: GcInfoEncoding,
    F: FnMut(u32),
{
    if !reader.read_one() {
        for slot in 0..num_slots {
            if reader.read_one() {
                f(slot);
            }
        }

        return;
    }

    let (skip_base, run_base) = if reader.read_one() {
        (E::LIVESTATE_RLE_RUN_ENCBASE, E::LIVESTATE_RLE_SKIP_ENCBASE)
    } else {
        (E::LIVESTATE_RLE_SKIP_ENCBASE, E::LIVESTATE_RLE_RUN_ENCBASE)
    };

    let mut slot = reader.decode_var_length_unsigned(skip_base) as u32;
    let mut live = true;

    while slot < num_slots {
        let base = if live { run_base } else { skip_base };
        let length = reader.decode_var_length_unsigned(base) as u32 + 1;

        if live {
            for live_slot in slot..slot + length {
                f(live_slot);
            }
        }

        slot += length;
        live = !live;
    }

    debug_assert_eq!(slot, num_slots, "runs exceed slot count");
}

impl<'a, T: Target> GcInfoDecoder<'a, T> {
    /// Reports every slot holding a live reference at the decoder's
    /// instruction offset to `callback`.
    ///
    /// The frame's registers and stack are taken from `rd`. Tracked slots in
    /// scratch registers or in the outgoing argument area are only reported
    /// when `input_flags` contains `ACTIVE_STACK_FRAME`: a caller frame has
    /// already lost them to the callee. Untracked slots are always reported
    /// unless `NO_REPORT_UNTRACKED` or `PARENT_OF_FUNCLET_STACK_FRAME` is set.
    pub fn enumerate_live_slots<C: RootCallback>(
        &self,
        rd: &RegDisplay,
        input_flags: CodeManagerFlags,
        callback: &mut C,
    ) {
        debug_assert!(self.flags.contains(DecodeFlags::GC_LIFETIMES));

        let execution_aborted = input_flags.contains(CodeManagerFlags::EXECUTION_ABORTED);
        let report_scratch_slots = input_flags.contains(CodeManagerFlags::ACTIVE_STACK_FRAME);

        if self.wants_report_only_leaf()
            && input_flags.contains(CodeManagerFlags::PARENT_OF_FUNCLET_STACK_FRAME)
        {
            self.log_not_reported("roots already reported by the funclet");
            return;
        }

        let mut reader = self.reader;
        reader.set_position(self.ranges_position());

        let on_safe_point = self.safe_point_index < self.num_safe_points && !execution_aborted;

        let pseudo = if on_safe_point {
            self.skip_interruptible_ranges(&mut reader);
            None
        } else {
            let pseudo = self.pseudo_offset(&mut reader, self.instruction_offset);

            if self.num_interruptible_ranges > 0 && pseudo.offset.is_none() {
                debug_assert!(execution_aborted, "no GC info for offset {}", self.instruction_offset);
                self.log_not_reported("aborted and not fully interruptible");
                return;
            }

            Some(pseudo)
        };

        let mut slots = GcSlotDecoder::<T::Encoding>::decode_slot_table(&mut reader);

        if slots.num_tracked() > 0 {
            let mut report = |slots: &mut GcSlotDecoder<'a, T::Encoding>, index: u32| {
                self.report_slot_to_gc(slots, index, rd, report_scratch_slots, input_flags, callback);
            };

            self.report_tracked_slots(&mut reader, &mut slots, pseudo, &mut report);
        }

        if slots.num_untracked() > 0
            && !input_flags.intersects(
                CodeManagerFlags::PARENT_OF_FUNCLET_STACK_FRAME
                    | CodeManagerFlags::NO_REPORT_UNTRACKED,
            )
        {
            self.report_untracked_slots(&mut slots, rd, input_flags, callback);
        }
    }

    /// Decodes the slot table, independent of the instruction offset.
    pub fn slot_table(&self) -> GcSlotDecoder<'a, T::Encoding> {
        debug_assert!(self.has_counts);

        let mut reader = self.reader;
        reader.set_position(self.ranges_position());
        self.skip_interruptible_ranges(&mut reader);

        GcSlotDecoder::decode_slot_table(&mut reader)
    }

    /// Reports only the untracked slots, which are live during the whole
    /// method. Used for frames whose offset is not a safe point, e.g. while
    /// handling an exception.
    pub fn enumerate_untracked_slots<C: RootCallback>(
        &self,
        rd: &RegDisplay,
        input_flags: CodeManagerFlags,
        callback: &mut C,
    ) {
        let mut slots = self.slot_table();
        self.report_untracked_slots(&mut slots, rd, input_flags, callback);
    }

    /// Untracked slots are live for the whole method, even inside the
    /// outgoing argument area of a caller frame.
    fn report_untracked_slots<C: RootCallback>(
        &self,
        slots: &mut GcSlotDecoder<'a, T::Encoding>,
        rd: &RegDisplay,
        input_flags: CodeManagerFlags,
        callback: &mut C,
    ) {
        for index in slots.num_tracked()..slots.num_slots() {
            self.report_slot_to_gc(slots, index, rd, true, input_flags, callback);
        }
    }

    /// `reader` starts behind the slot table. `pseudo` is `None` when the
    /// safe point table is to be used.
    fn report_tracked_slots<F>(
        &self,
        reader: &mut BitStreamReader<'a>,
        slots: &mut GcSlotDecoder<'a, T::Encoding>,
        pseudo: Option<PseudoOffset>,
        report: &mut F,
    ) where
        F: FnMut(&mut GcSlotDecoder<'a, T::Encoding>, u32),
    {
        let num_tracked = slots.num_tracked();
        let mut bits_per_live_state_offset = 0;

        if self.num_safe_points > 0 && reader.read_one() {
            bits_per_live_state_offset = reader
                .decode_var_length_unsigned(T::Encoding::POINTER_SIZE_ENCBASE)
                as u32
                + 1;
        }

        let Some(pseudo) = pseudo else {
            let index = self.safe_point_index as usize;

            if bits_per_live_state_offset > 0 {
                let table = reader.position();
                let bits = bits_per_live_state_offset as usize;

                reader.set_position(table + index * bits);
                let live_state_offset = reader.read(bits_per_live_state_offset) as usize;

                let pool = align_to_byte(table + self.num_safe_points as usize * bits);
                reader.set_position(pool + live_state_offset);

                for_each_live_slot::<T::Encoding, _>(reader, num_tracked, |slot| {
                    report(slots, slot)
                });
            } else {
                reader.skip(index * num_tracked as usize);

                for slot in 0..num_tracked {
                    if reader.read_one() {
                        report(slots, slot);
                    }
                }
            }

            return;
        };

        debug_assert!(
            bits_per_live_state_offset == 0 || self.num_interruptible_ranges == 0,
            "indirect live states together with interruptible ranges"
        );
        reader.skip(self.num_safe_points as usize * num_tracked as usize);

        if self.num_interruptible_ranges == 0 {
            return;
        }

        let Some(pseudo_offset) = pseudo.offset else {
            return;
        };

        debug!(
            offset = self.instruction_offset,
            "no GC info for call site, defaulting to fully-interruptible info"
        );

        let per_chunk = T::Encoding::NUM_NORM_CODE_OFFSETS_PER_CHUNK;
        let num_chunks = pseudo.interruptible_length.div_ceil(per_chunk);
        let break_chunk = pseudo_offset / per_chunk;
        let break_delta = pseudo_offset % per_chunk;

        let bits_per_pointer =
            reader.decode_var_length_unsigned(T::Encoding::POINTER_SIZE_ENCBASE) as u32;

        if bits_per_pointer == 0 {
            return;
        }

        let pointer_table = reader.position();
        let mut chunk = break_chunk;

        // an empty chunk has nothing live, walk back to the last one with data
        let chunk_pointer = loop {
            reader.set_position(pointer_table + chunk as usize * bits_per_pointer as usize);
            let pointer = reader.read(bits_per_pointer) as usize;

            if pointer != 0 {
                break pointer;
            }

            if chunk == 0 {
                return;
            }

            chunk -= 1;
        };

        let chunks = align_to_byte(pointer_table + num_chunks as usize * bits_per_pointer as usize);
        reader.set_position(chunks + chunk_pointer - 1);

        let could_be_live = *reader;
        let mut num_could_be_live = 0;
        for_each_live_slot::<T::Encoding, _>(reader, num_tracked, |_| num_could_be_live += 1);

        let mut final_state = *reader;
        reader.skip(num_could_be_live);

        let mut num_transitions = 0;
        let mut could_be_live_reader = could_be_live;

        for_each_live_slot::<T::Encoding, _>(&mut could_be_live_reader, num_tracked, |slot| {
            let mut is_live = final_state.read_one();

            if chunk == break_chunk {
                while reader.read_one() {
                    let transition = reader.read(T::Encoding::NUM_NORM_CODE_OFFSETS_PER_CHUNK_LOG2)
                        as u32;
                    debug_assert!(transition > 0 && transition < per_chunk);
                    num_transitions += 1;

                    if transition > break_delta {
                        is_live = !is_live;
                    }
                }
            }

            if is_live {
                report(slots, slot);
            }
        });

        trace!(num_transitions, chunk, "decoded lifetime transitions");
    }
}

#[cfg(test)]
mod tests {
    use fixedbitset::FixedBitSet;

    use gcinfo_format::{Amd64Encoding, BitStreamWriter};

    use super::*;

    fn collect(bytes: &[u8], num_slots: u32) -> Vec<u32> {
        let mut reader = BitStreamReader::new(bytes);
        let mut result = Vec::new();
        for_each_live_slot::<Amd64Encoding, _>(&mut reader, num_slots, |slot| result.push(slot));
        result
    }

    #[test]
    fn flat_live_state() {
        let mut writer = BitStreamWriter::new();
        writer.write_one(false);
        for bit in [true, false, false, true, true] {
            writer.write_one(bit);
        }

        assert_eq!(vec![0, 3, 4], collect(&writer.finish(), 5));
    }

    #[test]
    fn run_length_encoded_live_state() {
        // 3 clear, 2 set, 4 clear, 1 set
        let mut writer = BitStreamWriter::new();
        writer.write_one(true);
        writer.write_one(false);
        writer.encode_var_length_unsigned(3, Amd64Encoding::LIVESTATE_RLE_SKIP_ENCBASE);
        writer.encode_var_length_unsigned(1, Amd64Encoding::LIVESTATE_RLE_RUN_ENCBASE);
        writer.encode_var_length_unsigned(3, Amd64Encoding::LIVESTATE_RLE_SKIP_ENCBASE);
        writer.encode_var_length_unsigned(0, Amd64Encoding::LIVESTATE_RLE_RUN_ENCBASE);

        assert_eq!(vec![3, 4, 9], collect(&writer.finish(), 10));
    }

    #[test]
    fn swapped_bases() {
        // nothing clear up front, 6 set, 2 clear
        let mut writer = BitStreamWriter::new();
        writer.write_one(true);
        writer.write_one(true);
        writer.encode_var_length_unsigned(0, Amd64Encoding::LIVESTATE_RLE_RUN_ENCBASE);
        writer.encode_var_length_unsigned(5, Amd64Encoding::LIVESTATE_RLE_SKIP_ENCBASE);
        writer.encode_var_length_unsigned(1, Amd64Encoding::LIVESTATE_RLE_RUN_ENCBASE);

        assert_eq!(vec![0, 1, 2, 3, 4, 5], collect(&writer.finish(), 8));
    }

    #[test]
    fn all_clear_run() {
        let mut writer = BitStreamWriter::new();
        writer.write_one(true);
        writer.write_one(false);
        writer.encode_var_length_unsigned(12, Amd64Encoding::LIVESTATE_RLE_SKIP_ENCBASE);

        let mut bits = FixedBitSet::with_capacity(12);
        for slot in collect(&writer.finish(), 12) {
            bits.insert(slot as usize);
        }
        assert!(bits.is_clear());
    }

    #[test]
    fn alignment() {
        assert_eq!(0, align_to_byte(0));
        assert_eq!(8, align_to_byte(1));
        assert_eq!(8, align_to_byte(8));
        assert_eq!(16, align_to_byte(9));
    }
}
