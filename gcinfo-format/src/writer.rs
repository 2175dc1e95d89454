use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use fixedbitset::FixedBitSet;

use crate::bits::{BitStreamWriter, bit_width, ceil_log2, var_length_unsigned_size};
use crate::data::{
    GC_INFO_FLAGS_BIT_SIZE, GC_INFO_VERSION, GcSlot, GcSlotDesc, GcSlotFlags, GcStackSlotBase,
    GenericsContextKind, HeaderFlags, ReturnKind, is_supported_version,
};
use crate::encoding::GcInfoEncoding;
use crate::error::EncodeError;

/// Handle for a slot handed out by the encoder. The final slot index is only
/// known after `build`, see `GcInfoEncoder::slot_index`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SlotId(pub u32);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GcSlotState {
    Live,
    Dead,
}

#[derive(Copy, Clone, Debug)]
struct LifetimeTransition {
    code_offset: u32,
    slot_id: SlotId,
    becomes_live: bool,
}

#[derive(Copy, Clone, Debug)]
struct GsCookie {
    stack_slot: i32,
    valid_range_start: u32,
    valid_range_end: u32,
}

#[derive(Copy, Clone, Debug)]
struct InterruptibleRange {
    start: u32,
    length: u32,
}

type Lifetime = Vec<(u32, bool)>;

fn live_at(lifetime: &[(u32, bool)], code_offset: u32) -> bool {
    let idx = lifetime.partition_point(|&(offset, _)| offset <= code_offset);
    idx > 0 && lifetime[idx - 1].1
}

/// Builds GC info blobs readable by the decoder for the encoding `E`.
///
/// Liveness is described as a list of transitions: a slot becomes live or dead
/// at a code offset and keeps that state until the next transition. Safe points
/// record the state at the call's return offset.
pub struct GcInfoEncoder<E: GcInfoEncoding> {
    version: u32,
    code_length: Option<u32>,
    return_kind: ReturnKind,
    is_vararg: bool,
    has_tail_calls: bool,
    wants_report_only_leaf: bool,
    prolog_size: Option<u32>,
    gs_cookie: Option<GsCookie>,
    psp_sym_stack_slot: Option<i32>,
    generics_inst_context: Option<(i32, GenericsContextKind)>,
    stack_base_register: Option<u32>,
    edit_and_continue: Option<(u32, u32)>,
    reverse_pinvoke_frame_slot: Option<i32>,
    size_of_stack_area: u32,
    slots: Vec<GcSlotDesc>,
    transitions: Vec<LifetimeTransition>,
    call_sites: Vec<u32>,
    ranges: Vec<InterruptibleRange>,
    slot_map: Vec<u32>,
    _encoding: PhantomData<E>,
}

impl<E: GcInfoEncoding> GcInfoEncoder<E> {
    pub fn new() -> GcInfoEncoder<E> {
        GcInfoEncoder {
            version: GC_INFO_VERSION,
            code_length: None,
            return_kind: ReturnKind::Scalar,
            is_vararg: false,
            has_tail_calls: false,
            wants_report_only_leaf: false,
            prolog_size: None,
            gs_cookie: None,
            psp_sym_stack_slot: None,
            generics_inst_context: None,
            stack_base_register: None,
            edit_and_continue: None,
            reverse_pinvoke_frame_slot: None,
            size_of_stack_area: 0,
            slots: Vec::new(),
            transitions: Vec::new(),
            call_sites: Vec::new(),
            ranges: Vec::new(),
            slot_map: Vec::new(),
            _encoding: PhantomData,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn set_code_length(&mut self, code_length: u32) {
        self.code_length = Some(code_length);
    }

    /// Only stored for versions before 4.
    pub fn set_return_kind(&mut self, return_kind: ReturnKind) {
        self.return_kind = return_kind;
    }

    pub fn set_is_vararg(&mut self) {
        self.is_vararg = true;
    }

    pub fn set_has_tail_calls(&mut self) {
        self.has_tail_calls = true;
    }

    pub fn set_wants_report_only_leaf(&mut self) {
        self.wants_report_only_leaf = true;
    }

    pub fn set_prolog_size(&mut self, prolog_size: u32) {
        self.prolog_size = Some(prolog_size);
    }

    pub fn set_gs_cookie_stack_slot(
        &mut self,
        stack_slot: i32,
        valid_range_start: u32,
        valid_range_end: u32,
    ) {
        self.gs_cookie = Some(GsCookie {
            stack_slot,
            valid_range_start,
            valid_range_end,
        });
    }

    /// Only stored for versions before 4.
    pub fn set_psp_sym_stack_slot(&mut self, stack_slot: i32) {
        self.psp_sym_stack_slot = Some(stack_slot);
    }

    pub fn set_generics_inst_context_stack_slot(
        &mut self,
        stack_slot: i32,
        kind: GenericsContextKind,
    ) {
        self.generics_inst_context = if kind == GenericsContextKind::None {
            None
        } else {
            Some((stack_slot, kind))
        };
    }

    pub fn set_stack_base_register(&mut self, reg: u32) {
        self.stack_base_register = Some(reg);
    }

    pub fn set_size_of_edit_and_continue_preserved_area(&mut self, size: u32) {
        let fixed_frame = self.edit_and_continue.map(|(_, frame)| frame).unwrap_or(0);
        self.edit_and_continue = Some((size, fixed_frame));
    }

    pub fn set_size_of_edit_and_continue_fixed_stack_frame(&mut self, size: u32) {
        if let Some((_, ref mut fixed_frame)) = self.edit_and_continue {
            *fixed_frame = size;
        }
    }

    pub fn set_reverse_pinvoke_frame_slot(&mut self, stack_slot: i32) {
        self.reverse_pinvoke_frame_slot = Some(stack_slot);
    }

    pub fn set_size_of_stack_outgoing_and_scratch_area(&mut self, size: u32) {
        self.size_of_stack_area = size;
    }

    pub fn get_register_slot_id(&mut self, reg: u32, flags: GcSlotFlags) -> SlotId {
        self.add_slot(GcSlotDesc::register(reg, flags))
    }

    pub fn get_stack_slot_id(
        &mut self,
        offset: i32,
        flags: GcSlotFlags,
        base: GcStackSlotBase,
    ) -> SlotId {
        self.add_slot(GcSlotDesc::stack(offset, base, flags))
    }

    fn add_slot(&mut self, desc: GcSlotDesc) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(desc);
        id
    }

    pub fn set_slot_state(&mut self, code_offset: u32, slot_id: SlotId, state: GcSlotState) {
        self.transitions.push(LifetimeTransition {
            code_offset,
            slot_id,
            becomes_live: state == GcSlotState::Live,
        });
    }

    /// Call sites are given as the offset execution resumes at after the call.
    pub fn define_call_sites(&mut self, call_sites: &[u32]) {
        self.call_sites.extend_from_slice(call_sites);
    }

    pub fn define_interruptible_range(&mut self, start: u32, length: u32) {
        self.ranges.push(InterruptibleRange { start, length });
    }

    /// Index of the slot in the emitted slot table. Valid after `build`.
    pub fn slot_index(&self, slot_id: SlotId) -> Option<u32> {
        self.slot_map.get(slot_id.0 as usize).copied()
    }

    pub fn build(&mut self) -> Result<Vec<u8>, EncodeError> {
        if !is_supported_version(self.version) {
            return Err(EncodeError::UnsupportedVersion(self.version));
        }

        let code_length = self.code_length.ok_or(EncodeError::MissingCodeLength)?;
        let norm_code_length = E::normalize_code_length(code_length);

        if E::denormalize_code_length(norm_code_length) != code_length {
            return Err(EncodeError::MisalignedCodeOffset(code_length));
        }

        let order = self.sorted_slots()?;
        let mut slot_map = vec![0; self.slots.len()];

        for (index, &id) in order.iter().enumerate() {
            slot_map[id] = index as u32;
        }

        let num_registers = order
            .iter()
            .filter(|&&id| self.slots[id].slot.is_register())
            .count();
        let num_untracked = order
            .iter()
            .filter(|&&id| self.slots[id].flags.contains(GcSlotFlags::UNTRACKED))
            .count();
        let num_stack_slots = order.len() - num_registers - num_untracked;
        let num_tracked = num_registers + num_stack_slots;

        let call_sites = self.checked_call_sites(code_length)?;
        let ranges = self.checked_ranges(code_length)?;
        let lifetimes = self.lifetimes(&slot_map, num_tracked, code_length)?;

        let is_slim = self.can_use_slim_header(ranges.is_empty());

        let mut writer = BitStreamWriter::new();

        if is_slim {
            self.write_slim_header(&mut writer, norm_code_length);
        } else {
            self.write_fat_header(&mut writer, code_length, norm_code_length)?;
        }

        writer.encode_var_length_unsigned(call_sites.len() as u64, E::NUM_SAFE_POINTS_ENCBASE);

        if !is_slim {
            writer.encode_var_length_unsigned(
                ranges.len() as u64,
                E::NUM_INTERRUPTIBLE_RANGES_ENCBASE,
            );
        }

        let num_bits_per_offset = ceil_log2(E::normalize_code_offset(code_length));

        for &(_, norm_offset) in &call_sites {
            writer.write(norm_offset as u64, num_bits_per_offset);
        }

        let mut last_norm_stop = 0;

        for &(norm_start, norm_stop) in &ranges {
            writer.encode_var_length_unsigned(
                (norm_start - last_norm_stop) as u64,
                E::INTERRUPTIBLE_RANGE_DELTA1_ENCBASE,
            );
            writer.encode_var_length_unsigned(
                (norm_stop - norm_start - 1) as u64,
                E::INTERRUPTIBLE_RANGE_DELTA2_ENCBASE,
            );
            last_norm_stop = norm_stop;
        }

        self.write_slot_table(
            &mut writer,
            &order,
            num_registers,
            num_stack_slots,
            num_untracked,
        );

        if num_tracked > 0 {
            if !call_sites.is_empty() {
                let rows: Vec<FixedBitSet> = call_sites
                    .iter()
                    .map(|&(offset, _)| {
                        let mut row = FixedBitSet::with_capacity(num_tracked);
                        for (slot, lifetime) in lifetimes.iter().enumerate() {
                            row.set(slot, live_at(lifetime, offset));
                        }
                        row
                    })
                    .collect();

                write_safe_point_live_states::<E>(&mut writer, &rows, num_tracked, ranges.is_empty());
            }

            if !ranges.is_empty() {
                write_fully_interruptible::<E>(&mut writer, &lifetimes, &ranges, num_tracked);
            }
        }

        self.slot_map = slot_map;
        Ok(writer.finish())
    }

    fn can_use_slim_header(&self, no_ranges: bool) -> bool {
        let default_stack_base = match self.stack_base_register {
            Some(reg) => E::normalize_stack_base_register(reg) == 0,
            None => true,
        };

        let old_format_fits = self.version >= GC_INFO_VERSION
            || (self.psp_sym_stack_slot.is_none()
                && !(E::HAS_REPORT_ONLY_LEAF_FLAG && self.wants_report_only_leaf)
                && self.return_kind.bits() < (1 << E::SIZE_OF_RETURN_KIND_IN_SLIM_HEADER));

        no_ranges
            && default_stack_base
            && old_format_fits
            && !self.is_vararg
            && self.gs_cookie.is_none()
            && self.generics_inst_context.is_none()
            && self.edit_and_continue.is_none()
            && self.reverse_pinvoke_frame_slot.is_none()
            && !(E::HAS_TAILCALLS_FLAG && self.has_tail_calls)
            && (self.size_of_stack_area == 0 || !E::HAS_FIXED_STACK_PARAMETER_SCRATCH_AREA)
    }

    fn write_slim_header(&self, writer: &mut BitStreamWriter, norm_code_length: u32) {
        writer.write_one(false);
        writer.write_one(self.stack_base_register.is_some());

        if self.version < GC_INFO_VERSION {
            writer.write(self.return_kind.bits(), E::SIZE_OF_RETURN_KIND_IN_SLIM_HEADER);
        }

        writer.encode_var_length_unsigned(norm_code_length as u64, E::CODE_LENGTH_ENCBASE);
    }

    fn write_fat_header(
        &self,
        writer: &mut BitStreamWriter,
        code_length: u32,
        norm_code_length: u32,
    ) -> Result<(), EncodeError> {
        let old_format = self.version < GC_INFO_VERSION;
        let mut flags = HeaderFlags::empty();

        if self.is_vararg {
            flags |= HeaderFlags::IS_VARARG;
        }

        if self.gs_cookie.is_some() {
            flags |= HeaderFlags::HAS_GS_COOKIE;
        }

        if old_format && self.psp_sym_stack_slot.is_some() {
            flags |= HeaderFlags::HAS_PSP_SYM;
        }

        if let Some((_, kind)) = self.generics_inst_context {
            flags |= kind.header_flags();
        }

        if self.stack_base_register.is_some() {
            flags |= HeaderFlags::HAS_STACK_BASE_REGISTER;
        }

        if E::HAS_TAILCALLS_FLAG && self.has_tail_calls {
            flags |= HeaderFlags::HAS_TAILCALLS;
        }

        if E::HAS_REPORT_ONLY_LEAF_FLAG && old_format && self.wants_report_only_leaf {
            flags |= HeaderFlags::WANTS_REPORT_ONLY_LEAF;
        }

        if self.edit_and_continue.is_some() {
            flags |= HeaderFlags::HAS_EDIT_AND_CONTINUE_INFO;
        }

        if self.reverse_pinvoke_frame_slot.is_some() {
            flags |= HeaderFlags::REVERSE_PINVOKE_FRAME;
        }

        writer.write_one(true);
        writer.write(flags.bits() as u64, GC_INFO_FLAGS_BIT_SIZE);

        if old_format {
            writer.write(self.return_kind.bits(), E::SIZE_OF_RETURN_KIND_IN_FAT_HEADER);
        }

        writer.encode_var_length_unsigned(norm_code_length as u64, E::CODE_LENGTH_ENCBASE);

        if let Some(gs) = self.gs_cookie {
            let invalid = EncodeError::InvalidGsCookieRange {
                start: gs.valid_range_start,
                end: gs.valid_range_end,
            };

            let norm_start = E::normalize_code_offset(gs.valid_range_start);
            let norm_end = E::normalize_code_offset(gs.valid_range_end);

            if norm_start == 0 || norm_start >= norm_end || gs.valid_range_end > code_length {
                return Err(invalid);
            }

            let norm_epilog_size = E::normalize_code_offset(code_length) - norm_end;

            writer.encode_var_length_unsigned((norm_start - 1) as u64, E::NORM_PROLOG_SIZE_ENCBASE);
            writer.encode_var_length_unsigned(norm_epilog_size as u64, E::NORM_EPILOG_SIZE_ENCBASE);
        } else if self.generics_inst_context.is_some() {
            let prolog_size = self.prolog_size.ok_or(EncodeError::MissingPrologSize)?;
            let norm_prolog_size = E::normalize_code_offset(prolog_size);

            if norm_prolog_size == 0 || prolog_size >= code_length {
                return Err(EncodeError::MissingPrologSize);
            }

            writer.encode_var_length_unsigned(
                (norm_prolog_size - 1) as u64,
                E::NORM_PROLOG_SIZE_ENCBASE,
            );
        }

        if let Some(gs) = self.gs_cookie {
            let slot = self.normalized_stack_slot(gs.stack_slot)?;
            writer.encode_var_length_signed(slot as i64, E::GS_COOKIE_STACK_SLOT_ENCBASE);
        }

        if old_format {
            if let Some(psp_sym) = self.psp_sym_stack_slot {
                let slot = self.normalized_stack_slot(psp_sym)?;
                writer.encode_var_length_signed(slot as i64, E::PSP_SYM_STACK_SLOT_ENCBASE);
            }
        }

        if let Some((stack_slot, _)) = self.generics_inst_context {
            let slot = self.normalized_stack_slot(stack_slot)?;
            writer.encode_var_length_signed(
                slot as i64,
                E::GENERICS_INST_CONTEXT_STACK_SLOT_ENCBASE,
            );
        }

        if let Some(reg) = self.stack_base_register {
            writer.encode_var_length_unsigned(
                E::normalize_stack_base_register(reg) as u64,
                E::STACK_BASE_REGISTER_ENCBASE,
            );
        }

        if let Some((preserved_area, fixed_frame)) = self.edit_and_continue {
            writer.encode_var_length_unsigned(
                preserved_area as u64,
                E::SIZE_OF_EDIT_AND_CONTINUE_PRESERVED_AREA_ENCBASE,
            );

            if E::HAS_ENC_FIXED_STACK_FRAME {
                writer.encode_var_length_unsigned(
                    fixed_frame as u64,
                    E::SIZE_OF_EDIT_AND_CONTINUE_FIXED_STACK_FRAME_ENCBASE,
                );
            }
        }

        if let Some(stack_slot) = self.reverse_pinvoke_frame_slot {
            let slot = self.normalized_stack_slot(stack_slot)?;
            writer.encode_var_length_signed(slot as i64, E::REVERSE_PINVOKE_FRAME_ENCBASE);
        }

        if E::HAS_FIXED_STACK_PARAMETER_SCRATCH_AREA {
            let size = E::normalize_size_of_stack_area(self.size_of_stack_area);

            if E::denormalize_size_of_stack_area(size) != self.size_of_stack_area {
                return Err(EncodeError::MisalignedStackAreaSize(self.size_of_stack_area));
            }

            writer.encode_var_length_unsigned(size as u64, E::SIZE_OF_STACK_AREA_ENCBASE);
        }

        Ok(())
    }

    fn normalized_stack_slot(&self, offset: i32) -> Result<i32, EncodeError> {
        let norm = E::normalize_stack_slot(offset);

        if E::denormalize_stack_slot(norm) != offset {
            return Err(EncodeError::MisalignedStackOffset(offset));
        }

        Ok(norm)
    }

    /// Slot order of the table: registers, tracked stack slots, untracked
    /// stack slots. Inside each group slots with flags come first since they
    /// are always written in absolute form, the rest ascending for deltas.
    fn sorted_slots(&self) -> Result<Vec<usize>, EncodeError> {
        let mut seen = HashSet::new();

        for (id, desc) in self.slots.iter().enumerate() {
            let untracked = desc.flags.contains(GcSlotFlags::UNTRACKED);

            match desc.slot {
                GcSlot::Register(reg) if untracked => {
                    return Err(EncodeError::UntrackedRegister(reg));
                }
                GcSlot::Register(_) => {}
                GcSlot::Stack { offset, .. } => {
                    self.normalized_stack_slot(offset)?;
                }
            }

            if !seen.insert((desc.slot, untracked)) {
                return Err(EncodeError::DuplicateSlot(id as u32));
            }
        }

        let mut order: Vec<usize> = (0..self.slots.len()).collect();

        order.sort_by_key(|&id| {
            let desc = &self.slots[id];
            let flags_empty = desc.flags.encoded().is_empty();

            match desc.slot {
                GcSlot::Register(reg) => (0u8, flags_empty, reg as i64, 0u8),
                GcSlot::Stack { offset, base } => {
                    let group = if desc.flags.contains(GcSlotFlags::UNTRACKED) { 2 } else { 1 };
                    let base: u8 = base.into();
                    (group, flags_empty, E::normalize_stack_slot(offset) as i64, base)
                }
            }
        });

        Ok(order)
    }

    /// Returns (resume offset, encoded normalized offset) for every call site.
    fn checked_call_sites(&self, code_length: u32) -> Result<Vec<(u32, u32)>, EncodeError> {
        let mut call_sites = self.call_sites.clone();
        call_sites.sort_unstable();
        call_sites.dedup();

        call_sites
            .into_iter()
            .map(|offset| {
                if offset >= code_length {
                    return Err(EncodeError::CodeOffsetOutOfRange {
                        offset,
                        code_length,
                    });
                }

                if self.version < GC_INFO_VERSION {
                    // old formats store the offset of the call's last byte
                    if offset == 0 {
                        return Err(EncodeError::CodeOffsetOutOfRange {
                            offset,
                            code_length,
                        });
                    }

                    Ok((offset, E::normalize_code_offset(offset - 1)))
                } else {
                    let norm = E::normalize_code_offset(offset);

                    if E::denormalize_code_offset(norm) != offset {
                        return Err(EncodeError::MisalignedCodeOffset(offset));
                    }

                    Ok((offset, norm))
                }
            })
            .collect()
    }

    /// Returns sorted (normalized start, normalized stop) pairs.
    fn checked_ranges(&self, code_length: u32) -> Result<Vec<(u32, u32)>, EncodeError> {
        let mut ranges = self.ranges.clone();
        ranges.sort_by_key(|range| range.start);

        let mut result = Vec::with_capacity(ranges.len());
        let mut previous_end = 0;

        for range in ranges {
            if range.length == 0 {
                return Err(EncodeError::EmptyInterruptibleRange(range.start));
            }

            let end = range.start + range.length;

            if end > code_length {
                return Err(EncodeError::CodeOffsetOutOfRange {
                    offset: end,
                    code_length,
                });
            }

            if range.start < previous_end {
                return Err(EncodeError::OverlappingInterruptibleRanges {
                    start: range.start,
                    previous_end,
                });
            }

            for offset in [range.start, end] {
                if E::denormalize_code_offset(E::normalize_code_offset(offset)) != offset {
                    return Err(EncodeError::MisalignedCodeOffset(offset));
                }
            }

            result.push((E::normalize_code_offset(range.start), E::normalize_code_offset(end)));
            previous_end = end;
        }

        Ok(result)
    }

    fn lifetimes(
        &self,
        slot_map: &[u32],
        num_tracked: usize,
        code_length: u32,
    ) -> Result<Vec<Lifetime>, EncodeError> {
        let mut lifetimes = vec![Vec::new(); num_tracked];

        for transition in &self.transitions {
            let id = transition.slot_id.0;
            let desc = self
                .slots
                .get(id as usize)
                .ok_or(EncodeError::UnknownSlot(id))?;

            if desc.flags.contains(GcSlotFlags::UNTRACKED) {
                return Err(EncodeError::UntrackedLifetime(id));
            }

            if transition.code_offset > code_length {
                return Err(EncodeError::CodeOffsetOutOfRange {
                    offset: transition.code_offset,
                    code_length,
                });
            }

            let index = slot_map[id as usize] as usize;
            lifetimes[index].push((transition.code_offset, transition.becomes_live));
        }

        for lifetime in &mut lifetimes {
            // stable: the last transition recorded for an offset wins
            lifetime.sort_by_key(|&(offset, _)| offset);
        }

        Ok(lifetimes)
    }

    fn write_slot_table(
        &self,
        writer: &mut BitStreamWriter,
        order: &[usize],
        num_registers: usize,
        num_stack_slots: usize,
        num_untracked: usize,
    ) {
        if num_registers > 0 {
            writer.write_one(true);
            writer.encode_var_length_unsigned(num_registers as u64, E::NUM_REGISTERS_ENCBASE);
        } else {
            writer.write_one(false);
        }

        if num_stack_slots > 0 || num_untracked > 0 {
            writer.write_one(true);
            writer.encode_var_length_unsigned(num_stack_slots as u64, E::NUM_STACK_SLOTS_ENCBASE);
            writer.encode_var_length_unsigned(num_untracked as u64, E::NUM_UNTRACKED_SLOTS_ENCBASE);
        } else {
            writer.write_one(false);
        }

        let (registers, stack) = order.split_at(num_registers);
        let (tracked, untracked) = stack.split_at(num_stack_slots);

        let mut previous: Option<(u32, GcSlotFlags)> = None;

        for &id in registers {
            let desc = &self.slots[id];
            let flags = desc.flags.encoded();
            let GcSlot::Register(reg) = desc.slot else {
                unreachable!("register group holds a stack slot");
            };

            match previous {
                Some((previous_reg, previous_flags)) if previous_flags.is_empty() => {
                    debug_assert!(flags.is_empty() && reg > previous_reg);
                    writer.encode_var_length_unsigned(
                        (reg - previous_reg - 1) as u64,
                        E::REGISTER_DELTA_ENCBASE,
                    );
                }
                _ => {
                    writer.encode_var_length_unsigned(reg as u64, E::REGISTER_ENCBASE);
                    writer.write(flags.bits() as u64, GcSlotFlags::ENCODED_BITS);
                }
            }

            previous = Some((reg, flags));
        }

        self.write_stack_slots(writer, tracked);
        self.write_stack_slots(writer, untracked);
    }

    fn write_stack_slots(&self, writer: &mut BitStreamWriter, ids: &[usize]) {
        let mut previous: Option<(i32, GcSlotFlags)> = None;

        for &id in ids {
            let desc = &self.slots[id];
            let flags = desc.flags.encoded();
            let GcSlot::Stack { offset, base } = desc.slot else {
                unreachable!("stack group holds a register");
            };
            let norm_offset = E::normalize_stack_slot(offset);
            let base: u8 = base.into();

            writer.write(base as u64, GcStackSlotBase::ENCODED_BITS);

            match previous {
                Some((previous_offset, previous_flags)) if previous_flags.is_empty() => {
                    debug_assert!(flags.is_empty() && norm_offset >= previous_offset);
                    writer.encode_var_length_unsigned(
                        (norm_offset - previous_offset) as u64,
                        E::STACK_SLOT_DELTA_ENCBASE,
                    );
                }
                _ => {
                    writer.encode_var_length_signed(norm_offset as i64, E::STACK_SLOT_ENCBASE);
                    writer.write(flags.bits() as u64, GcSlotFlags::ENCODED_BITS);
                }
            }

            previous = Some((norm_offset, flags));
        }
    }
}

impl<E: GcInfoEncoding> Default for GcInfoEncoder<E> {
    fn default() -> GcInfoEncoder<E> {
        GcInfoEncoder::new()
    }
}

/// Run lengths starting with the (possibly empty) run of clear bits.
fn runs(bits: &FixedBitSet, num_slots: usize) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut current = false;
    let mut length = 0;

    for slot in 0..num_slots {
        if bits.contains(slot) == current {
            length += 1;
        } else {
            runs.push(length);
            current = !current;
            length = 1;
        }
    }

    runs.push(length);
    runs
}

fn write_rle<E: GcInfoEncoding>(
    writer: &mut BitStreamWriter,
    bits: &FixedBitSet,
    num_slots: usize,
    swapped: bool,
) {
    let (skip_base, run_base) = if swapped {
        (E::LIVESTATE_RLE_RUN_ENCBASE, E::LIVESTATE_RLE_SKIP_ENCBASE)
    } else {
        (E::LIVESTATE_RLE_SKIP_ENCBASE, E::LIVESTATE_RLE_RUN_ENCBASE)
    };

    writer.write_one(true);
    writer.write_one(swapped);

    let runs = runs(bits, num_slots);
    writer.encode_var_length_unsigned(runs[0] as u64, skip_base);

    for (idx, &length) in runs.iter().enumerate().skip(1) {
        let base = if idx % 2 == 1 { run_base } else { skip_base };
        writer.encode_var_length_unsigned((length - 1) as u64, base);
    }
}

/// Writes a bit vector either flat or run-length encoded, whichever is smaller.
fn write_live_state<E: GcInfoEncoding>(
    writer: &mut BitStreamWriter,
    bits: &FixedBitSet,
    num_slots: usize,
) {
    let mut best = BitStreamWriter::new();
    best.write_one(false);
    for slot in 0..num_slots {
        best.write_one(bits.contains(slot));
    }

    for swapped in [false, true] {
        let mut candidate = BitStreamWriter::new();
        write_rle::<E>(&mut candidate, bits, num_slots, swapped);

        if candidate.position() < best.position() {
            best = candidate;
        }
    }

    writer.append(&best);
}

fn write_safe_point_live_states<E: GcInfoEncoding>(
    writer: &mut BitStreamWriter,
    rows: &[FixedBitSet],
    num_tracked: usize,
    allow_indirect: bool,
) {
    // the indirect table can't be skipped on the fully interruptible path
    if allow_indirect {
        let mut pool = BitStreamWriter::new();
        let mut entries: HashMap<&FixedBitSet, usize> = HashMap::new();
        let mut offsets = Vec::with_capacity(rows.len());

        for row in rows {
            let offset = *entries.entry(row).or_insert_with(|| {
                let offset = pool.position();
                write_live_state::<E>(&mut pool, row, num_tracked);
                offset
            });
            offsets.push(offset);
        }

        let max_offset = offsets.iter().copied().max().unwrap_or(0);
        let num_bits_per_offset = bit_width(max_offset as u64).max(1);

        let indirect_size = 1
            + var_length_unsigned_size((num_bits_per_offset - 1) as u64, E::POINTER_SIZE_ENCBASE)
            + rows.len() * num_bits_per_offset as usize
            + 7
            + pool.position();
        let flat_size = 1 + rows.len() * num_tracked;

        if indirect_size < flat_size {
            writer.write_one(true);
            writer.encode_var_length_unsigned(
                (num_bits_per_offset - 1) as u64,
                E::POINTER_SIZE_ENCBASE,
            );

            for offset in offsets {
                writer.write(offset as u64, num_bits_per_offset);
            }

            writer.align_to_byte();
            writer.append(&pool);
            return;
        }
    }

    writer.write_one(false);

    for row in rows {
        for slot in 0..num_tracked {
            writer.write_one(row.contains(slot));
        }
    }
}

fn write_fully_interruptible<E: GcInfoEncoding>(
    writer: &mut BitStreamWriter,
    lifetimes: &[Lifetime],
    ranges: &[(u32, u32)],
    num_tracked: usize,
) {
    let per_chunk = E::NUM_NORM_CODE_OFFSETS_PER_CHUNK as usize;

    // real code offset for every pseudo offset of the concatenated ranges
    let pseudo_offsets: Vec<u32> = ranges
        .iter()
        .flat_map(|&(start, stop)| (start..stop).map(E::denormalize_code_offset))
        .collect();
    let num_chunks = pseudo_offsets.len().div_ceil(per_chunk);

    let mut bodies: Vec<Option<BitStreamWriter>> = Vec::with_capacity(num_chunks);

    for chunk in 0..num_chunks {
        let start = chunk * per_chunk;
        let end = (start + per_chunk).min(pseudo_offsets.len());

        let mut could_be_live = FixedBitSet::with_capacity(num_tracked);
        let mut final_state = FixedBitSet::with_capacity(num_tracked);
        let mut transitions = vec![Vec::new(); num_tracked];

        for (slot, lifetime) in lifetimes.iter().enumerate() {
            let mut state = chunk > 0 && live_at(lifetime, pseudo_offsets[start - 1]);
            let mut any_live = state;

            for (delta, &offset) in pseudo_offsets[start..end].iter().enumerate() {
                let live = live_at(lifetime, offset);

                if delta > 0 && live != state {
                    transitions[slot].push(delta as u64);
                }

                state = live;
                any_live |= live;
            }

            could_be_live.set(slot, any_live);
            final_state.set(slot, state);
        }

        if could_be_live.is_clear() {
            bodies.push(None);
            continue;
        }

        let mut body = BitStreamWriter::new();
        write_live_state::<E>(&mut body, &could_be_live, num_tracked);

        for slot in could_be_live.ones() {
            body.write_one(final_state.contains(slot));
        }

        for slot in could_be_live.ones() {
            for &delta in &transitions[slot] {
                body.write_one(true);
                body.write(delta, E::NUM_NORM_CODE_OFFSETS_PER_CHUNK_LOG2);
            }

            body.write_one(false);
        }

        bodies.push(Some(body));
    }

    let mut pointers = Vec::with_capacity(num_chunks);
    let mut size = 0;

    for body in &bodies {
        match body {
            Some(body) => {
                pointers.push(size as u64 + 1);
                size += body.position();
            }
            None => pointers.push(0),
        }
    }

    let max_pointer = pointers.iter().copied().max().unwrap_or(0);

    if max_pointer == 0 {
        writer.encode_var_length_unsigned(0, E::POINTER_SIZE_ENCBASE);
        return;
    }

    let num_bits_per_pointer = bit_width(max_pointer);
    writer.encode_var_length_unsigned(num_bits_per_pointer as u64, E::POINTER_SIZE_ENCBASE);

    for pointer in pointers {
        writer.write(pointer, num_bits_per_pointer);
    }

    writer.align_to_byte();

    for body in bodies.iter().flatten() {
        writer.append(body);
    }
}
