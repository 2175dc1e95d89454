use std::marker::PhantomData;

use tracing::debug;

use gcinfo_format::{
    BitStreamReader, GC_INFO_VERSION, GcInfoEncoding, GcInfoToken, GenericsContextKind,
    HeaderFlags, NO_GENERICS_INST_CONTEXT, NO_GS_COOKIE, NO_PSP_SYM, NO_REVERSE_PINVOKE_FRAME,
    NO_SIZE_OF_EDIT_AND_CONTINUE_PRESERVED_AREA, NO_STACK_BASE_REGISTER, ReturnKind, ceil_log2,
};

use crate::cpu::Target;

pub use self::slots::{GcSlotDecoder, MAX_PREDECODED_SLOTS};

mod header;
mod liveness;
mod ranges;
mod report;
mod safepoints;
mod slots;

bitflags::bitflags! {
    /// Selects what the decoder needs to find out. Header decoding stops as
    /// soon as all requested fields are known.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct DecodeFlags: u32 {
        const EVERYTHING = 0x0;
        const CODE_LENGTH = 0x2;
        const VARARG = 0x4;
        const INTERRUPTIBILITY = 0x8;
        const GC_LIFETIMES = 0x10;
        const NO_VALIDATION = 0x20;
        const PSP_SYM = 0x40;
        const GENERICS_INST_CONTEXT = 0x80;
        const GS_COOKIE = 0x100;
        const FOR_RANGES_CALLBACK = 0x200;
        const PROLOG_LENGTH = 0x400;
        const EDIT_AND_CONTINUE = 0x800;
        const REVERSE_PINVOKE_VAR = 0x1000;
        const RETURN_KIND = 0x2000;
        const HAS_TAILCALLS = 0x4000;
    }
}

/// Decoder for the GC info of a single method.
///
/// A decoder is created per query: the constructor decodes as much of the
/// header as `flags` asks for and, for liveness and interruptibility queries,
/// locates `instruction_offset` in the safe point table. Code offsets are
/// given as the offset execution resumes at, except for lifetime queries on
/// blobs before version 4 (see `new`).
pub struct GcInfoDecoder<'a, T: Target> {
    reader: BitStreamReader<'a>,
    version: u32,
    flags: DecodeFlags,
    decoded: DecodeFlags,
    instruction_offset: u32,
    header_flags: HeaderFlags,
    is_interruptible: bool,
    return_kind: ReturnKind,
    code_length: u32,
    valid_range_start: u32,
    valid_range_end: u32,
    gs_cookie_stack_slot: i32,
    psp_sym_stack_slot: i32,
    generics_inst_context_stack_slot: i32,
    stack_base_register: u32,
    size_of_edit_and_continue_preserved_area: u32,
    size_of_edit_and_continue_fixed_stack_frame: u32,
    reverse_pinvoke_frame_stack_slot: i32,
    size_of_stack_outgoing_and_scratch_area: u32,
    has_counts: bool,
    num_safe_points: u32,
    num_interruptible_ranges: u32,
    safe_point_index: u32,
    safe_points_position: usize,
    _target: PhantomData<T>,
}

impl<'a, T: Target> GcInfoDecoder<'a, T> {
    /// Decodes the header groups in `flags` for `instruction_offset`.
    ///
    /// Blobs before version 4 store a call site as the offset of the call's
    /// last byte. `INTERRUPTIBILITY` takes the return offset and adjusts it,
    /// `GC_LIFETIMES` expects the caller to pass the adjusted offset.
    pub fn new(
        token: GcInfoToken<'a>,
        flags: DecodeFlags,
        instruction_offset: u32,
    ) -> GcInfoDecoder<'a, T> {
        debug_assert!(
            flags.intersects(DecodeFlags::INTERRUPTIBILITY | DecodeFlags::GC_LIFETIMES)
                || instruction_offset == 0
        );
        debug_assert!(
            !flags.contains(DecodeFlags::INTERRUPTIBILITY | DecodeFlags::GC_LIFETIMES),
            "interruptibility and lifetimes can't be decoded together"
        );
        debug_assert!(
            !flags.contains(DecodeFlags::INTERRUPTIBILITY | DecodeFlags::FOR_RANGES_CALLBACK),
            "both would consume the interruptible ranges"
        );

        // lifetimes and interruptibility are never cleared from the remaining
        // groups, so a full decode runs through the whole header
        let decoded = if flags.is_empty() {
            DecodeFlags::all()
        } else {
            flags
        };

        let mut decoder = GcInfoDecoder {
            reader: BitStreamReader::new(token.data),
            version: token.version,
            flags,
            decoded,
            instruction_offset,
            header_flags: HeaderFlags::empty(),
            is_interruptible: false,
            return_kind: ReturnKind::Illegal,
            code_length: 0,
            valid_range_start: 0,
            valid_range_end: 0,
            gs_cookie_stack_slot: NO_GS_COOKIE,
            psp_sym_stack_slot: NO_PSP_SYM,
            generics_inst_context_stack_slot: NO_GENERICS_INST_CONTEXT,
            stack_base_register: NO_STACK_BASE_REGISTER,
            size_of_edit_and_continue_preserved_area: NO_SIZE_OF_EDIT_AND_CONTINUE_PRESERVED_AREA,
            size_of_edit_and_continue_fixed_stack_frame: 0,
            reverse_pinvoke_frame_stack_slot: NO_REVERSE_PINVOKE_FRAME,
            size_of_stack_outgoing_and_scratch_area: 0,
            has_counts: false,
            num_safe_points: 0,
            num_interruptible_ranges: 0,
            safe_point_index: 0,
            safe_points_position: 0,
            _target: PhantomData,
        };

        let is_slim = !decoder.reader.read_one();

        if decoder.decode_header(is_slim, decoded) {
            return decoder;
        }

        decoder.num_safe_points = decoder
            .reader
            .decode_var_length_unsigned(T::Encoding::NUM_SAFE_POINTS_ENCBASE)
            as u32;
        decoder.safe_point_index = decoder.num_safe_points;

        decoder.num_interruptible_ranges = if is_slim {
            0
        } else {
            decoder
                .reader
                .decode_var_length_unsigned(T::Encoding::NUM_INTERRUPTIBLE_RANGES_ENCBASE)
                as u32
        };

        decoder.has_counts = true;
        decoder.safe_points_position = decoder.reader.position();

        if flags.intersects(DecodeFlags::GC_LIFETIMES | DecodeFlags::INTERRUPTIBILITY) {
            if decoder.num_safe_points > 0 {
                // lifetime queries on old formats already pass the offset
                // inside the call
                let offset = if flags.contains(DecodeFlags::INTERRUPTIBILITY) {
                    decoder.adjusted_safe_point_offset(instruction_offset)
                } else {
                    Some(instruction_offset)
                };

                if let Some(offset) = offset {
                    decoder.safe_point_index = decoder.find_safe_point(offset);
                } else {
                    decoder.reader.skip(decoder.safe_point_table_bits());
                }
            }
        } else if flags.contains(DecodeFlags::FOR_RANGES_CALLBACK) {
            decoder.reader.skip(decoder.safe_point_table_bits());
        }

        if flags.contains(DecodeFlags::INTERRUPTIBILITY) {
            let offset = instruction_offset;
            let mut is_interruptible = false;

            decoder.enumerate_interruptible_ranges(|start, stop| {
                if start <= offset && offset < stop {
                    is_interruptible = true;
                    true
                } else {
                    false
                }
            });

            decoder.is_interruptible = is_interruptible;
        }

        decoder
    }

    fn is_decoded(&self, flags: DecodeFlags) -> bool {
        self.decoded.intersects(flags)
    }

    fn bits_per_code_offset(&self) -> u32 {
        ceil_log2(T::Encoding::normalize_code_offset(self.code_length))
    }

    fn safe_point_table_bits(&self) -> usize {
        self.num_safe_points as usize * self.bits_per_code_offset() as usize
    }

    /// Start of the interruptible ranges, right behind the safe point table.
    fn ranges_position(&self) -> usize {
        debug_assert!(self.has_counts);
        self.safe_points_position + self.safe_point_table_bits()
    }

    /// Safe points of old formats are recorded at the last byte of the call.
    fn adjusted_safe_point_offset(&self, offset: u32) -> Option<u32> {
        if self.version < GC_INFO_VERSION {
            offset.checked_sub(1)
        } else {
            Some(offset)
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn instruction_offset(&self) -> u32 {
        self.instruction_offset
    }

    pub fn is_interruptible(&self) -> bool {
        debug_assert!(self.flags.contains(DecodeFlags::INTERRUPTIBILITY));
        self.is_interruptible
    }

    pub fn has_interruptible_ranges(&self) -> bool {
        debug_assert!(self.has_counts);
        self.num_interruptible_ranges > 0
    }

    pub fn num_interruptible_ranges(&self) -> u32 {
        debug_assert!(self.has_counts);
        self.num_interruptible_ranges
    }

    pub fn num_safe_points(&self) -> u32 {
        debug_assert!(self.has_counts);
        self.num_safe_points
    }

    /// True if `instruction_offset` is one of the recorded safe points.
    pub fn is_safe_point(&self) -> bool {
        debug_assert!(
            self.flags
                .intersects(DecodeFlags::INTERRUPTIBILITY | DecodeFlags::GC_LIFETIMES)
        );
        self.safe_point_index != self.num_safe_points
    }

    /// Index of `instruction_offset` in the safe point table.
    pub fn safe_point_index(&self) -> Option<u32> {
        if self.safe_point_index < self.num_safe_points {
            Some(self.safe_point_index)
        } else {
            None
        }
    }

    /// Methods with interruptible ranges may drop call sites without tracked
    /// references, so only methods without ranges can rule a safe point out.
    pub fn could_be_safe_point(&self) -> bool {
        self.num_interruptible_ranges == 0
    }

    pub fn gs_cookie_stack_slot(&self) -> Option<i32> {
        debug_assert!(self.is_decoded(DecodeFlags::GS_COOKIE));
        (self.gs_cookie_stack_slot != NO_GS_COOKIE).then_some(self.gs_cookie_stack_slot)
    }

    /// Code range `[start, end)` in which the GS cookie is valid, `(0, 0)`
    /// when the method has none.
    pub fn gs_cookie_valid_range(&self) -> (u32, u32) {
        debug_assert!(self.is_decoded(DecodeFlags::GS_COOKIE));
        (self.valid_range_start, self.valid_range_end)
    }

    pub fn prolog_size(&self) -> u32 {
        debug_assert!(self.is_decoded(DecodeFlags::PROLOG_LENGTH));
        self.valid_range_start
    }

    pub fn psp_sym_stack_slot(&self) -> Option<i32> {
        debug_assert!(self.is_decoded(DecodeFlags::PSP_SYM));
        (self.psp_sym_stack_slot != NO_PSP_SYM).then_some(self.psp_sym_stack_slot)
    }

    pub fn generics_inst_context_stack_slot(&self) -> Option<i32> {
        debug_assert!(self.is_decoded(DecodeFlags::GENERICS_INST_CONTEXT));
        (self.generics_inst_context_stack_slot != NO_GENERICS_INST_CONTEXT)
            .then_some(self.generics_inst_context_stack_slot)
    }

    pub fn generics_inst_context_kind(&self) -> GenericsContextKind {
        self.header_flags.generics_context_kind()
    }

    pub fn has_method_desc_generics_inst_context(&self) -> bool {
        self.generics_inst_context_kind() == GenericsContextKind::MethodDesc
    }

    pub fn has_method_table_generics_inst_context(&self) -> bool {
        self.generics_inst_context_kind() == GenericsContextKind::MethodTable
    }

    pub fn has_stack_base_register(&self) -> bool {
        self.header_flags
            .contains(HeaderFlags::HAS_STACK_BASE_REGISTER)
    }

    pub fn stack_base_register(&self) -> Option<u32> {
        (self.stack_base_register != NO_STACK_BASE_REGISTER).then_some(self.stack_base_register)
    }

    pub fn is_vararg(&self) -> bool {
        debug_assert!(self.is_decoded(DecodeFlags::VARARG));
        self.header_flags.contains(HeaderFlags::IS_VARARG)
    }

    pub fn has_tail_calls(&self) -> bool {
        debug_assert!(self.is_decoded(DecodeFlags::HAS_TAILCALLS));
        T::Encoding::HAS_TAILCALLS_FLAG && self.header_flags.contains(HeaderFlags::HAS_TAILCALLS)
    }

    /// Only the leaf frame of a method with funclets reports its roots.
    /// Old x64 headers can opt out.
    pub fn wants_report_only_leaf(&self) -> bool {
        if T::Encoding::HAS_REPORT_ONLY_LEAF_FLAG && self.version < GC_INFO_VERSION {
            self.header_flags
                .contains(HeaderFlags::WANTS_REPORT_ONLY_LEAF)
        } else {
            true
        }
    }

    pub fn code_length(&self) -> u32 {
        debug_assert!(self.is_decoded(DecodeFlags::CODE_LENGTH));
        self.code_length
    }

    /// Only recorded by versions before 4, `ReturnKind::Illegal` otherwise.
    pub fn return_kind(&self) -> ReturnKind {
        debug_assert!(self.is_decoded(DecodeFlags::RETURN_KIND));
        self.return_kind
    }

    pub fn size_of_edit_and_continue_preserved_area(&self) -> Option<u32> {
        debug_assert!(self.is_decoded(DecodeFlags::EDIT_AND_CONTINUE));
        (self.size_of_edit_and_continue_preserved_area
            != NO_SIZE_OF_EDIT_AND_CONTINUE_PRESERVED_AREA)
            .then_some(self.size_of_edit_and_continue_preserved_area)
    }

    /// Always 0 for targets other than arm64.
    pub fn size_of_edit_and_continue_fixed_stack_frame(&self) -> u32 {
        debug_assert!(self.is_decoded(DecodeFlags::EDIT_AND_CONTINUE));
        self.size_of_edit_and_continue_fixed_stack_frame
    }

    pub fn reverse_pinvoke_frame_stack_slot(&self) -> Option<i32> {
        debug_assert!(self.is_decoded(DecodeFlags::REVERSE_PINVOKE_VAR));
        (self.reverse_pinvoke_frame_stack_slot != NO_REVERSE_PINVOKE_FRAME)
            .then_some(self.reverse_pinvoke_frame_stack_slot)
    }

    pub fn size_of_stack_parameter_area(&self) -> u32 {
        self.size_of_stack_outgoing_and_scratch_area
    }

    /// Bytes consumed by the constructor.
    pub fn num_bytes_read(&self) -> usize {
        self.reader.num_bytes_read()
    }

    fn log_not_reported(&self, reason: &str) {
        debug!(
            offset = self.instruction_offset,
            "not reporting this frame: {}", reason
        );
    }
}
