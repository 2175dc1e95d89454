use gcinfo_format::{
    GC_INFO_FLAGS_BIT_SIZE, GC_INFO_VERSION, GcInfoEncoding, GenericsContextKind, HeaderFlags,
    ReturnKind,
};

use crate::cpu::Target;
use crate::decoder::{DecodeFlags, GcInfoDecoder};

impl<'a, T: Target> GcInfoDecoder<'a, T> {
    /// Decodes the header behind the slim/fat bit. Returns true if decoding
    /// stopped early because everything in `remaining` was known.
    pub(super) fn decode_header(&mut self, is_slim: bool, remaining: DecodeFlags) -> bool {
        if is_slim {
            self.decode_slim_header(remaining)
        } else {
            self.decode_fat_header(remaining)
        }
    }

    /// Flags are known after the first few bits, tail calls only when the
    /// target has a header flag for them.
    fn clear_flag_groups(&self, remaining: &mut DecodeFlags) {
        remaining.remove(DecodeFlags::RETURN_KIND | DecodeFlags::VARARG);

        if T::Encoding::HAS_TAILCALLS_FLAG {
            remaining.remove(DecodeFlags::HAS_TAILCALLS);
        }
    }

    fn decode_slim_header(&mut self, mut remaining: DecodeFlags) -> bool {
        if self.reader.read_one() {
            self.header_flags = HeaderFlags::HAS_STACK_BASE_REGISTER;
            self.stack_base_register = T::Encoding::denormalize_stack_base_register(0);
        }

        if self.version < GC_INFO_VERSION {
            self.return_kind = ReturnKind::from_bits(
                self.reader
                    .read(T::Encoding::SIZE_OF_RETURN_KIND_IN_SLIM_HEADER),
            );
        }

        self.clear_flag_groups(&mut remaining);

        if remaining.is_empty() {
            return true;
        }

        self.code_length = T::Encoding::denormalize_code_length(
            self.reader
                .decode_var_length_unsigned(T::Encoding::CODE_LENGTH_ENCBASE) as u32,
        );

        // everything else of a slim header has its default value
        remaining.remove(
            DecodeFlags::CODE_LENGTH
                | DecodeFlags::PROLOG_LENGTH
                | DecodeFlags::GS_COOKIE
                | DecodeFlags::PSP_SYM
                | DecodeFlags::GENERICS_INST_CONTEXT
                | DecodeFlags::EDIT_AND_CONTINUE
                | DecodeFlags::REVERSE_PINVOKE_VAR,
        );

        remaining.is_empty()
    }

    fn decode_fat_header(&mut self, mut remaining: DecodeFlags) -> bool {
        self.header_flags = HeaderFlags::from_bits_retain(self.reader.read(GC_INFO_FLAGS_BIT_SIZE) as u32);

        if self.version < GC_INFO_VERSION {
            self.return_kind = ReturnKind::from_bits(
                self.reader
                    .read(T::Encoding::SIZE_OF_RETURN_KIND_IN_FAT_HEADER),
            );
        }

        self.clear_flag_groups(&mut remaining);

        if remaining.is_empty() {
            return true;
        }

        self.code_length = T::Encoding::denormalize_code_length(
            self.reader
                .decode_var_length_unsigned(T::Encoding::CODE_LENGTH_ENCBASE) as u32,
        );
        remaining.remove(DecodeFlags::CODE_LENGTH);

        if remaining.is_empty() {
            return true;
        }

        let has_generics_context =
            self.header_flags.generics_context_kind() != GenericsContextKind::None;

        if self.header_flags.contains(HeaderFlags::HAS_GS_COOKIE) {
            // code offsets and the code length may normalize differently
            let norm_code_length = T::Encoding::normalize_code_offset(self.code_length);

            let norm_prolog_size = self
                .reader
                .decode_var_length_unsigned(T::Encoding::NORM_PROLOG_SIZE_ENCBASE)
                as u32
                + 1;
            let norm_epilog_size = self
                .reader
                .decode_var_length_unsigned(T::Encoding::NORM_EPILOG_SIZE_ENCBASE)
                as u32;

            self.valid_range_start = T::Encoding::denormalize_code_offset(norm_prolog_size);
            self.valid_range_end =
                T::Encoding::denormalize_code_offset(norm_code_length - norm_epilog_size);
            debug_assert!(self.valid_range_start < self.valid_range_end);
        } else if has_generics_context {
            let norm_prolog_size = self
                .reader
                .decode_var_length_unsigned(T::Encoding::NORM_PROLOG_SIZE_ENCBASE)
                as u32
                + 1;

            self.valid_range_start = T::Encoding::denormalize_code_offset(norm_prolog_size);
            self.valid_range_end = self.valid_range_start + 1;
        }

        remaining.remove(DecodeFlags::PROLOG_LENGTH);

        if remaining.is_empty() {
            return true;
        }

        if self.header_flags.contains(HeaderFlags::HAS_GS_COOKIE) {
            self.gs_cookie_stack_slot =
                self.read_stack_slot(T::Encoding::GS_COOKIE_STACK_SLOT_ENCBASE);
        }

        remaining.remove(DecodeFlags::GS_COOKIE);

        if remaining.is_empty() {
            return true;
        }

        if self.version < GC_INFO_VERSION && self.header_flags.contains(HeaderFlags::HAS_PSP_SYM) {
            self.psp_sym_stack_slot =
                self.read_stack_slot(T::Encoding::PSP_SYM_STACK_SLOT_ENCBASE);
        }

        remaining.remove(DecodeFlags::PSP_SYM);

        if remaining.is_empty() {
            return true;
        }

        if has_generics_context {
            self.generics_inst_context_stack_slot =
                self.read_stack_slot(T::Encoding::GENERICS_INST_CONTEXT_STACK_SLOT_ENCBASE);
        }

        remaining.remove(DecodeFlags::GENERICS_INST_CONTEXT);

        if remaining.is_empty() {
            return true;
        }

        if self
            .header_flags
            .contains(HeaderFlags::HAS_STACK_BASE_REGISTER)
        {
            self.stack_base_register = T::Encoding::denormalize_stack_base_register(
                self.reader
                    .decode_var_length_unsigned(T::Encoding::STACK_BASE_REGISTER_ENCBASE)
                    as u32,
            );
        }

        if self
            .header_flags
            .contains(HeaderFlags::HAS_EDIT_AND_CONTINUE_INFO)
        {
            self.size_of_edit_and_continue_preserved_area = self
                .reader
                .decode_var_length_unsigned(
                    T::Encoding::SIZE_OF_EDIT_AND_CONTINUE_PRESERVED_AREA_ENCBASE,
                ) as u32;

            if T::Encoding::HAS_ENC_FIXED_STACK_FRAME {
                self.size_of_edit_and_continue_fixed_stack_frame = self
                    .reader
                    .decode_var_length_unsigned(
                        T::Encoding::SIZE_OF_EDIT_AND_CONTINUE_FIXED_STACK_FRAME_ENCBASE,
                    ) as u32;
            }
        }

        remaining.remove(DecodeFlags::EDIT_AND_CONTINUE);

        if remaining.is_empty() {
            return true;
        }

        if self.header_flags.contains(HeaderFlags::REVERSE_PINVOKE_FRAME) {
            self.reverse_pinvoke_frame_stack_slot =
                self.read_stack_slot(T::Encoding::REVERSE_PINVOKE_FRAME_ENCBASE);
        }

        remaining.remove(DecodeFlags::REVERSE_PINVOKE_VAR);

        if remaining.is_empty() {
            return true;
        }

        if T::Encoding::HAS_FIXED_STACK_PARAMETER_SCRATCH_AREA {
            self.size_of_stack_outgoing_and_scratch_area =
                T::Encoding::denormalize_size_of_stack_area(
                    self.reader
                        .decode_var_length_unsigned(T::Encoding::SIZE_OF_STACK_AREA_ENCBASE)
                        as u32,
                );
        }

        false
    }

    fn read_stack_slot(&mut self, base: u32) -> i32 {
        T::Encoding::denormalize_stack_slot(self.reader.decode_var_length_signed(base) as i32)
    }
}
