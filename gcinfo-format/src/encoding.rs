/// Per-target parameters of the GC info format.
///
/// The defaults are the x64 values. Other targets override the bases and
/// normalization rules that differ. Every `*_ENCBASE` is the payload width of
/// a variable-length field, see `BitStreamReader::decode_var_length_unsigned`.
pub trait GcInfoEncoding: 'static {
    const NAME: &'static str;

    const NUM_NORM_CODE_OFFSETS_PER_CHUNK: u32 = 64;
    const NUM_NORM_CODE_OFFSETS_PER_CHUNK_LOG2: u32 = 6;

    /// Header flag 0x80 means "has tail calls" instead of "wants report only leaf".
    const HAS_TAILCALLS_FLAG: bool = false;
    /// Header flag 0x80 means "wants report only leaf" in pre-v4 headers.
    const HAS_REPORT_ONLY_LEAF_FLAG: bool = false;
    /// EnC info additionally carries the size of the fixed stack frame.
    const HAS_ENC_FIXED_STACK_FRAME: bool = false;
    /// Stack slots in the outgoing argument/scratch area are reported separately.
    const HAS_FIXED_STACK_PARAMETER_SCRATCH_AREA: bool = true;

    const PSP_SYM_STACK_SLOT_ENCBASE: u32 = 6;
    const GENERICS_INST_CONTEXT_STACK_SLOT_ENCBASE: u32 = 6;
    const GS_COOKIE_STACK_SLOT_ENCBASE: u32 = 6;
    const CODE_LENGTH_ENCBASE: u32 = 8;
    const SIZE_OF_RETURN_KIND_IN_SLIM_HEADER: u32 = 2;
    const SIZE_OF_RETURN_KIND_IN_FAT_HEADER: u32 = 4;
    const STACK_BASE_REGISTER_ENCBASE: u32 = 3;
    const SIZE_OF_STACK_AREA_ENCBASE: u32 = 3;
    const SIZE_OF_EDIT_AND_CONTINUE_PRESERVED_AREA_ENCBASE: u32 = 4;
    const SIZE_OF_EDIT_AND_CONTINUE_FIXED_STACK_FRAME_ENCBASE: u32 = 4;
    const REVERSE_PINVOKE_FRAME_ENCBASE: u32 = 6;
    const NUM_REGISTERS_ENCBASE: u32 = 2;
    const NUM_STACK_SLOTS_ENCBASE: u32 = 2;
    const NUM_UNTRACKED_SLOTS_ENCBASE: u32 = 1;
    const NORM_PROLOG_SIZE_ENCBASE: u32 = 5;
    const NORM_EPILOG_SIZE_ENCBASE: u32 = 3;
    const NORM_CODE_OFFSET_DELTA_ENCBASE: u32 = 3;
    const INTERRUPTIBLE_RANGE_DELTA1_ENCBASE: u32 = 6;
    const INTERRUPTIBLE_RANGE_DELTA2_ENCBASE: u32 = 6;
    const REGISTER_ENCBASE: u32 = 3;
    const REGISTER_DELTA_ENCBASE: u32 = 2;
    const STACK_SLOT_ENCBASE: u32 = 6;
    const STACK_SLOT_DELTA_ENCBASE: u32 = 4;
    const NUM_SAFE_POINTS_ENCBASE: u32 = 2;
    const NUM_INTERRUPTIBLE_RANGES_ENCBASE: u32 = 1;
    const POINTER_SIZE_ENCBASE: u32 = 3;
    const LIVESTATE_RLE_RUN_ENCBASE: u32 = 2;
    const LIVESTATE_RLE_SKIP_ENCBASE: u32 = 4;

    fn normalize_stack_slot(offset: i32) -> i32 {
        offset >> 3
    }

    fn denormalize_stack_slot(offset: i32) -> i32 {
        offset << 3
    }

    fn normalize_code_length(length: u32) -> u32 {
        length
    }

    fn denormalize_code_length(length: u32) -> u32 {
        length
    }

    fn normalize_code_offset(offset: u32) -> u32 {
        offset
    }

    fn denormalize_code_offset(offset: u32) -> u32 {
        offset
    }

    fn normalize_stack_base_register(reg: u32) -> u32;
    fn denormalize_stack_base_register(reg: u32) -> u32;

    fn normalize_size_of_stack_area(size: u32) -> u32 {
        size >> 3
    }

    fn denormalize_size_of_stack_area(size: u32) -> u32 {
        size << 3
    }
}

pub struct Amd64Encoding;

impl GcInfoEncoding for Amd64Encoding {
    const NAME: &'static str = "x64";
    const HAS_REPORT_ONLY_LEAF_FLAG: bool = true;

    fn normalize_stack_base_register(reg: u32) -> u32 {
        reg ^ 5
    }

    fn denormalize_stack_base_register(reg: u32) -> u32 {
        reg ^ 5
    }
}

pub struct ArmEncoding;

impl GcInfoEncoding for ArmEncoding {
    const NAME: &'static str = "arm";
    const HAS_TAILCALLS_FLAG: bool = true;

    const PSP_SYM_STACK_SLOT_ENCBASE: u32 = 5;
    const GENERICS_INST_CONTEXT_STACK_SLOT_ENCBASE: u32 = 5;
    const GS_COOKIE_STACK_SLOT_ENCBASE: u32 = 5;
    const CODE_LENGTH_ENCBASE: u32 = 7;
    const STACK_BASE_REGISTER_ENCBASE: u32 = 1;
    const SIZE_OF_STACK_AREA_ENCBASE: u32 = 3;
    const SIZE_OF_EDIT_AND_CONTINUE_PRESERVED_AREA_ENCBASE: u32 = 3;
    const REVERSE_PINVOKE_FRAME_ENCBASE: u32 = 5;
    const NUM_REGISTERS_ENCBASE: u32 = 2;
    const NUM_STACK_SLOTS_ENCBASE: u32 = 3;
    const NUM_UNTRACKED_SLOTS_ENCBASE: u32 = 3;
    const INTERRUPTIBLE_RANGE_DELTA1_ENCBASE: u32 = 4;
    const REGISTER_ENCBASE: u32 = 2;
    const REGISTER_DELTA_ENCBASE: u32 = 1;
    const NUM_SAFE_POINTS_ENCBASE: u32 = 3;
    const NUM_INTERRUPTIBLE_RANGES_ENCBASE: u32 = 2;
    const POINTER_SIZE_ENCBASE: u32 = 6;

    fn normalize_stack_slot(offset: i32) -> i32 {
        offset >> 2
    }

    fn denormalize_stack_slot(offset: i32) -> i32 {
        offset << 2
    }

    fn normalize_code_length(length: u32) -> u32 {
        length >> 1
    }

    fn denormalize_code_length(length: u32) -> u32 {
        length << 1
    }

    fn normalize_code_offset(offset: u32) -> u32 {
        offset >> 1
    }

    fn denormalize_code_offset(offset: u32) -> u32 {
        offset << 1
    }

    fn normalize_stack_base_register(reg: u32) -> u32 {
        reg.wrapping_sub(4) & 7
    }

    fn denormalize_stack_base_register(reg: u32) -> u32 {
        (reg & 7) + 4
    }

    fn normalize_size_of_stack_area(size: u32) -> u32 {
        size >> 2
    }

    fn denormalize_size_of_stack_area(size: u32) -> u32 {
        size << 2
    }
}

pub struct Arm64Encoding;

impl GcInfoEncoding for Arm64Encoding {
    const NAME: &'static str = "arm64";
    const HAS_TAILCALLS_FLAG: bool = true;
    const HAS_ENC_FIXED_STACK_FRAME: bool = true;

    const STACK_BASE_REGISTER_ENCBASE: u32 = 2;
    const NUM_REGISTERS_ENCBASE: u32 = 3;
    const NUM_SAFE_POINTS_ENCBASE: u32 = 3;

    fn normalize_code_length(length: u32) -> u32 {
        length >> 2
    }

    fn denormalize_code_length(length: u32) -> u32 {
        length << 2
    }

    fn normalize_code_offset(offset: u32) -> u32 {
        offset >> 2
    }

    fn denormalize_code_offset(offset: u32) -> u32 {
        offset << 2
    }

    fn normalize_stack_base_register(reg: u32) -> u32 {
        reg ^ 29
    }

    fn denormalize_stack_base_register(reg: u32) -> u32 {
        reg ^ 29
    }
}

pub struct LoongArch64Encoding;

impl GcInfoEncoding for LoongArch64Encoding {
    const NAME: &'static str = "loongarch64";
    const HAS_TAILCALLS_FLAG: bool = true;

    const STACK_BASE_REGISTER_ENCBASE: u32 = 2;
    const NUM_REGISTERS_ENCBASE: u32 = 3;
    const NUM_SAFE_POINTS_ENCBASE: u32 = 3;

    fn normalize_code_length(length: u32) -> u32 {
        length >> 2
    }

    fn denormalize_code_length(length: u32) -> u32 {
        length << 2
    }

    fn normalize_code_offset(offset: u32) -> u32 {
        offset >> 2
    }

    fn denormalize_code_offset(offset: u32) -> u32 {
        offset << 2
    }

    fn normalize_stack_base_register(reg: u32) -> u32 {
        reg ^ 22
    }

    fn denormalize_stack_base_register(reg: u32) -> u32 {
        reg ^ 22
    }
}

pub struct RiscV64Encoding;

impl GcInfoEncoding for RiscV64Encoding {
    const NAME: &'static str = "riscv64";
    const HAS_TAILCALLS_FLAG: bool = true;

    const STACK_BASE_REGISTER_ENCBASE: u32 = 2;
    const NUM_REGISTERS_ENCBASE: u32 = 3;
    const NUM_SAFE_POINTS_ENCBASE: u32 = 3;

    fn normalize_code_length(length: u32) -> u32 {
        length >> 2
    }

    fn denormalize_code_length(length: u32) -> u32 {
        length << 2
    }

    fn normalize_code_offset(offset: u32) -> u32 {
        offset >> 2
    }

    fn denormalize_code_offset(offset: u32) -> u32 {
        offset << 2
    }

    fn normalize_stack_base_register(reg: u32) -> u32 {
        reg ^ 8
    }

    fn denormalize_stack_base_register(reg: u32) -> u32 {
        reg ^ 8
    }
}

/// Bytecode interpreter frames: byte-granular code offsets, no scratch area.
pub struct InterpreterEncoding;

impl GcInfoEncoding for InterpreterEncoding {
    const NAME: &'static str = "interpreter";
    const HAS_FIXED_STACK_PARAMETER_SCRATCH_AREA: bool = false;

    fn normalize_stack_base_register(reg: u32) -> u32 {
        reg
    }

    fn denormalize_stack_base_register(reg: u32) -> u32 {
        reg
    }
}

#[cfg(target_arch = "x86_64")]
pub type TargetEncoding = Amd64Encoding;

#[cfg(target_arch = "arm")]
pub type TargetEncoding = ArmEncoding;

#[cfg(target_arch = "aarch64")]
pub type TargetEncoding = Arm64Encoding;

#[cfg(target_arch = "loongarch64")]
pub type TargetEncoding = LoongArch64Encoding;

#[cfg(target_arch = "riscv64")]
pub type TargetEncoding = RiscV64Encoding;

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "arm",
    target_arch = "aarch64",
    target_arch = "loongarch64",
    target_arch = "riscv64"
)))]
pub type TargetEncoding = InterpreterEncoding;
