use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::FormatError;

pub const GC_INFO_VERSION: u32 = 4;
pub const MIN_GC_INFO_VERSION: u32 = 2;

pub const GC_INFO_FLAGS_BIT_SIZE: u32 = 10;

pub const NO_GS_COOKIE: i32 = -1;
pub const NO_PSP_SYM: i32 = -1;
pub const NO_GENERICS_INST_CONTEXT: i32 = -1;
pub const NO_REVERSE_PINVOKE_FRAME: i32 = -1;
pub const NO_STACK_BASE_REGISTER: u32 = 0xFFFF_FFFF;
pub const NO_SIZE_OF_EDIT_AND_CONTINUE_PRESERVED_AREA: u32 = 0xFFFF_FFFF;

/// A GC info blob together with the format version it was written in.
#[derive(Copy, Clone, Debug)]
pub struct GcInfoToken<'a> {
    pub data: &'a [u8],
    pub version: u32,
}

impl<'a> GcInfoToken<'a> {
    pub fn new(data: &'a [u8]) -> GcInfoToken<'a> {
        GcInfoToken {
            data,
            version: GC_INFO_VERSION,
        }
    }

    pub fn try_new(data: &'a [u8], version: u32) -> Result<GcInfoToken<'a>, FormatError> {
        if !is_supported_version(version) {
            return Err(FormatError::UnsupportedVersion(version));
        }

        if data.is_empty() {
            return Err(FormatError::EmptyGcInfo);
        }

        Ok(GcInfoToken { data, version })
    }
}

pub fn is_supported_version(version: u32) -> bool {
    (MIN_GC_INFO_VERSION..=GC_INFO_VERSION).contains(&version)
}

bitflags::bitflags! {
    /// Flags stored in the fat header.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct HeaderFlags: u32 {
        const IS_VARARG = 0x1;
        const HAS_GS_COOKIE = 0x4;
        const HAS_PSP_SYM = 0x8;
        const HAS_GENERICS_INST_CONTEXT_MASK = 0x30;
        const HAS_GENERICS_INST_CONTEXT_MT = 0x10;
        const HAS_GENERICS_INST_CONTEXT_MD = 0x20;
        const HAS_GENERICS_INST_CONTEXT_THIS = 0x30;
        const HAS_STACK_BASE_REGISTER = 0x40;
        /// Targets with a tail call flag store it in the same bit.
        const WANTS_REPORT_ONLY_LEAF = 0x80;
        const HAS_TAILCALLS = 0x80;
        const HAS_EDIT_AND_CONTINUE_INFO = 0x100;
        const REVERSE_PINVOKE_FRAME = 0x200;
    }
}

impl HeaderFlags {
    pub fn generics_context_kind(self) -> GenericsContextKind {
        let bits = (self & Self::HAS_GENERICS_INST_CONTEXT_MASK).bits() >> 4;
        GenericsContextKind::try_from(bits as u8).unwrap_or(GenericsContextKind::None)
    }
}

/// Where the generics instantiation context of a shared generic method lives.
#[derive(Copy, Clone, PartialEq, Eq, Debug, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum GenericsContextKind {
    None = 0,
    MethodTable = 1,
    MethodDesc = 2,
    This = 3,
}

impl GenericsContextKind {
    pub fn header_flags(self) -> HeaderFlags {
        let value: u8 = self.into();
        HeaderFlags::from_bits_retain((value as u32) << 4)
    }
}

bitflags::bitflags! {
    /// Flags attached to every slot in the slot table.
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
    pub struct GcSlotFlags: u8 {
        const BASE = 0x0;
        const INTERIOR = 0x1;
        const PINNED = 0x2;
        /// Only used while encoding: the slot goes to the untracked group.
        const UNTRACKED = 0x4;
    }
}

impl GcSlotFlags {
    pub const ENCODED_BITS: u32 = 2;

    /// The part of the flags that is stored in the table.
    pub fn encoded(self) -> GcSlotFlags {
        self & (GcSlotFlags::INTERIOR | GcSlotFlags::PINNED)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum GcStackSlotBase {
    CallerSpRel = 0,
    SpRel = 1,
    FrameRegRel = 2,
}

impl GcStackSlotBase {
    pub const ENCODED_BITS: u32 = 2;
}

impl fmt::Display for GcStackSlotBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GcStackSlotBase::CallerSpRel => "caller-sp",
            GcStackSlotBase::SpRel => "sp",
            GcStackSlotBase::FrameRegRel => "frame",
        };

        write!(f, "{}", name)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum GcSlot {
    Register(u32),
    Stack { offset: i32, base: GcStackSlotBase },
}

impl GcSlot {
    pub fn is_register(&self) -> bool {
        matches!(self, GcSlot::Register(_))
    }
}

impl fmt::Display for GcSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcSlot::Register(reg) => write!(f, "r{}", reg),
            GcSlot::Stack { offset, base } => {
                if *offset < 0 {
                    write!(f, "[{}-{:#x}]", base, -(*offset as i64))
                } else {
                    write!(f, "[{}+{:#x}]", base, offset)
                }
            }
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct GcSlotDesc {
    pub slot: GcSlot,
    pub flags: GcSlotFlags,
}

impl GcSlotDesc {
    pub fn register(reg: u32, flags: GcSlotFlags) -> GcSlotDesc {
        GcSlotDesc {
            slot: GcSlot::Register(reg),
            flags,
        }
    }

    pub fn stack(offset: i32, base: GcStackSlotBase, flags: GcSlotFlags) -> GcSlotDesc {
        GcSlotDesc {
            slot: GcSlot::Stack { offset, base },
            flags,
        }
    }
}

/// Kind of value a method returns, as far as the GC is concerned.
#[derive(Copy, Clone, PartialEq, Eq, Debug, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ReturnKind {
    Scalar = 0,
    Object = 1,
    ByRef = 2,
    Unset = 3,
    ScalarObj = 4,
    ObjObj = 5,
    ByRefObj = 6,
    ScalarByRef = 8,
    ObjByRef = 9,
    ByRefByRef = 10,
    Illegal = 0xFF,
}

impl ReturnKind {
    pub fn from_bits(bits: u64) -> ReturnKind {
        u8::try_from(bits)
            .ok()
            .and_then(|value| ReturnKind::try_from(value).ok())
            .unwrap_or(ReturnKind::Illegal)
    }

    pub fn bits(self) -> u64 {
        let value: u8 = self.into();
        value as u64
    }
}
