use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("unsupported gc info version {0}")]
    UnsupportedVersion(u32),
    #[error("gc info blob is empty")]
    EmptyGcInfo,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unsupported gc info version {0}")]
    UnsupportedVersion(u32),
    #[error("code length was never set")]
    MissingCodeLength,
    #[error("code offset {offset} outside of method of length {code_length}")]
    CodeOffsetOutOfRange { offset: u32, code_length: u32 },
    #[error("code offset {0} is not aligned to the instruction size")]
    MisalignedCodeOffset(u32),
    #[error("stack offset {0} is not aligned to the slot size")]
    MisalignedStackOffset(i32),
    #[error("stack area size {0} is not aligned to the slot size")]
    MisalignedStackAreaSize(u32),
    #[error("interruptible range at {0} is empty")]
    EmptyInterruptibleRange(u32),
    #[error("interruptible range at {start} overlaps the range ending at {previous_end}")]
    OverlappingInterruptibleRanges { start: u32, previous_end: u32 },
    #[error("invalid GS cookie valid range {start}..{end}")]
    InvalidGsCookieRange { start: u32, end: u32 },
    #[error("generics context needs a prolog size")]
    MissingPrologSize,
    #[error("slot {0} registered twice")]
    DuplicateSlot(u32),
    #[error("register r{0} cannot be untracked")]
    UntrackedRegister(u32),
    #[error("unknown slot id {0}")]
    UnknownSlot(u32),
    #[error("untracked slot {0} cannot have lifetime transitions")]
    UntrackedLifetime(u32),
}
