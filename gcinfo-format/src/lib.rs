pub mod bits;
pub mod data;
pub mod encoding;
pub mod error;
pub mod writer;

pub use self::bits::{BitStreamReader, BitStreamWriter, ceil_log2};
pub use self::data::*;
pub use self::encoding::*;
pub use self::error::{EncodeError, FormatError};
pub use self::writer::{GcInfoEncoder, GcSlotState, SlotId};
