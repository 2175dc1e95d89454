use gcinfo_format::{BitStreamReader, GcInfoEncoding};

use crate::cpu::Target;
use crate::decoder::GcInfoDecoder;

/// Position of a code offset in the concatenation of all interruptible
/// ranges. All values are normalized.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(super) struct PseudoOffset {
    pub offset: Option<u32>,
    pub interruptible_length: u32,
}

impl<'a, T: Target> GcInfoDecoder<'a, T> {
    /// Calls `f` with `[start, stop)` of every interruptible range until it
    /// returns true.
    pub fn enumerate_interruptible_ranges<F>(&self, mut f: F)
    where
        F: FnMut(u32, u32) -> bool,
    {
        let mut reader = self.reader;
        reader.set_position(self.ranges_position());

        let mut last_norm_stop = 0;

        for _ in 0..self.num_interruptible_ranges {
            let (norm_start, norm_stop) = read_range::<T::Encoding>(&mut reader, last_norm_stop);

            let start = T::Encoding::denormalize_code_offset(norm_start);
            let stop = T::Encoding::denormalize_code_offset(norm_stop);

            if f(start, stop) {
                return;
            }

            last_norm_stop = norm_stop;
        }
    }

    pub(super) fn skip_interruptible_ranges(&self, reader: &mut BitStreamReader<'a>) {
        for _ in 0..self.num_interruptible_ranges {
            reader.decode_var_length_unsigned(T::Encoding::INTERRUPTIBLE_RANGE_DELTA1_ENCBASE);
            reader.decode_var_length_unsigned(T::Encoding::INTERRUPTIBLE_RANGE_DELTA2_ENCBASE);
        }
    }

    /// Reads all ranges, leaving the reader behind them.
    pub(super) fn pseudo_offset(
        &self,
        reader: &mut BitStreamReader<'a>,
        code_offset: u32,
    ) -> PseudoOffset {
        let norm_offset = T::Encoding::normalize_code_offset(code_offset);
        let mut result = PseudoOffset {
            offset: None,
            interruptible_length: 0,
        };
        let mut last_norm_stop = 0;

        for _ in 0..self.num_interruptible_ranges {
            let (norm_start, norm_stop) = read_range::<T::Encoding>(reader, last_norm_stop);

            if norm_start <= norm_offset && norm_offset < norm_stop {
                debug_assert!(result.offset.is_none(), "ranges overlap");
                result.offset = Some(result.interruptible_length + norm_offset - norm_start);
            }

            result.interruptible_length += norm_stop - norm_start;
            last_norm_stop = norm_stop;
        }

        result
    }
}

fn read_range<E: GcInfoEncoding>(reader: &mut BitStreamReader<'_>, last_norm_stop: u32) -> (u32, u32) {
    let start_delta =
        reader.decode_var_length_unsigned(E::INTERRUPTIBLE_RANGE_DELTA1_ENCBASE) as u32;
    let stop_delta =
        reader.decode_var_length_unsigned(E::INTERRUPTIBLE_RANGE_DELTA2_ENCBASE) as u32 + 1;

    let norm_start = last_norm_stop + start_delta;
    (norm_start, norm_start + stop_delta)
}
