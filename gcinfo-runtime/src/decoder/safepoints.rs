use gcinfo_format::{GC_INFO_VERSION, GcInfoEncoding};

use crate::cpu::Target;
use crate::decoder::GcInfoDecoder;

/// Repositioning the reader costs more than a sequential read, short tables
/// are scanned linearly.
pub const MAX_LINEAR_SEARCH: u32 = 32;

impl<'a, T: Target> GcInfoDecoder<'a, T> {
    /// Index of the safe point at `code_offset`, or `num_safe_points` if
    /// there is none. Leaves the reader behind the safe point table.
    pub(super) fn find_safe_point(&mut self, code_offset: u32) -> u32 {
        debug_assert!(self.num_safe_points > 0);

        let start = self.reader.position();
        let num_bits = self.bits_per_code_offset();
        let norm_offset = T::Encoding::normalize_code_offset(code_offset);

        let mut search_start = 0;
        let mut search_end = self.num_safe_points;

        if search_end - search_start > MAX_LINEAR_SEARCH {
            (search_start, search_end) = self.narrow_safe_point_search(start, norm_offset);
        }

        let mut result = self.num_safe_points;

        for index in search_start..search_end {
            let safe_point = self.reader.read(num_bits) as u32;

            if safe_point == norm_offset {
                result = index;
                break;
            }

            if safe_point > norm_offset {
                break;
            }
        }

        let end = start + self.num_safe_points as usize * num_bits as usize;
        self.reader.set_position(end);
        result
    }

    /// Binary search over the packed table until at most
    /// `MAX_LINEAR_SEARCH` candidates are left. Leaves the reader at the
    /// first candidate.
    fn narrow_safe_point_search(&mut self, start: usize, norm_offset: u32) -> (u32, u32) {
        let num_bits = self.bits_per_code_offset() as usize;
        let mut low = 0;
        let mut high = self.num_safe_points;

        while high - low > MAX_LINEAR_SEARCH {
            let mid = (low + high) / 2;
            self.reader.set_position(start + mid as usize * num_bits);
            let safe_point = self.reader.read(num_bits as u32) as u32;

            if norm_offset < safe_point {
                high = mid;
            } else {
                low = mid;
            }
        }

        self.reader.set_position(start + low as usize * num_bits);
        (low, high)
    }

    /// True if a safe point is recorded at `code_offset`. Independent of the
    /// offset the decoder was created for.
    pub fn is_safe_point_at(&mut self, code_offset: u32) -> bool {
        debug_assert!(self.has_counts);

        if self.num_safe_points == 0 {
            return false;
        }

        let Some(code_offset) = self.adjusted_safe_point_offset(code_offset) else {
            return false;
        };

        let saved = self.reader.position();
        self.reader.set_position(self.safe_points_position);
        let index = self.find_safe_point(code_offset);
        self.reader.set_position(saved);

        index != self.num_safe_points
    }

    /// Calls `f` with the code offset of every safe point in ascending order.
    pub fn enumerate_safe_points<F>(&self, mut f: F)
    where
        F: FnMut(u32),
    {
        debug_assert!(self.has_counts);

        let mut reader = self.reader;
        reader.set_position(self.safe_points_position);
        let num_bits = self.bits_per_code_offset();

        for _ in 0..self.num_safe_points {
            let norm_offset = reader.read(num_bits) as u32;
            let mut offset = T::Encoding::denormalize_code_offset(norm_offset);

            if self.version < GC_INFO_VERSION {
                offset += 1;
            }

            f(offset);
        }
    }
}
