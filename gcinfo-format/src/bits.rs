use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

pub const BITS_PER_WORD: usize = 64;

/// Number of bits needed to represent every value in `0..x`.
pub fn ceil_log2(x: u32) -> u32 {
    if x <= 1 { 0 } else { 32 - (x - 1).leading_zeros() }
}

/// Number of bits needed to represent `x` itself.
pub fn bit_width(x: u64) -> u32 {
    64 - x.leading_zeros()
}

/// Sequential reader over a packed bit stream.
///
/// Bit `i` of the stream is bit `i % 64` of the little-endian word `i / 64`.
/// Words at the tail of the buffer are zero-padded, so the reader never looks
/// at memory outside of the blob. Reading past the end is a caller bug and
/// only checked in debug builds.
#[derive(Copy, Clone, Debug)]
pub struct BitStreamReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitStreamReader<'a> {
    pub fn new(data: &'a [u8]) -> BitStreamReader<'a> {
        BitStreamReader { data, position: 0 }
    }

    pub fn bit_len(&self) -> usize {
        self.data.len() * 8
    }

    #[inline(always)]
    fn word(&self, index: usize) -> u64 {
        let start = index * 8;

        if let Some(bytes) = self.data.get(start..start + 8) {
            LittleEndian::read_u64(bytes)
        } else {
            let mut buffer = [0u8; 8];

            if start < self.data.len() {
                let tail = &self.data[start..];
                buffer[..tail.len()].copy_from_slice(tail);
            }

            LittleEndian::read_u64(&buffer)
        }
    }

    #[inline]
    pub fn read(&mut self, num_bits: u32) -> u64 {
        debug_assert!(num_bits <= 64);

        if num_bits == 0 {
            return 0;
        }

        debug_assert!(
            self.position + num_bits as usize <= self.bit_len(),
            "read past the end of the bit stream"
        );

        let index = self.position / BITS_PER_WORD;
        let rel = (self.position % BITS_PER_WORD) as u32;

        let mut result = self.word(index) >> rel;

        if rel + num_bits > 64 {
            result |= self.word(index + 1) << (64 - rel);
        }

        self.position += num_bits as usize;

        if num_bits < 64 {
            result & ((1u64 << num_bits) - 1)
        } else {
            result
        }
    }

    #[inline(always)]
    pub fn read_one(&mut self) -> bool {
        debug_assert!(self.position < self.bit_len());
        let byte = self.data.get(self.position >> 3).copied().unwrap_or(0);
        let bit = (byte >> (self.position & 7)) & 1;
        self.position += 1;
        bit != 0
    }

    pub fn skip(&mut self, num_bits: usize) {
        self.position += num_bits;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn num_bytes_read(&self) -> usize {
        (self.position + 7) / 8
    }

    pub fn decode_var_length_unsigned(&mut self, base: u32) -> u64 {
        debug_assert!(base > 0 && base < 64);

        let num_encodings = 1u64 << base;
        let mut result = 0;
        let mut shift = 0;

        loop {
            debug_assert!(shift + base <= 64);

            let chunk = self.read(base + 1);
            result |= (chunk & (num_encodings - 1)) << shift;

            if chunk & num_encodings == 0 {
                return result;
            }

            shift += base;
        }
    }

    pub fn decode_var_length_signed(&mut self, base: u32) -> i64 {
        debug_assert!(base > 0 && base < 64);

        let num_encodings = 1u64 << base;
        let mut result = 0u64;
        let mut shift = 0;

        loop {
            debug_assert!(shift + base <= 64);

            let chunk = self.read(base + 1);
            result |= (chunk & (num_encodings - 1)) << shift;

            if chunk & num_encodings == 0 {
                // sign-extend from the topmost payload bit of the last chunk
                let sbits = 64 - (shift + base);
                return ((result << sbits) as i64) >> sbits;
            }

            shift += base;
        }
    }
}

/// Appends bits in the layout `BitStreamReader` expects.
#[derive(Clone, Debug, Default)]
pub struct BitStreamWriter {
    words: Vec<u8>,
    current: u64,
    pending: u32,
}

impl BitStreamWriter {
    pub fn new() -> BitStreamWriter {
        BitStreamWriter {
            words: Vec::new(),
            current: 0,
            pending: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.words.len() * 8 + self.pending as usize
    }

    fn flush_word(&mut self) {
        self.words
            .write_u64::<LittleEndian>(self.current)
            .unwrap();
        self.current = 0;
        self.pending = 0;
    }

    pub fn write(&mut self, value: u64, num_bits: u32) {
        debug_assert!(num_bits <= 64);

        if num_bits == 0 {
            return;
        }

        let value = if num_bits < 64 {
            debug_assert!(value < (1u64 << num_bits), "value does not fit");
            value & ((1u64 << num_bits) - 1)
        } else {
            value
        };

        if self.pending + num_bits <= 64 {
            self.current |= value << self.pending;
            self.pending += num_bits;

            if self.pending == 64 {
                self.flush_word();
            }
        } else {
            let first = 64 - self.pending;
            self.current |= value << self.pending;
            self.flush_word();
            self.current = value >> first;
            self.pending = num_bits - first;
        }
    }

    pub fn write_one(&mut self, bit: bool) {
        self.write(bit as u64, 1);
    }

    /// Pads with zero bits up to the next byte boundary of the stream.
    pub fn align_to_byte(&mut self) {
        let padding = (8 - self.position() % 8) % 8;
        self.write(0, padding as u32);
    }

    pub fn encode_var_length_unsigned(&mut self, mut value: u64, base: u32) -> usize {
        debug_assert!(base > 0 && base < 64);

        let num_encodings = 1u64 << base;
        let mut bits_used = 0;

        loop {
            bits_used += base as usize + 1;

            if value < num_encodings {
                self.write(value, base + 1);
                return bits_used;
            }

            let chunk = value & (num_encodings - 1);
            self.write(chunk | num_encodings, base + 1);
            value >>= base;
        }
    }

    pub fn encode_var_length_signed(&mut self, mut value: i64, base: u32) -> usize {
        debug_assert!(base > 0 && base < 64);

        let num_encodings = 1u64 << base;
        let mut bits_used = 0;

        loop {
            bits_used += base as usize + 1;

            let chunk = (value as u64) & (num_encodings - 1);
            let topmost_bit = chunk & (num_encodings >> 1);
            value >>= base;

            if (topmost_bit != 0 && value == -1) || (topmost_bit == 0 && value == 0) {
                // the topmost payload bit already carries the sign
                self.write(chunk, base + 1);
                return bits_used;
            }

            self.write(chunk | num_encodings, base + 1);
        }
    }

    /// Appends all bits written to `other`.
    pub fn append(&mut self, other: &BitStreamWriter) {
        let bytes = other.clone().finish();
        let mut reader = BitStreamReader::new(&bytes);
        let mut remaining = other.position();

        while remaining > 0 {
            let num_bits = remaining.min(BITS_PER_WORD);
            let value = reader.read(num_bits as u32);
            self.write(value, num_bits as u32);
            remaining -= num_bits;
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        let tail_bytes = (self.pending as usize + 7) / 8;
        let current = self.current;

        for idx in 0..tail_bytes {
            self.words.push((current >> (idx * 8)) as u8);
        }

        self.words
    }
}

pub fn var_length_unsigned_size(value: u64, base: u32) -> usize {
    let mut writer = BitStreamWriter::new();
    writer.encode_var_length_unsigned(value, base)
}
