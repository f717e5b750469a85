//! Bit strings for the prefix trie.
//!
//! Bits are numbered from the most significant bit of the first byte.
//! [`BitSlice`] is a cheap view with its own start offset, so trimming a
//! prefix never copies; [`BitSlice::pack`] produces an owned [`Bits`] that
//! no longer aliases the source buffer.

use crate::table::key::hex;
use std::fmt;

/// Borrowed run of bits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BitSlice<'a> {
    bytes: &'a [u8],
    start: usize,
    len: usize,
}

impl<'a> BitSlice<'a> {
    /// Views the first `len` bits of `bytes`. `len` is clamped to the
    /// buffer size.
    pub fn new(bytes: &'a [u8], len: usize) -> Self {
        Self {
            bytes,
            start: 0,
            len: len.min(bytes.len() * 8),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns bit `i` of the view.
    pub fn bit(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        let pos = self.start + i;
        self.bytes[pos / 8] & (0x80 >> (pos % 8)) != 0
    }

    /// Drops the first `n` bits.
    pub fn trim_prefix(self, n: usize) -> Self {
        let n = n.min(self.len);
        Self {
            bytes: self.bytes,
            start: self.start + n,
            len: self.len - n,
        }
    }

    /// Keeps only the first `n` bits.
    pub fn truncate(self, n: usize) -> Self {
        Self {
            len: n.min(self.len),
            ..self
        }
    }

    /// Number of leading bits shared with `other`.
    pub fn common_prefix_len(&self, other: BitSlice<'_>) -> usize {
        let max = self.len.min(other.len);
        (0..max)
            .find(|&i| self.bit(i) != other.bit(i))
            .unwrap_or(max)
    }

    pub fn starts_with(&self, prefix: BitSlice<'_>) -> bool {
        prefix.len <= self.len && self.common_prefix_len(prefix) == prefix.len
    }

    /// Copies the view into an owned, byte-aligned buffer.
    pub fn pack(&self) -> Bits {
        let mut bits = Bits::with_capacity(self.len);
        for i in 0..self.len {
            bits.push(self.bit(i));
        }
        bits
    }
}

impl fmt::Debug for BitSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitSlice({})", self.pack())
    }
}

/// Owned bit string. Bits past `len` in the last byte are always zero.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bits {
    bytes: Vec<u8>,
    len: usize,
}

impl Bits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            len: 0,
        }
    }

    /// Takes the first `len` bits of `bytes`.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        BitSlice::new(bytes, len).pack()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_slice(&self) -> BitSlice<'_> {
        BitSlice {
            bytes: &self.bytes,
            start: 0,
            len: self.len,
        }
    }

    pub fn bit(&self, i: usize) -> bool {
        self.as_slice().bit(i)
    }

    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    /// Appends every bit of `tail`.
    pub fn extend(&mut self, tail: BitSlice<'_>) {
        for i in 0..tail.len() {
            self.push(tail.bit(i));
        }
    }

    /// Returns `self` followed by `tail`.
    pub fn concat(&self, tail: BitSlice<'_>) -> Bits {
        let mut out = Bits::with_capacity(self.len + tail.len());
        out.extend(self.as_slice());
        out.extend(tail);
        out
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", hex(&self.bytes), self.len)
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bits({})", self)
    }
}
