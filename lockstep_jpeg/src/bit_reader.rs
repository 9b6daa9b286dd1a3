// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use crate::error::{Error, Result};

/// What follows the current read position of a [`BitReader`] at an MCU
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// More entropy-coded data.
    Data,
    /// A marker, after any 1-bit padding and fill bytes. Inside an
    /// entropy-coded segment this is always a restart marker.
    Marker(u8),
    /// The end of the entropy-coded data.
    End,
}

/// Reads entropy-coded bits MSB-first, removing `FF 00` byte stuffing.
///
/// Positions are canonical: two readers that consumed the same bits of the
/// same buffer report the same [`BitReader::position`], regardless of where
/// they started.
#[derive(Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    end: usize,
    pos: usize,
    bit: u32,
}

impl Debug for BitReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BitReader{{ data: [{} bytes], end: {}, pos: {}, bit: {} }}",
            self.data.len(),
            self.end,
            self.pos,
            self.bit
        )
    }
}

impl<'a> BitReader<'a> {
    /// Constructs a BitReader over `data[start..end]`. Bytes past `end` are
    /// only inspected to classify markers.
    /// ```
    /// # use lockstep_jpeg::bit_reader::BitReader;
    /// let data = [0b1010_0000, 0xff, 0x00, 0xff, 0xd9];
    /// let mut br = BitReader::new(&data, 0, 3);
    /// assert_eq!(br.read_bits(3)?, 0b101);
    /// br.read_bits(5)?;
    /// assert_eq!(br.read_bits(8)?, 0xff);
    /// assert_eq!(br.byte_position(), 3);
    /// assert!(br.read_bit().is_err());
    /// # Ok::<(), lockstep_jpeg::error::Error>(())
    /// ```
    pub fn new(data: &'a [u8], start: usize, end: usize) -> BitReader<'a> {
        let end = end.min(data.len());
        BitReader {
            data,
            end,
            pos: start.min(end),
            bit: 0,
        }
    }

    /// Constructs a BitReader positioned `bit` bits into the byte at `start`.
    pub fn at_bit(data: &'a [u8], start: usize, bit: u32, end: usize) -> BitReader<'a> {
        debug_assert!(bit < 8);
        let mut br = Self::new(data, start, end);
        br.bit = bit;
        br
    }

    fn is_marker_at(&self, pos: usize) -> bool {
        self.data[pos] == 0xff && self.data.get(pos + 1).is_none_or(|&b| b != 0)
    }

    pub fn read_bit(&mut self) -> Result<u32> {
        if self.pos >= self.end || self.is_marker_at(self.pos) {
            return Err(Error::UnexpectedEndOfSegment(self.pos));
        }
        let byte = self.data[self.pos];
        let ret = (byte >> (7 - self.bit)) as u32 & 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.pos += if byte == 0xff { 2 } else { 1 };
        }
        Ok(ret)
    }

    /// Reads `num` bits, at most 16.
    pub fn read_bits(&mut self, num: u32) -> Result<u32> {
        debug_assert!(num <= 16);
        let mut ret = 0;
        for _ in 0..num {
            ret = (ret << 1) | self.read_bit()?;
        }
        Ok(ret)
    }

    /// Returns up to 8 bits without consuming them, padded with zeros, and
    /// the number of bits actually available.
    pub fn peek_byte(&self) -> (u32, u32) {
        let mut tmp = self.clone();
        let mut ret = 0;
        let mut available = 0;
        while available < 8 {
            let Ok(bit) = tmp.read_bit() else { break };
            ret = (ret << 1) | bit;
            available += 1;
        }
        (ret << (8 - available), available)
    }

    /// Reads a `size`-bit magnitude and sign-extends it.
    pub fn receive_extend(&mut self, size: u32) -> Result<i32> {
        if size == 0 {
            return Ok(0);
        }
        let bits = self.read_bits(size)? as i32;
        if bits < 1 << (size - 1) {
            Ok(bits - (1 << size) + 1)
        } else {
            Ok(bits)
        }
    }

    /// Canonical bit position of the next bit to be read.
    pub fn position(&self) -> u64 {
        self.pos as u64 * 8 + self.bit as u64
    }

    pub fn byte_position(&self) -> usize {
        self.pos
    }

    /// Classifies what follows the read position, and returns the byte offset
    /// just past it for markers.
    fn classify(&self) -> (Boundary, usize) {
        let mut p = self.pos;
        if self.bit != 0 {
            if p >= self.end {
                return (Boundary::End, p);
            }
            let byte = self.data[p];
            let pad_mask = (1u8 << (8 - self.bit)) - 1;
            if byte & pad_mask != pad_mask {
                return (Boundary::Data, p);
            }
            p += if byte == 0xff { 2 } else { 1 };
        }
        while p + 1 < self.end && self.data[p] == 0xff && self.data[p + 1] == 0xff {
            p += 1;
        }
        if p >= self.end {
            return (Boundary::End, p);
        }
        if self.is_marker_at(p) {
            return match self.data.get(p + 1) {
                Some(&m) => (Boundary::Marker(m), p + 2),
                None => (Boundary::End, p),
            };
        }
        if self.bit != 0 {
            // Trailing ones were part of the data.
            return (Boundary::Data, self.pos);
        }
        (Boundary::Data, p)
    }

    pub fn boundary(&self) -> Boundary {
        self.classify().0
    }

    /// Skips padding and consumes the marker that follows the read
    /// position, returning its code.
    pub fn consume_marker(&mut self) -> Option<u8> {
        match self.classify() {
            (Boundary::Marker(m), next) => {
                self.pos = next;
                self.bit = 0;
                Some(m)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn unstuffs_ff00() {
        let data = [0xff, 0x00, 0x80, 0xff, 0xd9];
        let mut br = BitReader::new(&data, 0, 3);
        assert_eq!(br.read_bits(8).unwrap(), 0xff);
        assert_eq!(br.byte_position(), 2);
        assert_eq!(br.read_bit().unwrap(), 1);
        assert_eq!(br.position(), 17);
    }

    #[test]
    fn stops_at_marker() {
        let data = [0x12, 0xff, 0xd0, 0x34];
        let mut br = BitReader::new(&data, 0, 4);
        br.read_bits(8).unwrap();
        assert_eq!(
            br.read_bit().unwrap_err(),
            Error::UnexpectedEndOfSegment(1)
        );
        assert_eq!(br.boundary(), Boundary::Marker(0xd0));
        assert_eq!(br.consume_marker(), Some(0xd0));
        assert_eq!(br.read_bits(8).unwrap(), 0x34);
        assert_eq!(br.boundary(), Boundary::End);
    }

    #[test]
    fn padding_before_marker() {
        let data = [0b1011_1111, 0xff, 0xff, 0xd3, 0x00];
        let mut br = BitReader::new(&data, 0, 5);
        assert_eq!(br.read_bits(3).unwrap(), 0b101);
        assert_eq!(br.boundary(), Boundary::Marker(0xd3));
        assert_eq!(br.consume_marker(), Some(0xd3));
        assert_eq!(br.byte_position(), 4);
    }

    #[test]
    fn ones_followed_by_data_are_data() {
        let data = [0b1011_1111, 0x42];
        let mut br = BitReader::new(&data, 0, 2);
        br.read_bits(3).unwrap();
        assert_eq!(br.boundary(), Boundary::Data);
        assert_eq!(br.consume_marker(), None);
        assert_eq!(br.read_bits(5).unwrap(), 0b11111);
    }

    #[test]
    fn non_padding_bits_are_data() {
        let data = [0b1010_0000, 0xff, 0xd9];
        let mut br = BitReader::new(&data, 0, 1);
        br.read_bits(3).unwrap();
        assert_eq!(br.boundary(), Boundary::Data);
    }

    #[test]
    fn receive_extend() {
        let data = [0b0101_1000];
        let mut br = BitReader::new(&data, 0, 1);
        // 0b01 in 2 bits is -2, 0b011 in 3 bits is -4.
        assert_eq!(br.receive_extend(2).unwrap(), -2);
        assert_eq!(br.receive_extend(3).unwrap(), -4);
        assert_eq!(br.receive_extend(0).unwrap(), 0);
    }

    #[test]
    fn peek_byte_near_end() {
        let data = [0b1100_0000, 0xff, 0xd9];
        let mut br = BitReader::new(&data, 0, 1);
        br.read_bits(4).unwrap();
        assert_eq!(br.peek_byte(), (0, 4));
        let br = BitReader::at_bit(&data, 0, 1, 1);
        assert_eq!(br.peek_byte(), (0b1000_0000, 7));
    }

    #[test]
    fn canonical_positions() {
        let data = [0xab, 0xff, 0x00, 0xcd];
        let mut a = BitReader::new(&data, 0, 4);
        a.read_bits(16).unwrap();
        let b = BitReader::new(&data, 3, 4);
        assert_eq!(a.position(), b.position());
    }
}
