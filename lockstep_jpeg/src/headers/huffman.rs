// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
};

pub const HUFFMAN_MAX_BITS: usize = 16;
const LOOKUP_BITS: u32 = 8;

/// Canonical Huffman table as transmitted in a DHT segment.
#[derive(Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    /// Number of codes of each length, from 1 to 16 bits.
    counts: [u8; HUFFMAN_MAX_BITS],
    values: Vec<u8>,
    /// `offsets[l]` is the index into `values` of the first code of length
    /// `l + 1`; `offsets[16]` is the total number of codes.
    offsets: [u16; HUFFMAN_MAX_BITS + 1],
    first_code: [i32; HUFFMAN_MAX_BITS],
    /// Largest code of each length, -1 if there are none.
    max_code: [i32; HUFFMAN_MAX_BITS],
    /// `(length << 8) | value` for codes of at most 8 bits, 0 otherwise.
    lookup: [u16; 1 << LOOKUP_BITS],
}

impl std::fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuffmanTable")
            .field("counts", &self.counts)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl HuffmanTable {
    /// Builds a table from per-length code counts and symbol values.
    /// ```
    /// # use lockstep_jpeg::headers::huffman::HuffmanTable;
    /// let mut counts = [0; 16];
    /// counts[1] = 3;
    /// let table = HuffmanTable::new(counts, vec![1, 2, 3])?;
    /// assert_eq!(table.offsets()[16], 3);
    /// assert!(HuffmanTable::new(counts, vec![1, 2]).is_err());
    /// # Ok::<(), lockstep_jpeg::error::Error>(())
    /// ```
    pub fn new(counts: [u8; HUFFMAN_MAX_BITS], values: Vec<u8>) -> Result<HuffmanTable> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total != values.len() || total > 256 {
            return Err(Error::InvalidHuffmanTable);
        }
        let mut offsets = [0u16; HUFFMAN_MAX_BITS + 1];
        let mut first_code = [0i32; HUFFMAN_MAX_BITS];
        let mut max_code = [-1i32; HUFFMAN_MAX_BITS];
        let mut lookup = [0u16; 1 << LOOKUP_BITS];
        let mut code = 0i32;
        let mut index = 0usize;
        for (l, &count) in counts.iter().enumerate() {
            let len = l as u32 + 1;
            offsets[l] = index as u16;
            first_code[l] = code;
            // The codes of this length must fit in `len` bits.
            if code + count as i32 > 1 << len {
                return Err(Error::InvalidHuffmanTable);
            }
            if count > 0 {
                max_code[l] = code + count as i32 - 1;
            }
            for _ in 0..count {
                if len <= LOOKUP_BITS {
                    let shift = LOOKUP_BITS - len;
                    let base = (code as usize) << shift;
                    for entry in &mut lookup[base..base + (1 << shift)] {
                        *entry = ((len as u16) << 8) | values[index] as u16;
                    }
                }
                code += 1;
                index += 1;
            }
            code <<= 1;
        }
        offsets[HUFFMAN_MAX_BITS] = index as u16;
        Ok(HuffmanTable {
            counts,
            values,
            offsets,
            first_code,
            max_code,
            lookup,
        })
    }

    pub fn counts(&self) -> &[u8; HUFFMAN_MAX_BITS] {
        &self.counts
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn offsets(&self) -> &[u16; HUFFMAN_MAX_BITS + 1] {
        &self.offsets
    }

    /// Decodes one symbol.
    pub fn decode(&self, br: &mut BitReader) -> Result<u8> {
        let (peek, available) = br.peek_byte();
        let entry = self.lookup[peek as usize];
        let len = (entry >> 8) as u32;
        if len != 0 && len <= available {
            br.read_bits(len)?;
            return Ok(entry as u8);
        }
        let start = br.byte_position();
        let mut code = 0i32;
        for l in 0..HUFFMAN_MAX_BITS {
            code = (code << 1) | br.read_bit()? as i32;
            if code <= self.max_code[l] {
                let index = self.offsets[l] as i32 + code - self.first_code[l];
                return Ok(self.values[index as usize]);
            }
        }
        Err(Error::InvalidHuffmanCode(start))
    }
}
