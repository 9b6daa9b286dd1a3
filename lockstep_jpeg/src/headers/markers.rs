// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::{
    context::{Component, DecodeContext, MAX_TABLES, PartitionMode, QuantTable},
    huffman::{HUFFMAN_MAX_BITS, HuffmanTable},
};
use crate::{
    BLOCK_SIZE,
    error::{Error, Result},
    partition::PartitionStrategy,
    util::tracing_wrappers::*,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Marker {
    Tem = 0x01,
    Sof0 = 0xc0,
    Sof1 = 0xc1,
    Sof2 = 0xc2,
    Sof3 = 0xc3,
    Dht = 0xc4,
    Sof5 = 0xc5,
    Sof6 = 0xc6,
    Sof7 = 0xc7,
    Jpg = 0xc8,
    Sof9 = 0xc9,
    Sof10 = 0xca,
    Sof11 = 0xcb,
    Dac = 0xcc,
    Sof13 = 0xcd,
    Sof14 = 0xce,
    Sof15 = 0xcf,
    Rst0 = 0xd0,
    Rst1 = 0xd1,
    Rst2 = 0xd2,
    Rst3 = 0xd3,
    Rst4 = 0xd4,
    Rst5 = 0xd5,
    Rst6 = 0xd6,
    Rst7 = 0xd7,
    Soi = 0xd8,
    Eoi = 0xd9,
    Sos = 0xda,
    Dqt = 0xdb,
    Dnl = 0xdc,
    Dri = 0xdd,
    Dhp = 0xde,
    Exp = 0xdf,
    Com = 0xfe,
}

pub const RST0: u8 = Marker::Rst0 as u8;

pub fn is_restart(code: u8) -> bool {
    (RST0..RST0 + 8).contains(&code)
}

struct Frame {
    width: usize,
    height: usize,
    components: Vec<Component>,
}

struct Scan {
    spectral_start: u8,
    spectral_end: u8,
    approx_high: u8,
    approx_low: u8,
}

#[derive(Default)]
struct Parser {
    quant_tables: [Option<QuantTable>; MAX_TABLES],
    dc_tables: [Option<HuffmanTable>; MAX_TABLES],
    ac_tables: [Option<HuffmanTable>; MAX_TABLES],
    restart_interval: usize,
    frame: Option<Frame>,
}

fn truncated(code: u8, segment: &[u8]) -> Error {
    Error::InvalidSegmentLength(code, segment.len() + 2)
}

impl Parser {
    fn parse_dqt(&mut self, mut segment: &[u8]) -> Result<()> {
        let full_len = segment.len();
        while !segment.is_empty() {
            let precision = segment[0] >> 4;
            let id = segment[0] & 0xf;
            if precision != 0 {
                return Err(Error::UnsupportedQuantPrecision(precision));
            }
            if id as usize >= MAX_TABLES {
                return Err(Error::InvalidTableId(segment[0]));
            }
            let Some(values) = segment.get(1..1 + BLOCK_SIZE) else {
                return Err(Error::InvalidSegmentLength(Marker::Dqt as u8, full_len + 2));
            };
            let table: QuantTable = array_init::array_init(|i| values[i] as u16);
            trace!(id, ?table, "quantization table");
            self.quant_tables[id as usize] = Some(table);
            segment = &segment[1 + BLOCK_SIZE..];
        }
        Ok(())
    }

    fn parse_dht(&mut self, mut segment: &[u8]) -> Result<()> {
        let full_len = segment.len();
        let too_short = || Error::InvalidSegmentLength(Marker::Dht as u8, full_len + 2);
        while !segment.is_empty() {
            let class = segment[0] >> 4;
            let id = (segment[0] & 0xf) as usize;
            if class > 1 || id >= MAX_TABLES {
                return Err(Error::InvalidTableId(segment[0]));
            }
            let counts_bytes = segment.get(1..1 + HUFFMAN_MAX_BITS).ok_or_else(too_short)?;
            let counts: [u8; HUFFMAN_MAX_BITS] = array_init::array_init(|i| counts_bytes[i]);
            let total: usize = counts.iter().map(|&c| c as usize).sum();
            let values_start = 1 + HUFFMAN_MAX_BITS;
            let values = segment
                .get(values_start..values_start + total)
                .ok_or_else(too_short)?
                .to_vec();
            if class == 0 && values.iter().any(|&v| v > 11) {
                return Err(Error::InvalidHuffmanTable);
            }
            let table = HuffmanTable::new(counts, values)?;
            trace!(class, id, ?table, "huffman table");
            if class == 0 {
                self.dc_tables[id] = Some(table);
            } else {
                self.ac_tables[id] = Some(table);
            }
            segment = &segment[values_start + total..];
        }
        Ok(())
    }

    fn parse_dri(&mut self, segment: &[u8]) -> Result<()> {
        if segment.len() != 2 {
            return Err(truncated(Marker::Dri as u8, segment));
        }
        self.restart_interval = BigEndian::read_u16(segment) as usize;
        trace!(restart_interval = self.restart_interval);
        Ok(())
    }

    fn parse_sof(&mut self, code: u8, segment: &[u8]) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::DuplicateFrameHeader);
        }
        if segment.len() < 6 {
            return Err(truncated(code, segment));
        }
        if segment[0] != 8 {
            return Err(Error::UnsupportedSamplePrecision(segment[0]));
        }
        let height = BigEndian::read_u16(&segment[1..]) as usize;
        let width = BigEndian::read_u16(&segment[3..]) as usize;
        if width == 0 || height == 0 {
            return Err(Error::InvalidImageSize(width, height));
        }
        let num_components = segment[5] as usize;
        if num_components != 1 && num_components != 3 {
            return Err(Error::InvalidComponentCount(num_components));
        }
        if segment.len() != 6 + 3 * num_components {
            return Err(truncated(code, segment));
        }
        let mut components = Vec::with_capacity(num_components);
        for (i, entry) in segment[6..].chunks_exact(3).enumerate() {
            let (h, v) = ((entry[1] >> 4) as usize, (entry[1] & 0xf) as usize);
            if !(1..=2).contains(&h) || !(1..=2).contains(&v) {
                return Err(Error::UnsupportedSampling(h as u8, v as u8, i));
            }
            if entry[2] as usize >= MAX_TABLES {
                return Err(Error::InvalidTableId(entry[2]));
            }
            components.push(Component {
                id: entry[0],
                h,
                v,
                quant_table: entry[2] as usize,
                dc_table: 0,
                ac_table: 0,
            });
        }
        if num_components == 1 {
            // A single-component scan is not interleaved: one block per MCU.
            components[0].h = 1;
            components[0].v = 1;
        } else if let Some((i, c)) = components
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, c)| c.h != 1 || c.v != 1)
        {
            return Err(Error::UnsupportedSampling(c.h as u8, c.v as u8, i));
        }
        debug!(width, height, ?components, "frame header");
        self.frame = Some(Frame {
            width,
            height,
            components,
        });
        Ok(())
    }

    fn parse_sos(&mut self, segment: &[u8]) -> Result<Scan> {
        let frame = self.frame.as_mut().ok_or(Error::MissingFrameHeader)?;
        let num_components = *segment.first().ok_or_else(|| truncated(Marker::Sos as u8, segment))? as usize;
        if segment.len() != 4 + 2 * num_components {
            return Err(truncated(Marker::Sos as u8, segment));
        }
        if num_components != frame.components.len() {
            return Err(Error::UnsupportedScan("scan does not cover every component"));
        }
        for (comp, entry) in frame
            .components
            .iter_mut()
            .zip(segment[1..].chunks_exact(2))
        {
            if comp.id != entry[0] {
                return Err(Error::UnsupportedScan("scan components are not in frame order"));
            }
            let (dc, ac) = ((entry[1] >> 4) as usize, (entry[1] & 0xf) as usize);
            if dc >= MAX_TABLES || ac >= MAX_TABLES {
                return Err(Error::InvalidTableId(entry[1]));
            }
            comp.dc_table = dc;
            comp.ac_table = ac;
        }
        let tail = &segment[1 + 2 * num_components..];
        let scan = Scan {
            spectral_start: tail[0],
            spectral_end: tail[1],
            approx_high: tail[2] >> 4,
            approx_low: tail[2] & 0xf,
        };
        if scan.spectral_start != 0
            || scan.spectral_end != 63
            || scan.approx_high != 0
            || scan.approx_low != 0
        {
            return Err(Error::UnsupportedScan("not a sequential baseline scan"));
        }
        Ok(scan)
    }
}

/// Locates the end of the entropy-coded data starting at `start`, returning
/// its offset and the number of restart markers inside it.
pub fn find_entropy_end(data: &[u8], start: usize) -> (usize, usize) {
    let mut restart_markers = 0;
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == 0xff {
            match data[i + 1] {
                0x00 => i += 2,
                0xff => i += 1,
                m if is_restart(m) => {
                    restart_markers += 1;
                    i += 2;
                }
                _ => return (i, restart_markers),
            }
        } else {
            i += 1;
        }
    }
    (data.len(), restart_markers)
}

/// Parses all marker segments up to and including the first scan header.
/// ```
/// # use lockstep_jpeg::{headers::markers::parse, partition::PartitionStrategy};
/// assert!(parse(&[0x89, 0x50], 1, PartitionStrategy::Auto).is_err());
/// ```
pub fn parse(data: &[u8], num_workers: usize, strategy: PartitionStrategy) -> Result<DecodeContext> {
    if data.len() < 2 || data[0] != 0xff || data[1] != Marker::Soi as u8 {
        return Err(Error::InvalidSignature(
            data.first().copied().unwrap_or(0),
            data.get(1).copied().unwrap_or(0),
        ));
    }
    let mut parser = Parser::default();
    let mut pos = 2;
    let scan = loop {
        if pos >= data.len() {
            return Err(Error::NoScan);
        }
        if data[pos] != 0xff {
            return Err(Error::ExpectedMarker(pos));
        }
        while pos < data.len() && data[pos] == 0xff {
            pos += 1;
        }
        let Some(&code) = data.get(pos) else {
            return Err(Error::NoScan);
        };
        pos += 1;
        let marker = Marker::from_u8(code);
        match marker {
            Some(
                Marker::Tem
                | Marker::Rst0
                | Marker::Rst1
                | Marker::Rst2
                | Marker::Rst3
                | Marker::Rst4
                | Marker::Rst5
                | Marker::Rst6
                | Marker::Rst7,
            ) => continue,
            Some(Marker::Soi | Marker::Eoi) => return Err(Error::UnexpectedMarker(code)),
            _ => {}
        }
        if pos + 2 > data.len() {
            return Err(Error::SegmentOutOfBounds(pos));
        }
        let length = BigEndian::read_u16(&data[pos..]) as usize;
        if length < 2 {
            return Err(Error::InvalidSegmentLength(code, length));
        }
        if pos + length > data.len() {
            return Err(Error::SegmentOutOfBounds(pos));
        }
        let segment = &data[pos + 2..pos + length];
        pos += length;
        match marker {
            Some(Marker::Dqt) => parser.parse_dqt(segment)?,
            Some(Marker::Dht) => parser.parse_dht(segment)?,
            Some(Marker::Dri) => parser.parse_dri(segment)?,
            Some(Marker::Sof0 | Marker::Sof1) => parser.parse_sof(code, segment)?,
            Some(Marker::Sos) => break parser.parse_sos(segment)?,
            Some(
                Marker::Sof2
                | Marker::Sof3
                | Marker::Sof5
                | Marker::Sof6
                | Marker::Sof7
                | Marker::Sof13
                | Marker::Sof14
                | Marker::Sof15,
            ) => return Err(Error::UnsupportedFrameType(code)),
            Some(Marker::Sof9 | Marker::Sof10 | Marker::Sof11 | Marker::Dac) => {
                return Err(Error::UnsupportedArithmeticCoding);
            }
            _ => {
                trace!(code, length, "skipping segment");
            }
        }
    };

    let Parser {
        quant_tables,
        dc_tables,
        ac_tables,
        restart_interval,
        frame,
    } = parser;
    let Frame {
        width,
        height,
        components,
    } = frame.ok_or(Error::MissingFrameHeader)?;
    for comp in components.iter() {
        if quant_tables[comp.quant_table].is_none() {
            return Err(Error::UndefinedQuantTable(comp.quant_table));
        }
        if dc_tables[comp.dc_table].is_none() {
            return Err(Error::UndefinedHuffmanTable(comp.dc_table, 0));
        }
        if ac_tables[comp.ac_table].is_none() {
            return Err(Error::UndefinedHuffmanTable(comp.ac_table, 1));
        }
    }
    let max_h = components.iter().map(|c| c.h).max().unwrap_or(1);
    let max_v = components.iter().map(|c| c.v).max().unwrap_or(1);
    let entropy_start = pos;
    let (entropy_end, restart_markers) = find_entropy_end(data, entropy_start);
    let entropy_len = entropy_end - entropy_start;
    let bytes_per_partition = entropy_len.div_ceil(num_workers.max(1)).max(1);
    let mut context = DecodeContext {
        width,
        height,
        components,
        quant_tables,
        dc_tables,
        ac_tables,
        restart_interval,
        spectral_start: scan.spectral_start,
        spectral_end: scan.spectral_end,
        approx_high: scan.approx_high,
        approx_low: scan.approx_low,
        max_h,
        max_v,
        mcus_x: width.div_ceil(8 * max_h),
        mcus_y: height.div_ceil(8 * max_v),
        entropy_start,
        entropy_end,
        restart_markers,
        num_workers,
        bytes_per_partition,
        partition_mode: PartitionMode::ByteScan,
    };
    context.partition_mode = strategy.mode(&context);
    debug!(
        entropy_start,
        entropy_end,
        restart_interval,
        restart_markers,
        partition_mode = ?context.partition_mode,
        "parsed markers"
    );
    Ok(context)
}
