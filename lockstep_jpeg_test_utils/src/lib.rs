// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Test helpers: a small baseline JPEG encoder and image generators.

use std::f32::consts::PI;

use byteorder::{BigEndian, WriteBytesExt};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

/// Natural (row-major) index of the coefficient at each zig-zag position.
pub const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

// Annex K tables, natural order.
const LUMA_QUANT: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69,
    56, 14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104,
    113, 92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

const CHROMA_QUANT: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99,
    99, 47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
];

const DC_LUMA_COUNTS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const DC_CHROMA_COUNTS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const DC_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const AC_LUMA_COUNTS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];
const AC_LUMA_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

const AC_CHROMA_COUNTS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
const AC_CHROMA_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Chroma subsampling of color images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sampling {
    #[default]
    S444,
    S422,
    S420,
}

impl Sampling {
    fn luma_factors(self) -> (u8, u8) {
        match self {
            Sampling::S444 => (1, 1),
            Sampling::S422 => (2, 1),
            Sampling::S420 => (2, 2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderOptions {
    /// libjpeg-style quality, 1 to 100.
    pub quality: u8,
    pub sampling: Sampling,
    /// MCUs per restart interval; 0 disables restart markers.
    pub restart_interval: u16,
    pub comment: Option<String>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            quality: 75,
            sampling: Sampling::S444,
            restart_interval: 0,
            comment: None,
        }
    }
}

/// Scales a base table the way libjpeg does and returns it in zig-zag order.
pub fn quant_table(base: &[u16; 64], quality: u8) -> [u16; 64] {
    let quality = quality.clamp(1, 100) as u32;
    let scale = if quality < 50 {
        5000 / quality
    } else {
        200 - 2 * quality
    };
    std::array::from_fn(|k| ((base[ZIGZAG[k]] as u32 * scale + 50) / 100).clamp(1, 255) as u16)
}

struct HuffmanCodes {
    counts: &'static [u8; 16],
    values: &'static [u8],
    codes: [(u16, u8); 256],
}

impl HuffmanCodes {
    fn new(counts: &'static [u8; 16], values: &'static [u8]) -> Self {
        let mut codes = [(0, 0); 256];
        let mut code = 0u16;
        let mut k = 0;
        for (i, &count) in counts.iter().enumerate() {
            for _ in 0..count {
                codes[values[k] as usize] = (code, i as u8 + 1);
                code += 1;
                k += 1;
            }
            code <<= 1;
        }
        Self {
            counts,
            values,
            codes,
        }
    }
}

#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    acc: u8,
    nbits: u8,
}

impl BitWriter {
    fn write(&mut self, bits: u32, len: u8) {
        for i in (0..len).rev() {
            self.acc = (self.acc << 1) | ((bits >> i) & 1) as u8;
            self.nbits += 1;
            if self.nbits == 8 {
                self.push_byte();
            }
        }
    }

    fn push_byte(&mut self) {
        self.out.push(self.acc);
        if self.acc == 0xff {
            self.out.push(0);
        }
        self.acc = 0;
        self.nbits = 0;
    }

    /// Pads the last byte with one bits.
    fn flush(&mut self) {
        if self.nbits > 0 {
            let pad = 8 - self.nbits;
            self.write((1 << pad) - 1, pad);
        }
    }

    fn marker(&mut self, code: u8) {
        self.flush();
        self.out.extend([0xff, code]);
    }
}

struct ComponentSpec {
    id: u8,
    h: u8,
    v: u8,
    table: usize,
}

/// Everything needed to write the headers of a frame.
struct FrameLayout {
    width: usize,
    height: usize,
    components: Vec<ComponentSpec>,
    /// Zig-zag order.
    quant: Vec<[u16; 64]>,
    restart_interval: u16,
    comment: Option<String>,
}

impl FrameLayout {
    fn max_factors(&self) -> (usize, usize) {
        let h = self.components.iter().map(|c| c.h).max().unwrap_or(1);
        let v = self.components.iter().map(|c| c.v).max().unwrap_or(1);
        (h as usize, v as usize)
    }

    fn mcus(&self) -> (usize, usize) {
        let (h, v) = self.max_factors();
        (self.width.div_ceil(8 * h), self.height.div_ceil(8 * v))
    }
}

fn segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.extend([0xff, marker]);
    out.write_u16::<BigEndian>(payload.len() as u16 + 2)
        .expect("writing to a Vec");
    out.extend_from_slice(payload);
}

fn write_headers(out: &mut Vec<u8>, layout: &FrameLayout, tables: &[[&HuffmanCodes; 2]]) {
    out.extend([0xff, 0xd8]);
    segment(out, 0xe0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
    if let Some(comment) = &layout.comment {
        segment(out, 0xfe, comment.as_bytes());
    }
    let mut dqt = Vec::new();
    for (i, table) in layout.quant.iter().enumerate() {
        dqt.push(i as u8);
        dqt.extend(table.iter().map(|&q| q as u8));
    }
    segment(out, 0xdb, &dqt);

    let mut sof = vec![8];
    sof.write_u16::<BigEndian>(layout.height as u16)
        .expect("writing to a Vec");
    sof.write_u16::<BigEndian>(layout.width as u16)
        .expect("writing to a Vec");
    sof.push(layout.components.len() as u8);
    for c in &layout.components {
        sof.extend([c.id, (c.h << 4) | c.v, c.table as u8]);
    }
    segment(out, 0xc0, &sof);

    let mut dht = Vec::new();
    for (i, [dc, ac]) in tables.iter().enumerate() {
        for (class, codes) in [(0u8, dc), (1, ac)] {
            dht.push((class << 4) | i as u8);
            dht.extend_from_slice(codes.counts);
            dht.extend_from_slice(codes.values);
        }
    }
    segment(out, 0xc4, &dht);

    if layout.restart_interval > 0 {
        segment(out, 0xdd, &layout.restart_interval.to_be_bytes());
    }

    let mut sos = vec![layout.components.len() as u8];
    for c in &layout.components {
        sos.extend([c.id, ((c.table as u8) << 4) | c.table as u8]);
    }
    sos.extend([0, 63, 0]);
    segment(out, 0xda, &sos);
}

fn magnitude(value: i32) -> (u32, u8) {
    let size = (32 - value.unsigned_abs().leading_zeros()) as u8;
    let bits = if value < 0 {
        (value - 1) as u32 & ((1 << size) - 1)
    } else {
        value as u32
    };
    (bits, size)
}

fn write_block(bw: &mut BitWriter, block: &[i16; 64], pred: &mut i32, dc: &HuffmanCodes, ac: &HuffmanCodes) {
    let diff = block[0] as i32 - *pred;
    *pred = block[0] as i32;
    let (bits, size) = magnitude(diff);
    let (code, len) = dc.codes[size as usize];
    bw.write(code as u32, len);
    bw.write(bits, size);
    let mut run = 0;
    for &coef in &block[1..] {
        if coef == 0 {
            run += 1;
            continue;
        }
        while run > 15 {
            let (code, len) = ac.codes[0xf0];
            bw.write(code as u32, len);
            run -= 16;
        }
        let (bits, size) = magnitude(coef as i32);
        let (code, len) = ac.codes[(run << 4) | size as usize];
        bw.write(code as u32, len);
        bw.write(bits, size);
        run = 0;
    }
    if run > 0 {
        let (code, len) = ac.codes[0];
        bw.write(code as u32, len);
    }
}

/// Writes a complete file. `block(c, bx, by)` returns the quantized
/// coefficients, in zig-zag order, of block (`bx`, `by`) of component `c`.
fn write_jpeg(layout: &FrameLayout, mut block: impl FnMut(usize, usize, usize) -> [i16; 64]) -> Vec<u8> {
    let luma = [
        HuffmanCodes::new(&DC_LUMA_COUNTS, &DC_VALUES),
        HuffmanCodes::new(&AC_LUMA_COUNTS, &AC_LUMA_VALUES),
    ];
    let chroma = [
        HuffmanCodes::new(&DC_CHROMA_COUNTS, &DC_VALUES),
        HuffmanCodes::new(&AC_CHROMA_COUNTS, &AC_CHROMA_VALUES),
    ];
    let tables: Vec<[&HuffmanCodes; 2]> = if layout.quant.len() == 1 {
        vec![[&luma[0], &luma[1]]]
    } else {
        vec![[&luma[0], &luma[1]], [&chroma[0], &chroma[1]]]
    };
    let mut out = Vec::new();
    write_headers(&mut out, layout, &tables);

    let (mcus_x, mcus_y) = layout.mcus();
    let total = mcus_x * mcus_y;
    let ri = layout.restart_interval as usize;
    let mut bw = BitWriter::default();
    let mut preds = vec![0; layout.components.len()];
    for mcu in 0..total {
        if ri > 0 && mcu > 0 && mcu % ri == 0 {
            bw.marker(0xd0 + ((mcu / ri - 1) % 8) as u8);
            preds.fill(0);
        }
        let (mx, my) = (mcu % mcus_x, mcu / mcus_x);
        for (c, spec) in layout.components.iter().enumerate() {
            let [dc, ac] = tables[spec.table];
            for v in 0..spec.v as usize {
                for h in 0..spec.h as usize {
                    let coefficients = block(c, mx * spec.h as usize + h, my * spec.v as usize + v);
                    write_block(&mut bw, &coefficients, &mut preds[c], dc, ac);
                }
            }
        }
    }
    bw.flush();
    out.extend(bw.out);
    out.extend([0xff, 0xd9]);
    out
}

/// A sample plane with edge replication.
struct Plane {
    width: usize,
    height: usize,
    samples: Vec<f32>,
}

impl Plane {
    fn get(&self, x: usize, y: usize) -> f32 {
        self.samples[y.min(self.height - 1) * self.width + x.min(self.width - 1)]
    }

    fn downsample(&self, sx: usize, sy: usize) -> Plane {
        let (width, height) = (self.width.div_ceil(sx), self.height.div_ceil(sy));
        let mut samples = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let mut sum = 0.0;
                for dy in 0..sy {
                    for dx in 0..sx {
                        sum += self.get(x * sx + dx, y * sy + dy);
                    }
                }
                samples.push(sum / (sx * sy) as f32);
            }
        }
        Plane {
            width,
            height,
            samples,
        }
    }

    fn quantized_block(&self, bx: usize, by: usize, quant: &[u16; 64]) -> [i16; 64] {
        let mut spatial = [0.0f32; 64];
        for y in 0..8 {
            for x in 0..8 {
                spatial[y * 8 + x] = self.get(bx * 8 + x, by * 8 + y) - 128.0;
            }
        }
        let freq = forward_dct(&spatial);
        std::array::from_fn(|k| (freq[ZIGZAG[k]] / quant[k] as f32).round() as i16)
    }
}

fn forward_dct(spatial: &[f32; 64]) -> [f32; 64] {
    let c = |u: usize| if u == 0 { 1.0 / 2f32.sqrt() } else { 1.0 };
    std::array::from_fn(|i| {
        let (v, u) = (i / 8, i % 8);
        let mut sum = 0.0;
        for y in 0..8 {
            for x in 0..8 {
                sum += spatial[y * 8 + x]
                    * (((2 * x + 1) * u) as f32 * PI / 16.0).cos()
                    * (((2 * y + 1) * v) as f32 * PI / 16.0).cos();
            }
        }
        0.25 * c(u) * c(v) * sum
    })
}

/// Encodes an 8-bit image as a baseline JPEG. `pixels` is either
/// grayscale or interleaved RGB, as implied by its length.
pub fn encode(pixels: &[u8], width: usize, height: usize, options: &EncoderOptions) -> Vec<u8> {
    let channels = pixels.len() / (width * height);
    assert!(channels == 1 || channels == 3, "expected gray or RGB pixels");
    let plane = |f: &dyn Fn(&[u8]) -> f32| Plane {
        width,
        height,
        samples: pixels.chunks_exact(channels).map(f).collect(),
    };
    if channels == 1 {
        let layout = FrameLayout {
            width,
            height,
            components: vec![ComponentSpec {
                id: 1,
                h: 1,
                v: 1,
                table: 0,
            }],
            quant: vec![quant_table(&LUMA_QUANT, options.quality)],
            restart_interval: options.restart_interval,
            comment: options.comment.clone(),
        };
        let y = plane(&|p: &[u8]| p[0] as f32);
        return write_jpeg(&layout, |_, bx, by| y.quantized_block(bx, by, &layout.quant[0]));
    }

    let (h, v) = options.sampling.luma_factors();
    let layout = FrameLayout {
        width,
        height,
        components: vec![
            ComponentSpec { id: 1, h, v, table: 0 },
            ComponentSpec {
                id: 2,
                h: 1,
                v: 1,
                table: 1,
            },
            ComponentSpec {
                id: 3,
                h: 1,
                v: 1,
                table: 1,
            },
        ],
        quant: vec![
            quant_table(&LUMA_QUANT, options.quality),
            quant_table(&CHROMA_QUANT, options.quality),
        ],
        restart_interval: options.restart_interval,
        comment: options.comment.clone(),
    };
    let rgb = |p: &[u8]| (p[0] as f32, p[1] as f32, p[2] as f32);
    let planes = [
        plane(&|p: &[u8]| {
            let (r, g, b) = rgb(p);
            0.299 * r + 0.587 * g + 0.114 * b
        }),
        plane(&|p: &[u8]| {
            let (r, g, b) = rgb(p);
            -0.168736 * r - 0.331264 * g + 0.5 * b + 128.0
        })
        .downsample(h as usize, v as usize),
        plane(&|p: &[u8]| {
            let (r, g, b) = rgb(p);
            0.5 * r - 0.418688 * g - 0.081312 * b + 128.0
        })
        .downsample(h as usize, v as usize),
    ];
    write_jpeg(&layout, |c, bx, by| {
        planes[c].quantized_block(bx, by, &layout.quant[layout.components[c].table])
    })
}

/// Encodes a grayscale image from already quantized blocks, given in raster
/// order with coefficients in zig-zag order. `quant` is in zig-zag order.
pub fn encode_quantized(
    width: usize,
    height: usize,
    quant: &[u16; 64],
    blocks: &[[i16; 64]],
    restart_interval: u16,
) -> Vec<u8> {
    let layout = FrameLayout {
        width,
        height,
        components: vec![ComponentSpec {
            id: 1,
            h: 1,
            v: 1,
            table: 0,
        }],
        quant: vec![*quant],
        restart_interval,
        comment: None,
    };
    let blocks_x = width.div_ceil(8);
    write_jpeg(&layout, |_, bx, by| blocks[by * blocks_x + bx])
}

/// Smooth gradients with per-pixel noise, `channels` samples per pixel.
pub fn noise_image(width: usize, height: usize, channels: usize, seed: u64) -> Vec<u8> {
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut pixels = Vec::with_capacity(width * height * channels);
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let base = (x * 160 / width.max(1) + y * 64 / height.max(1) + c * 40) % 192;
                pixels.push((base + rng.random_range(0..64)) as u8);
            }
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_scaling() {
        assert_eq!(quant_table(&LUMA_QUANT, 50)[0], 16);
        assert_eq!(quant_table(&LUMA_QUANT, 100), [1; 64]);
        // (16 * 50 + 50) / 100
        assert_eq!(quant_table(&LUMA_QUANT, 75)[0], 8);
    }

    #[test]
    fn magnitude_categories() {
        assert_eq!(magnitude(0), (0, 0));
        assert_eq!(magnitude(1), (1, 1));
        assert_eq!(magnitude(-1), (0, 1));
        assert_eq!(magnitude(-5), (0b010, 3));
        assert_eq!(magnitude(255), (255, 8));
    }

    #[test]
    fn stuffing_and_restart_markers() {
        let mut bw = BitWriter::default();
        bw.write(0xff, 8);
        bw.write(0b101, 3);
        bw.marker(0xd0);
        assert_eq!(bw.out, [0xff, 0x00, 0b1011_1111, 0xff, 0xd0]);
    }

    #[test]
    fn restart_markers_cycle() {
        let pixels = vec![100; 16 * 8 * 8];
        let data = encode(
            &pixels,
            16 * 8,
            8,
            &EncoderOptions {
                restart_interval: 1,
                ..Default::default()
            },
        );
        let sos = data.windows(2).position(|w| w == [0xff, 0xda]).unwrap();
        let restarts: Vec<u8> = data[sos..]
            .windows(2)
            .filter(|w| w[0] == 0xff && (0xd0..=0xd7).contains(&w[1]))
            .map(|w| w[1])
            .collect();
        assert_eq!(restarts.len(), 15);
        assert_eq!(restarts[8], 0xd0);
        assert_eq!(restarts[7], 0xd7);
    }

    #[test]
    fn comment_precedes_tables() {
        let pixels = vec![100; 64];
        let options = EncoderOptions {
            comment: Some("lockstep".to_string()),
            ..Default::default()
        };
        let data = encode(&pixels, 8, 8, &options);
        let com = data.windows(2).position(|w| w == [0xff, 0xfe]).unwrap();
        let dqt = data.windows(2).position(|w| w == [0xff, 0xdb]).unwrap();
        assert!(com < dqt);
        assert_eq!(&data[com + 2..com + 4], &[0, 10]);
        assert_eq!(&data[com + 4..com + 12], b"lockstep");
        let plain = encode(&pixels, 8, 8, &EncoderOptions::default());
        assert_eq!(data.len(), plain.len() + 12);
    }
}
