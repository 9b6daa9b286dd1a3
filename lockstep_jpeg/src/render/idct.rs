// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::{f32::consts::FRAC_1_SQRT_2, sync::OnceLock};

use crate::{
    BLOCK_DIM, BLOCK_SIZE, entropy_coding::block::CoefficientBlock,
    headers::context::QuantTable,
};

/// Natural (row-major) index of each zig-zag position.
pub const ZIGZAG: [usize; BLOCK_SIZE] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

#[inline(always)]
fn alpha(u: usize) -> f32 {
    if u == 0 { FRAC_1_SQRT_2 } else { 1.0 }
}

/// `m[x][u] = alpha(u) * cos((2x + 1) * u * pi / 16) / 2`, so that the 2D
/// inverse transform is `f[y][x] = sum m[y][v] * m[x][u] * F[v][u]`.
fn idct_matrix() -> &'static [[f32; BLOCK_DIM]; BLOCK_DIM] {
    static MATRIX: OnceLock<[[f32; BLOCK_DIM]; BLOCK_DIM]> = OnceLock::new();
    MATRIX.get_or_init(|| {
        let mut m = [[0.0; BLOCK_DIM]; BLOCK_DIM];
        for (x, row) in m.iter_mut().enumerate() {
            for (u, v) in row.iter_mut().enumerate() {
                let angle = (2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0;
                *v = alpha(u) * (angle.cos() as f32) * 0.5;
            }
        }
        m
    })
}

/// Dequantizes a zig-zag ordered block whose DC value is `dc`, then
/// computes the level-shifted 8x8 inverse DCT into `out` (row-major).
pub fn dequantize_and_idct(
    coefficients: &CoefficientBlock,
    dc: i32,
    quant: &QuantTable,
    out: &mut [u8; BLOCK_SIZE],
) {
    let mut freq = [0.0f32; BLOCK_SIZE];
    freq[0] = dc as f32 * quant[0] as f32;
    for k in 1..BLOCK_SIZE {
        if coefficients[k] != 0 {
            freq[ZIGZAG[k]] = coefficients[k] as f32 * quant[k] as f32;
        }
    }
    let m = idct_matrix();
    // Rows: tmp[v][x] = sum_u m[x][u] * F[v][u].
    let mut tmp = [0.0f32; BLOCK_SIZE];
    for v in 0..BLOCK_DIM {
        let row = &freq[v * BLOCK_DIM..(v + 1) * BLOCK_DIM];
        if row.iter().all(|&f| f == 0.0) {
            continue;
        }
        for x in 0..BLOCK_DIM {
            tmp[v * BLOCK_DIM + x] = (0..BLOCK_DIM).map(|u| m[x][u] * row[u]).sum();
        }
    }
    // Columns: f[y][x] = sum_v m[y][v] * tmp[v][x].
    for y in 0..BLOCK_DIM {
        for x in 0..BLOCK_DIM {
            let sample: f32 = (0..BLOCK_DIM)
                .map(|v| m[y][v] * tmp[v * BLOCK_DIM + x])
                .sum();
            out[y * BLOCK_DIM + x] = (sample.round() + 128.0).clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use test_log::test;

    use super::*;
    use crate::util::test::assert_all_almost_eq;

    fn reference_idct(freq: &[f64; BLOCK_SIZE]) -> [f64; BLOCK_SIZE] {
        let c = |u: usize| if u == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
        let mut out = [0.0; BLOCK_SIZE];
        for y in 0..8 {
            for x in 0..8 {
                let mut sum = 0.0;
                for v in 0..8 {
                    for u in 0..8 {
                        sum += c(u)
                            * c(v)
                            * freq[v * 8 + u]
                            * ((2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0).cos()
                            * ((2 * y + 1) as f64 * v as f64 * std::f64::consts::PI / 16.0).cos();
                    }
                }
                out[y * 8 + x] = (sum / 4.0 + 128.0).round().clamp(0.0, 255.0);
            }
        }
        out
    }

    #[test]
    fn dc_only_block_is_flat() {
        let mut out = [0; BLOCK_SIZE];
        dequantize_and_idct(&[0; BLOCK_SIZE], 10, &[16; BLOCK_SIZE], &mut out);
        // 10 * 16 / 8 + 128
        assert!(out.iter().all(|&s| s == 148), "{out:?}");
    }

    #[test]
    fn zigzag_is_a_permutation() {
        let mut seen = [false; BLOCK_SIZE];
        for &z in ZIGZAG.iter() {
            assert!(!seen[z]);
            seen[z] = true;
        }
    }

    #[test]
    fn matches_reference() {
        let mut rng = XorShiftRng::seed_from_u64(0);
        for _ in 0..20 {
            let mut coefficients = [0i16; BLOCK_SIZE];
            for c in coefficients.iter_mut().skip(1).take(20) {
                *c = rng.random_range(-20..=20);
            }
            let quant: QuantTable = std::array::from_fn(|i| 1 + (i % 8) as u16);
            let dc = rng.random_range(-50..=50);
            let mut freq = [0.0f64; BLOCK_SIZE];
            freq[0] = (dc * quant[0] as i32) as f64;
            for k in 1..BLOCK_SIZE {
                freq[ZIGZAG[k]] = (coefficients[k] as i32 * quant[k] as i32) as f64;
            }
            let expected = reference_idct(&freq);
            let mut out = [0u8; BLOCK_SIZE];
            dequantize_and_idct(&coefficients, dc, &quant, &mut out);
            let out: Vec<f64> = out.iter().map(|&s| s as f64).collect();
            assert_all_almost_eq!(out, expected, 1.0);
        }
    }
}
