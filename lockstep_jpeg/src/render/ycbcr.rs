// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

const SCALE_BITS: u32 = 16;
const ROUND: i32 = 1 << (SCALE_BITS - 1);
// Full-range BT.601 as defined by JFIF, scaled by 2^16.
const CR_TO_R: i32 = 91881;
const CB_TO_G: i32 = 22554;
const CR_TO_G: i32 = 46802;
const CB_TO_B: i32 = 116130;

/// Converts one JFIF YCbCr sample to RGB.
/// ```
/// # use lockstep_jpeg::render::ycbcr::ycbcr_to_rgb;
/// assert_eq!(ycbcr_to_rgb(77, 128, 128), [77, 77, 77]);
/// ```
#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as i32;
    let cb = cb as i32 - 128;
    let cr = cr as i32 - 128;
    let r = y + ((CR_TO_R * cr + ROUND) >> SCALE_BITS);
    let g = y + ((-CB_TO_G * cb - CR_TO_G * cr + ROUND) >> SCALE_BITS);
    let b = y + ((CB_TO_B * cb + ROUND) >> SCALE_BITS);
    [
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn neutral_chroma_is_gray() {
        for y in [0, 1, 127, 128, 254, 255] {
            assert_eq!(ycbcr_to_rgb(y, 128, 128), [y, y, y]);
        }
    }

    #[test]
    fn saturated_colors() {
        assert_eq!(ycbcr_to_rgb(76, 85, 255), [254, 0, 0]);
        assert_eq!(ycbcr_to_rgb(255, 0, 255), [255, 208, 28]);
        assert_eq!(ycbcr_to_rgb(0, 255, 0), [0, 48, 225]);
    }
}
