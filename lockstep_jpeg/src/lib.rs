// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![deny(unsafe_code)]
pub mod api;
pub mod bit_reader;
pub mod entropy_coding;
pub mod error;
pub mod headers;
pub mod partition;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod stats;
pub mod util;

const BLOCK_DIM: usize = 8;
const BLOCK_SIZE: usize = BLOCK_DIM * BLOCK_DIM;

pub use api::{Crop, DecodeOptions, DecodedImage, Decoder, read_header};
pub use error::{Error, ErrorKind, Result};
