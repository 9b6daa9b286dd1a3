// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{DecodeOptions, DecodedImage, MAX_WORKERS};
use crate::{
    error::{Error, Result},
    headers::{context::DecodeContext, markers::parse},
    partition::PartitionStrategy,
    pipeline,
};

/// Decodes whole baseline JPEG images with a fixed pool of workers.
///
/// ```no_run
/// # use lockstep_jpeg::api::{DecodeOptions, Decoder};
/// let data = std::fs::read("image.jpg").unwrap();
/// let image = Decoder::new(DecodeOptions::with_workers(8))?.decode(&data)?;
/// println!("{}x{} {:?}", image.width, image.height, image.channel_sums);
/// # Ok::<(), lockstep_jpeg::error::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Decoder {
    options: DecodeOptions,
}

impl Decoder {
    pub fn new(options: DecodeOptions) -> Result<Self> {
        if options.num_workers == 0 || options.num_workers > MAX_WORKERS {
            return Err(Error::InvalidWorkerCount(options.num_workers, MAX_WORKERS));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decodes one complete image. Either the whole image is produced or an
    /// error is returned; there is no partial output.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedImage> {
        pipeline::run(data, &self.options).map(DecodedImage::from_pipeline)
    }
}

/// Parses the markers of `data` without decoding any pixels.
pub fn read_header(data: &[u8]) -> Result<DecodeContext> {
    parse(data, 1, PartitionStrategy::Auto)
}
