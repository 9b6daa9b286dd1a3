// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use thiserror::Error;

/// Coarse classification of [`Error`], used by callers that only care about
/// which stage of the decode rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unsupported container, markers, or options.
    Format,
    /// Corrupt entropy-coded data.
    Bitstream,
    /// A worker could not locate an MCU boundary it shares with its
    /// predecessor.
    PartitionResync,
    /// The worker pool could not be started.
    Resource,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // Container format errors.
    #[error("Invalid signature {0:02x}{1:02x}, expected ffd8")]
    InvalidSignature(u8, u8),
    #[error("Marker segment at offset {0} extends past the end of the buffer")]
    SegmentOutOfBounds(usize),
    #[error("Invalid length {1} for marker {0:02x}")]
    InvalidSegmentLength(u8, usize),
    #[error("Expected a marker at offset {0}")]
    ExpectedMarker(usize),
    #[error("Unexpected marker {0:02x} before the first scan")]
    UnexpectedMarker(u8),
    #[error("Unsupported frame type {0:02x}: only baseline sequential frames are supported")]
    UnsupportedFrameType(u8),
    #[error("Arithmetic coding is not supported")]
    UnsupportedArithmeticCoding,
    #[error("Unsupported quantization table precision {0}")]
    UnsupportedQuantPrecision(u8),
    #[error("Unsupported sample precision {0}")]
    UnsupportedSamplePrecision(u8),
    #[error("Unsupported sampling factors {0}x{1} for component {2}")]
    UnsupportedSampling(u8, u8, usize),
    #[error("Unsupported scan: {0}")]
    UnsupportedScan(&'static str),
    #[error("Multiple frame headers")]
    DuplicateFrameHeader,
    #[error("Invalid table id {0}")]
    InvalidTableId(u8),
    #[error("Quantization table {0} is not defined")]
    UndefinedQuantTable(usize),
    #[error("Huffman table {0} of class {1} is not defined")]
    UndefinedHuffmanTable(usize, u8),
    #[error("Invalid Huffman table")]
    InvalidHuffmanTable,
    #[error("Invalid number of components: {0}")]
    InvalidComponentCount(usize),
    #[error("Scan header before frame header")]
    MissingFrameHeader,
    #[error("No scan found")]
    NoScan,
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(usize, usize),
    #[error("Image too large: {0}x{1} exceeds the pixel limit of {2}")]
    ImageTooLarge(usize, usize, usize),
    #[error("Invalid worker count {0}, must be between 1 and {1}")]
    InvalidWorkerCount(usize, usize),
    #[error("Crop origin {0},{1} with size {2} is not aligned to 8 pixels")]
    CropNotAligned(usize, usize, usize),
    #[error("Crop {2}x{2}+{0}+{1} is out of bounds of a {3}x{4} image")]
    CropOutOfBounds(usize, usize, usize, usize, usize),
    #[error("Invalid scale factor {0} for edge {1}")]
    InvalidScale(usize, usize),
    #[error("Centered crop of {0} pixels does not fit a {1}x{2} image")]
    InvalidCenteredCrop(usize, usize, usize),
    // Entropy-coded data errors.
    #[error("Unexpected end of entropy-coded segment at byte {0}")]
    UnexpectedEndOfSegment(usize),
    #[error("Invalid Huffman code at byte {0}")]
    InvalidHuffmanCode(usize),
    #[error("Invalid AC run length: coefficient index {0}")]
    InvalidRunLength(usize),
    #[error("Invalid coefficient size {0}")]
    InvalidCoefficientSize(u8),
    #[error("Invalid AC symbol {0:02x}")]
    InvalidAcSymbol(u8),
    #[error("Expected restart marker RST{expected}, found {found:02x}")]
    RestartMismatch { expected: u8, found: u8 },
    #[error("Missing restart marker after MCU {0}")]
    MissingRestartMarker(usize),
    #[error("Entropy-coded data continues past the last MCU")]
    TrailingEntropyData,
    #[error("Decoded {0} MCUs, expected {1}")]
    MissingMcus(usize, usize),
    // Partitioning errors.
    #[error("Worker {worker} could not resynchronize with worker {previous}")]
    ResyncFailed { worker: usize, previous: usize },
    // Resource errors.
    #[error("Could not start worker pool: {0}")]
    WorkerPool(String),
    #[error("Decode aborted by another worker")]
    Aborted,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            UnexpectedEndOfSegment(_)
            | InvalidHuffmanCode(_)
            | InvalidRunLength(_)
            | InvalidCoefficientSize(_)
            | InvalidAcSymbol(_)
            | RestartMismatch { .. }
            | MissingRestartMarker(_)
            | TrailingEntropyData
            | MissingMcus(..) => ErrorKind::Bitstream,
            ResyncFailed { .. } => ErrorKind::PartitionResync,
            WorkerPool(_) | Aborted => ErrorKind::Resource,
            _ => ErrorKind::Format,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Error::InvalidSignature(0, 0).kind(), ErrorKind::Format);
        assert_eq!(Error::CropNotAligned(1, 0, 8).kind(), ErrorKind::Format);
        assert_eq!(Error::InvalidHuffmanCode(3).kind(), ErrorKind::Bitstream);
        assert_eq!(
            Error::RestartMismatch {
                expected: 1,
                found: 0xd3
            }
            .kind(),
            ErrorKind::Bitstream
        );
        assert_eq!(
            Error::ResyncFailed {
                worker: 2,
                previous: 1
            }
            .kind(),
            ErrorKind::PartitionResync
        );
        assert_eq!(
            Error::WorkerPool(String::new()).kind(),
            ErrorKind::Resource
        );
    }
}
