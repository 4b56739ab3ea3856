//! Reference implementation for the HIMG image format.
//!
//! HIMG is a lossy still-image codec built from two levels of prediction:
//!
//! 1. A low-resolution preview, one sample per `B×B` block and channel, coded with a
//!    median-edge predictor whose residuals are remapped to 8 bits with a
//!    [`MappingTable`](mapper::MappingTable).
//! 2. A full-resolution residual against the bilinearly upsampled preview, scalar quantized
//!    ([`QuantizationConfig`](quantize::QuantizationConfig)) and remapped to 8 bits with a second
//!    mapping table.
//!
//! Both 8-bit streams are entropy coded with a per-block [Huffman coder](huffman) that has five
//! extra run-length tokens for runs of the zero byte.
//!
//! # Container
//!
//! The stream is a RIFF file with the form type `HIMG`. Every chunk is a 4-byte tag, a u32le
//! payload length and the payload (padded to an even length). The chunks are, in order:
//!
//! - [`FRMT`](consts::TAG_FRMT): format header
//! - [`LMAP`](consts::TAG_LMAP): low-res mapping table
//! - [`LRES`](consts::TAG_LRES): low-res planes, one Huffman block
//! - [`QCFG`](consts::TAG_QCFG): quantization step sizes
//! - [`FMAP`](consts::TAG_FMAP): full-res mapping table
//! - [`FRES`](consts::TAG_FRES): full-res residual, one Huffman block per block row
//!
//! Readers scan forward for the chunk they need and skip anything they don't know, so new
//! optional chunks can be added without breaking older decoders.
//!
//! # Color
//!
//! Images with three or more channels are normally coded as full-range BT.601 YCbCr
//! ([`ColorSpace::YCbCr`]). A fourth channel is always coded as-is.

pub mod bits;
pub mod container;
pub mod decode;
pub mod encode;
pub mod huffman;
pub mod mapper;
pub mod plane;
pub mod quantize;
pub mod utils;

mod workers;

pub use decode::{DecodeError, ErrorKind, HimgDecodeContext};
pub use encode::{EncodeError, HimgEncodeContext};

use core::fmt;

/// Format version written by this encoder. Decoders reject anything else.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum number of interleaved channels in an image.
pub const MAX_CHANNELS: u8 = 4;

/// Default block size (log2) of the low-resolution preview: 8×8 pixels per preview sample.
pub const DEFAULT_BLOCK_SHIFT: u8 = 3;

/// Supported block sizes (log2) of the low-resolution preview.
pub const BLOCK_SHIFT_RANGE: core::ops::RangeInclusive<u8> = 1..=5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub width: u32,
    pub height: u32,
    pub num_channels: u8,
    pub color_space: ColorSpace,
    /// log2 of the low-res block size.
    pub block_shift: u8,
}

impl HeaderInfo {
    /// Number of interleaved samples in the decoded image.
    pub fn sample_count(&self) -> Option<usize> {
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?
            .checked_mul(usize::from(self.num_channels))
    }

    pub const fn block_size(&self) -> usize {
        1 << self.block_shift
    }

    /// Number of block rows, i.e. independently coded full-res residual blocks.
    pub const fn block_rows(&self) -> usize {
        (self.height as usize + self.block_size() - 1) >> self.block_shift
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Every channel is coded as given.
    Plain = 0,
    /// The first three channels are coded as luma/chroma.
    YCbCr = 1,
}

impl ColorSpace {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ColorSpace::Plain),
            1 => Some(ColorSpace::YCbCr),
            _ => None,
        }
    }

    /// Whether `channel` carries chroma in this color space.
    pub const fn is_chroma(self, channel: usize) -> bool {
        matches!(self, ColorSpace::YCbCr) && (channel == 1 || channel == 2)
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpace::Plain => f.write_str("plain"),
            ColorSpace::YCbCr => f.write_str("YCbCr"),
        }
    }
}

/// Checks the two magic tags of a HIMG stream without parsing anything else.
///
/// Callers can use this to dispatch between HIMG and other image decoders.
pub fn is_himg(data: &[u8]) -> bool {
    data.len() >= 12 && data[0..4] == consts::TAG_RIFF && data[8..12] == consts::TAG_HIMG
}

pub mod consts {
    /// Outer container tag.
    pub const TAG_RIFF: [u8; 4] = *b"RIFF";

    /// RIFF form type identifying a HIMG stream.
    pub const TAG_HIMG: [u8; 4] = *b"HIMG";

    /// Format header.
    ///
    /// ```plain
    /// .- FRMT -------------------------------------------------------------.
    /// | u8 version | u32le width | u32le height | u8 channels | u8 color    |
    /// | space      | u8 block size log2                                     |
    /// `--------------------------------------------------------------------`
    /// ```
    ///
    /// - version must be [`FORMAT_VERSION`](crate::FORMAT_VERSION)
    /// - width and height are non-zero
    /// - 1..=4 channels
    /// - color space 0 (plain) or 1 (YCbCr, needs at least three channels)
    /// - block size log2 within [`BLOCK_SHIFT_RANGE`](crate::BLOCK_SHIFT_RANGE)
    pub const TAG_FRMT: [u8; 4] = *b"FRMT";

    /// Size of the [`TAG_FRMT`] payload.
    pub const FRMT_SIZE: usize = 12;

    /// Low-res mapping table, see [`MappingTable`](crate::mapper::MappingTable).
    pub const TAG_LMAP: [u8; 4] = *b"LMAP";

    /// Low-res planes: one Huffman block holding the mapped prediction residuals of every
    /// channel, channel after channel, row-major.
    pub const TAG_LRES: [u8; 4] = *b"LRES";

    /// Quantization config, see [`QuantizationConfig`](crate::quantize::QuantizationConfig).
    pub const TAG_QCFG: [u8; 4] = *b"QCFG";

    /// Full-res mapping table.
    pub const TAG_FMAP: [u8; 4] = *b"FMAP";

    /// Full-res residual.
    ///
    /// One record per block row (`block size` image rows, the last one may be shorter):
    ///
    /// ```plain
    /// .- FRES record -------------------------.
    /// | u32le length | Huffman block (length) |
    /// `---------------------------------------`
    /// ```
    ///
    /// The uncompressed block holds the mapped residual codes of all rows of the block row,
    /// channel after channel. The records must fill the payload exactly.
    pub const TAG_FRES: [u8; 4] = *b"FRES";
}
