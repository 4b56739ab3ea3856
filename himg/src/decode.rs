//! Decoding of HIMG streams.
//!
//! Decoding runs the stages in stream order: header, low-res mapping table, low-res planes,
//! quantization config, full-res mapping table and finally the full-res residual. The first
//! failing stage aborts the decode; there is no partial output.

use crate::{
    consts::*,
    container::{ChunkReader, ContainerError},
    huffman::{self, HuffmanError},
    mapper::{MappingError, MappingTable},
    plane::Plane,
    quantize::{QuantizationConfig, QuantizeError},
    utils::inverse_color_transform,
    workers::WorkerPool,
    ColorSpace, HeaderInfo, BLOCK_SHIFT_RANGE, FORMAT_VERSION, MAX_CHANNELS,
};
use byteorder::{ByteOrder, LittleEndian};
use core::fmt;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::collections::TryReserveError;
use tracing::debug;

mod full_res;

/// Pipeline stage that owns a mapping table or a Huffman block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LowRes,
    FullRes,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::LowRes => f.write_str("low-res"),
            Stage::FullRes => f.write_str("full-res"),
        }
    }
}

/// Coarse classification of a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input ended before the decoder was done with it.
    Truncated,
    /// The input is structurally invalid.
    Corrupt,
    /// The input is valid but uses a format variant this decoder does not know.
    Unsupported,
    /// The image is too large for this machine, or worker threads could not be started.
    Resource,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("malformed container"))]
    Container { source: ContainerError },
    #[snafu(display("unsupported format version {version}"))]
    UnsupportedVersion { version: u8 },
    #[snafu(display("unsupported color space {color_space}"))]
    UnsupportedColorSpace { color_space: u8 },
    #[snafu(display("unsupported channel count {num_channels}"))]
    UnsupportedChannelCount { num_channels: u8 },
    #[snafu(display("unsupported block size 2^{block_shift}"))]
    UnsupportedBlockSize { block_shift: u8 },
    #[snafu(display("invalid header: {reason}"))]
    InvalidHeader { reason: &'static str },
    #[snafu(display("image of {width}x{height}x{num_channels} samples is too large"))]
    TooLarge {
        width: u32,
        height: u32,
        num_channels: u8,
    },
    #[snafu(display("failed to allocate {bytes} bytes"))]
    Alloc {
        bytes: usize,
        source: TryReserveError,
    },
    #[snafu(display("invalid {stage} mapping table"))]
    Mapping { stage: Stage, source: MappingError },
    #[snafu(display("invalid quantization config"))]
    Quantization { source: QuantizeError },
    #[snafu(display(
        "{stage} block of {compressed} bytes cannot hold {expected} samples"
    ))]
    ImplausibleSize {
        stage: Stage,
        compressed: usize,
        expected: usize,
    },
    #[snafu(display("corrupt {stage} Huffman block"))]
    Huffman { stage: Stage, source: HuffmanError },
    #[snafu(display("corrupt Huffman block in block row {row}"))]
    BlockRow { row: usize, source: HuffmanError },
    #[snafu(display("record of block row {row} needs {needed} bytes, {available} left"))]
    InvalidBlockRow {
        row: usize,
        needed: usize,
        available: usize,
    },
    #[snafu(display("{bytes} bytes after the last block row"))]
    BlockRowTrailing { bytes: usize },
    #[snafu(display("failed to start {threads} worker threads"))]
    WorkerPool {
        threads: usize,
        source: rayon::ThreadPoolBuildError,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Container { source } if source.is_truncation() => ErrorKind::Truncated,
            DecodeError::Huffman { source, .. } | DecodeError::BlockRow { source, .. }
                if source.is_truncation() =>
            {
                ErrorKind::Truncated
            }
            DecodeError::UnsupportedVersion { .. }
            | DecodeError::UnsupportedColorSpace { .. }
            | DecodeError::UnsupportedChannelCount { .. }
            | DecodeError::UnsupportedBlockSize { .. } => ErrorKind::Unsupported,
            DecodeError::TooLarge { .. }
            | DecodeError::Alloc { .. }
            | DecodeError::WorkerPool { .. } => ErrorKind::Resource,
            _ => ErrorKind::Corrupt,
        }
    }
}

/// Allocates a zeroed buffer, reporting failure instead of aborting.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).context(AllocSnafu { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

#[derive(Debug)]
pub struct HimgDecodeContext {
    workers: WorkerPool,
}

impl HimgDecodeContext {
    /// Creates a single threaded decoder.
    pub const fn new() -> Self {
        Self {
            workers: WorkerPool::sequential(),
        }
    }

    /// Creates a decoder that decodes block rows on `threads` worker threads.
    ///
    /// `0` decodes on the calling thread.
    pub fn with_threads(threads: usize) -> Result<Self, DecodeError> {
        let workers = WorkerPool::new(threads).context(WorkerPoolSnafu { threads })?;
        Ok(Self { workers })
    }

    pub fn threads(&self) -> usize {
        self.workers.threads()
    }
}

impl Default for HimgDecodeContext {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_header(frmt: &[u8]) -> Result<HeaderInfo, DecodeError> {
    // Check the version first, later versions may have a different header size.
    let version = *frmt.first().context(InvalidHeaderSnafu {
        reason: "empty FRMT chunk",
    })?;
    ensure!(version == FORMAT_VERSION, UnsupportedVersionSnafu { version });
    ensure!(
        frmt.len() == FRMT_SIZE,
        InvalidHeaderSnafu {
            reason: "FRMT chunk has the wrong size",
        }
    );

    let width = LittleEndian::read_u32(&frmt[1..5]);
    let height = LittleEndian::read_u32(&frmt[5..9]);
    let num_channels = frmt[9];
    let color_space = frmt[10];
    let block_shift = frmt[11];

    ensure!(
        width > 0 && height > 0,
        InvalidHeaderSnafu {
            reason: "image has no pixels",
        }
    );
    ensure!(
        (1..=MAX_CHANNELS).contains(&num_channels),
        UnsupportedChannelCountSnafu { num_channels }
    );
    let color_space =
        ColorSpace::from_u8(color_space).context(UnsupportedColorSpaceSnafu { color_space })?;
    ensure!(
        color_space == ColorSpace::Plain || num_channels >= 3,
        InvalidHeaderSnafu {
            reason: "YCbCr needs at least three channels",
        }
    );
    ensure!(
        BLOCK_SHIFT_RANGE.contains(&block_shift),
        UnsupportedBlockSizeSnafu { block_shift }
    );

    Ok(HeaderInfo {
        width,
        height,
        num_channels,
        color_space,
        block_shift,
    })
}

impl HimgDecodeContext {
    /// Reads only the format header of a HIMG stream.
    pub fn decode_header(data: &[u8]) -> Result<HeaderInfo, DecodeError> {
        let mut chunks = ChunkReader::new(data).context(ContainerSnafu)?;
        parse_header(chunks.find(TAG_FRMT).context(ContainerSnafu)?)
    }

    /// Decodes a HIMG stream into interleaved 8-bit samples.
    pub fn decode(&self, data: &[u8]) -> Result<(HeaderInfo, Vec<u8>), DecodeError> {
        let mut pixels = Vec::new();
        let header = self.decode_to_vec(data, &mut pixels)?;
        Ok((header, pixels))
    }

    /// Decodes a HIMG stream, appending `width * height * num_channels` interleaved samples to
    /// `out`.
    ///
    /// On error, `out` is left as it was.
    pub fn decode_to_vec(&self, data: &[u8], out: &mut Vec<u8>) -> Result<HeaderInfo, DecodeError> {
        let mut chunks = ChunkReader::new(data).context(ContainerSnafu)?;

        let header = parse_header(chunks.find(TAG_FRMT).context(ContainerSnafu)?)?;
        let sample_count = header.sample_count().context(TooLargeSnafu {
            width: header.width,
            height: header.height,
            num_channels: header.num_channels,
        })?;
        debug!(
            width = header.width,
            height = header.height,
            channels = header.num_channels,
            color_space = %header.color_space,
            block_size = header.block_size(),
            "decoding HIMG"
        );

        let low_res_mapper = MappingTable::deserialize(chunks.find(TAG_LMAP).context(ContainerSnafu)?)
            .context(MappingSnafu {
                stage: Stage::LowRes,
            })?;
        let planes = decode_low_res(
            &header,
            chunks.find(TAG_LRES).context(ContainerSnafu)?,
            &low_res_mapper,
        )?;

        let quantization = QuantizationConfig::deserialize(
            chunks.find(TAG_QCFG).context(ContainerSnafu)?,
            usize::from(header.num_channels),
        )
        .context(QuantizationSnafu)?;
        debug!(steps = ?quantization.steps(), "quantization config");

        let full_res_mapper =
            MappingTable::deserialize(chunks.find(TAG_FMAP).context(ContainerSnafu)?).context(
                MappingSnafu {
                    stage: Stage::FullRes,
                },
            )?;

        let records = split_block_rows(&header, chunks.find(TAG_FRES).context(ContainerSnafu)?)?;
        debug!(
            block_rows = records.len(),
            threads = self.workers.threads(),
            "decoding full-res residual"
        );

        let mut pixels = try_zeroed(sample_count)?;
        let full_res = full_res::FullResDecoder {
            header: &header,
            planes: &planes,
            mapper: &full_res_mapper,
            quantization: &quantization,
        };
        full_res.decode(&self.workers, &records, &mut pixels)?;

        if header.color_space == ColorSpace::YCbCr {
            inverse_color_transform(&mut pixels, usize::from(header.num_channels));
        }

        if out.is_empty() {
            *out = pixels;
        } else {
            out.try_reserve_exact(sample_count)
                .context(AllocSnafu {
                    bytes: sample_count,
                })?;
            out.extend_from_slice(&pixels);
        }

        Ok(header)
    }
}

/// Decodes the low-res planes of every channel.
fn decode_low_res(
    header: &HeaderInfo,
    lres: &[u8],
    mapper: &MappingTable,
) -> Result<Vec<Plane>, DecodeError> {
    let (width, height) = Plane::low_res_size(
        header.width as usize,
        header.height as usize,
        header.block_shift,
    );
    let plane_len = width * height;
    let expected = plane_len * usize::from(header.num_channels);
    ensure!(
        huffman::max_uncompressed_size(lres.len()) >= expected,
        ImplausibleSizeSnafu {
            stage: Stage::LowRes,
            compressed: lres.len(),
            expected,
        }
    );
    let mut codes = try_zeroed(expected)?;
    debug!(
        width,
        height,
        compressed = lres.len(),
        "decoding low-res planes"
    );

    huffman::uncompress(lres, &mut codes).context(HuffmanSnafu {
        stage: Stage::LowRes,
    })?;

    Ok(codes
        .chunks_exact(plane_len)
        .map(|codes| Plane::decode_predictive(codes, width, height, header.block_shift, mapper))
        .collect())
}

/// Splits the FRES payload into one Huffman block per block row.
fn split_block_rows<'a>(
    header: &HeaderInfo,
    mut fres: &'a [u8],
) -> Result<Vec<&'a [u8]>, DecodeError> {
    let rows = header.block_rows();
    let row_len = header.width as usize * usize::from(header.num_channels);
    let mut records = Vec::with_capacity(rows.min(fres.len() / 4));

    for row in 0..rows {
        ensure!(
            fres.len() >= 4,
            InvalidBlockRowSnafu {
                row,
                needed: 4usize,
                available: fres.len(),
            }
        );
        let (len, rest) = fres.split_at(4);
        let len = LittleEndian::read_u32(len) as usize;
        ensure!(
            len <= rest.len(),
            InvalidBlockRowSnafu {
                row,
                needed: len,
                available: rest.len(),
            }
        );

        let (block, rest) = rest.split_at(len);
        let first_row = row << header.block_shift;
        let expected = header.block_size().min(header.height as usize - first_row) * row_len;
        ensure!(
            huffman::max_uncompressed_size(block.len()) >= expected,
            ImplausibleSizeSnafu {
                stage: Stage::FullRes,
                compressed: block.len(),
                expected,
            }
        );
        records.push(block);
        fres = rest;
    }

    ensure!(fres.is_empty(), BlockRowTrailingSnafu { bytes: fres.len() });

    Ok(records)
}
