use crate::{
    consts::*,
    container::{ContainerError, ContainerWriter},
    huffman,
    mapper::MappingTable,
    plane::Plane,
    quantize::{quantize, QuantizationConfig},
    utils::forward_color_transform,
    workers::WorkerPool,
    ColorSpace, HeaderInfo, BLOCK_SHIFT_RANGE, DEFAULT_BLOCK_SHIFT, FORMAT_VERSION, MAX_CHANNELS,
};
use itertools::izip;
use snafu::{ensure, ResultExt, Snafu};
use std::borrow::Cow;
use tracing::{debug, trace};

mod std_api;

#[derive(Debug, Snafu)]
pub enum EncodeError {
    #[snafu(display(
        "Specified image dimensions don't match the number of samples: {width} * {height} * {num_channels} samples expected, but {sample_count} samples were given"
    ))]
    InvalidDimensions {
        width: u32,
        height: u32,
        num_channels: u8,
        sample_count: usize,
    },
    #[snafu(display("unsupported channel count {num_channels}"))]
    UnsupportedChannelCount { num_channels: u8 },
    #[snafu(display("quality must be within 0..=100, got {quality}"))]
    InvalidQuality { quality: u8 },
    #[snafu(display("block size 2^{block_shift} is out of range"))]
    InvalidBlockShift { block_shift: u8 },
    #[snafu(display("failed to start {threads} worker threads"))]
    WorkerPool {
        threads: usize,
        source: rayon::ThreadPoolBuildError,
    },
    #[snafu(display("encoded image does not fit into the container"))]
    Container { source: ContainerError },
    WriteIo {
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct HimgEncodeContext {
    quality: u8,
    color_space: ColorSpace,
    block_shift: u8,
    workers: WorkerPool,
}

impl HimgEncodeContext {
    /// Creates a single threaded encoder for `quality` (0..=100, higher is better).
    pub fn new(quality: u8) -> Result<Self, EncodeError> {
        ensure!(quality <= 100, InvalidQualitySnafu { quality });

        Ok(Self {
            quality,
            color_space: ColorSpace::YCbCr,
            block_shift: DEFAULT_BLOCK_SHIFT,
            workers: WorkerPool::sequential(),
        })
    }

    /// Selects the color space for images with at least three channels. Images with fewer
    /// channels are always coded as [`ColorSpace::Plain`]. Defaults to [`ColorSpace::YCbCr`].
    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// Sets the low-res block size to `2^block_shift`.
    pub fn with_block_shift(mut self, block_shift: u8) -> Result<Self, EncodeError> {
        ensure!(
            BLOCK_SHIFT_RANGE.contains(&block_shift),
            InvalidBlockShiftSnafu { block_shift }
        );
        self.block_shift = block_shift;
        Ok(self)
    }

    /// Encodes block rows on `threads` worker threads; `0` encodes on the calling thread.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, EncodeError> {
        self.workers = WorkerPool::new(threads).context(WorkerPoolSnafu { threads })?;
        Ok(self)
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encodes interleaved 8-bit `pixels` and appends the stream to `out`.
    ///
    /// Returns the number of bytes appended. On error, `out` may hold a partial stream.
    pub fn encode_to_vec(
        &self,
        width: u32,
        height: u32,
        num_channels: u8,
        pixels: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<usize, EncodeError> {
        let header = self.header(width, height, num_channels, pixels.len())?;
        let channels = usize::from(num_channels);
        debug!(
            width,
            height,
            channels,
            color_space = %header.color_space,
            quality = self.quality,
            "encoding HIMG"
        );

        let source = if header.color_space == ColorSpace::YCbCr {
            let mut converted = pixels.to_vec();
            forward_color_transform(&mut converted, channels);
            Cow::Owned(converted)
        } else {
            Cow::Borrowed(pixels)
        };

        let low_res_mapper = MappingTable::low_res_for_quality(self.quality);
        let mut low_res_codes = Vec::new();
        let planes = (0..channels)
            .map(|channel| {
                Plane::downsample(
                    &source,
                    width as usize,
                    height as usize,
                    channels,
                    channel,
                    header.block_shift,
                )
                .encode_predictive(&low_res_mapper, &mut low_res_codes)
            })
            .collect::<Vec<_>>();

        let quantization =
            QuantizationConfig::for_quality(self.quality, channels, header.color_space);
        let full_res_mapper =
            MappingTable::full_res_for_quality(self.quality, quantization.min_step());
        debug!(steps = ?quantization.steps(), "quantization config");

        let full_res = FullResEncoder {
            header: &header,
            pixels: &source,
            planes: &planes,
            mapper: &full_res_mapper,
            quantization: &quantization,
        };
        let blocks = self.workers.map((0..header.block_rows()).collect(), |row| {
            full_res.encode_block_row(row)
        });

        let mut writer = ContainerWriter::new(out);
        writer
            .write_chunk(TAG_FRMT, &serialize_header(&header))
            .context(ContainerSnafu)?;
        writer
            .write_chunk_with(TAG_LMAP, |out| low_res_mapper.serialize(out))
            .context(ContainerSnafu)?;
        writer
            .write_chunk_with(TAG_LRES, |out| {
                huffman::compress(&low_res_codes, out);
            })
            .context(ContainerSnafu)?;
        writer
            .write_chunk_with(TAG_QCFG, |out| quantization.serialize(out))
            .context(ContainerSnafu)?;
        writer
            .write_chunk_with(TAG_FMAP, |out| full_res_mapper.serialize(out))
            .context(ContainerSnafu)?;
        writer
            .write_chunk_with(TAG_FRES, |out| {
                for block in &blocks {
                    out.extend_from_slice(&(block.len() as u32).to_le_bytes());
                    out.extend_from_slice(block);
                }
            })
            .context(ContainerSnafu)?;

        let written = writer.finish().context(ContainerSnafu)?;
        debug!(
            bytes = written,
            block_rows = blocks.len(),
            threads = self.workers.threads(),
            "encoded HIMG"
        );

        Ok(written)
    }

    fn header(
        &self,
        width: u32,
        height: u32,
        num_channels: u8,
        sample_count: usize,
    ) -> Result<HeaderInfo, EncodeError> {
        ensure!(
            (1..=MAX_CHANNELS).contains(&num_channels),
            UnsupportedChannelCountSnafu { num_channels }
        );

        let color_space = if num_channels >= 3 {
            self.color_space
        } else {
            ColorSpace::Plain
        };
        let header = HeaderInfo {
            width,
            height,
            num_channels,
            color_space,
            block_shift: self.block_shift,
        };

        ensure!(
            width > 0 && height > 0 && header.sample_count() == Some(sample_count),
            InvalidDimensionsSnafu {
                width,
                height,
                num_channels,
                sample_count,
            }
        );

        Ok(header)
    }
}

fn serialize_header(header: &HeaderInfo) -> [u8; FRMT_SIZE] {
    let mut frmt = [0; FRMT_SIZE];
    frmt[0] = FORMAT_VERSION;
    frmt[1..5].copy_from_slice(&header.width.to_le_bytes());
    frmt[5..9].copy_from_slice(&header.height.to_le_bytes());
    frmt[9] = header.num_channels;
    frmt[10] = header.color_space as u8;
    frmt[11] = header.block_shift;
    frmt
}

/// Codes full-resolution residuals against the reconstructed low-res planes.
struct FullResEncoder<'a> {
    header: &'a HeaderInfo,
    pixels: &'a [u8],
    planes: &'a [Plane],
    mapper: &'a MappingTable,
    quantization: &'a QuantizationConfig,
}

impl FullResEncoder<'_> {
    fn encode_block_row(&self, row: usize) -> Vec<u8> {
        let width = self.header.width as usize;
        let height = self.header.height as usize;
        let num_channels = usize::from(self.header.num_channels);
        let first_row = row << self.header.block_shift;
        let rows = self.header.block_size().min(height - first_row);
        let row_len = width * num_channels;

        let mut codes = Vec::with_capacity(rows * row_len);
        let mut prediction = vec![0; width];
        for (channel, plane) in self.planes.iter().enumerate() {
            let step = self.quantization.step(channel);
            for y in first_row..first_row + rows {
                plane.upsample_row(y, &mut prediction);
                let pixel_row = &self.pixels[y * row_len..][..row_len];
                for (pixel, &predicted) in izip!(pixel_row.chunks_exact(num_channels), &prediction) {
                    let residual = i32::from(pixel[channel]) - i32::from(predicted);
                    codes.push(self.mapper.map_to_8bit(quantize(residual, step)));
                }
            }
        }

        let mut block = Vec::with_capacity(huffman::max_compressed_size(codes.len()));
        huffman::compress(&codes, &mut block);
        trace!(row, rows, compressed = block.len(), "encoded block row");
        block
    }
}
