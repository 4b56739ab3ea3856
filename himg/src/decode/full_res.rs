use super::{try_zeroed, BlockRowSnafu, DecodeError};
use crate::{
    huffman,
    mapper::MappingTable,
    plane::Plane,
    quantize::{dequantize, QuantizationConfig},
    utils::clamp_u8,
    workers::WorkerPool,
    HeaderInfo,
};
use itertools::izip;
use snafu::ResultExt;
use tracing::trace;

/// Reconstructs full-resolution pixels from the upsampled low-res planes and the residual.
pub(super) struct FullResDecoder<'a> {
    pub header: &'a HeaderInfo,
    pub planes: &'a [Plane],
    pub mapper: &'a MappingTable,
    pub quantization: &'a QuantizationConfig,
}

impl FullResDecoder<'_> {
    /// Decodes every block row into its own slice of `pixels`.
    pub fn decode(
        &self,
        workers: &WorkerPool,
        records: &[&[u8]],
        pixels: &mut [u8],
    ) -> Result<(), DecodeError> {
        let row_len = self.header.width as usize * usize::from(self.header.num_channels);
        let block_row_len = row_len << self.header.block_shift;

        let work = pixels
            .chunks_mut(block_row_len)
            .zip(records.iter().copied())
            .enumerate()
            .collect::<Vec<_>>();
        debug_assert_eq!(work.len(), records.len());

        workers.try_for_each(work, |(row, (out, block))| {
            self.decode_block_row(row, block, out)
        })
    }

    /// Decodes block row `row`, whose interleaved pixels are `out`.
    fn decode_block_row(&self, row: usize, block: &[u8], out: &mut [u8]) -> Result<(), DecodeError> {
        let width = self.header.width as usize;
        let num_channels = usize::from(self.header.num_channels);
        let rows = out.len() / (width * num_channels);
        trace!(row, rows, compressed = block.len(), "decoding block row");

        let mut codes = try_zeroed(out.len())?;
        huffman::uncompress(block, &mut codes).context(BlockRowSnafu { row })?;

        let first_row = row << self.header.block_shift;
        let mut prediction = vec![0; width];
        for (channel, (plane, channel_codes)) in self
            .planes
            .iter()
            .zip(codes.chunks_exact(rows * width))
            .enumerate()
        {
            let step = self.quantization.step(channel);
            for (y, (pixel_row, code_row)) in out
                .chunks_exact_mut(width * num_channels)
                .zip(channel_codes.chunks_exact(width))
                .enumerate()
            {
                plane.upsample_row(first_row + y, &mut prediction);
                for (pixel, &predicted, &code) in izip!(
                    pixel_row.chunks_exact_mut(num_channels),
                    &prediction,
                    code_row
                ) {
                    let residual = dequantize(self.mapper.unmap_from_8bit(code), step);
                    pixel[channel] = clamp_u8(i32::from(predicted) + i32::from(residual));
                }
            }
        }

        Ok(())
    }
}
