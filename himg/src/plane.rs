//! Low-resolution planes: block averaging, predictive coding and bilinear upsampling.

use crate::{mapper::MappingTable, utils::clamp_u8};

/// One channel at a reduced resolution of one sample per `2^block_shift` square block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    width: usize,
    height: usize,
    block_shift: u8,
    samples: Vec<u8>,
}

/// Median edge detector: picks `left`, `top` or the gradient `left + top - top_left`.
#[inline]
fn med_predictor(left: u8, top: u8, top_left: u8) -> u8 {
    let (min, max) = (left.min(top), left.max(top));
    if top_left >= max {
        min
    } else if top_left <= min {
        max
    } else {
        (i32::from(left) + i32::from(top) - i32::from(top_left)) as u8
    }
}

/// Predicts sample `(x, y)` from already reconstructed neighbours.
#[inline]
fn predict(samples: &[u8], width: usize, x: usize, y: usize) -> u8 {
    let idx = y * width + x;
    match (x, y) {
        (0, 0) => 128,
        (_, 0) => samples[idx - 1],
        (0, _) => samples[idx - width],
        _ => med_predictor(
            samples[idx - 1],
            samples[idx - width],
            samples[idx - width - 1],
        ),
    }
}

/// Source positions and weight (out of `2 << block_shift`) for interpolating full-res `pos`.
///
/// Low-res sample `i` sits at the center of its block.
#[inline]
fn axis_weights(pos: usize, block_shift: u8, len: usize) -> (usize, usize, i32) {
    let span = 2 << block_shift;
    let block = 1 << block_shift;
    let Some(offset) = (2 * pos + 1).checked_sub(block) else {
        return (0, 0, 0);
    };

    let i0 = offset / span;
    if i0 + 1 >= len {
        return (len - 1, len - 1, 0);
    }
    (i0, i0 + 1, (offset % span) as i32)
}

impl Plane {
    /// Low-res dimensions for an image of `width × height`.
    pub const fn low_res_size(width: usize, height: usize, block_shift: u8) -> (usize, usize) {
        let block = 1 << block_shift;
        ((width + block - 1) >> block_shift, (height + block - 1) >> block_shift)
    }

    pub fn from_samples(width: usize, height: usize, block_shift: u8, samples: Vec<u8>) -> Self {
        debug_assert_eq!(samples.len(), width * height);
        Self {
            width,
            height,
            block_shift,
            samples,
        }
    }

    /// Averages channel `channel` of interleaved `pixels` over each block.
    pub fn downsample(
        pixels: &[u8],
        image_width: usize,
        image_height: usize,
        num_channels: usize,
        channel: usize,
        block_shift: u8,
    ) -> Self {
        let (width, height) = Self::low_res_size(image_width, image_height, block_shift);
        let mut sums = vec![0u32; width * height];

        for (y, row) in pixels
            .chunks_exact(image_width * num_channels)
            .take(image_height)
            .enumerate()
        {
            let sums_row = &mut sums[(y >> block_shift) * width..][..width];
            for (x, pixel) in row.chunks_exact(num_channels).enumerate() {
                sums_row[x >> block_shift] += u32::from(pixel[channel]);
            }
        }

        let block = 1 << block_shift;
        let samples = sums
            .iter()
            .enumerate()
            .map(|(i, &sum)| {
                let (bx, by) = (i % width, i / width);
                let bw = block.min(image_width - (bx << block_shift));
                let bh = block.min(image_height - (by << block_shift));
                let count = (bw * bh) as u32;
                ((sum + count / 2) / count) as u8
            })
            .collect();

        Self::from_samples(width, height, block_shift, samples)
    }

    /// Rebuilds a plane from its mapped prediction residuals.
    pub fn decode_predictive(
        codes: &[u8],
        width: usize,
        height: usize,
        block_shift: u8,
        mapper: &MappingTable,
    ) -> Self {
        debug_assert_eq!(codes.len(), width * height);

        let mut samples = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                let prediction = predict(&samples, width, x, y);
                let residual = mapper.unmap_from_8bit(codes[idx]);
                samples[idx] = clamp_u8(i32::from(prediction) + i32::from(residual));
            }
        }

        Self::from_samples(width, height, block_shift, samples)
    }

    /// Codes the plane predictively, appending one code per sample to `codes`.
    ///
    /// Returns the plane the decoder will reconstruct from those codes, which is what later
    /// stages have to predict from.
    pub fn encode_predictive(&self, mapper: &MappingTable, codes: &mut Vec<u8>) -> Plane {
        let mut samples = vec![0u8; self.samples.len()];
        codes.reserve(self.samples.len());

        for y in 0..self.height {
            for x in 0..self.width {
                let idx = y * self.width + x;
                let prediction = predict(&samples, self.width, x, y);
                let residual = i32::from(self.samples[idx]) - i32::from(prediction);
                let code = mapper.map_to_8bit(residual as i16);
                codes.push(code);
                samples[idx] =
                    clamp_u8(i32::from(prediction) + i32::from(mapper.unmap_from_8bit(code)));
            }
        }

        Self::from_samples(self.width, self.height, self.block_shift, samples)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn block_shift(&self) -> u8 {
        self.block_shift
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Interpolates full-res row `y` into `out` (one sample per full-res column).
    pub fn upsample_row(&self, y: usize, out: &mut [u8]) {
        let shift = self.block_shift;
        let span = 2 << shift;
        let round = 1 << (2 * shift + 1);

        let (y0, y1, wy) = axis_weights(y, shift, self.height);
        let row0 = &self.samples[y0 * self.width..][..self.width];
        let row1 = &self.samples[y1 * self.width..][..self.width];

        for (x, sample) in out.iter_mut().enumerate() {
            let (x0, x1, wx) = axis_weights(x, shift, self.width);
            let top = i32::from(row0[x0]) * (span - wx) + i32::from(row0[x1]) * wx;
            let bottom = i32::from(row1[x0]) * (span - wx) + i32::from(row1[x1]) * wx;
            let value = (top * (span - wy) + bottom * wy + round) >> (2 * shift + 2);
            *sample = value as u8;
        }
    }
}
