//! Scalar quantization of full-resolution residuals.
//!
//! ```plain
//! .- QCFG ---------------------------.
//! | u8 count | count × u8 step sizes |
//! `----------------------------------`
//! ```
//!
//! `count` is either 1 (one step for every channel) or the channel count.

use crate::ColorSpace;
use snafu::{ensure, Snafu};

#[derive(Debug, Snafu)]
pub enum QuantizeError {
    #[snafu(display("quantization config is empty"))]
    Empty,
    #[snafu(display("quantization step of channel {channel} is zero"))]
    ZeroStep { channel: usize },
    #[snafu(display("{count} quantization steps given for {channels} channels"))]
    StepCount { count: usize, channels: usize },
    #[snafu(display("quantization config should be {expected} bytes, got {actual}"))]
    InvalidSize { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizationConfig {
    steps: Vec<u8>,
}

impl QuantizationConfig {
    /// Creates a config for an image with `num_channels` channels.
    pub fn new(steps: Vec<u8>, num_channels: usize) -> Result<Self, QuantizeError> {
        ensure!(!steps.is_empty(), EmptySnafu);
        ensure!(
            steps.len() == 1 || steps.len() == num_channels,
            StepCountSnafu {
                count: steps.len(),
                channels: num_channels,
            }
        );
        if let Some(channel) = steps.iter().position(|&s| s == 0) {
            return ZeroStepSnafu { channel }.fail();
        }

        Ok(Self { steps })
    }

    /// Derives step sizes for `quality` (0..=100).
    ///
    /// Luma and plain channels get `1 + round(12 * (1 - q)²)`, chroma channels
    /// `1 + round(20 * (1 - q)²)`, with `q = quality / 100`.
    pub fn for_quality(quality: u8, num_channels: usize, color_space: ColorSpace) -> Self {
        let coarseness = 1.0 - f64::from(quality.min(100)) / 100.0;
        let step = |scale: f64| 1 + (scale * coarseness * coarseness).round() as u8;

        let steps = (0..num_channels.max(1))
            .map(|channel| {
                if color_space.is_chroma(channel) {
                    step(20.0)
                } else {
                    step(12.0)
                }
            })
            .collect();

        Self { steps }
    }

    #[inline]
    pub fn step(&self, channel: usize) -> u8 {
        self.steps.get(channel).copied().unwrap_or(self.steps[0])
    }

    pub fn min_step(&self) -> u8 {
        self.steps.iter().copied().min().unwrap_or(1)
    }

    pub fn steps(&self) -> &[u8] {
        &self.steps
    }

    pub fn size_in_bytes(&self) -> usize {
        1 + self.steps.len()
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.steps.len() as u8);
        out.extend_from_slice(&self.steps);
    }

    pub fn deserialize(data: &[u8], num_channels: usize) -> Result<Self, QuantizeError> {
        let Some((&count, steps)) = data.split_first() else {
            return EmptySnafu.fail();
        };
        ensure!(
            steps.len() == usize::from(count),
            InvalidSizeSnafu {
                expected: 1 + usize::from(count),
                actual: data.len(),
            }
        );

        Self::new(steps.to_vec(), num_channels)
    }
}

/// Rounds `value / step` to the nearest integer, halves away from zero.
#[inline]
pub fn quantize(value: i32, step: u8) -> i16 {
    let step = i32::from(step.max(1));
    let half = step / 2;
    let index = if value < 0 {
        -((-value + half) / step)
    } else {
        (value + half) / step
    };
    index.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

#[inline]
pub fn dequantize(index: i16, step: u8) -> i16 {
    (i32::from(index) * i32::from(step)).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}
