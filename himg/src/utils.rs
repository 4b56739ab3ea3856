/// Clamps an intermediate sample value into the 8-bit output range.
#[inline]
pub const fn clamp_u8(value: i32) -> u8 {
    if value < 0 {
        0
    } else if value > 255 {
        255
    } else {
        value as u8
    }
}

/// Converts an RGB pixel into full-range BT.601 YCbCr (16-bit fixed point).
#[inline]
pub const fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);

    let y = (19595 * r + 38470 * g + 7471 * b + 32768) >> 16;
    let cb = ((-11059 * r - 21709 * g + 32768 * b + 32768) >> 16) + 128;
    let cr = ((32768 * r - 27439 * g - 5329 * b + 32768) >> 16) + 128;

    [clamp_u8(y), clamp_u8(cb), clamp_u8(cr)]
}

/// Converts a full-range BT.601 YCbCr pixel back into RGB.
#[inline]
pub const fn ycbcr_to_rgb([y, cb, cr]: [u8; 3]) -> [u8; 3] {
    let y = y as i32;
    let cb = cb as i32 - 128;
    let cr = cr as i32 - 128;

    let r = y + ((91881 * cr + 32768) >> 16);
    let g = y + ((-22554 * cb - 46802 * cr + 32768) >> 16);
    let b = y + ((116130 * cb + 32768) >> 16);

    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

/// Converts the first three channels of every interleaved pixel to YCbCr, in place.
pub fn forward_color_transform(pixels: &mut [u8], num_channels: usize) {
    debug_assert!(num_channels >= 3);
    for pixel in pixels.chunks_exact_mut(num_channels) {
        let [y, cb, cr] = rgb_to_ycbcr([pixel[0], pixel[1], pixel[2]]);
        pixel[..3].copy_from_slice(&[y, cb, cr]);
    }
}

/// Converts the first three channels of every interleaved pixel back to RGB, in place.
pub fn inverse_color_transform(pixels: &mut [u8], num_channels: usize) {
    debug_assert!(num_channels >= 3);
    for pixel in pixels.chunks_exact_mut(num_channels) {
        let [r, g, b] = ycbcr_to_rgb([pixel[0], pixel[1], pixel[2]]);
        pixel[..3].copy_from_slice(&[r, g, b]);
    }
}
