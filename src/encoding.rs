//! Fixed-point packing of a `[0, 1)` ratio across the four channels of an
//! `Rgba8Unorm` texel, base-255 digits most significant first. Mirrors
//! `pack_ratio`/`unpack_ratio` in `accumulate.wgsl`.
//!
//! Only needed because accumulation targets are 8-bit; a float target would
//! store the ratio directly.

/// Largest value that survives a pack round trip without wrapping to zero.
pub const MAX_PACKABLE: f64 = 1.0 - 1.0 / 16_581_375.0;

/// Decoded ratios at or above this snap to exactly 1.
pub const SNAP_TO_ONE: f32 = 0.999;

const CHANNEL_SCALE: [f64; 4] = [1.0, 255.0, 65_025.0, 16_581_375.0];


pub fn pack_ratio(value: f32) -> [u8; 4] {
    let mut remainder = (value as f64).clamp(0.0, MAX_PACKABLE);
    let mut texel = [0u8; 4];
    for channel in texel.iter_mut() {
        remainder *= 255.0;
        let digit = remainder.floor().min(254.0);
        *channel = digit as u8;
        remainder -= digit;
    }
    texel
}

pub fn unpack_ratio(texel: [u8; 4]) -> f32 {
    texel
        .iter()
        .zip(CHANNEL_SCALE)
        .map(|(&channel, scale)| channel as f64 / 255.0 / scale)
        .sum::<f64>() as f32
}

/// `unpack_ratio` with round-off near 1 absorbed.
pub fn decode_ratio(texel: [u8; 4]) -> f32 {
    let ratio = unpack_ratio(texel);
    if ratio >= SNAP_TO_ONE {
        1.0
    } else {
        ratio.max(0.0)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_exceeds_a_single_channel() {
        for value in [0.0_f32, 0.1, 0.333_333, 0.5, 0.750_123, 0.998] {
            let decoded = unpack_ratio(pack_ratio(value));
            assert!((decoded - value).abs() < 1e-6, "{value} -> {decoded}");
        }
    }

    #[test]
    fn one_does_not_wrap_to_zero() {
        assert_eq!(decode_ratio(pack_ratio(1.0)), 1.0);
        assert_eq!(decode_ratio(pack_ratio(1.000_001)), 1.0);
        assert!(unpack_ratio(pack_ratio(1.0)) > 0.999_99);
    }

    #[test]
    fn repeated_accumulation_stays_within_tolerance() {
        let steps = 120;
        let weight = 1.0 / steps as f32;
        let mut texel = [0u8; 4];
        for _ in 0..steps {
            texel = pack_ratio(unpack_ratio(texel) + weight);
        }
        assert!((unpack_ratio(texel) - 1.0).abs() < 0.002);
        assert_eq!(decode_ratio(texel), 1.0);
    }

    #[test]
    fn zero_texel_is_zero() {
        assert_eq!(decode_ratio([0, 0, 0, 0]), 0.0);
    }
}
