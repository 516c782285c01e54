//! Sample-rate conversion for 16-bit mono PCM.
//!
//! The pipeline only crosses integer rate ratios (8 kHz telephony against
//! 16 kHz provider audio), so a linear-interpolating doubler and an
//! averaging decimator are sufficient and fully deterministic.

/// Double the sample rate by linear interpolation.
///
/// Every input sample appears in the output, with one interpolated sample
/// between each adjacent pair; the final midpoint repeats the last sample.
/// Output length is exactly `2 * input.len()`.
pub fn upsample_2x(input: &[i16]) -> Vec<i16> {
    let mut output = Vec::with_capacity(input.len() * 2);
    for (i, &sample) in input.iter().enumerate() {
        output.push(sample);
        let next = input.get(i + 1).copied().unwrap_or(sample);
        output.push(((sample as i32 + next as i32) / 2) as i16);
    }
    output
}

/// Reduce the sample rate by an integer factor, averaging each group.
///
/// A trailing partial group is averaged over its actual length so no input
/// sample is discarded. Output length is `input.len().div_ceil(factor)`.
///
/// # Panics
///
/// Panics if `factor` is zero.
pub fn downsample(input: &[i16], factor: usize) -> Vec<i16> {
    assert!(factor > 0, "downsample factor must be non-zero");
    if factor == 1 {
        return input.to_vec();
    }
    input
        .chunks(factor)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            (sum / group.len() as i32) as i16
        })
        .collect()
}
