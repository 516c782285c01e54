//! G.711 μ-law codec.
//!
//! Implements the ITU-T G.711 μ-law companding scheme used by the telephony
//! transport: 8-bit logarithmic samples covering the 14-bit linear range.

/// The μ-law code for digital silence (linear zero).
pub const MULAW_SILENCE: u8 = 0xFF;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;

/// Encode one 16-bit linear PCM sample as a μ-law byte.
pub fn encode_sample(pcm: i16) -> u8 {
    let mut sample = pcm as i32;
    let sign: u8 = if sample < 0 {
        sample = -sample;
        0x80
    } else {
        0
    };
    if sample > CLIP {
        sample = CLIP;
    }
    sample += BIAS;

    // Segment number: position of the highest set bit above the mantissa.
    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (sample & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = ((sample >> (exponent as i32 + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Decode one μ-law byte to a 16-bit linear PCM sample.
pub fn decode_sample(mulaw: u8) -> i16 {
    let mulaw = !mulaw;
    let sign = mulaw & 0x80;
    let exponent = ((mulaw >> 4) & 0x07) as i32;
    let mantissa = (mulaw & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -(magnitude as i16)
    } else {
        magnitude as i16
    }
}

/// Decode a μ-law byte buffer to 16-bit linear PCM samples.
pub fn decode(mulaw: &[u8]) -> Vec<i16> {
    mulaw.iter().map(|&b| decode_sample(b)).collect()
}

/// Encode 16-bit linear PCM samples as a μ-law byte buffer.
pub fn encode(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().map(|&s| encode_sample(s)).collect()
}
