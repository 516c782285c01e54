//! Format conversion between transport frames and provider PCM.
//!
//! Inbound: μ-law 8 kHz (transport) -> PCM16 16 kHz little-endian (recognizer).
//! Outbound: PCM16 little-endian at a provider rate -> μ-law 8 kHz frames.

use super::mulaw;
use super::resample;

/// Telephony codec sample rate (G.711 μ-law).
pub const TRANSPORT_SAMPLE_RATE: u32 = 8_000;

/// Sample rate the recognizer expects.
pub const RECOGNIZER_SAMPLE_RATE: u32 = 16_000;

/// Sample rate requested from the synthesizer.
pub const SYNTHESIZER_SAMPLE_RATE: u32 = 16_000;

/// Duration of one transport media frame.
pub const FRAME_DURATION_MS: u64 = 20;

/// Bytes per transport frame: 20 ms of 8 kHz μ-law, one byte per sample.
pub const TRANSPORT_FRAME_BYTES: usize = 160;

/// Convert a μ-law transport payload to recognizer PCM.
///
/// Decodes μ-law to 16-bit linear and doubles the rate to 16 kHz. The
/// output is little-endian byte order, four output bytes per input byte.
/// Empty input yields empty output.
pub fn to_recognizer_format(mulaw_payload: &[u8]) -> Vec<u8> {
    let pcm_8k = mulaw::decode(mulaw_payload);
    let pcm_16k = resample::upsample_2x(&pcm_8k);
    pcm_to_le_bytes(&pcm_16k)
}

/// Convert provider PCM to μ-law transport bytes.
///
/// `input_rate` must be a multiple of the 8 kHz transport rate (16 kHz and
/// 24 kHz in practice). A trailing odd byte from a malformed PCM stream is
/// ignored. Empty input yields empty output.
pub fn to_transport_format(pcm_le: &[u8], input_rate: u32) -> Vec<u8> {
    debug_assert!(
        input_rate >= TRANSPORT_SAMPLE_RATE && input_rate % TRANSPORT_SAMPLE_RATE == 0,
        "unsupported synthesizer rate {input_rate}"
    );
    let factor = (input_rate / TRANSPORT_SAMPLE_RATE).max(1) as usize;
    let pcm = le_bytes_to_pcm(pcm_le);
    let pcm_8k = resample::downsample(&pcm, factor);
    mulaw::encode(&pcm_8k)
}

/// Split a μ-law byte stream into fixed 20 ms transport frames.
///
/// The final frame is padded with μ-law silence so every emitted frame is
/// exactly [`TRANSPORT_FRAME_BYTES`] long and outbound pacing stays uniform.
pub fn frame_for_transport(mulaw_stream: &[u8]) -> Vec<Vec<u8>> {
    mulaw_stream
        .chunks(TRANSPORT_FRAME_BYTES)
        .map(|chunk| {
            let mut frame = chunk.to_vec();
            frame.resize(TRANSPORT_FRAME_BYTES, mulaw::MULAW_SILENCE);
            frame
        })
        .collect()
}

/// Produce `duration_ms` of μ-law silence at the transport rate.
pub fn silence(duration_ms: u64) -> Vec<u8> {
    let samples = (TRANSPORT_SAMPLE_RATE as u64 * duration_ms / 1000) as usize;
    vec![mulaw::MULAW_SILENCE; samples]
}

fn pcm_to_le_bytes(pcm: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

fn le_bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizer_format_scales_sample_count() {
        // One 20 ms frame: 160 μ-law bytes -> 320 samples -> 640 bytes.
        let frame = vec![0x55u8; TRANSPORT_FRAME_BYTES];
        let pcm = to_recognizer_format(&frame);
        assert_eq!(pcm.len(), TRANSPORT_FRAME_BYTES * 4);
    }

    #[test]
    fn test_zero_length_input_is_zero_length_output() {
        assert!(to_recognizer_format(&[]).is_empty());
        assert!(to_transport_format(&[], SYNTHESIZER_SAMPLE_RATE).is_empty());
        assert!(frame_for_transport(&[]).is_empty());
    }

    #[test]
    fn test_transport_format_from_16k() {
        // 320 samples at 16 kHz (640 bytes) -> 160 μ-law bytes (20 ms).
        let pcm_le = vec![0u8; 640];
        let mulaw = to_transport_format(&pcm_le, 16_000);
        assert_eq!(mulaw.len(), TRANSPORT_FRAME_BYTES);
    }

    #[test]
    fn test_transport_format_from_24k() {
        // 480 samples at 24 kHz -> 160 samples at 8 kHz.
        let pcm_le = vec![0u8; 960];
        let mulaw = to_transport_format(&pcm_le, 24_000);
        assert_eq!(mulaw.len(), TRANSPORT_FRAME_BYTES);
    }

    #[test]
    fn test_round_trip_preserves_total_sample_count() {
        // Inbound then outbound across several frames keeps the 8 kHz
        // sample count exactly: no frame lost, none duplicated.
        let frames: Vec<Vec<u8>> = (0..10)
            .map(|i| vec![(i * 17) as u8; TRANSPORT_FRAME_BYTES])
            .collect();
        let mut total_out = 0usize;
        for frame in &frames {
            let pcm = to_recognizer_format(frame);
            let back = to_transport_format(&pcm, RECOGNIZER_SAMPLE_RATE);
            total_out += back.len();
        }
        assert_eq!(total_out, frames.len() * TRANSPORT_FRAME_BYTES);
    }

    #[test]
    fn test_framing_pads_final_frame_with_silence() {
        let stream = vec![0x12u8; TRANSPORT_FRAME_BYTES + 40];
        let frames = frame_for_transport(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), TRANSPORT_FRAME_BYTES);
        assert_eq!(frames[1].len(), TRANSPORT_FRAME_BYTES);
        assert_eq!(frames[1][40], MULAW_SILENCE_BYTE);
        assert_eq!(frames[1][..40], stream[TRANSPORT_FRAME_BYTES..]);
    }

    #[test]
    fn test_framing_preserves_order_and_content() {
        let stream: Vec<u8> = (0..480).map(|i| (i % 251) as u8).collect();
        let frames = frame_for_transport(&stream);
        let rejoined: Vec<u8> = frames.concat();
        assert_eq!(rejoined, stream);
    }

    #[test]
    fn test_silence_duration() {
        assert_eq!(silence(20).len(), TRANSPORT_FRAME_BYTES);
        assert_eq!(silence(500).len(), 4_000);
        assert!(silence(500).iter().all(|&b| b == MULAW_SILENCE_BYTE));
    }

    const MULAW_SILENCE_BYTE: u8 = super::mulaw::MULAW_SILENCE;
}
