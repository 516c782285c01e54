//! Audio codec bridge between the telephony transport and the speech providers.
//!
//! The phone network delivers G.711 μ-law at 8 kHz in 20 ms frames; the
//! recognizer consumes linear PCM at 16 kHz and the synthesizer produces
//! linear PCM at 16 kHz. Everything in this module is pure and stateless.

mod bridge;
mod mulaw;
mod resample;

pub use bridge::{
    FRAME_DURATION_MS, RECOGNIZER_SAMPLE_RATE, SYNTHESIZER_SAMPLE_RATE, TRANSPORT_FRAME_BYTES,
    TRANSPORT_SAMPLE_RATE, frame_for_transport, silence, to_recognizer_format, to_transport_format,
};
pub use mulaw::{MULAW_SILENCE, decode as mulaw_decode, encode as mulaw_encode};
pub use resample::{downsample, upsample_2x};
