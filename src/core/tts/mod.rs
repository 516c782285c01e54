mod base;
pub mod elevenlabs;

pub use base::{BaseTts, TtsConfig, TtsError, TtsResult};
pub use elevenlabs::{ELEVENLABS_TTS_URL, ElevenLabsConfig, ElevenLabsTts};
