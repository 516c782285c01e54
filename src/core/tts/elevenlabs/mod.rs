//! ElevenLabs HTTP synthesis provider.

mod config;
mod provider;

pub use config::{ELEVENLABS_TTS_URL, ElevenLabsConfig};
pub use provider::ElevenLabsTts;
