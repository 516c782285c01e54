//! ElevenLabs configuration and endpoint construction.

use crate::core::tts::base::{TtsConfig, TtsError, TtsResult};

/// ElevenLabs text-to-speech API base URL.
pub const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Voice stability setting (0.0 to 1.0).
const DEFAULT_STABILITY: f32 = 0.5;

/// Voice similarity boost setting (0.0 to 1.0).
const DEFAULT_SIMILARITY_BOOST: f32 = 0.75;

/// Configuration for the ElevenLabs provider.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub base: TtsConfig,
    /// API base URL, overridable for tests.
    pub base_url: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl ElevenLabsConfig {
    pub fn from_base(base: TtsConfig) -> TtsResult<Self> {
        if base.api_key.is_empty() {
            return Err(TtsError::AuthenticationFailed(
                "API key is required for ElevenLabs TTS".to_string(),
            ));
        }
        if base.voice_id.is_empty() {
            return Err(TtsError::InvalidConfiguration(
                "voice_id is required for ElevenLabs TTS".to_string(),
            ));
        }
        Ok(Self {
            base,
            base_url: ELEVENLABS_TTS_URL.to_string(),
            stability: DEFAULT_STABILITY,
            similarity_boost: DEFAULT_SIMILARITY_BOOST,
        })
    }

    /// Raw PCM16 output format selector understood by the API.
    pub fn output_format(&self) -> String {
        format!("pcm_{}", self.base.sample_rate)
    }

    /// Full streaming synthesis URL for the configured voice.
    pub fn synthesis_url(&self) -> String {
        format!(
            "{}/{}/stream?output_format={}",
            self.base_url,
            self.base.voice_id,
            self.output_format()
        )
    }
}
