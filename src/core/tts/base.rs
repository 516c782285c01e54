//! Common types and the provider trait for speech synthesis.

use thiserror::Error;

/// Errors surfaced by a synthesizer provider.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("TTS network error: {0}")]
    NetworkError(String),

    #[error("TTS provider error (status {status}): {message}")]
    ProviderError { status: u16, message: String },

    #[error("invalid TTS configuration: {0}")]
    InvalidConfiguration(String),

    #[error("TTS request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type TtsResult<T> = Result<T, TtsError>;

/// Configuration shared by synthesizer providers.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub model: String,
    /// Output sample rate for raw PCM responses.
    pub sample_rate: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: String::new(),
            model: "eleven_turbo_v2".to_string(),
            sample_rate: 16_000,
        }
    }
}

/// Text-to-speech provider. Synthesis is request/response: one text in,
/// one complete PCM16 little-endian buffer out at `sample_rate`.
#[async_trait::async_trait]
pub trait BaseTts: Send + Sync {
    fn new(config: TtsConfig) -> TtsResult<Self>
    where
        Self: Sized;

    /// Synthesize `text` into PCM16 LE audio at the configured rate.
    async fn synthesize(&self, text: &str) -> TtsResult<Vec<u8>>;

    fn get_provider_info(&self) -> &'static str;
}
