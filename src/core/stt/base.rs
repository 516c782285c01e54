//! Common types and the provider trait for streaming speech recognition.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// Errors surfaced by a recognizer connector.
#[derive(Debug, Error)]
pub enum SttError {
    #[error("STT connection failed: {0}")]
    ConnectionFailed(String),

    #[error("STT authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("STT network error: {0}")]
    NetworkError(String),

    #[error("invalid audio format: {0}")]
    InvalidAudioFormat(String),

    #[error("STT provider error: {0}")]
    ProviderError(String),

    #[error("STT configuration error: {0}")]
    ConfigurationError(String),

    /// Terminal: reconnection attempts are exhausted. The session owning
    /// this connector must degrade to audio-drop mode.
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),
}

impl SttError {
    /// True when the connector will produce no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SttError::Unavailable(_))
    }
}

/// Configuration shared by recognizer connectors.
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub api_key: String,
    pub language: String,
    pub sample_rate: u32,
    pub encoding: String,
    pub model: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: "en-US".to_string(),
            sample_rate: 16_000,
            encoding: "linear16".to_string(),
            model: "nova-2".to_string(),
        }
    }
}

/// One transcript event from the recognizer.
///
/// `is_final` locks in the wording of a fragment after a short pause
/// (the recognizer will not revise it further); `speech_final` marks the
/// utterance boundary after the longer endpointing silence. A result may
/// carry `speech_final` with an empty transcript when the boundary is
/// detected by the silence timer alone.
#[derive(Debug, Clone, PartialEq)]
pub struct SttResult {
    pub transcript: String,
    pub is_final: bool,
    pub speech_final: bool,
    pub confidence: f32,
}

impl SttResult {
    pub fn new(transcript: String, is_final: bool, speech_final: bool, confidence: f32) -> Self {
        Self {
            transcript,
            is_final,
            speech_final,
            confidence,
        }
    }

    /// Boundary-only event carrying no new words.
    pub fn utterance_end() -> Self {
        Self::new(String::new(), false, true, 0.0)
    }
}

/// Async callback invoked for each transcript event.
pub type SttResultCallback =
    Arc<dyn Fn(SttResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Async callback invoked for connector errors.
pub type SttErrorCallback =
    Arc<dyn Fn(SttError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Streaming speech-to-text provider, one instance per call.
#[async_trait::async_trait]
pub trait BaseStt: Send {
    /// Create an unconnected instance from configuration.
    fn new(config: SttConfig) -> Result<Self, SttError>
    where
        Self: Sized;

    /// Open the streaming connection.
    async fn connect(&mut self) -> Result<(), SttError>;

    /// Close the connection and release all resources. Idempotent.
    async fn disconnect(&mut self) -> Result<(), SttError>;

    /// True when audio can currently be fed.
    fn is_ready(&self) -> bool;

    /// Feed raw audio bytes in arrival order.
    async fn send_audio(&mut self, audio_data: Bytes) -> Result<(), SttError>;

    /// Register the transcript event callback.
    async fn on_result(&mut self, callback: SttResultCallback) -> Result<(), SttError>;

    /// Register the error callback.
    async fn on_error(&mut self, callback: SttErrorCallback) -> Result<(), SttError>;

    fn get_provider_info(&self) -> &'static str;
}
