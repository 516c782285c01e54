//! ElevenLabs synthesis over the streaming HTTP endpoint.
//!
//! Requests raw PCM16 at the configured rate so no container parsing is
//! needed before the audio bridge converts it for transport.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use super::config::ElevenLabsConfig;
use crate::core::tts::base::{BaseTts, TtsConfig, TtsError, TtsResult};

/// End-to-end deadline for one synthesis request.
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(15);

/// ElevenLabs TTS provider with a pooled HTTP client.
pub struct ElevenLabsTts {
    config: ElevenLabsConfig,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    pub fn with_config(config: ElevenLabsConfig) -> TtsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(SYNTHESIS_TIMEOUT)
            .build()
            .map_err(|e| TtsError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn build_request(&self, text: &str) -> reqwest::RequestBuilder {
        let body = json!({
            "text": text,
            "model_id": self.config.base.model,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
            },
        });

        self.client
            .post(self.config.synthesis_url())
            .header("xi-api-key", &self.config.base.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
    }
}

#[async_trait::async_trait]
impl BaseTts for ElevenLabsTts {
    fn new(config: TtsConfig) -> TtsResult<Self> {
        Self::with_config(ElevenLabsConfig::from_base(config)?)
    }

    async fn synthesize(&self, text: &str) -> TtsResult<Vec<u8>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response = self.build_request(text).send().await.map_err(|e| {
            if e.is_timeout() {
                TtsError::Timeout(SYNTHESIS_TIMEOUT)
            } else {
                TtsError::NetworkError(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("ElevenLabs synthesis failed with {}: {}", status, message);
            return Err(match status.as_u16() {
                401 | 403 => TtsError::AuthenticationFailed(message),
                code => TtsError::ProviderError { status: code, message },
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| TtsError::NetworkError(format!("failed to read audio body: {e}")))?;

        // Odd-length PCM16 means a truncated body.
        if audio.len() % 2 != 0 {
            return Err(TtsError::NetworkError(format!(
                "truncated PCM response of {} bytes",
                audio.len()
            )));
        }

        debug!(
            "Synthesized {} chars into {} PCM bytes",
            text.len(),
            audio.len()
        );
        Ok(audio.to_vec())
    }

    fn get_provider_info(&self) -> &'static str {
        "ElevenLabs Streaming TTS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server_url: &str) -> ElevenLabsTts {
        let mut config = ElevenLabsConfig::from_base(TtsConfig {
            api_key: "test_key".to_string(),
            voice_id: "test_voice".to_string(),
            ..Default::default()
        })
        .unwrap();
        config.base_url = server_url.to_string();
        ElevenLabsTts::with_config(config).unwrap()
    }

    #[tokio::test]
    async fn test_synthesize_returns_pcm_bytes() {
        let server = MockServer::start().await;
        let pcm = vec![0u8, 1, 2, 3, 4, 5];

        Mock::given(method("POST"))
            .and(path("/test_voice/stream"))
            .and(query_param("output_format", "pcm_16000"))
            .and(header("xi-api-key", "test_key"))
            .and(body_partial_json(json!({"text": "hello there"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(pcm.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let tts = provider_for(&server.uri());
        let audio = tts.synthesize("hello there").await.unwrap();
        assert_eq!(audio, pcm);
    }

    #[tokio::test]
    async fn test_empty_text_skips_request() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would 404 and fail the call.
        let tts = provider_for(&server.uri());
        let audio = tts.synthesize("   ").await.unwrap();
        assert!(audio.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let tts = provider_for(&server.uri());
        let result = tts.synthesize("hello").await;
        match result {
            Err(TtsError::AuthenticationFailed(msg)) => assert!(msg.contains("invalid api key")),
            other => panic!("expected AuthenticationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream busy"))
            .mount(&server)
            .await;

        let tts = provider_for(&server.uri());
        match tts.synthesize("hello").await {
            Err(TtsError::ProviderError { status, message }) => {
                assert_eq!(status, 500);
                assert!(message.contains("upstream busy"));
            }
            other => panic!("expected ProviderError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_pcm_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 3]))
            .mount(&server)
            .await;

        let tts = provider_for(&server.uri());
        assert!(matches!(
            tts.synthesize("hello").await,
            Err(TtsError::NetworkError(_))
        ));
    }

    #[test]
    fn test_request_body_includes_voice_settings() {
        let tts = provider_for("https://api.elevenlabs.io/v1/text-to-speech");
        let request = tts.build_request("good morning").build().unwrap();
        let body = request.body().unwrap().as_bytes().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(body).unwrap();

        assert_eq!(parsed["text"], "good morning");
        assert_eq!(parsed["model_id"], "eleven_turbo_v2");
        assert!(parsed["voice_settings"]["stability"].is_number());
    }
}
