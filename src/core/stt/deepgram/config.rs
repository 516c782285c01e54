//! Deepgram connection configuration and URL construction.

use url::Url;

use crate::core::stt::base::SttConfig;

/// Deepgram live API endpoint.
pub const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Short pause (ms) after which Deepgram finalizes the wording of a
/// fragment without ending the utterance.
pub const WORD_FINAL_ENDPOINTING_MS: u32 = 300;

/// Long silence (ms) after which Deepgram emits the utterance boundary.
pub const UTTERANCE_END_MS: u32 = 1_000;

/// Configuration for the Deepgram streaming connection.
#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub base: SttConfig,
    /// Live API endpoint; overridable so tests can point at a local server.
    pub listen_url: String,
    /// Short-pause endpointing window in milliseconds.
    pub endpointing_ms: u32,
    /// Utterance-boundary silence window in milliseconds.
    pub utterance_end_ms: u32,
    /// Request interim (non-final) transcript fragments.
    pub interim_results: bool,
    /// Request automatic punctuation.
    pub punctuate: bool,
}

impl DeepgramConfig {
    pub fn from_base(base: SttConfig) -> Self {
        Self {
            base,
            listen_url: DEEPGRAM_LISTEN_URL.to_string(),
            endpointing_ms: WORD_FINAL_ENDPOINTING_MS,
            utterance_end_ms: UTTERANCE_END_MS,
            interim_results: true,
            punctuate: true,
        }
    }

    /// Build the full WebSocket URL with query parameters.
    pub fn build_websocket_url(&self) -> String {
        let mut url = Url::parse(&self.listen_url).expect("listen URL is valid");
        url.query_pairs_mut()
            .append_pair("model", &self.base.model)
            .append_pair("language", &self.base.language)
            .append_pair("encoding", &self.base.encoding)
            .append_pair("sample_rate", &self.base.sample_rate.to_string())
            .append_pair("channels", "1")
            .append_pair("interim_results", &self.interim_results.to_string())
            .append_pair("punctuate", &self.punctuate.to_string())
            .append_pair("endpointing", &self.endpointing_ms.to_string())
            .append_pair("utterance_end_ms", &self.utterance_end_ms.to_string())
            .append_pair("vad_events", "true");
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_generation() {
        let config = DeepgramConfig::from_base(SttConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        });
        let url = config.build_websocket_url();

        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("model=nova-2"));
        assert!(url.contains("encoding=linear16"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("endpointing=300"));
        assert!(url.contains("utterance_end_ms=1000"));
        assert!(url.contains("interim_results=true"));
    }

    #[test]
    fn test_two_tier_endpointing_defaults() {
        let config = DeepgramConfig::from_base(SttConfig::default());
        assert!(config.endpointing_ms < config.utterance_end_ms);
        assert_eq!(config.endpointing_ms, 300);
        assert_eq!(config.utterance_end_ms, 1_000);
    }
}
