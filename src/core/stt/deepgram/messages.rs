//! Deepgram live API message types.

use serde::Deserialize;

use crate::core::stt::base::SttResult;

/// A parsed message from the Deepgram live WebSocket.
#[derive(Debug)]
pub enum DeepgramMessage {
    /// Transcript results for a stretch of audio.
    Results(ResultsMessage),
    /// Silence-based utterance boundary (no new words).
    UtteranceEnd,
    /// Speech activity started.
    SpeechStarted,
    /// Stream metadata sent on open and close.
    Metadata,
    /// Anything this client does not act on.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
pub struct ResultsMessage {
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct TypeProbe {
    #[serde(rename = "type")]
    message_type: String,
}

impl DeepgramMessage {
    /// Parse a raw text frame from the WebSocket.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let probe: TypeProbe = serde_json::from_str(raw)?;
        Ok(match probe.message_type.as_str() {
            "Results" => DeepgramMessage::Results(serde_json::from_str(raw)?),
            "UtteranceEnd" => DeepgramMessage::UtteranceEnd,
            "SpeechStarted" => DeepgramMessage::SpeechStarted,
            "Metadata" => DeepgramMessage::Metadata,
            other => DeepgramMessage::Unknown(other.to_string()),
        })
    }
}

impl ResultsMessage {
    /// Convert to the provider-agnostic result, taking the top alternative.
    pub fn into_stt_result(self) -> SttResult {
        let (transcript, confidence) = self
            .channel
            .alternatives
            .into_iter()
            .next()
            .map(|alt| (alt.transcript, alt.confidence))
            .unwrap_or_default();
        SttResult::new(transcript, self.is_final, self.speech_final, confidence)
    }
}
