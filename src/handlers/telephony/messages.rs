//! Carrier media stream wire messages.
//!
//! Twilio Media Streams speaks JSON text frames over the WebSocket, with
//! audio as base64 mu-law inside `media` events. Inbound frames are
//! parsed by their `event` discriminator; outbound frames are built here
//! so the handler never assembles JSON inline.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;

/// A parsed inbound frame from the media stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// Protocol handshake, sent once before `start`.
    Connected,
    /// Stream metadata, sent once when media begins flowing.
    Start(StartMeta),
    /// One chunk of caller audio.
    Media(MediaPayload),
    /// The carrier stopped the stream (caller hung up or call ended).
    Stop,
    /// Echo of a playback mark we sent.
    Mark(MarkMeta),
    /// Anything this handler does not act on.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
    /// Parameters set on the `<Stream>` TwiML verb, including the
    /// caller's number under `from`.
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StartMeta {
    pub fn caller_number(&self) -> Option<&str> {
        self.custom_parameters
            .get("from")
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    /// Stream direction; absent on inbound-only streams.
    #[serde(default)]
    pub track: Option<String>,
    /// Base64-encoded mu-law audio.
    pub payload: String,
}

impl MediaPayload {
    /// Caller audio. On bidirectional streams the carrier also echoes our
    /// own synthesized audio back as `outbound` frames, which must never
    /// reach the recognizer.
    pub fn is_inbound(&self) -> bool {
        self.track.as_deref().is_none_or(|track| track == "inbound")
    }

    /// Decode the base64 payload into raw mu-law bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.payload)
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkMeta {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct EventProbe {
    event: String,
}

#[derive(Debug, Deserialize)]
struct StartEnvelope {
    start: StartMeta,
}

#[derive(Debug, Deserialize)]
struct MediaEnvelope {
    media: MediaPayload,
}

#[derive(Debug, Deserialize)]
struct MarkEnvelope {
    mark: MarkMeta,
}

impl StreamEvent {
    /// Parse a raw text frame from the media stream WebSocket.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let probe: EventProbe = serde_json::from_str(raw)?;
        Ok(match probe.event.as_str() {
            "connected" => StreamEvent::Connected,
            "start" => {
                let envelope: StartEnvelope = serde_json::from_str(raw)?;
                StreamEvent::Start(envelope.start)
            }
            "media" => {
                let envelope: MediaEnvelope = serde_json::from_str(raw)?;
                StreamEvent::Media(envelope.media)
            }
            "stop" => StreamEvent::Stop,
            "mark" => {
                let envelope: MarkEnvelope = serde_json::from_str(raw)?;
                StreamEvent::Mark(envelope.mark)
            }
            other => StreamEvent::Unknown(other.to_string()),
        })
    }
}

/// Outbound `media` frame carrying one mu-law chunk.
pub fn media_event(stream_sid: &str, mulaw: &[u8]) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": BASE64.encode(mulaw) },
    })
    .to_string()
}

/// Outbound `mark` frame; the carrier echoes it back after playback.
pub fn mark_event(stream_sid: &str, name: &str) -> String {
    json!({
        "event": "mark",
        "streamSid": stream_sid,
        "mark": { "name": name },
    })
    .to_string()
}

/// Outbound `clear` frame, discarding any audio the carrier has buffered
/// but not yet played.
pub fn clear_event(stream_sid: &str) -> String {
    json!({
        "event": "clear",
        "streamSid": stream_sid,
    })
    .to_string()
}
