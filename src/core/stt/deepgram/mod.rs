//! Deepgram streaming STT connector.
//!
//! One WebSocket connection per call against the Deepgram live API.
//! Endpointing is two-tier: `endpointing=300` finalizes wording after a
//! short pause, `utterance_end_ms=1000` marks the utterance boundary.

mod client;
mod config;
mod messages;

pub use client::DeepgramStt;
pub use config::DeepgramConfig;
pub use messages::DeepgramMessage;
