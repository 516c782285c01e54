//! Utterance aggregation over two-tier recognizer endpointing.
//!
//! Word-final fragments (`is_final`) lock in wording after short pauses
//! mid-sentence; the utterance boundary (`speech_final`) arrives after the
//! longer silence window. Fragments are buffered until the boundary, then
//! flushed as one utterance so the agent sees whole sentences.

use crate::core::stt::SttResult;

/// One complete caller utterance. `seq` increases strictly per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub seq: u64,
}

/// Accumulates finalized transcript fragments into complete utterances.
#[derive(Debug, Default)]
pub struct UtteranceAggregator {
    pending: Vec<String>,
    next_seq: u64,
}

impl UtteranceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one recognizer event. Returns the completed utterance when this
    /// event closes one, `None` otherwise. Interim (non-final) fragments are
    /// ignored; the recognizer may still revise them.
    pub fn push(&mut self, result: &SttResult) -> Option<Utterance> {
        if result.is_final && !result.transcript.trim().is_empty() {
            self.pending.push(result.transcript.trim().to_string());
        }
        if result.speech_final { self.flush() } else { None }
    }

    /// Flush whatever has accumulated, boundary or not. Used at call end to
    /// capture a trailing fragment the silence timer never closed.
    pub fn flush(&mut self) -> Option<Utterance> {
        if self.pending.is_empty() {
            return None;
        }
        let text = self.pending.join(" ");
        self.pending.clear();
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(Utterance { text, seq })
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
