//! Per-call session state and lifecycle.
//!
//! One [`CallSession`] exists per active phone call, shared between the
//! media WebSocket handler, the recognizer callbacks, the turn manager,
//! and the finalizer. Synchronous fields use short-held `parking_lot`
//! locks; lifecycle flags are atomics so hot paths never block.

mod aggregator;
mod finalizer;
mod registry;
mod turn;

pub use aggregator::{Utterance, UtteranceAggregator};
pub use finalizer::{FinalizeReason, finalize_call};
pub use registry::SessionRegistry;
pub use turn::{OutboundAudio, TurnExit, TurnInput, TurnManager};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::stt::SttResult;
use crate::services::directory::{
    CallerProfile, ConversationRecord, TranscriptEntry, TranscriptRole, unix_now,
};

/// State for one active phone call.
pub struct CallSession {
    pub call_sid: String,
    pub course_id: String,
    started_at: u64,
    stream_sid: Mutex<Option<String>>,
    caller_number: Mutex<Option<String>>,
    caller: Mutex<Option<CallerProfile>>,
    /// Summaries of the caller's past conversations, for agent context.
    recent_context: Mutex<Vec<String>>,
    transcript: Mutex<Vec<TranscriptEntry>>,
    aggregator: Mutex<UtteranceAggregator>,
    /// Set when the recognizer is permanently gone; caller audio is
    /// dropped for the rest of the call.
    degraded: AtomicBool,
    turn_in_flight: AtomicBool,
    finalized: AtomicBool,
    cancel: CancellationToken,
}

impl CallSession {
    pub fn new(call_sid: String, course_id: String) -> Arc<Self> {
        Arc::new(Self {
            call_sid,
            course_id,
            started_at: unix_now(),
            stream_sid: Mutex::new(None),
            caller_number: Mutex::new(None),
            caller: Mutex::new(None),
            recent_context: Mutex::new(Vec::new()),
            transcript: Mutex::new(Vec::new()),
            aggregator: Mutex::new(UtteranceAggregator::new()),
            degraded: AtomicBool::new(false),
            turn_in_flight: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn set_stream_sid(&self, stream_sid: String) {
        *self.stream_sid.lock() = Some(stream_sid);
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.lock().clone()
    }

    pub fn set_caller_number(&self, number: String) {
        *self.caller_number.lock() = Some(number);
    }

    pub fn caller_number(&self) -> Option<String> {
        self.caller_number.lock().clone()
    }

    /// Attach the identified caller and their conversation context.
    pub fn set_caller(&self, profile: CallerProfile, context: Vec<String>) {
        debug!(
            "Identified caller {} for call {}",
            profile.id, self.call_sid
        );
        *self.caller.lock() = Some(profile);
        *self.recent_context.lock() = context;
    }

    pub fn caller(&self) -> Option<CallerProfile> {
        self.caller.lock().clone()
    }

    pub fn recent_context(&self) -> Vec<String> {
        self.recent_context.lock().clone()
    }

    /// Feed one recognizer event through the aggregator. Returns the
    /// completed utterance when this event closes one.
    pub fn push_transcript_event(&self, result: &SttResult) -> Option<Utterance> {
        self.aggregator.lock().push(result)
    }

    /// Flush any fragment the silence timer never closed.
    pub fn drain_pending_utterance(&self) -> Option<Utterance> {
        self.aggregator.lock().flush()
    }

    pub fn record_caller_line(&self, text: &str) {
        self.transcript.lock().push(TranscriptEntry {
            role: TranscriptRole::Caller,
            text: text.to_string(),
            unconfirmed: false,
        });
    }

    /// Record a trailing caller fragment that never reached an utterance
    /// boundary before the call ended.
    pub fn record_unconfirmed_caller_line(&self, text: &str) {
        self.transcript.lock().push(TranscriptEntry {
            role: TranscriptRole::Caller,
            text: text.to_string(),
            unconfirmed: true,
        });
    }

    pub fn record_assistant_line(&self, text: &str) {
        self.transcript.lock().push(TranscriptEntry {
            role: TranscriptRole::Assistant,
            text: text.to_string(),
            unconfirmed: false,
        });
    }

    pub fn transcript_len(&self) -> usize {
        self.transcript.lock().len()
    }

    /// Snapshot the call as a persistable record.
    pub fn to_record(&self) -> ConversationRecord {
        let ended_at = unix_now();
        ConversationRecord {
            call_sid: self.call_sid.clone(),
            course_id: self.course_id.clone(),
            caller_id: self.caller.lock().as_ref().map(|c| c.id.clone()),
            channel: "voice".to_string(),
            transcript: self.transcript.lock().clone(),
            duration_seconds: ended_at.saturating_sub(self.started_at),
            started_at: self.started_at,
            ended_at,
        }
    }

    pub fn set_degraded(&self) {
        self.degraded.store(true, Ordering::Release);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn set_turn_in_flight(&self, in_flight: bool) {
        self.turn_in_flight.store(in_flight, Ordering::Release);
    }

    pub fn turn_in_flight(&self) -> bool {
        self.turn_in_flight.load(Ordering::Acquire)
    }

    /// Claim finalization. Returns true exactly once per session.
    pub fn begin_finalize(&self) -> bool {
        !self.finalized.swap(true, Ordering::AcqRel)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
