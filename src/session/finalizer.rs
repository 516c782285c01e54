//! Idempotent call teardown.
//!
//! Finalization can be triggered from several places that race with each
//! other: the carrier's stop event, the socket closing, the idle timeout,
//! and server shutdown. The session's finalize flag is claimed atomically
//! so exactly one of them runs the teardown.

use std::sync::Arc;

use tracing::{info, warn};

use super::{CallSession, SessionRegistry};
use crate::services::directory::DirectoryClient;

/// What triggered the teardown, for the call-end log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    StreamStopped,
    SocketClosed,
    IdleTimeout,
    Shutdown,
}

impl FinalizeReason {
    fn as_str(&self) -> &'static str {
        match self {
            FinalizeReason::StreamStopped => "stream stopped",
            FinalizeReason::SocketClosed => "socket closed",
            FinalizeReason::IdleTimeout => "idle timeout",
            FinalizeReason::Shutdown => "server shutdown",
        }
    }
}

/// Tear down one call: capture the transcript tail, persist the
/// conversation, drop the session from the registry, and cancel all of
/// its tasks. Later invocations for the same session are no-ops.
pub async fn finalize_call(
    session: &Arc<CallSession>,
    registry: &SessionRegistry,
    directory: Option<&DirectoryClient>,
    reason: FinalizeReason,
) {
    if !session.begin_finalize() {
        return;
    }

    // A fragment the silence timer never closed still belongs to the
    // caller's side of the transcript, marked as unconfirmed wording.
    if let Some(tail) = session.drain_pending_utterance() {
        session.record_unconfirmed_caller_line(&tail.text);
    }

    session.cancel_token().cancel();

    let record = session.to_record();
    info!(
        "Finalizing call {} ({}): {} transcript lines, {}s",
        session.call_sid,
        reason.as_str(),
        record.transcript.len(),
        record.duration_seconds
    );

    if let Some(directory) = directory
        && let Err(e) = directory.store_conversation(&record).await
    {
        warn!(
            "Could not persist conversation for call {}: {}; transcript follows\n{}",
            session.call_sid,
            e,
            record.summary()
        );
    }

    registry.remove(&session.call_sid);
}
