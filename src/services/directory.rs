//! Client for the caller directory and conversation history service.
//!
//! Callers are identified by phone number on call start; finished calls are
//! persisted as [`ConversationRecord`]s. The service is optional, so every
//! failure here degrades the call to anonymous instead of failing it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PipelineError, PipelineResult};

/// How many past conversations to pull for agent context.
pub const RECENT_CONVERSATION_LIMIT: usize = 3;

/// A known caller in the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallerProfile {
    pub id: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    Caller,
    Assistant,
}

/// One line of dialogue in a finished conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub text: String,
    /// True for a trailing caller fragment the recognizer never closed
    /// with an utterance boundary.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unconfirmed: bool,
}

/// A completed call, as persisted to the history service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub call_sid: String,
    pub course_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    pub channel: String,
    pub transcript: Vec<TranscriptEntry>,
    pub duration_seconds: u64,
    /// Unix seconds.
    pub started_at: u64,
    /// Unix seconds.
    pub ended_at: u64,
}

impl ConversationRecord {
    /// Compact one-string rendering used as agent context and as the log
    /// dump when persistence fails.
    pub fn summary(&self) -> String {
        self.transcript
            .iter()
            .map(|entry| {
                let speaker = match (entry.role, entry.unconfirmed) {
                    (TranscriptRole::Caller, false) => "Caller",
                    (TranscriptRole::Caller, true) => "Caller (unconfirmed)",
                    (TranscriptRole::Assistant, _) => "Assistant",
                };
                format!("{speaker}: {}", entry.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Current time as unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// HTTP client for the directory/history service.
#[derive(Clone)]
pub struct DirectoryClient {
    base_url: String,
    client: reqwest::Client,
}

impl DirectoryClient {
    pub fn new(base_url: String) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| PipelineError::Directory(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Look up the caller by phone number, creating a profile on first call.
    pub async fn identify_or_create_caller(
        &self,
        phone_number: &str,
    ) -> PipelineResult<CallerProfile> {
        let url = format!("{}/callers/identify", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "phone_number": phone_number }))
            .send()
            .await
            .map_err(|e| PipelineError::Directory(format!("identify request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Directory(format!(
                "identify returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::Directory(format!("invalid caller profile: {e}")))
    }

    /// Fetch the caller's most recent conversations, newest first.
    pub async fn recent_conversations(
        &self,
        caller_id: &str,
    ) -> PipelineResult<Vec<ConversationRecord>> {
        let url = format!(
            "{}/callers/{}/conversations?limit={}",
            self.base_url, caller_id, RECENT_CONVERSATION_LIMIT
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::History(format!("history request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::History(format!("history returned {status}")));
        }

        let mut records: Vec<ConversationRecord> = response
            .json()
            .await
            .map_err(|e| PipelineError::History(format!("invalid history body: {e}")))?;
        records.truncate(RECENT_CONVERSATION_LIMIT);
        debug!(
            "Loaded {} recent conversations for caller {}",
            records.len(),
            caller_id
        );
        Ok(records)
    }

    /// Persist a finished conversation. Zero-utterance calls are stored
    /// too; their duration and outcome still matter.
    pub async fn store_conversation(&self, record: &ConversationRecord) -> PipelineResult<()> {
        let url = format!("{}/conversations", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| PipelineError::History(format!("store request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Failed to persist conversation for {}: {}",
                record.call_sid, status
            );
            return Err(PipelineError::History(format!("store returned {status}")));
        }
        Ok(())
    }
}
