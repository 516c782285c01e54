//! HTTP client for the conversational agent service.
//!
//! One request per caller utterance. The reply deadline is enforced here
//! with the configured agent timeout; a timeout maps to
//! [`PipelineError::AgentTimeout`] so the turn manager can substitute the
//! fallback line instead of leaving the caller in silence.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::services::directory::CallerProfile;

/// One utterance sent to the agent, with enough context to answer it.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub call_sid: String,
    pub course_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<CallerProfile>,
    /// Summaries of the caller's most recent conversations, oldest first.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub recent_conversations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentReply {
    pub response: String,
}

/// Client for the agent service's `/respond` endpoint.
#[derive(Clone)]
pub struct AgentClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(base_url: String, timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Agent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    /// Ask the agent for a reply to one caller utterance.
    pub async fn respond(&self, request: &AgentRequest) -> PipelineResult<String> {
        let url = format!("{}/respond", self.base_url);
        debug!(
            "Requesting agent reply for call {} ({} chars)",
            request.call_sid,
            request.message.len()
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::AgentTimeout(self.timeout)
                } else {
                    PipelineError::Agent(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Agent service returned {}: {}", status, body);
            return Err(PipelineError::Agent(format!(
                "agent service returned {status}: {body}"
            )));
        }

        let reply: AgentReply = response
            .json()
            .await
            .map_err(|e| PipelineError::Agent(format!("invalid reply body: {e}")))?;

        if reply.response.trim().is_empty() {
            return Err(PipelineError::Agent("agent returned an empty reply".to_string()));
        }
        Ok(reply.response)
    }
}
