//! Server configuration loaded from environment variables.
//!
//! `.env` values are picked up by the binary before this module reads the
//! process environment, so precedence is: real environment > .env > defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{PipelineError, PipelineResult};

/// Default greeting spoken as soon as the media stream opens.
pub const DEFAULT_GREETING: &str =
    "Thank you for calling Fox Hollow Golf Course. How can I help you today?";

/// Fallback line spoken when the agent fails or times out.
pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I didn't catch that. Could you please repeat?";

/// Server configuration
///
/// Contains everything needed to run the voice pipeline server:
/// - Bind address
/// - Provider API keys (Deepgram, ElevenLabs)
/// - Downstream service URLs (agent, caller directory / history)
/// - Call behavior (greeting, timeouts)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Externally reachable base URL, used in TwiML to point the carrier's
    /// media stream back at this server.
    pub public_base_url: Option<String>,

    // Provider API keys
    pub deepgram_api_key: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_voice_id: String,

    // Downstream services
    pub agent_service_url: String,
    pub history_service_url: Option<String>,

    // Call behavior
    pub default_course_id: String,
    pub greeting_text: String,
    /// Optional WAV asset played when synthesis fails mid-call.
    pub fallback_audio_path: Option<PathBuf>,
    pub agent_timeout: Duration,
    pub call_idle_timeout: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_required(key: &str) -> PipelineResult<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::Config(format!("{key} must be set")))
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> PipelineResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| PipelineError::Config(format!("{key} has invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> PipelineResult<Self> {
        let config = Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parsed("PORT", 8000)?,
            public_base_url: env_opt("PUBLIC_BASE_URL"),
            deepgram_api_key: env_required("DEEPGRAM_API_KEY")?,
            elevenlabs_api_key: env_required("ELEVENLABS_API_KEY")?,
            elevenlabs_voice_id: env_required("ELEVENLABS_VOICE_ID")?,
            agent_service_url: env_required("AGENT_SERVICE_URL")?,
            history_service_url: env_opt("HISTORY_SERVICE_URL"),
            default_course_id: env_or("DEFAULT_COURSE_ID", "fox-hollow"),
            greeting_text: env_or("GREETING_TEXT", DEFAULT_GREETING),
            fallback_audio_path: env_opt("FALLBACK_AUDIO_WAV").map(PathBuf::from),
            agent_timeout: Duration::from_secs(env_parsed("AGENT_TIMEOUT_SECS", 5u64)?),
            call_idle_timeout: Duration::from_secs(env_parsed("CALL_IDLE_TIMEOUT_SECS", 60u64)?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.port == 0 {
            return Err(PipelineError::Config("PORT must be non-zero".to_string()));
        }
        if self.agent_timeout.is_zero() {
            return Err(PipelineError::Config(
                "AGENT_TIMEOUT_SECS must be non-zero".to_string(),
            ));
        }
        if self.call_idle_timeout < self.agent_timeout {
            return Err(PipelineError::Config(
                "CALL_IDLE_TIMEOUT_SECS must not be shorter than AGENT_TIMEOUT_SECS".to_string(),
            ));
        }
        for (name, url) in [
            ("AGENT_SERVICE_URL", Some(&self.agent_service_url)),
            ("HISTORY_SERVICE_URL", self.history_service_url.as_ref()),
            ("PUBLIC_BASE_URL", self.public_base_url.as_ref()),
        ] {
            if let Some(url) = url
                && url::Url::parse(url).is_err()
            {
                return Err(PipelineError::Config(format!("{name} is not a valid URL")));
            }
        }
        Ok(())
    }

    /// Bind address in `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
