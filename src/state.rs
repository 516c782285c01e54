//! Shared application state for all handlers.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::ServerConfig;
use crate::core::audio::{TRANSPORT_SAMPLE_RATE, to_transport_format};
use crate::core::tts::{BaseTts, ElevenLabsTts, TtsConfig};
use crate::errors::{PipelineError, PipelineResult};
use crate::services::agent::AgentClient;
use crate::services::directory::DirectoryClient;
use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub agent: AgentClient,
    /// Absent when no history service is configured; calls then run
    /// anonymously and nothing is persisted.
    pub directory: Option<DirectoryClient>,
    pub tts: Arc<dyn BaseTts>,
    /// Pre-rendered mu-law apology audio for synthesis outages.
    pub fallback_audio: Option<Arc<Vec<u8>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> PipelineResult<Self> {
        let agent = AgentClient::new(config.agent_service_url.clone(), config.agent_timeout)?;

        let directory = config
            .history_service_url
            .clone()
            .map(DirectoryClient::new)
            .transpose()?;

        let tts: Arc<dyn BaseTts> = Arc::new(ElevenLabsTts::new(TtsConfig {
            api_key: config.elevenlabs_api_key.clone(),
            voice_id: config.elevenlabs_voice_id.clone(),
            ..Default::default()
        })?);

        let fallback_audio = match &config.fallback_audio_path {
            Some(path) => {
                let mulaw = load_fallback_audio(path)?;
                info!(
                    "Loaded fallback audio from {} ({} transport bytes)",
                    path.display(),
                    mulaw.len()
                );
                Some(Arc::new(mulaw))
            }
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            agent,
            directory,
            tts,
            fallback_audio,
        })
    }
}

/// Read a 16-bit mono PCM WAV and convert it to transport mu-law.
fn load_fallback_audio(path: &Path) -> PipelineResult<Vec<u8>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| PipelineError::Config(format!("cannot open fallback audio: {e}")))?;
    let spec = reader.spec();

    if spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
    {
        return Err(PipelineError::Config(
            "fallback audio must be 16-bit mono integer PCM WAV".to_string(),
        ));
    }
    if spec.sample_rate < TRANSPORT_SAMPLE_RATE || spec.sample_rate % TRANSPORT_SAMPLE_RATE != 0 {
        return Err(PipelineError::Config(format!(
            "fallback audio rate {} must be a multiple of {}",
            spec.sample_rate, TRANSPORT_SAMPLE_RATE
        )));
    }

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<Result<_, _>>()
        .map_err(|e| PipelineError::Config(format!("cannot read fallback audio: {e}")))?;
    let mut pcm_le = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        pcm_le.extend_from_slice(&sample.to_le_bytes());
    }
    Ok(to_transport_format(&pcm_le, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            public_base_url: None,
            deepgram_api_key: "dg".to_string(),
            elevenlabs_api_key: "el".to_string(),
            elevenlabs_voice_id: "voice".to_string(),
            agent_service_url: "http://localhost:9000".to_string(),
            history_service_url: None,
            default_course_id: "fox-hollow".to_string(),
            greeting_text: "Hello.".to_string(),
            fallback_audio_path: None,
            agent_timeout: Duration::from_secs(5),
            call_idle_timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_state_without_history_service() {
        let state = AppState::new(config()).unwrap();
        assert!(state.directory.is_none());
        assert!(state.fallback_audio.is_none());
        assert_eq!(state.registry.active_count(), 0);
    }

    #[test]
    fn test_state_with_history_service() {
        let mut cfg = config();
        cfg.history_service_url = Some("http://localhost:9001".to_string());
        let state = AppState::new(cfg).unwrap();
        assert!(state.directory.is_some());
    }

    #[test]
    fn test_fallback_audio_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fallback.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // 320 samples at 16 kHz: 20 ms, one transport frame after downsampling.
        for _ in 0..320 {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();

        let mulaw = load_fallback_audio(&path).unwrap();
        assert_eq!(mulaw.len(), 160);
    }

    #[test]
    fn test_missing_fallback_audio_is_config_error() {
        let mut cfg = config();
        cfg.fallback_audio_path = Some("/nonexistent/fallback.wav".into());
        assert!(matches!(
            AppState::new(cfg),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_unaligned_sample_rate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 11_025,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        assert!(load_fallback_audio(&path).is_err());
    }
}
