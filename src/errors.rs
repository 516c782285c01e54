//! Crate-wide error type aggregating the pipeline's failure domains.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::core::stt::SttError;
use crate::core::tts::TtsError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Stt(#[from] SttError),

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error("agent service error: {0}")]
    Agent(String),

    #[error("agent response timed out after {0:?}")]
    AgentTimeout(std::time::Duration),

    #[error("caller directory error: {0}")]
    Directory(String),

    #[error("conversation history error: {0}")]
    History(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::AgentTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Agent(_)
            | PipelineError::Directory(_)
            | PipelineError::History(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stt_error_converts() {
        let err: PipelineError = SttError::Unavailable("gone".into()).into();
        assert!(matches!(err, PipelineError::Stt(_)));
    }

    #[test]
    fn test_service_errors_map_to_502() {
        let response = PipelineError::Directory("directory is down".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_agent_timeout_maps_to_504() {
        let response =
            PipelineError::AgentTimeout(std::time::Duration::from_secs(5)).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
