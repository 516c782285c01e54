//! HTTP route table.

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::api::{health, incoming_call};
use crate::handlers::telephony::media_stream_handler;
use crate::state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/v1/voice/incoming", get(incoming_call).post(incoming_call))
        .route("/v1/voice/stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use futures::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::protocol::Message;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_base_url: Some("https://voice.example.com".to_string()),
            deepgram_api_key: "dg_test".to_string(),
            elevenlabs_api_key: "el_test".to_string(),
            elevenlabs_voice_id: "voice_test".to_string(),
            agent_service_url: "http://127.0.0.1:1".to_string(),
            history_service_url: None,
            default_course_id: "fox-hollow".to_string(),
            greeting_text: "Hello.".to_string(),
            fallback_audio_path: None,
            agent_timeout: Duration::from_secs(1),
            call_idle_timeout: Duration::from_secs(60),
        }
    }

    async fn spawn_server() -> (AppState, SocketAddr) {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let state = AppState::new(test_config()).unwrap();
        let router = build_router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (state, addr)
    }

    async fn wait_for_count(state: &AppState, expected: usize) {
        for _ in 0..100 {
            if state.registry.active_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "registry never reached {} active calls (at {})",
            expected,
            state.registry.active_count()
        );
    }

    #[tokio::test]
    async fn test_health_reports_active_calls() {
        let (_state, addr) = spawn_server().await;

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_calls"], 0);
    }

    #[tokio::test]
    async fn test_incoming_call_returns_twiml() {
        let (_state, addr) = spawn_server().await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/v1/voice/incoming"))
            .form(&[("CallSid", "CA1"), ("From", "+15551234567")])
            .send()
            .await
            .unwrap();

        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/xml"
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("wss://voice.example.com/v1/voice/stream"));
        assert!(body.contains("+15551234567"));
    }

    #[tokio::test]
    async fn test_media_stream_session_lifecycle() {
        let (state, addr) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/v1/voice/stream"))
            .await
            .unwrap();

        ws.send(Message::Text(
            r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA_lifecycle","customParameters":{"from":"+15550001111"}}}"#.into(),
        ))
        .await
        .unwrap();

        wait_for_count(&state, 1).await;
        let session = state.registry.get("CA_lifecycle").unwrap();
        assert_eq!(session.stream_sid().as_deref(), Some("MZ1"));
        assert_eq!(session.caller_number().as_deref(), Some("+15550001111"));

        ws.send(Message::Text(r#"{"event":"stop"}"#.into()))
            .await
            .unwrap();
        wait_for_count(&state, 0).await;
        assert!(session.is_finalized());
    }

    #[tokio::test]
    async fn test_degraded_call_drops_media_and_still_finalizes() {
        let (state, addr) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/v1/voice/stream"))
            .await
            .unwrap();
        ws.send(Message::Text(
            r#"{"event":"start","start":{"streamSid":"MZ3","callSid":"CA_degraded"}}"#.into(),
        ))
        .await
        .unwrap();
        wait_for_count(&state, 1).await;

        let session = state.registry.get("CA_degraded").unwrap();
        session.set_degraded();

        // Caller audio on a degraded session is dropped, not an error.
        ws.send(Message::Text(
            r#"{"event":"media","media":{"track":"inbound","payload":"////"}}"#.into(),
        ))
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.registry.active_count(), 1);
        assert!(
            session
                .to_record()
                .transcript
                .iter()
                .all(|entry| entry.role == crate::services::directory::TranscriptRole::Assistant)
        );

        ws.send(Message::Text(r#"{"event":"stop"}"#.into()))
            .await
            .unwrap();
        wait_for_count(&state, 0).await;
        assert!(session.is_finalized());
    }

    #[tokio::test]
    async fn test_socket_drop_finalizes_session() {
        let (state, addr) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/v1/voice/stream"))
            .await
            .unwrap();
        ws.send(Message::Text(
            r#"{"event":"start","start":{"streamSid":"MZ2","callSid":"CA_dropped"}}"#.into(),
        ))
        .await
        .unwrap();
        wait_for_count(&state, 1).await;

        drop(ws);
        wait_for_count(&state, 0).await;
    }

    #[tokio::test]
    async fn test_media_before_start_is_ignored() {
        let (state, addr) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/v1/voice/stream"))
            .await
            .unwrap();
        ws.send(Message::Text(
            r#"{"event":"media","media":{"payload":"////"}}"#.into(),
        ))
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.registry.active_count(), 0);
    }
}
