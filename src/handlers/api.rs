//! HTTP API handlers: health and the incoming-call webhook.
//!
//! The webhook answers the carrier's call notification with TwiML that
//! connects the call's audio to this server's media stream endpoint,
//! passing the caller's number through as a stream parameter.

use axum::Json;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::state::AppState;

/// Fields of interest from the carrier's call webhook form.
#[derive(Debug, Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: String,
}

/// Liveness probe with the current call count.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "active_calls": state.registry.active_count(),
    }))
}

/// Answer an incoming call with TwiML pointing back at our stream endpoint.
pub async fn incoming_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<IncomingCallForm>,
) -> Response {
    info!("Incoming call {} from {}", form.call_sid, form.from);

    let base = match &state.config.public_base_url {
        Some(base) => base.clone(),
        None => match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
            Some(host) => format!("https://{host}"),
            None => {
                warn!("No public base URL and no Host header on webhook");
                return (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "cannot determine stream URL",
                )
                    .into_response();
            }
        },
    };

    let twiml = stream_twiml(&base, &form.from);
    ([(header::CONTENT_TYPE, "text/xml")], twiml).into_response()
}

/// Build the TwiML `<Connect><Stream>` response for one call.
fn stream_twiml(base_url: &str, from: &str) -> String {
    let stream_url = websocket_url(base_url);
    let mut parameter = String::new();
    if !from.is_empty() {
        parameter = format!(
            "\n      <Parameter name=\"from\" value=\"{}\" />",
            escape_xml(from)
        );
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Response>\n\
           <Connect>\n\
             <Stream url=\"{}\">{}\n\
             </Stream>\n\
           </Connect>\n\
         </Response>",
        escape_xml(&stream_url),
        parameter
    )
}

/// Map the public HTTP base URL onto the stream's WebSocket endpoint.
fn websocket_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let converted = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("wss://{trimmed}")
    };
    format!("{converted}/v1/voice/stream")
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
