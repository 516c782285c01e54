//! Media stream WebSocket handler.
//!
//! One socket per call. The receive loop owns the carrier socket and the
//! recognizer; replies flow back through a channel into a sender task so
//! turn playback never contends with inbound media for the socket.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::messages::{self, StartMeta, StreamEvent};
use crate::config::FALLBACK_RESPONSE;
use crate::core::audio::to_recognizer_format;
use crate::core::stt::{BaseStt, DeepgramStt, SttConfig, SttErrorCallback, SttResultCallback};
use crate::session::{
    CallSession, FinalizeReason, OutboundAudio, TurnExit, TurnInput, TurnManager, finalize_call,
};
use crate::state::AppState;

struct ActiveCall {
    session: Arc<CallSession>,
    /// Absent when the recognizer could not be constructed; the call
    /// then runs degraded from the start.
    stt: Option<DeepgramStt>,
}

pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_media_stream(socket, state))
}

async fn handle_media_stream(socket: WebSocket, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();
    let mut ws_sink = Some(ws_sink);
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundAudio>(512);
    let mut outbound_rx = Some(outbound_rx);
    let mut call: Option<ActiveCall> = None;

    loop {
        let message = match &call {
            // Finalization from any path cancels the session token, which
            // also ends this loop.
            Some(active) => tokio::select! {
                _ = active.session.cancel_token().cancelled() => break,
                message = ws_stream.next() => message,
            },
            None => ws_stream.next().await,
        };

        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => continue,
        };

        match StreamEvent::parse(&text) {
            Ok(StreamEvent::Start(start)) => {
                if call.is_some() {
                    warn!("Duplicate start event on stream {}", start.stream_sid);
                    continue;
                }
                let (Some(sink), Some(rx)) = (ws_sink.take(), outbound_rx.take()) else {
                    break;
                };
                call = Some(begin_call(start, &state, outbound_tx.clone(), sink, rx).await);
            }
            Ok(StreamEvent::Media(media)) => {
                // Only the caller's track feeds the recognizer; outbound
                // frames are our own audio echoed back.
                if !media.is_inbound() {
                    continue;
                }
                let Some(active) = call.as_mut() else {
                    debug!("Media before start, ignoring");
                    continue;
                };
                if active.session.is_degraded() {
                    continue;
                }
                let Some(stt) = active.stt.as_mut() else {
                    continue;
                };
                match media.decode() {
                    Ok(mulaw) => {
                        let pcm = to_recognizer_format(&mulaw);
                        if let Err(e) = stt.send_audio(Bytes::from(pcm)).await {
                            warn!(
                                "Dropping caller audio for call {}: {}",
                                active.session.call_sid, e
                            );
                        }
                    }
                    Err(e) => warn!("Undecodable media payload: {}", e),
                }
            }
            Ok(StreamEvent::Stop) => {
                if let Some(active) = &call {
                    info!("Stream stopped for call {}", active.session.call_sid);
                    finalize_call(
                        &active.session,
                        &state.registry,
                        state.directory.as_ref(),
                        FinalizeReason::StreamStopped,
                    )
                    .await;
                }
                break;
            }
            Ok(StreamEvent::Mark(mark)) => debug!("Playback mark {} confirmed", mark.name),
            Ok(StreamEvent::Connected) => debug!("Media stream protocol connected"),
            Ok(StreamEvent::Unknown(kind)) => debug!("Unhandled stream event: {}", kind),
            Err(e) => warn!("Unparseable stream frame: {}", e),
        }
    }

    if let Some(mut active) = call.take() {
        finalize_call(
            &active.session,
            &state.registry,
            state.directory.as_ref(),
            FinalizeReason::SocketClosed,
        )
        .await;
        if let Some(mut stt) = active.stt.take()
            && let Err(e) = stt.disconnect().await
        {
            warn!("Recognizer disconnect failed: {}", e);
        }
    }
}

/// Bring up everything for one call once its `start` event arrives.
async fn begin_call(
    start: StartMeta,
    state: &AppState,
    outbound_tx: mpsc::Sender<OutboundAudio>,
    ws_sink: SplitSink<WebSocket, Message>,
    outbound_rx: mpsc::Receiver<OutboundAudio>,
) -> ActiveCall {
    info!(
        "Media stream {} started for call {}",
        start.stream_sid, start.call_sid
    );

    let session = CallSession::new(
        start.call_sid.clone(),
        state.config.default_course_id.clone(),
    );
    session.set_stream_sid(start.stream_sid.clone());
    if let Some(number) = start.caller_number() {
        session.set_caller_number(number.to_string());
    }
    if !state.registry.insert(session.clone()) {
        warn!(
            "Call {} already registered, keeping the first session",
            session.call_sid
        );
    }

    spawn_sender(start.stream_sid, ws_sink, outbound_rx);

    let (input_tx, input_rx) = mpsc::channel::<TurnInput>(32);
    let stt = connect_recognizer(&session, state, input_tx.clone()).await;
    spawn_caller_lookup(&session, state, session.caller_number());

    let manager = TurnManager::new(
        session.clone(),
        state.agent.clone(),
        state.tts.clone(),
        outbound_tx,
        FALLBACK_RESPONSE.to_string(),
        state.fallback_audio.as_deref().cloned(),
        state.config.call_idle_timeout,
    );
    let turn_handle = tokio::spawn(manager.run(input_rx));

    // An idle exit must tear the whole call down, not just the turn loop.
    let watcher_session = session.clone();
    let watcher_registry = state.registry.clone();
    let watcher_directory = state.directory.clone();
    tokio::spawn(async move {
        if let Ok(TurnExit::Idle) = turn_handle.await {
            finalize_call(
                &watcher_session,
                &watcher_registry,
                watcher_directory.as_ref(),
                FinalizeReason::IdleTimeout,
            )
            .await;
        }
    });

    if input_tx
        .send(TurnInput::Announce(state.config.greeting_text.clone()))
        .await
        .is_err()
    {
        warn!("Could not queue greeting for call {}", session.call_sid);
    }

    ActiveCall { session, stt }
}

/// Serialize outbound audio onto the carrier socket, in channel order.
fn spawn_sender(
    stream_sid: String,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<OutboundAudio>,
) {
    tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let frame = match event {
                OutboundAudio::Frame(mulaw) => messages::media_event(&stream_sid, &mulaw),
                OutboundAudio::Mark(name) => messages::mark_event(&stream_sid, &name),
                OutboundAudio::Clear => messages::clear_event(&stream_sid),
            };
            if ws_sink.send(Message::Text(frame.into())).await.is_err() {
                debug!("Carrier socket closed, stopping sender for {}", stream_sid);
                break;
            }
        }
    });
}

/// Build the recognizer callbacks for one call: completed utterances
/// become turn inputs, terminal recognizer errors degrade the session.
fn recognizer_callbacks(
    session: &Arc<CallSession>,
    input_tx: mpsc::Sender<TurnInput>,
) -> (SttResultCallback, SttErrorCallback) {
    let result_session = session.clone();
    let on_result: SttResultCallback = Arc::new(move |result| {
        let session = result_session.clone();
        let inputs = input_tx.clone();
        Box::pin(async move {
            if let Some(utterance) = session.push_transcript_event(&result) {
                info!(
                    "Caller utterance {} on {}: {}",
                    utterance.seq, session.call_sid, utterance.text
                );
                if inputs.send(TurnInput::Utterance(utterance)).await.is_err() {
                    warn!("Turn channel closed for call {}", session.call_sid);
                }
            }
        })
    });

    let error_session = session.clone();
    let on_error: SttErrorCallback = Arc::new(move |err| {
        let session = error_session.clone();
        Box::pin(async move {
            if err.is_terminal() {
                error!(
                    "Recognizer unavailable for call {}: {}, dropping caller audio",
                    session.call_sid, err
                );
                session.set_degraded();
            } else {
                warn!("Recognizer error on call {}: {}", session.call_sid, err);
            }
        })
    });

    (on_result, on_error)
}

/// Build and connect the per-call recognizer, wiring transcript events
/// into the turn channel.
async fn connect_recognizer(
    session: &Arc<CallSession>,
    state: &AppState,
    input_tx: mpsc::Sender<TurnInput>,
) -> Option<DeepgramStt> {
    let mut stt = match DeepgramStt::new(SttConfig {
        api_key: state.config.deepgram_api_key.clone(),
        ..Default::default()
    }) {
        Ok(stt) => stt,
        Err(e) => {
            error!(
                "Recognizer setup failed for call {}: {}, running degraded",
                session.call_sid, e
            );
            session.set_degraded();
            return None;
        }
    };

    let (on_result, on_error) = recognizer_callbacks(session, input_tx);

    let connected = async {
        stt.on_result(on_result).await?;
        stt.on_error(on_error).await?;
        stt.connect().await
    }
    .await;

    match connected {
        Ok(()) => Some(stt),
        Err(e) => {
            error!(
                "Recognizer connect failed for call {}: {}, running degraded",
                session.call_sid, e
            );
            session.set_degraded();
            None
        }
    }
}

/// Identify the caller and pull their recent conversation context in the
/// background. The call proceeds anonymously until (and unless) it lands.
fn spawn_caller_lookup(session: &Arc<CallSession>, state: &AppState, phone: Option<String>) {
    let (Some(directory), Some(phone)) = (state.directory.clone(), phone) else {
        return;
    };
    let session = session.clone();
    tokio::spawn(async move {
        let profile = match directory.identify_or_create_caller(&phone).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    "Caller lookup failed for call {}: {}, continuing anonymously",
                    session.call_sid, e
                );
                return;
            }
        };

        let context = match directory.recent_conversations(&profile.id).await {
            Ok(records) => records.iter().map(|r| r.summary()).collect(),
            Err(e) => {
                warn!(
                    "History fetch failed for caller {}: {}",
                    profile.id, e
                );
                Vec::new()
            }
        };
        session.set_caller(profile, context);
    });
}
