//! Deepgram STT WebSocket client.
//!
//! Owns one streaming connection per call. Audio is written through a
//! bounded channel into a connection task; transcript events flow back
//! through result/error forwarding tasks into the registered callbacks,
//! so all downstream session mutation happens on one consumer.
//!
//! On connection drop the task reconnects up to [`MAX_RECONNECT_ATTEMPTS`]
//! times with doubling backoff. When attempts are exhausted it emits a
//! terminal [`SttError::Unavailable`] and stops; the owning session then
//! degrades to dropping caller audio for the remainder of the call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::DeepgramConfig;
use super::messages::DeepgramMessage;
use crate::core::stt::base::{
    BaseStt, SttConfig, SttError, SttErrorCallback, SttResult, SttResultCallback,
};

/// Reconnection attempts before the connector gives up for good.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Initial reconnect backoff, doubled per attempt.
const RECONNECT_BACKOFF: Duration = Duration::from_millis(250);

/// Bound on a single audio chunk fed to the connector.
const MAX_AUDIO_CHUNK_SIZE: usize = 256 * 1024;

/// How long to wait for the socket handshake before failing an attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type AsyncResultCallback =
    Box<dyn Fn(SttResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
type AsyncErrorCallback =
    Box<dyn Fn(SttError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Deepgram streaming STT connector, call-scoped.
pub struct DeepgramStt {
    config: Option<DeepgramConfig>,
    ws_sender: Option<mpsc::Sender<Bytes>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    connection_handle: Option<tokio::task::JoinHandle<()>>,
    result_forward_handle: Option<tokio::task::JoinHandle<()>>,
    error_forward_handle: Option<tokio::task::JoinHandle<()>>,
    result_callback: Arc<Mutex<Option<AsyncResultCallback>>>,
    error_callback: Arc<Mutex<Option<AsyncErrorCallback>>>,
    is_connected: Arc<AtomicBool>,
    closed: bool,
}

impl DeepgramStt {
    /// Handle one incoming WebSocket message.
    ///
    /// Returns `Ok(true)` to keep the connection, `Ok(false)` when the
    /// server closed the stream, `Err` on a connection-level failure.
    async fn handle_websocket_message(
        message: Message,
        result_tx: &mpsc::Sender<SttResult>,
    ) -> Result<bool, SttError> {
        match message {
            Message::Text(text) => {
                match DeepgramMessage::parse(&text) {
                    Ok(DeepgramMessage::Results(results)) => {
                        let result = results.into_stt_result();
                        if result.transcript.is_empty() && !result.speech_final {
                            // Empty interim fragments carry no information.
                            return Ok(true);
                        }
                        if result_tx.try_send(result).is_err() {
                            warn!("Failed to forward transcript result - channel closed");
                        }
                    }
                    Ok(DeepgramMessage::UtteranceEnd) => {
                        if result_tx.try_send(SttResult::utterance_end()).is_err() {
                            warn!("Failed to forward utterance boundary - channel closed");
                        }
                    }
                    Ok(DeepgramMessage::SpeechStarted) => {
                        debug!("Deepgram speech started");
                    }
                    Ok(DeepgramMessage::Metadata) => {
                        debug!("Deepgram metadata received");
                    }
                    Ok(DeepgramMessage::Unknown(kind)) => {
                        debug!("Unhandled Deepgram message type: {}", kind);
                    }
                    Err(e) => {
                        warn!("Failed to parse Deepgram message: {}", e);
                    }
                }
                Ok(true)
            }
            Message::Close(frame) => {
                warn!("Deepgram WebSocket closed by server: {:?}", frame);
                Ok(false)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(true),
            Message::Binary(_) => {
                debug!("Unexpected binary message from Deepgram");
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    async fn connect_once(
        config: &DeepgramConfig,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        SttError,
    > {
        let ws_url = config.build_websocket_url();
        let mut request = ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| SttError::ConnectionFailed(format!("invalid request: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", config.base.api_key)
                .parse()
                .map_err(|_| SttError::AuthenticationFailed("malformed API key".to_string()))?,
        );

        let (ws_stream, _response) = timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| SttError::ConnectionFailed("Deepgram handshake timed out".to_string()))?
            .map_err(|e| SttError::ConnectionFailed(format!("failed to connect: {e}")))?;
        Ok(ws_stream)
    }

    fn start_connection(&mut self, config: DeepgramConfig) {
        let (ws_tx, mut ws_rx) = mpsc::channel::<Bytes>(64);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        // Bounded channels for backpressure on transcript bursts
        let (result_tx, mut result_rx) = mpsc::channel::<SttResult>(256);
        let (error_tx, mut error_rx) = mpsc::channel::<SttError>(16);

        self.ws_sender = Some(ws_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let is_connected = self.is_connected.clone();

        let connection_handle = tokio::spawn(async move {
            let mut attempts: u32 = 0;

            'reconnect: loop {
                let ws_stream = match Self::connect_once(&config).await {
                    Ok(stream) => {
                        attempts = 0;
                        stream
                    }
                    Err(e) => {
                        attempts += 1;
                        if attempts >= MAX_RECONNECT_ATTEMPTS {
                            error!("Deepgram reconnect attempts exhausted: {}", e);
                            is_connected.store(false, Ordering::Release);
                            let _ = error_tx
                                .try_send(SttError::Unavailable(format!(
                                    "gave up after {MAX_RECONNECT_ATTEMPTS} attempts: {e}"
                                )));
                            break;
                        }
                        let backoff = RECONNECT_BACKOFF * 2u32.pow(attempts - 1);
                        warn!(
                            "Deepgram connection attempt {}/{} failed ({}), retrying in {:?}",
                            attempts, MAX_RECONNECT_ATTEMPTS, e, backoff
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => continue 'reconnect,
                            _ = &mut shutdown_rx => break 'reconnect,
                        }
                    }
                };

                info!("Connected to Deepgram STT WebSocket");
                is_connected.store(true, Ordering::Release);
                let (mut ws_sink, mut ws_stream) = ws_stream.split();

                loop {
                    tokio::select! {
                        Some(audio_data) = ws_rx.recv() => {
                            if let Err(e) = ws_sink.send(Message::Binary(audio_data)).await {
                                warn!("Failed to send audio to Deepgram: {}", e);
                                is_connected.store(false, Ordering::Release);
                                continue 'reconnect;
                            }
                        }

                        message = ws_stream.next() => {
                            match message {
                                Some(Ok(msg)) => {
                                    match Self::handle_websocket_message(msg, &result_tx).await {
                                        Ok(true) => {}
                                        Ok(false) => {
                                            // Only a local shutdown ends the
                                            // task; a server-side close is a
                                            // connection drop like any other.
                                            is_connected.store(false, Ordering::Release);
                                            continue 'reconnect;
                                        }
                                        Err(e) => {
                                            error!("Deepgram streaming error: {}", e);
                                            let _ = error_tx.try_send(e);
                                            is_connected.store(false, Ordering::Release);
                                            continue 'reconnect;
                                        }
                                    }
                                }
                                Some(Err(e)) => {
                                    warn!("Deepgram WebSocket error: {}", e);
                                    let _ = error_tx.try_send(SttError::NetworkError(
                                        format!("WebSocket error: {e}"),
                                    ));
                                    is_connected.store(false, Ordering::Release);
                                    continue 'reconnect;
                                }
                                None => {
                                    warn!("Deepgram WebSocket stream ended");
                                    is_connected.store(false, Ordering::Release);
                                    continue 'reconnect;
                                }
                            }
                        }

                        _ = &mut shutdown_rx => {
                            info!("Shutting down Deepgram STT connection");
                            let _ = ws_sink
                                .send(Message::Text(r#"{"type":"CloseStream"}"#.into()))
                                .await;
                            let _ = ws_sink.send(Message::Close(None)).await;
                            is_connected.store(false, Ordering::Release);
                            break 'reconnect;
                        }
                    }
                }
            }

            info!("Deepgram STT connection task finished");
        });
        self.connection_handle = Some(connection_handle);

        // Result forwarding task
        let callback_ref = self.result_callback.clone();
        self.result_forward_handle = Some(tokio::spawn(async move {
            while let Some(result) = result_rx.recv().await {
                if let Some(callback) = callback_ref.lock().await.as_ref() {
                    callback(result).await;
                } else {
                    debug!(
                        "Deepgram result with no callback: {} (final: {}, speech_final: {})",
                        result.transcript, result.is_final, result.speech_final
                    );
                }
            }
        }));

        // Error forwarding task
        let error_callback_ref = self.error_callback.clone();
        self.error_forward_handle = Some(tokio::spawn(async move {
            while let Some(err) = error_rx.recv().await {
                if let Some(callback) = error_callback_ref.lock().await.as_ref() {
                    callback(err).await;
                } else {
                    error!("Deepgram STT error (no callback registered): {}", err);
                }
            }
        }));
    }
}

impl Drop for DeepgramStt {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

#[async_trait::async_trait]
impl BaseStt for DeepgramStt {
    fn new(config: SttConfig) -> Result<Self, SttError> {
        if config.api_key.is_empty() {
            return Err(SttError::AuthenticationFailed(
                "API key is required for Deepgram STT".to_string(),
            ));
        }

        Ok(Self {
            config: Some(DeepgramConfig::from_base(config)),
            ws_sender: None,
            shutdown_tx: None,
            connection_handle: None,
            result_forward_handle: None,
            error_forward_handle: None,
            result_callback: Arc::new(Mutex::new(None)),
            error_callback: Arc::new(Mutex::new(None)),
            is_connected: Arc::new(AtomicBool::new(false)),
            closed: false,
        })
    }

    async fn connect(&mut self) -> Result<(), SttError> {
        if self.closed {
            return Err(SttError::ConnectionFailed(
                "connector already closed".to_string(),
            ));
        }
        let config = self.config.clone().ok_or_else(|| {
            SttError::ConfigurationError("no configuration available".to_string())
        })?;
        self.start_connection(config);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SttError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.connection_handle.take() {
            let _ = timeout(Duration::from_secs(5), handle).await;
        }
        if let Some(handle) = self.result_forward_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(handle) = self.error_forward_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.ws_sender = None;
        *self.result_callback.lock().await = None;
        *self.error_callback.lock().await = None;
        self.is_connected.store(false, Ordering::Release);

        info!("Disconnected from Deepgram STT");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_connected.load(Ordering::Acquire) && self.ws_sender.is_some()
    }

    async fn send_audio(&mut self, audio_data: Bytes) -> Result<(), SttError> {
        if self.closed || self.ws_sender.is_none() {
            return Err(SttError::ConnectionFailed(
                "not connected to Deepgram STT".to_string(),
            ));
        }
        if audio_data.len() > MAX_AUDIO_CHUNK_SIZE {
            return Err(SttError::InvalidAudioFormat(format!(
                "audio chunk of {} bytes exceeds maximum {} bytes",
                audio_data.len(),
                MAX_AUDIO_CHUNK_SIZE
            )));
        }

        if let Some(ws_sender) = &self.ws_sender {
            ws_sender
                .send(audio_data)
                .await
                .map_err(|e| SttError::NetworkError(format!("failed to queue audio: {e}")))?;
        }
        Ok(())
    }

    async fn on_result(&mut self, callback: SttResultCallback) -> Result<(), SttError> {
        *self.result_callback.lock().await = Some(Box::new(move |result| {
            let cb = callback.clone();
            Box::pin(async move {
                cb(result).await;
            })
        }));
        Ok(())
    }

    async fn on_error(&mut self, callback: SttErrorCallback) -> Result<(), SttError> {
        *self.error_callback.lock().await = Some(Box::new(move |err| {
            let cb = callback.clone();
            Box::pin(async move {
                cb(err).await;
            })
        }));
        Ok(())
    }

    fn get_provider_info(&self) -> &'static str {
        "Deepgram Live Streaming STT"
    }
}
