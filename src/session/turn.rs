//! Sequential turn management for one call.
//!
//! All caller utterances funnel through one bounded channel into this
//! loop, so turns are strictly FIFO with at most one in flight. Replies
//! play to completion before the next utterance is taken; there is no
//! barge-in. An idle window with no completed utterance ends the call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{CallSession, Utterance};
use crate::core::audio::{
    FRAME_DURATION_MS, SYNTHESIZER_SAMPLE_RATE, frame_for_transport, silence, to_transport_format,
};
use crate::core::tts::BaseTts;
use crate::services::agent::{AgentClient, AgentRequest};

/// Played in place of a reply when synthesis fails and no pre-rendered
/// fallback asset is configured; keeps the playback timeline intact.
const SILENCE_FALLBACK_MS: u64 = 300;

/// Work items for the turn loop, in arrival order.
#[derive(Debug, PartialEq)]
pub enum TurnInput {
    /// A completed caller utterance needing an agent reply.
    Utterance(Utterance),
    /// Text to speak as-is, without consulting the agent. Used for the
    /// opening greeting.
    Announce(String),
}

/// Audio events for the transport sender, already in transport framing.
#[derive(Debug, PartialEq)]
pub enum OutboundAudio {
    /// One 20 ms mu-law frame.
    Frame(Vec<u8>),
    /// Playback checkpoint with a correlation name.
    Mark(String),
    /// Discard whatever the carrier has buffered but not yet played.
    Clear,
}

/// Why the turn loop stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum TurnExit {
    /// No completed utterance within the idle window.
    Idle,
    /// The session was cancelled from outside. An in-flight turn is
    /// abandoned; a late agent reply is discarded, not recorded.
    Cancelled,
    /// The input channel closed (media stream ended).
    ChannelClosed,
}

pub struct TurnManager {
    session: Arc<CallSession>,
    agent: AgentClient,
    tts: Arc<dyn BaseTts>,
    outbound: mpsc::Sender<OutboundAudio>,
    fallback_text: String,
    /// Pre-rendered mu-law audio played when synthesis itself fails.
    fallback_audio: Option<Vec<u8>>,
    idle_timeout: Duration,
}

impl TurnManager {
    pub fn new(
        session: Arc<CallSession>,
        agent: AgentClient,
        tts: Arc<dyn BaseTts>,
        outbound: mpsc::Sender<OutboundAudio>,
        fallback_text: String,
        fallback_audio: Option<Vec<u8>>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            session,
            agent,
            tts,
            outbound,
            fallback_text,
            fallback_audio,
            idle_timeout,
        }
    }

    /// Drive the call until cancellation, idle timeout, or channel close.
    pub async fn run(self, mut inputs: mpsc::Receiver<TurnInput>) -> TurnExit {
        loop {
            let next = tokio::select! {
                _ = self.session.cancel_token().cancelled() => return self.cancelled_exit(),
                next = tokio::time::timeout(self.idle_timeout, inputs.recv()) => next,
            };

            match next {
                Err(_) => {
                    info!(
                        "Call {} idle for {:?}, ending",
                        self.session.call_sid, self.idle_timeout
                    );
                    return TurnExit::Idle;
                }
                Ok(None) => return TurnExit::ChannelClosed,
                Ok(Some(input)) => {
                    self.session.set_turn_in_flight(true);
                    let turn = async {
                        match input {
                            TurnInput::Utterance(utterance) => self.take_turn(utterance).await,
                            TurnInput::Announce(text) => {
                                self.session.record_assistant_line(&text);
                                self.speak(&text).await;
                            }
                        }
                    };
                    // Dropping the turn future on cancel is what discards
                    // a late agent reply.
                    tokio::select! {
                        _ = self.session.cancel_token().cancelled() => {
                            self.session.set_turn_in_flight(false);
                            return self.cancelled_exit();
                        }
                        _ = turn => {}
                    }
                    self.session.set_turn_in_flight(false);
                }
            }
        }
    }

    /// A cancelled call must not keep playing frames the carrier already
    /// buffered; tell it to drop them on the way out.
    fn cancelled_exit(&self) -> TurnExit {
        let _ = self.outbound.try_send(OutboundAudio::Clear);
        TurnExit::Cancelled
    }

    async fn take_turn(&self, utterance: Utterance) {
        debug!(
            "Turn {} starting for call {}",
            utterance.seq, self.session.call_sid
        );
        self.session.record_caller_line(&utterance.text);

        let request = AgentRequest {
            call_sid: self.session.call_sid.clone(),
            course_id: self.session.course_id.clone(),
            message: utterance.text,
            caller: self.session.caller(),
            recent_conversations: self.session.recent_context(),
        };

        let reply = match self.agent.respond(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    "Agent reply failed for call {}: {}, using fallback",
                    self.session.call_sid, e
                );
                self.fallback_text.clone()
            }
        };

        self.session.record_assistant_line(&reply);
        self.speak(&reply).await;
    }

    /// Synthesize and play text. Synthesis failure degrades to the
    /// pre-rendered fallback asset, or silence, so the caller still hears
    /// the playback gap instead of the line going dead mid-turn.
    async fn speak(&self, text: &str) {
        let mulaw = match self.tts.synthesize(text).await {
            Ok(pcm) if pcm.is_empty() => return,
            Ok(pcm) => to_transport_format(&pcm, SYNTHESIZER_SAMPLE_RATE),
            Err(e) => {
                warn!(
                    "Synthesis failed for call {}: {}, playing fallback audio",
                    self.session.call_sid, e
                );
                self.fallback_audio
                    .clone()
                    .unwrap_or_else(|| silence(SILENCE_FALLBACK_MS))
            }
        };
        self.play_mulaw(&mulaw).await;
    }

    /// Pace one 20 ms frame per real-time tick, then mark the end.
    async fn play_mulaw(&self, mulaw: &[u8]) {
        let frames = frame_for_transport(mulaw);
        debug!(
            "Playing {} frames for call {}",
            frames.len(),
            self.session.call_sid
        );

        let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for frame in frames {
            tokio::select! {
                _ = self.session.cancel_token().cancelled() => return,
                _ = ticker.tick() => {
                    if self.outbound.send(OutboundAudio::Frame(frame)).await.is_err() {
                        return;
                    }
                }
            }
        }

        let mark = uuid::Uuid::new_v4().to_string();
        let _ = self.outbound.send(OutboundAudio::Mark(mark)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::{TtsConfig, TtsError, TtsResult};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubTts {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl BaseTts for StubTts {
        fn new(_config: TtsConfig) -> TtsResult<Self> {
            Ok(Self { fail: false })
        }

        async fn synthesize(&self, text: &str) -> TtsResult<Vec<u8>> {
            if self.fail {
                return Err(TtsError::NetworkError("stub failure".to_string()));
            }
            // A handful of PCM16 samples at 16 kHz, one transport frame.
            Ok(vec![0u8; text.len().max(2) * 2])
        }

        fn get_provider_info(&self) -> &'static str {
            "stub"
        }
    }

    struct Harness {
        session: Arc<CallSession>,
        inputs: mpsc::Sender<TurnInput>,
        outbound: mpsc::Receiver<OutboundAudio>,
        runner: tokio::task::JoinHandle<TurnExit>,
    }

    fn utterance(text: &str, seq: u64) -> TurnInput {
        TurnInput::Utterance(Utterance {
            text: text.to_string(),
            seq,
        })
    }

    async fn spawn_manager(agent_url: &str, tts: StubTts, idle: Duration) -> Harness {
        let session = CallSession::new("CA123".to_string(), "fox-hollow".to_string());
        let agent = AgentClient::new(agent_url.to_string(), Duration::from_secs(1)).unwrap();
        let (input_tx, input_rx) = mpsc::channel(16);
        let (outbound_tx, outbound_rx) = mpsc::channel(256);

        let manager = TurnManager::new(
            session.clone(),
            agent,
            Arc::new(tts),
            outbound_tx,
            "Could you repeat that?".to_string(),
            None,
            idle,
        );
        let runner = tokio::spawn(manager.run(input_rx));

        Harness {
            session,
            inputs: input_tx,
            outbound: outbound_rx,
            runner,
        }
    }

    async fn drain_marks(outbound: &mut mpsc::Receiver<OutboundAudio>, count: usize) -> usize {
        let mut marks = 0;
        let mut frames = 0;
        while marks < count {
            match outbound.recv().await {
                Some(OutboundAudio::Mark(_)) => marks += 1,
                Some(OutboundAudio::Frame(frame)) => {
                    assert_eq!(frame.len(), 160);
                    frames += 1;
                }
                Some(OutboundAudio::Clear) => panic!("unexpected clear during playback"),
                None => panic!("outbound channel closed early"),
            }
        }
        frames
    }

    #[tokio::test]
    async fn test_utterances_answered_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/respond"))
            .and(body_partial_json(json!({"message": "first"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "one"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/respond"))
            .and(body_partial_json(json!({"message": "second"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "two"})))
            .mount(&server)
            .await;

        let mut h =
            spawn_manager(&server.uri(), StubTts { fail: false }, Duration::from_secs(5)).await;
        h.inputs.send(utterance("first", 0)).await.unwrap();
        h.inputs.send(utterance("second", 1)).await.unwrap();
        drain_marks(&mut h.outbound, 2).await;

        let record = h.session.to_record();
        let texts: Vec<&str> = record.transcript.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "one", "second", "two"]);

        h.session.cancel_token().cancel();
        assert_eq!(h.runner.await.unwrap(), TurnExit::Cancelled);
    }

    #[tokio::test]
    async fn test_agent_failure_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut h =
            spawn_manager(&server.uri(), StubTts { fail: false }, Duration::from_secs(5)).await;
        h.inputs.send(utterance("hello", 0)).await.unwrap();
        drain_marks(&mut h.outbound, 1).await;

        let record = h.session.to_record();
        assert_eq!(record.transcript[1].text, "Could you repeat that?");

        h.session.cancel_token().cancel();
        h.runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_announce_skips_agent() {
        let server = MockServer::start().await;
        // No agent mock: a request would fail and pollute the transcript.
        let mut h =
            spawn_manager(&server.uri(), StubTts { fail: false }, Duration::from_secs(5)).await;
        h.inputs
            .send(TurnInput::Announce("Welcome to the course.".into()))
            .await
            .unwrap();
        drain_marks(&mut h.outbound, 1).await;

        let record = h.session.to_record();
        assert_eq!(record.transcript.len(), 1);
        assert_eq!(record.transcript[0].text, "Welcome to the course.");

        h.session.cancel_token().cancel();
        h.runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_synthesis_failure_plays_silence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "ok"})))
            .mount(&server)
            .await;

        let mut h =
            spawn_manager(&server.uri(), StubTts { fail: true }, Duration::from_secs(5)).await;
        h.inputs.send(utterance("hi", 0)).await.unwrap();

        // 300 ms of 8 kHz silence is 15 full frames.
        let frames = drain_marks(&mut h.outbound, 1).await;
        assert_eq!(frames, 15);
        assert_eq!(h.session.transcript_len(), 2);

        h.session.cancel_token().cancel();
        h.runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_discards_late_agent_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "too late"}))
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;

        let mut h =
            spawn_manager(&server.uri(), StubTts { fail: false }, Duration::from_secs(5)).await;
        h.inputs.send(utterance("hello", 0)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.session.turn_in_flight());
        h.session.cancel_token().cancel();
        assert_eq!(h.runner.await.unwrap(), TurnExit::Cancelled);

        // The caller's words are kept; the abandoned reply is not.
        let record = h.session.to_record();
        assert_eq!(record.transcript.len(), 1);
        assert_eq!(record.transcript[0].text, "hello");
        assert!(!h.session.turn_in_flight());

        // The carrier is told to drop anything it had buffered.
        assert_eq!(h.outbound.recv().await, Some(OutboundAudio::Clear));
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_loop() {
        let server = MockServer::start().await;
        let h = spawn_manager(&server.uri(), StubTts { fail: false }, Duration::from_millis(50))
            .await;
        assert_eq!(h.runner.await.unwrap(), TurnExit::Idle);
    }

    #[tokio::test]
    async fn test_channel_close_ends_loop() {
        let server = MockServer::start().await;
        let h = spawn_manager(&server.uri(), StubTts { fail: false }, Duration::from_secs(5)).await;
        drop(h.inputs);
        assert_eq!(h.runner.await.unwrap(), TurnExit::ChannelClosed);
    }
}
