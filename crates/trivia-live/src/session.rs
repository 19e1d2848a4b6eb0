//! The live round: one task driving the connection state machine.
//!
//! ```text
//! idle -> connecting -> open -> streaming -> closed
//!              ^                    |
//!              |                    v (drop / transient error)
//!         reconnecting <-------- error
//! ```
//!
//! Everything the round owns lives in [`LiveSession`] and is driven from a
//! single `select!` loop: caller commands, captured frames, inbound messages,
//! playback "ended" events and the finish timer. Inbound messages are handled
//! one at a time, in arrival order, so tool calls are acknowledged before the
//! next message is read.

use crate::capture::{capture_pipeline, CaptureStream, FrameGate, MicrophoneSource};
use crate::config::SessionConfig;
use crate::error::{LiveError, LiveResult};
use crate::pcm::{decode_frame, AudioFrame};
use crate::playback::{AudioOutput, ChunkId, PlaybackScheduler};
use crate::protocol::{ClientMessage, ServerEvent, ServerMessage};
use crate::reconnect::ReconnectPolicy;
use crate::tool_bridge::{ToolCallBridge, ToolOutcome};
use crate::transcript::{Speaker, TranscriptEntry, TranscriptTracker};
use crate::transport::{Connector, LiveTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};
use trivia_core::{GameProgressState, LiveStats, QuestionResult, RoundSetup};

const HINT_REQUEST: &str =
    "I'd like a hint for this question, please. Give me a subtle clue without revealing the answer.";

/// Connection state of the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Streaming,
    Error,
    Reconnecting,
    Closed,
}

/// Signals for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    StateChanged(SessionState),
    RoundStarted,
    RoundError(String),
    ReconnectAttempt { attempt: u32, max: u32 },
    HostSpeaking(bool),
    TranscriptAppended { speaker: Speaker, text: String },
    ScoreUpdated { result: QuestionResult, stats: LiveStats },
    RoundFinished { final_score: i64, results: Vec<QuestionResult> },
}

/// Requests from the caller while a round runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundCommand {
    RequestHint,
    SubmitAnswer(String),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The show ended and the grace delay elapsed.
    Finished,
    /// The caller hung up.
    Stopped,
}

/// Final state handed back when the round ends without a fatal error.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub outcome: RoundOutcome,
    pub progress: GameProgressState,
    pub transcript: Vec<TranscriptEntry>,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub reconnects: u32,
}

/// Caller side of a running round.
#[derive(Debug, Clone)]
pub struct RoundController {
    tx: mpsc::UnboundedSender<RoundCommand>,
}

impl RoundController {
    pub fn send(&self, command: RoundCommand) -> LiveResult<()> {
        self.tx
            .send(command)
            .map_err(|e| LiveError::ChannelSend(e.to_string()))
    }

    pub fn request_hint(&self) -> LiveResult<()> {
        self.send(RoundCommand::RequestHint)
    }

    pub fn submit_answer(&self, text: impl Into<String>) -> LiveResult<()> {
        self.send(RoundCommand::SubmitAnswer(text.into()))
    }

    pub fn stop(&self) -> LiveResult<()> {
        self.send(RoundCommand::Stop)
    }
}

/// How a streaming phase ended.
enum StreamEnd {
    Dropped(String),
    Finished,
    Stopped,
}

/// Result of waiting for a connection.
enum ConnectStep {
    Connected(Box<dyn LiveTransport>),
    Failed(LiveError),
    Stopped,
}

pub struct LiveSession {
    config: Arc<SessionConfig>,
    round: Arc<RoundSetup>,
    connector: Arc<dyn Connector>,
    microphone: Arc<dyn MicrophoneSource>,
    scheduler: PlaybackScheduler,
    ended_rx: Option<mpsc::UnboundedReceiver<ChunkId>>,
    bridge: ToolCallBridge,
    tracker: TranscriptTracker,
    progress: GameProgressState,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<RoundEvent>,
    commands: mpsc::UnboundedReceiver<RoundCommand>,
    commands_open: bool,
    state: SessionState,
    capture: Option<CaptureStream>,
    gate: Option<FrameGate>,
    frame_rx: Option<mpsc::Receiver<AudioFrame>>,
    clean_disconnect: bool,
    finish_at: Option<Instant>,
    started: bool,
    reconnects: u32,
}

impl LiveSession {
    /// Build a round. Nothing is acquired until [`LiveSession::run`].
    pub fn new(
        config: Arc<SessionConfig>,
        round: Arc<RoundSetup>,
        connector: Arc<dyn Connector>,
        microphone: Arc<dyn MicrophoneSource>,
        output: Box<dyn AudioOutput>,
    ) -> (Self, RoundController, mpsc::UnboundedReceiver<RoundEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let mut scheduler = PlaybackScheduler::new(output);
        let ended_rx = scheduler.take_ended_receiver();

        let session = Self {
            policy: config.reconnect_policy(),
            tracker: TranscriptTracker::new(&config.end_phrases),
            bridge: ToolCallBridge::new(round.questions.clone()),
            config,
            round,
            connector,
            microphone,
            scheduler,
            ended_rx,
            progress: GameProgressState::new(),
            events: event_tx,
            commands: command_rx,
            commands_open: true,
            state: SessionState::Idle,
            capture: None,
            gate: None,
            frame_rx: None,
            clean_disconnect: false,
            finish_at: None,
            started: false,
            reconnects: 0,
        };
        (session, RoundController { tx: command_tx }, event_rx)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Play the round to completion, a caller stop, or a fatal error.
    ///
    /// Fatal errors are reported as [`RoundEvent::RoundError`] after every
    /// resource has been released.
    pub async fn run(mut self) -> LiveResult<RoundReport> {
        info!(
            "🎙️ Starting live round: {} ({}, host {})",
            self.round.topic, self.round.difficulty, self.round.host.name
        );

        // The microphone comes first: no usable input means no connection at all.
        let (sink, gate, frame_rx) = capture_pipeline(self.config.frame_size);
        let microphone = self.microphone.clone();
        let opened = tokio::task::spawn_blocking(move || microphone.open(sink))
            .await
            .unwrap_or_else(|e| Err(LiveError::MicrophoneUnavailable(e.to_string())));
        match opened {
            Ok(stream) => {
                self.capture = Some(stream);
                self.gate = Some(gate);
                self.frame_rx = Some(frame_rx);
            }
            Err(e) => {
                let e = match e {
                    LiveError::MicrophoneUnavailable(_) => e,
                    other => LiveError::MicrophoneUnavailable(other.to_string()),
                };
                return Err(self.fail(e, None).await);
            }
        }

        let mut resuming = false;
        loop {
            self.set_state(SessionState::Connecting);
            let mut transport = match self.connect().await {
                ConnectStep::Connected(transport) => transport,
                ConnectStep::Stopped => return Ok(self.shutdown(RoundOutcome::Stopped, None).await),
                ConnectStep::Failed(e) if e.is_transient() => {
                    warn!("connect attempt failed: {}", e);
                    if let Err(fatal) = self.back_off().await {
                        return Err(self.fail(fatal, None).await);
                    }
                    if self.clean_disconnect {
                        return Ok(self.shutdown(RoundOutcome::Stopped, None).await);
                    }
                    continue;
                }
                ConnectStep::Failed(e) => return Err(self.fail(e, None).await),
            };

            self.policy.reset();
            self.set_state(SessionState::Open);
            if resuming {
                let prompt = self.round.resume_prompt(self.progress.answered(), self.progress.score);
                if let Err(e) = transport.send(&ClientMessage::text_turn(prompt)).await {
                    warn!("resume prompt failed: {}", e);
                    self.on_drop(e.to_string());
                    if let Err(fatal) = self.back_off().await {
                        return Err(self.fail(fatal, None).await);
                    }
                    if self.clean_disconnect {
                        return Ok(self.shutdown(RoundOutcome::Stopped, None).await);
                    }
                    continue;
                }
            }
            self.begin_streaming();

            match self.stream(transport.as_mut()).await {
                StreamEnd::Finished => {
                    return Ok(self.shutdown(RoundOutcome::Finished, Some(transport.as_mut())).await)
                }
                StreamEnd::Stopped => {
                    return Ok(self.shutdown(RoundOutcome::Stopped, Some(transport.as_mut())).await)
                }
                StreamEnd::Dropped(reason) => {
                    drop(transport);
                    self.on_drop(reason);
                    resuming = true;
                    if let Err(fatal) = self.back_off().await {
                        return Err(self.fail(fatal, None).await);
                    }
                    if self.clean_disconnect {
                        return Ok(self.shutdown(RoundOutcome::Stopped, None).await);
                    }
                }
            }
        }
    }

    async fn connect(&mut self) -> ConnectStep {
        let connector = self.connector.clone();
        let config = self.config.clone();
        let connect = connector.connect(&config);
        tokio::pin!(connect);
        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(transport) => ConnectStep::Connected(transport),
                        Err(e) => ConnectStep::Failed(e),
                    };
                }
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(RoundCommand::Stop) => return ConnectStep::Stopped,
                    Some(other) => warn!(?other, "not connected, command dropped"),
                    None => self.commands_open = false,
                },
            }
        }
    }

    /// Wait out the next backoff step. `Err(ConnectionLost)` once the policy is spent.
    async fn back_off(&mut self) -> LiveResult<()> {
        self.set_state(SessionState::Error);
        let (attempt, delay) = self.policy.next_attempt().ok_or(LiveError::ConnectionLost {
            attempts: self.policy.max_attempts(),
        })?;
        self.reconnects += 1;
        info!(attempt, max = self.policy.max_attempts(), ?delay, "🔄 Reconnecting");
        self.emit(RoundEvent::ReconnectAttempt {
            attempt,
            max: self.policy.max_attempts(),
        });
        self.set_state(SessionState::Reconnecting);

        let wake = sleep(delay);
        tokio::pin!(wake);
        loop {
            tokio::select! {
                _ = &mut wake => return Ok(()),
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(RoundCommand::Stop) => {
                        self.clean_disconnect = true;
                        return Ok(());
                    }
                    Some(other) => warn!(?other, "reconnecting, command dropped"),
                    None => self.commands_open = false,
                },
            }
        }
    }

    fn begin_streaming(&mut self) {
        if let Some(gate) = &self.gate {
            if let Some(rx) = self.frame_rx.as_mut() {
                // stale frame from before the drop
                let stale = gate.discard_queued(rx);
                if stale > 0 {
                    debug!(stale, "discarded frames queued before the drop");
                }
            }
            gate.open();
        }
        self.bridge.mark_question_presented(Instant::now());
        self.set_state(SessionState::Streaming);
        if !self.started {
            self.started = true;
            self.emit(RoundEvent::RoundStarted);
        }
    }

    /// The line dropped: stop sending, cut off the host mid-sentence.
    fn on_drop(&mut self, reason: String) {
        warn!("⚠️ Live connection lost: {}", reason);
        if let Some(gate) = &self.gate {
            gate.close();
        }
        self.scheduler.interrupt();
        self.report_speaking();
        self.tracker.commit_turn();
    }

    async fn stream(&mut self, transport: &mut dyn LiveTransport) -> StreamEnd {
        loop {
            let finish_at = self.finish_at.unwrap_or_else(Instant::now);
            tokio::select! {
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(RoundCommand::Stop) => return StreamEnd::Stopped,
                    Some(command) => {
                        if let Err(e) = self.handle_command(transport, command).await {
                            return self.lost(e.to_string());
                        }
                    }
                    None => self.commands_open = false,
                },
                frame = next_frame(&mut self.frame_rx) => match frame {
                    Some(frame) => {
                        if let Err(e) = transport.send(&ClientMessage::audio(&frame)).await {
                            if let Some(gate) = &self.gate {
                                gate.mark_undelivered(1);
                            }
                            return self.lost(e.to_string());
                        }
                    }
                    None => {
                        warn!("microphone stream ended");
                        self.frame_rx = None;
                    }
                },
                message = transport.recv() => match message {
                    Ok(Some(message)) => {
                        if let Err(e) = self.handle_message(transport, message).await {
                            return self.lost(e.to_string());
                        }
                    }
                    Ok(None) if self.clean_disconnect => return StreamEnd::Stopped,
                    Ok(None) => return self.lost("connection closed".to_string()),
                    Err(LiveError::Protocol(e)) => warn!("ignoring unreadable message: {}", e),
                    Err(e) => return self.lost(e.to_string()),
                },
                ended = next_ended(&mut self.ended_rx) => match ended {
                    Some(id) => {
                        self.scheduler.on_chunk_ended(id);
                        self.report_speaking();
                    }
                    None => self.ended_rx = None,
                },
                _ = sleep_until(finish_at), if self.finish_at.is_some() => {
                    return StreamEnd::Finished;
                }
            }
        }
    }

    /// The connection went away mid-stream. Once the show is over there is
    /// nothing left to resume, so the round simply finishes.
    fn lost(&self, reason: String) -> StreamEnd {
        if self.finish_at.is_some() {
            info!("connection ended after the show ended ({})", reason);
            StreamEnd::Finished
        } else {
            StreamEnd::Dropped(reason)
        }
    }

    async fn handle_command(&mut self, transport: &mut dyn LiveTransport, command: RoundCommand) -> LiveResult<()> {
        match command {
            RoundCommand::RequestHint => {
                if self.bridge.mark_hint_used() {
                    info!("💡 Hint requested");
                    transport.send(&ClientMessage::text_turn(HINT_REQUEST)).await?;
                } else {
                    info!("hint already used for this question");
                }
            }
            RoundCommand::SubmitAnswer(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    debug!(answer = text, "typed answer");
                    transport
                        .send(&ClientMessage::text_turn(format!("My answer is: {}", text)))
                        .await?;
                }
            }
            RoundCommand::Stop => {}
        }
        Ok(())
    }

    /// Process one inbound message. Only transport failures are returned;
    /// per-message problems are logged and skipped.
    async fn handle_message(&mut self, transport: &mut dyn LiveTransport, message: ServerMessage) -> LiveResult<()> {
        for event in message.into_events() {
            match event {
                ServerEvent::SetupComplete => debug!("late setupComplete ignored"),
                ServerEvent::Audio { data, sample_rate } => {
                    match decode_frame(&data, sample_rate, 1) {
                        Ok(buffer) => {
                            if let Err(e) = self.scheduler.schedule(buffer) {
                                warn!("could not schedule chunk: {}", e);
                            }
                        }
                        Err(e) => warn!("dropping audio chunk: {}", e),
                    }
                    self.report_speaking();
                }
                ServerEvent::Interrupted => {
                    debug!("host interrupted");
                    self.scheduler.interrupt();
                    self.report_speaking();
                    self.tracker.commit_turn();
                }
                ServerEvent::InputTranscript(text) => {
                    self.tracker.append(Speaker::User, &text);
                    self.emit(RoundEvent::TranscriptAppended {
                        speaker: Speaker::User,
                        text,
                    });
                }
                ServerEvent::OutputTranscript(text) => {
                    let ended = self.tracker.append(Speaker::Host, &text);
                    self.emit(RoundEvent::TranscriptAppended {
                        speaker: Speaker::Host,
                        text,
                    });
                    if ended {
                        self.schedule_finish();
                    }
                }
                ServerEvent::ToolCall(call) => {
                    let (ack, outcome) = self.bridge.handle(&call, &mut self.progress, Instant::now());
                    if let Some(ack) = ack {
                        transport.send(&ClientMessage::tool_response(vec![ack])).await?;
                    }
                    match outcome {
                        ToolOutcome::ScoreRecorded(result) => {
                            let stats = self.progress.live_stats();
                            self.emit(RoundEvent::ScoreUpdated { result, stats });
                        }
                        ToolOutcome::EndShow => self.schedule_finish(),
                        ToolOutcome::Rejected(_) | ToolOutcome::Unknown(_) | ToolOutcome::Duplicate => {}
                    }
                }
                ServerEvent::ToolCallCancellation(ids) => self.bridge.cancel(&ids),
                ServerEvent::TurnComplete => {
                    debug!("turn complete");
                    self.tracker.commit_turn();
                }
                ServerEvent::GoAway { time_left } => {
                    warn!(?time_left, "service is about to close the connection");
                }
                ServerEvent::Error(e) => warn!("service reported an error: {}", e),
            }
        }
        Ok(())
    }

    fn schedule_finish(&mut self) {
        if self.finish_at.is_none() {
            info!("🏁 Show over, finishing in {:?}", self.config.finish_grace);
            self.finish_at = Some(Instant::now() + self.config.finish_grace);
        }
    }

    /// Release everything, in order: clean flag, outbound gate, microphone,
    /// playback, timer, transport.
    async fn teardown(&mut self, transport: Option<&mut dyn LiveTransport>) {
        self.clean_disconnect = true;
        if let Some(gate) = &self.gate {
            gate.close();
        }
        if let Some(capture) = self.capture.take() {
            // releasing a device joins its capture thread
            if let Err(e) = tokio::task::spawn_blocking(move || drop(capture)).await {
                warn!("microphone release failed: {}", e);
            }
        }
        self.scheduler.interrupt();
        self.report_speaking();
        self.finish_at = None;
        self.tracker.commit_turn();
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                debug!("close failed: {}", e);
            }
        }
        self.set_state(SessionState::Closed);
    }

    async fn shutdown(&mut self, outcome: RoundOutcome, transport: Option<&mut dyn LiveTransport>) -> RoundReport {
        self.teardown(transport).await;
        if outcome == RoundOutcome::Finished {
            info!("🎉 Round finished with score {}", self.progress.score);
            self.emit(RoundEvent::RoundFinished {
                final_score: self.progress.score,
                results: self.progress.result_log.clone(),
            });
        } else {
            info!("⏹️ Round stopped by the player");
        }
        let (frames_sent, frames_dropped) = self
            .gate
            .as_ref()
            .map(|g| (g.sent(), g.dropped()))
            .unwrap_or_default();
        RoundReport {
            outcome,
            progress: self.progress.clone(),
            transcript: self.tracker.entries().to_vec(),
            frames_sent,
            frames_dropped,
            reconnects: self.reconnects,
        }
    }

    async fn fail(&mut self, e: LiveError, transport: Option<&mut dyn LiveTransport>) -> LiveError {
        error!("❌ Live round failed: {}", e);
        self.teardown(transport).await;
        self.emit(RoundEvent::RoundError(e.to_string()));
        e
    }

    fn report_speaking(&mut self) {
        if let Some(speaking) = self.scheduler.take_speaking_change() {
            self.emit(RoundEvent::HostSpeaking(speaking));
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "session state");
            self.state = state;
            self.emit(RoundEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: RoundEvent) {
        let _ = self.events.send(event);
    }
}

async fn next_frame(rx: &mut Option<mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_ended(rx: &mut Option<mpsc::UnboundedReceiver<ChunkId>>) -> Option<ChunkId> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
