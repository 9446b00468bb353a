use crate::{
    Command,
    capture::SpeechCapture,
    conversation::{ConversationMessage, HistoryEntry, MessageKind, ScoreLedger, SessionConfig},
    interviewer::{Interviewer, TurnPhase, TurnRequest, TurnResponse},
    playback::SpeechPlayback,
    result::{self, SessionRecord},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Spoken when the closing evaluation could not be produced.
pub const FALLBACK_CLOSING: &str =
    "Thank you for your time today. That concludes our interview, and your results are being prepared.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Greeting,
    /// Name of the follow-up turn on the interviewer's side. The engine waits in
    /// `Processing` while that turn runs and never rests here.
    Questioning,
    Listening,
    Processing,
    Evaluating,
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Greeting => "greeting",
            Phase::Questioning => "questioning",
            Phase::Listening => "listening",
            Phase::Processing => "processing",
            Phase::Evaluating => "evaluating",
            Phase::Finished => "finished",
        }
    }

    /// Phases in which an interviewer call is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Phase::Greeting | Phase::Questioning | Phase::Processing | Phase::Evaluating
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can go wrong while driving an interview. Each error is also
/// kept in the session's error slot until the next successful command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Cannot {command} while the interview is {phase}")]
    InvalidPhase { command: &'static str, phase: Phase },
    #[error("No answer was heard. Please try speaking again.")]
    EmptyTranscript,
    #[error("Speech recognition is not supported on this device")]
    CaptureUnsupported,
    #[error("Could not start listening: {0}")]
    Capture(String),
    #[error("The interviewer could not respond: {0}")]
    Interviewer(String),
    #[error("The interviewer did not respond within {0:?}")]
    TimedOut(Duration),
}

/// What the injected speech adapters can do, resolved once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub capture: bool,
    pub playback: bool,
}

impl Capabilities {
    pub fn negotiate(capture: &dyn SpeechCapture, playback: &dyn SpeechPlayback) -> Self {
        Self {
            capture: capture.is_supported(),
            playback: playback.is_supported(),
        }
    }
}

/// Read-only view of the session, published on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub question_index: usize,
    pub total_questions: usize,
    pub messages: Vec<ConversationMessage>,
    pub scores: ScoreLedger,
    pub error: Option<String>,
    pub listening: bool,
}

/// The voice interview turn engine.
///
/// Owns the phase, the transcript and the score ledger; nothing else writes
/// to them. Commands take `&mut self`, so at most one interviewer call is ever
/// outstanding, and commands that do not fit the current phase are rejected.
pub struct InterviewSession {
    config: SessionConfig,
    phase: Phase,
    messages: Vec<ConversationMessage>,
    scores: ScoreLedger,
    question_index: usize,
    last_error: Option<String>,
    listening: bool,
    evaluation_attempted: bool,
    capabilities: Capabilities,
    turn_timeout: Option<Duration>,
    interviewer: Arc<dyn Interviewer>,
    capture: Arc<dyn SpeechCapture>,
    playback: Arc<dyn SpeechPlayback>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl InterviewSession {
    pub fn new(
        config: SessionConfig,
        interviewer: Arc<dyn Interviewer>,
        capture: Arc<dyn SpeechCapture>,
        playback: Arc<dyn SpeechPlayback>,
    ) -> Self {
        let capabilities = Capabilities::negotiate(capture.as_ref(), playback.as_ref());
        if !capabilities.capture {
            tracing::warn!("Speech capture unavailable; answers cannot be recorded");
        }
        if !capabilities.playback {
            tracing::warn!("Speech playback unavailable; interviewer turns will be text only");
        }

        let (snapshots, _) = watch::channel(SessionSnapshot {
            phase: Phase::Idle,
            question_index: 0,
            total_questions: config.total_questions,
            messages: Vec::new(),
            scores: ScoreLedger::default(),
            error: None,
            listening: false,
        });

        Self {
            config,
            phase: Phase::Idle,
            messages: Vec::new(),
            scores: ScoreLedger::default(),
            question_index: 0,
            last_error: None,
            listening: false,
            evaluation_attempted: false,
            capabilities,
            turn_timeout: None,
            interviewer,
            capture,
            playback,
            snapshots,
        }
    }

    /// Bounds every interviewer call. A call that overruns is treated as failed.
    pub fn with_turn_timeout(mut self, turn_timeout: Option<Duration>) -> Self {
        self.turn_timeout = turn_timeout;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn question_index(&self) -> usize {
        self.question_index
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn scores(&self) -> &ScoreLedger {
        &self.scores
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn capture(&self) -> Arc<dyn SpeechCapture> {
        self.capture.clone()
    }

    pub fn playback(&self) -> Arc<dyn SpeechPlayback> {
        self.playback.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            question_index: self.question_index,
            total_questions: self.config.total_questions,
            messages: self.messages.clone(),
            scores: self.scores.clone(),
            error: self.last_error.clone(),
            listening: self.listening,
        }
    }

    /// Assembles the session record. Meant to be called once the session is finished.
    pub fn result(&self, completed_at: DateTime<Utc>) -> SessionRecord {
        result::assemble(&self.config, &self.messages, &self.scores, completed_at)
    }

    pub async fn execute(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Start => self.start().await,
            Command::StartListening => self.start_listening(),
            Command::StopAndSubmit => self.stop_and_submit().await,
            Command::End => self.end_interview().await,
        }
    }

    /// Asks for the greeting and the first question, speaks it, and waits for an answer.
    /// If the interviewer fails the session goes back to `Idle` so start can be retried.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.ensure_phase(Command::Start, Phase::Idle)?;
        self.last_error = None;
        self.set_phase(Phase::Greeting);

        let request = self.turn_request(TurnPhase::Greeting, 0, Vec::new());
        match self.call_interviewer(&request).await {
            Ok(turn) => {
                self.say(MessageKind::Greeting, turn.response).await;
                self.set_phase(Phase::Listening);
                Ok(())
            }
            Err(err) => {
                self.set_phase(Phase::Idle);
                Err(self.fail(err))
            }
        }
    }

    pub fn start_listening(&mut self) -> Result<(), EngineError> {
        self.ensure_phase(Command::StartListening, Phase::Listening)?;
        if !self.capabilities.capture {
            return Err(self.fail(EngineError::CaptureUnsupported));
        }

        self.capture.reset();
        if let Err(e) = self.capture.start() {
            return Err(self.fail(EngineError::Capture(format!("{e:#}"))));
        }

        tracing::debug!("Listening for answer to question {}", self.question_index + 1);
        self.last_error = None;
        self.listening = true;
        self.publish();
        Ok(())
    }

    /// Stops capture and submits what was heard. An empty transcript is rejected
    /// without touching the phase.
    pub async fn stop_and_submit(&mut self) -> Result<(), EngineError> {
        self.ensure_phase(Command::StopAndSubmit, Phase::Listening)?;
        self.stop_capture();

        let Some(answer) = self.capture.transcript().submission() else {
            return Err(self.fail(EngineError::EmptyTranscript));
        };
        self.capture.reset();
        self.last_error = None;

        tracing::info!("Candidate answered question {}", self.question_index + 1);
        self.push_message(ConversationMessage::answer(self.question_index, answer));

        let next_index = self.question_index + 1;
        if next_index >= self.config.total_questions {
            self.evaluate().await
        } else {
            self.ask_next_question(next_index).await
        }
    }

    /// Halts audio at once and wraps the interview up. Runs the closing evaluation
    /// unless one was already attempted. A no-op once finished.
    pub async fn end_interview(&mut self) -> Result<(), EngineError> {
        if self.phase == Phase::Finished {
            tracing::debug!("Interview already finished; ignoring end request");
            return Ok(());
        }

        tracing::info!("Ending interview during {} phase", self.phase);
        self.playback.cancel();
        self.stop_capture();

        if self.evaluation_attempted {
            self.set_phase(Phase::Finished);
            return Ok(());
        }
        self.evaluate().await
    }

    async fn ask_next_question(&mut self, next_index: usize) -> Result<(), EngineError> {
        self.set_phase(Phase::Processing);

        let request = self.turn_request(TurnPhase::Questioning, next_index, self.history());
        match self.call_interviewer(&request).await {
            Ok(turn) => {
                if let Some(score) = turn.score {
                    if !self.scores.record_question(self.question_index, score) {
                        tracing::warn!("Ignoring invalid question score: {}", score);
                    }
                }
                self.question_index = next_index;
                self.say(MessageKind::Question, turn.response).await;
                self.set_phase(Phase::Listening);
                Ok(())
            }
            Err(err) => {
                // The candidate may carry on without the acknowledgement.
                self.set_phase(Phase::Listening);
                Err(self.fail(err))
            }
        }
    }

    async fn evaluate(&mut self) -> Result<(), EngineError> {
        self.set_phase(Phase::Evaluating);
        self.evaluation_attempted = true;

        let request =
            self.turn_request(TurnPhase::Evaluating, self.question_index, self.history());
        let (closing, outcome) = match self.call_interviewer(&request).await {
            Ok(TurnResponse {
                response, score, ..
            }) => {
                if let Some(score) = score {
                    if !self.scores.record_overall(score) {
                        tracing::warn!("Ignoring invalid overall score: {}", score);
                    }
                }
                (response, Ok(()))
            }
            Err(err) => (FALLBACK_CLOSING.to_string(), Err(err)),
        };

        self.say(MessageKind::Closing, closing).await;
        self.stop_capture();
        self.set_phase(Phase::Finished);
        tracing::info!(
            "Interview finished with {} scored answers, overall {:?}",
            self.scores.per_question.len(),
            self.scores.overall
        );
        outcome.map_err(|err| self.fail(err))
    }

    async fn call_interviewer(&self, request: &TurnRequest) -> Result<TurnResponse, EngineError> {
        let call = self.interviewer.respond(request);
        let outcome = match self.turn_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!(
                        "Interviewer {} turn timed out after {:?}",
                        request.phase.as_str(),
                        limit
                    );
                    return Err(EngineError::TimedOut(limit));
                }
            },
            None => call.await,
        };

        outcome.map_err(|e| {
            tracing::error!("Interviewer {} turn failed: {:?}", request.phase.as_str(), e);
            EngineError::Interviewer(format!("{e:#}"))
        })
    }

    /// Appends an interviewer message and plays it. Playback errors count as finished playback.
    async fn say(&mut self, kind: MessageKind, text: String) {
        self.push_message(ConversationMessage::ai(kind, text.clone()));
        if !self.capabilities.playback {
            return;
        }
        if let Err(e) = self.playback.speak(&text).await {
            tracing::warn!("Playback failed, continuing: {:?}", e);
        }
    }

    fn stop_capture(&mut self) {
        self.capture.stop();
        if self.listening {
            self.listening = false;
            self.publish();
        }
    }

    fn ensure_phase(&mut self, command: Command, expected: Phase) -> Result<(), EngineError> {
        if self.phase == expected {
            return Ok(());
        }
        Err(self.fail(EngineError::InvalidPhase {
            command: command.as_str(),
            phase: self.phase,
        }))
    }

    fn history(&self) -> Vec<HistoryEntry> {
        self.messages.iter().map(HistoryEntry::from).collect()
    }

    fn turn_request(
        &self,
        phase: TurnPhase,
        question_index: usize,
        history: Vec<HistoryEntry>,
    ) -> TurnRequest {
        TurnRequest {
            history,
            role: self.config.role.clone(),
            topic: self.config.topic.clone(),
            question_index,
            total_questions: self.config.total_questions,
            phase,
        }
    }

    fn push_message(&mut self, message: ConversationMessage) {
        self.messages.push(message);
        self.publish();
    }

    fn set_phase(&mut self, phase: Phase) {
        tracing::info!("Interview phase {} -> {}", self.phase, phase);
        self.phase = phase;
        self.publish();
    }

    fn fail(&mut self, err: EngineError) -> EngineError {
        tracing::warn!("{}", err);
        self.last_error = Some(err.to_string());
        self.publish();
        err
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}
