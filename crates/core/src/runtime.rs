//! Runs an `InterviewSession` on its own task so a UI can send commands
//! without holding the engine.

use crate::Command;
use crate::capture::SpeechCapture;
use crate::playback::SpeechPlayback;
use crate::session_state::{InterviewSession, SessionSnapshot};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const COMMAND_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Still working on the previous step, {0} was ignored")]
    Busy(&'static str),
    #[error("The interview session has shut down")]
    Closed,
}

/// Caller-side handle to a running session.
///
/// Commands execute one at a time. While a dispatched command is queued or
/// running, or the session is in the middle of a transition, `dispatch` rejects
/// new commands instead of queueing them; only `end_interview` is always accepted.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    in_flight: Arc<AtomicBool>,
    snapshots: watch::Receiver<SessionSnapshot>,
    capture: Arc<dyn SpeechCapture>,
    playback: Arc<dyn SpeechPlayback>,
    task: JoinHandle<InterviewSession>,
}

impl SessionHandle {
    pub fn spawn(mut session: InterviewSession) -> Self {
        let (commands, mut command_rx) = mpsc::channel::<Command>(COMMAND_CAPACITY);
        let snapshots = session.subscribe();
        let capture = session.capture();
        let playback = session.playback();
        let in_flight = Arc::new(AtomicBool::new(false));

        let busy = in_flight.clone();
        let task = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                tracing::debug!("Running command {}", command.as_str());
                // Errors are already recorded in the session's error slot and snapshot.
                if let Err(e) = session.execute(command).await {
                    tracing::debug!("Command {} failed: {}", command.as_str(), e);
                }
                // `End` bypasses the flag, so it never owns it.
                if command != Command::End {
                    busy.store(false, Ordering::SeqCst);
                }
            }
            tracing::debug!("Command channel closed, session task exiting");
            session
        });

        Self {
            commands,
            in_flight,
            snapshots,
            capture,
            playback,
            task,
        }
    }

    /// Sends a command unless another one is still queued or running.
    pub fn dispatch(&self, command: Command) -> Result<(), DispatchError> {
        if command == Command::End {
            return self.halt_audio_and_enqueue_end();
        }
        if self.snapshots.borrow().phase.is_in_flight()
            || self
                .in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(DispatchError::Busy(command.as_str()));
        }
        self.commands.try_send(command).map_err(|e| {
            self.in_flight.store(false, Ordering::SeqCst);
            match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::Busy(command.as_str()),
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            }
        })
    }

    /// Stops playback and capture right away, then asks the session to wrap up
    /// once any in-flight interviewer call has settled.
    pub async fn end_interview(&self) -> Result<(), DispatchError> {
        self.playback.cancel();
        self.capture.stop();
        self.commands
            .send(Command::End)
            .await
            .map_err(|_| DispatchError::Closed)
    }

    fn halt_audio_and_enqueue_end(&self) -> Result<(), DispatchError> {
        self.playback.cancel();
        self.capture.stop();
        self.commands.try_send(Command::End).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::Busy(Command::End.as_str()),
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    pub fn snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) || self.snapshots.borrow().phase.is_in_flight()
    }

    /// Closes the command channel, waits for queued commands to drain and hands
    /// the session back for result assembly.
    pub async fn finish(self) -> Result<InterviewSession> {
        drop(self.commands);
        self.task.await.context("Interview session task panicked")
    }
}
