pub mod capture;
pub mod conversation;
pub mod interviewer;
pub mod playback;
pub mod prompts;
pub mod result;
pub mod runtime;
pub mod session_state;
pub mod store;

#[cfg(test)]
mod test_support;

/// Represents the user-facing controls a runtime can send to an interview session.
///
/// This enum is the primary API for decoupling the caller (terminal, web socket, UI)
/// from the engine that owns the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask the interviewer for a greeting and the first question.
    Start,
    /// Begin capturing the candidate's spoken answer.
    StartListening,
    /// Stop capturing and submit whatever was transcribed.
    StopAndSubmit,
    /// Stop audio and wrap the interview up with a closing evaluation.
    End,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::StartListening => "start_listening",
            Command::StopAndSubmit => "stop_and_submit",
            Command::End => "end_interview",
        }
    }
}
