//! Turns a finished conversation into the record handed to the session store.

use crate::conversation::{ConversationMessage, MAX_OVERALL_SCORE, Role, ScoreLedger, SessionConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score given to an answer the interviewer never scored.
pub const NEUTRAL_QUESTION_SCORE: f64 = 5.0;
/// Overall score when neither an evaluation nor per-question scores exist.
pub const NEUTRAL_OVERALL_SCORE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewMode {
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Every question was answered.
    Completed,
    /// The candidate ended the interview before the last answer.
    EndedEarly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionEvaluation {
    pub score: f64,
    /// What the interviewer said right after the answer.
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub index: usize,
    pub text: String,
    pub evaluation: QuestionEvaluation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub role: String,
    pub topic: String,
    pub mode: InterviewMode,
    pub status: SessionStatus,
    pub total_questions: usize,
    pub questions: Vec<String>,
    pub answers: Vec<AnswerEntry>,
    pub overall_score: u32,
    pub conversation: Vec<ConversationMessage>,
    pub completed_at: DateTime<Utc>,
}

/// Builds the session record. Pure: no I/O, no clock reads.
pub fn assemble(
    config: &SessionConfig,
    messages: &[ConversationMessage],
    scores: &ScoreLedger,
    completed_at: DateTime<Utc>,
) -> SessionRecord {
    let questions = messages
        .iter()
        .filter(|message| message.is_question())
        .map(|message| message.content.clone())
        .collect();

    let mut answers: Vec<AnswerEntry> = Vec::new();
    let user_messages = messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.role == Role::User);
    for (ordinal, (position, message)) in user_messages.enumerate() {
        let index = message.question_index.unwrap_or(ordinal);
        let feedback = messages[position + 1..]
            .iter()
            .find(|next| next.role == Role::Ai)
            .map(|next| next.content.clone())
            .unwrap_or_default();
        let entry = AnswerEntry {
            index,
            text: message.content.clone(),
            evaluation: QuestionEvaluation {
                score: scores.score_for(index).unwrap_or(NEUTRAL_QUESTION_SCORE),
                feedback,
            },
        };
        // A question answered again after a failed turn keeps only the latest answer.
        match answers.iter_mut().find(|existing| existing.index == index) {
            Some(existing) => *existing = entry,
            None => answers.push(entry),
        }
    }

    // Only an answer to the last question triggers the evaluation on its own.
    let status = if answers
        .iter()
        .any(|answer| answer.index + 1 >= config.total_questions)
    {
        SessionStatus::Completed
    } else {
        SessionStatus::EndedEarly
    };

    SessionRecord {
        role: config.role.clone(),
        topic: config.topic.clone(),
        mode: InterviewMode::Voice,
        status,
        total_questions: config.total_questions,
        questions,
        answers,
        overall_score: overall_score(scores),
        conversation: messages.to_vec(),
        completed_at,
    }
}

fn overall_score(scores: &ScoreLedger) -> u32 {
    let score = scores
        .overall
        .or_else(|| scores.question_mean().map(|mean| mean * 10.0));
    match score {
        Some(score) => score.round().clamp(0.0, MAX_OVERALL_SCORE) as u32,
        None => NEUTRAL_OVERALL_SCORE,
    }
}
