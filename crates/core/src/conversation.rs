use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message in the interview transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Ai,
    User,
}

/// What a message is doing in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Greeting,
    Question,
    Answer,
    Closing,
}

/// A single entry of the interview transcript. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    /// For answers, the zero-based question being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
}

impl ConversationMessage {
    pub fn new(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            kind,
            question_index: None,
        }
    }

    pub fn ai(kind: MessageKind, content: impl Into<String>) -> Self {
        Self::new(Role::Ai, kind, content)
    }

    pub fn answer(question_index: usize, content: impl Into<String>) -> Self {
        Self {
            question_index: Some(question_index),
            ..Self::new(Role::User, MessageKind::Answer, content)
        }
    }

    /// Returns true for AI messages that put a question to the candidate.
    pub fn is_question(&self) -> bool {
        self.role == Role::Ai && matches!(self.kind, MessageKind::Greeting | MessageKind::Question)
    }
}

/// The `{role, content}` projection of a message that is sent to the interviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl From<&ConversationMessage> for HistoryEntry {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Fixed at session start and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub role: String,
    pub topic: String,
    pub total_questions: usize,
}

impl SessionConfig {
    pub fn new(
        role: impl Into<String>,
        topic: impl Into<String>,
        total_questions: usize,
    ) -> Result<Self> {
        if total_questions == 0 {
            return Err(anyhow::anyhow!("An interview needs at least one question"));
        }
        Ok(Self {
            role: role.into(),
            topic: topic.into(),
            total_questions,
        })
    }
}

/// Upper bound of a per-question score.
pub const MAX_QUESTION_SCORE: f64 = 10.0;
/// Upper bound of the overall interview score.
pub const MAX_OVERALL_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub question_index: usize,
    pub score: f64,
}

/// Per-question scores plus the overall score of the closing evaluation.
///
/// The two are kept apart: the overall score is never appended to `per_question`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreLedger {
    pub per_question: Vec<QuestionScore>,
    pub overall: Option<f64>,
}

impl ScoreLedger {
    /// Appends the score for the answer to `question_index`, clamped to 0..=10.
    /// Non-finite values are dropped.
    pub fn record_question(&mut self, question_index: usize, score: f64) -> bool {
        if !score.is_finite() {
            return false;
        }
        self.per_question.push(QuestionScore {
            question_index,
            score: score.clamp(0.0, MAX_QUESTION_SCORE),
        });
        true
    }

    /// The most recent score recorded for `question_index`.
    pub fn score_for(&self, question_index: usize) -> Option<f64> {
        self.per_question
            .iter()
            .rev()
            .find(|entry| entry.question_index == question_index)
            .map(|entry| entry.score)
    }

    /// Scores in the order they were recorded.
    pub fn question_scores(&self) -> Vec<f64> {
        self.per_question.iter().map(|entry| entry.score).collect()
    }

    /// Sets the overall score, clamped to 0..=100. Non-finite values are dropped.
    pub fn record_overall(&mut self, score: f64) -> bool {
        if !score.is_finite() {
            return false;
        }
        self.overall = Some(score.clamp(0.0, MAX_OVERALL_SCORE));
        true
    }

    pub fn question_mean(&self) -> Option<f64> {
        if self.per_question.is_empty() {
            return None;
        }
        let total: f64 = self.per_question.iter().map(|entry| entry.score).sum();
        Some(total / self.per_question.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_rejects_zero_questions() {
        assert!(SessionConfig::new("Backend Engineer", "Rust", 0).is_err());
        let config = SessionConfig::new("Backend Engineer", "Rust", 3).unwrap();
        assert_eq!(config.total_questions, 3);
    }

    #[test]
    fn ledger_clamps_and_drops_invalid_scores() {
        let mut ledger = ScoreLedger::default();
        assert!(ledger.record_question(0, 12.0));
        assert!(ledger.record_question(1, -1.0));
        assert!(!ledger.record_question(2, f64::NAN));
        assert_eq!(ledger.question_scores(), vec![10.0, 0.0]);

        assert!(ledger.record_overall(140.0));
        assert_eq!(ledger.overall, Some(100.0));
        // The overall score never leaks into the per-question ledger.
        assert_eq!(ledger.per_question.len(), 2);
        assert_eq!(ledger.question_mean(), Some(5.0));
    }

    #[test]
    fn only_ai_greetings_and_questions_count_as_questions() {
        assert!(ConversationMessage::ai(MessageKind::Greeting, "Hi, tell me about you").is_question());
        assert!(ConversationMessage::ai(MessageKind::Question, "Why Rust?").is_question());
        assert!(!ConversationMessage::ai(MessageKind::Closing, "Thanks").is_question());
        assert!(!ConversationMessage::answer(0, "Because").is_question());
    }

    #[test]
    fn ledger_looks_up_latest_score_per_question() {
        let mut ledger = ScoreLedger::default();
        ledger.record_question(0, 4.0);
        ledger.record_question(2, 9.0);
        ledger.record_question(0, 7.0);

        assert_eq!(ledger.score_for(0), Some(7.0));
        assert_eq!(ledger.score_for(1), None);
        assert_eq!(ledger.score_for(2), Some(9.0));
    }
}
