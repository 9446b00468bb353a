use crate::conversation::Role;
use crate::interviewer::{TurnPhase, TurnRequest};

const GREETING_PROMPT: &str = r#"You are a friendly but rigorous interviewer running a spoken mock interview for a {role} position, focused on {topic}.

Greet the candidate warmly in one or two sentences, then ask the first of {total_questions} questions.
Keep it conversational: this text will be read aloud, so no markdown, lists or code.

Respond STRICTLY as JSON:
{"response": "<greeting followed by question 1>", "isLastQuestion": false}"#;

const QUESTIONING_PROMPT: &str = r#"You are interviewing a candidate for a {role} position, focused on {topic}. This is a spoken interview.

Conversation so far:
---
{history}
---

Briefly acknowledge the candidate's last answer (one sentence), then ask question {question_number} of {total_questions}.
Score the last answer from 0 to 10 for correctness, depth and clarity.
Keep it conversational: this text will be read aloud, so no markdown, lists or code.

Respond STRICTLY as JSON:
{"response": "<acknowledgement and next question>", "score": <0-10>, "isLastQuestion": <true if this is question {total_questions}>}"#;

const EVALUATING_PROMPT: &str = r#"You have just finished a spoken mock interview for a {role} position, focused on {topic}.

Full conversation:
---
{history}
---

Thank the candidate and give a short spoken closing remark (two or three sentences) with one strength and one thing to improve.
Score the whole interview from 0 to 100.

Respond STRICTLY as JSON:
{"response": "<closing remark>", "score": <0-100>, "isLastQuestion": true}"#;

/// Prompt templates, one per turn phase.
///
/// Templates may use `{role}`, `{topic}`, `{question_number}`, `{total_questions}`
/// and `{history}`; anything else is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub greeting: String,
    pub questioning: String,
    pub evaluating: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            greeting: GREETING_PROMPT.to_string(),
            questioning: QUESTIONING_PROMPT.to_string(),
            evaluating: EVALUATING_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    pub fn template(&self, phase: TurnPhase) -> &str {
        match phase {
            TurnPhase::Greeting => &self.greeting,
            TurnPhase::Questioning => &self.questioning,
            TurnPhase::Evaluating => &self.evaluating,
        }
    }

    pub fn set_template(&mut self, phase: TurnPhase, template: String) {
        match phase {
            TurnPhase::Greeting => self.greeting = template,
            TurnPhase::Questioning => self.questioning = template,
            TurnPhase::Evaluating => self.evaluating = template,
        }
    }

    /// Fills the placeholders in one pass over the template, so braces inside
    /// substituted values are never expanded again.
    pub fn render(&self, request: &TurnRequest) -> String {
        let template = self.template(request.phase);
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let value = tail
                .find('}')
                .and_then(|close| Some((close, placeholder(&tail[1..close], request)?)));
            match value {
                Some((close, value)) => {
                    out.push_str(&value);
                    rest = &tail[close + 1..];
                }
                None => {
                    // Not a placeholder, e.g. the JSON shape in the instructions.
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn placeholder(name: &str, request: &TurnRequest) -> Option<String> {
    let value = match name {
        "role" => request.role.clone(),
        "topic" => request.topic.clone(),
        "question_number" => (request.question_index + 1).to_string(),
        "total_questions" => request.total_questions.to_string(),
        "history" => format_history(request),
        _ => return None,
    };
    Some(value)
}

fn format_history(request: &TurnRequest) -> String {
    if request.history.is_empty() {
        return "(no conversation yet)".to_string();
    }
    request
        .history
        .iter()
        .map(|entry| {
            let speaker = match entry.role {
                Role::Ai => "Interviewer",
                Role::User => "Candidate",
            };
            format!("{speaker}: {}", entry.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
