use crate::conversation::HistoryEntry;
use crate::prompts::PromptSet;
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, StatusCode, header::HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Rate-limited calls are retried at most this many times.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
const TEMPERATURE: f32 = 0.7;

/// Which kind of turn the interviewer is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPhase {
    Greeting,
    Questioning,
    Evaluating,
}

impl TurnPhase {
    pub const ALL: [TurnPhase; 3] = [
        TurnPhase::Greeting,
        TurnPhase::Questioning,
        TurnPhase::Evaluating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::Greeting => "greeting",
            TurnPhase::Questioning => "questioning",
            TurnPhase::Evaluating => "evaluating",
        }
    }
}

impl FromStr for TurnPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        TurnPhase::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown turn phase: {s}"))
    }
}

/// Everything the interviewer needs to produce one spoken turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub history: Vec<HistoryEntry>,
    pub role: String,
    pub topic: String,
    pub question_index: usize,
    pub total_questions: usize,
    pub phase: TurnPhase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnResponse {
    /// Short text meant to be read aloud.
    pub response: String,
    /// 0-10 for a follow-up turn, 0-100 for the closing evaluation.
    pub score: Option<f64>,
    pub is_last_question: bool,
}

impl TurnResponse {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            score: None,
            is_last_question: false,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

// The `Interviewer` trait is the seam between the turn engine and whatever
// model produces the interviewer's lines. The engine only ever talks to this
// trait, so tests drive it with `MockInterviewer` and production wires in
// `GeminiInterviewer`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Interviewer: Send + Sync {
    async fn respond(&self, request: &TurnRequest) -> Result<TurnResponse>;
}

/// Talks to the Gemini `generateContent` REST endpoint.
pub struct GeminiInterviewer {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    prompts: PromptSet,
}

impl GeminiInterviewer {
    pub fn new(api_key: SecretString, model: impl Into<String>, prompts: PromptSet) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            prompts,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: String) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: TEMPERATURE,
            },
        }
    }

    /// Posts the request, retrying only when the API answers 429.
    async fn generate(&self, body: &GenerateContentRequest) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", self.api_key.expose_secret())
                .json(body)
                .send()
                .await
                .context("Gemini request failed")?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RATE_LIMIT_RETRIES {
                let delay = retry_delay(attempt, response.headers().get("retry-after"));
                tracing::warn!(
                    "Gemini rate limited the request (attempt {}), retrying in {:?}",
                    attempt + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                return Err(anyhow::anyhow!("Gemini API returned {status}: {body_text}"));
            }

            let parsed: GenerateContentResponse = response
                .json()
                .await
                .context("Failed to decode Gemini response")?;
            return extract_text(parsed);
        }
    }
}

#[async_trait]
impl Interviewer for GeminiInterviewer {
    async fn respond(&self, request: &TurnRequest) -> Result<TurnResponse> {
        let prompt = self.prompts.render(request);
        tracing::debug!(
            "Requesting {} turn from {} ({} history entries)",
            request.phase.as_str(),
            self.model,
            request.history.len()
        );
        let body = self.request_body(prompt);
        let text = self.generate(&body).await?;
        parse_turn_response(&text)
    }
}

/// Backoff for the given retry attempt, honouring `Retry-After` (in seconds) when present.
pub fn retry_delay(attempt: u32, retry_after: Option<&HeaderValue>) -> Duration {
    let from_header = retry_after
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    from_header
        .unwrap_or_else(|| RETRY_BASE_DELAY * 2u32.saturating_pow(attempt))
        .min(RETRY_MAX_DELAY)
}

#[derive(Debug, Deserialize)]
struct RawTurnResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    score: Option<Value>,
    #[serde(default, rename = "isLastQuestion", alias = "is_last_question")]
    is_last_question: Option<bool>,
}

/// Parses the model's reply into a `TurnResponse`.
///
/// Models sometimes wrap JSON in markdown fences or add chatter around it, so
/// only the outermost `{...}` block is decoded. `score` may be a number or a
/// numeric string.
pub fn parse_turn_response(text: &str) -> Result<TurnResponse> {
    let json = extract_json_object(text)
        .ok_or_else(|| anyhow::anyhow!("Interviewer reply contains no JSON object: {text}"))?;
    let raw: RawTurnResponse =
        serde_json::from_str(json).context("Failed to parse interviewer reply")?;

    let response = raw
        .response
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Interviewer reply has no `response` text"))?;

    let score = raw.score.as_ref().and_then(|value| match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    });

    Ok(TurnResponse {
        response,
        score,
        is_last_question: raw.is_last_question.unwrap_or(false),
    })
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("No candidates returned by Gemini"))?;
    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn parses_plain_json_reply() {
        let reply = r#"{"response": "Great answer. Next, what is a mutex?", "score": 8, "isLastQuestion": false}"#;
        let turn = parse_turn_response(reply).unwrap();
        assert_eq!(turn.response, "Great answer. Next, what is a mutex?");
        assert_eq!(turn.score, Some(8.0));
        assert!(!turn.is_last_question);
    }

    #[test]
    fn parses_fenced_reply_with_string_score() {
        let reply = "Here you go:\n```json\n{\"response\": \"Thanks for your time.\", \"score\": \"81\", \"isLastQuestion\": true}\n```";
        let turn = parse_turn_response(reply).unwrap();
        assert_eq!(turn.response, "Thanks for your time.");
        assert_eq!(turn.score, Some(81.0));
        assert!(turn.is_last_question);
    }

    #[test]
    fn missing_score_and_flag_default() {
        let turn = parse_turn_response(r#"{"response": "Hello there!"}"#).unwrap();
        assert_eq!(turn.score, None);
        assert!(!turn.is_last_question);

        let turn = parse_turn_response(r#"{"response": "Hi", "score": "n/a"}"#).unwrap();
        assert_eq!(turn.score, None);
    }

    #[test]
    fn rejects_null_and_empty_replies() {
        assert!(parse_turn_response("null").is_err());
        assert!(parse_turn_response("").is_err());
        assert!(parse_turn_response(r#"{"response": "   "}"#).is_err());
        assert!(parse_turn_response(r#"{"score": 5}"#).is_err());
    }

    #[test]
    fn retry_delay_doubles_and_honours_header() {
        assert_eq!(retry_delay(0, None), Duration::from_secs(1));
        assert_eq!(retry_delay(2, None), Duration::from_secs(4));
        assert_eq!(retry_delay(10, None), RETRY_MAX_DELAY);

        let header = HeaderValue::from_static("7");
        assert_eq!(retry_delay(0, Some(&header)), Duration::from_secs(7));
        let garbage = HeaderValue::from_static("soon");
        assert_eq!(retry_delay(1, Some(&garbage)), Duration::from_secs(2));
    }

    #[test]
    fn request_body_asks_for_json() {
        let interviewer = GeminiInterviewer::new(
            SecretString::from("test-key".to_string()),
            DEFAULT_GEMINI_MODEL,
            PromptSet::default(),
        );
        let body = serde_json::to_value(interviewer.request_body("prompt".to_string())).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "prompt");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn turn_phase_parses_case_insensitively() {
        assert_eq!("Evaluating".parse::<TurnPhase>().unwrap(), TurnPhase::Evaluating);
        assert!("closing".parse::<TurnPhase>().is_err());
    }

    /// Serves one scripted `(status, body)` reply per connection on localhost and
    /// counts the requests it answered.
    async fn scripted_server(replies: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();
        tokio::spawn(async move {
            for (status, body) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let reason = match status {
                    200 => "OK",
                    429 => "Too Many Requests",
                    _ => "Internal Server Error",
                };
                let reply = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nRetry-After: 0\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (format!("http://{addr}"), served)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }

    fn gemini_reply(text: &str) -> String {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
        .to_string()
    }

    fn interviewer_at(base_url: String) -> GeminiInterviewer {
        GeminiInterviewer::new(
            SecretString::from("test-key".to_string()),
            DEFAULT_GEMINI_MODEL,
            PromptSet::default(),
        )
        .with_base_url(base_url)
    }

    fn greeting_request() -> TurnRequest {
        TurnRequest {
            history: vec![],
            role: "Backend Engineer".to_string(),
            topic: "Rust".to_string(),
            question_index: 0,
            total_questions: 3,
            phase: TurnPhase::Greeting,
        }
    }

    fn rate_limited() -> (u16, String) {
        (429, r#"{"error":{"code":429}}"#.to_string())
    }

    #[tokio::test]
    async fn test_rate_limited_calls_are_retried() {
        let ok = gemini_reply(r#"{"response": "Welcome! First question?", "score": null}"#);
        let (base_url, served) =
            scripted_server(vec![rate_limited(), rate_limited(), (200, ok)]).await;

        let turn = interviewer_at(base_url)
            .respond(&greeting_request())
            .await
            .unwrap();

        assert_eq!(turn.response, "Welcome! First question?");
        assert_eq!(served.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_three_retries() {
        let (base_url, served) = scripted_server(vec![rate_limited(); 4]).await;

        let err = interviewer_at(base_url)
            .respond(&greeting_request())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("429"), "unexpected error: {err:#}");
        assert_eq!(served.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_server_errors_are_not_retried() {
        let ok = gemini_reply(r#"{"response": "Too late."}"#);
        let (base_url, served) =
            scripted_server(vec![(500, r#"{"error":"boom"}"#.to_string()), (200, ok)]).await;

        let err = interviewer_at(base_url)
            .respond(&greeting_request())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("500"), "unexpected error: {err:#}");
        assert_eq!(served.load(Ordering::SeqCst), 1);
    }

    // This is an integration test that makes a live call to the Gemini API.
    // It is ignored by default so `cargo test` runs without an API key.
    // To run it, use `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_live_greeting_turn() {
        dotenvy::dotenv_override().ok();
        let api_key = env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY not set");
        let interviewer = GeminiInterviewer::new(
            SecretString::from(api_key),
            DEFAULT_GEMINI_MODEL,
            PromptSet::default(),
        );

        let request = TurnRequest {
            history: vec![],
            role: "Backend Engineer".to_string(),
            topic: "Rust concurrency".to_string(),
            question_index: 0,
            total_questions: 3,
            phase: TurnPhase::Greeting,
        };

        let turn = interviewer
            .respond(&request)
            .await
            .expect("greeting turn failed");
        println!("Greeting: {}", turn.response);
        assert!(!turn.response.is_empty());
    }
}
