//! AI-assisted ICD-10 disambiguation.
//!
//! When the terminology service returns several candidates for one
//! indication title, a chat-completion model is asked to pick the best
//! one. The suggestion path never propagates an error: an API failure,
//! a reply that is not JSON, or a reply missing the expected fields all
//! mean "no confident match" and the caller records the indication as
//! unmappable.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Icd10Code;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const MAX_TOKENS: u32 = 50;
const TEMPERATURE: f32 = 0.1;

pub const CODER_SYSTEM_PROMPT: &str = "You are a medical coder assistant.";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("completion request failed: {0}")]
    Http(String),

    #[error("completion API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    ResponseParsing(String),

    #[error("completion contained no choices")]
    EmptyCompletion,
}

/// Single-turn completion seam. Production uses [`OpenAiClient`]; tests
/// swap in [`MockLlmClient`].
pub trait LlmClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;
}

// ── OpenAI chat completions ─────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }
}

impl LlmClient for OpenAiClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| AiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatReply = response
            .json()
            .map_err(|e| AiError::ResponseParsing(e.to_string()))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .ok_or(AiError::EmptyCompletion)?
            .message
            .content
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

/// Mock completion client for tests — canned reply or canned failure.
pub struct MockLlmClient {
    reply: Option<String>,
}

impl MockLlmClient {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

impl LlmClient for MockLlmClient {
    fn complete(&self, _system: &str, _user: &str) -> Result<String, AiError> {
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(AiError::Http("mock failure".to_string())),
        }
    }
}

// ── Suggestion ──────────────────────────────────────────────

/// Build the disambiguation prompt: the clinical term plus the candidate
/// list as `code (title)` pairs, demanding single-line JSON back.
pub fn build_suggestion_prompt(term: &str, candidates: &[Icd10Code]) -> String {
    let mut prompt = format!(
        "Given the following clinical indication: \"{term}\", return the most \
         appropriate ICD-10 code as a JSON object with \"code\" and \"title\" fields only."
    );

    if !candidates.is_empty() {
        let options = candidates
            .iter()
            .map(|c| format!("{} ({})", c.code, c.title))
            .collect::<Vec<_>>()
            .join(", ");
        prompt.push_str(&format!(
            "\nPossible options are: {options}. Pick the best match if applicable."
        ));
    }

    prompt.push_str(
        "\nRespond ONLY with a single-line valid JSON, e.g.: {\"code\": \"J45\", \"title\": \"Asthma\"}",
    );
    prompt
}

/// Reply shape the model is instructed to produce.
#[derive(Deserialize)]
struct SuggestedCode {
    code: Option<String>,
    title: Option<String>,
}

/// Ask the model to pick the best candidate for `term`.
///
/// Returns `None` when the completion call fails, the reply is not
/// parseable JSON, or the parsed object lacks either field. Callers
/// treat `None` as "no confident match"; nothing escapes this boundary.
pub fn suggest_icd10(
    client: &dyn LlmClient,
    term: &str,
    candidates: &[Icd10Code],
) -> Option<Icd10Code> {
    let prompt = build_suggestion_prompt(term, candidates);

    let content = match client.complete(CODER_SYSTEM_PROMPT, &prompt) {
        Ok(content) => content,
        Err(e) => {
            tracing::error!(term, error = %e, "AI code suggestion call failed");
            return None;
        }
    };

    let parsed: SuggestedCode = match serde_json::from_str(content.trim()) {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!(term, content = %content, "AI reply was not parseable JSON");
            return None;
        }
    };

    match (parsed.code, parsed.title) {
        (Some(code), Some(title)) if !code.is_empty() && !title.is_empty() => {
            tracing::info!(term, code = %code, title = %title, "AI mapped indication to ICD-10");
            Some(Icd10Code { code, title })
        }
        _ => {
            tracing::warn!(term, content = %content, "AI reply lacked code/title fields");
            None
        }
    }
}
