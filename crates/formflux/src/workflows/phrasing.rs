use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::workflows::intake::gateways::QuestionPhraser;

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Offline phrasing: the description tagged with the client's language.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainPhraser;

impl QuestionPhraser for PlainPhraser {
    fn phrase(&self, description: &str, language: &str) -> String {
        let language = language.trim();
        if language.is_empty() {
            description.to_string()
        } else {
            format!("{description} ({language})")
        }
    }
}

/// Chat-completion backed phrasing with a bounded timeout. Any failure falls back to
/// [`PlainPhraser`].
#[derive(Debug)]
pub struct OpenAiPhraser {
    api_key: String,
    endpoint: String,
    model: String,
    timeout: Duration,
    client: OnceLock<Option<reqwest::blocking::Client>>,
    fallback: PlainPhraser,
}

impl OpenAiPhraser {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            timeout,
            client: OnceLock::new(),
            fallback: PlainPhraser,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    // Built on first use so construction never happens inside an async context.
    fn client(&self) -> Option<&reqwest::blocking::Client> {
        self.client
            .get_or_init(|| {
                reqwest::blocking::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|err| warn!(error = %err, "failed to build phrasing client"))
                    .ok()
            })
            .as_ref()
    }

    fn request(&self, description: &str, language: &str) -> Result<String, PhraseError> {
        let client = self.client().ok_or(PhraseError::ClientUnavailable)?;
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.3,
            messages: vec![ChatMessage {
                role: "user",
                content: format!(
                    "Translate this form field question into {language}. Make it polite. Field: '{description}'"
                ),
            }],
        };

        let response: ChatResponse = client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(PhraseError::EmptyResponse)
    }
}

impl QuestionPhraser for OpenAiPhraser {
    fn phrase(&self, description: &str, language: &str) -> String {
        match self.request(description, language) {
            Ok(question) => question,
            Err(err) => {
                warn!(error = %err, "question phrasing unavailable, using plain text");
                self.fallback.phrase(description, language)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Debug, thiserror::Error)]
enum PhraseError {
    #[error("http client unavailable")]
    ClientUnavailable,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("completion contained no text")]
    EmptyResponse,
}
