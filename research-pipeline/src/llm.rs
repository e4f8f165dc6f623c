//! Text generation backends.
//!
//! The pipeline only needs "turns in, text out", so every provider sits behind
//! [`TextGenerator`]. [`GeminiGenerator`] speaks the Gemini `generateContent`
//! REST contract directly; [`OpenRouterGenerator`] goes through rig.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    error::{PipelineError, Result},
    models::{ConversationTurn, TurnRole},
};

/// Reply text used when the model answers without any usable candidate.
pub const NO_RESPONSE_SENTINEL: &str = "No response generated.";

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply for the given conversation, the last turn being the
    /// instruction. `Ok(None)` means the API answered but produced no text.
    async fn generate(&self, turns: &[ConversationTurn]) -> Result<Option<String>>;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
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
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|t| !t.is_empty())
    }
}

fn gemini_role(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Assistant => "model",
    }
}

fn build_request(turns: &[ConversationTurn]) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: turns
            .iter()
            .map(|turn| Content {
                role: gemini_role(turn.role),
                parts: vec![RequestPart {
                    text: turn.content.as_str(),
                }],
            })
            .collect(),
    }
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, turns: &[ConversationTurn]) -> Result<Option<String>> {
        debug!(turns = turns.len(), model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&build_request(turns))
            .send()
            .await
            .map_err(|e| PipelineError::LlmRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "Gemini request rejected");
            return Err(PipelineError::LlmRequest(format!(
                "generateContent returned {status}"
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::LlmRequest(format!("invalid response body: {e}")))?;

        Ok(body.first_text())
    }
}

#[cfg(feature = "rig")]
mod openrouter {
    use async_trait::async_trait;
    use rig::completion::{Chat, Message};
    use rig::prelude::*;
    use rig::{agent::Agent, providers::openrouter};

    use super::TextGenerator;
    use crate::{
        error::{PipelineError, Result},
        models::{ConversationTurn, TurnRole},
    };

    pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-4o-mini";

    fn to_rig_message(turn: &ConversationTurn) -> Message {
        match turn.role {
            TurnRole::User => Message::user(turn.content.clone()),
            TurnRole::Assistant => Message::assistant(turn.content.clone()),
        }
    }

    /// Generator backed by a rig agent on OpenRouter.
    pub struct OpenRouterGenerator {
        agent: Agent<openrouter::CompletionModel>,
    }

    impl OpenRouterGenerator {
        pub fn new(api_key: &str, model: &str) -> Self {
            let client = openrouter::Client::new(api_key);
            Self {
                agent: client.agent(model).build(),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for OpenRouterGenerator {
        async fn generate(&self, turns: &[ConversationTurn]) -> Result<Option<String>> {
            let Some((instruction, history)) = turns.split_last() else {
                return Ok(None);
            };
            let history: Vec<Message> = history.iter().map(to_rig_message).collect();

            let reply = self
                .agent
                .chat(instruction.content.as_str(), history)
                .await
                .map_err(|e| PipelineError::LlmRequest(e.to_string()))?;

            let reply = reply.trim().to_string();
            Ok((!reply.is_empty()).then_some(reply))
        }
    }
}

#[cfg(feature = "rig")]
pub use openrouter::{DEFAULT_OPENROUTER_MODEL, OpenRouterGenerator};
