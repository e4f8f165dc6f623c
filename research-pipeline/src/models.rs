use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// A cached PubMed citation, keyed by `pmid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    #[serde(rename = "abstract")]
    #[sqlx(rename = "abstract")]
    pub abstract_text: String,
    pub authors: String,
    pub journal: String,
    pub publication_year: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message of a prior conversation, as sent back by the chat UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Audience the generated text is tailored for. Only changes prompt wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Researcher,
    Clinician,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Researcher => "researcher",
            Role::Clinician => "clinician",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "researcher" => Ok(Role::Researcher),
            "clinician" => Ok(Role::Clinician),
            other => Err(PipelineError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// How a comparison request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOutput {
    /// Markdown headings and bullets written by the model.
    #[default]
    Markdown,
    /// The reconciled articles, left to the caller to render.
    Articles,
}

impl FromStr for ComparisonOutput {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" => Ok(ComparisonOutput::Markdown),
            "articles" => Ok(ComparisonOutput::Articles),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown comparison output '{other}'"
            ))),
        }
    }
}

/// A validated chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub role: Role,
    pub compare: bool,
    pub history: Vec<ConversationTurn>,
}

impl ChatRequest {
    pub fn is_follow_up(&self) -> bool {
        !self.history.is_empty()
    }
}

/// Input of the single-article summary.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub pmid: String,
    pub title: String,
    pub abstract_text: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    NoSearchResults,
    NoArticlesForSummary,
}

impl EmptyReason {
    pub fn message(&self) -> &'static str {
        match self {
            EmptyReason::NoSearchResults => "I couldn't find any articles related to your query.",
            EmptyReason::NoArticlesForSummary => "No articles found for summarization.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Upstream,
}

impl FailureKind {
    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::Upstream => "Something went wrong while generating the summary.",
        }
    }
}

/// Terminal state of one chat request.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Answer(String),
    StructuredComparison(Vec<Article>),
    Empty(EmptyReason),
    Failure(FailureKind),
}

const COMPARISON_KEYWORDS: [&str; 4] = ["compare", "difference", "vs", "versus"];

/// Keyword check used when the client does not send an explicit `compare` flag.
pub fn is_comparison_prompt(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    COMPARISON_KEYWORDS.iter().any(|k| lowered.contains(k))
}
