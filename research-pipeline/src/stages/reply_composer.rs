use std::sync::Arc;
use tracing::info;

use crate::{
    error::Result,
    llm::{NO_RESPONSE_SENTINEL, TextGenerator},
    models::{Article, ChatRequest, ConversationTurn, SummaryRequest},
};

/// Builds the final instruction for the model and returns its reply.
pub struct ReplyComposer {
    generator: Arc<dyn TextGenerator>,
}

impl ReplyComposer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Sends the prior history followed by the composed instruction.
    pub async fn compose(&self, request: &ChatRequest, articles: &[Article]) -> Result<String> {
        let mut turns = request.history.clone();
        turns.push(ConversationTurn::user(build_instruction(request, articles)));

        info!(
            turns = turns.len(),
            articles = articles.len(),
            "Generating reply"
        );
        self.reply(&turns).await
    }

    pub async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        let instruction = format!(
            "Summarize the following biomedical article for a {}:\n\nTitle: {}\n\nAbstract: {}\n\nPMID: {}",
            request.role, request.title, request.abstract_text, request.pmid
        );
        self.reply(&[ConversationTurn::user(instruction)]).await
    }

    async fn reply(&self, turns: &[ConversationTurn]) -> Result<String> {
        Ok(self
            .generator
            .generate(turns)
            .await?
            .unwrap_or_else(|| NO_RESPONSE_SENTINEL.to_string()))
    }
}

/// Picks exactly one template: follow-up, then comparison, then standard Q&A.
pub fn build_instruction(request: &ChatRequest, articles: &[Article]) -> String {
    let prompt = &request.prompt;
    let role = request.role;

    if request.is_follow_up() {
        return format!(
            r#"You're a biomedical research assistant. This is a follow-up question.

Use your memory of the prior articles to answer this question if relevant. If this is a new topic, say that you need new articles to answer it.

Follow-up Question: "{prompt}""#
        );
    }

    let combined = format_articles(articles);
    if request.compare {
        format!(
            r#"You are a biomedical research assistant. Compare the following articles based on their key findings, methodologies, outcomes, and relevance. DO NOT use a table. Instead, present your findings in a clearly structured list using markdown headings and bullet points. Tailor the tone for a {role}.

User Prompt: "{prompt}"

Articles:
{combined}"#
        )
    } else {
        format!(
            r#"You are a biomedical research assistant. Answer the following question using only the provided article content. Highlight key findings and include PMIDs. Tailor the tone for a {role}.

User Question: "{prompt}"

Articles:
{combined}"#
        )
    }
}

/// One block per article, separated by blank lines.
pub fn format_articles(articles: &[Article]) -> String {
    articles
        .iter()
        .map(|a| {
            format!(
                "Title: {}\nAuthors: {}\nJournal: {} ({})\nAbstract: {}\nPMID: {}",
                a.title, a.authors, a.journal, a.publication_year, a.abstract_text, a.pmid
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
