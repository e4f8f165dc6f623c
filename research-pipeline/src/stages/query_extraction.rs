use std::sync::Arc;
use tracing::{info, warn};

use crate::{llm::TextGenerator, models::ConversationTurn};

/// Extracted queries shorter than this are treated as junk.
const MIN_QUERY_CHARS: usize = 5;
const FALLBACK_MIN_TOKEN_CHARS: usize = 3;
const FALLBACK_MAX_TOKENS: usize = 6;

/// Turns a free-text question into a PubMed search term.
pub struct QueryExtractor {
    generator: Arc<dyn TextGenerator>,
}

impl QueryExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Returns an empty string for follow-ups, the cleaned model query when it
    /// looks usable, [`fallback_query`] when it does not, and the prompt itself
    /// when the model cannot be reached.
    pub async fn extract(&self, prompt: &str, is_follow_up: bool) -> String {
        if is_follow_up {
            info!("Skipping PubMed query extraction for follow-up message");
            return String::new();
        }

        let instruction = ConversationTurn::user(extraction_prompt(prompt));
        let generated = match self.generator.generate(&[instruction]).await {
            Ok(generated) => generated.unwrap_or_default(),
            Err(e) => {
                warn!("Search query extraction failed, using raw prompt: {}", e);
                return prompt.to_string();
            }
        };

        let cleaned = clean_query(&generated);
        if cleaned.chars().count() < MIN_QUERY_CHARS {
            let fallback = fallback_query(prompt);
            warn!(%fallback, "Extracted query unusable, falling back to simple search terms");
            return fallback;
        }

        info!(query = %cleaned, "Extracted PubMed query");
        cleaned
    }
}

fn extraction_prompt(prompt: &str) -> String {
    format!(
        r#"You are an expert biomedical search assistant helping researchers search PubMed.
Given the following user prompt, extract the most effective PubMed-compatible search query.

Your query should:
- Use clear medical keywords, MeSH terms and synonyms
- Combine concepts with boolean operators (AND, OR)
- Include condition, treatment, or population when applicable

Return only the optimized query string, no explanations.

Prompt: {prompt}"#
    )
}

fn clean_query(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Naive keyword query: the first six whitespace-separated tokens longer than
/// two characters.
pub fn fallback_query(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .filter(|token| token.chars().count() >= FALLBACK_MIN_TOKEN_CHARS)
        .take(FALLBACK_MAX_TOKENS)
        .collect::<Vec<_>>()
        .join(" ")
}
