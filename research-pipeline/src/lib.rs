pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod pubmed;
pub mod stages;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use llm::{GeminiGenerator, NO_RESPONSE_SENTINEL, TextGenerator};
#[cfg(feature = "rig")]
pub use llm::OpenRouterGenerator;
pub use models::{
    Article, ChatOutcome, ChatRequest, ComparisonOutput, ConversationTurn, EmptyReason,
    FailureKind, Role, SummaryRequest, TurnRole, is_comparison_prompt,
};
pub use pipeline::ResearchPipeline;
pub use pubmed::{LiteratureSource, PubMedClient, parse_pubmed_xml};
pub use stages::{
    ArticleReconciler, QueryExtractor, ReplyComposer, SearchHit, candidate_queries, fallback_query,
    search_candidates,
};
pub use store::{ArticleStore, InMemoryArticleStore, PostgresArticleStore};
