pub mod article_cache;
pub mod literature_search;
pub mod query_extraction;
pub mod reply_composer;

pub use article_cache::ArticleReconciler;
pub use literature_search::{SearchHit, candidate_queries, search_candidates};
pub use query_extraction::{QueryExtractor, fallback_query};
pub use reply_composer::{ReplyComposer, format_articles};
