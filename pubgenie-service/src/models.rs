use research_pipeline::{Article, ConversationTurn};
use serde::{Deserialize, Serialize};

/// Body of `POST /chat`. Fields are optional so that missing values can be
/// answered with a 400 rather than a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub prompt: Option<String>,
    pub role: Option<String>,
    pub compare: Option<bool>,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArticlesResponse {
    pub articles: Vec<Article>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArticleResponse {
    pub article: Article,
}

#[derive(Debug, Deserialize)]
pub struct ArticleParams {
    pub pmid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeBody {
    pub pmid: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}
