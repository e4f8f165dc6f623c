use axum::{
    Router,
    extract::{Query, Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use research_pipeline::{
    Article, ArticleStore, ChatOutcome, ChatRequest, GeminiGenerator, InMemoryArticleStore,
    OpenRouterGenerator, PostgresArticleStore, PubMedClient, ResearchPipeline, Role,
    SummaryRequest, TextGenerator, is_comparison_prompt,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    config::{LlmConfig, ServiceConfig},
    models::{
        ArticleParams, ArticleResponse, ArticlesResponse, ChatBody, ReplyResponse, SearchParams,
        SummarizeBody, SummaryResponse,
    },
};

/// Maximum number of articles returned by `GET /search`.
pub const TITLE_SEARCH_LIMIT: usize = 10;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ResearchPipeline,
    pub article_store: Arc<dyn ArticleStore>,
}

impl AppState {
    pub fn new(pipeline: ResearchPipeline, article_store: Arc<dyn ArticleStore>) -> Self {
        Self {
            pipeline,
            article_store,
        }
    }
}

pub async fn create_app(config: &ServiceConfig) -> Router {
    let app_state = create_app_state(config).await;
    build_router(app_state)
}

async fn create_app_state(config: &ServiceConfig) -> AppState {
    let article_store = create_article_store(config).await;
    let generator = create_generator(&config.llm);

    let mut pubmed = PubMedClient::new(config.pubmed_api_key.clone());
    if let Some(base_url) = &config.pubmed_base_url {
        pubmed = pubmed.with_base_url(base_url);
    }

    let pipeline = ResearchPipeline::new(generator, Arc::new(pubmed), article_store.clone())
        .with_comparison_output(config.comparison_output);

    AppState::new(pipeline, article_store)
}

async fn create_article_store(config: &ServiceConfig) -> Arc<dyn ArticleStore> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set, caching articles in memory");
        return Arc::new(InMemoryArticleStore::new());
    };

    info!("Using PostgreSQL article store");
    match PostgresArticleStore::connect(database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                e
            );
            Arc::new(InMemoryArticleStore::new())
        }
    }
}

fn create_generator(llm: &LlmConfig) -> Arc<dyn TextGenerator> {
    match llm {
        LlmConfig::Gemini {
            api_key,
            model,
            base_url,
        } => {
            info!(%model, "Using Gemini text generation");
            let mut generator = GeminiGenerator::new(api_key.clone()).with_model(model.clone());
            if let Some(base_url) = base_url {
                generator = generator.with_base_url(base_url.clone());
            }
            Arc::new(generator)
        }
        LlmConfig::OpenRouter { api_key, model } => {
            info!(%model, "Using OpenRouter text generation");
            Arc::new(OpenRouterGenerator::new(api_key, model))
        }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/article", get(get_article))
        .route("/search", get(search_articles))
        .route("/summarize", post(summarize))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags every request span with a fresh correlation id.
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "PubGenie",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Answers biomedical research questions from PubMed articles",
        "endpoints": {
            "POST /chat": "Ask a question, compare studies, or follow up on a conversation",
            "GET /article?pmid=": "Get a cached article",
            "GET /search?query=": "Search cached articles by title",
            "POST /summarize": "Summarize one article for a role",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| {
        warn!("Rejected chat body: {}", e);
        bad_request_error("Missing prompt or role")
    })?;
    let request = validate_chat(body)?;

    info!(
        role = %request.role,
        compare = request.compare,
        history = request.history.len(),
        "Received chat request"
    );

    match state.pipeline.run(&request).await {
        ChatOutcome::Answer(reply) => Ok(Json(ReplyResponse { reply }).into_response()),
        ChatOutcome::Empty(reason) => {
            info!(?reason, "Chat request ended without articles");
            Ok(Json(ReplyResponse {
                reply: reason.message().to_string(),
            })
            .into_response())
        }
        ChatOutcome::StructuredComparison(articles) => {
            Ok(Json(ArticlesResponse { articles }).into_response())
        }
        ChatOutcome::Failure(kind) => Err(internal_error(kind.message())),
    }
}

fn validate_chat(body: ChatBody) -> Result<ChatRequest, ApiError> {
    let (Some(prompt), Some(role)) = (body.prompt, body.role) else {
        return Err(bad_request_error("Missing prompt or role"));
    };
    if prompt.trim().is_empty() {
        return Err(bad_request_error("Missing prompt or role"));
    }
    let role = parse_role(&role)?;
    let compare = body.compare.unwrap_or_else(|| is_comparison_prompt(&prompt));

    Ok(ChatRequest {
        prompt,
        role,
        compare,
        history: body.history,
    })
}

fn parse_role(role: &str) -> Result<Role, ApiError> {
    role.parse::<Role>()
        .map_err(|_| bad_request_error("Role must be one of student, researcher, clinician"))
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn get_article(
    State(state): State<AppState>,
    Query(params): Query<ArticleParams>,
) -> ApiResult<ArticleResponse> {
    let pmid = required(params.pmid).ok_or_else(|| bad_request_error("Missing or invalid PMID"))?;

    match state.article_store.get(pmid.trim()).await {
        Ok(Some(article)) => Ok(Json(ArticleResponse { article })),
        Ok(None) => Err(not_found_error("Article not found")),
        Err(e) => {
            error!("Failed to load article {}: {}", pmid, e);
            Err(internal_error("Failed to load article"))
        }
    }
}

async fn search_articles(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Article>> {
    let query = required(params.query).ok_or_else(|| bad_request_error("Missing or invalid query"))?;

    let articles = state
        .article_store
        .search_title(query.trim(), TITLE_SEARCH_LIMIT)
        .await
        .map_err(|e| {
            error!("Title search failed for '{}': {}", query, e);
            internal_error(&e.to_string())
        })?;

    Ok(Json(articles))
}

async fn summarize(
    State(state): State<AppState>,
    body: Result<Json<SummarizeBody>, JsonRejection>,
) -> ApiResult<SummaryResponse> {
    let Json(body) = body.map_err(|_| bad_request_error("Missing required fields"))?;
    let (Some(pmid), Some(abstract_text), Some(role)) = (
        required(body.pmid),
        required(body.abstract_text),
        required(body.role),
    ) else {
        return Err(bad_request_error("Missing required fields"));
    };

    let request = SummaryRequest {
        pmid,
        title: body.title.unwrap_or_default(),
        abstract_text,
        role: parse_role(&role)?,
    };

    match state.pipeline.summarize(&request).await {
        Ok(summary) => Ok(Json(SummaryResponse { summary })),
        Err(e) => {
            error!("Summary generation failed for {}: {}", request.pmid, e);
            Err(internal_error("Failed to summarize article."))
        }
    }
}
