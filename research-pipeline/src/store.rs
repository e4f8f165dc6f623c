use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::{error::Result, models::Article};

/// Persistent cache of PubMed articles keyed by PMID.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Point lookup by PMID.
    async fn get(&self, pmid: &str) -> Result<Option<Article>>;

    /// The subset of `pmids` already stored.
    async fn existing(&self, pmids: &[String]) -> Result<HashSet<String>>;

    /// All stored articles whose PMID is in `pmids`, in no particular order.
    async fn get_many(&self, pmids: &[String]) -> Result<Vec<Article>>;

    /// Case-insensitive substring match on the title.
    async fn search_title(&self, query: &str, limit: usize) -> Result<Vec<Article>>;

    /// Insert or replace the article with the same PMID.
    async fn upsert(&self, article: Article) -> Result<()>;
}

/// In-memory implementation of ArticleStore
pub struct InMemoryArticleStore {
    articles: Arc<DashMap<String, Article>>,
}

impl InMemoryArticleStore {
    pub fn new() -> Self {
        Self {
            articles: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl Default for InMemoryArticleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleStore for InMemoryArticleStore {
    async fn get(&self, pmid: &str) -> Result<Option<Article>> {
        Ok(self.articles.get(pmid).map(|entry| entry.clone()))
    }

    async fn existing(&self, pmids: &[String]) -> Result<HashSet<String>> {
        Ok(pmids
            .iter()
            .filter(|pmid| self.articles.contains_key(pmid.as_str()))
            .cloned()
            .collect())
    }

    async fn get_many(&self, pmids: &[String]) -> Result<Vec<Article>> {
        let wanted: HashSet<&str> = pmids.iter().map(String::as_str).collect();
        Ok(wanted
            .into_iter()
            .filter_map(|pmid| self.articles.get(pmid).map(|entry| entry.clone()))
            .collect())
    }

    async fn search_title(&self, query: &str, limit: usize) -> Result<Vec<Article>> {
        let needle = query.to_lowercase();
        let mut matches: Vec<Article> = self
            .articles
            .iter()
            .filter(|entry| entry.title.to_lowercase().contains(&needle))
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| a.pmid.cmp(&b.pmid));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn upsert(&self, article: Article) -> Result<()> {
        self.articles.insert(article.pmid.clone(), article);
        Ok(())
    }
}

const CREATE_ARTICLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    pmid TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    "abstract" TEXT NOT NULL,
    authors TEXT NOT NULL,
    journal TEXT NOT NULL,
    publication_year TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#;

const ARTICLE_COLUMNS: &str = r#"pmid, title, "abstract", authors, journal, publication_year"#;

/// PostgreSQL implementation of ArticleStore
pub struct PostgresArticleStore {
    pool: PgPool,
}

impl PostgresArticleStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        sqlx::query(CREATE_ARTICLES_TABLE).execute(&pool).await?;
        info!("Article store ready");
        Ok(Self { pool })
    }
}

/// Escape LIKE wildcards so user input only matches literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl ArticleStore for PostgresArticleStore {
    async fn get(&self, pmid: &str) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE pmid = $1");
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(pmid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    async fn existing(&self, pmids: &[String]) -> Result<HashSet<String>> {
        if pmids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query_scalar::<_, String>("SELECT pmid FROM articles WHERE pmid = ANY($1)")
            .bind(pmids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn get_many(&self, pmids: &[String]) -> Result<Vec<Article>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE pmid = ANY($1)");
        let articles = sqlx::query_as::<_, Article>(&sql)
            .bind(pmids)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    async fn search_title(&self, query: &str, limit: usize) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE title ILIKE $1 ORDER BY pmid LIMIT $2"
        );
        let articles = sqlx::query_as::<_, Article>(&sql)
            .bind(like_pattern(query))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    async fn upsert(&self, article: Article) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO articles (pmid, title, "abstract", authors, journal, publication_year, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (pmid)
            DO UPDATE SET
                title = EXCLUDED.title,
                "abstract" = EXCLUDED."abstract",
                authors = EXCLUDED.authors,
                journal = EXCLUDED.journal,
                publication_year = EXCLUDED.publication_year,
                updated_at = NOW()
            "#,
        )
        .bind(&article.pmid)
        .bind(&article.title)
        .bind(&article.abstract_text)
        .bind(&article.authors)
        .bind(&article.journal)
        .bind(&article.publication_year)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
