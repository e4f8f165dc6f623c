//! PubMed E-utilities client.
//!
//! `esearch` returns the PMIDs for a query, `efetch` returns the citation
//! records for a batch of PMIDs as XML, parsed here into [`Article`]s.

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    error::{PipelineError, Result},
    models::Article,
};

pub const DEFAULT_EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Maximum number of PMIDs requested per search.
pub const SEARCH_RESULT_CAP: usize = 15;

const MISSING_FIELD: &str = "N/A";

/// External literature corpus: search by query, fetch by id.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// PMIDs matching `query`, newest first, at most [`SEARCH_RESULT_CAP`].
    async fn search(&self, query: &str) -> Result<Vec<String>>;

    /// Citation records for exactly the given PMIDs, in one batched request.
    async fn fetch(&self, pmids: &[String]) -> Result<Vec<Article>>;
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: Option<ESearchResult>,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

impl ESearchResponse {
    fn into_ids(self) -> Vec<String> {
        let mut ids = self.esearchresult.map(|r| r.idlist).unwrap_or_default();
        ids.truncate(SEARCH_RESULT_CAP);
        ids
    }
}

#[derive(Clone)]
pub struct PubMedClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_EUTILS_BASE_URL.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn search_params(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmax", SEARCH_RESULT_CAP.to_string()),
            // serialized as `pub+date`
            ("sort", "pub date".to_string()),
            ("retmode", "json".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    fn fetch_params(&self, pmids: &[String]) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }
}

#[async_trait]
impl LiteratureSource for PubMedClient {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&self.search_params(query))
            .send()
            .await?
            .error_for_status()?;

        let body: ESearchResponse = response.json().await?;
        let ids = body.into_ids();

        debug!(?ids, "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    async fn fetch(&self, pmids: &[String]) -> Result<Vec<Article>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        info!("Fetching {} PubMed records", pmids.len());
        let xml = self
            .client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&self.fetch_params(pmids))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_pubmed_xml(&xml)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Pmid,
    Title,
    Abstract,
    ForeName,
    LastName,
    Journal,
    Year,
}

fn field_at(path: &str) -> Option<Field> {
    if path.ends_with("/MedlineCitation/PMID") {
        Some(Field::Pmid)
    } else if path.contains("/Article/ArticleTitle") {
        Some(Field::Title)
    } else if path.contains("/Article/Abstract/AbstractText") {
        Some(Field::Abstract)
    } else if path.ends_with("/Article/AuthorList/Author/ForeName") {
        Some(Field::ForeName)
    } else if path.ends_with("/Article/AuthorList/Author/LastName") {
        Some(Field::LastName)
    } else if path.ends_with("/Article/Journal/Title") {
        Some(Field::Journal)
    } else if path.ends_with("/Article/Journal/JournalIssue/PubDate/Year") {
        Some(Field::Year)
    } else {
        None
    }
}

#[derive(Default)]
struct RecordBuilder {
    pmid: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    authors: Vec<String>,
    fore_name: String,
    last_name: String,
    journal: String,
    year: String,
}

impl RecordBuilder {
    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Pmid => {
                // CommentsCorrections carry their own PMIDs further down
                if self.pmid.is_none() {
                    self.pmid = Some(text.trim().to_string());
                }
            }
            Field::Title => self.title.push_str(text),
            Field::Abstract => match self.abstract_parts.last_mut() {
                Some(part) => part.push_str(text),
                None => self.abstract_parts.push(text.to_string()),
            },
            Field::ForeName => self.fore_name.push_str(text),
            Field::LastName => self.last_name.push_str(text),
            Field::Journal => self.journal.push_str(text),
            Field::Year => self.year.push_str(text),
        }
    }

    fn finish_author(&mut self) {
        let name = format!("{} {}", self.fore_name.trim(), self.last_name.trim())
            .trim()
            .to_string();
        if !name.is_empty() {
            self.authors.push(name);
        }
        self.fore_name.clear();
        self.last_name.clear();
    }

    fn build(self) -> Option<Article> {
        let pmid = self.pmid.filter(|p| !p.is_empty())?;
        let abstract_text = self
            .abstract_parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Some(Article {
            pmid,
            title: or_missing(self.title),
            abstract_text: or_missing(abstract_text),
            authors: self.authors.join(", "),
            journal: or_missing(self.journal),
            publication_year: or_missing(self.year),
        })
    }
}

fn or_missing(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        MISSING_FIELD.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse an efetch `PubmedArticleSet` document into articles.
///
/// Absent title, abstract, journal or year become `"N/A"`; authors are a
/// comma-joined `"ForeName LastName"` list. Records without a PMID are skipped.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<Article>> {
    let mut reader = Reader::from_str(xml);
    let mut articles = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<RecordBuilder> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            PipelineError::Parse(format!(
                "XML error at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "PubmedArticle" => current = Some(RecordBuilder::default()),
                    "AbstractText" => {
                        if let Some(record) = current.as_mut() {
                            record.abstract_parts.push(String::new());
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else { continue };
                match name.as_str() {
                    "Author" => {
                        if let Some(record) = current.as_mut() {
                            record.finish_author();
                        }
                    }
                    "PubmedArticle" => {
                        if let Some(record) = current.take() {
                            match record.build() {
                                Some(article) => articles.push(article),
                                None => warn!("Skipping PubMed record without PMID"),
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) => {
                if let Some(record) = current.as_mut() {
                    if let Some(field) = field_at(&stack.join("/")) {
                        let text = e
                            .unescape()
                            .map_err(|err| PipelineError::Parse(err.to_string()))?;
                        record.push_text(field, &text);
                    }
                }
            }
            Event::CData(ref e) => {
                if let Some(record) = current.as_mut() {
                    if let Some(field) = field_at(&stack.join("/")) {
                        record.push_text(field, &String::from_utf8_lossy(e));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    debug!("Parsed {} PubMed records", articles.len());
    Ok(articles)
}
