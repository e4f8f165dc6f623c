//! Substitute collaborators for stage and pipeline tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::{
    error::{PipelineError, Result},
    llm::TextGenerator,
    models::{Article, ConversationTurn},
    pubmed::LiteratureSource,
    store::ArticleStore,
};

#[derive(Debug, Clone)]
pub enum Scripted {
    Text(String),
    Nothing,
    Fail,
}

/// Replays scripted replies in order and records every conversation it saw.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ConversationTurn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, turns: &[ConversationTurn]) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(turns.to_vec());
        match self.replies.lock().unwrap().pop_front() {
            Some(Scripted::Text(text)) => Ok(Some(text)),
            Some(Scripted::Nothing) | None => Ok(None),
            Some(Scripted::Fail) => Err(PipelineError::LlmRequest("scripted failure".into())),
        }
    }
}

/// In-process literature corpus keyed by exact query text.
#[derive(Default)]
pub struct FakeLiterature {
    results: HashMap<String, Vec<String>>,
    records: HashMap<String, Article>,
    searches: Mutex<Vec<String>>,
    fetches: Mutex<Vec<Vec<String>>>,
    fail_search: bool,
    fail_fetch: bool,
}

impl FakeLiterature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, pmids: &[&str]) -> Self {
        self.results
            .insert(query.to_string(), pmids.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn with_record(mut self, article: Article) -> Self {
        self.records.insert(article.pmid.clone(), article);
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<Vec<String>> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiteratureSource for FakeLiterature {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        self.searches.lock().unwrap().push(query.to_string());
        if self.fail_search {
            return Err(PipelineError::LiteratureApi("esearch returned 503".into()));
        }
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }

    async fn fetch(&self, pmids: &[String]) -> Result<Vec<Article>> {
        self.fetches.lock().unwrap().push(pmids.to_vec());
        if self.fail_fetch {
            return Err(PipelineError::LiteratureApi("efetch returned 503".into()));
        }
        Ok(pmids
            .iter()
            .filter_map(|pmid| self.records.get(pmid).cloned())
            .collect())
    }
}

/// Store whose every operation fails, as an unreachable database would.
pub struct FailingStore;

fn store_down<T>() -> Result<T> {
    Err(PipelineError::Store("connection refused".into()))
}

#[async_trait]
impl ArticleStore for FailingStore {
    async fn get(&self, _pmid: &str) -> Result<Option<Article>> {
        store_down()
    }

    async fn existing(&self, _pmids: &[String]) -> Result<HashSet<String>> {
        store_down()
    }

    async fn get_many(&self, _pmids: &[String]) -> Result<Vec<Article>> {
        store_down()
    }

    async fn search_title(&self, _query: &str, _limit: usize) -> Result<Vec<Article>> {
        store_down()
    }

    async fn upsert(&self, _article: Article) -> Result<()> {
        store_down()
    }
}

pub fn article(pmid: &str, title: &str) -> Article {
    Article {
        pmid: pmid.to_string(),
        title: title.to_string(),
        abstract_text: format!("Abstract of {title}."),
        authors: "Jane Smith".to_string(),
        journal: "Test Journal".to_string(),
        publication_year: "2024".to_string(),
    }
}
