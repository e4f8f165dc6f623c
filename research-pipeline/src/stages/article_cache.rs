use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::Result,
    models::Article,
    pubmed::LiteratureSource,
    store::ArticleStore,
};

/// Makes sure every searched PMID is in the store before it is read back.
///
/// Only PMIDs missing from the store are fetched, in one batch. Concurrent
/// requests may fetch the same PMID twice; the upsert makes that harmless.
pub struct ArticleReconciler {
    store: Arc<dyn ArticleStore>,
    source: Arc<dyn LiteratureSource>,
}

impl ArticleReconciler {
    pub fn new(store: Arc<dyn ArticleStore>, source: Arc<dyn LiteratureSource>) -> Self {
        Self { store, source }
    }

    /// Returns the stored articles for `pmids`, in the order of `pmids`.
    pub async fn reconcile(&self, pmids: &[String]) -> Result<Vec<Article>> {
        let existing = self.store.existing(pmids).await?;
        let missing = missing_pmids(pmids, &existing);

        if missing.is_empty() {
            info!("All {} articles already cached", pmids.len());
        } else {
            info!(
                "Fetching {} of {} articles missing from the cache",
                missing.len(),
                pmids.len()
            );
            self.fetch_and_store(&missing).await?;
        }

        let stored = self.store.get_many(pmids).await?;
        Ok(in_request_order(pmids, stored))
    }

    async fn fetch_and_store(&self, missing: &[String]) -> Result<()> {
        let requested: HashSet<&str> = missing.iter().map(String::as_str).collect();
        let fetched = self.source.fetch(missing).await?;

        let mut stored = 0;
        for article in fetched {
            if !requested.contains(article.pmid.as_str()) {
                warn!(pmid = %article.pmid, "Ignoring record that was not requested");
                continue;
            }
            self.store.upsert(article).await?;
            stored += 1;
        }

        if stored < missing.len() {
            warn!("Literature API returned {} of {} requested records", stored, missing.len());
        }
        Ok(())
    }
}

fn missing_pmids(pmids: &[String], existing: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    pmids
        .iter()
        .filter(|pmid| !existing.contains(*pmid) && seen.insert(pmid.as_str()))
        .cloned()
        .collect()
}

fn in_request_order(pmids: &[String], articles: Vec<Article>) -> Vec<Article> {
    let mut by_pmid: HashMap<String, Article> = articles
        .into_iter()
        .map(|article| (article.pmid.clone(), article))
        .collect();
    pmids.iter().filter_map(|pmid| by_pmid.remove(pmid)).collect()
}
