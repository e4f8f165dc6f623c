use tracing::{info, warn};

use super::query_extraction::fallback_query;
use crate::{error::Result, pubmed::LiteratureSource};

/// The query that produced results, and the PMIDs it returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub query: String,
    pub pmids: Vec<String>,
}

/// Ordered queries to try: the extracted query, then the naive keyword query.
/// Blank and repeated candidates are dropped.
pub fn candidate_queries(primary: &str, prompt: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(2);
    for candidate in [primary.trim().to_string(), fallback_query(prompt)] {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Try each candidate in order and stop at the first one with results.
/// `Ok(None)` means every candidate came back empty.
pub async fn search_candidates(
    source: &dyn LiteratureSource,
    candidates: &[String],
) -> Result<Option<SearchHit>> {
    for (index, query) in candidates.iter().enumerate() {
        info!(
            "Trying search query {} of {}: {}",
            index + 1,
            candidates.len(),
            query
        );

        let pmids = source.search(query).await?;
        if !pmids.is_empty() {
            info!(?pmids, "Search query {} found {} articles", index + 1, pmids.len());
            return Ok(Some(SearchHit {
                query: query.clone(),
                pmids,
            }));
        }

        warn!("Search query {} found no articles", index + 1);
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeLiterature;

    #[test]
    fn test_candidates_deduplicate_and_skip_blank() {
        assert_eq!(
            candidate_queries("asthma[MeSH]", "asthma in young children"),
            vec!["asthma[MeSH]", "asthma young children"]
        );
        assert_eq!(
            candidate_queries("asthma young children", "asthma in young children"),
            vec!["asthma young children"]
        );
        assert_eq!(candidate_queries("  ", "is it ok"), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_primary_hit_stops_search() {
        let source = FakeLiterature::new().with_results("asthma[MeSH]", &["3", "2", "1"]);
        let candidates = candidate_queries("asthma[MeSH]", "asthma in young children");

        let hit = search_candidates(&source, &candidates).await.unwrap().unwrap();
        assert_eq!(hit.query, "asthma[MeSH]");
        assert_eq!(hit.pmids, vec!["3", "2", "1"]);
        assert_eq!(source.searches(), vec!["asthma[MeSH]"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_keyword_query() {
        let source = FakeLiterature::new().with_results("asthma young children", &["7"]);
        let candidates = candidate_queries("asthma[MeSH] AND toddlers", "asthma in young children");

        let hit = search_candidates(&source, &candidates).await.unwrap().unwrap();
        assert_eq!(hit.query, "asthma young children");
        assert_eq!(source.searches().len(), 2);
    }

    #[tokio::test]
    async fn test_all_candidates_empty() {
        let source = FakeLiterature::new();
        let candidates = candidate_queries("rare thing", "some rare thing");

        assert!(search_candidates(&source, &candidates).await.unwrap().is_none());
        assert_eq!(source.searches(), vec!["rare thing", "some rare thing"]);
    }
}
