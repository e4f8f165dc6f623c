//! ResearchPipeline – runs one chat request end to end.
//!
//! The chain is strictly sequential: extract query → search (with keyword
//! fallback) → reconcile the cache → compose the reply. Follow-ups skip straight
//! to composition. Every terminal state comes back as a [`ChatOutcome`]; only
//! the HTTP layer decides how to render it.

use std::sync::Arc;
use tracing::{error, info};

use crate::{
    error::Result,
    llm::TextGenerator,
    models::{ChatOutcome, ChatRequest, ComparisonOutput, EmptyReason, FailureKind, SummaryRequest},
    pubmed::LiteratureSource,
    stages::{ArticleReconciler, QueryExtractor, ReplyComposer, candidate_queries, search_candidates},
    store::ArticleStore,
};

#[derive(Clone)]
pub struct ResearchPipeline {
    extractor: Arc<QueryExtractor>,
    literature: Arc<dyn LiteratureSource>,
    reconciler: Arc<ArticleReconciler>,
    composer: Arc<ReplyComposer>,
    comparison_output: ComparisonOutput,
}

impl ResearchPipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        literature: Arc<dyn LiteratureSource>,
        store: Arc<dyn ArticleStore>,
    ) -> Self {
        Self {
            extractor: Arc::new(QueryExtractor::new(generator.clone())),
            reconciler: Arc::new(ArticleReconciler::new(store, literature.clone())),
            composer: Arc::new(ReplyComposer::new(generator)),
            literature,
            comparison_output: ComparisonOutput::default(),
        }
    }

    pub fn with_comparison_output(mut self, comparison_output: ComparisonOutput) -> Self {
        self.comparison_output = comparison_output;
        self
    }

    /// Run the request; upstream errors are logged and become `Failure`.
    pub async fn run(&self, request: &ChatRequest) -> ChatOutcome {
        match self.try_run(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Research pipeline failed: {}", e);
                ChatOutcome::Failure(FailureKind::Upstream)
            }
        }
    }

    async fn try_run(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        let is_follow_up = request.is_follow_up();
        let query = self.extractor.extract(&request.prompt, is_follow_up).await;

        let articles = if is_follow_up {
            Vec::new()
        } else {
            let candidates = candidate_queries(&query, &request.prompt);
            let Some(hit) = search_candidates(self.literature.as_ref(), &candidates).await? else {
                info!(prompt = %request.prompt, "No PubMed results for any candidate query");
                return Ok(ChatOutcome::Empty(EmptyReason::NoSearchResults));
            };
            info!(query = %hit.query, results = hit.pmids.len(), "Using search query");

            let articles = self.reconciler.reconcile(&hit.pmids).await?;
            if articles.is_empty() {
                return Ok(ChatOutcome::Empty(EmptyReason::NoArticlesForSummary));
            }

            if request.compare && self.comparison_output == ComparisonOutput::Articles {
                info!("Returning {} articles for client-side comparison", articles.len());
                return Ok(ChatOutcome::StructuredComparison(articles));
            }
            articles
        };

        let reply = self.composer.compose(request, &articles).await?;
        Ok(ChatOutcome::Answer(reply))
    }

    /// Role-tailored summary of a single article.
    pub async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        info!(pmid = %request.pmid, role = %request.role, "Summarizing article");
        self.composer.summarize(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationTurn, Role};
    use crate::store::InMemoryArticleStore;
    use crate::test_support::{FailingStore, FakeLiterature, Scripted, ScriptedGenerator, article};

    fn chat(prompt: &str, compare: bool, history: Vec<ConversationTurn>) -> ChatRequest {
        ChatRequest {
            prompt: prompt.to_string(),
            role: Role::Clinician,
            compare,
            history,
        }
    }

    #[tokio::test]
    async fn test_standard_question_end_to_end() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Scripted::Text("diabetes AND treatment".into()),
            Scripted::Text("Metformin remains first line (PMID: 2).".into()),
        ]));
        let literature = Arc::new(
            FakeLiterature::new()
                .with_results("diabetes AND treatment", &["2", "1"])
                .with_record(article("1", "Insulin"))
                .with_record(article("2", "Metformin")),
        );
        let store = Arc::new(InMemoryArticleStore::new());
        let pipeline = ResearchPipeline::new(generator.clone(), literature.clone(), store.clone());

        let outcome = pipeline.run(&chat("diabetes treatment", false, vec![])).await;

        assert_eq!(
            outcome,
            ChatOutcome::Answer("Metformin remains first line (PMID: 2).".into())
        );
        assert_eq!(literature.searches(), vec!["diabetes AND treatment"]);
        assert_eq!(store.len(), 2);

        let calls = generator.calls();
        assert_eq!(calls.len(), 2);
        let instruction = &calls[1][0].content;
        assert!(instruction.contains("PMID: 2"));
        assert!(instruction.find("PMID: 2").unwrap() < instruction.find("PMID: 1").unwrap());
    }

    #[tokio::test]
    async fn test_no_results_for_any_query() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Scripted::Text(
            "obscure AND condition".into(),
        )]));
        let literature = Arc::new(FakeLiterature::new());
        let pipeline = ResearchPipeline::new(
            generator.clone(),
            literature.clone(),
            Arc::new(InMemoryArticleStore::new()),
        );

        let outcome = pipeline.run(&chat("some obscure condition", false, vec![])).await;

        assert_eq!(outcome, ChatOutcome::Empty(EmptyReason::NoSearchResults));
        assert_eq!(literature.searches().len(), 2);
        assert!(literature.fetches().is_empty());
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_ids_without_records() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Scripted::Text("ghost query".into())]));
        let literature = Arc::new(FakeLiterature::new().with_results("ghost query", &["77"]));
        let pipeline =
            ResearchPipeline::new(generator, literature, Arc::new(InMemoryArticleStore::new()));

        let outcome = pipeline.run(&chat("ghost question", false, vec![])).await;
        assert_eq!(outcome, ChatOutcome::Empty(EmptyReason::NoArticlesForSummary));
    }

    #[tokio::test]
    async fn test_follow_up_skips_search() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Scripted::Text(
            "I need new articles to answer that.".into(),
        )]));
        let literature = Arc::new(FakeLiterature::new());
        let pipeline = ResearchPipeline::new(
            generator.clone(),
            literature.clone(),
            Arc::new(InMemoryArticleStore::new()),
        );
        let history = vec![
            ConversationTurn::user("diabetes treatment"),
            ConversationTurn::assistant("Metformin..."),
        ];

        let outcome = pipeline.run(&chat("what about migraines?", false, history)).await;

        assert!(matches!(outcome, ChatOutcome::Answer(_)));
        assert!(literature.searches().is_empty());
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][2].content.contains("need new articles"));
    }

    #[tokio::test]
    async fn test_comparison_as_articles() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Scripted::Text(
            "metformin OR insulin".into(),
        )]));
        let literature = Arc::new(
            FakeLiterature::new()
                .with_results("metformin OR insulin", &["1"])
                .with_record(article("1", "Head to head")),
        );
        let pipeline = ResearchPipeline::new(
            generator.clone(),
            literature,
            Arc::new(InMemoryArticleStore::new()),
        )
        .with_comparison_output(ComparisonOutput::Articles);

        let outcome = pipeline.run(&chat("compare metformin vs insulin", true, vec![])).await;

        assert_eq!(
            outcome,
            ChatOutcome::StructuredComparison(vec![article("1", "Head to head")])
        );
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_composition_failure_is_reported() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Scripted::Text("asthma AND children".into()),
            Scripted::Fail,
        ]));
        let literature = Arc::new(
            FakeLiterature::new()
                .with_results("asthma AND children", &["5"])
                .with_record(article("5", "Asthma")),
        );
        let pipeline =
            ResearchPipeline::new(generator, literature, Arc::new(InMemoryArticleStore::new()));

        let outcome = pipeline.run(&chat("asthma in children", false, vec![])).await;
        assert_eq!(outcome, ChatOutcome::Failure(FailureKind::Upstream));
    }

    #[tokio::test]
    async fn test_search_failure_is_reported() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Scripted::Text(
            "asthma AND children".into(),
        )]));
        let literature = Arc::new(FakeLiterature::new().failing_search());
        let pipeline = ResearchPipeline::new(
            generator.clone(),
            literature.clone(),
            Arc::new(InMemoryArticleStore::new()),
        );

        let outcome = pipeline.run(&chat("asthma in children", false, vec![])).await;

        assert_eq!(outcome, ChatOutcome::Failure(FailureKind::Upstream));
        assert_eq!(literature.searches(), vec!["asthma AND children"]);
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Scripted::Text(
            "asthma AND children".into(),
        )]));
        let literature = Arc::new(
            FakeLiterature::new()
                .with_results("asthma AND children", &["5"])
                .failing_fetch(),
        );
        let store = Arc::new(InMemoryArticleStore::new());
        let pipeline = ResearchPipeline::new(generator.clone(), literature.clone(), store.clone());

        let outcome = pipeline.run(&chat("asthma in children", false, vec![])).await;

        assert_eq!(outcome, ChatOutcome::Failure(FailureKind::Upstream));
        assert_eq!(literature.fetches(), vec![vec!["5".to_string()]]);
        assert!(store.is_empty());
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Scripted::Text(
            "asthma AND children".into(),
        )]));
        let literature = Arc::new(
            FakeLiterature::new()
                .with_results("asthma AND children", &["5"])
                .with_record(article("5", "Asthma")),
        );
        let pipeline = ResearchPipeline::new(generator.clone(), literature.clone(), Arc::new(FailingStore));

        let outcome = pipeline.run(&chat("asthma in children", false, vec![])).await;

        assert_eq!(outcome, ChatOutcome::Failure(FailureKind::Upstream));
        assert!(literature.fetches().is_empty());
        assert_eq!(generator.calls().len(), 1);
    }
}
