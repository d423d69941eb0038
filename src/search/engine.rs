use tracing::{debug, info, warn};

use crate::article::Article;
use crate::classify::{AbstractClassifier, BatchError, BatchOrchestrator, BatchReport, CancelFlag};
use crate::gemini::client::ReasoningClient;
use crate::query::{self, BooleanMode, FieldScope, QueryError};
use crate::search::deep::{DeepQueryError, GeneratedQuery, generate_query};
use crate::sources::{LiteratureSource, Source, SourceError};

pub const DEFAULT_MAX_RESULTS: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("{database} search unavailable: {cause}")]
    SourceUnavailable {
        database: Source,
        #[source]
        cause: SourceError,
    },

    #[error("{0}")]
    Generation(#[from] DeepQueryError),
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub keywords: String,
    pub source: Source,
    pub max_results: u32,
    pub mode: BooleanMode,
    pub fields: FieldScope,
}

impl SearchRequest {
    pub fn new(keywords: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            source: Source::default(),
            max_results: DEFAULT_MAX_RESULTS,
            mode: BooleanMode::default(),
            fields: FieldScope::default(),
        }
    }
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub native_query: String,
    pub articles: Vec<Article>,
}

#[derive(Debug)]
pub struct DeepSearchOutcome {
    pub generated: GeneratedQuery,
    pub articles: Vec<Article>,
}

/// Parse and translate a request into the native query for `source`.
pub fn build_query(request: &SearchRequest, source: Source) -> Result<String, QueryError> {
    if request.max_results == 0 {
        return Err(QueryError::InvalidQuery("max_results must be greater than zero".into()));
    }
    let grammar = query::detect_grammar(&request.keywords)?;
    let expression = query::parse(&request.keywords, request.mode)?;
    debug!(?grammar, terms = expression.terms().len(), %expression, "keywords parsed");
    Ok(query::translate(&expression, request.fields, source))
}

/// Run a keyword search against `client`.
///
/// The request's own `source` is only used by callers to pick the client;
/// translation always follows the client's dialect.
pub async fn run_search(
    client: &impl LiteratureSource,
    request: &SearchRequest,
) -> Result<SearchOutcome, SearchError> {
    let native_query = build_query(request, client.source())?;
    let articles = fetch(client, &native_query, request.max_results).await?;
    Ok(SearchOutcome {
        native_query,
        articles,
    })
}

/// Generate a query from free text, then search with it over all fields.
///
/// If generation fails validation the source is never contacted.
pub async fn deep_search(
    reasoning: &impl ReasoningClient,
    client: &impl LiteratureSource,
    natural_language: &str,
    max_results: u32,
) -> Result<DeepSearchOutcome, SearchError> {
    if natural_language.trim().is_empty() {
        return Err(QueryError::InvalidQuery("query must not be empty".into()).into());
    }
    if max_results == 0 {
        return Err(QueryError::InvalidQuery("max_results must be greater than zero".into()).into());
    }
    let generated = generate_query(reasoning, natural_language, client.source()).await?;
    let articles = fetch(client, &generated.native_query, max_results).await?;
    Ok(DeepSearchOutcome {
        generated,
        articles,
    })
}

async fn fetch(
    client: &impl LiteratureSource,
    native_query: &str,
    max_results: u32,
) -> Result<Vec<Article>, SearchError> {
    let source = client.source();
    info!(%source, query = %native_query, max_results, "searching");
    match client.search(native_query, max_results).await {
        Ok(articles) => {
            info!(%source, count = articles.len(), "search complete");
            Ok(articles)
        }
        Err(cause) => {
            warn!(%source, error = %cause, timeout = cause.is_timeout(), "search failed");
            Err(SearchError::SourceUnavailable {
                database: source,
                cause,
            })
        }
    }
}

/// The current result set. Searches replace it; classification annotates it.
///
/// Both operations take `&mut self`, so a batch can never overlap a search
/// on the same articles.
#[derive(Debug, Default)]
pub struct Workspace {
    articles: Vec<Article>,
    native_query: Option<String>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn native_query(&self) -> Option<&str> {
        self.native_query.as_deref()
    }

    /// Run a search; the previous results are kept if it fails.
    pub async fn search(
        &mut self,
        client: &impl LiteratureSource,
        request: &SearchRequest,
    ) -> Result<&[Article], SearchError> {
        let outcome = run_search(client, request).await?;
        self.articles = outcome.articles;
        self.native_query = Some(outcome.native_query);
        Ok(&self.articles)
    }

    pub fn replace(&mut self, native_query: String, articles: Vec<Article>) {
        self.native_query = Some(native_query);
        self.articles = articles;
    }

    pub async fn classify<C: AbstractClassifier>(
        &mut self,
        orchestrator: &mut BatchOrchestrator<C>,
        cancel: &CancelFlag,
    ) -> Result<BatchReport, BatchError> {
        orchestrator.classify_batch(&mut self.articles, cancel).await
    }
}
