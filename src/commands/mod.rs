mod errors;
mod params;

pub use errors::CommandError;
pub use params::{BatchArgs, ClassifyArgs, DeepSearchArgs, GenerateQueryArgs, SearchArgs};

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use errors::{
    batch_to_command_error, classify_to_command_error, deep_query_to_command_error,
    gemini_to_command_error, search_to_command_error,
};

use crate::article::Article;
use crate::classify::{
    AbstractClassifier, BatchOrchestrator, BatchReport, CancelFlag, ClassifyResponse, LlmClassifier,
};
use crate::gemini::client::{GeminiClient, GeminiError};
use crate::markdown;
use crate::search::{GeneratedQuery, SearchRequest, Workspace, deep, engine};
use crate::sources::biorxiv::BioRxivClient;
use crate::sources::pubmed::PubMedClient;
use crate::sources::Source;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering DNS + connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Json,
}

/// Command handlers over the literature sources and the reasoning client.
///
/// Configuration via environment variables:
/// - `GEMINI_API_KEY`: enables classification and query generation (optional)
/// - `GEMINI_MODEL`: overrides the default model
/// - `NCBI_API_KEY`: raises the PubMed request rate limit (optional)
#[derive(Clone)]
pub struct DatasetScout {
    gemini: Option<GeminiClient>,
    pubmed: PubMedClient,
    biorxiv: BioRxivClient,
    format: OutputFormat,
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    source: Source,
    native_query: &'a str,
    articles: &'a [Article],
    #[serde(skip_serializing_if = "Option::is_none")]
    batch: Option<BatchReport>,
}

#[derive(Serialize)]
struct DeepSearchOutput<'a> {
    #[serde(flatten)]
    generated: &'a GeneratedQuery,
    source: Source,
    articles: &'a [Article],
    #[serde(skip_serializing_if = "Option::is_none")]
    batch: Option<BatchReport>,
}

impl DatasetScout {
    pub fn new(format: OutputFormat) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        let gemini = GeminiClient::from_env(http.clone())
            .inspect_err(|e| warn!("Gemini client not available: {e}"))
            .ok();
        Ok(Self {
            gemini,
            pubmed: PubMedClient::from_env(http.clone()),
            biorxiv: BioRxivClient::new(http),
            format,
        })
    }

    fn gemini(&self) -> Result<&GeminiClient, CommandError> {
        self.gemini
            .as_ref()
            .ok_or_else(|| gemini_to_command_error(GeminiError::ApiKeyNotSet))
    }

    fn orchestrator(
        &self,
        batch: &BatchArgs,
    ) -> Result<BatchOrchestrator<LlmClassifier<GeminiClient>>, CommandError> {
        let classifier = LlmClassifier::new(self.gemini()?.clone());
        Ok(BatchOrchestrator::new(classifier)
            .with_pacing(Duration::from_millis(batch.pacing_ms)))
    }

    pub async fn search(
        &self,
        args: SearchArgs,
        cancel: &CancelFlag,
    ) -> Result<String, CommandError> {
        info!(keywords = %args.keywords, source = %args.source, "cmd:search");

        let request = SearchRequest {
            source: args.source,
            max_results: args.max_results,
            mode: args.mode,
            fields: args.fields,
            ..SearchRequest::new(args.keywords)
        };
        // Fail on a missing key before spending a search.
        let orchestrator = args.batch.classify.then(|| self.orchestrator(&args.batch)).transpose()?;

        let mut workspace = Workspace::new();
        let searched = match request.source {
            Source::Pubmed => workspace.search(&self.pubmed, &request).await,
            Source::Biorxiv => workspace.search(&self.biorxiv, &request).await,
        };
        searched.map_err(search_to_command_error)?;

        let batch = match orchestrator {
            Some(mut orchestrator) => Some(
                self.classify_workspace(&mut workspace, &mut orchestrator, cancel, request.source)
                    .await?,
            ),
            None => None,
        };

        info!(count = workspace.articles().len(), "search complete");
        let native_query = workspace.native_query().unwrap_or_default();
        self.render_search(request.source, native_query, workspace.articles(), batch)
    }

    pub async fn classify(&self, args: ClassifyArgs) -> Result<String, CommandError> {
        let article_id = args.article_id.trim();
        if article_id.is_empty() {
            return Err(CommandError::usage("article_id must not be empty"));
        }
        if args.abstract_text.trim().is_empty() {
            return Err(CommandError::usage("abstract must not be empty"));
        }

        info!(article_id, "cmd:classify");

        let classifier = LlmClassifier::new(self.gemini()?.clone());
        let classification = classifier
            .classify(article_id, &args.abstract_text)
            .await
            .map_err(classify_to_command_error)?;
        let response = ClassifyResponse::new(article_id, &classification);

        info!(has_dataset = response.has_dataset, "classify complete");
        match self.format {
            OutputFormat::Markdown => Ok(markdown::format_classification(&response)),
            OutputFormat::Json => to_json(&response),
        }
    }

    pub async fn generate_query(&self, args: GenerateQueryArgs) -> Result<String, CommandError> {
        if args.query.trim().is_empty() {
            return Err(CommandError::usage("query must not be empty"));
        }

        info!(query = %args.query, source = %args.source, "cmd:generate-query");

        let generated = deep::generate_query(self.gemini()?, &args.query, args.source)
            .await
            .map_err(deep_query_to_command_error)?;

        info!(
            query = %generated.native_query,
            concepts = generated.extracted_concepts.len(),
            "generate-query complete"
        );
        match self.format {
            OutputFormat::Markdown => Ok(markdown::format_generated(&generated)),
            OutputFormat::Json => to_json(&generated),
        }
    }

    pub async fn deep_search(
        &self,
        args: DeepSearchArgs,
        cancel: &CancelFlag,
    ) -> Result<String, CommandError> {
        info!(query = %args.query, source = %args.source, "cmd:deep-search");

        let gemini = self.gemini()?;
        let orchestrator = args.batch.classify.then(|| self.orchestrator(&args.batch)).transpose()?;

        let outcome = match args.source {
            Source::Pubmed => {
                engine::deep_search(gemini, &self.pubmed, &args.query, args.max_results).await
            }
            Source::Biorxiv => {
                engine::deep_search(gemini, &self.biorxiv, &args.query, args.max_results).await
            }
        }
        .map_err(search_to_command_error)?;

        let mut workspace = Workspace::new();
        workspace.replace(outcome.generated.native_query.clone(), outcome.articles);

        let batch = match orchestrator {
            Some(mut orchestrator) => Some(
                self.classify_workspace(&mut workspace, &mut orchestrator, cancel, args.source)
                    .await?,
            ),
            None => None,
        };

        info!(count = workspace.articles().len(), "deep-search complete");
        match self.format {
            OutputFormat::Markdown => {
                let mut output = markdown::format_generated(&outcome.generated);
                output.push_str("\n---\n\n");
                output.push_str(&markdown::format_articles(
                    args.source,
                    &outcome.generated.native_query,
                    workspace.articles(),
                    batch.as_ref(),
                ));
                Ok(output)
            }
            OutputFormat::Json => to_json(&DeepSearchOutput {
                generated: &outcome.generated,
                source: args.source,
                articles: workspace.articles(),
                batch,
            }),
        }
    }

    /// Run the batch; on failure the partially classified list is still returned as output.
    async fn classify_workspace<C: AbstractClassifier>(
        &self,
        workspace: &mut Workspace,
        orchestrator: &mut BatchOrchestrator<C>,
        cancel: &CancelFlag,
        source: Source,
    ) -> Result<BatchReport, CommandError> {
        let mut progress = orchestrator.subscribe();
        let reporter = tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let p = *progress.borrow_and_update();
                if p.running && p.completed > 0 {
                    info!(completed = p.completed, total = p.total, "classification progress");
                }
            }
        });
        let outcome = workspace.classify(orchestrator, cancel).await;
        reporter.abort();
        debug!(
            state = ?orchestrator.state(),
            progress = ?orchestrator.progress(),
            "batch finished"
        );

        match outcome {
            Ok(report) => Ok(report),
            Err(e) => {
                let native_query = workspace.native_query().unwrap_or_default();
                let partial = self.render_search(source, native_query, workspace.articles(), None)?;
                Err(batch_to_command_error(e).with_output(partial))
            }
        }
    }

    fn render_search(
        &self,
        source: Source,
        native_query: &str,
        articles: &[Article],
        batch: Option<BatchReport>,
    ) -> Result<String, CommandError> {
        match self.format {
            OutputFormat::Markdown => Ok(markdown::format_articles(
                source,
                native_query,
                articles,
                batch.as_ref(),
            )),
            OutputFormat::Json => to_json(&SearchOutput {
                source,
                native_query,
                articles,
                batch,
            }),
        }
    }
}

fn to_json(value: &impl Serialize) -> Result<String, CommandError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CommandError::internal(format!("failed to serialize output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{BooleanMode, FieldScope};
    use errors::ErrorKind;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_http_client() -> Client {
        Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap()
    }

    fn scout(server: &str, with_gemini: bool, format: OutputFormat) -> DatasetScout {
        let http = test_http_client();
        DatasetScout {
            gemini: with_gemini.then(|| GeminiClient::with_base_url(http.clone(), server)),
            pubmed: PubMedClient::with_base_url(http.clone(), server),
            biorxiv: BioRxivClient::with_base_url(http, server),
            format,
        }
    }

    fn search_args(keywords: &str, source: Source) -> SearchArgs {
        SearchArgs {
            keywords: keywords.into(),
            source,
            max_results: 20,
            mode: BooleanMode::And,
            fields: FieldScope::All,
            batch: BatchArgs {
                classify: false,
                pacing_ms: 0,
            },
        }
    }

    fn gemini_json(body: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": body.to_string()}]}}]
        }))
    }

    #[tokio::test]
    async fn search_rejects_empty_keywords() {
        let s = scout("http://localhost:0", false, OutputFormat::Markdown);
        let err = s
            .search(search_args("   ", Source::Pubmed), &CancelFlag::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Usage);
    }

    #[tokio::test]
    async fn search_reports_malformed_fragment() {
        let s = scout("http://localhost:0", false, OutputFormat::Markdown);
        let err = s
            .search(search_args("(SRM1950 OR HILIC", Source::Pubmed), &CancelFlag::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Usage);
        assert!(err.message.contains("(SRM1950"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn classify_flag_without_api_key_fails_before_searching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let s = scout(&server.uri(), false, OutputFormat::Markdown);
        let mut args = search_args("metabolomics", Source::Pubmed);
        args.batch.classify = true;

        let err = s.search(args, &CancelFlag::new()).await.unwrap_err();
        assert!(err.message.contains("GEMINI_API_KEY"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn biorxiv_search_renders_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param(
                "query",
                r#"(SRM1950 AND HILIC) AND SRC:PPR AND PUBLISHER:"bioRxiv""#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultList": {"result": [{"doi": "10.1101/z", "title": "HILIC profiling of SRM 1950"}]}
            })))
            .mount(&server)
            .await;

        let s = scout(&server.uri(), false, OutputFormat::Markdown);
        let text = s
            .search(search_args("SRM1950, HILIC", Source::Biorxiv), &CancelFlag::new())
            .await
            .unwrap();

        assert!(text.starts_with("# biorxiv: SRM1950 AND HILIC"));
        assert!(text.contains("HILIC profiling of SRM 1950"));
        assert!(text.contains("- Dataset: unclassified"));
    }

    #[tokio::test]
    async fn search_with_classify_annotates_results_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"idlist": ["1"]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<PubmedArticleSet><PubmedArticle><MedlineCitation><PMID>1</PMID><Article>\
                 <ArticleTitle>T</ArticleTitle><Abstract><AbstractText>Data in MTBLS9.</AbstractText></Abstract>\
                 </Article></MedlineCitation></PubmedArticle></PubmedArticleSet>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(gemini_json(serde_json::json!({
                "has_dataset": true,
                "confidence": "high",
                "reason": "Accession MTBLS9",
                "labels": [],
                "method_types": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let s = scout(&server.uri(), true, OutputFormat::Json);
        let mut args = search_args("metabolomics", Source::Pubmed);
        args.batch.classify = true;

        let text = s.search(args, &CancelFlag::new()).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["native_query"], "metabolomics");
        assert_eq!(json["articles"][0]["has_dataset"], true);
        assert_eq!(json["batch"]["classified"], 1);
    }

    #[tokio::test]
    async fn batch_failure_keeps_partial_output() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultList": {"result": [{"doi": "10.1101/a", "title": "A"}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let s = scout(&server.uri(), true, OutputFormat::Markdown);
        let mut args = search_args("lipidomics", Source::Biorxiv);
        args.batch.classify = true;

        let err = s.search(args, &CancelFlag::new()).await.unwrap_err();

        assert!(err.message.contains("classification failed for article 10.1101/a (1 of 1)"));
        let partial = err.output.unwrap();
        assert!(partial.contains("- Dataset: unclassified"));
    }

    #[tokio::test]
    async fn classify_rejects_empty_abstract() {
        let s = scout("http://localhost:0", true, OutputFormat::Markdown);
        let err = s
            .classify(ClassifyArgs {
                article_id: "1".into(),
                abstract_text: " ".into(),
            })
            .await
            .unwrap_err();
        assert!(err.message.contains("abstract"));
    }

    #[tokio::test]
    async fn classify_returns_response_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(gemini_json(serde_json::json!({"has_dataset": false})))
            .mount(&server)
            .await;

        let s = scout(&server.uri(), true, OutputFormat::Json);
        let text = s
            .classify(ClassifyArgs {
                article_id: "PMID:9".into(),
                abstract_text: "We compare two HILIC columns.".into(),
            })
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["article_id"], "PMID:9");
        assert_eq!(json["has_dataset"], false);
        assert_eq!(json["confidence"], "low");
        assert_eq!(json["reason"], "Unable to determine");
    }

    #[tokio::test]
    async fn generate_query_without_api_key_returns_error() {
        let s = scout("http://localhost:0", false, OutputFormat::Markdown);
        let err = s
            .generate_query(GenerateQueryArgs {
                query: "HILIC datasets".into(),
                source: Source::Pubmed,
            })
            .await
            .unwrap_err();
        assert!(err.message.contains("GEMINI_API_KEY"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn deep_search_with_invalid_generation_never_searches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(gemini_json(serde_json::json!({"query": "(HILIC OR"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let s = scout(&server.uri(), true, OutputFormat::Markdown);
        let err = s
            .deep_search(
                DeepSearchArgs {
                    query: "HILIC".into(),
                    source: Source::Pubmed,
                    max_results: 5,
                    batch: BatchArgs {
                        classify: false,
                        pacing_ms: 0,
                    },
                },
                &CancelFlag::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Retriable);
        assert!(err.message.contains("could not generate a search query"));
    }
}
