use std::collections::HashMap;
use std::env;

use reqwest::Client;
use tracing::{debug, warn};

use super::pubmed_xml::parse_articles;
use super::types::ESearchResponse;
use super::{LiteratureSource, Source, SourceError, status_error};
use crate::article::Article;

const API_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// NCBI E-utilities client: `esearch` for ranked PMIDs, then `efetch` for records.
///
/// `NCBI_API_KEY` is optional and raises the request rate limit when set.
#[derive(Clone)]
pub struct PubMedClient {
    http: Client,
    api_key: Option<ApiKey>,
    base_url: String,
}

impl PubMedClient {
    pub fn from_env(http: Client) -> Self {
        let api_key = env::var("NCBI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(ApiKey);
        if api_key.is_some() {
            debug!("NCBI API key configured");
        }
        Self {
            http,
            api_key,
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: None,
            base_url: base_url.to_string(),
        }
    }

    fn get(&self, endpoint: &str, params: &[(&str, String)]) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(format!("{}/{endpoint}", self.base_url))
            .header("User-Agent", crate::USER_AGENT)
            .query(params);
        if let Some(ApiKey(key)) = &self.api_key {
            req = req.query(&[("api_key", key)]);
        }
        req
    }

    async fn esearch(&self, query: &str, max_results: u32) -> Result<Vec<String>, SourceError> {
        let params = [
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmax", max_results.to_string()),
            ("retmode", "json".to_string()),
        ];
        let response = self.get("esearch.fcgi", &params).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: ESearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Protocol(format!("invalid esearch response: {e}")))?;
        let Some(result) = body.esearchresult else {
            return Ok(Vec::new());
        };
        match (result.idlist, result.error) {
            (Some(ids), _) => Ok(ids),
            (None, Some(error)) => Err(SourceError::Protocol(format!("esearch error: {error}"))),
            (None, None) => Ok(Vec::new()),
        }
    }

    async fn efetch(&self, pmids: &[String]) -> Result<Vec<Article>, SourceError> {
        let params = [
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        let response = self.get("efetch.fcgi", &params).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let xml = response.text().await?;
        parse_articles(&xml)
    }
}

impl LiteratureSource for PubMedClient {
    fn source(&self) -> Source {
        Source::Pubmed
    }

    async fn search(
        &self,
        native_query: &str,
        max_results: u32,
    ) -> Result<Vec<Article>, SourceError> {
        let pmids = self.esearch(native_query, max_results).await?;
        debug!(count = pmids.len(), "pubmed esearch complete");
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        let articles = self.efetch(&pmids).await?;
        if articles.len() != pmids.len() {
            warn!(
                requested = pmids.len(),
                received = articles.len(),
                "efetch returned a different number of records"
            );
        }
        Ok(in_search_order(&pmids, articles))
    }
}

/// efetch does not promise to preserve the esearch ranking; restore it.
fn in_search_order(pmids: &[String], articles: Vec<Article>) -> Vec<Article> {
    let rank: HashMap<&str, usize> = pmids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut articles = articles;
    articles.sort_by_key(|a| rank.get(a.id.as_str()).copied().unwrap_or(usize::MAX));
    articles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_search_order() {
        let pmids = vec!["3".to_string(), "1".to_string(), "2".to_string()];
        let articles = ["1", "2", "3", "9"]
            .iter()
            .map(|id| Article::new(Source::Pubmed, *id, ""))
            .collect();
        let ordered: Vec<_> = in_search_order(&pmids, articles)
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ordered, ["3", "1", "2", "9"]);
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EFETCH_XML: &str = r#"<PubmedArticleSet>
  <PubmedArticle><MedlineCitation><PMID>200</PMID><Article><ArticleTitle>Second</ArticleTitle></Article></MedlineCitation></PubmedArticle>
  <PubmedArticle><MedlineCitation><PMID>100</PMID><Article><ArticleTitle>First</ArticleTitle></Article></MedlineCitation></PubmedArticle>
</PubmedArticleSet>"#;

    #[tokio::test]
    async fn search_fetches_records_in_ranked_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("db", "pubmed"))
            .and(query_param("term", "SRM1950 AND HILIC"))
            .and(query_param("retmax", "5"))
            .and(query_param("retmode", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "2", "idlist": ["100", "200"]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .and(query_param("id", "100,200"))
            .and(query_param("retmode", "xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EFETCH_XML))
            .expect(1)
            .mount(&server)
            .await;

        let client = PubMedClient::with_base_url(Client::new(), &server.uri());
        let articles = client.search("SRM1950 AND HILIC", 5).await.unwrap();

        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["First", "Second"]);
    }

    #[tokio::test]
    async fn empty_idlist_skips_efetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "0", "idlist": []}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = PubMedClient::with_base_url(Client::new(), &server.uri());
        let articles = client.search("nothing", 20).await.unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn missing_esearchresult_is_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = PubMedClient::with_base_url(Client::new(), &server.uri());
        assert!(client.search("x", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn esearch_error_field_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"ERROR": "Invalid query"}
            })))
            .mount(&server)
            .await;

        let client = PubMedClient::with_base_url(Client::new(), &server.uri());
        let err = client.search("x", 20).await.unwrap_err();
        assert!(matches!(err, SourceError::Protocol(ref m) if m.contains("Invalid query")));
    }

    #[tokio::test]
    async fn http_500_returns_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
            .mount(&server)
            .await;

        let client = PubMedClient::with_base_url(Client::new(), &server.uri());
        match client.search("x", 20).await {
            Err(SourceError::Status { code: 500, message }) => {
                assert!(message.contains("backend down"));
            }
            other => panic!("expected Status(500), got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_esearch_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = PubMedClient::with_base_url(Client::new(), &server.uri());
        let err = client.search("x", 20).await.unwrap_err();
        assert!(matches!(err, SourceError::Protocol(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn slow_esearch_times_out_as_unavailable_source() {
        use crate::search::engine::{SearchRequest, run_search};
        use crate::search::SearchError;
        use std::time::Duration;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({"esearchresult": {"idlist": []}})),
            )
            .mount(&server)
            .await;

        let http = Client::builder().timeout(Duration::from_millis(100)).build().unwrap();
        let client = PubMedClient::with_base_url(http, &server.uri());

        let err = run_search(&client, &SearchRequest::new("SRM1950"))
            .await
            .unwrap_err();
        match err {
            SearchError::SourceUnavailable { database, cause } => {
                assert_eq!(database, Source::Pubmed);
                assert!(matches!(cause, SourceError::Network(_)), "got: {cause:?}");
                assert!(cause.is_timeout());
            }
            other => panic!("expected SourceUnavailable, got: {other:?}"),
        }
    }
}
