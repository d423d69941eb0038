//! bioRxiv preprints via the Europe PMC search index.
//!
//! bioRxiv's own API only lists preprints by date interval, so keyword search
//! goes through Europe PMC, restricted to preprints published by bioRxiv.

use reqwest::Client;
use tracing::{debug, warn};

use super::types::{AuthorEntry, EuropePmcRecord, EuropePmcResponse};
use super::{LiteratureSource, Source, SourceError, normalize_whitespace, status_error};
use crate::article::Article;

const API_BASE: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
const PREPRINT_FILTER: &str = r#"SRC:PPR AND PUBLISHER:"bioRxiv""#;
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Clone)]
pub struct BioRxivClient {
    http: Client,
    base_url: String,
}

impl BioRxivClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }
}

impl LiteratureSource for BioRxivClient {
    fn source(&self) -> Source {
        Source::Biorxiv
    }

    async fn search(
        &self,
        native_query: &str,
        max_results: u32,
    ) -> Result<Vec<Article>, SourceError> {
        let query = format!("({native_query}) AND {PREPRINT_FILTER}");
        let page_size = max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .header("User-Agent", crate::USER_AGENT)
            .query(&[
                ("query", query.as_str()),
                ("format", "json"),
                ("resultType", "core"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: EuropePmcResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Protocol(format!("invalid Europe PMC response: {e}")))?;
        debug!(hits = body.hit_count.unwrap_or(0), "europe pmc search complete");

        let records = body.result_list.map(|l| l.result).unwrap_or_default();
        let articles = records
            .into_iter()
            .filter_map(|record| {
                let article = to_article(record);
                if article.is_none() {
                    warn!("skipping Europe PMC record without id or DOI");
                }
                article
            })
            .take(max_results as usize)
            .collect();
        Ok(articles)
    }
}

fn to_article(record: EuropePmcRecord) -> Option<Article> {
    let doi = clean(record.doi);
    let epmc_id = clean(record.id);
    let (id, url) = match (doi, epmc_id) {
        (Some(doi), _) => (doi.clone(), format!("https://doi.org/{doi}")),
        (None, Some(id)) => (id.clone(), format!("https://europepmc.org/article/PPR/{id}")),
        (None, None) => return None,
    };

    let mut article = Article::new(Source::Biorxiv, id, url);
    article.title = clean(record.title).unwrap_or_default();
    article.abstract_text = clean(record.abstract_text).unwrap_or_default();
    article.authors = authors(record.author_list.map(|l| l.author), record.author_string);
    article.publication_date =
        clean(record.first_publication_date).or_else(|| clean(record.pub_year));
    article.journal = record
        .journal_info
        .and_then(|j| j.journal)
        .and_then(|j| clean(j.title));
    article.is_open_access = Some(
        record
            .is_open_access
            .map(|flag| flag.eq_ignore_ascii_case("Y"))
            .unwrap_or(true),
    );
    Some(article)
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| normalize_whitespace(&v))
        .filter(|v| !v.is_empty())
}

/// Structured author list first, then the flat "Smith J, Doe A." string.
fn authors(list: Option<Vec<AuthorEntry>>, flat: Option<String>) -> Vec<String> {
    let structured: Vec<String> = list
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| clean(a.full_name))
        .collect();
    if !structured.is_empty() {
        return structured;
    }

    flat.map(|s| {
        s.trim()
            .trim_end_matches('.')
            .split(", ")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
