//! Literature sources: remote search endpoints normalized into [`Article`]s.

pub mod biorxiv;
pub mod pubmed;
mod pubmed_xml;
mod types;

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::article::Article;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Pubmed,
    Biorxiv,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Pubmed => "pubmed",
            Source::Biorxiv => "biorxiv",
        })
    }
}

/// Transport or protocol failure talking to a source. No matches is never an error.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl SourceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SourceError::Network(e) if e.is_timeout())
    }
}

/// Abstraction over a searchable literature source.
/// Implemented by `PubMedClient` and `BioRxivClient`; mock implementations used in tests.
pub trait LiteratureSource {
    fn source(&self) -> Source;

    /// Run a native query. Results keep the source's own order and are not deduplicated.
    async fn search(
        &self,
        native_query: &str,
        max_results: u32,
    ) -> Result<Vec<Article>, SourceError>;
}

/// Read a non-success response into a `SourceError::Status`, keeping a short body snippet.
pub(crate) async fn status_error(response: reqwest::Response) -> SourceError {
    let code = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message: String = text.chars().take(200).collect();
    SourceError::Status { code, message }
}

/// Collapse runs of whitespace (including newlines from markup) to single spaces.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
