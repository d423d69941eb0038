use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::sources::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Lenient parse of a model-provided label; anything unrecognized is `Low`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Dataset judgment attached to an article. `has_dataset == None` means unclassified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub has_dataset: Option<bool>,
    pub confidence: Option<Confidence>,
    pub reason: Option<String>,
    pub data_availability: Option<String>,
    pub labels: BTreeSet<String>,
    pub method_types: BTreeSet<String>,
}

/// A publication normalized from either source. Identity is `(source, id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub source: Source,
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub publication_date: Option<String>,
    pub journal: Option<String>,
    pub is_open_access: Option<bool>,
    pub url: String,
    #[serde(flatten)]
    pub classification: Classification,
}

impl Article {
    pub fn new(source: Source, id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source,
            id: id.into(),
            title: String::new(),
            abstract_text: String::new(),
            authors: Vec::new(),
            publication_date: None,
            journal: None,
            is_open_access: None,
            url: url.into(),
            classification: Classification::default(),
        }
    }

    pub fn is_classified(&self) -> bool {
        self.classification.has_dataset.is_some()
    }
}
