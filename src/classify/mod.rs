//! Dataset classification: a single-abstract classifier and the paced batch orchestrator.

mod classifier;
mod orchestrator;

pub use classifier::{AbstractClassifier, ClassifyError, LlmClassifier};
pub use orchestrator::{BatchError, BatchOrchestrator, BatchReport, CancelFlag};

use serde::Serialize;

use crate::article::{Classification, Confidence};

/// Outward shape of a single classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyResponse {
    pub article_id: String,
    pub has_dataset: bool,
    pub confidence: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_availability: Option<String>,
    pub labels: Vec<String>,
    pub method_types: Vec<String>,
}

impl ClassifyResponse {
    pub fn new(article_id: impl Into<String>, classification: &Classification) -> Self {
        Self {
            article_id: article_id.into(),
            has_dataset: classification.has_dataset.unwrap_or(false),
            confidence: classification
                .confidence
                .unwrap_or(Confidence::Low)
                .as_str()
                .to_string(),
            reason: classification.reason.clone().unwrap_or_default(),
            data_availability: classification.data_availability.clone(),
            labels: classification.labels.iter().cloned().collect(),
            method_types: classification.method_types.iter().cloned().collect(),
        }
    }
}
