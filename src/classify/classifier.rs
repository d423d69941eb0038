use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::article::{Classification, Confidence};
use crate::gemini::client::{self, GeminiError, InferRequest, ReasoningClient};

const SYSTEM_INSTRUCTION: &str =
    "You are a scientific literature analyst specializing in metabolomics research.";
const UNDETERMINED_REASON: &str = "Unable to determine";

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("{0}")]
    Reasoning(#[from] GeminiError),

    #[error("unexpected classification response: {0}")]
    InvalidResponse(String),

    #[error("classification timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ClassifyError {
    /// Transient failures the user can retry as-is.
    pub fn is_retriable(&self) -> bool {
        match self {
            ClassifyError::Reasoning(e) => {
                matches!(e, GeminiError::Network(_)) || client::is_retriable(e)
            }
            ClassifyError::Timeout(_) => true,
            ClassifyError::InvalidResponse(_) => false,
        }
    }
}

/// Abstraction over the dataset classifier.
/// Implemented by `LlmClassifier` for production; mock implementations used in tests.
pub trait AbstractClassifier {
    async fn classify(
        &self,
        article_id: &str,
        abstract_text: &str,
    ) -> Result<Classification, ClassifyError>;
}

/// Classifies abstracts through a schema-constrained reasoning call.
pub struct LlmClassifier<R> {
    reasoning: R,
}

impl<R: ReasoningClient> LlmClassifier<R> {
    pub fn new(reasoning: R) -> Self {
        Self { reasoning }
    }
}

impl<R: ReasoningClient> AbstractClassifier for LlmClassifier<R> {
    async fn classify(
        &self,
        article_id: &str,
        abstract_text: &str,
    ) -> Result<Classification, ClassifyError> {
        let request = InferRequest {
            system: SYSTEM_INSTRUCTION,
            prompt: build_prompt(abstract_text),
            schema: response_schema(),
        };
        let value = self.reasoning.infer(&request).await?;
        let raw: RawClassification = serde_json::from_value(value)
            .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;
        let classification = raw.into_classification();
        debug!(
            article_id,
            has_dataset = ?classification.has_dataset,
            "abstract classified"
        );
        Ok(classification)
    }
}

/// Model output; every field is optional and falls back to a conservative default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClassification {
    has_dataset: Option<bool>,
    confidence: Option<String>,
    reason: Option<String>,
    data_availability: Option<String>,
    labels: Option<Vec<String>>,
    method_types: Option<Vec<String>>,
}

impl RawClassification {
    fn into_classification(self) -> Classification {
        Classification {
            has_dataset: Some(self.has_dataset.unwrap_or(false)),
            confidence: Some(
                self.confidence
                    .as_deref()
                    .map(Confidence::from_label)
                    .unwrap_or(Confidence::Low),
            ),
            reason: Some(
                non_empty(self.reason).unwrap_or_else(|| UNDETERMINED_REASON.to_string()),
            ),
            data_availability: non_empty(self.data_availability),
            labels: collect_set(self.labels),
            method_types: collect_set(self.method_types),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

fn collect_set(values: Option<Vec<String>>) -> BTreeSet<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn build_prompt(abstract_text: &str) -> String {
    let abstract_text = if abstract_text.trim().is_empty() {
        "(no abstract available)"
    } else {
        abstract_text
    };
    format!(
        r#"Classify the metabolomics abstract below.

Dataset: set "has_dataset" to true only when the abstract explicitly states one of
- deposition in a public repository (MetaboLights, Metabolomics Workbench, GNPS, ...)
- an accession number for deposited data
- that the data is publicly accessible or available on request
Methods, comparisons of techniques, or use of existing reference materials such as
SRM 1950 without newly published data do not count. When in doubt answer false.

Labels (any that apply): "Method Development", "Review", "Application Study",
"Reference Material", "Software/Tool".

Method types: only for "Method Development" papers, list the analytical methods the
abstract names (LC-MS, GC-MS, NMR, CE-MS, HILIC, UPLC, QTOF, Orbitrap, FT-ICR, ...).
Otherwise return an empty list.

Also return "confidence" (high, medium or low), a one or two sentence "reason", and
"data_availability" quoting the availability statement when has_dataset is true.

Abstract:
{abstract_text}"#
    )
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "has_dataset": {"type": "BOOLEAN"},
            "confidence": {"type": "STRING", "enum": ["high", "medium", "low"]},
            "reason": {"type": "STRING"},
            "data_availability": {"type": "STRING", "nullable": true},
            "labels": {"type": "ARRAY", "items": {"type": "STRING"}},
            "method_types": {"type": "ARRAY", "items": {"type": "STRING"}}
        },
        "required": ["has_dataset", "confidence", "reason", "labels", "method_types"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::deep::tests::MockReasoning;

    #[tokio::test]
    async fn maps_full_response() {
        let mock = MockReasoning::with_responses(vec![Ok(json!({
            "has_dataset": true,
            "confidence": "high",
            "reason": "Raw data deposited in MetaboLights.",
            "data_availability": "MTBLS1234",
            "labels": ["Application Study", "Method Development"],
            "method_types": ["LC-MS", "HILIC"]
        }))]);
        let classifier = LlmClassifier::new(mock);

        let c = classifier.classify("1", "Data are in MTBLS1234.").await.unwrap();

        assert_eq!(c.has_dataset, Some(true));
        assert_eq!(c.confidence, Some(Confidence::High));
        assert_eq!(c.data_availability.as_deref(), Some("MTBLS1234"));
        assert!(c.labels.contains("Method Development"));
        assert_eq!(c.method_types.len(), 2);
    }

    #[tokio::test]
    async fn missing_fields_fall_back_to_conservative_defaults() {
        let mock = MockReasoning::with_responses(vec![Ok(json!({}))]);
        let classifier = LlmClassifier::new(mock);

        let c = classifier.classify("1", "text").await.unwrap();

        assert_eq!(c.has_dataset, Some(false));
        assert_eq!(c.confidence, Some(Confidence::Low));
        assert_eq!(c.reason.as_deref(), Some(UNDETERMINED_REASON));
        assert!(c.data_availability.is_none());
        assert!(c.labels.is_empty());
        assert!(c.method_types.is_empty());
    }

    #[tokio::test]
    async fn null_lists_and_availability_are_empty() {
        let mock = MockReasoning::with_responses(vec![Ok(json!({
            "has_dataset": false,
            "data_availability": null,
            "labels": null,
            "method_types": null
        }))]);
        let c = LlmClassifier::new(mock).classify("1", "text").await.unwrap();
        assert!(c.data_availability.is_none());
        assert!(c.labels.is_empty());
    }

    #[tokio::test]
    async fn wrong_types_are_invalid_response() {
        let mock = MockReasoning::with_responses(vec![Ok(json!({"has_dataset": "maybe"}))]);
        let err = LlmClassifier::new(mock).classify("1", "text").await.unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn prompt_carries_abstract() {
        let mock = MockReasoning::with_responses(vec![Ok(json!({}))]);
        let classifier = LlmClassifier::new(mock);
        classifier.classify("1", "Plasma from 40 donors").await.unwrap();
        let prompts = classifier.reasoning.captured_prompts();
        assert!(prompts[0].ends_with("Plasma from 40 donors"));
    }

    #[test]
    fn retriable_errors() {
        assert!(ClassifyError::Timeout(Duration::from_secs(45)).is_retriable());
        assert!(ClassifyError::Reasoning(GeminiError::RateLimited).is_retriable());
        assert!(
            ClassifyError::Reasoning(GeminiError::Api {
                code: 503,
                message: "overloaded".into(),
            })
            .is_retriable()
        );
        assert!(
            !ClassifyError::Reasoning(GeminiError::Api {
                code: 400,
                message: "bad request".into(),
            })
            .is_retriable()
        );
        assert!(!ClassifyError::Reasoning(GeminiError::QuotaExhausted("daily".into())).is_retriable());
        assert!(!ClassifyError::Reasoning(GeminiError::ApiKeyNotSet).is_retriable());
        assert!(!ClassifyError::InvalidResponse("x".into()).is_retriable());
    }
}
