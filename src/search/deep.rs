//! Natural language to boolean query, via the reasoning client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::gemini::client::{GeminiError, InferRequest, ReasoningClient};
use crate::query::{self, BooleanMode, FieldScope, SearchExpression};
use crate::sources::Source;

const SYSTEM_INSTRUCTION: &str = "You are an expert in scientific literature search and \
query optimization, specializing in metabolomics and analytical chemistry.";

#[derive(Debug, thiserror::Error)]
pub enum DeepQueryError {
    #[error("{0}")]
    Reasoning(#[from] GeminiError),

    #[error("could not generate a search query: {reason}")]
    GenerationInvalid { query: String, reason: String },
}

/// A validated query produced from free text.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedQuery {
    pub native_query: String,
    pub extracted_concepts: Vec<String>,
    pub synonyms_used: BTreeMap<String, Vec<String>>,
    pub explanation: String,
    #[serde(skip)]
    pub expression: SearchExpression,
}

#[derive(Debug, Deserialize)]
struct RawGeneratedQuery {
    #[serde(default, alias = "pubmed_query")]
    query: String,
    #[serde(default)]
    extracted_concepts: Vec<String>,
    #[serde(default)]
    synonyms_used: Option<RawSynonyms>,
    #[serde(default)]
    explanation: String,
}

/// The schema asks for a list of pairs; a plain object map is accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSynonyms {
    Map(BTreeMap<String, Vec<String>>),
    Pairs(Vec<SynonymGroup>),
}

#[derive(Debug, Deserialize)]
struct SynonymGroup {
    concept: String,
    #[serde(default)]
    synonyms: Vec<String>,
}

impl RawSynonyms {
    fn into_map(self) -> BTreeMap<String, Vec<String>> {
        match self {
            RawSynonyms::Map(map) => map,
            RawSynonyms::Pairs(groups) => groups
                .into_iter()
                .map(|g| (g.concept, g.synonyms))
                .collect(),
        }
    }
}

/// Ask the model for a boolean query and re-validate it with the query parser.
///
/// An empty or unparsable answer is `GenerationInvalid`; nothing is forwarded
/// to a source in that case.
pub async fn generate_query(
    reasoning: &impl ReasoningClient,
    natural_language: &str,
    source: Source,
) -> Result<GeneratedQuery, DeepQueryError> {
    let request = InferRequest {
        system: SYSTEM_INSTRUCTION,
        prompt: build_prompt(natural_language),
        schema: response_schema(),
    };
    let value = reasoning.infer(&request).await?;

    let raw: RawGeneratedQuery =
        serde_json::from_value(value).map_err(|e| DeepQueryError::GenerationInvalid {
            query: String::new(),
            reason: format!("unexpected response shape: {e}"),
        })?;

    let generated = raw.query.trim().to_string();
    if generated.is_empty() {
        warn!("reasoning call returned an empty query");
        return Err(DeepQueryError::GenerationInvalid {
            query: generated,
            reason: "the generated query is empty".into(),
        });
    }

    let expression = query::parse(&generated, BooleanMode::And).map_err(|e| {
        warn!(query = %generated, error = %e, "generated query failed validation");
        DeepQueryError::GenerationInvalid {
            query: generated.clone(),
            reason: e.to_string(),
        }
    })?;

    let native_query = query::translate(&expression, FieldScope::All, source);
    debug!(query = %native_query, "generated query validated");

    Ok(GeneratedQuery {
        native_query,
        extracted_concepts: raw.extracted_concepts,
        synonyms_used: raw.synonyms_used.map(RawSynonyms::into_map).unwrap_or_default(),
        explanation: raw.explanation,
        expression,
    })
}

fn build_prompt(natural_language: &str) -> String {
    format!(
        r#"Convert the following request into a literature search query.

Request: "{natural_language}"

1. Extract the main concepts in the order they appear.
2. For each concept list synonyms, abbreviations and spelling variants
   (e.g. "SRM 1950" and "SRM1950", "HILIC" and "hydrophilic interaction liquid chromatography").
3. Join the variants of one concept with OR inside parentheses.
4. Join different concepts with AND.
5. Put every multi-word phrase in double quotes.
6. Use only AND, OR, parentheses and quoted phrases. No field tags, no wildcards.

Example: (metabolomics OR metabolome OR "metabolic profiling") AND ("mass spectrometry" OR LC-MS OR GC-MS)

Return "query", "extracted_concepts", "synonyms_used" (one entry per concept with its variants)
and a one or two sentence "explanation" of the strategy."#
    )
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "query": {"type": "STRING"},
            "extracted_concepts": {"type": "ARRAY", "items": {"type": "STRING"}},
            "synonyms_used": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "concept": {"type": "STRING"},
                        "synonyms": {"type": "ARRAY", "items": {"type": "STRING"}}
                    },
                    "required": ["concept", "synonyms"]
                }
            },
            "explanation": {"type": "STRING"}
        },
        "required": ["query", "extracted_concepts", "synonyms_used", "explanation"]
    })
}
