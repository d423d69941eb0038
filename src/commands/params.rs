use clap::Args;

use crate::query::{BooleanMode, FieldScope};
use crate::search::engine::DEFAULT_MAX_RESULTS;
use crate::sources::Source;

pub const DEFAULT_PACING_MS: u64 = 1000;

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Search terms: "SRM1950, HILIC" or a boolean expression like "(SRM 1950 OR SRM1950) AND HILIC"
    #[arg(long)]
    pub keywords: String,
    /// Literature source to query
    #[arg(long, value_enum, default_value_t = Source::Pubmed)]
    pub source: Source,
    /// Maximum number of articles to return
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
    pub max_results: u32,
    /// How to combine a plain term list; ignored for boolean expressions
    #[arg(long, value_enum, default_value_t = BooleanMode::And)]
    pub mode: BooleanMode,
    /// Which fields each term is matched against
    #[arg(long, value_enum, default_value_t = FieldScope::All)]
    pub fields: FieldScope,
    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Identifier echoed back in the response (e.g. a PMID or DOI)
    #[arg(long)]
    pub article_id: String,
    /// Abstract text to classify
    #[arg(long = "abstract")]
    pub abstract_text: String,
}

#[derive(Debug, Args)]
pub struct GenerateQueryArgs {
    /// Natural-language description of what to find
    #[arg(long)]
    pub query: String,
    /// Source whose syntax the generated query targets
    #[arg(long, value_enum, default_value_t = Source::Pubmed)]
    pub source: Source,
}

#[derive(Debug, Args)]
pub struct DeepSearchArgs {
    /// Natural-language description of what to find
    #[arg(long)]
    pub query: String,
    /// Literature source to query
    #[arg(long, value_enum, default_value_t = Source::Pubmed)]
    pub source: Source,
    /// Maximum number of articles to return
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
    pub max_results: u32,
    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Classify every returned article for newly published datasets
    #[arg(long)]
    pub classify: bool,
    /// Minimum spacing between classification calls, in milliseconds
    #[arg(long, default_value_t = DEFAULT_PACING_MS)]
    pub pacing_ms: u64,
}
