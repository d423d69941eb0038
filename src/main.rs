mod article;
mod classify;
mod commands;
mod gemini;
mod markdown;
mod query;
mod search;
mod sources;

pub const USER_AGENT: &str = concat!("dataset-scout/", env!("CARGO_PKG_VERSION"));

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use classify::CancelFlag;
use commands::{
    ClassifyArgs, DatasetScout, DeepSearchArgs, GenerateQueryArgs, OutputFormat, SearchArgs,
};
use tracing::{info, warn};

/// Find publications that describe newly published metabolomics datasets.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Print JSON instead of Markdown
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search PubMed or bioRxiv with a keyword list or boolean expression
    Search(SearchArgs),
    /// Judge whether one abstract describes a newly published dataset
    Classify(ClassifyArgs),
    /// Turn a natural-language request into a boolean query
    GenerateQuery(GenerateQueryArgs),
    /// Generate a query from natural language and run it
    DeepSearch(DeepSearchArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dataset_scout=info".parse()?),
        )
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Markdown
    };
    let scout = DatasetScout::new(format)?;

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current item");
            trigger.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let result = match cli.command {
        Command::Search(args) => scout.search(args, &cancel).await,
        Command::Classify(args) => scout.classify(args).await,
        Command::GenerateQuery(args) => scout.generate_query(args).await,
        Command::DeepSearch(args) => scout.deep_search(args, &cancel).await,
    };

    let mut stdout = std::io::stdout().lock();
    match result {
        Ok(output) => {
            writeln!(stdout, "{output}")?;
            info!("done");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if let Some(partial) = &e.output {
                writeln!(stdout, "{partial}")?;
            }
            tracing::error!("{e}");
            eprintln!("error: {e}");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
