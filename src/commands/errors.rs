use std::fmt;

use crate::classify::{BatchError, ClassifyError};
use crate::gemini::client::GeminiError;
use crate::query::QueryError;
use crate::search::{DeepQueryError, SearchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or missing configuration.
    Usage,
    /// Transient upstream failure; running the command again may succeed.
    Retriable,
    Internal,
}

/// A failure ready to show the user. `output` carries partial results, if any.
#[derive(Debug)]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
    pub output: Option<String>,
}

impl CommandError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message.into())
    }

    fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            output: None,
        }
    }

    pub fn with_output(mut self, output: String) -> Self {
        self.output = Some(output);
        self
    }

    /// `EX_TEMPFAIL` for retriable failures, clap's usage code for bad input.
    pub fn exit_code(&self) -> u8 {
        match self.kind {
            ErrorKind::Usage => 2,
            ErrorKind::Retriable => 75,
            ErrorKind::Internal => 1,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub(super) fn retriable_error(e: &impl fmt::Display) -> CommandError {
    CommandError::new(ErrorKind::Retriable, format!("{e} (retriable)"))
}

pub(super) fn query_to_command_error(e: QueryError) -> CommandError {
    CommandError::usage(e.to_string())
}

pub(super) fn gemini_to_command_error(e: GeminiError) -> CommandError {
    match &e {
        GeminiError::ApiKeyNotSet => CommandError::usage(e.to_string()),
        GeminiError::RateLimited | GeminiError::Network(_) => retriable_error(&e),
        GeminiError::Api { code: 500..=599, .. } => retriable_error(&e),
        GeminiError::QuotaExhausted(_) => CommandError::usage(format!(
            "{e} (check your API billing at https://aistudio.google.com)"
        )),
        _ => CommandError::internal(e.to_string()),
    }
}

pub(super) fn search_to_command_error(e: SearchError) -> CommandError {
    match e {
        SearchError::Query(q) => query_to_command_error(q),
        e @ SearchError::SourceUnavailable { .. } => retriable_error(&e),
        SearchError::Generation(DeepQueryError::Reasoning(g)) => gemini_to_command_error(g),
        SearchError::Generation(g @ DeepQueryError::GenerationInvalid { .. }) => {
            generation_error(&g)
        }
    }
}

pub(super) fn deep_query_to_command_error(e: DeepQueryError) -> CommandError {
    match e {
        DeepQueryError::Reasoning(g) => gemini_to_command_error(g),
        g @ DeepQueryError::GenerationInvalid { .. } => generation_error(&g),
    }
}

/// The model answers differently on each call, so a fresh attempt may succeed.
fn generation_error(e: &DeepQueryError) -> CommandError {
    match e {
        DeepQueryError::GenerationInvalid { query, .. } if !query.is_empty() => {
            retriable_error(&format!("{e} (model returned: {query})"))
        }
        _ => retriable_error(e),
    }
}

pub(super) fn classify_to_command_error(e: ClassifyError) -> CommandError {
    match e {
        ClassifyError::Reasoning(g) => gemini_to_command_error(g),
        e @ ClassifyError::Timeout(_) => retriable_error(&e),
        e @ ClassifyError::InvalidResponse(_) => CommandError::internal(e.to_string()),
    }
}

pub(super) fn batch_to_command_error(e: BatchError) -> CommandError {
    let BatchError::ClassificationFailed { cause, .. } = &e;
    if cause.is_retriable() {
        retriable_error(&e)
    } else if matches!(cause, ClassifyError::Reasoning(GeminiError::ApiKeyNotSet)) {
        CommandError::usage(e.to_string())
    } else {
        CommandError::internal(e.to_string())
    }
}
