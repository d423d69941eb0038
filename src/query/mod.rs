//! Search expressions: parsing user input into a boolean tree and rendering it
//! as a source-native query string.

mod lexer;
mod parser;
mod translate;

pub use parser::{detect_grammar, parse};
pub use translate::translate;

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("malformed expression near `{fragment}`: {reason}")]
    MalformedExpression {
        fragment: String,
        reason: &'static str,
    },
}

/// How a flat list of terms is combined. Ignored for boolean expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum BooleanMode {
    #[default]
    #[value(name = "AND", alias = "and")]
    And,
    #[value(name = "OR", alias = "or")]
    Or,
}

/// Which article fields every term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FieldScope {
    #[default]
    All,
    Title,
    Abstract,
    #[value(name = "title_abstract", alias = "title-abstract")]
    TitleAbstract,
}

/// An atomic search term. Multi-word terms are matched as phrases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    text: String,
    phrase: bool,
}

impl Term {
    /// Normalizes whitespace and drops stray quote characters; `None` when nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let text = raw
            .split(|c: char| c.is_whitespace() || c == '"')
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            return None;
        }
        let phrase = text.contains(' ');
        Some(Self { text, phrase })
    }

    /// A term the user quoted explicitly; always rendered as a phrase.
    pub fn quoted(raw: &str) -> Option<Self> {
        Self::new(raw).map(|t| Self { phrase: true, ..t })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_phrase(&self) -> bool {
        self.phrase
    }

    pub(crate) fn render(&self) -> String {
        if self.phrase {
            format!("\"{}\"", self.text)
        } else {
            self.text.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchExpression {
    Term(Term),
    And(Box<SearchExpression>, Box<SearchExpression>),
    Or(Box<SearchExpression>, Box<SearchExpression>),
}

impl SearchExpression {
    pub fn term(text: &str) -> Option<Self> {
        Term::new(text).map(Self::Term)
    }

    pub fn and(left: Self, right: Self) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Self, right: Self) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn combine(mode: BooleanMode, left: Self, right: Self) -> Self {
        match mode {
            BooleanMode::And => Self::and(left, right),
            BooleanMode::Or => Self::or(left, right),
        }
    }

    /// Leaf terms in left-to-right order.
    pub fn terms(&self) -> Vec<&Term> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a Term>) {
        match self {
            Self::Term(t) => out.push(t),
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_terms(out);
                r.collect_terms(out);
            }
        }
    }
}

/// Renders the expression in the input grammar (no field qualifiers).
impl fmt::Display for SearchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&translate::render_plain(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_normalizes_whitespace() {
        let t = Term::new("  SRM   1950 ").unwrap();
        assert_eq!(t.text(), "SRM 1950");
        assert!(t.is_phrase());
    }

    #[test]
    fn single_word_term_is_not_phrase() {
        let t = Term::new("HILIC").unwrap();
        assert!(!t.is_phrase());
        assert_eq!(t.render(), "HILIC");
    }

    #[test]
    fn blank_term_is_rejected() {
        assert!(Term::new("   ").is_none());
        assert!(Term::new("\"\"").is_none());
    }

    #[test]
    fn quoted_single_word_keeps_quotes() {
        let t = Term::quoted("HILIC").unwrap();
        assert_eq!(t.render(), "\"HILIC\"");
    }

    #[test]
    fn terms_are_listed_left_to_right() {
        let expr = SearchExpression::and(
            SearchExpression::or(
                SearchExpression::term("a").unwrap(),
                SearchExpression::term("b").unwrap(),
            ),
            SearchExpression::term("c").unwrap(),
        );
        let texts: Vec<_> = expr.terms().iter().map(|t| t.text()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[test]
    fn field_scope_deserializes_snake_case() {
        let scope: FieldScope = serde_json::from_str(r#""title_abstract""#).unwrap();
        assert_eq!(scope, FieldScope::TitleAbstract);
        let mode: BooleanMode = serde_json::from_str(r#""OR""#).unwrap();
        assert_eq!(mode, BooleanMode::Or);
    }
}
