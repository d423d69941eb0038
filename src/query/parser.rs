use tracing::debug;

use super::lexer::{Spanned, Token, fragment, tokenize};
use super::{BooleanMode, QueryError, SearchExpression, Term};

/// Input grammar, detected from the raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// Comma- or whitespace-separated terms combined with one boolean mode.
    Simple,
    /// Explicit `AND`/`OR` operators and/or parentheses.
    Boolean,
}

pub fn detect_grammar(input: &str) -> Result<Grammar, QueryError> {
    Ok(grammar_of(&tokenize(input)?))
}

fn grammar_of(tokens: &[Spanned]) -> Grammar {
    let boolean = tokens
        .iter()
        .any(|s| matches!(s.token, Token::LParen | Token::RParen | Token::And | Token::Or));
    if boolean {
        Grammar::Boolean
    } else {
        Grammar::Simple
    }
}

/// Parse a raw search string.
///
/// `mode` combines the terms of a simple list; boolean expressions carry their
/// own operators and ignore it. AND binds tighter than OR, both associate left.
pub fn parse(input: &str, mode: BooleanMode) -> Result<SearchExpression, QueryError> {
    if input.trim().is_empty() {
        return Err(QueryError::InvalidQuery("query must not be empty".into()));
    }

    let tokens = tokenize(input)?;
    match grammar_of(&tokens) {
        Grammar::Simple => parse_simple(tokens, mode),
        Grammar::Boolean => {
            debug!(?mode, "boolean expression detected, ignoring search mode");
            parse_boolean(input, tokens)
        }
    }
}

fn parse_simple(tokens: Vec<Spanned>, mode: BooleanMode) -> Result<SearchExpression, QueryError> {
    let terms: Vec<Term> = if tokens.iter().any(|s| s.token == Token::Comma) {
        tokens
            .split(|s| s.token == Token::Comma)
            .filter_map(simple_segment)
            .collect()
    } else {
        tokens
            .into_iter()
            .filter_map(|s| match s.token {
                Token::Word(w) => Term::new(&w),
                Token::Quoted(q) => Term::quoted(&q),
                _ => None,
            })
            .collect()
    };

    terms
        .into_iter()
        .map(SearchExpression::Term)
        .reduce(|acc, next| SearchExpression::combine(mode, acc, next))
        .ok_or_else(|| QueryError::InvalidQuery("query contains no search terms".into()))
}

/// A comma-separated segment; a lone quoted token marks an explicit phrase.
fn simple_segment(segment: &[Spanned]) -> Option<Term> {
    if let [Spanned {
        token: Token::Quoted(q),
        ..
    }] = segment
    {
        return Term::quoted(q);
    }
    let words: Vec<&str> = segment
        .iter()
        .filter_map(|s| match &s.token {
            Token::Word(w) | Token::Quoted(w) => Some(w.as_str()),
            _ => None,
        })
        .collect();
    Term::new(&words.join(" "))
}

fn parse_boolean(input: &str, tokens: Vec<Spanned>) -> Result<SearchExpression, QueryError> {
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.expression()?;

    if let Some(next) = parser.peek() {
        let reason = match next.token {
            Token::RParen => "unbalanced closing parenthesis",
            Token::Comma => "commas cannot be combined with AND/OR; use an operator",
            _ => "missing AND/OR between terms",
        };
        return Err(parser.malformed(next.start, reason));
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().is_some_and(|s| &s.token == token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn malformed(&self, start: usize, reason: &'static str) -> QueryError {
        QueryError::MalformedExpression {
            fragment: fragment(self.input, start),
            reason,
        }
    }

    /// Offset of the previous token, or of the whole input when none was consumed.
    fn previous_start(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|s| s.start)
            .unwrap_or(0)
    }

    fn expression(&mut self) -> Result<SearchExpression, QueryError> {
        let mut left = self.conjunction()?;
        while self.eat(&Token::Or) {
            let right = self.conjunction()?;
            left = SearchExpression::or(left, right);
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> Result<SearchExpression, QueryError> {
        let mut left = self.primary()?;
        while self.eat(&Token::And) {
            let right = self.primary()?;
            left = SearchExpression::and(left, right);
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<SearchExpression, QueryError> {
        let Some(current) = self.peek().cloned() else {
            return Err(self.malformed(self.previous_start(), "operator without a right-hand term"));
        };

        match current.token {
            Token::LParen => {
                self.pos += 1;
                if self.peek().is_some_and(|s| s.token == Token::RParen) {
                    return Err(self.malformed(current.start, "empty parentheses"));
                }
                let inner = self.expression()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.malformed(current.start, "unbalanced opening parenthesis"));
                }
                Ok(inner)
            }
            Token::Quoted(text) => {
                self.pos += 1;
                Term::quoted(&text)
                    .map(SearchExpression::Term)
                    .ok_or_else(|| self.malformed(current.start, "empty quoted phrase"))
            }
            Token::Word(_) => self.phrase(current.start).map(SearchExpression::Term),
            Token::And | Token::Or => {
                Err(self.malformed(current.start, "operator without a left-hand term"))
            }
            Token::RParen => Err(self.malformed(current.start, "unexpected closing parenthesis")),
            Token::Comma => Err(self.malformed(
                current.start,
                "commas cannot be combined with AND/OR; use an operator",
            )),
        }
    }

    /// Consecutive bare words form one phrase term.
    fn phrase(&mut self, start: usize) -> Result<Term, QueryError> {
        let mut words = Vec::new();
        while let Some(Spanned {
            token: Token::Word(w),
            ..
        }) = self.peek()
        {
            words.push(w.clone());
            self.pos += 1;
        }
        Term::new(&words.join(" ")).ok_or_else(|| self.malformed(start, "empty term"))
    }
}
