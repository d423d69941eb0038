use super::QueryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Token {
    LParen,
    RParen,
    And,
    Or,
    Comma,
    Word(String),
    Quoted(String),
}

/// A token with its byte offset into the input, used to report fragments.
#[derive(Debug, Clone)]
pub(super) struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"' | ',')
}

pub(super) fn tokenize(input: &str) -> Result<Vec<Spanned>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            ',' => {
                chars.next();
                Token::Comma
            }
            '"' => {
                chars.next();
                let body_start = start + 1;
                let close = input[body_start..].find('"').ok_or_else(|| {
                    QueryError::MalformedExpression {
                        fragment: fragment(input, start),
                        reason: "unterminated quote",
                    }
                })?;
                let body_end = body_start + close;
                while chars.next_if(|&(i, _)| i <= body_end).is_some() {}
                Token::Quoted(input[body_start..body_end].to_string())
            }
            _ => {
                let mut end = start;
                while let Some((i, ch)) = chars.next_if(|&(_, ch)| is_word_char(ch)) {
                    end = i + ch.len_utf8();
                }
                let word = &input[start..end];
                if word.eq_ignore_ascii_case("AND") {
                    Token::And
                } else if word.eq_ignore_ascii_case("OR") {
                    Token::Or
                } else {
                    Token::Word(word.to_string())
                }
            }
        };
        let end = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
        tokens.push(Spanned { token, start, end });
    }

    Ok(tokens)
}

const MAX_FRAGMENT_CHARS: usize = 40;

/// The input from `start` onwards, trimmed and shortened for error messages.
pub(super) fn fragment(input: &str, start: usize) -> String {
    let rest = input.get(start..).unwrap_or_default().trim();
    if rest.chars().count() > MAX_FRAGMENT_CHARS {
        let cut: String = rest.chars().take(MAX_FRAGMENT_CHARS).collect();
        format!("{cut}...")
    } else {
        rest.to_string()
    }
}
