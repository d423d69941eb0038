use crate::sources::Source;

use super::{FieldScope, SearchExpression, Term};

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Abstract,
}

/// Source-native query syntax.
struct Dialect {
    and: &'static str,
    or: &'static str,
    qualify: fn(&str, Field) -> String,
}

/// E-utilities: bracketed field tag after the term.
static PUBMED: Dialect = Dialect {
    and: "AND",
    or: "OR",
    qualify: pubmed_field,
};

/// Europe PMC (bioRxiv preprints): upper-case field prefix before the term.
static EUROPE_PMC: Dialect = Dialect {
    and: "AND",
    or: "OR",
    qualify: europe_pmc_field,
};

fn pubmed_field(term: &str, field: Field) -> String {
    match field {
        Field::Title => format!("{term}[Title]"),
        Field::Abstract => format!("{term}[Abstract]"),
    }
}

fn europe_pmc_field(term: &str, field: Field) -> String {
    match field {
        Field::Title => format!("TITLE:{term}"),
        Field::Abstract => format!("ABSTRACT:{term}"),
    }
}

fn dialect(source: Source) -> &'static Dialect {
    match source {
        Source::Pubmed => &PUBMED,
        Source::Biorxiv => &EUROPE_PMC,
    }
}

/// Render `expr` as a native query for `source`, qualifying every leaf with `scope`.
///
/// `TitleAbstract` expands each leaf into a parenthesized OR of its title and
/// abstract forms, so the expansion binds as a single operand wherever the
/// leaf sits. Parentheses are emitted only where the tree needs them.
pub fn translate(expr: &SearchExpression, scope: FieldScope, source: Source) -> String {
    let dialect = dialect(source);
    render(expr, &|term| leaf(term, scope, dialect), dialect)
}

/// Unqualified rendering in the input grammar.
pub(super) fn render_plain(expr: &SearchExpression) -> String {
    render(expr, &Term::render, &PUBMED)
}

fn leaf(term: &Term, scope: FieldScope, dialect: &Dialect) -> String {
    let text = term.render();
    match scope {
        FieldScope::All => text,
        FieldScope::Title => (dialect.qualify)(&text, Field::Title),
        FieldScope::Abstract => (dialect.qualify)(&text, Field::Abstract),
        FieldScope::TitleAbstract => format!(
            "({} {} {})",
            (dialect.qualify)(&text, Field::Title),
            dialect.or,
            (dialect.qualify)(&text, Field::Abstract)
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Or,
    And,
    Leaf,
}

fn precedence(expr: &SearchExpression) -> Precedence {
    match expr {
        SearchExpression::Term(_) => Precedence::Leaf,
        SearchExpression::And(..) => Precedence::And,
        SearchExpression::Or(..) => Precedence::Or,
    }
}

fn render(expr: &SearchExpression, leaf: &dyn Fn(&Term) -> String, dialect: &Dialect) -> String {
    let (left, right, op) = match expr {
        SearchExpression::Term(term) => return leaf(term),
        SearchExpression::And(l, r) => (l, r, dialect.and),
        SearchExpression::Or(l, r) => (l, r, dialect.or),
    };
    let parent = precedence(expr);

    // Operators associate left, so a right operand of equal precedence keeps
    // its parentheses to preserve the tree shape.
    let left_text = render(left, leaf, dialect);
    let left_text = if precedence(left) < parent {
        format!("({left_text})")
    } else {
        left_text
    };
    let right_text = render(right, leaf, dialect);
    let right_text = if precedence(right) <= parent {
        format!("({right_text})")
    } else {
        right_text
    };

    format!("{left_text} {op} {right_text}")
}
