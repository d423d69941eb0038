use std::fmt::Write as _;

use crate::article::Article;
use crate::classify::{BatchReport, ClassifyResponse};
use crate::search::GeneratedQuery;
use crate::sources::Source;

const MAX_ABSTRACT_CHARS: usize = 600;
const MAX_AUTHORS: usize = 6;

/// Escape characters that break Markdown link syntax: `[`, `]`, `(`, `)`.
pub(crate) fn escape_md_link(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '[' | ']' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Sanitize user input for embedding in a Markdown heading.
/// Replaces newlines (which would break heading structure) with spaces.
pub(crate) fn sanitize_heading(s: &str) -> String {
    s.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Render a result list, with classification marks when present.
pub(crate) fn format_articles(
    source: Source,
    native_query: &str,
    articles: &[Article],
    batch: Option<&BatchReport>,
) -> String {
    let mut output = format!("# {source}: {}\n\n", sanitize_heading(native_query));

    if articles.is_empty() {
        output.push_str("No articles found.\n");
        return output;
    }

    let _ = writeln!(output, "{} article(s)", articles.len());
    if let Some(report) = batch {
        let _ = write!(
            output,
            "\nClassified {}, skipped {} already classified",
            report.classified, report.skipped
        );
        if report.cancelled {
            output.push_str(" (cancelled)");
        }
        output.push('\n');
    }
    output.push('\n');

    for (i, article) in articles.iter().enumerate() {
        format_article(&mut output, i + 1, article);
    }
    output
}

fn format_article(output: &mut String, position: usize, article: &Article) {
    let title = if article.title.is_empty() {
        "(untitled)"
    } else {
        article.title.as_str()
    };
    let _ = writeln!(
        output,
        "## {position}. [{}]({})\n",
        escape_md_link(&sanitize_heading(title)),
        escape_md_link(&article.url)
    );

    if !article.authors.is_empty() {
        let mut authors = article.authors[..article.authors.len().min(MAX_AUTHORS)].join(", ");
        if article.authors.len() > MAX_AUTHORS {
            authors.push_str(", et al.");
        }
        let _ = writeln!(output, "- Authors: {authors}");
    }
    let published: Vec<&str> = [article.journal.as_deref(), article.publication_date.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !published.is_empty() {
        let _ = writeln!(output, "- Published: {}", published.join(", "));
    }
    let _ = writeln!(output, "- ID: {}", article.id);
    if let Some(open) = article.is_open_access {
        let _ = writeln!(output, "- Open access: {}", if open { "yes" } else { "no" });
    }

    let c = &article.classification;
    let verdict = match c.has_dataset {
        Some(true) => "dataset",
        Some(false) => "no dataset",
        None => "unclassified",
    };
    match c.confidence {
        Some(confidence) => {
            let _ = writeln!(output, "- Dataset: {verdict} ({} confidence)", confidence.as_str());
        }
        None => {
            let _ = writeln!(output, "- Dataset: {verdict}");
        }
    }
    if let Some(reason) = &c.reason {
        let _ = writeln!(output, "- Reason: {reason}");
    }
    if let Some(availability) = &c.data_availability {
        let _ = writeln!(output, "- Data availability: {availability}");
    }
    if !c.labels.is_empty() {
        let labels: Vec<&str> = c.labels.iter().map(String::as_str).collect();
        let _ = writeln!(output, "- Labels: {}", labels.join(", "));
    }
    if !c.method_types.is_empty() {
        let methods: Vec<&str> = c.method_types.iter().map(String::as_str).collect();
        let _ = writeln!(output, "- Method types: {}", methods.join(", "));
    }

    if !article.abstract_text.is_empty() {
        let _ = writeln!(output, "\n> {}", truncate(&article.abstract_text, MAX_ABSTRACT_CHARS));
    }
    output.push('\n');
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let end = text.floor_char_boundary(max);
    format!("{}...", text[..end].trim_end())
}

pub(crate) fn format_generated(generated: &GeneratedQuery) -> String {
    let mut output = String::from("# Generated query\n\n");
    let _ = writeln!(output, "```\n{}\n```\n", generated.native_query);

    if !generated.extracted_concepts.is_empty() {
        output.push_str("## Concepts\n\n");
        for concept in &generated.extracted_concepts {
            match generated.synonyms_used.get(concept) {
                Some(synonyms) if !synonyms.is_empty() => {
                    let _ = writeln!(output, "- {concept}: {}", synonyms.join(", "));
                }
                _ => {
                    let _ = writeln!(output, "- {concept}");
                }
            }
        }
        output.push('\n');
    }

    if !generated.explanation.is_empty() {
        let _ = writeln!(output, "## Strategy\n\n{}", generated.explanation);
    }
    output
}

pub(crate) fn format_classification(response: &ClassifyResponse) -> String {
    let mut output = format!("# Classification: {}\n\n", sanitize_heading(&response.article_id));
    let _ = writeln!(
        output,
        "- Dataset: {}",
        if response.has_dataset { "yes" } else { "no" }
    );
    let _ = writeln!(output, "- Confidence: {}", response.confidence);
    let _ = writeln!(output, "- Reason: {}", response.reason);
    if let Some(availability) = &response.data_availability {
        let _ = writeln!(output, "- Data availability: {availability}");
    }
    if !response.labels.is_empty() {
        let _ = writeln!(output, "- Labels: {}", response.labels.join(", "));
    }
    if !response.method_types.is_empty() {
        let _ = writeln!(output, "- Method types: {}", response.method_types.join(", "));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{Classification, Confidence};
    use crate::query::SearchExpression;
    use std::collections::BTreeMap;

    #[test]
    fn escapes_special_chars() {
        assert_eq!(escape_md_link("normal text"), "normal text");
        assert_eq!(escape_md_link("a[b]c(d)e"), r"a\[b\]c\(d\)e");
    }

    #[test]
    fn sanitize_heading_replaces_newlines() {
        assert_eq!(sanitize_heading("line1\nline2\rline3"), "line1 line2 line3");
        assert_eq!(sanitize_heading("no newlines"), "no newlines");
    }

    fn sample() -> Article {
        let mut article =
            Article::new(Source::Pubmed, "123", "https://pubmed.ncbi.nlm.nih.gov/123/");
        article.title = "Lipidomics of SRM 1950 [2024]".into();
        article.authors = (1..=8).map(|i| format!("Author {i}")).collect();
        article.journal = Some("Anal Chem".into());
        article.publication_date = Some("2024".into());
        article.abstract_text = "x".repeat(1000);
        article
    }

    #[test]
    fn empty_results_say_no_articles_found() {
        let text = format_articles(Source::Pubmed, "nothing", &[], None);
        assert!(text.contains("No articles found"));
    }

    #[test]
    fn unclassified_article_is_marked() {
        let text = format_articles(Source::Pubmed, "SRM1950", &[sample()], None);
        assert!(text.contains("## 1. [Lipidomics of SRM 1950 \\[2024\\]]"));
        assert!(text.contains("Author 6, et al."));
        assert!(!text.contains("Author 7"));
        assert!(text.contains("- Published: Anal Chem, 2024"));
        assert!(text.contains("- Dataset: unclassified"));
        assert!(text.contains("..."));
    }

    #[test]
    fn classified_article_shows_verdict_and_labels() {
        let mut article = sample();
        article.classification = Classification {
            has_dataset: Some(true),
            confidence: Some(Confidence::High),
            reason: Some("Deposited in MetaboLights".into()),
            data_availability: Some("MTBLS1".into()),
            labels: ["Application Study".to_string()].into(),
            method_types: ["LC-MS".to_string()].into(),
        };
        let report = BatchReport {
            classified: 1,
            skipped: 0,
            cancelled: true,
        };

        let text = format_articles(Source::Biorxiv, "q", &[article], Some(&report));

        assert!(text.starts_with("# biorxiv: q"));
        assert!(text.contains("Classified 1, skipped 0 already classified (cancelled)"));
        assert!(text.contains("- Dataset: dataset (high confidence)"));
        assert!(text.contains("- Data availability: MTBLS1"));
        assert!(text.contains("- Labels: Application Study"));
        assert!(text.contains("- Method types: LC-MS"));
    }

    #[test]
    fn generated_query_lists_concepts_with_synonyms() {
        let generated = GeneratedQuery {
            native_query: "(HILIC OR \"hydrophilic interaction\")".into(),
            extracted_concepts: vec!["HILIC".into(), "plasma".into()],
            synonyms_used: BTreeMap::from([(
                "HILIC".to_string(),
                vec!["hydrophilic interaction".to_string()],
            )]),
            explanation: "Synonyms grouped with OR.".into(),
            expression: SearchExpression::term("HILIC").unwrap(),
        };
        let text = format_generated(&generated);
        assert!(text.contains("- HILIC: hydrophilic interaction"));
        assert!(text.contains("- plasma\n"));
        assert!(text.contains("## Strategy"));
    }

    #[test]
    fn classification_renders_optional_fields() {
        let response = ClassifyResponse {
            article_id: "PMC1".into(),
            has_dataset: false,
            confidence: "low".into(),
            reason: "Unable to determine".into(),
            data_availability: None,
            labels: vec![],
            method_types: vec![],
        };
        let text = format_classification(&response);
        assert!(text.contains("- Dataset: no"));
        assert!(!text.contains("Data availability"));
    }
}
