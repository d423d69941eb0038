//! `PubmedArticleSet` XML (efetch) into articles.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::warn;

use super::{Source, SourceError, normalize_whitespace};
use crate::article::Article;

#[derive(Default)]
struct Draft {
    pmid: String,
    title: String,
    sections: Vec<String>,
    section: String,
    section_label: Option<String>,
    authors: Vec<String>,
    author: AuthorDraft,
    year: String,
    medline_date: String,
    journal_title: String,
    iso_abbreviation: String,
    id_type: Option<String>,
    has_pmc_id: bool,
    open_access_type: bool,
}

#[derive(Default)]
struct AuthorDraft {
    last: String,
    fore: String,
    collective: String,
}

impl AuthorDraft {
    fn name(&self) -> Option<String> {
        let last = normalize_whitespace(&self.last);
        let fore = normalize_whitespace(&self.fore);
        let collective = normalize_whitespace(&self.collective);
        match (last.is_empty(), fore.is_empty()) {
            (false, false) => Some(format!("{fore} {last}")),
            (false, true) => Some(last),
            _ if !collective.is_empty() => Some(collective),
            _ => None,
        }
    }
}

impl Draft {
    fn finish(self) -> Option<Article> {
        let pmid = self.pmid.trim().to_string();
        if pmid.is_empty() {
            return None;
        }
        let mut article = Article::new(
            Source::Pubmed,
            pmid.clone(),
            format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"),
        );
        article.title = normalize_whitespace(&self.title);
        article.abstract_text = self.sections.join("\n\n");
        article.authors = self.authors;
        article.publication_date = non_empty(&self.year).or_else(|| {
            non_empty(&self.medline_date).map(|d| d.chars().take(4).collect())
        });
        article.journal =
            non_empty(&self.journal_title).or_else(|| non_empty(&self.iso_abbreviation));
        article.is_open_access = Some(self.has_pmc_id || self.open_access_type);
        Some(article)
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = normalize_whitespace(text);
    (!text.is_empty()).then_some(text)
}

fn element_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// True when the element path ends with `suffix`.
fn ends_with(stack: &[String], suffix: &[&str]) -> bool {
    stack.len() >= suffix.len()
        && stack[stack.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn within(stack: &[String], name: &str) -> bool {
    stack.iter().any(|s| s == name)
}

/// Parse efetch XML. Missing fields are left empty; malformed XML is a protocol error.
pub(super) fn parse_articles(xml: &str) -> Result<Vec<Article>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut draft: Option<Draft> = None;
    let mut articles = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SourceError::Protocol(format!("invalid PubMed XML: {e}")))?;
        match event {
            Event::Start(e) => {
                let name = element_name(e.name().as_ref());
                match name.as_str() {
                    "PubmedArticle" => draft = Some(Draft::default()),
                    "Author" => {
                        if let Some(d) = draft.as_mut() {
                            d.author = AuthorDraft::default();
                        }
                    }
                    "AbstractText" => {
                        if let Some(d) = draft.as_mut() {
                            d.section.clear();
                            d.section_label = attribute(&e, "Label");
                        }
                    }
                    "ArticleId" => {
                        if let Some(d) = draft.as_mut() {
                            d.id_type = attribute(&e, "IdType");
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::Text(e) => {
                let Some(d) = draft.as_mut() else { continue };
                let text = e
                    .unescape()
                    .map_err(|e| SourceError::Protocol(format!("invalid PubMed XML text: {e}")))?;
                collect_text(d, &stack, &text);
            }
            Event::End(e) => {
                let name = element_name(e.name().as_ref());
                stack.pop();
                let Some(d) = draft.as_mut() else { continue };
                match name.as_str() {
                    "AbstractText" => {
                        let body = normalize_whitespace(&d.section);
                        if !body.is_empty() {
                            let section = match d.section_label.take().filter(|l| !l.is_empty()) {
                                Some(label) => format!("{label}: {body}"),
                                None => body,
                            };
                            d.sections.push(section);
                        }
                    }
                    "Author" if within(&stack, "AuthorList") => {
                        if let Some(name) = d.author.name() {
                            d.authors.push(name);
                        }
                    }
                    "ArticleId" => d.id_type = None,
                    "PubmedArticle" => {
                        if let Some(article) = draft.take().and_then(Draft::finish) {
                            articles.push(article);
                        } else {
                            warn!("skipping PubMed record without PMID");
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(articles)
}

fn collect_text(d: &mut Draft, stack: &[String], text: &str) {
    if ends_with(stack, &["MedlineCitation", "PMID"]) {
        if d.pmid.is_empty() {
            d.pmid.push_str(text);
        }
    } else if within(stack, "ArticleTitle") {
        d.title.push_str(text);
    } else if within(stack, "AbstractText") {
        d.section.push_str(text);
    } else if within(stack, "AuthorList") {
        if ends_with(stack, &["Author", "LastName"]) {
            d.author.last.push_str(text);
        } else if ends_with(stack, &["Author", "ForeName"]) {
            d.author.fore.push_str(text);
        } else if ends_with(stack, &["Author", "CollectiveName"]) {
            d.author.collective.push_str(text);
        }
    } else if ends_with(stack, &["PubDate", "Year"]) {
        d.year.push_str(text);
    } else if ends_with(stack, &["PubDate", "MedlineDate"]) {
        d.medline_date.push_str(text);
    } else if ends_with(stack, &["Journal", "Title"]) {
        d.journal_title.push_str(text);
    } else if ends_with(stack, &["Journal", "ISOAbbreviation"]) {
        d.iso_abbreviation.push_str(text);
    } else if ends_with(stack, &["PublicationType"]) {
        if text.to_ascii_lowercase().contains("open access") {
            d.open_access_type = true;
        }
    } else if ends_with(stack, &["PubmedData", "ArticleIdList", "ArticleId"])
        && d.id_type.as_deref() == Some("pmc")
        && !text.trim().is_empty()
    {
        d.has_pmc_id = true;
    }
}
