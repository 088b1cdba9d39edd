//! MEDLINE/PubMed XML parsing.
//!
//! Maps the `PubmedArticleSet` document returned by `efetch` into
//! [`Document`]s using a streaming reader. Only the documented element paths
//! are read; an article missing its PMID or containing undecodable text is
//! skipped with a warning instead of failing the whole set.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use super::{ProviderError, ProviderResult};
use crate::models::Document;

/// Base of the canonical article link.
pub const PUBMED_ARTICLE_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Pmid,
    Title,
    AbstractText,
    Journal,
    Year,
    MedlineDate,
    LastName,
    ForeName,
    Initials,
}

impl Field {
    fn for_path(path: &[String]) -> Option<Self> {
        const TABLE: &[(&[&str], Field)] = &[
            (&["MedlineCitation", "PMID"], Field::Pmid),
            (&["Article", "ArticleTitle"], Field::Title),
            (&["Article", "Abstract", "AbstractText"], Field::AbstractText),
            (&["Article", "Journal", "Title"], Field::Journal),
            (&["PubDate", "Year"], Field::Year),
            (&["PubDate", "MedlineDate"], Field::MedlineDate),
            (&["AuthorList", "Author", "LastName"], Field::LastName),
            (&["AuthorList", "Author", "ForeName"], Field::ForeName),
            (&["AuthorList", "Author", "Initials"], Field::Initials),
        ];
        TABLE
            .iter()
            .find(|(suffix, _)| ends_with(path, suffix))
            .map(|(_, field)| *field)
    }
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

#[derive(Debug, Default)]
struct AuthorBuilder {
    last: Option<String>,
    fore: Option<String>,
    initials: Option<String>,
}

impl AuthorBuilder {
    fn build(self) -> Option<String> {
        let last = self.last.filter(|s| !s.is_empty())?;
        match self.fore.or(self.initials).filter(|s| !s.is_empty()) {
            Some(first) => Some(format!("{} {}", first, last)),
            None => Some(last),
        }
    }
}

#[derive(Debug, Default)]
struct ArticleBuilder {
    pmid: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    journal: Option<String>,
    year: Option<String>,
    medline_date: Option<String>,
    authors: Vec<String>,
    author: Option<AuthorBuilder>,
    malformed: Option<String>,
}

impl ArticleBuilder {
    fn set(&mut self, field: Field, text: String) {
        let text = collapse_whitespace(&text);
        match field {
            Field::Pmid => {
                if self.pmid.is_none() {
                    self.pmid = Some(text);
                }
            }
            Field::Title => self.title = text,
            Field::AbstractText => self.abstract_parts.push(text),
            Field::Journal => self.journal = Some(text),
            Field::Year => self.year = Some(text),
            Field::MedlineDate => self.medline_date = Some(text),
            Field::LastName | Field::ForeName | Field::Initials => {
                let author = self.author.get_or_insert_with(AuthorBuilder::default);
                match field {
                    Field::LastName => author.last = Some(text),
                    Field::ForeName => author.fore = Some(text),
                    _ => author.initials = Some(text),
                }
            }
        }
    }

    fn build(self) -> Result<Document, String> {
        if let Some(reason) = self.malformed {
            return Err(reason);
        }
        let pmid = self
            .pmid
            .filter(|p| !p.is_empty())
            .ok_or_else(|| "missing PMID".to_string())?;

        let abstract_text = collapse_whitespace(&strip_markup(&self.abstract_parts.join(" ")));

        Ok(Document {
            url: format!("{}/{}/", PUBMED_ARTICLE_URL, pmid),
            pmid,
            title: self.title,
            abstract_text,
            journal: self.journal.filter(|j| !j.is_empty()),
            year: self.year.or(self.medline_date).filter(|y| !y.is_empty()),
            authors: if self.authors.is_empty() {
                None
            } else {
                Some(self.authors)
            },
        })
    }
}

struct Capture {
    field: Field,
    depth: usize,
    buffer: String,
}

/// Remove anything that looks like an XML/HTML tag.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a `PubmedArticleSet` XML payload.
///
/// # Errors
/// Returns `ProviderError::ParseError` only when the payload as a whole is
/// not well-formed XML; individual bad articles are skipped.
pub fn parse_article_set(xml: &str) -> ProviderResult<Vec<Document>> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ArticleBuilder> = None;
    let mut capture: Option<Capture> = None;
    let mut documents = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let opens_article = name == "PubmedArticle";
                path.push(name);
                if current.is_none() {
                    if opens_article {
                        current = Some(ArticleBuilder::default());
                    }
                    continue;
                }
                let Some(article) = current.as_mut() else {
                    continue;
                };
                if ends_with(&path, &["AuthorList", "Author"]) {
                    article.author = Some(AuthorBuilder::default());
                }
                if capture.is_none() {
                    if let Some(field) = Field::for_path(&path) {
                        capture = Some(Capture {
                            field,
                            depth: path.len(),
                            buffer: String::new(),
                        });
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(cap), Some(article)) = (capture.as_mut(), current.as_mut()) {
                    match text.unescape() {
                        Ok(decoded) => cap.buffer.push_str(&decoded),
                        Err(e) => {
                            article.malformed.get_or_insert_with(|| format!("undecodable text: {}", e));
                        }
                    }
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(cap) = capture.as_mut() {
                    cap.buffer.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::End(_)) => {
                if let (Some(article), true) = (
                    current.as_mut(),
                    capture.as_ref().map(|c| c.depth) == Some(path.len()),
                ) {
                    if let Some(cap) = capture.take() {
                        article.set(cap.field, cap.buffer);
                    }
                }
                if let Some(article) = current.as_mut() {
                    if ends_with(&path, &["AuthorList", "Author"]) {
                        if let Some(name) = article.author.take().and_then(AuthorBuilder::build) {
                            article.authors.push(name);
                        }
                    }
                }
                let closed = path.pop();
                if closed.as_deref() == Some("PubmedArticle") {
                    if let Some(article) = current.take() {
                        match article.build() {
                            Ok(doc) => documents.push(doc),
                            Err(reason) => warn!(reason = %reason, "Skipping malformed PubMed record"),
                        }
                    }
                    capture = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProviderError::ParseError(format!(
                    "invalid XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            Ok(_) => {}
        }
    }

    Ok(documents)
}
