//! Lexical query expansion.
//!
//! This module turns a free-text query into the boolean expression handed to
//! the document source. Each query token becomes an OR-group of the token and
//! its synonyms; optionally one more OR-group of MeSH headings is appended when
//! a known multi-word phrase occurs anywhere in the query.
//!
//! ```
//! use pubmed_semantic_search::expansion::TermExpander;
//!
//! let expanded = TermExpander::default().build_boolean_query("heart attack", true);
//! assert_eq!(
//!     expanded.as_str(),
//!     "(heart OR cardiac OR cardio) AND (attack OR infarction) AND (\"Myocardial Infarction\"[MeSH Terms])"
//! );
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Field tag appended to controlled-vocabulary terms.
pub const MESH_FIELD_TAG: &str = "[MeSH Terms]";

const GENERAL_SYNONYMS: &[(&str, &[&str])] = &[
    ("heart", &["cardiac", "cardio"]),
    ("attack", &["infarction"]),
    ("stroke", &["cva", "cerebrovascular accident"]),
];

const MEDICAL_SYNONYMS: &[(&str, &[&str])] = &[
    ("myocardial", &["cardiac"]),
    ("infarction", &["heart attack"]),
    ("diabetes", &["type 2 diabetes", "t2d"]),
];

const MESH_PHRASES: &[(&str, &[&str])] = &[
    ("heart attack", &["Myocardial Infarction"]),
    ("diabetes", &["Diabetes Mellitus"]),
    ("stroke", &["Stroke"]),
];

fn is_term_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '\''
}

/// Split a query into word-like units: runs of ASCII letters, digits,
/// hyphens and apostrophes. Case is preserved.
pub fn tokenize_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !is_term_char(c))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn owned_table(entries: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
    entries
        .iter()
        .map(|(key, values)| {
            (
                key.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

/// Lookup tables driving the expansion.
///
/// Keys are lowercase. The MeSH table is ordered: matching headings are
/// emitted in table order.
#[derive(Debug, Clone)]
pub struct SynonymTables {
    /// General-language synonyms keyed by token
    pub general: HashMap<String, Vec<String>>,
    /// Domain synonyms keyed by token
    pub medical: HashMap<String, Vec<String>>,
    /// MeSH headings keyed by phrase
    pub mesh: Vec<(String, Vec<String>)>,
}

impl Default for SynonymTables {
    fn default() -> Self {
        Self {
            general: owned_table(GENERAL_SYNONYMS).into_iter().collect(),
            medical: owned_table(MEDICAL_SYNONYMS).into_iter().collect(),
            mesh: owned_table(MESH_PHRASES),
        }
    }
}

/// The alternatives generated for a single query token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermGroup {
    /// The token as it appeared in the query
    pub term: String,
    /// The token followed by its synonyms, without duplicates
    pub alternatives: Vec<String>,
}

impl TermGroup {
    fn render(&self) -> String {
        let parts: Vec<String> = self.alternatives.iter().map(|a| quote_if_spaced(a)).collect();
        format!("({})", parts.join(" OR "))
    }
}

fn quote_if_spaced(term: &str) -> String {
    if term.chars().any(char::is_whitespace) {
        format!("\"{}\"", term)
    } else {
        term.to_string()
    }
}

/// The boolean expression derived from a raw query.
///
/// A value type: built once by [`TermExpander::build_boolean_query`] and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedQuery {
    groups: Vec<TermGroup>,
    mesh_terms: Vec<String>,
    rendered: String,
}

impl ExpandedQuery {
    /// Per-token OR-groups, in query order.
    pub fn groups(&self) -> &[TermGroup] {
        &self.groups
    }

    /// MeSH headings appended as the final group (empty when disabled or
    /// nothing matched).
    pub fn mesh_terms(&self) -> &[String] {
        &self.mesh_terms
    }

    /// The expression string passed to the document source.
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Whether the raw query was passed through unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn into_string(self) -> String {
        self.rendered
    }
}

impl fmt::Display for ExpandedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Expands query tokens into synonym sets and MeSH headings.
///
/// Pure: output depends only on the input and the lookup tables.
#[derive(Debug, Clone, Default)]
pub struct TermExpander {
    tables: SynonymTables,
}

impl TermExpander {
    pub fn new(tables: SynonymTables) -> Self {
        Self { tables }
    }

    /// The token itself followed by every synonym and exact-key MeSH heading
    /// for its lowercase form.
    pub fn expand_term(&self, term: &str) -> Vec<String> {
        let key = term.to_lowercase();
        let mut alternatives = vec![term.to_string()];
        let found = self
            .tables
            .general
            .get(&key)
            .into_iter()
            .chain(self.tables.medical.get(&key))
            .flatten()
            .chain(
                self.tables
                    .mesh
                    .iter()
                    .filter(|(phrase, _)| *phrase == key)
                    .flat_map(|(_, headings)| headings),
            );
        for alt in found {
            if !alternatives.contains(alt) {
                alternatives.push(alt.clone());
            }
        }
        alternatives
    }

    /// MeSH headings whose key phrase occurs as a substring of the lowercase,
    /// space-joined token sequence.
    ///
    /// Matches inside longer words too ("stroke" in "heatstroke").
    pub fn mesh_terms_for(&self, tokens: &[String]) -> Vec<String> {
        let joined = tokens.join(" ").to_lowercase();
        let mut terms: Vec<String> = Vec::new();
        for (phrase, headings) in &self.tables.mesh {
            if joined.contains(phrase.as_str()) {
                for heading in headings {
                    if !terms.contains(heading) {
                        terms.push(heading.clone());
                    }
                }
            }
        }
        terms
    }

    /// Expand every distinct token of `query`.
    ///
    /// Returns the raw query unchanged as a single entry when it has no
    /// tokens.
    pub fn expand_query(&self, query: &str) -> Vec<String> {
        let tokens = tokenize_terms(query);
        if tokens.is_empty() {
            return vec![query.to_string()];
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for token in &tokens {
            if seen.insert(token.to_lowercase()) {
                for alt in self.expand_term(token) {
                    if !out.contains(&alt) {
                        out.push(alt);
                    }
                }
            }
        }
        for term in self.mesh_terms_for(&tokens) {
            if !out.contains(&term) {
                out.push(term);
            }
        }
        out
    }

    /// Build the boolean search expression for `query`.
    ///
    /// One parenthesized OR-group per distinct (case-insensitive) token,
    /// joined with AND. With `use_mesh`, matching MeSH headings are appended
    /// as a final group tagged with [`MESH_FIELD_TAG`]. A query without tokens
    /// is returned unchanged.
    pub fn build_boolean_query(&self, query: &str, use_mesh: bool) -> ExpandedQuery {
        let tokens = tokenize_terms(query);
        if tokens.is_empty() {
            return ExpandedQuery {
                groups: Vec::new(),
                mesh_terms: Vec::new(),
                rendered: query.to_string(),
            };
        }

        let mut seen = HashSet::new();
        let groups: Vec<TermGroup> = tokens
            .iter()
            .filter(|t| seen.insert(t.to_lowercase()))
            .map(|t| TermGroup {
                term: t.clone(),
                alternatives: self.expand_term(t),
            })
            .collect();

        let mesh_terms = if use_mesh {
            self.mesh_terms_for(&tokens)
        } else {
            Vec::new()
        };

        let mut rendered: Vec<String> = groups.iter().map(TermGroup::render).collect();
        if !mesh_terms.is_empty() {
            let tagged: Vec<String> = mesh_terms
                .iter()
                .map(|m| format!("\"{}\"{}", m, MESH_FIELD_TAG))
                .collect();
            rendered.push(format!("({})", tagged.join(" OR ")));
        }

        ExpandedQuery {
            groups,
            mesh_terms,
            rendered: rendered.join(" AND "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_terms() {
        assert_eq!(
            tokenize_terms("Type-2 diabetes, patient's risk!"),
            vec!["Type-2", "diabetes", "patient's", "risk"]
        );
        assert!(tokenize_terms("  ?!  ").is_empty());
        assert!(tokenize_terms("").is_empty());
    }

    #[test]
    fn test_expand_term_is_case_insensitive() {
        let expander = TermExpander::default();
        assert_eq!(expander.expand_term("Heart"), vec!["Heart", "cardiac", "cardio"]);
        assert_eq!(expander.expand_term("unrelated"), vec!["unrelated"]);
    }

    #[test]
    fn test_expand_term_includes_exact_mesh_key() {
        let expander = TermExpander::default();
        assert_eq!(
            expander.expand_term("stroke"),
            vec!["stroke", "cva", "cerebrovascular accident", "Stroke"]
        );
        assert_eq!(
            expander.expand_term("diabetes"),
            vec!["diabetes", "type 2 diabetes", "t2d", "Diabetes Mellitus"]
        );
    }

    #[test]
    fn test_mesh_terms_use_substring_matching() {
        let expander = TermExpander::default();
        let tokens = tokenize_terms("acute Heart Attack outcomes");
        assert_eq!(expander.mesh_terms_for(&tokens), vec!["Myocardial Infarction"]);

        let tokens = tokenize_terms("heatstroke");
        assert_eq!(expander.mesh_terms_for(&tokens), vec!["Stroke"]);

        let tokens = tokenize_terms("heart failure");
        assert!(expander.mesh_terms_for(&tokens).is_empty());
    }

    #[test]
    fn test_heart_attack_with_mesh() {
        let expanded = TermExpander::default().build_boolean_query("heart attack", true);
        assert_eq!(
            expanded.as_str(),
            "(heart OR cardiac OR cardio) AND (attack OR infarction) AND (\"Myocardial Infarction\"[MeSH Terms])"
        );
        assert_eq!(expanded.groups().len(), 2);
        assert!(expanded.groups()[0].alternatives.contains(&"cardiac".to_string()));
        assert!(expanded.groups()[0].alternatives.contains(&"cardio".to_string()));
        assert_eq!(expanded.mesh_terms(), ["Myocardial Infarction".to_string()]);
    }

    #[test]
    fn test_mesh_disabled() {
        let expanded = TermExpander::default().build_boolean_query("heart attack", false);
        assert_eq!(
            expanded.as_str(),
            "(heart OR cardiac OR cardio) AND (attack OR infarction)"
        );
        assert!(expanded.mesh_terms().is_empty());
    }

    #[test]
    fn test_multi_word_alternatives_are_quoted() {
        let expanded = TermExpander::default().build_boolean_query("infarction", false);
        assert_eq!(expanded.as_str(), "(infarction OR \"heart attack\")");
    }

    #[test]
    fn test_one_group_per_distinct_token() {
        let expanded = TermExpander::default().build_boolean_query("heart HEART risk", false);
        assert_eq!(expanded.groups().len(), 2);
        assert_eq!(expanded.as_str().matches(" AND ").count(), 1);
        assert_eq!(expanded.as_str().matches('(').count(), 2);
    }

    #[test]
    fn test_zero_tokens_pass_through() {
        let expander = TermExpander::default();
        let expanded = expander.build_boolean_query("  ?? ", true);
        assert!(expanded.is_passthrough());
        assert_eq!(expanded.as_str(), "  ?? ");
        assert_eq!(expander.expand_query("!!"), vec!["!!"]);
    }

    #[test]
    fn test_expand_query_collects_all_variants() {
        let expander = TermExpander::default();
        let variants = expander.expand_query("heart attack");
        assert_eq!(
            variants,
            vec!["heart", "cardiac", "cardio", "attack", "infarction", "Myocardial Infarction"]
        );
    }

    #[test]
    fn test_custom_tables() {
        let mut tables = SynonymTables::default();
        tables
            .general
            .insert("cancer".to_string(), vec!["neoplasm".to_string(), "tumor".to_string()]);
        tables
            .mesh
            .push(("lung cancer".to_string(), vec!["Lung Neoplasms".to_string()]));
        let expanded = TermExpander::new(tables).build_boolean_query("lung cancer", true);
        assert_eq!(
            expanded.as_str(),
            "(lung) AND (cancer OR neoplasm OR tumor) AND (\"Lung Neoplasms\"[MeSH Terms])"
        );
    }
}
