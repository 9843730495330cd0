//! Extractors for the free-text output of the literature scripts.
//!
//! The scripts print human-readable text, not a structured format, so every
//! extractor here is pattern matching over stdout. stderr is never read for
//! the payload; it only feeds [`crate::invoker::StderrPolicy`].

use regex::Regex;
use std::sync::LazyLock;

use crate::invoker::ProcessResult;

/// Sentinel the search script prints when PubMed returns nothing.
pub const NO_RESULTS_SENTINEL: &str = "No results found";

static IDENTIFIER_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"PMIDs[^\n]*?:\s*\[([^\]\n]*)\]").expect("identifier list pattern is valid")
});

static SINGLE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PMID:\s*(\d+)").expect("single identifier pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResult {
    /// Record identifiers in the order the script printed them. May be empty.
    Identifiers(Vec<String>),
    Identifier(String),
    Text { body: String, no_results: bool },
    NoneFound,
}

impl ParsedResult {
    /// True for a valid but empty outcome.
    pub fn is_empty(&self) -> bool {
        match self {
            ParsedResult::Identifiers(ids) => ids.is_empty(),
            ParsedResult::Identifier(_) => false,
            ParsedResult::Text { no_results, .. } => *no_results,
            ParsedResult::NoneFound => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputParser {
    IdentifierList,
    SingleIdentifier,
    FreeText,
}

impl OutputParser {
    pub fn parse(&self, output: &ProcessResult) -> ParsedResult {
        match self {
            OutputParser::IdentifierList => {
                ParsedResult::Identifiers(extract_identifier_list(&output.stdout))
            }
            OutputParser::SingleIdentifier => match extract_identifier(&output.stdout) {
                Some(pmid) => ParsedResult::Identifier(pmid),
                None => ParsedResult::NoneFound,
            },
            OutputParser::FreeText => ParsedResult::Text {
                no_results: output.stdout.contains(NO_RESULTS_SENTINEL),
                body: output.stdout.clone(),
            },
        }
    }
}

/// Reads the first `PMIDs ...: [a, b, c]` list. A missing label is an empty list.
pub fn extract_identifier_list(text: &str) -> Vec<String> {
    let Some(captures) = IDENTIFIER_LIST.captures(text) else {
        return Vec::new();
    };

    captures[1]
        .split(',')
        .map(|token| token.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// First `PMID: <digits>` token, if any.
pub fn extract_identifier(text: &str) -> Option<String> {
    SINGLE_IDENTIFIER
        .captures(text)
        .map(|captures| captures[1].to_string())
}
