use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FlowError, Result};

/// The user-facing operations the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Search,
    AdvancedSearch,
    Details,
    Translate,
    Download,
    /// Resolve a free-text query to a single PMID ahead of a download.
    Resolve,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Search => "search",
            Feature::AdvancedSearch => "advanced-search",
            Feature::Details => "details",
            Feature::Translate => "translate",
            Feature::Download => "download",
            Feature::Resolve => "resolve",
        }
    }

    /// Generic message returned to the client when the script fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Feature::Search => "Error executing search",
            Feature::AdvancedSearch => "Search failed",
            Feature::Details => "Failed to fetch article details",
            Feature::Translate => "Failed to translate file",
            Feature::Download => "Failed to download PDF",
            Feature::Resolve => "Failed to execute search",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file received with a translate request.
#[derive(Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Named request fields as they arrive from the client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentParams {
    pub query: Option<String>,
    pub journal: Option<String>,
    #[serde(alias = "author1")]
    pub author: Option<String>,
    pub year: Option<String>,
    pub keyword: Option<String>,
    pub pmid: Option<String>,
    #[serde(alias = "targetLang")]
    pub target_language: Option<String>,
    pub text: Option<String>,
    #[serde(skip)]
    pub upload: Option<Upload>,
}

#[derive(Debug, Clone)]
pub struct RequestIntent {
    pub feature: Feature,
    pub params: IntentParams,
}

impl RequestIntent {
    pub fn new(feature: Feature, params: IntentParams) -> Self {
        Self { feature, params }
    }
}

/// A PubMed identifier: 1 to 10 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Pmid(String);

impl Pmid {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FlowError::invalid("PMID is required"));
        }
        if trimmed.len() > 10 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FlowError::invalid(format!(
                "'{}' is not a valid PubMed ID",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Language names and the codes the translation script accepts.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("French", "fr"),
    ("German", "de"),
    ("Spanish", "es"),
    ("Italian", "it"),
    ("Portuguese", "pt"),
    ("Russian", "ru"),
    ("Chinese", "zh"),
    ("Japanese", "ja"),
    ("Korean", "ko"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetLanguage(&'static str);

impl TargetLanguage {
    /// Accepts a language code (`fr`) or name (`French`), case-insensitively.
    pub fn parse(raw: &str) -> Result<Self> {
        let wanted = raw.trim();
        if wanted.is_empty() {
            return Err(FlowError::invalid("No target language specified"));
        }
        SUPPORTED_LANGUAGES
            .iter()
            .find(|(name, code)| {
                code.eq_ignore_ascii_case(wanted) || name.eq_ignore_ascii_case(wanted)
            })
            .map(|(_, code)| TargetLanguage(code))
            .ok_or_else(|| {
                let names: Vec<&str> = SUPPORTED_LANGUAGES.iter().map(|(name, _)| *name).collect();
                FlowError::invalid(format!(
                    "Unsupported target language '{}'. Supported languages: {}",
                    wanted,
                    names.join(", ")
                ))
            })
    }

    pub fn code(&self) -> &'static str {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum TranslateSource {
    Text(String),
    Upload(Upload),
}

/// A request intent that passed validation. Only commands are routed, so no
/// process is ever spawned for an invalid request.
#[derive(Debug, Clone)]
pub enum Command {
    Search { query: String },
    AdvancedSearch { query: String },
    Details { pmid: Pmid },
    Translate {
        source: TranslateSource,
        language: TargetLanguage,
    },
    Download { pmid: Pmid },
    Resolve { query: String },
}

impl Command {
    pub fn from_intent(intent: RequestIntent) -> Result<Self> {
        let RequestIntent { feature, params } = intent;
        match feature {
            Feature::Search => Ok(Command::Search {
                query: search_query(&params)?,
            }),
            Feature::AdvancedSearch => Ok(Command::AdvancedSearch {
                query: search_query(&params)?,
            }),
            Feature::Details => Ok(Command::Details {
                pmid: required_pmid(&params)?,
            }),
            Feature::Download => Ok(Command::Download {
                pmid: required_pmid(&params)?,
            }),
            Feature::Resolve => {
                let query = non_empty(&params.query)
                    .ok_or_else(|| FlowError::invalid("Query is required"))?;
                Ok(Command::Resolve {
                    query: query.to_string(),
                })
            }
            Feature::Translate => translate_command(params),
        }
    }

    pub fn feature(&self) -> Feature {
        match self {
            Command::Search { .. } => Feature::Search,
            Command::AdvancedSearch { .. } => Feature::AdvancedSearch,
            Command::Details { .. } => Feature::Details,
            Command::Translate { .. } => Feature::Translate,
            Command::Download { .. } => Feature::Download,
            Command::Resolve { .. } => Feature::Resolve,
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required_pmid(params: &IntentParams) -> Result<Pmid> {
    let raw = non_empty(&params.pmid).ok_or_else(|| FlowError::invalid("PMID is required"))?;
    Pmid::parse(raw)
}

/// A raw query wins; otherwise the structured fields are joined with AND
/// using PubMed field tags.
fn search_query(params: &IntentParams) -> Result<String> {
    if let Some(query) = non_empty(&params.query) {
        return Ok(query.to_string());
    }

    let terms: Vec<String> = [
        (non_empty(&params.journal), Some("Journal")),
        (non_empty(&params.author), Some("Author")),
        (non_empty(&params.year), Some("Year")),
        (non_empty(&params.keyword), None),
    ]
    .into_iter()
    .filter_map(|(value, tag)| {
        value.map(|v| match tag {
            Some(tag) => format!("{}[{}]", v, tag),
            None => v.to_string(),
        })
    })
    .collect();

    if terms.is_empty() {
        return Err(FlowError::invalid(
            "Query is required: provide a query or at least one of journal, author, year, keyword",
        ));
    }
    Ok(terms.join(" AND "))
}

fn translate_command(params: IntentParams) -> Result<Command> {
    let language = TargetLanguage::parse(params.target_language.as_deref().unwrap_or_default())?;
    let text = non_empty(&params.text).map(str::to_string);

    let source = match (params.upload, text) {
        (Some(_), Some(_)) => {
            return Err(FlowError::invalid(
                "Provide either text or a file to translate, not both",
            ));
        }
        (Some(upload), None) => {
            if upload.bytes.is_empty() {
                return Err(FlowError::invalid("Uploaded file is empty"));
            }
            TranslateSource::Upload(upload)
        }
        (None, Some(text)) => TranslateSource::Text(text),
        (None, None) => {
            return Err(FlowError::invalid(
                "Please either enter text or upload a file to translate",
            ));
        }
    };

    Ok(Command::Translate { source, language })
}
