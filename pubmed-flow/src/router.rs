use std::path::{Path, PathBuf};

use crate::error::{FlowError, Result};
use crate::intent::Command;
use crate::invocation::InvocationSpec;
use crate::parser::OutputParser;

/// Where the external scripts live and how to run them.
#[derive(Debug, Clone)]
pub struct ScriptLayout {
    /// Interpreter used for every script.
    pub python: String,
    /// Working directory of every invocation; relative script paths resolve against it.
    pub project_root: PathBuf,
    pub search_script: PathBuf,
    pub details_script: PathBuf,
    pub translate_script: PathBuf,
    pub download_script: PathBuf,
}

impl ScriptLayout {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            python: "python".to_string(),
            project_root: project_root.into(),
            search_script: PathBuf::from("test/test_search_metapub.py"),
            details_script: PathBuf::from("test/test_metapub.py"),
            translate_script: PathBuf::from("test/test_translate.py"),
            download_script: PathBuf::from("test/test_download_metapub.py"),
        }
    }
}

/// The invocation to run and the parser that reads its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub spec: InvocationSpec,
    pub parser: OutputParser,
}

/// Environment overlay that marks an advanced search run.
pub const SEARCH_MODE_VAR: &str = "PUBMED_SEARCH_MODE";

#[derive(Debug, Clone)]
pub struct FeatureRouter {
    layout: ScriptLayout,
}

impl FeatureRouter {
    pub fn new(layout: ScriptLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ScriptLayout {
        &self.layout
    }

    /// Maps a validated command to exactly one invocation. `input_file` is the
    /// staged scratch file and is only consulted for translation.
    pub fn route(&self, command: &Command, input_file: Option<&Path>) -> Result<Route> {
        let route = match command {
            Command::Search { query } => Route {
                spec: self
                    .script(&self.layout.search_script)
                    .args(["--query", query.as_str()]),
                parser: OutputParser::IdentifierList,
            },
            Command::AdvancedSearch { query } => Route {
                spec: self
                    .script(&self.layout.search_script)
                    .args(["--query", query.as_str()])
                    .env(SEARCH_MODE_VAR, "advanced")
                    .env("PYTHONUNBUFFERED", "1"),
                parser: OutputParser::FreeText,
            },
            Command::Resolve { query } => Route {
                spec: self
                    .script(&self.layout.search_script)
                    .args(["--query", query.as_str(), "--return_pmid"]),
                parser: OutputParser::SingleIdentifier,
            },
            Command::Details { pmid } => Route {
                spec: self.script(&self.layout.details_script).arg(pmid.as_str()),
                parser: OutputParser::FreeText,
            },
            Command::Translate { language, .. } => {
                let input = input_file.ok_or_else(|| {
                    FlowError::invalid("Translation input must be staged before routing")
                })?;
                Route {
                    spec: self.script(&self.layout.translate_script).args([
                        "--file".to_string(),
                        input.display().to_string(),
                        "--target_lang".to_string(),
                        language.code().to_string(),
                    ]),
                    parser: OutputParser::FreeText,
                }
            }
            Command::Download { pmid } => Route {
                spec: self
                    .script(&self.layout.download_script)
                    .args(["--pmid", pmid.as_str()]),
                parser: OutputParser::FreeText,
            },
        };
        Ok(route)
    }

    fn script(&self, script: &Path) -> InvocationSpec {
        InvocationSpec::new(self.layout.python.as_str(), &self.layout.project_root)
            .arg(script.display().to_string())
    }
}
