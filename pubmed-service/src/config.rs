use pubmed_flow::{
    ArtifactCache, FeatureRouter, IntentRunner, ProcessInvoker, ScratchArea, ScriptLayout,
    StderrMode, StderrPolicy, invoker::DEFAULT_INFORMATIONAL_PATTERN,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// URL prefix materialized PDFs are served under.
pub const DOWNLOAD_ROUTE: &str = "/download";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to determine the project root: {0}")]
    ProjectRoot(#[from] std::io::Error),
    #[error("PUBMED_STDERR_PATTERN is not a valid regex: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub layout: ScriptLayout,
    pub download_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub api_token: Option<String>,
    pub request_timeout: Option<Duration>,
    pub max_upload_bytes: usize,
    pub stderr_pattern: String,
    pub stderr_mode: StderrMode,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let project_root = match var("PUBMED_PROJECT_ROOT") {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir()?,
        };

        let mut layout = ScriptLayout::new(&project_root);
        if let Some(python) = var("PUBMED_PYTHON") {
            layout.python = python;
        }
        if let Some(script) = var("PUBMED_SEARCH_SCRIPT") {
            layout.search_script = script.into();
        }
        if let Some(script) = var("PUBMED_DETAILS_SCRIPT") {
            layout.details_script = script.into();
        }
        if let Some(script) = var("PUBMED_TRANSLATE_SCRIPT") {
            layout.translate_script = script.into();
        }
        if let Some(script) = var("PUBMED_DOWNLOAD_SCRIPT") {
            layout.download_script = script.into();
        }

        let port = match var("PORT") {
            Some(raw) => parse(&raw, "PORT", "a port number")?,
            None => DEFAULT_PORT,
        };

        let request_timeout = match var("PUBMED_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = parse(&raw, "PUBMED_REQUEST_TIMEOUT_SECS", "a number of seconds")?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let max_upload_bytes = match var("PUBMED_MAX_UPLOAD_BYTES") {
            Some(raw) => parse(&raw, "PUBMED_MAX_UPLOAD_BYTES", "a byte count")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let stderr_mode = match var("PUBMED_STDERR_MODE").as_deref().map(str::trim) {
            None | Some("lines") => StderrMode::EveryLine,
            Some("any") => StderrMode::AnyMatch,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "PUBMED_STDERR_MODE",
                    value: other.to_string(),
                    expected: "'lines' or 'any'",
                });
            }
        };

        Ok(Self {
            port,
            download_dir: var("PUBMED_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| project_root.join("public").join("download")),
            upload_dir: var("PUBMED_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| project_root.join("uploads")),
            layout,
            api_token: var("PUBMED_API_TOKEN"),
            request_timeout,
            max_upload_bytes,
            stderr_pattern: var("PUBMED_STDERR_PATTERN")
                .unwrap_or_else(|| DEFAULT_INFORMATIONAL_PATTERN.to_string()),
            stderr_mode,
        })
    }

    pub fn stderr_policy(&self) -> Result<StderrPolicy, ConfigError> {
        Ok(StderrPolicy::new(&self.stderr_pattern, self.stderr_mode)?)
    }

    pub fn build_runner(
        &self,
        invoker: Arc<dyn ProcessInvoker>,
    ) -> Result<IntentRunner, ConfigError> {
        Ok(IntentRunner::new(
            FeatureRouter::new(self.layout.clone()),
            invoker,
            Arc::new(ArtifactCache::new(&self.download_dir, DOWNLOAD_ROUTE)),
            ScratchArea::new(&self.upload_dir),
        )
        .with_stderr_policy(self.stderr_policy()?)
        .with_timeout(self.request_timeout))
    }
}

fn parse<T: std::str::FromStr>(
    raw: &str,
    name: &'static str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        expected,
    })
}
