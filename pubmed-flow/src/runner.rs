//! IntentRunner drives one request through validate → route → invoke → parse
//! → normalize.
//!
//! Create one runner at startup and share it across requests behind an `Arc`.
//! The only state it holds across requests is the artifact lock table.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::{
    cache::ArtifactCache,
    envelope::{Normalized, Outcome, normalize},
    error::{ErrorKind, FlowError, Result},
    intent::{Command, Feature, Pmid, RequestIntent, TranslateSource},
    invoker::{ProcessInvoker, ProcessResult, StderrPolicy, Verdict},
    parser::ParsedResult,
    router::{FeatureRouter, Route},
    scratch::ScratchArea,
};

/// File name used when inline text is staged for translation.
pub const INLINE_TEXT_FILE: &str = "input.txt";

pub struct IntentRunner {
    router: FeatureRouter,
    invoker: Arc<dyn ProcessInvoker>,
    policy: StderrPolicy,
    cache: Arc<ArtifactCache>,
    scratch: ScratchArea,
    timeout: Option<Duration>,
}

impl IntentRunner {
    pub fn new(
        router: FeatureRouter,
        invoker: Arc<dyn ProcessInvoker>,
        cache: Arc<ArtifactCache>,
        scratch: ScratchArea,
    ) -> Self {
        Self {
            router,
            invoker,
            policy: StderrPolicy::default(),
            cache,
            scratch,
            timeout: None,
        }
    }

    /// Bounds a whole request. The pending invocation is dropped on expiry,
    /// which kills the child process.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stderr_policy(mut self, policy: StderrPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Executes the intent and converts any outcome into an envelope.
    pub async fn run(&self, intent: RequestIntent) -> Normalized {
        let feature = intent.feature;
        info!("Handling {} request", feature);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.execute(intent)).await {
                Ok(result) => result,
                Err(_) => Err(FlowError::execution(
                    feature,
                    format!("request timed out after {:?}", limit),
                )),
            },
            None => self.execute(intent).await,
        };
        if let Err(e) = &result {
            match e.kind() {
                ErrorKind::InvalidRequest => warn!("Rejected {} request: {}", feature, e),
                ErrorKind::ExecutionFailed | ErrorKind::StorageFailed => {
                    error!("{} request failed: {}", feature, e)
                }
            }
        }
        normalize(result)
    }

    /// Executes the intent without normalizing. Validation happens first, so
    /// an invalid intent never reaches the invoker.
    pub async fn execute(&self, intent: RequestIntent) -> Result<Outcome> {
        let command = Command::from_intent(intent)?;

        match &command {
            Command::Download { pmid } => self.download(&command, pmid).await,
            Command::Translate { source, .. } => self.translate(&command, source).await,
            Command::Resolve { .. } => Ok(Outcome::Resolved(self.invoke(&command, None).await?)),
            Command::Search { .. } | Command::AdvancedSearch { .. } | Command::Details { .. } => {
                Ok(Outcome::Parsed(self.invoke(&command, None).await?))
            }
        }
    }

    /// Routes and runs the command without judging its output.
    async fn spawn(
        &self,
        command: &Command,
        input_file: Option<&Path>,
    ) -> Result<(Route, ProcessResult)> {
        let route = self.router.route(command, input_file)?;
        info!("Executing command: {}", route.spec);

        let output = self.invoker.invoke(&route.spec).await.map_err(|e| {
            FlowError::execution(
                command.feature(),
                format!("failed to spawn {}: {}", route.spec.program(), e),
            )
        })?;
        Ok((route, output))
    }

    async fn invoke(&self, command: &Command, input_file: Option<&Path>) -> Result<ParsedResult> {
        let feature = command.feature();
        let (route, output) = self.spawn(command, input_file).await?;

        match self.policy.classify(&output) {
            Verdict::Fatal(diagnostic) => {
                debug!("{} stdout before failure: {}", feature, output.stdout);
                return Err(FlowError::execution(feature, diagnostic));
            }
            Verdict::Informational => {
                debug!("{} informational stderr: {}", feature, output.stderr.trim())
            }
            Verdict::Clean => {}
        }

        let parsed = route.parser.parse(&output);
        if parsed.is_empty() {
            info!("{} returned no results", feature);
        }
        Ok(parsed)
    }

    async fn translate(&self, command: &Command, source: &TranslateSource) -> Result<Outcome> {
        let staged = match source {
            TranslateSource::Upload(upload) => {
                self.scratch.write(&upload.file_name, &upload.bytes).await?
            }
            TranslateSource::Text(text) => {
                self.scratch.write(INLINE_TEXT_FILE, text.as_bytes()).await?
            }
        };

        let result = self.invoke(command, Some(staged.path())).await;
        let released = staged.release().await;

        match (result, released) {
            (Ok(parsed), Ok(())) => Ok(Outcome::Parsed(parsed)),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                error!("Scratch cleanup also failed: {}", cleanup);
                Err(e)
            }
        }
    }

    async fn download(&self, command: &Command, pmid: &Pmid) -> Result<Outcome> {
        if let Some(artifact) = self.cache.lookup(pmid).await? {
            info!("PDF already exists: {}", artifact.path.display());
            return Ok(Outcome::Artifact {
                artifact,
                cached: true,
            });
        }

        let _lock = self.cache.lock(pmid).await;

        // Another request may have materialized it while we waited for the lock.
        if let Some(artifact) = self.cache.lookup(pmid).await? {
            info!("PDF for PMID {} materialized by a concurrent request", pmid);
            return Ok(Outcome::Artifact {
                artifact,
                cached: true,
            });
        }

        self.cache.ensure_dir().await?;
        info!("Starting download for PMID: {}", pmid);
        // The file on disk decides success; stray stderr only matters with a failed exit.
        let (_, output) = self.spawn(command, None).await?;
        match self.policy.classify(&output) {
            Verdict::Fatal(diagnostic) if !output.success() => {
                return Err(FlowError::execution(Feature::Download, diagnostic));
            }
            Verdict::Fatal(diagnostic) => {
                warn!("Download for PMID {} wrote to stderr: {}", pmid, diagnostic)
            }
            Verdict::Informational | Verdict::Clean => {}
        }
        debug!("Download script output: {}", output.stdout.trim());

        match self.cache.lookup(pmid).await? {
            Some(artifact) => {
                info!("PDF downloaded successfully: {}", artifact.path.display());
                Ok(Outcome::Artifact {
                    artifact,
                    cached: false,
                })
            }
            None => Err(FlowError::execution(
                Feature::Download,
                format!("PDF file for PMID {} not found after download", pmid),
            )),
        }
    }
}
