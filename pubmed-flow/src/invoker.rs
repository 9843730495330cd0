use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::invocation::InvocationSpec;

/// Everything an external process produced. Both streams are always complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an invocation to completion. No timeout is applied here; callers that
/// need one drop the future, which kills the child.
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    async fn invoke(&self, spec: &InvocationSpec) -> std::io::Result<ProcessResult>;
}

/// Spawns real child processes through tokio.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessInvoker;

impl TokioProcessInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessInvoker for TokioProcessInvoker {
    async fn invoke(&self, spec: &InvocationSpec) -> std::io::Result<ProcessResult> {
        debug!("Spawning {} in {}", spec, spec.working_dir().display());

        let output = Command::new(spec.program())
            .args(spec.arguments())
            .current_dir(spec.working_dir())
            .envs(spec.env_overlay().iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ProcessResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

pub type Responder =
    Arc<dyn Fn(&InvocationSpec) -> std::io::Result<ProcessResult> + Send + Sync>;

/// In-memory invoker that answers from a closure and records every call.
/// Used wherever a real script must not run.
pub struct ScriptedInvoker {
    responder: Responder,
    delay: Option<Duration>,
    calls: Mutex<Vec<InvocationSpec>>,
}

impl ScriptedInvoker {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&InvocationSpec) -> std::io::Result<ProcessResult> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `result`.
    pub fn replying(result: ProcessResult) -> Self {
        Self::new(move |_| Ok(result.clone()))
    }

    /// Simulates a slow process; the delay runs before the responder.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<InvocationSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ProcessInvoker for ScriptedInvoker {
    async fn invoke(&self, spec: &InvocationSpec) -> std::io::Result<ProcessResult> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(spec.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(spec)
    }
}

/// How much of stderr has to look informational before it is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrMode {
    /// Every non-blank line must match the informational pattern.
    EveryLine,
    /// A single match anywhere makes the whole stream informational.
    AnyMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    /// stderr carried only log output.
    Informational,
    Fatal(String),
}

/// Decides whether a finished process failed. Non-zero exit is always fatal;
/// stderr is fatal unless it matches the informational pattern.
#[derive(Debug, Clone)]
pub struct StderrPolicy {
    informational: Regex,
    mode: StderrMode,
}

pub const DEFAULT_INFORMATIONAL_PATTERN: &str = r"\b(DEBUG|INFO|WARNING)\b";

impl StderrPolicy {
    pub fn new(pattern: &str, mode: StderrMode) -> Result<Self, regex::Error> {
        Ok(Self {
            informational: Regex::new(pattern)?,
            mode,
        })
    }

    pub fn mode(&self) -> StderrMode {
        self.mode
    }

    pub fn classify(&self, result: &ProcessResult) -> Verdict {
        if !result.success() {
            let status = match result.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            };
            return Verdict::Fatal(format!("{}; stderr: {}", status, result.stderr.trim()));
        }

        let stderr = result.stderr.trim();
        if stderr.is_empty() {
            return Verdict::Clean;
        }

        let informational = match self.mode {
            StderrMode::AnyMatch => self.informational.is_match(stderr),
            StderrMode::EveryLine => stderr
                .lines()
                .filter(|line| !line.trim().is_empty())
                .all(|line| self.informational.is_match(line)),
        };

        if informational {
            Verdict::Informational
        } else {
            Verdict::Fatal(format!("stderr: {}", stderr))
        }
    }
}

impl Default for StderrPolicy {
    fn default() -> Self {
        Self {
            informational: Regex::new(DEFAULT_INFORMATIONAL_PATTERN)
                .expect("default informational pattern is valid"),
            mode: StderrMode::EveryLine,
        }
    }
}
