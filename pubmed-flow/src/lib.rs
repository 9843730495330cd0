pub mod cache;
pub mod envelope;
pub mod error;
pub mod intent;
pub mod invocation;
pub mod invoker;
pub mod parser;
pub mod router;
pub mod runner;
pub mod scratch;

// Re-export commonly used types
pub use cache::{Artifact, ArtifactCache};
pub use envelope::{Normalized, Outcome, Payload, ResponseEnvelope, normalize};
pub use error::{ErrorKind, FlowError, Result};
pub use intent::{Command, Feature, IntentParams, Pmid, RequestIntent, Upload};
pub use invocation::InvocationSpec;
pub use invoker::{
    ProcessInvoker, ProcessResult, ScriptedInvoker, StderrMode, StderrPolicy, TokioProcessInvoker,
};
pub use parser::{OutputParser, ParsedResult};
pub use router::{FeatureRouter, Route, ScriptLayout};
pub use runner::IntentRunner;
pub use scratch::ScratchArea;
