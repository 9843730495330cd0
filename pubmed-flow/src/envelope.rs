use serde::Serialize;

use crate::cache::Artifact;
use crate::error::{FlowError, Result};
use crate::parser::ParsedResult;

pub const RESOLVED_MESSAGE: &str = "PMID found, initiating download...";
pub const UNRESOLVED_MESSAGE: &str = "No PMID found in search results";
pub const CACHED_MESSAGE: &str = "PDF already downloaded";
pub const DOWNLOADED_MESSAGE: &str = "PDF download completed";

/// What a successful run produced, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Parsed(ParsedResult),
    /// Result of the `resolve` flow.
    Resolved(ParsedResult),
    Artifact { artifact: Artifact, cached: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Identifiers(Vec<String>),
    Text(String),
}

/// The JSON body returned for every request. Exactly one of `result` and
/// `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub no_results: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(result: Payload) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            no_results: false,
            pmid: None,
            download_path: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
            no_results: false,
            pmid: None,
            download_path: None,
        }
    }

    fn with_no_results(mut self, no_results: bool) -> Self {
        self.no_results = no_results;
        self
    }
}

/// An envelope paired with its HTTP-equivalent status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub status: u16,
    pub envelope: ResponseEnvelope,
}

impl Normalized {
    pub fn is_success(&self) -> bool {
        self.envelope.success
    }
}

pub fn normalize(result: Result<Outcome>) -> Normalized {
    match result {
        Ok(outcome) => Normalized {
            status: 200,
            envelope: success_envelope(outcome),
        },
        Err(error) => normalize_error(&error),
    }
}

pub fn normalize_error(error: &FlowError) -> Normalized {
    Normalized {
        status: error.status_code(),
        envelope: ResponseEnvelope::failure(error.public_message()),
    }
}

fn success_envelope(outcome: Outcome) -> ResponseEnvelope {
    match outcome {
        Outcome::Parsed(parsed) => parsed_envelope(parsed),
        Outcome::Resolved(ParsedResult::Identifier(pmid)) => {
            let mut envelope = ResponseEnvelope::ok(Payload::Text(RESOLVED_MESSAGE.to_string()));
            envelope.pmid = Some(pmid);
            envelope
        }
        Outcome::Resolved(_) => {
            ResponseEnvelope::ok(Payload::Text(UNRESOLVED_MESSAGE.to_string())).with_no_results(true)
        }
        Outcome::Artifact { artifact, cached } => {
            let message = if cached {
                CACHED_MESSAGE
            } else {
                DOWNLOADED_MESSAGE
            };
            let mut envelope = ResponseEnvelope::ok(Payload::Text(message.to_string()));
            envelope.pmid = Some(artifact.pmid.to_string());
            envelope.download_path = Some(artifact.download_path);
            envelope
        }
    }
}

fn parsed_envelope(parsed: ParsedResult) -> ResponseEnvelope {
    let no_results = parsed.is_empty();
    let payload = match parsed {
        ParsedResult::Identifiers(ids) => Payload::Identifiers(ids),
        ParsedResult::Identifier(id) => Payload::Identifiers(vec![id]),
        ParsedResult::Text { body, .. } => Payload::Text(body),
        ParsedResult::NoneFound => Payload::Identifiers(Vec::new()),
    };
    ResponseEnvelope::ok(payload).with_no_results(no_results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactCache;
    use crate::intent::{Feature, Pmid};
    use serde_json::json;

    #[test]
    fn test_identifier_list_envelope() {
        let normalized = normalize(Ok(Outcome::Parsed(ParsedResult::Identifiers(vec![
            "1".into(),
            "2".into(),
        ]))));
        assert_eq!(normalized.status, 200);
        assert_eq!(
            serde_json::to_value(&normalized.envelope).unwrap(),
            json!({ "success": true, "result": ["1", "2"] })
        );
    }

    #[test]
    fn test_empty_results_are_successful() {
        let normalized = normalize(Ok(Outcome::Parsed(ParsedResult::Identifiers(Vec::new()))));
        assert_eq!(
            serde_json::to_value(&normalized.envelope).unwrap(),
            json!({ "success": true, "result": [], "noResults": true })
        );

        let normalized = normalize(Ok(Outcome::Parsed(ParsedResult::Text {
            body: "No results found\n".into(),
            no_results: true,
        })));
        assert!(normalized.is_success());
        assert!(normalized.envelope.no_results);
        assert_eq!(
            normalized.envelope.result,
            Some(Payload::Text("No results found\n".into()))
        );
    }

    #[test]
    fn test_resolve_envelopes() {
        let found = normalize(Ok(Outcome::Resolved(ParsedResult::Identifier(
            "39979984".into(),
        ))));
        assert_eq!(
            serde_json::to_value(&found.envelope).unwrap(),
            json!({ "success": true, "result": RESOLVED_MESSAGE, "pmid": "39979984" })
        );

        let missing = normalize(Ok(Outcome::Resolved(ParsedResult::NoneFound)));
        assert!(missing.is_success());
        assert!(missing.envelope.no_results);
        assert!(missing.envelope.pmid.is_none());
    }

    #[test]
    fn test_artifact_envelope_same_path_cached_or_fresh() {
        let cache = ArtifactCache::new("/var/pubmed/download", "/download");
        let artifact = cache.artifact(&Pmid::parse("42").unwrap());

        let cached = normalize(Ok(Outcome::Artifact {
            artifact: artifact.clone(),
            cached: true,
        }));
        let fresh = normalize(Ok(Outcome::Artifact {
            artifact,
            cached: false,
        }));

        assert_eq!(
            cached.envelope.download_path.as_deref(),
            Some("/download/42.pdf")
        );
        assert_eq!(cached.envelope.download_path, fresh.envelope.download_path);
        assert_eq!(cached.envelope.pmid.as_deref(), Some("42"));
    }

    #[test]
    fn test_error_envelopes_hide_diagnostics() {
        let invalid = normalize(Err(FlowError::invalid("PMID is required")));
        assert_eq!(invalid.status, 400);
        assert_eq!(
            serde_json::to_value(&invalid.envelope).unwrap(),
            json!({ "success": false, "error": "PMID is required" })
        );

        let failed = normalize(Err(FlowError::execution(
            Feature::Details,
            "Traceback: secret path /home/x",
        )));
        assert_eq!(failed.status, 500);
        let message = failed.envelope.error.unwrap();
        assert_eq!(message, "Failed to fetch article details");
        assert!(failed.envelope.result.is_none());

        let storage = normalize(Err(FlowError::storage(
            "/tmp/x",
            std::io::Error::other("disk full"),
        )));
        assert_eq!(storage.status, 500);
        assert!(!storage.envelope.error.unwrap().contains("disk full"));
    }
}
