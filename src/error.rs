//! Error taxonomy for the claiming core.
//!
//! Field-level failures (`MissingField`, `Timing`) degrade to "no match" in
//! the rule evaluator; everything else is surfaced to the command layer.
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by case lookup, rule loading, log parsing and claiming.
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// A rule referenced a field the case does not carry (or cannot derive).
    #[error("field {field:?} is not available on case")]
    MissingField { field: String },

    /// A knowledge-base node is neither a field match nor an AND/OR list.
    #[error("rule {node} not formatted correctly")]
    MalformedRule { node: String },

    /// Start/end scans over captured output crossed each other.
    #[error("timing extraction failed: {reason}")]
    Timing { reason: String },

    /// The claim endpoint rejected or failed the submission.
    #[error("failed to claim {target}: {detail}")]
    ClaimSubmission { target: String, detail: String },

    /// The production log could not be read from disk.
    #[error("failed to read log {path}: {source}")]
    LogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An earlier attempt to fetch or read the log failed; it is not retried.
    #[error("log {path} unavailable after earlier failure: {detail}")]
    LogUnavailable { path: PathBuf, detail: String },

    /// Transport-level failure talking to the server.
    #[error("request to {url} failed: {detail}")]
    Http { url: String, detail: String },

    /// The server answered with a status code the caller did not expect.
    #[error("failed to get {url} with {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("cache file {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A build artifact could not be fetched or unpacked.
    #[error("artifact {url}: {detail}")]
    Artifact { url: String, detail: String },

    #[error("invalid configuration: {detail}")]
    Config { detail: String },
}

impl ClaimsError {
    pub fn missing_field(field: &str) -> Self {
        ClaimsError::MissingField {
            field: field.to_string(),
        }
    }

    /// Field-level failures that the rule evaluator turns into an
    /// indeterminate outcome instead of aborting the run.
    pub fn is_field_level(&self) -> bool {
        matches!(
            self,
            ClaimsError::MissingField { .. } | ClaimsError::Timing { .. }
        )
    }
}
