use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("description is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("unsupported OpenAPI version: {0}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[error("invalid plan pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("environment variable {0} must be set to a GitHub token")]
    MissingToken(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("unexpected status code {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("failed to parse {file}: {source}")]
    Description { file: String, source: ParseError },

    #[error("download task failed: {0}")]
    Join(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("method {method:?} has an operation that can not be canonicalized to any defined name: {operation}")]
    Undefined { method: String, operation: String },

    #[error(
        "method {method:?} has an operation that can be canonicalized to multiple defined names:\n  operation: {operation}\n  matches:{}",
        format_candidates(.candidates)
    )]
    Ambiguous {
        method: String,
        operation: String,
        candidates: Vec<String>,
    },
}

fn format_candidates(candidates: &[String]) -> String {
    candidates.iter().map(|c| format!("\n    {c}")).collect()
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse metadata: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{message} at line {line}")]
    Syntax { line: usize, message: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("{path}: {source}")]
    Source { path: PathBuf, source: SourceError },

    #[error("{path}: {source}")]
    Resolve { path: PathBuf, source: ResolveError },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to update {} file(s):\n{}", .0.len(), format_failures(.0))]
    Batch(Vec<AnnotateError>),
}

fn format_failures(failures: &[AnnotateError]) -> String {
    failures
        .iter()
        .map(|f| format!("  {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}
