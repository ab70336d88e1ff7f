use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MirrorError {
    #[error("MGnify request failed: {0}")]
    Http(String),

    #[error("MGnify returned status {status} for {url}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },

    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("{context} is missing field `{field}`")]
    MissingField { context: String, field: String },

    #[error("{context} `{name}` is not a plain file name")]
    #[diagnostic(help("ids from the API must not contain path separators or `..`"))]
    UnsafeName { context: String, name: String },

    #[error("API root does not advertise the `{0}` endpoint")]
    #[diagnostic(help("check API_URL points at the MGnify v1 API root"))]
    MissingEndpoint(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid download pattern: {0}")]
    InvalidPattern(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl MirrorError {
    pub(crate) fn missing(context: impl Into<String>, field: impl Into<String>) -> Self {
        MirrorError::MissingField {
            context: context.into(),
            field: field.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            MirrorError::Http(_) | MirrorError::Status { .. } | MirrorError::Decode { .. }
        )
    }
}
