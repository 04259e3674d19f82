//! Error types.
//!
//! Fetch failures are converted into view state at the point of the request;
//! nothing here is meant to bubble up to a global handler.

use std::path::PathBuf;

use thiserror::Error;

/// A document source request that did not produce a result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to document service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("document service answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response from document service: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid front matter in {path}: {source}")]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },
}

/// Invalid or incomplete source configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no document source configured; pass --dir or --api-url")]
    MissingSource,

    #[error("--dir and --api-url are mutually exclusive")]
    ConflictingSources,

    #[error("--api-url requires --api-key (or DOCVIEW_API_KEY)")]
    MissingApiKey,

    #[error("invalid --api-url {url:?}: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("document directory {0} does not exist")]
    MissingDirectory(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_message() {
        let err = FetchError::Status {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(
            err.to_string(),
            "document service answered 401: Invalid API key"
        );
    }

    #[test]
    fn config_error_messages_name_the_flag() {
        assert!(ConfigError::MissingApiKey.to_string().contains("--api-key"));
        assert!(ConfigError::MissingSource.to_string().contains("--dir"));
    }
}
