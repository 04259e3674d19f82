//! Document sources.
//!
//! The viewer only needs two capabilities from its backend: list published
//! documents, and fetch one document by slug. [`DocumentSource`] dispatches
//! them to either the hosted REST table ([`rest::RestSource`]) or a local
//! directory of markdown files ([`dir::DirSource`]).

pub mod dir;
pub mod rest;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::SourceConfig;
use crate::error::FetchError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One row of the document listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub slug: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl DocumentSummary {
    /// Title for display, falling back to the slug.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.slug)
    }
}

/// A full document as shown by the detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Raw markdown text.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

/// Outcome of a listing fetch, as a view displays it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingState {
    Ready(Vec<DocumentSummary>),
    Failed(String),
}

impl From<Result<Vec<DocumentSummary>, FetchError>> for ListingState {
    fn from(result: Result<Vec<DocumentSummary>, FetchError>) -> Self {
        match result {
            Ok(docs) => ListingState::Ready(docs),
            Err(e) => ListingState::Failed(e.to_string()),
        }
    }
}

/// Outcome of a document fetch, as a view displays it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    Ready(Document),
    /// The slug did not resolve to a published document.
    NotFound,
    Failed(String),
}

impl From<Result<Option<Document>, FetchError>> for DocumentState {
    fn from(result: Result<Option<Document>, FetchError>) -> Self {
        match result {
            Ok(Some(doc)) => DocumentState::Ready(doc),
            Ok(None) => DocumentState::NotFound,
            Err(e) => DocumentState::Failed(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// The configured backend.
pub enum DocumentSource {
    Rest(rest::RestSource),
    Directory(dir::DirSource),
}

impl DocumentSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self, FetchError> {
        Ok(match config {
            SourceConfig::Directory { root } => {
                DocumentSource::Directory(dir::DirSource::new(root.clone()))
            }
            SourceConfig::Rest {
                base_url,
                api_key,
                timeout,
            } => DocumentSource::Rest(rest::RestSource::new(base_url, api_key, *timeout)?),
        })
    }

    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match self {
            DocumentSource::Rest(s) => format!("rest url={}", s.table_url()),
            DocumentSource::Directory(s) => format!("dir path={}", s.root().display()),
        }
    }

    /// Published documents, newest first.
    pub async fn published_documents(&self) -> Result<Vec<DocumentSummary>, FetchError> {
        let result = match self {
            DocumentSource::Rest(s) => s.published_documents().await,
            DocumentSource::Directory(s) => s.published_documents().await,
        };
        match &result {
            Ok(docs) => log::info!("[fetch] op=list count={}", docs.len()),
            Err(e) => log::warn!("[fetch] op=list error={e}"),
        }
        result
    }

    /// The published document with `slug`, or `None` when there is none.
    pub async fn document_by_slug(&self, slug: &str) -> Result<Option<Document>, FetchError> {
        let result = match self {
            DocumentSource::Rest(s) => s.document_by_slug(slug).await,
            DocumentSource::Directory(s) => s.document_by_slug(slug).await,
        };
        match &result {
            Ok(Some(doc)) => log::info!("[fetch] op=doc slug={slug} bytes={}", doc.content.len()),
            Ok(None) => log::info!("[fetch] op=doc slug={slug} result=not-found"),
            Err(e) => log::warn!("[fetch] op=doc slug={slug} error={e}"),
        }
        result
    }
}
