//! Directory-backed document source.
//!
//! Every `*.md` / `*.markdown` file directly inside the root is one document.
//! An optional YAML front matter block (`---` … `---`) supplies metadata:
//!
//! ```yaml
//! ---
//! title: Filing guide
//! slug: filing-guide
//! summary: How to file
//! status: published
//! published_at: 2024-05-01
//! updated_at: 2024-05-03
//! ---
//! ```
//!
//! Missing fields default to the file stem (`slug`, `title`), `published`
//! (`status`) and the file's modification time (`updated_at`). Only
//! published documents are visible.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{Document, DocumentSummary};
use crate::error::FetchError;

/// Front matter fields recognised at the top of a document file.
#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    title: Option<String>,
    slug: Option<String>,
    summary: Option<String>,
    status: Option<String>,
    published_at: Option<String>,
    updated_at: Option<String>,
}

/// One document file, fully loaded.
#[derive(Debug)]
struct Entry {
    summary: DocumentSummary,
    document: Document,
    published: bool,
}

pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn published_documents(&self) -> Result<Vec<DocumentSummary>, FetchError> {
        let mut docs: Vec<DocumentSummary> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|e| e.published)
            .map(|e| e.summary)
            .collect();
        docs.sort_by(newest_first);
        Ok(docs)
    }

    pub async fn document_by_slug(&self, slug: &str) -> Result<Option<Document>, FetchError> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|e| e.published && e.summary.slug == slug)
            .map(|e| e.document))
    }

    /// Load every markdown file under the root.
    ///
    /// A file that cannot be read or has malformed front matter is logged
    /// and skipped; only failing to list the directory is an error.
    async fn load_all(&self) -> Result<Vec<Entry>, FetchError> {
        let io_err = |source| FetchError::Io {
            path: self.root.clone(),
            source,
        };
        let mut dir = tokio::fs::read_dir(&self.root).await.map_err(io_err)?;

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(io_err)? {
            let path = item.path();
            if !is_markdown(&path) {
                continue;
            }
            match load_entry(&path).await {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("[dir] skip path={} error={e}", path.display()),
            }
        }
        Ok(entries)
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
        .unwrap_or(false)
}

async fn load_entry(path: &Path) -> Result<Entry, FetchError> {
    let io_err = |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    };
    let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
    if !metadata.is_file() {
        return Err(io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    let source = tokio::fs::read_to_string(path).await.map_err(io_err)?;

    let (front, body) = split_front_matter(&source);
    let meta: FrontMatter = match front {
        Some(yaml) if !yaml.trim().is_empty() => {
            serde_yml::from_str(yaml).map_err(|source| FetchError::FrontMatter {
                path: path.to_path_buf(),
                source,
            })?
        }
        _ => FrontMatter::default(),
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_owned();
    let slug = meta
        .slug
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| stem.clone());
    let title = meta.title.or_else(|| Some(stem.clone()));
    let updated_at = meta
        .updated_at
        .or_else(|| metadata.modified().ok().map(httpdate::fmt_http_date));
    let published = meta
        .status
        .as_deref()
        .map(|s| s.eq_ignore_ascii_case("published"))
        .unwrap_or(true);

    Ok(Entry {
        summary: DocumentSummary {
            id: stem,
            title: title.clone(),
            slug,
            summary: meta.summary.clone(),
            published_at: meta.published_at.clone(),
            updated_at: updated_at.clone(),
        },
        document: Document {
            title,
            summary: meta.summary,
            content: body.to_owned(),
            published_at: meta.published_at,
            updated_at,
        },
        published,
    })
}

/// Split `source` into `(front_matter, body)`.
///
/// Front matter must start on the first line with `---` and end at the next
/// line consisting of `---`. Without a closing fence the whole source is body.
fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let rest = match source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, source),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body);
        }
        offset += line.len();
    }
    (None, source)
}

/// Newest `published_at` first; undated documents last; then by slug.
fn newest_first(a: &DocumentSummary, b: &DocumentSummary) -> Ordering {
    match (&a.published_at, &b.published_at) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.slug.cmp(&b.slug))
}
