//! Hosted document table accessed through its PostgREST interface.
//!
//! Supabase exposes tables at `{project}/rest/v1/{table}`; filters are query
//! parameters of the form `column=op.value`. Both requests send the API key as
//! `apikey` and as a bearer token.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use super::{Document, DocumentSummary};
use crate::error::FetchError;

const TABLE_PATH: &str = "rest/v1/docs";
const LIST_COLUMNS: &str = "id,title,slug,summary,published_at,updated_at";
const DETAIL_COLUMNS: &str = "title,summary,content,published_at,updated_at";

/// Longest error body echoed into a [`FetchError::Status`] message.
const MAX_ERROR_BODY: usize = 200;

pub struct RestSource {
    client: Client,
    table_url: Url,
    api_key: String,
}

impl RestSource {
    pub fn new(base_url: &Url, api_key: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            table_url: table_url(base_url),
            api_key: api_key.to_owned(),
        })
    }

    pub fn table_url(&self) -> &Url {
        &self.table_url
    }

    pub async fn published_documents(&self) -> Result<Vec<DocumentSummary>, FetchError> {
        self.get_rows(&list_query()).await
    }

    pub async fn document_by_slug(&self, slug: &str) -> Result<Option<Document>, FetchError> {
        let rows: Vec<Document> = self.get_rows(&detail_query(slug)).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        query: &[(&'static str, String)],
    ) -> Result<Vec<T>, FetchError> {
        let response = self
            .client
            .get(self.table_url.clone())
            .query(query)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        log::debug!("[rest] status={} bytes={}", status.as_u16(), body.len());

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        decode_rows(&body)
    }
}

/// `{base}/rest/v1/docs`, keeping any path prefix on `base`.
fn table_url(base: &Url) -> Url {
    let mut url = base.clone();
    let prefix = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{prefix}/{TABLE_PATH}"));
    url.set_query(None);
    url
}

fn list_query() -> Vec<(&'static str, String)> {
    vec![
        ("select", LIST_COLUMNS.to_owned()),
        ("status", "eq.published".to_owned()),
        ("order", "published_at.desc".to_owned()),
    ]
}

fn detail_query(slug: &str) -> Vec<(&'static str, String)> {
    vec![
        ("select", DETAIL_COLUMNS.to_owned()),
        ("slug", format!("eq.{slug}")),
        ("status", "eq.published".to_owned()),
        ("limit", "1".to_owned()),
    ]
}

fn decode_rows<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, FetchError> {
    Ok(serde_json::from_str(body)?)
}

/// Pull the human-readable message out of a PostgREST error body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "msg", "error"] {
            if let Some(msg) = value.get(key).and_then(|m| m.as_str()) {
                return msg.to_owned();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_owned();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
