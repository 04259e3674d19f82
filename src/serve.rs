use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::signal;
use tower_http::compression::CompressionLayer;

use crate::config::TOC_CACHE_CAPACITY;
use crate::html;
use crate::source::{DocumentSource, DocumentState, ListingState};
use crate::toc::TocCache;
use crate::web_assets;

/// Maximum number of consecutive ports to try before giving up.
const MAX_PORT_ATTEMPTS: u16 = 100;

const NOSNIFF: (header::HeaderName, HeaderValue) = (
    header::X_CONTENT_TYPE_OPTIONS,
    HeaderValue::from_static("nosniff"),
);

/// Shared application state passed to all request handlers via `Arc<AppState>`.
pub struct AppState {
    pub source: DocumentSource,
    /// Memoized TOCs keyed by document content.
    pub toc_cache: TocCache,
}

impl AppState {
    pub fn new(source: DocumentSource) -> Self {
        Self {
            source,
            toc_cache: TocCache::new(TOC_CACHE_CAPACITY),
        }
    }
}

/// Attempt to bind a TCP listener on `bind_addr` starting at `start_port`.
///
/// On `EADDRINUSE` the port is incremented by one and the attempt is retried up
/// to `MAX_PORT_ATTEMPTS` times. Any other OS error fails immediately.
pub fn bind_with_retry(bind_addr: &str, start_port: u16) -> Result<(TcpListener, u16), String> {
    let mut port = start_port;
    log::debug!("[bind] trying port={port}");
    for _ in 0..MAX_PORT_ATTEMPTS {
        let addr = format!("{bind_addr}:{port}");
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                log::debug!("[bind] success port={port}");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                let next = port.wrapping_add(1);
                log::info!("[bind] EADDRINUSE port={port}, trying {next}");
                port = next;
            }
            Err(e) => {
                return Err(format!("bind {bind_addr}:{port} failed: {e}"));
            }
        }
    }
    Err(format!(
        "exhausted {MAX_PORT_ATTEMPTS} port candidates starting at {start_port}; all ports in use"
    ))
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn html_response(status: StatusCode, page: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            NOSNIFF,
        ],
        page,
    )
        .into_response()
}

fn text_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            NOSNIFF,
        ],
        body,
    )
        .into_response()
}

fn asset_response(content_type: &'static str, body: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            NOSNIFF,
        ],
        body,
    )
        .into_response()
}

/// Return `true` when the query string contains the `raw=1` parameter.
fn is_raw_mode(query: &str) -> bool {
    query.split('&').any(|param| param == "raw=1")
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn listing_handler(State(state): State<Arc<AppState>>) -> Response {
    match ListingState::from(state.source.published_documents().await) {
        ListingState::Ready(docs) => {
            log::info!("[request] path=/ mode=listing count={}", docs.len());
            html_response(StatusCode::OK, html::build_listing_page(&docs))
        }
        ListingState::Failed(message) => {
            log::info!("[request] path=/ mode=error");
            html_response(
                StatusCode::BAD_GATEWAY,
                html::build_message_page(
                    "Documents",
                    &format!("Could not load documents: {message}"),
                    true,
                ),
            )
        }
    }
}

async fn document_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let doc = match DocumentState::from(state.source.document_by_slug(&slug).await) {
        DocumentState::Ready(doc) => doc,
        DocumentState::NotFound => {
            log::info!("[request] path=/docs/{slug} mode=not-found");
            return html_response(
                StatusCode::NOT_FOUND,
                html::build_message_page(
                    "Not found",
                    "This document has no published content.",
                    false,
                ),
            );
        }
        DocumentState::Failed(message) => {
            log::info!("[request] path=/docs/{slug} mode=error");
            return html_response(
                StatusCode::BAD_GATEWAY,
                html::build_message_page(
                    "Error",
                    &format!("Could not load this document: {message}"),
                    true,
                ),
            );
        }
    };

    if is_raw_mode(query.as_deref().unwrap_or("")) {
        log::info!("[request] path=/docs/{slug} mode=raw");
        return text_response(StatusCode::OK, doc.content);
    }

    let toc = state.toc_cache.get_or_extract(&doc.content);
    let rendered = html::render_markdown(&doc.content);
    let page = html::build_document_page(&slug, &doc, &rendered, &toc);
    log::info!(
        "[request] path=/docs/{slug} mode=rendered headings={}",
        toc.len()
    );
    html_response(StatusCode::OK, page)
}

async fn toc_handler(State(state): State<Arc<AppState>>, Path(slug): Path<String>) -> Response {
    match DocumentState::from(state.source.document_by_slug(&slug).await) {
        DocumentState::Ready(doc) => {
            let toc = state.toc_cache.get_or_extract(&doc.content);
            log::info!(
                "[request] path=/docs/{slug}/toc.json mode=toc headings={}",
                toc.len()
            );
            ([NOSNIFF], Json(&toc[..])).into_response()
        }
        DocumentState::NotFound => text_response(StatusCode::NOT_FOUND, "Not Found".to_owned()),
        DocumentState::Failed(message) => text_response(StatusCode::BAD_GATEWAY, message),
    }
}

async fn css_handler() -> Response {
    asset_response("text/css; charset=utf-8", web_assets::CSS)
}

async fn js_handler() -> Response {
    asset_response("text/javascript; charset=utf-8", web_assets::JS)
}

async fn not_found_handler() -> Response {
    text_response(StatusCode::NOT_FOUND, "Not Found".to_owned())
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(listing_handler))
        .route("/docs/{slug}", get(document_handler))
        .route("/docs/{slug}/toc.json", get(toc_handler))
        .route("/assets/docview.css", get(css_handler))
        .route("/assets/docview.js", get(js_handler))
        .fallback(not_found_handler)
        .layer(CompressionLayer::new())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Serve `source` over HTTP.
///
/// Binds to `bind_addr` starting at `start_port`, retrying on `EADDRINUSE`.
/// The server shuts down cleanly when SIGINT (Ctrl+C) is received.
pub async fn run_serve(source: DocumentSource, bind_addr: &str, start_port: u16) -> io::Result<()> {
    let state = Arc::new(AppState::new(source));

    let (std_listener, bound_port) = bind_with_retry(bind_addr, start_port).map_err(|msg| {
        log::error!("[bind] {msg}");
        io::Error::new(io::ErrorKind::AddrInUse, msg)
    })?;

    std_listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;

    println!("docview serve");
    println!("source: {}", state.source.describe());
    println!("url:    http://{bind_addr}:{bound_port}");
    log::info!("[serve] listening port={bound_port}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                log::error!("[shutdown] failed to install SIGINT handler error={e}");
                std::future::pending::<()>().await;
            }
            log::info!("[shutdown] complete");
        })
        .await
        .map_err(io::Error::other)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
