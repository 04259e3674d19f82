//! HTML rendering for serve mode.
//!
//! Converts markdown to HTML with comrak (GFM extensions) and gives each
//! heading that has a table-of-contents entry the id that entry links to. Also
//! builds the listing, detail and message page shells.

use std::sync::LazyLock;

use comrak::{
    arena_tree::NodeEdge,
    format_html,
    nodes::{AstNode, NodeValue},
    parse_document, Arena, Options,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

use crate::source::{Document, DocumentSummary};
use crate::toc::{HeadingDescriptor, LineAnchors};

/// Characters left unescaped in a slug path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A heading anchor placed in the rendered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyAnchor {
    pub level: u8,
    pub id: String,
}

/// Rendered document body.
#[derive(Debug, Clone)]
pub struct RenderedBody {
    /// HTML fragment with `id` attributes on level 1–3 headings.
    pub html: String,
    /// Anchors in document order.
    pub anchors: Vec<BodyAnchor>,
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// comrak options: GFM extensions, raw HTML stripped.
fn make_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.render.unsafe_ = false;
    options
}

/// Minimal HTML entity escaping for text content and attribute values.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Root-relative URL of a document's detail page.
pub fn doc_href(slug: &str) -> String {
    format!("/docs/{}", utf8_percent_encode(slug, PATH_SEGMENT))
}

/// What to do with one rendered heading element.
struct HeadingSlot {
    /// TOC id for the heading, if its source line has a TOC entry.
    id: Option<String>,
    /// Wrap the heading content in a link to itself.
    self_link: bool,
}

/// Opening tag of a heading element as comrak emits it.
static HEADING_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<h[1-6]>").expect("heading tag pattern is valid"));

/// Rewrite heading elements in document order, one slot per heading node.
///
/// With `render.unsafe_ = false` comrak escapes or omits raw HTML, so every
/// bare `<hN>` in the output belongs to a markdown heading node and the
/// slots line up with the tags one to one. Slots without an id leave their
/// tag untouched.
fn inject_heading_ids(html: &str, slots: &[HeadingSlot]) -> String {
    let mut out = String::with_capacity(html.len());
    let mut slots = slots.iter();
    let mut pos = 0;
    while let Some(open) = HEADING_OPEN.find_at(html, pos) {
        out.push_str(&html[pos..open.start()]);
        pos = open.end();
        let Some(HeadingSlot {
            id: Some(id),
            self_link,
        }) = slots.next()
        else {
            out.push_str(open.as_str());
            continue;
        };
        let level = &open.as_str()[2..3];
        let id = html_escape(id);
        out.push_str(&format!("<h{level} id=\"{id}\">"));
        if !*self_link {
            continue;
        }
        let close = format!("</h{level}>");
        if let Some(end) = html[pos..].find(&close).map(|i| pos + i) {
            out.push_str(&format!("<a class=\"heading-link\" href=\"#{id}\">"));
            out.push_str(&html[pos..end]);
            out.push_str("</a>");
            pos = end;
        }
    }
    out.push_str(&html[pos..]);
    out
}

/// `true` when a heading already contains a link; anchors cannot nest.
fn contains_link<'a>(node: &'a AstNode<'a>) -> bool {
    node.descendants()
        .skip(1)
        .any(|n| matches!(n.data.borrow().value, NodeValue::Link(_)))
}

/// Build the `<ul>…</ul>` TOC list. Empty when there are no headings.
fn build_toc_html(headings: &[HeadingDescriptor]) -> String {
    if headings.is_empty() {
        return String::new();
    }
    let mut html = String::from("<ul>\n");
    for heading in headings {
        let id = html_escape(&heading.id);
        html.push_str(&format!(
            "<li class=\"toc-h{}\"><a href=\"#{id}\" data-toc-id=\"{id}\">{}</a></li>\n",
            heading.level,
            html_escape(&heading.text),
        ));
    }
    html.push_str("</ul>\n");
    html
}

fn build_dates_html(published_at: Option<&str>, updated_at: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(p) = published_at {
        parts.push(format!("Published {}", html_escape(p)));
    }
    if let Some(u) = updated_at {
        parts.push(format!("Updated {}", html_escape(u)));
    }
    if parts.is_empty() {
        return String::new();
    }
    format!("<p class=\"doc-dates\">{}</p>\n", parts.join(" · "))
}

/// Wrap `body` in the common document skeleton.
fn page(title: &str, body: &str, with_script: bool) -> String {
    let title = html_escape(title);
    let script = if with_script {
        "<script src=\"/assets/docview.js\"></script>\n"
    } else {
        ""
    };
    format!(
        "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n\
<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title} · docview</title>\n\
<link rel=\"stylesheet\" href=\"/assets/docview.css\">\n\
</head>\n\
<body>\n\
<header class=\"site-header\"><a class=\"brand\" href=\"/\">docview</a></header>\n\
{body}\
{script}\
</body>\n\
</html>\n"
    )
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render markdown to HTML, giving headings the anchor ids of their TOC entries.
///
/// A heading gets an id only when [`toc::extract`](crate::toc::extract)
/// produced an entry for its source line. Anchored headings link to
/// themselves.
pub fn render_markdown(input: &str) -> RenderedBody {
    let arena = Arena::new();
    let options = make_options();
    let root = parse_document(&arena, input, &options);
    let line_anchors = LineAnchors::new(input);

    let mut slots = Vec::new();
    let mut anchors = Vec::new();
    for edge in root.traverse() {
        let NodeEdge::Start(node) = edge else {
            continue;
        };
        let ast = node.data.borrow();
        let NodeValue::Heading(nh) = &ast.value else {
            continue;
        };
        let id = line_anchors
            .id_at(ast.sourcepos.start.line, nh.level)
            .map(str::to_owned);
        if let Some(id) = &id {
            anchors.push(BodyAnchor {
                level: nh.level,
                id: id.clone(),
            });
        }
        slots.push(HeadingSlot {
            id,
            self_link: !contains_link(node),
        });
    }

    let mut html_bytes = Vec::new();
    let html = match format_html(root, &options, &mut html_bytes) {
        Ok(()) => String::from_utf8_lossy(&html_bytes).into_owned(),
        Err(e) => {
            log::error!("[render] format failed error={e}");
            String::new()
        }
    };

    log::debug!("[render] headings={} anchors={}", slots.len(), anchors.len());
    RenderedBody {
        html: inject_heading_ids(&html, &slots),
        anchors,
    }
}

/// The listing page: one entry per published document.
pub fn build_listing_page(docs: &[DocumentSummary]) -> String {
    let mut body = String::from("<main class=\"listing\">\n<h2>Documents</h2>\n");
    if docs.is_empty() {
        body.push_str("<p class=\"muted\">No documents have been published yet.</p>\n");
    } else {
        body.push_str("<ul class=\"doc-list\">\n");
        for doc in docs {
            body.push_str(&format!(
                "<li><a href=\"{}\">{}</a>",
                html_escape(&doc_href(&doc.slug)),
                html_escape(doc.display_title())
            ));
            if let Some(summary) = doc.summary.as_deref().filter(|s| !s.is_empty()) {
                body.push_str(&format!(
                    "<p class=\"doc-summary\">{}</p>",
                    html_escape(summary)
                ));
            }
            body.push_str("</li>\n");
        }
        body.push_str("</ul>\n");
    }
    body.push_str("</main>\n");
    page("Documents", &body, false)
}

/// The detail page: article with anchored headings plus the TOC sidebar.
pub fn build_document_page(
    slug: &str,
    doc: &Document,
    rendered: &RenderedBody,
    toc: &[HeadingDescriptor],
) -> String {
    let title_raw = doc
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(slug);
    let title = html_escape(title_raw);
    let summary = match doc.summary.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => format!("<p class=\"doc-summary\">{}</p>\n", html_escape(s)),
        None => String::new(),
    };
    let dates = build_dates_html(doc.published_at.as_deref(), doc.updated_at.as_deref());
    let toc_html = build_toc_html(toc);

    let body = format!(
        "<div class=\"layout\">\n\
<main class=\"content\">\n\
<a class=\"back\" href=\"/\">\u{2190} Documents</a>\n\
<article>\n\
<h1 class=\"doc-title\">{title}</h1>\n\
{summary}\
{dates}\
<div class=\"doc-body\">\n\
{content}\
</div>\n\
</article>\n\
</main>\n\
<nav class=\"toc-sidebar\" aria-label=\"Table of contents\">\n\
<div class=\"toc-title\">Contents</div>\n\
{toc_html}</nav>\n\
</div>\n",
        content = rendered.html,
    );
    page(title_raw, &body, true)
}

/// A page carrying only a message: "no content" or an inline fetch error.
pub fn build_message_page(title: &str, message: &str, is_error: bool) -> String {
    let class = if is_error { "error" } else { "muted" };
    let body = format!(
        "<main class=\"content\">\n\
<a class=\"back\" href=\"/\">\u{2190} Documents</a>\n\
<div class=\"{class}\">{}</div>\n\
</main>\n",
        html_escape(message)
    );
    page(title, &body, false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc;

    fn doc(content: &str) -> Document {
        Document {
            title: Some("Guide".into()),
            summary: Some("How to <file>".into()),
            content: content.into(),
            published_at: Some("2024-05-01".into()),
            updated_at: None,
        }
    }

    fn summary(slug: &str, title: Option<&str>) -> DocumentSummary {
        DocumentSummary {
            id: slug.into(),
            title: title.map(Into::into),
            slug: slug.into(),
            summary: None,
            published_at: None,
            updated_at: None,
        }
    }

    // --- render_markdown ---

    #[test]
    fn gfm_features_render() {
        let body = render_markdown("| A | B |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done\n");
        assert!(body.html.contains("<table>"));
        assert!(body.html.contains("<del>"));
        assert!(body.html.contains("checkbox"));
    }

    #[test]
    fn script_tag_stripped_from_output() {
        let body = render_markdown("<script>alert(1)</script>\n");
        assert!(!body.html.contains("<script>"));
    }

    #[test]
    fn headings_get_ids() {
        let body = render_markdown("# Title\n\n## Section One\n");
        assert!(body.html.contains("<h1 id=\"title\">"), "{}", body.html);
        assert!(body.html.contains("<h2 id=\"section-one\">"), "{}", body.html);
    }

    #[test]
    fn duplicate_headings_get_sequential_anchors() {
        let body = render_markdown("## Setup\n\n## Setup\n\n# Setup\n");
        assert!(body.html.contains("<h2 id=\"setup\">"));
        assert!(body.html.contains("<h2 id=\"setup-1\">"));
        assert!(body.html.contains("<h1 id=\"setup-2\">"));
    }

    #[test]
    fn deep_headings_left_without_id() {
        let body = render_markdown("#### Deep\n\n# Deep\n");
        assert!(body.html.contains("<h4>Deep</h4>"), "{}", body.html);
        assert!(body.html.contains("<h1 id=\"deep\">"), "{}", body.html);
    }

    #[test]
    fn body_anchors_match_toc() {
        let src = "Intro text\n# Title\nbody\n## Sub One\nmore\n## Sub One\n\n\
Sub One\n-------\n\n> ## Sub One\n\n```\n# Title\n```\n\n# Title\n";
        let body = render_markdown(src);
        let anchor_ids: Vec<&str> = body.anchors.iter().map(|a| a.id.as_str()).collect();
        let toc_ids: Vec<String> = toc::extract(src).into_iter().map(|h| h.id).collect();
        assert_eq!(toc_ids, vec!["title", "sub-one", "sub-one-1", "title-1", "title-2"]);
        assert_eq!(anchor_ids, vec!["title", "sub-one", "sub-one-1", "title-2"]);
    }

    #[test]
    fn setext_heading_gets_no_id_and_keeps_suffixes() {
        let body = render_markdown("Overview\n--------\n\ntext\n\n## Overview\n");
        assert!(body.html.contains("<h2>Overview</h2>"), "{}", body.html);
        assert!(body.html.contains("<h2 id=\"overview\">"), "{}", body.html);
        assert!(!body.html.contains("overview-1"), "{}", body.html);
    }

    #[test]
    fn quoted_heading_gets_no_id() {
        let body = render_markdown("> # A\n\n# A\n");
        let ids: Vec<&str> = body.anchors.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(body.html.contains("<h1>A</h1>"), "{}", body.html);
        assert!(!body.html.contains("a-1"), "{}", body.html);
    }

    #[test]
    fn heading_after_fenced_hash_line_takes_suffixed_id() {
        let src = "```\n# A\n```\n\n# A\n";
        let body = render_markdown(src);
        let ids: Vec<&str> = body.anchors.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a-1"]);
        assert!(body.html.contains("<h1 id=\"a-1\">"), "{}", body.html);
        assert!(!body.html.contains("id=\"a\""), "{}", body.html);
    }

    #[test]
    fn empty_heading_does_not_take_next_id() {
        let body = render_markdown("#\n\n# Real\n");
        assert!(body.html.contains("<h1></h1>"), "{}", body.html);
        assert!(body.html.contains("<h1 id=\"real\">"), "{}", body.html);
    }

    #[test]
    fn anchored_heading_links_to_itself() {
        let body = render_markdown("# Title\n");
        assert!(
            body.html
                .contains("<h1 id=\"title\"><a class=\"heading-link\" href=\"#title\">Title</a></h1>"),
            "{}",
            body.html
        );
    }

    #[test]
    fn heading_with_link_is_not_wrapped() {
        let body = render_markdown("# See [docs](https://example.com)\n");
        assert_eq!(body.anchors.len(), 1);
        assert!(!body.html.contains("heading-link"), "{}", body.html);
    }

    #[test]
    fn inline_markup_in_heading_slugs_like_toc() {
        let src = "## **Bold** `code` step\n";
        let body = render_markdown(src);
        assert_eq!(body.anchors[0].id, toc::extract(src)[0].id);
    }

    #[test]
    fn hash_line_in_code_block_has_no_anchor() {
        let body = render_markdown("```sh\n# comment\n```\n\n# Real\n");
        let ids: Vec<&str> = body.anchors.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["real"]);
    }

    #[test]
    fn inject_ids_skips_slots_without_id() {
        let html = "<h2>A</h2>\n<h1></h1>\n<h2>B</h2>\n";
        let slots = vec![
            HeadingSlot {
                id: Some("a".into()),
                self_link: false,
            },
            HeadingSlot {
                id: None,
                self_link: true,
            },
            HeadingSlot {
                id: Some("b".into()),
                self_link: true,
            },
        ];
        assert_eq!(
            inject_heading_ids(html, &slots),
            "<h2 id=\"a\">A</h2>\n<h1></h1>\n\
<h2 id=\"b\"><a class=\"heading-link\" href=\"#b\">B</a></h2>\n"
        );
    }

    // --- pages ---

    #[test]
    fn toc_html_links_every_heading() {
        let headings = toc::extract("# A\n## B & C\n");
        let html = build_toc_html(&headings);
        assert!(html.contains("<li class=\"toc-h1\"><a href=\"#a\" data-toc-id=\"a\">A</a></li>"));
        assert!(html.contains("href=\"#b-c\""));
        assert!(html.contains("B &amp; C"));
    }

    #[test]
    fn toc_html_empty_without_headings() {
        assert_eq!(build_toc_html(&[]), "");
    }

    #[test]
    fn document_page_contains_toc_body_and_script() {
        let content = "# Title\n\n## Part\n";
        let d = doc(content);
        let rendered = render_markdown(content);
        let toc = toc::extract(content);
        let page = build_document_page("guide", &d, &rendered, &toc);

        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>Guide · docview</title>"));
        assert!(page.contains("<nav class=\"toc-sidebar\""));
        assert!(page.contains("href=\"#part\""));
        assert!(page.contains("<h2 id=\"part\">"));
        assert!(page.contains("<script src=\"/assets/docview.js\"></script>"));
        assert!(page.contains("How to &lt;file&gt;"));
        assert!(page.contains("Published 2024-05-01"));
    }

    #[test]
    fn every_toc_link_resolves_to_body_id() {
        let content = "# A\n\ntext\n\n## B\n\n## B\n\n### C!\n";
        let rendered = render_markdown(content);
        let page = build_document_page("x", &doc(content), &rendered, &toc::extract(content));
        for heading in toc::extract(content) {
            assert!(page.contains(&format!("href=\"#{}\"", heading.id)));
            assert!(page.contains(&format!(" id=\"{}\">", heading.id)));
        }
    }

    #[test]
    fn document_page_title_falls_back_to_slug() {
        let mut d = doc("");
        d.title = None;
        let page = build_document_page("my-slug", &d, &render_markdown(""), &[]);
        assert!(page.contains("<h1 class=\"doc-title\">my-slug</h1>"));
    }

    #[test]
    fn listing_page_links_documents() {
        let docs = vec![
            summary("guide", Some("Filing <Guide>")),
            summary("untitled doc", None),
        ];
        let page = build_listing_page(&docs);
        assert!(page.contains("<a href=\"/docs/guide\">Filing &lt;Guide&gt;</a>"));
        assert!(page.contains("<a href=\"/docs/untitled%20doc\">untitled doc</a>"));
        assert!(!page.contains("docview.js"));
    }

    #[test]
    fn listing_page_empty_message() {
        let page = build_listing_page(&[]);
        assert!(page.contains("No documents have been published yet."));
    }

    #[test]
    fn message_page_escapes_and_classes() {
        let page = build_message_page("Error", "bad <thing>", true);
        assert!(page.contains("<div class=\"error\">bad &lt;thing&gt;</div>"));
        let page = build_message_page("Not found", "nothing here", false);
        assert!(page.contains("<div class=\"muted\">nothing here</div>"));
    }

    #[test]
    fn doc_href_encodes_slug() {
        assert_eq!(doc_href("a-b_c.d~e"), "/docs/a-b_c.d~e");
        assert_eq!(doc_href("a/b?c"), "/docs/a%2Fb%3Fc");
        assert_eq!(doc_href("특허"), "/docs/%ED%8A%B9%ED%97%88");
    }

    #[test]
    fn html_escape_handles_special_chars() {
        assert_eq!(html_escape("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
