//! Table-of-contents derivation.
//!
//! Scans raw document text line by line and produces the ordered list of
//! headings (levels 1–3) with de-duplicated, URL-fragment-safe identifiers.
//!
//! Renderers never slug heading text themselves. They look up the id of the
//! TOC entry read from a heading's source line through [`LineAnchors`], so a
//! rendered anchor either carries the TOC id or no id at all.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use regex::Regex;
use serde::Serialize;

/// Base identifier used when a heading's text slugs to nothing.
const EMPTY_SLUG_FALLBACK: &str = "section";

/// `1–3 '#'`, at least one whitespace, then the heading text.
///
/// Lines are trimmed before matching, so the captured text never carries
/// trailing whitespace and `# ` (hash plus spaces only) cannot match.
static HEADING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,3})\s+(.+)$").expect("heading pattern is valid"));

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One entry of a document's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingDescriptor {
    /// Heading level (1–3).
    pub level: u8,
    /// Heading text with surrounding whitespace removed.
    pub text: String,
    /// Anchor identifier, unique within one extraction pass.
    pub id: String,
}

/// Assigns de-duplicated anchor ids within one document.
///
/// The first occurrence of a base slug is bare (`setup`); later occurrences
/// receive a numeric suffix counting from 1 (`setup-1`, `setup-2`).
#[derive(Debug, Default)]
pub struct Slugger {
    /// Base slug → number of times it has been handed out so far.
    seen: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the anchor id for the next heading whose text is `text`.
    pub fn slug(&mut self, text: &str) -> String {
        let base = slugify(text);
        let count = self.seen.entry(base.clone()).or_insert(0);
        let id = if *count == 0 {
            base
        } else {
            format!("{base}-{count}")
        };
        *count += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// Slug rule
// ---------------------------------------------------------------------------

/// Convert heading text to a URL-fragment-safe base slug.
///
/// Lowercases the text, keeps alphanumeric characters, maps whitespace,
/// hyphens and underscores to `-`, drops everything else, collapses hyphen
/// runs and trims hyphens at both ends. Text with no alphanumeric content
/// yields `section`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        EMPTY_SLUG_FALLBACK.to_owned()
    } else {
        trimmed.to_owned()
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Parse a single line as a TOC heading, returning `(level, text)`.
///
/// Lines with four or more leading `#`, no space after the hashes, or no
/// text are not headings.
pub fn parse_heading_line(line: &str) -> Option<(u8, &str)> {
    let caps = HEADING_LINE.captures(line.trim())?;
    let hashes = caps.get(1)?.as_str();
    let text = caps.get(2)?.as_str().trim();
    if text.is_empty() {
        return None;
    }
    Some((hashes.len() as u8, text))
}

/// TOC entries paired with the 1-based source line they were read from.
fn extract_located(text: &str) -> Vec<(usize, HeadingDescriptor)> {
    let mut slugger = Slugger::new();
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_heading_line(line).map(|h| (idx + 1, h)))
        .map(|(line, (level, text))| {
            let heading = HeadingDescriptor {
                level,
                text: text.to_owned(),
                id: slugger.slug(text),
            };
            (line, heading)
        })
        .collect()
}

/// Derive the table of contents of `text`.
///
/// Never fails: empty input, or input without heading lines, yields an empty
/// list. Identical input always yields an identical list.
pub fn extract(text: &str) -> Vec<HeadingDescriptor> {
    extract_located(text)
        .into_iter()
        .map(|(_, heading)| heading)
        .collect()
}

/// TOC ids of a document keyed by the source line of their heading.
///
/// A markdown parser may see headings the line scan does not (setext
/// underlines, headings inside quotes or list items) and the reverse (`#`
/// lines inside fenced code). Looking ids up by line keeps both renderers on
/// the extractor's ids: a rendered heading without a TOC entry on its line
/// gets no id.
#[derive(Debug, Default)]
pub struct LineAnchors {
    by_line: HashMap<usize, HeadingDescriptor>,
}

impl LineAnchors {
    pub fn new(text: &str) -> Self {
        Self {
            by_line: extract_located(text).into_iter().collect(),
        }
    }

    /// The TOC id for a level-`level` heading starting on 1-based `line`.
    pub fn id_at(&self, line: usize, level: u8) -> Option<&str> {
        self.by_line
            .get(&line)
            .filter(|h| h.level == level)
            .map(|h| h.id.as_str())
    }
}

/// Rebuild heading source lines from a TOC (`## Text` per entry).
///
/// Extracting the result again yields the same TOC.
pub fn to_source_text(headings: &[HeadingDescriptor]) -> String {
    let mut out = String::new();
    for heading in headings {
        for _ in 0..heading.level {
            out.push('#');
        }
        out.push(' ');
        out.push_str(&heading.text);
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Memoization
// ---------------------------------------------------------------------------

/// Content-keyed memo of [`extract`] results, safe to share between requests.
///
/// Keys are a hash of the content plus its byte length. When the number of
/// entries reaches `capacity` the cache is emptied before inserting.
pub struct TocCache {
    entries: DashMap<(u64, usize), Arc<[HeadingDescriptor]>>,
    capacity: usize,
}

impl TocCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Return the TOC for `content`, extracting it on a miss.
    pub fn get_or_extract(&self, content: &str) -> Arc<[HeadingDescriptor]> {
        let key = content_key(content);
        if let Some(hit) = self.entries.get(&key) {
            log::debug!("[toc] cache=hit headings={}", hit.len());
            return Arc::clone(hit.value());
        }

        let toc: Arc<[HeadingDescriptor]> = extract(content).into();
        if self.entries.len() >= self.capacity {
            log::debug!("[toc] cache=full entries={} action=clear", self.entries.len());
            self.entries.clear();
        }
        self.entries.insert(key, Arc::clone(&toc));
        log::debug!("[toc] cache=miss headings={}", toc.len());
        toc
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn content_key(content: &str) -> (u64, usize) {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    (hasher.finish(), content.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
