//! Markdown block parsing for the terminal viewer.
//!
//! Flattens a markdown document into top-level content blocks with their
//! source line ranges. Heading blocks keep their level so the renderer can
//! place anchors for the table of contents.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The kind of a top-level content block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    CodeBlock,
    List,
    BlockQuote,
    ThematicBreak,
    HtmlBlock,
    Table,
}

/// A top-level content block in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: BlockKind,
    /// 1-based starting line number.
    pub line_start: usize,
    /// 1-based ending line number (inclusive).
    pub line_end: usize,
    /// Flattened text content of the block.
    pub content: String,
}

/// The parsed representation of a markdown document.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub blocks: Vec<ContentBlock>,
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Maps byte offsets into a source string to 1-based line numbers.
struct LineIndex {
    newline_offsets: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let newline_offsets = source
            .bytes()
            .enumerate()
            .filter_map(|(i, b)| (b == b'\n').then_some(i))
            .collect();
        Self { newline_offsets }
    }

    fn line_at(&self, offset: usize) -> usize {
        match self.newline_offsets.binary_search(&offset) {
            Ok(idx) | Err(idx) => idx + 1,
        }
    }
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Returns `true` for block-level tags (as opposed to inline spans).
fn is_block_level(tag: &Tag) -> bool {
    !matches!(
        tag,
        Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. } | Tag::Image { .. }
    )
}

fn is_block_level_end(tag: &TagEnd) -> bool {
    !matches!(
        tag,
        TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link | TagEnd::Image
    )
}

/// Map a top-level block tag to its [`BlockKind`].
fn tag_to_block_kind(tag: &Tag) -> Option<BlockKind> {
    match tag {
        Tag::Paragraph => Some(BlockKind::Paragraph),
        Tag::Heading { level, .. } => Some(BlockKind::Heading(heading_level_to_u8(*level))),
        Tag::CodeBlock(_) => Some(BlockKind::CodeBlock),
        Tag::BlockQuote(..) => Some(BlockKind::BlockQuote),
        Tag::List(_) => Some(BlockKind::List),
        Tag::Table(_) => Some(BlockKind::Table),
        Tag::HtmlBlock => Some(BlockKind::HtmlBlock),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a markdown source string into a [`ParsedDocument`].
pub fn parse(source: &str) -> ParsedDocument {
    let line_index = LineIndex::new(source);
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;

    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut depth: usize = 0;
    let mut current: Option<(BlockKind, usize)> = None; // (kind, start_offset)
    let mut text_buf = String::new();

    for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
        match &event {
            Event::Start(tag) if is_block_level(tag) => {
                if depth == 0 {
                    if let Some(kind) = tag_to_block_kind(tag) {
                        current = Some((kind, range.start));
                        text_buf.clear();
                    }
                } else if matches!(tag, Tag::Item | Tag::TableRow)
                    && !text_buf.is_empty()
                    && !text_buf.ends_with('\n')
                {
                    text_buf.push('\n');
                }
                depth += 1;
            }

            Event::End(tag_end) if is_block_level_end(tag_end) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some((kind, start_offset)) = current.take() {
                        blocks.push(ContentBlock {
                            kind,
                            line_start: line_index.line_at(start_offset),
                            line_end: line_index
                                .line_at(range.end.saturating_sub(1).max(start_offset)),
                            content: std::mem::take(&mut text_buf),
                        });
                    }
                    text_buf.clear();
                }
            }

            Event::Text(text) | Event::Code(text) | Event::InlineHtml(text) => {
                text_buf.push_str(text);
            }

            Event::SoftBreak | Event::HardBreak => {
                // Headings are single-line in the terminal.
                if matches!(current, Some((BlockKind::Heading(_), _))) {
                    text_buf.push(' ');
                } else {
                    text_buf.push('\n');
                }
            }

            Event::Html(html) => {
                text_buf.push_str(html);
            }

            Event::Rule => {
                let line = line_index.line_at(range.start);
                blocks.push(ContentBlock {
                    kind: BlockKind::ThematicBreak,
                    line_start: line,
                    line_end: line,
                    content: String::new(),
                });
            }

            _ => {}
        }
    }

    ParsedDocument { blocks }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(doc: &ParsedDocument) -> Vec<&BlockKind> {
        doc.blocks.iter().map(|b| &b.kind).collect()
    }

    #[test]
    fn empty_document() {
        assert!(parse("").blocks.is_empty());
    }

    #[test]
    fn single_paragraph() {
        let doc = parse("Hello world.\n");
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].kind, BlockKind::Paragraph);
        assert_eq!(doc.blocks[0].content, "Hello world.");
        assert_eq!(doc.blocks[0].line_start, 1);
    }

    #[test]
    fn headings_keep_level_and_line() {
        let doc = parse("# Title\n\nBody\n\n## Section\n\n#### Deep\n");
        let headings: Vec<(&BlockKind, &str, usize)> = doc
            .blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::Heading(_)))
            .map(|b| (&b.kind, b.content.as_str(), b.line_start))
            .collect();
        assert_eq!(
            headings,
            vec![
                (&BlockKind::Heading(1), "Title", 1),
                (&BlockKind::Heading(2), "Section", 5),
                (&BlockKind::Heading(4), "Deep", 7),
            ]
        );
    }

    #[test]
    fn heading_inline_markup_flattened() {
        let doc = parse("## **Bold** and `code`\n");
        assert_eq!(doc.blocks[0].content, "Bold and code");
    }

    #[test]
    fn code_block_content() {
        let doc = parse("```rust\nfn main() {}\n```\n");
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].kind, BlockKind::CodeBlock);
        assert_eq!(doc.blocks[0].content, "fn main() {}\n");
    }

    #[test]
    fn hash_line_inside_code_is_not_a_heading() {
        let doc = parse("```\n# comment\n```\n");
        assert_eq!(kinds(&doc), vec![&BlockKind::CodeBlock]);
    }

    #[test]
    fn list_items_on_separate_lines() {
        let doc = parse("- alpha\n- beta\n- gamma\n");
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].kind, BlockKind::List);
        assert_eq!(doc.blocks[0].content.lines().count(), 3);
    }

    #[test]
    fn mixed_document_block_kinds() {
        let src = "# Intro\n\nText.\n\n> quote\n\n---\n\n| A | B |\n|---|---|\n| 1 | 2 |\n";
        let doc = parse(src);
        assert_eq!(
            kinds(&doc),
            vec![
                &BlockKind::Heading(1),
                &BlockKind::Paragraph,
                &BlockKind::BlockQuote,
                &BlockKind::ThematicBreak,
                &BlockKind::Table,
            ]
        );
    }

    #[test]
    fn html_block_kept_as_block() {
        let doc = parse("<div>raw</div>\n\nafter\n");
        assert_eq!(kinds(&doc), vec![&BlockKind::HtmlBlock, &BlockKind::Paragraph]);
        assert!(doc.blocks[0].content.contains("<div>raw</div>"));
    }

    #[test]
    fn line_ranges_increase() {
        let doc = parse("# A\n\nPara 1\n\n## B\n\nPara 2\n");
        for window in doc.blocks.windows(2) {
            assert!(window[0].line_start <= window[1].line_start);
        }
    }
}
