//! Terminal rendering.
//!
//! Converts a [`ParsedDocument`] into styled ratatui [`Text`] and records the
//! rendered line of every heading that has a table-of-contents entry, under
//! that entry's id.

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};

use crate::parse::{BlockKind, ContentBlock, ParsedDocument};
use crate::spy::Anchor;
use crate::toc::LineAnchors;

/// A heading's position in the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingAnchor {
    pub id: String,
    pub level: u8,
    pub text: String,
    /// 0-based line index in [`RenderedDocument::text`].
    pub rendered_line: usize,
}

/// Styled output plus anchor positions.
#[derive(Debug, Clone, Default)]
pub struct RenderedDocument {
    pub text: Text<'static>,
    pub anchors: Vec<HeadingAnchor>,
}

impl RenderedDocument {
    /// Anchor positions in the form the scroll-spy observes (one row each).
    pub fn spy_anchors(&self) -> Vec<Anchor> {
        self.anchors
            .iter()
            .map(|a| Anchor {
                id: a.id.clone(),
                top: a.rendered_line as f64,
                height: 1.0,
            })
            .collect()
    }

    pub fn line_count(&self) -> usize {
        self.text.lines.len()
    }
}

/// Convert a parsed markdown document into styled [`Text`] with anchors.
///
/// `line_anchors` must be built from the same source as `doc`. Headings
/// nested in quotes or lists render as plain text and carry no anchor.
pub fn render_document(doc: &ParsedDocument, line_anchors: &LineAnchors) -> RenderedDocument {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut anchors = Vec::new();

    for (i, block) in doc.blocks.iter().enumerate() {
        if i > 0 {
            lines.push(Line::default());
        }
        if let BlockKind::Heading(level) = block.kind {
            if let Some(id) = line_anchors.id_at(block.line_start, level) {
                anchors.push(HeadingAnchor {
                    id: id.to_owned(),
                    level,
                    text: block.content.trim().to_owned(),
                    rendered_line: lines.len(),
                });
            }
        }
        render_block(block, &mut lines);
    }

    RenderedDocument {
        text: Text::from(lines),
        anchors,
    }
}

fn render_block(block: &ContentBlock, lines: &mut Vec<Line<'static>>) {
    match &block.kind {
        BlockKind::Heading(level) => render_heading(*level, &block.content, lines),
        BlockKind::Paragraph | BlockKind::HtmlBlock => render_paragraph(&block.content, lines),
        BlockKind::CodeBlock => render_code_block(&block.content, lines),
        BlockKind::List => render_list(&block.content, lines),
        BlockKind::BlockQuote => render_block_quote(&block.content, lines),
        BlockKind::ThematicBreak => render_thematic_break(lines),
        BlockKind::Table => render_table(&block.content, lines),
    }
}

fn heading_style(level: u8) -> Style {
    let base = Style::default().add_modifier(Modifier::BOLD);
    match level {
        1 => base.fg(Color::Magenta),
        2 => base.fg(Color::Cyan),
        3 => base.fg(Color::Green),
        _ => base.fg(Color::White),
    }
}

fn render_heading(level: u8, content: &str, lines: &mut Vec<Line<'static>>) {
    let prefix = "#".repeat(level as usize);
    lines.push(Line::from(Span::styled(
        format!("{prefix} {}", content.trim()),
        heading_style(level),
    )));
}

fn render_paragraph(content: &str, lines: &mut Vec<Line<'static>>) {
    for text_line in content.lines() {
        lines.push(Line::from(Span::raw(text_line.to_owned())));
    }
}

fn render_code_block(content: &str, lines: &mut Vec<Line<'static>>) {
    let border_style = Style::default().fg(Color::DarkGray);
    let code_style = Style::default().fg(Color::Green);

    lines.push(Line::from(Span::styled("┌───", border_style)));
    for text_line in content.lines() {
        lines.push(Line::from(vec![
            Span::styled("│ ", border_style),
            Span::styled(text_line.to_owned(), code_style),
        ]));
    }
    lines.push(Line::from(Span::styled("└───", border_style)));
}

fn render_list(content: &str, lines: &mut Vec<Line<'static>>) {
    let bullet_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    for text_line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        lines.push(Line::from(vec![
            Span::styled("  • ", bullet_style),
            Span::raw(text_line.to_owned()),
        ]));
    }
}

fn render_block_quote(content: &str, lines: &mut Vec<Line<'static>>) {
    let bar_style = Style::default().fg(Color::DarkGray);
    let text_style = Style::default().add_modifier(Modifier::ITALIC).fg(Color::Gray);
    for text_line in content.lines() {
        lines.push(Line::from(vec![
            Span::styled("  ▌ ", bar_style),
            Span::styled(text_line.to_owned(), text_style),
        ]));
    }
}

fn render_thematic_break(lines: &mut Vec<Line<'static>>) {
    lines.push(Line::from(Span::styled(
        "─".repeat(40),
        Style::default().fg(Color::DarkGray),
    )));
}

fn render_table(content: &str, lines: &mut Vec<Line<'static>>) {
    for text_line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        lines.push(Line::from(Span::raw(format!("  {text_line}"))));
    }
}
