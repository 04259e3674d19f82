//! Terminal viewer.
//!
//! Three panes: the document menu, the current document, and its table of
//! contents with the scroll-spy's active heading highlighted. Key presses,
//! fetch completions and visibility batches all arrive as [`ViewEvent`]s on
//! one queue and are handled to completion, one at a time, by [`App`].

use std::io;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem, ListState, Paragraph, Wrap},
    DefaultTerminal, Frame,
};
use tokio::runtime::Handle;

use crate::parse;
use crate::render::{self, RenderedDocument};
use crate::source::{Document, DocumentSource, DocumentState, ListingState};
use crate::spy::{ActiveBand, BandObserver, Registration, ScrollSpy, VisibilityEntry};
use crate::toc::{self, HeadingDescriptor, LineAnchors};

/// How long the input thread waits for a terminal event before checking
/// whether the viewer is still running.
const INPUT_POLL: Duration = Duration::from_millis(200);

const MENU_WIDTH: u16 = 30;
const TOC_WIDTH: u16 = 32;

// Minimum usable terminal size.
const MIN_WIDTH: u16 = 40;
const MIN_HEIGHT: u16 = 6;

// ---------------------------------------------------------------------------
// Events and effects
// ---------------------------------------------------------------------------

/// Everything the viewer reacts to.
#[derive(Debug)]
pub enum ViewEvent {
    Key(KeyEvent),
    Resize,
    /// The terminal input stream ended or failed.
    InputClosed,
    Listing(ListingState),
    /// A document fetch finished. `generation` identifies the load it
    /// answers; answers to superseded loads are dropped.
    Loaded {
        generation: u64,
        state: DocumentState,
    },
    Visibility {
        registration: Registration,
        batch: Vec<VisibilityEntry>,
    },
}

/// Work the event loop performs on behalf of [`App`].
#[derive(Debug, PartialEq)]
pub enum Effect {
    FetchListing,
    FetchDocument { generation: u64, slug: String },
    /// Queue a visibility batch as a [`ViewEvent::Visibility`].
    Visibility {
        registration: Registration,
        batch: Vec<VisibilityEntry>,
    },
    Quit,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Menu,
    Document,
}

#[derive(Debug)]
struct LoadedDocument {
    doc: Document,
    rendered: RenderedDocument,
    toc: Vec<HeadingDescriptor>,
}

#[derive(Debug)]
enum PageStatus {
    Loading,
    Ready(Box<LoadedDocument>),
    NotFound,
    Failed(String),
}

#[derive(Debug)]
struct Page {
    slug: String,
    status: PageStatus,
    scroll: usize,
}

/// Viewer state machine. Holds no terminal or runtime handles.
pub struct App {
    /// `None` while the listing is loading.
    listing: Option<ListingState>,
    selected: usize,
    focus: Focus,
    page: Option<Page>,
    generation: u64,
    spy: ScrollSpy,
    observer: Option<BandObserver>,
    viewport_height: usize,
}

impl App {
    /// Create the viewer, optionally opening `initial_slug` straight away.
    pub fn new(initial_slug: Option<String>) -> (Self, Vec<Effect>) {
        let mut app = Self {
            listing: None,
            selected: 0,
            focus: Focus::Menu,
            page: None,
            generation: 0,
            spy: ScrollSpy::default(),
            observer: None,
            viewport_height: 1,
        };
        let mut effects = vec![Effect::FetchListing];
        if let Some(slug) = initial_slug {
            effects.push(app.open(slug));
        }
        (app, effects)
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn active_id(&self) -> Option<&str> {
        self.spy.active_id()
    }

    pub fn scroll(&self) -> usize {
        self.page.as_ref().map(|p| p.scroll).unwrap_or(0)
    }

    /// Update the document viewport height (rows) and rescan.
    pub fn set_viewport_height(&mut self, height: usize) -> Vec<Effect> {
        let height = height.max(1);
        if height == self.viewport_height {
            return Vec::new();
        }
        self.viewport_height = height;
        let max = self.max_scroll();
        if let Some(page) = self.page.as_mut() {
            page.scroll = page.scroll.min(max);
        }
        self.scan().into_iter().collect()
    }

    /// Handle one event to completion.
    pub fn handle(&mut self, event: ViewEvent) -> Vec<Effect> {
        match event {
            ViewEvent::Key(key) => self.on_key(key),
            ViewEvent::Resize => Vec::new(),
            ViewEvent::InputClosed => vec![Effect::Quit],
            ViewEvent::Listing(state) => {
                if let ListingState::Ready(docs) = &state {
                    self.selected = self.selected.min(docs.len().saturating_sub(1));
                }
                self.listing = Some(state);
                Vec::new()
            }
            ViewEvent::Loaded { generation, state } => self.on_loaded(generation, state),
            ViewEvent::Visibility {
                registration,
                batch,
            } => {
                if self.spy.observe(registration, &batch) {
                    log::debug!("[view] active={}", self.active_id().unwrap_or(""));
                }
                Vec::new()
            }
        }
    }

    /// Start loading `slug`, tearing down observation of the current page.
    fn open(&mut self, slug: String) -> Effect {
        self.spy.reset();
        self.observer = None;
        self.generation += 1;
        self.focus = Focus::Document;
        log::debug!("[view] open slug={slug} generation={}", self.generation);
        self.page = Some(Page {
            slug: slug.clone(),
            status: PageStatus::Loading,
            scroll: 0,
        });
        Effect::FetchDocument {
            generation: self.generation,
            slug,
        }
    }

    fn on_loaded(&mut self, generation: u64, state: DocumentState) -> Vec<Effect> {
        if generation != self.generation {
            log::debug!(
                "[view] drop stale load generation={generation} current={}",
                self.generation
            );
            return Vec::new();
        }
        let Some(page) = self.page.as_mut() else {
            return Vec::new();
        };
        page.scroll = 0;
        page.status = match state {
            DocumentState::Ready(doc) => {
                let line_anchors = LineAnchors::new(&doc.content);
                let rendered = render::render_document(&parse::parse(&doc.content), &line_anchors);
                let toc = toc::extract(&doc.content);
                self.observer = self.spy.attach(&toc, &rendered.spy_anchors());
                PageStatus::Ready(Box::new(LoadedDocument { doc, rendered, toc }))
            }
            DocumentState::NotFound => PageStatus::NotFound,
            DocumentState::Failed(message) => PageStatus::Failed(message),
        };
        self.scan().into_iter().collect()
    }

    fn loaded(&self) -> Option<&LoadedDocument> {
        match &self.page.as_ref()?.status {
            PageStatus::Ready(loaded) => Some(loaded),
            _ => None,
        }
    }

    fn max_scroll(&self) -> usize {
        self.loaded()
            .map(|l| l.rendered.line_count().saturating_sub(self.viewport_height))
            .unwrap_or(0)
    }

    /// Scan the band observer at the current scroll position.
    fn scan(&mut self) -> Option<Effect> {
        let scroll = self.scroll() as f64;
        let height = self.viewport_height as f64;
        let observer = self.observer.as_mut()?;
        let batch = observer.scan(scroll, height);
        if batch.is_empty() {
            return None;
        }
        Some(Effect::Visibility {
            registration: observer.registration(),
            batch,
        })
    }

    fn scroll_to(&mut self, target: usize) -> Vec<Effect> {
        let target = target.min(self.max_scroll());
        let Some(page) = self.page.as_mut() else {
            return Vec::new();
        };
        if page.scroll == target {
            return Vec::new();
        }
        page.scroll = target;
        self.scan().into_iter().collect()
    }

    /// Scroll offset that places the heading on `line` inside the active band.
    fn heading_scroll(&self, line: usize) -> usize {
        let (band_top, _) = ActiveBand::default().bounds(self.viewport_height as f64);
        line.saturating_sub(band_top.floor() as usize)
            .min(self.max_scroll())
    }

    fn heading_targets(&self) -> Vec<usize> {
        self.loaded()
            .map(|l| {
                l.rendered
                    .anchors
                    .iter()
                    .map(|a| self.heading_scroll(a.rendered_line))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn on_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if key.kind != KeyEventKind::Press {
            return Vec::new();
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') => return vec![Effect::Quit],
            KeyCode::Char('c') if ctrl => return vec![Effect::Quit],
            KeyCode::Tab => {
                if self.page.is_some() {
                    self.focus = match self.focus {
                        Focus::Menu => Focus::Document,
                        Focus::Document => Focus::Menu,
                    };
                }
                return Vec::new();
            }
            _ => {}
        }
        match self.focus {
            Focus::Menu => self.on_menu_key(key),
            Focus::Document => self.on_document_key(key, ctrl),
        }
    }

    fn on_menu_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        let docs = match &self.listing {
            Some(ListingState::Ready(docs)) => docs.as_slice(),
            _ => &[],
        };
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.selected = (self.selected + 1).min(docs.len().saturating_sub(1));
                Vec::new()
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                Vec::new()
            }
            KeyCode::Enter => match docs.get(self.selected).map(|d| d.slug.clone()) {
                Some(slug) => vec![self.open(slug)],
                None => Vec::new(),
            },
            KeyCode::Char('r') => {
                self.listing = None;
                vec![Effect::FetchListing]
            }
            _ => Vec::new(),
        }
    }

    fn on_document_key(&mut self, key: KeyEvent, ctrl: bool) -> Vec<Effect> {
        let scroll = self.scroll();
        let half = (self.viewport_height / 2).max(1);
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.scroll_to(scroll + 1),
            KeyCode::Char('k') | KeyCode::Up => self.scroll_to(scroll.saturating_sub(1)),
            KeyCode::Char('d') if ctrl => self.scroll_to(scroll + half),
            KeyCode::PageDown => self.scroll_to(scroll + half),
            KeyCode::Char('u') if ctrl => self.scroll_to(scroll.saturating_sub(half)),
            KeyCode::PageUp => self.scroll_to(scroll.saturating_sub(half)),
            KeyCode::Char('g') | KeyCode::Home => self.scroll_to(0),
            KeyCode::Char('G') | KeyCode::End => self.scroll_to(usize::MAX),
            KeyCode::Char('n') => match self.heading_targets().into_iter().find(|&t| t > scroll) {
                Some(target) => self.scroll_to(target),
                None => Vec::new(),
            },
            KeyCode::Char('p') => {
                match self.heading_targets().into_iter().rev().find(|&t| t < scroll) {
                    Some(target) => self.scroll_to(target),
                    None => Vec::new(),
                }
            }
            KeyCode::Char('r') => match self.page.as_ref().map(|p| p.slug.clone()) {
                Some(slug) => vec![self.open(slug)],
                None => Vec::new(),
            },
            KeyCode::Esc | KeyCode::Backspace => {
                self.focus = Focus::Menu;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::bordered().title(title).border_style(border)
}

fn draw_menu(frame: &mut Frame, app: &App, area: Rect) {
    let block = pane_block(" Documents ".to_owned(), app.focus == Focus::Menu);
    let docs = match &app.listing {
        None => {
            frame.render_widget(Paragraph::new("Loading…").block(block), area);
            return;
        }
        Some(ListingState::Failed(message)) => {
            let text = Span::styled(format!("Error: {message}"), Style::default().fg(Color::Red));
            frame.render_widget(
                Paragraph::new(text)
                    .wrap(Wrap { trim: true })
                    .block(block),
                area,
            );
            return;
        }
        Some(ListingState::Ready(docs)) => docs,
    };
    if docs.is_empty() {
        frame.render_widget(
            Paragraph::new(Span::styled(
                "No documents",
                Style::default().fg(Color::DarkGray),
            ))
            .block(block),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = docs
        .iter()
        .map(|d| ListItem::new(d.display_title().to_owned()))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("› ");
    let mut state = ListState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_document(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Document;
    let Some(page) = &app.page else {
        let block = pane_block(" docview ".to_owned(), focused);
        frame.render_widget(
            Paragraph::new("Select a document and press Enter.").block(block),
            area,
        );
        return;
    };
    match &page.status {
        PageStatus::Ready(loaded) => {
            let title = loaded
                .doc
                .title
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(&page.slug);
            let block = pane_block(format!(" {title} "), focused);
            let widget = Paragraph::new(loaded.rendered.text.clone())
                .block(block)
                .scroll((page.scroll.min(u16::MAX as usize) as u16, 0));
            frame.render_widget(widget, area);
        }
        PageStatus::Loading => {
            let block = pane_block(format!(" {} ", page.slug), focused);
            frame.render_widget(Paragraph::new("Loading…").block(block), area);
        }
        PageStatus::NotFound => {
            let block = pane_block(format!(" {} ", page.slug), focused);
            frame.render_widget(
                Paragraph::new("This document has no published content.").block(block),
                area,
            );
        }
        PageStatus::Failed(message) => {
            let block = pane_block(format!(" {} ", page.slug), focused);
            frame.render_widget(
                Paragraph::new(Span::styled(
                    format!("Could not load this document: {message}"),
                    Style::default().fg(Color::Red),
                ))
                .wrap(Wrap { trim: true })
                .block(block),
                area,
            );
        }
    }
}

fn draw_toc(frame: &mut Frame, app: &App, area: Rect) {
    let block = pane_block(" Contents ".to_owned(), false);
    let Some(loaded) = app.loaded() else {
        frame.render_widget(block, area);
        return;
    };
    let active = app.active_id();
    let lines: Vec<Line> = loaded
        .toc
        .iter()
        .map(|h| {
            let indent = "  ".repeat(h.level.saturating_sub(1) as usize);
            let anchored = loaded.rendered.anchors.iter().any(|a| a.id == h.id);
            if active == Some(h.id.as_str()) {
                Line::from(Span::styled(
                    format!("{indent}▸ {}", h.text),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))
            } else if anchored {
                Line::from(format!("{indent}  {}", h.text))
            } else {
                Line::from(Span::styled(
                    format!("{indent}  {}", h.text),
                    Style::default().fg(Color::DarkGray),
                ))
            }
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn status_text(app: &App) -> String {
    let keys = "[Tab] focus  [n/p] heading  [r] reload  [q] quit";
    let Some(page) = &app.page else {
        return format!("[j/k] move  [Enter] open  {keys}");
    };
    match &page.status {
        PageStatus::Loading => format!("Loading {}…", page.slug),
        PageStatus::NotFound => format!("{}: not found  {keys}", page.slug),
        PageStatus::Failed(_) => format!("{}: fetch failed  {keys}", page.slug),
        PageStatus::Ready(loaded) => {
            let total = loaded.rendered.line_count().max(1);
            let line = (page.scroll + 1).min(total);
            format!("{}  {line}/{total}  {keys}", page.slug)
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let area = frame.area();
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        frame.render_widget(
            Paragraph::new(Span::styled(
                "Terminal too small",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            area,
        );
        return;
    }

    let rows = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(area);
    let panes = Layout::horizontal([
        Constraint::Length(MENU_WIDTH),
        Constraint::Min(20),
        Constraint::Length(TOC_WIDTH),
    ])
    .split(rows[0]);

    draw_menu(frame, app, panes[0]);
    draw_document(frame, app, panes[1]);
    draw_toc(frame, app, panes[2]);
    frame.render_widget(
        Paragraph::new(status_text(app)).style(Style::default().fg(Color::Black).bg(Color::Gray)),
        rows[1],
    );
}

/// Rows available to the document text for a terminal `height`:
/// minus the status bar and the pane borders.
fn document_viewport(height: u16) -> usize {
    height.saturating_sub(3) as usize
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Forward terminal events into the queue until the receiver is gone.
fn spawn_input_reader(tx: Sender<ViewEvent>) {
    thread::spawn(move || loop {
        let ready = match event::poll(INPUT_POLL) {
            Ok(ready) => ready,
            Err(e) => {
                log::error!("[input] poll failed error={e}");
                let _ = tx.send(ViewEvent::InputClosed);
                return;
            }
        };
        if !ready {
            continue;
        }
        let forwarded = match event::read() {
            Ok(Event::Key(key)) => tx.send(ViewEvent::Key(key)),
            Ok(Event::Resize(_, _)) => tx.send(ViewEvent::Resize),
            Ok(_) => Ok(()),
            Err(e) => {
                log::error!("[input] read failed error={e}");
                let _ = tx.send(ViewEvent::InputClosed);
                return;
            }
        };
        if forwarded.is_err() {
            return;
        }
    });
}

fn spawn_listing(runtime: &Handle, source: &Arc<DocumentSource>, tx: &Sender<ViewEvent>) {
    let source = Arc::clone(source);
    let tx = tx.clone();
    runtime.spawn(async move {
        let state = ListingState::from(source.published_documents().await);
        let _ = tx.send(ViewEvent::Listing(state));
    });
}

fn spawn_document(
    runtime: &Handle,
    source: &Arc<DocumentSource>,
    tx: &Sender<ViewEvent>,
    generation: u64,
    slug: String,
) {
    let source = Arc::clone(source);
    let tx = tx.clone();
    runtime.spawn(async move {
        let state = DocumentState::from(source.document_by_slug(&slug).await);
        let _ = tx.send(ViewEvent::Loaded { generation, state });
    });
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    runtime: &Handle,
    source: &Arc<DocumentSource>,
    initial_slug: Option<String>,
) -> io::Result<()> {
    let (tx, rx) = mpsc::channel();
    spawn_input_reader(tx.clone());

    let (mut app, mut pending) = App::new(initial_slug);
    let size = terminal.size()?;
    pending.extend(app.set_viewport_height(document_viewport(size.height)));

    loop {
        for effect in pending.drain(..) {
            match effect {
                Effect::Quit => return Ok(()),
                Effect::FetchListing => spawn_listing(runtime, source, &tx),
                Effect::FetchDocument { generation, slug } => {
                    spawn_document(runtime, source, &tx, generation, slug)
                }
                Effect::Visibility {
                    registration,
                    batch,
                } => {
                    let _ = tx.send(ViewEvent::Visibility {
                        registration,
                        batch,
                    });
                }
            }
        }

        terminal.draw(|frame| ui(frame, &app))?;

        let Ok(event) = rx.recv() else {
            return Ok(());
        };
        if let ViewEvent::Resize = event {
            let size = terminal.size()?;
            pending.extend(app.set_viewport_height(document_viewport(size.height)));
        }
        pending.extend(app.handle(event));
    }
}

/// Run the terminal viewer until the user quits.
pub fn run_view(source: DocumentSource, initial_slug: Option<String>) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    log::info!("[view] source {}", source.describe());
    let source = Arc::new(source);
    let handle = runtime.handle().clone();
    ratatui::run(|terminal| event_loop(terminal, &handle, &source, initial_slug))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
