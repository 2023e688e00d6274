use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::cursor;
use crossterm::event;
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use serde::Serialize;
use textlayer_core::{
    DocumentView, HighlightRect, Match, PageStatus, SearchCommand, TextFragment, TextLayerConfig,
    TextLayerEvent, TextSource, Viewport,
};
use textlayer_tty::{write_status_line, EventMapper, PageGrid, TextPainter, UiEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod loader;

use loader::{apply_outcome, render_pages, spawn_renders, RenderOutcome};

#[derive(Debug, Parser)]
#[command(
    name = "textlayer",
    version,
    about = "Searchable text layers for PDF and plain text documents"
)]
struct Args {
    /// Configuration file (defaults to textlayer.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the positioned text fragments of one page as JSON
    Layout {
        file: PathBuf,
        /// Page to lay out (1-based)
        #[arg(short = 'p', long, default_value_t = 1)]
        page: usize,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Search every page and print matches and highlights as JSON
    Search {
        file: PathBuf,
        query: String,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long)]
        whole_word: bool,
        /// Only match inside single text runs
        #[arg(long)]
        no_span: bool,
        /// Global index of the match to mark as selected (0-based)
        #[arg(long)]
        select: Option<usize>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Browse a document's text layer in the terminal
    View {
        file: PathBuf,
        /// Page to start on (1-based)
        #[arg(short = 'p', long, default_value_t = 1)]
        page: usize,
    },
}

#[derive(Debug, clap::Args)]
struct ViewArgs {
    #[arg(long)]
    scale: Option<f32>,
    /// Clockwise rotation in degrees, a multiple of 90
    #[arg(long, allow_hyphen_values = true)]
    rotation: Option<i32>,
}

impl ViewArgs {
    fn apply_to(&self, config: &mut TextLayerConfig) {
        if let Some(scale) = self.scale {
            config.view.scale = scale;
        }
        if let Some(rotation) = self.rotation {
            config.view.rotation = rotation;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "textlayer", "textlayer")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let interactive = matches!(args.command, CliCommand::View { .. });
    let _log_guard = init_logging(&project_dirs, !interactive)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join(TextLayerConfig::FILE_NAME));
    let mut config = TextLayerConfig::load(&config_path)?;
    debug!(path = %config_path.display(), "configuration loaded");

    match args.command {
        CliCommand::Layout { file, page, view } => {
            view.apply_to(&mut config);
            run_layout(&file, page, config).await
        }
        CliCommand::Search {
            file,
            query,
            case_sensitive,
            whole_word,
            no_span,
            select,
            view,
        } => {
            view.apply_to(&mut config);
            config.search.case_sensitive |= case_sensitive;
            config.search.whole_word |= whole_word;
            if no_span {
                config.search.span_fragments = false;
            }
            run_search(&file, &query, select, config).await
        }
        CliCommand::View { file, page } => run_viewer(&file, page, config).await,
    }
}

async fn open_source(path: &Path) -> Result<Arc<dyn TextSource>> {
    let provider = textlayer_render::provider_for_path(path)?;
    provider
        .open(path)
        .await
        .with_context(|| format!("failed to open {:?}", path))
}

fn open_view(source: &Arc<dyn TextSource>, config: TextLayerConfig) -> Result<DocumentView> {
    config.validate()?;
    Ok(DocumentView::new(source.info().clone(), config))
}

#[derive(Serialize)]
struct LayoutReport<'a> {
    page_number: usize,
    viewport: &'a Viewport,
    fragments: &'a [TextFragment],
}

async fn run_layout(path: &Path, page: usize, config: TextLayerConfig) -> Result<()> {
    let source = open_source(path).await?;
    let mut view = open_view(&source, config)?;
    render_pages(&mut view, &source, [page]).await?;

    let layer = view
        .text_layer(page)
        .ok_or_else(|| anyhow!("page {} has no text layer", page))?;
    let report = LayoutReport {
        page_number: page,
        viewport: &layer.viewport,
        fragments: &layer.fragments,
    };
    print_json(&report)
}

#[derive(Serialize)]
struct SearchReport<'a> {
    query: &'a str,
    total: usize,
    selected: Option<usize>,
    failed_pages: Vec<usize>,
    pages: Vec<PageReport<'a>>,
}

#[derive(Serialize)]
struct PageReport<'a> {
    page_number: usize,
    matches: &'a [Match],
    highlights: Vec<HighlightRect>,
}

async fn run_search(
    path: &Path,
    query: &str,
    select: Option<usize>,
    config: TextLayerConfig,
) -> Result<()> {
    let source = open_source(path).await?;
    let mut view = open_view(&source, config)?;
    let page_count = source.info().page_count;

    // Pages report into an already-active query as they finish.
    view.apply(
        SearchCommand::SubmitQuery {
            text: query.to_string(),
        },
        Instant::now(),
    )?;
    render_pages(&mut view, &source, 1..=page_count).await?;

    let total = view.navigator().total_count();
    if let Some(index) = select {
        if index >= total {
            bail!("cannot select match {} of {}", index, total);
        }
        if index > 0 {
            view.apply(SearchCommand::SelectNext { count: index }, Instant::now())?;
        }
    }
    info!(query, total, "search finished");

    let failed_pages = (1..=page_count)
        .filter(|page| view.page_status(*page) == PageStatus::Failed)
        .collect();
    let pages = view
        .navigator()
        .pages()
        .iter()
        .filter(|page| !page.matches.is_empty())
        .map(|page| PageReport {
            page_number: page.page_number,
            matches: &page.matches,
            highlights: view.highlights(page.page_number),
        })
        .collect();
    print_json(&SearchReport {
        query,
        total,
        selected: view.selected_index(),
        failed_pages,
        pages,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

struct Viewer {
    view: DocumentView,
    source: Arc<dyn TextSource>,
    renders: mpsc::UnboundedSender<RenderOutcome>,
    page: usize,
}

impl Viewer {
    fn follow_selection(&mut self) {
        if let Some(selected) = self.view.selected_match() {
            self.page = selected.page_number;
        }
    }

    fn change_view(&mut self, scale: f32, rotation: i32) -> Result<()> {
        let tickets = self.view.set_view(scale, rotation)?;
        spawn_renders(&self.source, tickets, &self.renders);
        Ok(())
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MIN_SCALE: f32 = 0.1;
const MAX_SCALE: f32 = 8.0;

async fn run_viewer(path: &Path, start_page: usize, config: TextLayerConfig) -> Result<()> {
    let source = open_source(path).await?;
    let view = open_view(&source, config)?;
    let page_count = source.info().page_count;
    if start_page == 0 || start_page > page_count {
        bail!("page {} out of range (document has {} pages)", start_page, page_count);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut viewer = Viewer {
        view,
        source,
        renders: tx,
        page: start_page,
    };
    let tickets = (1..=page_count)
        .map(|page| viewer.view.begin_render(page))
        .collect::<Result<Vec<_>, _>>()?;
    spawn_renders(&viewer.source, tickets, &viewer.renders);

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut painter = TextPainter::new(stdout);
    let mut mapper = EventMapper::new();
    let mut dirty = true;

    loop {
        if drain_renders(&mut viewer.view, &mut rx) {
            dirty = true;
        }
        if viewer.view.tick(Instant::now())? {
            viewer.follow_selection();
            dirty = true;
        }
        if consume_events(&viewer.view, viewer.page) {
            dirty = true;
        }

        if dirty {
            redraw(&mut painter, &viewer, mapper.pending_input().as_deref())?;
            dirty = false;
        }

        let timeout = viewer
            .view
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .map_or(POLL_INTERVAL, |remaining| remaining.min(POLL_INTERVAL));
        if event::poll(timeout)? {
            let ui_event = mapper.map_event(event::read()?);
            match handle_event(ui_event, &mut viewer)? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {
                    let status = format_status(&viewer, mapper.pending_input().as_deref());
                    draw_status_line(&mut painter, &status)?;
                }
                LoopAction::Quit => break,
            }
        }
    }

    painter.clear_all()?;
    Ok(())
}

fn drain_renders(view: &mut DocumentView, rx: &mut UnboundedReceiver<RenderOutcome>) -> bool {
    let mut changed = false;
    while let Ok(outcome) = rx.try_recv() {
        changed |= apply_outcome(view, outcome);
    }
    changed
}

/// Drains the view's event queue. Returns whether the shown page is stale.
fn consume_events(view: &DocumentView, page: usize) -> bool {
    let mut stale = false;
    for event in view.drain_events() {
        match event {
            TextLayerEvent::MatchesUpdated { page_number, .. } => stale |= page_number == page,
            TextLayerEvent::SelectionChanged { .. } => stale = true,
            TextLayerEvent::PageFailed {
                page_number,
                message,
            } => {
                debug!(page = page_number, %message, "page has no text layer");
                stale |= page_number == page;
            }
            TextLayerEvent::RenderDiscarded { page_number } => {
                debug!(page = page_number, "render discarded");
            }
        }
    }
    stale
}

fn handle_event(event: UiEvent, viewer: &mut Viewer) -> Result<LoopAction> {
    match event {
        UiEvent::None | UiEvent::BeginSearch => Ok(LoopAction::Continue),
        UiEvent::Search(command) => {
            let follow = matches!(
                command,
                SearchCommand::SubmitQuery { .. }
                    | SearchCommand::SelectNext { .. }
                    | SearchCommand::SelectPrev { .. }
            );
            viewer.view.apply(command, Instant::now())?;
            if follow {
                viewer.follow_selection();
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Scroll { delta } => {
            let page_count = viewer.view.info().page_count;
            let target = viewer.page.saturating_add_signed(delta).clamp(1, page_count);
            if target == viewer.page {
                return Ok(LoopAction::Continue);
            }
            viewer.page = target;
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Zoom { factor } => {
            let (scale, rotation) = viewer.view.view();
            let scale = (scale * factor).clamp(MIN_SCALE, MAX_SCALE);
            viewer.change_view(scale, rotation)?;
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Rotate { degrees } => {
            let (scale, rotation) = viewer.view.view();
            viewer.change_view(scale, (rotation + degrees).rem_euclid(360))?;
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Quit => Ok(LoopAction::Quit),
    }
}

fn redraw(
    painter: &mut TextPainter<io::Stdout>,
    viewer: &Viewer,
    pending_input: Option<&str>,
) -> Result<()> {
    let (columns, rows) = terminal::size()?;
    let grid = PageGrid::clamped(columns, rows.saturating_sub(1));
    let page = viewer.page;

    painter.begin_sync_update()?;
    crossterm::queue!(painter.writer(), Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    match (viewer.view.text_layer(page), viewer.view.page_status(page)) {
        (Some(layer), _) => {
            let texts = viewer.view.highlighted_text(page);
            painter.paint_page(layer, &texts, grid, 0)?;
        }
        (None, PageStatus::Failed) => {
            crossterm::queue!(painter.writer(), Print("text layer unavailable for this page"))?
        }
        (None, _) => crossterm::queue!(painter.writer(), Print("loading text layer..."))?,
    }
    draw_status_line(painter, &format_status(viewer, pending_input))?;
    painter.end_sync_update()?;
    Ok(())
}

fn draw_status_line(painter: &mut TextPainter<io::Stdout>, status: &str) -> Result<()> {
    let (_, rows) = terminal::size()?;
    let status_row = rows.max(1) - 1;
    let writer = painter.writer();
    crossterm::execute!(
        writer,
        cursor::MoveTo(0, status_row),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(writer, status)?;
    Ok(())
}

fn format_status(viewer: &Viewer, pending_input: Option<&str>) -> String {
    combine_status(Some(format_document_status(viewer)), pending_input).unwrap_or_default()
}

fn combine_status(base: Option<String>, pending_input: Option<&str>) -> Option<String> {
    match (base, pending_input.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(pending)) => {
            base.push_str(" | ");
            base.push_str(pending);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(pending)) => Some(pending.to_string()),
        (None, None) => None,
    }
}

fn format_document_status(viewer: &Viewer) -> String {
    let view = &viewer.view;
    let (scale, rotation) = view.view();
    let zoom_percent = scale * 100.0;
    let zoom_display = if zoom_percent.is_finite() {
        format!("{:.0}%", zoom_percent)
    } else {
        "-".to_string()
    };

    let mut status = format!(
        "{} | page {}/{} | {}",
        view.info()
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("<unknown>"),
        viewer.page,
        view.info().page_count,
        zoom_display
    );
    if rotation != 0 {
        status.push_str(&format!(" | {}deg", rotation));
    }

    if let Some(summary) = view.search_summary() {
        status.push_str(" | ");
        status.push_str(&summary.to_string());
        status.push_str(&format_option_flags(view));
    }

    status
}

fn format_option_flags(view: &DocumentView) -> String {
    let options = view.query().options;
    let mut flags = String::new();
    if options.case_sensitive {
        flags.push_str(" [Aa]");
    }
    if options.whole_word {
        flags.push_str(" [word]");
    }
    if !options.span_fragments {
        flags.push_str(" [no-span]");
    }
    flags
}

fn init_logging(project_dirs: &ProjectDirs, console: bool) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "textlayer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout carries JSON reports; the terminal viewer owns the screen.
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
