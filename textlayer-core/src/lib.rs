use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

pub mod config;
pub mod debounce;
pub mod error;
pub mod geometry;
pub mod highlight;
pub mod layout;
pub mod navigator;
pub mod search;
pub mod tracking;

pub use config::TextLayerConfig;
pub use debounce::QueryDebounce;
pub use error::TextLayerError;
pub use geometry::{project, GlyphPlacement, Matrix, Viewport};
pub use highlight::{HighlightRect, HighlightedText, SegmentKind, TextSegment};
pub use layout::{TextDirection, TextFragment, TextLayer, TextPosition, TextRun};
pub use navigator::SearchNavigator;
pub use search::{Match, Matcher, SearchOptions};
pub use tracking::{RenderTicket, RenderToken, RenderTracker};

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PageTextContent {
    /// `[x0, y0, x1, y1]` in page space.
    pub view_box: [f32; 4],
    pub runs: Vec<TextRun>,
}

pub trait TextSource: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn text_content(&self, page_number: usize) -> Result<PageTextContent>;
}

#[async_trait::async_trait]
pub trait TextSourceProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn TextSource>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCommand {
    /// Edited query text; debounced.
    SetQuery { text: String },
    /// Confirmed query text; applied immediately.
    SubmitQuery { text: String },
    ToggleCaseSensitive,
    ToggleWholeWord,
    ToggleSpanFragments,
    SelectNext { count: usize },
    SelectPrev { count: usize },
    ClearSearch,
}

#[derive(Debug, Clone)]
pub enum TextLayerEvent {
    MatchesUpdated {
        page_number: usize,
        matches: Vec<Match>,
    },
    SelectionChanged {
        global_index: Option<usize>,
    },
    PageFailed {
        page_number: usize,
        message: String,
    },
    RenderDiscarded {
        page_number: usize,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageStatus {
    #[default]
    Idle,
    Rendering,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub options: SearchOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSummary {
    pub query: String,
    pub total: usize,
    pub current_index: Option<usize>,
    /// Some pages are still being rendered or matched.
    pub partial: bool,
}

impl fmt::Display for SearchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.query)?;
        match (self.total, self.current_index) {
            (0, _) if self.partial => write!(f, " (searching)"),
            (0, _) => write!(f, " (no matches)"),
            (total, Some(index)) => write!(f, " ({}/{})", index + 1, total),
            (total, None) => write!(f, " (0/{})", total),
        }?;
        if self.partial && self.total > 0 {
            write!(f, "+")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SelectedMatch<'a> {
    pub global_index: usize,
    pub page_number: usize,
    pub in_page_index: usize,
    pub found: &'a Match,
}

#[derive(Debug, Default)]
struct PageState {
    status: PageStatus,
    tracker: RenderTracker,
    layer: Option<TextLayer>,
}

/// All mutation happens on the owner's thread. Page text arrives through
/// [`begin_render`](Self::begin_render) / [`complete_render`](Self::complete_render)
/// pairs that may interleave across pages and finish in any order.
pub struct DocumentView {
    info: DocumentInfo,
    config: TextLayerConfig,
    scale: f32,
    rotation: i32,
    pages: BTreeMap<usize, PageState>,
    navigator: SearchNavigator,
    query: SearchQuery,
    matcher: Option<Matcher>,
    debounce: QueryDebounce,
    selected: Option<usize>,
    events: Arc<Mutex<Vec<TextLayerEvent>>>,
}

impl DocumentView {
    pub fn new(info: DocumentInfo, config: TextLayerConfig) -> Self {
        let query = SearchQuery {
            text: String::new(),
            options: config.search_options(),
        };
        Self {
            scale: config.view.scale,
            rotation: config.view.rotation.rem_euclid(360),
            debounce: QueryDebounce::new(config.debounce()),
            info,
            config,
            pages: BTreeMap::new(),
            navigator: SearchNavigator::new(),
            query,
            matcher: None,
            selected: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn navigator(&self) -> &SearchNavigator {
        &self.navigator
    }

    pub fn drain_events(&self) -> Vec<TextLayerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn view(&self) -> (f32, i32) {
        (self.scale, self.rotation)
    }

    pub fn page_status(&self, page_number: usize) -> PageStatus {
        self.pages
            .get(&page_number)
            .map(|page| page.status)
            .unwrap_or_default()
    }

    pub fn text_layer(&self, page_number: usize) -> Option<&TextLayer> {
        self.pages.get(&page_number)?.layer.as_ref()
    }

    pub fn page_matches(&self, page_number: usize) -> &[Match] {
        self.navigator.page_matches(page_number)
    }

    pub fn is_settled(&self) -> bool {
        !self.debounce.is_pending()
            && self
                .pages
                .values()
                .all(|page| page.status != PageStatus::Rendering)
    }

    fn check_page(&self, page_number: usize) -> Result<(), TextLayerError> {
        if page_number == 0 || page_number > self.info.page_count {
            return Err(TextLayerError::PageOutOfRange {
                page: page_number,
                page_count: self.info.page_count,
            });
        }
        Ok(())
    }

    /// The page's previous fragments are discarded immediately. Its matches
    /// stay in the navigator until the new pass reports, so the global index
    /// does not collapse while a page re-renders.
    pub fn begin_render(&mut self, page_number: usize) -> Result<RenderTicket, TextLayerError> {
        self.check_page(page_number)?;
        let page = self.pages.entry(page_number).or_default();
        let token = page.tracker.start();
        page.layer = None;
        page.status = PageStatus::Rendering;
        Ok(RenderTicket {
            page_number,
            scale: self.scale,
            rotation: self.rotation,
            token,
        })
    }

    pub fn set_view(
        &mut self,
        scale: f32,
        rotation: i32,
    ) -> Result<Vec<RenderTicket>, TextLayerError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(TextLayerError::InvalidScale(scale));
        }
        let rotation = i32::from(geometry::normalize_rotation(rotation)?);
        if (self.scale - scale).abs() < f32::EPSILON && self.rotation == rotation {
            return Ok(Vec::new());
        }
        self.scale = scale;
        self.rotation = rotation;
        let requested: Vec<usize> = self.pages.keys().copied().collect();
        requested
            .into_iter()
            .map(|page_number| self.begin_render(page_number))
            .collect()
    }

    /// Applies the text of a finished render pass.
    ///
    /// Returns `Ok(false)` when the ticket was superseded or cancelled. A
    /// malformed page fails on its own; other pages are unaffected.
    #[instrument(skip(self, content), fields(page = ticket.page_number))]
    pub fn complete_render(
        &mut self,
        ticket: &RenderTicket,
        content: PageTextContent,
    ) -> Result<bool, TextLayerError> {
        let page_number = ticket.page_number;
        let accepted = self
            .pages
            .get_mut(&page_number)
            .is_some_and(|page| page.tracker.finish(&ticket.token));
        if !accepted {
            debug!(
                generation = ticket.token.generation(),
                "discarding superseded render"
            );
            self.emit(TextLayerEvent::RenderDiscarded { page_number });
            return Ok(false);
        }

        let built = Viewport::new(content.view_box, ticket.scale, ticket.rotation).and_then(
            |viewport| {
                TextLayer::build(
                    page_number,
                    &content.runs,
                    viewport,
                    self.config.layout.char_width_ratio,
                )
            },
        );
        match built {
            Ok(layer) => {
                debug!(fragments = layer.fragments.len(), "text layer built");
                if let Some(page) = self.pages.get_mut(&page_number) {
                    page.layer = Some(layer);
                    page.status = PageStatus::Ready;
                }
                self.match_page(page_number);
                self.reconcile_selection();
                Ok(true)
            }
            Err(err) => {
                self.mark_failed(page_number, err.to_string());
                Err(err)
            }
        }
    }

    pub fn fail_render(&mut self, ticket: &RenderTicket, message: impl Into<String>) -> bool {
        let accepted = self
            .pages
            .get_mut(&ticket.page_number)
            .is_some_and(|page| page.tracker.finish(&ticket.token));
        if accepted {
            self.mark_failed(ticket.page_number, message.into());
        }
        accepted
    }

    fn mark_failed(&mut self, page_number: usize, message: String) {
        warn!(page = page_number, %message, "text layer failed");
        if let Some(page) = self.pages.get_mut(&page_number) {
            page.status = PageStatus::Failed;
            page.layer = None;
        }
        self.navigator.remove_page(page_number);
        self.emit(TextLayerEvent::PageFailed {
            page_number,
            message,
        });
        self.reconcile_selection();
    }

    #[instrument(skip(self))]
    pub fn apply(&mut self, command: SearchCommand, now: Instant) -> Result<(), TextLayerError> {
        match command {
            SearchCommand::SetQuery { text } => {
                if self.debounce.delay().is_zero() {
                    self.set_query_now(text)?;
                } else {
                    self.debounce.push(text, now);
                }
            }
            SearchCommand::SubmitQuery { text } => {
                self.debounce.cancel();
                self.set_query_now(text)?;
            }
            SearchCommand::ToggleCaseSensitive => {
                self.flush_pending_query();
                self.query.options.case_sensitive = !self.query.options.case_sensitive;
                self.rematch_all()?;
            }
            SearchCommand::ToggleWholeWord => {
                self.flush_pending_query();
                self.query.options.whole_word = !self.query.options.whole_word;
                self.rematch_all()?;
            }
            SearchCommand::ToggleSpanFragments => {
                self.flush_pending_query();
                self.query.options.span_fragments = !self.query.options.span_fragments;
                self.rematch_all()?;
            }
            SearchCommand::SelectNext { count } => {
                if let Some(text) = self.debounce.flush() {
                    self.set_query_now(text)?;
                }
                self.step_selection(count, true);
            }
            SearchCommand::SelectPrev { count } => {
                if let Some(text) = self.debounce.flush() {
                    self.set_query_now(text)?;
                }
                self.step_selection(count, false);
            }
            SearchCommand::ClearSearch => {
                self.debounce.cancel();
                self.set_query_now(String::new())?;
            }
        }
        Ok(())
    }

    /// Applies a debounced query edit once its quiet period is over. Returns
    /// whether pages were re-matched.
    pub fn tick(&mut self, now: Instant) -> Result<bool, TextLayerError> {
        match self.debounce.poll(now) {
            Some(text) => {
                self.set_query_now(text)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    fn flush_pending_query(&mut self) {
        if let Some(text) = self.debounce.flush() {
            self.query.text = text;
        }
    }

    fn set_query_now(&mut self, text: String) -> Result<(), TextLayerError> {
        self.query.text = text;
        self.rematch_all()
    }

    fn rematch_all(&mut self) -> Result<(), TextLayerError> {
        self.matcher = Matcher::new(&self.query.text, self.query.options)?;
        self.navigator.clear();
        let ready: Vec<usize> = self
            .pages
            .iter()
            .filter(|(_, page)| page.layer.is_some())
            .map(|(page_number, _)| *page_number)
            .collect();
        for page_number in ready {
            self.match_page(page_number);
        }
        debug!(
            query = %self.query.text,
            total = self.navigator.total_count(),
            "document re-matched"
        );
        self.selected = (self.navigator.total_count() > 0).then_some(0);
        self.emit(TextLayerEvent::SelectionChanged {
            global_index: self.selected,
        });
        Ok(())
    }

    fn match_page(&mut self, page_number: usize) {
        let layer = self
            .pages
            .get(&page_number)
            .and_then(|page| page.layer.as_ref());
        let matches = match (&self.matcher, layer) {
            (Some(matcher), Some(layer)) => matcher.find(page_number, &layer.fragments),
            _ => Vec::new(),
        };
        self.navigator
            .report_page_matches(page_number, matches.clone());
        self.emit(TextLayerEvent::MatchesUpdated {
            page_number,
            matches,
        });
    }

    /// Keeps the cursor inside `[0, total)` as pages report late.
    fn reconcile_selection(&mut self) {
        let total = self.navigator.total_count();
        let next = match self.selected {
            _ if total == 0 => None,
            None => Some(0),
            Some(index) => Some(index.min(total - 1)),
        };
        if next != self.selected {
            self.selected = next;
            self.emit(TextLayerEvent::SelectionChanged {
                global_index: next,
            });
        }
    }

    fn step_selection(&mut self, count: usize, forward: bool) {
        let total = self.navigator.total_count();
        if total == 0 {
            return;
        }
        let mut index = match self.selected {
            Some(index) => index,
            // One step from nothing lands on the first or last match.
            None if forward => total - 1,
            None => 0,
        };
        let steps = match count.max(1) % total {
            0 => total,
            steps => steps,
        };
        for _ in 0..steps {
            let stepped = if forward {
                self.navigator.next(index)
            } else {
                self.navigator.prev(index)
            };
            index = stepped.unwrap_or(index);
        }
        self.selected = Some(index);
        self.emit(TextLayerEvent::SelectionChanged {
            global_index: self.selected,
        });
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_match(&self) -> Option<SelectedMatch<'_>> {
        let global_index = self.selected?;
        let (page_number, in_page_index) = self.navigator.resolve(global_index).ok()?;
        let found = self.navigator.page_matches(page_number).get(in_page_index)?;
        Some(SelectedMatch {
            global_index,
            page_number,
            in_page_index,
            found,
        })
    }

    pub fn resolve_current_match_index(
        &self,
        page_number: usize,
        in_page_index: usize,
    ) -> Option<usize> {
        self.navigator.global_index_of(page_number, in_page_index)
    }

    /// In-page index of the selected match if it lives on `page_number`.
    pub fn selected_in_page(&self, page_number: usize) -> Option<usize> {
        let (page, in_page) = self.navigator.resolve(self.selected?).ok()?;
        (page == page_number).then_some(in_page)
    }

    pub fn highlights(&self, page_number: usize) -> Vec<HighlightRect> {
        let Some(layer) = self.text_layer(page_number) else {
            return Vec::new();
        };
        highlight::highlight_page(
            &layer.fragments,
            self.page_matches(page_number),
            self.selected_in_page(page_number),
        )
    }

    pub fn highlighted_text(&self, page_number: usize) -> Vec<HighlightedText> {
        let Some(layer) = self.text_layer(page_number) else {
            return Vec::new();
        };
        let rects = self.highlights(page_number);
        layer
            .fragments
            .iter()
            .map(|fragment| HighlightedText::from_rects(fragment, &rects))
            .collect()
    }

    pub fn search_summary(&self) -> Option<SearchSummary> {
        if self.query.text.trim().is_empty() {
            return None;
        }
        Some(SearchSummary {
            query: self.query.text.clone(),
            total: self.navigator.total_count(),
            current_index: self.selected,
            partial: !self.is_settled(),
        })
    }

    fn emit(&self, event: TextLayerEvent) {
        self.events.lock().push(event);
    }
}
