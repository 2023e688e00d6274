use std::io::{self, Write};

use anyhow::Result;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use textlayer_core::{HighlightedText, SearchCommand, SegmentKind, TextLayer, Viewport};
use tracing::debug;

/// Terminal cells available for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGrid {
    pub columns: u16,
    pub rows: u16,
}

impl PageGrid {
    pub fn clamped(columns: u16, rows: u16) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Maps a screen-space point of `viewport` to a cell.
    pub fn cell_for(&self, viewport: &Viewport, x: f32, y: f32) -> (u16, u16) {
        let column = scale_to_cells(x, viewport.width, self.columns);
        let row = scale_to_cells(y, viewport.height, self.rows);
        (column, row)
    }
}

fn scale_to_cells(value: f32, extent: f32, cells: u16) -> u16 {
    if !extent.is_finite() || extent <= 0.0 || !value.is_finite() {
        return 0;
    }
    let cell = (value / extent * f32::from(cells)).floor();
    cell.clamp(0.0, f32::from(cells.saturating_sub(1))) as u16
}

/// Paints a page's text layer as positioned terminal text.
pub struct TextPainter<W: Write> {
    writer: W,
}

impl<W: Write> TextPainter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Draws each fragment at its cell, styling highlighted segments. Text
    /// running past the right edge is cut.
    pub fn paint_page(
        &mut self,
        layer: &TextLayer,
        texts: &[HighlightedText],
        grid: PageGrid,
        origin_row: u16,
    ) -> Result<()> {
        for text in texts {
            let Some(fragment) = layer.fragments.get(text.fragment_index) else {
                continue;
            };
            let (column, row) = grid.cell_for(&layer.viewport, fragment.x, fragment.y);
            let mut room = usize::from(grid.columns - column);
            crossterm::queue!(self.writer, cursor::MoveTo(column, origin_row + row))?;
            for segment in &text.segments {
                if room == 0 {
                    break;
                }
                let visible: String = segment.text.chars().take(room).collect();
                room -= visible.chars().count();
                self.paint_segment(&visible, segment.kind)?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    fn paint_segment(&mut self, text: &str, kind: SegmentKind) -> Result<()> {
        match kind {
            SegmentKind::Plain => crossterm::queue!(self.writer, Print(text))?,
            SegmentKind::Highlighted => crossterm::queue!(
                self.writer,
                SetBackgroundColor(Color::Yellow),
                SetForegroundColor(Color::Black),
                Print(text),
                ResetColor
            )?,
            SegmentKind::Selected => crossterm::queue!(
                self.writer,
                SetAttribute(Attribute::Reverse),
                SetAttribute(Attribute::Bold),
                Print(text),
                SetAttribute(Attribute::Reset)
            )?,
        }
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update; the terminal shows the buffered frame at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Search(SearchCommand),
    BeginSearch,
    Scroll { delta: isize },
    Zoom { factor: f32 },
    Rotate { degrees: i32 },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    search_buffer: String,
}

impl EventMapper {
    const ZOOM_STEP: f32 = 1.25;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            debug!(from = ?self.mode, to = ?mode, "input mode changed");
            self.reset_count();
            self.mode = mode;
            if matches!(self.mode, InputMode::Search) {
                self.search_buffer.clear();
            }
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Search => self.map_event_search(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Search);
                UiEvent::BeginSearch
            }
            (KeyCode::Char('n'), KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Search(SearchCommand::SelectNext { count })
            }
            (KeyCode::Char('N'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                let count = self.take_count();
                UiEvent::Search(SearchCommand::SelectPrev { count })
            }
            (KeyCode::Char('c'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Search(SearchCommand::ToggleCaseSensitive)
            }
            (KeyCode::Char('w'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Search(SearchCommand::ToggleWholeWord)
            }
            (KeyCode::Char('s'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Search(SearchCommand::ToggleSpanFragments)
            }
            (KeyCode::Esc, _) => {
                self.reset_count();
                UiEvent::Search(SearchCommand::ClearSearch)
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Scroll {
                    delta: count as isize,
                }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Scroll {
                    delta: -(count as isize),
                }
            }
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::Zoom {
                    factor: Self::ZOOM_STEP,
                }
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Zoom {
                    factor: 1.0 / Self::ZOOM_STEP,
                }
            }
            (KeyCode::Char('r'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Rotate { degrees: 90 }
            }
            (KeyCode::Char('R'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                self.reset_count();
                UiEvent::Rotate { degrees: -90 }
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_search(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::Search(SearchCommand::ClearSearch)
            }
            (KeyCode::Enter, _) => {
                let text = std::mem::take(&mut self.search_buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::Search(SearchCommand::SubmitQuery { text })
            }
            (KeyCode::Backspace, _) => {
                self.search_buffer.pop();
                UiEvent::Search(SearchCommand::SetQuery {
                    text: self.search_buffer.clone(),
                })
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.search_buffer.push(c);
                UiEvent::Search(SearchCommand::SetQuery {
                    text: self.search_buffer.clone(),
                })
            }
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if matches!(self.mode, InputMode::Search) {
            return Some(format!("/{}", self.search_buffer));
        }
        (!self.pending_digits.is_empty()).then(|| self.pending_digits.clone())
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
