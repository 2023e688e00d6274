use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use textlayer_core::{
    DocumentInfo, Matrix, PageTextContent, TextDirection, TextRun, TextSource, TextSourceProvider,
};
use tracing::debug;

/// US Letter, in points.
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const FONT_SIZE: f32 = 12.0;
const LEADING: f32 = 14.4;
const FONT_NAME: &str = "monospace";

/// Lays plain text files out as pages of fixed-pitch lines.
///
/// Form feeds force a page break; long pages overflow onto the next one.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextProvider;

impl PlainTextProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextSourceProvider for PlainTextProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn TextSource>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let text = fs::read_to_string(&absolute)
            .with_context(|| format!("failed to read {:?}", absolute))?;
        let pages = paginate(&text);
        debug!(path = %absolute.display(), pages = pages.len(), "opened text file");
        Ok(Arc::new(PlainTextSource {
            info: DocumentInfo {
                path: absolute,
                page_count: pages.len(),
            },
            pages,
        }))
    }
}

struct PlainTextSource {
    info: DocumentInfo,
    pages: Vec<PageTextContent>,
}

impl TextSource for PlainTextSource {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn text_content(&self, page_number: usize) -> Result<PageTextContent> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .cloned()
            .ok_or_else(|| anyhow!("page {} out of range", page_number))
    }
}

fn lines_per_page() -> usize {
    ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING).floor() as usize
}

fn paginate(text: &str) -> Vec<PageTextContent> {
    let per_page = lines_per_page();
    let mut pages = Vec::new();
    for sheet in text.split('\x0c') {
        let lines: Vec<&str> = sheet.lines().collect();
        if lines.is_empty() {
            pages.push(layout_page(&[]));
            continue;
        }
        pages.extend(lines.chunks(per_page).map(layout_page));
    }
    pages
}

fn layout_page(lines: &[&str]) -> PageTextContent {
    let first_baseline = PAGE_HEIGHT - MARGIN - FONT_SIZE;
    let runs = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(row, line)| {
            let y = first_baseline - row as f32 * LEADING;
            let transform = Matrix::new(FONT_SIZE, 0.0, 0.0, FONT_SIZE, MARGIN, y);
            TextRun::new(line.trim_end(), transform)
                .with_font(FONT_NAME)
                .with_direction(TextDirection::Ltr)
        })
        .collect();
    PageTextContent {
        view_box: [0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT],
        runs,
    }
}
