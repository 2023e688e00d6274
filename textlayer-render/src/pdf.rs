use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use textlayer_core::{DocumentInfo, Matrix, PageTextContent, TextRun, TextSource, TextSourceProvider};
use tracing::{debug, instrument, warn};

pub struct PdfiumTextProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumTextProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl TextSourceProvider for PdfiumTextProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn TextSource>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let source = PdfiumTextSource::open(Arc::clone(&self.pdfium), absolute)?;
        Ok(Arc::new(source))
    }
}

struct PdfiumTextSource {
    // Declared before `pdfium` so the document is dropped first.
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    info: DocumentInfo,
}

impl PdfiumTextSource {
    fn open(pdfium: Arc<Pdfium>, path: PathBuf) -> Result<Self> {
        let document = load_document(&pdfium, &path)?;
        let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
        debug!(path = %path.display(), page_count, "opened pdf");
        let info = DocumentInfo {
            path: path.clone(),
            page_count,
        };
        Ok(Self {
            document: Mutex::new(Some(document)),
            pdfium,
            path,
            info,
        })
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(load_document(&self.pdfium, &self.path)?);
        }
        match guard.as_ref() {
            Some(document) => f(document),
            None => Err(anyhow!("document {:?} is not loaded", self.path)),
        }
    }
}

fn load_document(pdfium: &Pdfium, path: &Path) -> Result<PdfDocument<'static>> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    // SAFETY: the document borrows the bindings behind the `Arc<Pdfium>` kept in the
    // same `PdfiumTextSource`. Fields drop in declaration order and `document` is
    // declared first, so the bindings outlive every cached document.
    let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
    Ok(document)
}

impl TextSource for PdfiumTextSource {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self))]
    fn text_content(&self, page_number: usize) -> Result<PageTextContent> {
        let page_index = page_number
            .checked_sub(1)
            .ok_or_else(|| anyhow!("page numbers start at 1"))?;
        self.with_document(|document| {
            let index: PdfPageIndex = page_index
                .try_into()
                .map_err(|_| anyhow!("page {} is out of supported range", page_number))?;
            let page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page_number))?;
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_number))?;

            let view_box = [0.0, 0.0, page.width().value, page.height().value];
            let mut runs = Vec::new();
            for segment in text.segments().iter() {
                let content = segment.text();
                if content.trim().is_empty() {
                    continue;
                }
                let bounds = segment.bounds();
                let left = bounds.left().value;
                let bottom = bounds.bottom().value;
                let width = bounds.right().value - left;
                let height = bounds.top().value - bottom;
                if !height.is_finite() || height <= 0.0 {
                    warn!(page = page_number, "skipping text segment with empty bounds");
                    continue;
                }
                // Segment boxes become unit-height runs scaled by the box height.
                let transform = Matrix::new(height, 0.0, 0.0, height, left, bottom);
                runs.push(TextRun::new(content, transform).with_size(Some(width / height), None));
            }
            debug!(page = page_number, runs = runs.len(), "extracted text runs");
            Ok(PageTextContent { view_box, runs })
        })
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match std::env::var("TEXTLAYER_PDFIUM_LIBRARY_PATH") {
        Ok(path) if !path.is_empty() => {
            let library = Pdfium::pdfium_platform_library_name_at_path(&path);
            match Pdfium::bind_to_library(&library) {
                Ok(bindings) => Some(Pdfium::new(bindings)),
                Err(err) => {
                    warn!("failed to load Pdfium from {}: {}", library.display(), err);
                    None
                }
            }
        }
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set TEXTLAYER_PDFIUM_LIBRARY_PATH ({})",
                errors.join(", ")
            ))
        }
    }
}
