//! Text sources for the text layer: PDF pages through pdfium, and plain text
//! files laid out as fixed-pitch pages.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use textlayer_core::TextSourceProvider;

#[cfg(feature = "pdf")]
mod pdf;
mod plain;

#[cfg(feature = "pdf")]
pub use pdf::PdfiumTextProvider;
pub use plain::PlainTextProvider;

/// Picks a provider from the file extension. PDF support binds pdfium on
/// first use.
pub fn provider_for_path(path: &Path) -> Result<Arc<dyn TextSourceProvider>> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        return pdf_provider();
    }
    Ok(Arc::new(PlainTextProvider::new()))
}

#[cfg(feature = "pdf")]
fn pdf_provider() -> Result<Arc<dyn TextSourceProvider>> {
    Ok(Arc::new(PdfiumTextProvider::new()?))
}

#[cfg(not(feature = "pdf"))]
fn pdf_provider() -> Result<Arc<dyn TextSourceProvider>> {
    anyhow::bail!("PDF support is disabled; rebuild with the `pdf` feature")
}
