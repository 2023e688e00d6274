use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextLayerError {
    #[error("text run {run} has a malformed transform {matrix:?}")]
    MalformedTransform { run: usize, matrix: [f32; 6] },

    #[error("match index {index} out of range (total {total})")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i32),

    #[error("scale must be finite and positive, got {0}")]
    InvalidScale(f32),

    #[error("character width ratio must be finite and positive, got {0}")]
    InvalidCharWidthRatio(f32),

    #[error("failed to compile search pattern")]
    Pattern(#[from] regex::Error),
}
