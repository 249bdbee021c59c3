use std::panic;

use axum::body::Bytes;
use lopdf::Document;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error(transparent)]
    Parse(#[from] lopdf::Error),

    /// lopdf gave up by panicking instead of returning an error.
    #[error("PDF parser aborted")]
    ParserAborted,

    #[error("PDF has no pages")]
    NoPages,

    #[error("PDF parsing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Number of pages in a PDF document held in memory.
pub fn page_count(bytes: &[u8]) -> Result<usize, PdfError> {
    match panic::catch_unwind(|| Document::load_mem(bytes)) {
        Ok(document) => match document?.get_pages().len() {
            0 => Err(PdfError::NoPages),
            pages => Ok(pages),
        },
        Err(_) => Err(PdfError::ParserAborted),
    }
}

/// [`page_count`] on the blocking pool; uploads can be large.
pub async fn count_uploaded_pages(bytes: Bytes) -> Result<usize, PdfError> {
    tokio::task::spawn_blocking(move || page_count(&bytes)).await?
}

/// Whether `file_name` carries a `.pdf` extension, in any case.
pub fn has_pdf_extension(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
}
