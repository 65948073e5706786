//! Error types for paper2epub operations.

use thiserror::Error;

/// Errors that can occur during PDF to EPUB conversion.
///
/// Failures from the external runtimes (libtorch, pdfium, image codecs,
/// zip) are mapped into one of these variants at the call site, with a
/// message naming what was being attempted.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load OCR model: {0}")]
    ModelLoad(String),

    #[error("PDF extraction failed: {0}")]
    PdfExtraction(String),

    #[error("Figure extraction failed: {0}")]
    FigureExtraction(String),

    #[error("EPUB creation failed: {0}")]
    EpubCreation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
