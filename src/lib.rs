//! # paper2epub
//!
//! Convert academic PDFs to EPUB with a neural transcription model that
//! preserves LaTeX math, plus embedded-figure extraction and caption
//! matching.
//!
//! ## Quick Start
//!
//! ```no_run
//! use paper2epub::{Converter, ConvertOptions, ModelSize, OutputOptions};
//!
//! let options = ConvertOptions::new()
//!     .with_model(ModelSize::Small)
//!     .with_figure_min_size(100);
//!
//! let mut converter = Converter::new(options);
//! let epub_path = converter.convert(
//!     std::path::Path::new("paper.pdf"),
//!     &OutputOptions::default(),
//! ).unwrap();
//! ```
//!
//! ## Pipeline
//!
//! A conversion runs four stages in sequence: page transcription (the
//! OCR model, loaded lazily on first use), embedded figure extraction,
//! caption matching ([`figures::FigureMatcher`]), and EPUB assembly
//! ([`epub::EpubDocument`]). The stages below the façade are public so
//! each can be used on its own.

pub mod config;
pub mod convert;
pub mod device;
pub mod epub;
pub mod error;
pub mod figures;
pub mod markdown;
pub mod model;
pub(crate) mod pdf;
pub mod util;

pub use config::{ConvertOptions, ModelSize};
pub use convert::{Converter, OutputOptions};
pub use device::DevicePreference;
pub use epub::{EpubDocument, EpubMetadata, write_epub};
pub use error::{Error, Result};
pub use figures::{ExtractedFigure, FigureExtractor, FigureMatcher};
pub use markdown::PageText;
pub use model::OcrModel;
