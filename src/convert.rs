//! The conversion façade: PDF in, EPUB out.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::ConvertOptions;
use crate::epub::{self, EpubDocument, EpubMetadata};
use crate::error::Result;
use crate::figures::{FigureExtractor, FigureMatcher};
use crate::markdown::{self, PageText};
use crate::model::OcrModel;
use crate::util;

/// Per-document output settings; anything unset is derived from the
/// input filename.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// Output EPUB path. Defaults to the input with an `.epub` extension.
    pub output: Option<PathBuf>,
    /// Book title. Defaults to the filename (or its `"Author - Title"` part).
    pub title: Option<String>,
    /// Author name. Defaults to the filename heuristic, then "Unknown".
    pub author: Option<String>,
    /// Language code for the package metadata.
    pub language: String,
}

/// Converts academic PDFs to EPUB.
///
/// Holds the OCR model across conversions so repeated calls do not pay
/// the checkpoint load each time. The model is loaded lazily on the
/// first conversion and released when a conversion completes.
///
/// # Example
///
/// ```no_run
/// use paper2epub::{Converter, ConvertOptions, OutputOptions};
///
/// let mut converter = Converter::new(ConvertOptions::new());
/// let output = converter.convert(
///     std::path::Path::new("paper.pdf"),
///     &OutputOptions::default(),
/// )?;
/// println!("wrote {}", output.display());
/// # Ok::<(), paper2epub::Error>(())
/// ```
pub struct Converter {
    options: ConvertOptions,
    model: OcrModel,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        let model = OcrModel::new(options.model, options.device, options.batch_size);
        info!(
            "Initializing converter (model: {}, device: {})",
            options.model, options.device
        );
        Self { options, model }
    }

    /// Transcribe a PDF to page-tagged markdown without assembling an
    /// EPUB. Loads the model on first use.
    pub fn extract_markdown(&mut self, pdf_path: &Path) -> Result<Vec<PageText>> {
        util::validate_pdf(pdf_path)?;
        info!("Extracting content from {}", pdf_path.display());
        self.model.transcribe_document(pdf_path)
    }

    /// Convert a PDF to an EPUB file, returning the output path.
    ///
    /// Figure extraction failures degrade to a figure-less document with
    /// a warning; every other error aborts with no partial EPUB written.
    pub fn convert(&mut self, pdf_path: &Path, output: &OutputOptions) -> Result<PathBuf> {
        util::validate_pdf(pdf_path)?;
        let output_path = util::ensure_output_path(pdf_path, output.output.as_deref(), "epub")?;

        let (derived_title, derived_author) = util::metadata_from_filename(pdf_path);
        let title = output.title.clone().unwrap_or(derived_title);
        let author = output.author.clone().unwrap_or(derived_author);
        let language = if output.language.is_empty() {
            "en".to_string()
        } else {
            output.language.clone()
        };

        info!(
            "Starting conversion: {} -> {}",
            pdf_path.display(),
            output_path.display()
        );

        let pages = self.model.transcribe_document(pdf_path)?;

        let (document_markdown, images) = if self.options.extract_figures {
            self.integrate_figures(pdf_path, &pages)
        } else {
            (markdown::join_pages(&pages), Vec::new())
        };

        if self.options.save_markdown {
            let markdown_path = pdf_path.with_extension("md");
            std::fs::write(&markdown_path, &document_markdown)?;
            info!("Saved markdown: {}", markdown_path.display());
        }

        let metadata = EpubMetadata::new(&title)
            .with_author(author)
            .with_language(language);
        let document = EpubDocument::from_markdown(&document_markdown, metadata, images);
        epub::write_epub(&document, &output_path)?;

        self.model.release();
        info!("Conversion complete: {}", output_path.display());
        Ok(output_path)
    }

    /// Release model memory without waiting for the converter to drop.
    pub fn release(&mut self) {
        self.model.release();
    }

    fn integrate_figures(
        &self,
        pdf_path: &Path,
        pages: &[PageText],
    ) -> (String, Vec<(String, Vec<u8>)>) {
        let extractor = FigureExtractor::new(self.options.figure_min_size);
        match extractor.extract(pdf_path) {
            Ok(figures) if !figures.is_empty() => {
                let (document, images) = FigureMatcher::new().insert_figures(pages, &figures);
                info!("Integrated {} figures into document", images.len());
                (document, images)
            }
            Ok(_) => (markdown::join_pages(pages), Vec::new()),
            Err(e) => {
                warn!("Figure extraction failed, continuing without figures: {e}");
                (markdown::join_pages(pages), Vec::new())
            }
        }
    }
}
