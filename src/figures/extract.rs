//! Embedded image extraction from PDF pages.

use std::io::Cursor;
use std::path::Path;

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pdf;

/// An image pulled out of the PDF, re-encoded as PNG.
#[derive(Debug, Clone)]
pub struct ExtractedFigure {
    /// Zero-based page the image was embedded on.
    pub page_index: usize,
    /// Position among the image objects of that page.
    pub index_on_page: usize,
    /// Object bounds in page points (left, top, right, bottom), when known.
    pub bounds: Option<(f32, f32, f32, f32)>,
    /// PNG-encoded pixel data.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Extracts figures from PDF files via pdfium page image objects.
///
/// Images smaller than the configured minimum in either dimension are
/// dropped (icons, rules, decorations). Images that fail to decode are
/// skipped with a warning rather than failing the extraction.
#[derive(Debug, Clone)]
pub struct FigureExtractor {
    min_width: u32,
    min_height: u32,
}

impl FigureExtractor {
    pub fn new(min_size: u32) -> Self {
        Self {
            min_width: min_size,
            min_height: min_size,
        }
    }

    /// Whether an image is large enough in both dimensions to keep.
    fn passes_min_size(&self, width: u32, height: u32) -> bool {
        width >= self.min_width && height >= self.min_height
    }

    /// Extract all sufficiently large embedded images, in page order.
    pub fn extract(&self, pdf_path: &Path) -> Result<Vec<ExtractedFigure>> {
        pdf::with_document(pdf_path, |document| {
            let mut figures = Vec::new();

            for (page_index, page) in document.pages().iter().enumerate() {
                let mut index_on_page = 0;
                for object in page.objects().iter() {
                    let Some(image_object) = object.as_image_object() else {
                        continue;
                    };
                    let current = index_on_page;
                    index_on_page += 1;

                    let raw = match image_object.get_raw_image() {
                        Ok(raw) => raw,
                        Err(e) => {
                            warn!(
                                "Failed to extract image {current} from page {}: {e}",
                                page_index + 1
                            );
                            continue;
                        }
                    };

                    let (width, height) = (raw.width(), raw.height());
                    if !self.passes_min_size(width, height) {
                        debug!(
                            "Skipping small image on page {}: {width}x{height}",
                            page_index + 1
                        );
                        continue;
                    }

                    let data = match encode_png(&raw) {
                        Ok(data) => data,
                        Err(e) => {
                            warn!(
                                "Failed to encode image {current} from page {}: {e}",
                                page_index + 1
                            );
                            continue;
                        }
                    };

                    let bounds = object
                        .bounds()
                        .ok()
                        .map(|b| (b.left().value, b.top().value, b.right().value, b.bottom().value));

                    debug!(
                        "Extracted image {current} from page {}: {width}x{height}",
                        page_index + 1
                    );
                    figures.push(ExtractedFigure {
                        page_index,
                        index_on_page: current,
                        bounds,
                        data,
                        width,
                        height,
                    });
                }
            }

            info!("Extracted {} figures from {}", figures.len(), pdf_path.display());
            Ok(figures)
        })
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .map_err(|e| Error::FigureExtraction(format!("PNG encoding failed: {e}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_png_roundtrips_dimensions() {
        let image = DynamicImage::new_rgb8(12, 8);
        let data = encode_png(&image).unwrap();
        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!(decoded.width(), 12);
        assert_eq!(decoded.height(), 8);
    }

    #[test]
    fn test_min_size_filter_drops_either_dimension() {
        let extractor = FigureExtractor::new(100);
        assert!(extractor.passes_min_size(100, 100));
        assert!(extractor.passes_min_size(400, 250));
        assert!(!extractor.passes_min_size(99, 400));
        assert!(!extractor.passes_min_size(400, 99));
    }
}
