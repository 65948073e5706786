//! PDF access and page rasterization via pdfium.

use std::path::Path;

use image::{DynamicImage, RgbImage};
use pdfium_render::prelude::*;

use crate::error::{Error, Result};

/// Rendering resolution for model input. Academic PDFs rasterized below
/// ~150 DPI lose subscript and superscript legibility.
pub const RENDER_DPI: u16 = 168;

/// Bind pdfium, open `path`, and run `f` against the document.
///
/// The pdfium handle cannot outlive the binding, so callers work inside a
/// closure rather than holding the document.
pub(crate) fn with_document<T>(
    path: &Path,
    f: impl FnOnce(&PdfDocument<'_>) -> Result<T>,
) -> Result<T> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| Error::PdfExtraction(format!("failed to bind pdfium library: {e}")))?;
    let pdfium = Pdfium::new(bindings);
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| Error::PdfExtraction(format!("failed to open {}: {e}", path.display())))?;
    f(&document)
}

/// Number of pages in the PDF.
pub fn page_count(path: &Path) -> Result<usize> {
    with_document(path, |document| Ok(document.pages().len() as usize))
}

/// Render a single page to an RGB bitmap at `target_dpi`.
///
/// Target pixel dimensions follow the page's paper size so aspect ratio
/// is preserved.
pub(crate) fn rasterize_page(page: &PdfPage<'_>, target_dpi: u16) -> Result<RgbImage> {
    let width_inches = page.paper_size().width().to_inches();
    let width_pixels = (width_inches * f32::from(target_dpi)) as i32;

    let height_inches = page.paper_size().height().to_inches();
    let height_pixels = (height_inches * f32::from(target_dpi)) as i32;

    let render_config = PdfRenderConfig::new()
        .set_target_width(width_pixels)
        .set_target_height(height_pixels);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| Error::PdfExtraction(format!("page rasterization failed: {e}")))?;
    let dynamic: DynamicImage = bitmap.as_image();
    Ok(dynamic.into_rgb8())
}

/// Rasterize every page, invoking `on_page` with each bitmap in order.
///
/// A page that fails to render is skipped with a warning; callers observe
/// the gap through the page index. Errors returned by `on_page` abort.
pub(crate) fn rasterize_pages(
    path: &Path,
    target_dpi: u16,
    mut on_page: impl FnMut(usize, RgbImage) -> Result<()>,
) -> Result<()> {
    with_document(path, |document| {
        for (index, page) in document.pages().iter().enumerate() {
            match rasterize_page(&page, target_dpi) {
                Ok(bitmap) => on_page(index, bitmap)?,
                Err(e) => tracing::warn!("Skipping page {} (failed to render): {e}", index + 1),
            }
        }
        Ok(())
    })
}
