//! EPUB document assembly and serialization.

mod writer;

pub use writer::{write_epub, write_epub_to_writer};

use tracing::{info, warn};

use crate::markdown;

/// Document metadata (Dublin Core subset).
#[derive(Debug, Clone, Default)]
pub struct EpubMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
    pub identifier: String,
}

impl EpubMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }
}

/// A content section: one XHTML file in the reading order.
#[derive(Debug, Clone)]
pub struct EpubSection {
    pub title: String,
    /// Unique slug; also the XHTML file stem.
    pub slug: String,
    /// Rendered XHTML body fragment.
    pub body: String,
}

/// An embedded image resource.
#[derive(Debug, Clone)]
pub struct EpubImage {
    /// File name under `images/`.
    pub name: String,
    pub data: Vec<u8>,
    pub media_type: &'static str,
}

/// The assembled document, built once per conversion and then serialized.
#[derive(Debug, Clone, Default)]
pub struct EpubDocument {
    pub metadata: EpubMetadata,
    pub sections: Vec<EpubSection>,
    pub images: Vec<EpubImage>,
}

impl EpubDocument {
    /// Assemble a document from final markdown and embedded images.
    ///
    /// The markdown is split into sections at top-level headings and
    /// rendered to XHTML. Images whose bytes do not decode are skipped
    /// with a warning; the document is still produced.
    pub fn from_markdown(
        markdown_content: &str,
        metadata: EpubMetadata,
        images: Vec<(String, Vec<u8>)>,
    ) -> Self {
        let sections = markdown::split_sections(markdown_content, &metadata.title)
            .into_iter()
            .map(|section| EpubSection {
                body: markdown::render_xhtml_body(&section.markdown),
                title: section.title,
                slug: section.slug,
            })
            .collect();

        let mut embedded = Vec::with_capacity(images.len());
        for (name, data) in images {
            if let Err(e) = image::load_from_memory(&data) {
                warn!("Skipping malformed image '{name}': {e}");
                continue;
            }
            let media_type = image_media_type(&name, &data);
            embedded.push(EpubImage {
                name,
                data,
                media_type,
            });
        }

        if !embedded.is_empty() {
            info!("Embedding {} images", embedded.len());
        }

        Self {
            metadata,
            sections,
            images: embedded,
        }
    }
}

/// MIME type for an embedded image, by extension then magic bytes.
/// Figures are re-encoded as PNG upstream, so PNG is the default.
fn image_media_type(name: &str, data: &[u8]) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        return "image/jpeg";
    }
    if lower.ends_with(".png") {
        return "image/png";
    }
    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
        return "image/jpeg";
    }
    "image/png"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = image::DynamicImage::new_rgb8(4, 4);
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_from_markdown_builds_sections() {
        let document = EpubDocument::from_markdown(
            "Intro text.\n\n# Methods\n\nBody.",
            EpubMetadata::new("Paper"),
            Vec::new(),
        );
        assert_eq!(document.sections.len(), 2);
        assert_eq!(document.sections[0].title, "Paper");
        assert_eq!(document.sections[1].slug, "methods");
        assert!(document.sections[1].body.contains("<h1"));
    }

    #[test]
    fn test_malformed_image_skipped() {
        let document = EpubDocument::from_markdown(
            "# A\n\ntext",
            EpubMetadata::new("Paper"),
            vec![
                ("figure_001.png".to_string(), png_bytes()),
                ("figure_002.png".to_string(), b"not an image".to_vec()),
            ],
        );
        assert_eq!(document.images.len(), 1);
        assert_eq!(document.images[0].name, "figure_001.png");
    }

    #[test]
    fn test_image_media_type() {
        assert_eq!(image_media_type("f.png", &[]), "image/png");
        assert_eq!(image_media_type("f.jpeg", &[]), "image/jpeg");
        assert_eq!(image_media_type("f", &[0xFF, 0xD8, 0xFF]), "image/jpeg");
        assert_eq!(image_media_type("f", &[]), "image/png");
    }
}
