//! Caption matching and figure placement.
//!
//! Figures are numbered sequentially across the document in extraction
//! order. Each figure is anchored at its caption when the page text
//! contains a matching marker, at the end of its page's text when it does
//! not, and at the document end when the page produced no text at all.
//! Matching is pure: the same figures and pages always yield the same
//! anchors.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::figures::ExtractedFigure;
use crate::markdown::PageText;

/// Caption markers the transcription model emits: "Figure 3", "Fig. 3",
/// and bracketed variants, case-insensitive.
static CAPTION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:figure|fig\.)\s*(\d+)").unwrap());

/// A caption marker found in a page's markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionRef {
    /// The number in the marker text.
    pub number: u32,
    /// Byte offset of the marker within the page markdown.
    pub offset: usize,
}

/// Where a figure lands in the linear document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// After the line containing the caption marker.
    Caption { page: usize, offset: usize },
    /// At the end of the page's text (no usable marker).
    PageEnd { page: usize },
    /// Appended after all content (the page produced no text).
    DocumentEnd,
}

/// A figure with its assigned anchor and output name.
#[derive(Debug, Clone)]
pub struct MatchedFigure {
    pub figure: ExtractedFigure,
    /// Document-wide sequential number, 1-based.
    pub number: u32,
    /// File name inside the EPUB `images/` directory.
    pub filename: String,
    pub anchor: Anchor,
}

/// Matches extracted figures against caption references in page text.
#[derive(Debug, Clone, Default)]
pub struct FigureMatcher;

impl FigureMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Find caption markers in markdown, ordered and deduplicated by offset.
    pub fn find_caption_refs(markdown: &str) -> Vec<CaptionRef> {
        let mut refs: Vec<CaptionRef> = CAPTION_MARKER
            .captures_iter(markdown)
            .filter_map(|caps| {
                let number = caps[1].parse().ok()?;
                Some(CaptionRef {
                    number,
                    offset: caps.get(0).unwrap().start(),
                })
            })
            .collect();
        refs.sort_by_key(|r| r.offset);
        refs.dedup_by_key(|r| r.offset);
        refs
    }

    /// Assign an anchor to every figure.
    ///
    /// Figures arrive in extraction order (page, then position on page)
    /// and keep that order throughout; two figures resolving to the same
    /// caption stay in extraction order.
    pub fn match_figures(
        &self,
        figures: &[ExtractedFigure],
        pages: &[PageText],
    ) -> Vec<MatchedFigure> {
        // Offsets of non-number-matched refs already claimed, per page.
        let mut consumed: Vec<(usize, usize)> = Vec::new();

        figures
            .iter()
            .enumerate()
            .map(|(i, figure)| {
                let number = (i + 1) as u32;
                let anchor = self.anchor_for(figure, number, pages, &mut consumed);
                debug!(
                    "Figure {number} (page {}): {anchor:?}",
                    figure.page_index + 1
                );
                MatchedFigure {
                    figure: figure.clone(),
                    number,
                    filename: format!("figure_{number:03}.png"),
                    anchor,
                }
            })
            .collect()
    }

    fn anchor_for(
        &self,
        figure: &ExtractedFigure,
        number: u32,
        pages: &[PageText],
        consumed: &mut Vec<(usize, usize)>,
    ) -> Anchor {
        let Some(page) = pages.iter().find(|p| p.page_index == figure.page_index) else {
            return Anchor::DocumentEnd;
        };

        let refs = Self::find_caption_refs(&page.markdown);

        // A marker carrying this figure's own number wins outright.
        if let Some(r) = refs.iter().find(|r| r.number == number) {
            return Anchor::Caption {
                page: page.page_index,
                offset: line_end(&page.markdown, r.offset),
            };
        }

        // Otherwise take the first marker on the page nobody has claimed.
        if let Some(r) = refs
            .iter()
            .find(|r| !consumed.contains(&(page.page_index, r.offset)))
        {
            consumed.push((page.page_index, r.offset));
            return Anchor::Caption {
                page: page.page_index,
                offset: line_end(&page.markdown, r.offset),
            };
        }

        Anchor::PageEnd {
            page: page.page_index,
        }
    }

    /// Splice matched figures into the page markdown and collect the
    /// image files to embed.
    ///
    /// Returns the final document markdown and `(filename, bytes)` pairs
    /// in figure order. Figures with no page text are appended under a
    /// trailing "Figures" heading.
    pub fn insert_figures(
        &self,
        pages: &[PageText],
        figures: &[ExtractedFigure],
    ) -> (String, Vec<(String, Vec<u8>)>) {
        let matched = self.match_figures(figures, pages);
        let images: Vec<(String, Vec<u8>)> = matched
            .iter()
            .map(|m| (m.filename.clone(), m.figure.data.clone()))
            .collect();

        let mut rewritten: Vec<PageText> = Vec::with_capacity(pages.len());
        for page in pages {
            // (offset, block) insertions for this page; end-of-page uses
            // the page length so it sorts after every caption anchor.
            let mut insertions: Vec<(usize, String)> = Vec::new();
            for m in &matched {
                match m.anchor {
                    Anchor::Caption { page: p, offset } if p == page.page_index => {
                        insertions.push((offset, image_block(m)));
                    }
                    Anchor::PageEnd { page: p } if p == page.page_index => {
                        insertions.push((page.markdown.len(), image_block(m)));
                    }
                    _ => {}
                }
            }
            rewritten.push(PageText::new(
                page.page_index,
                splice(&page.markdown, insertions),
            ));
        }

        let mut document = crate::markdown::join_pages(&rewritten);

        let orphans: Vec<&MatchedFigure> = matched
            .iter()
            .filter(|m| m.anchor == Anchor::DocumentEnd)
            .collect();
        if !orphans.is_empty() {
            document.push_str("\n\n## Figures\n");
            for m in orphans {
                document.push('\n');
                document.push_str(&image_block(m));
            }
        }

        (document, images)
    }
}

fn image_block(m: &MatchedFigure) -> String {
    format!("![Figure {}](images/{})", m.number, m.filename)
}

/// Byte offset just past the line containing `offset`.
fn line_end(text: &str, offset: usize) -> usize {
    text[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(text.len())
}

/// Insert blocks at byte offsets, preserving the order of blocks that
/// share an offset.
fn splice(text: &str, mut insertions: Vec<(usize, String)>) -> String {
    if insertions.is_empty() {
        return text.to_string();
    }
    insertions.sort_by_key(|(offset, _)| *offset);

    let mut out = String::with_capacity(text.len() + insertions.len() * 48);
    let mut cursor = 0;
    for (offset, block) in insertions {
        let offset = offset.min(text.len());
        out.push_str(&text[cursor..offset]);
        out.push_str("\n\n");
        out.push_str(&block);
        out.push('\n');
        cursor = offset;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figure_on_page(page_index: usize, index_on_page: usize) -> ExtractedFigure {
        ExtractedFigure {
            page_index,
            index_on_page,
            bounds: None,
            data: vec![0u8; 4],
            width: 200,
            height: 200,
        }
    }

    #[test]
    fn test_find_caption_refs() {
        let refs =
            FigureMatcher::find_caption_refs("See Figure 2 and also fig. 10 in the appendix.");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].number, 2);
        assert_eq!(refs[1].number, 10);
        assert!(refs[0].offset < refs[1].offset);
    }

    #[test]
    fn test_number_match_wins() {
        let pages = vec![PageText::new(0, "Intro.\nFigure 1: a cat.\nMore text.")];
        let figures = vec![figure_on_page(0, 0)];
        let matched = FigureMatcher::new().match_figures(&figures, &pages);
        assert!(matches!(matched[0].anchor, Anchor::Caption { page: 0, .. }));
    }

    #[test]
    fn test_no_marker_anchors_page_end() {
        let pages = vec![PageText::new(0, "No markers here at all.")];
        let figures = vec![figure_on_page(0, 0)];
        let matched = FigureMatcher::new().match_figures(&figures, &pages);
        assert_eq!(matched[0].anchor, Anchor::PageEnd { page: 0 });
    }

    #[test]
    fn test_missing_page_anchors_document_end() {
        let pages = vec![PageText::new(0, "Only page zero has text.")];
        let figures = vec![figure_on_page(3, 0)];
        let matched = FigureMatcher::new().match_figures(&figures, &pages);
        assert_eq!(matched[0].anchor, Anchor::DocumentEnd);
    }

    #[test]
    fn test_shared_caption_keeps_extraction_order() {
        // Both figures resolve to the single marker on the page; insertion
        // must keep them in extraction order at the same anchor.
        let pages = vec![PageText::new(0, "Figure 1: results.\nTail.")];
        let figures = vec![figure_on_page(0, 0), figure_on_page(0, 1)];
        let matcher = FigureMatcher::new();
        let (document, images) = matcher.insert_figures(&pages, &figures);
        assert_eq!(images[0].0, "figure_001.png");
        assert_eq!(images[1].0, "figure_002.png");
        let first = document.find("figure_001.png").unwrap();
        let second = document.find("figure_002.png").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_matching_is_idempotent() {
        let pages = vec![
            PageText::new(0, "Figure 1: one.\nBody."),
            PageText::new(1, "No caption."),
        ];
        let figures = vec![figure_on_page(0, 0), figure_on_page(1, 0), figure_on_page(5, 0)];
        let matcher = FigureMatcher::new();
        let first = matcher.match_figures(&figures, &pages);
        let second = matcher.match_figures(&figures, &pages);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.anchor, b.anchor);
            assert_eq!(a.filename, b.filename);
        }
    }

    #[test]
    fn test_insert_after_caption_line() {
        let pages = vec![PageText::new(0, "Figure 1: results.\nNext paragraph.")];
        let figures = vec![figure_on_page(0, 0)];
        let (document, _) = FigureMatcher::new().insert_figures(&pages, &figures);
        let caption = document.find("Figure 1: results.").unwrap();
        let image = document.find("![Figure 1]").unwrap();
        let next = document.find("Next paragraph.").unwrap();
        assert!(caption < image);
        assert!(image < next);
    }

    #[test]
    fn test_orphans_append_under_figures_heading() {
        let pages = vec![PageText::new(0, "Body.")];
        let figures = vec![figure_on_page(7, 0)];
        let (document, images) = FigureMatcher::new().insert_figures(&pages, &figures);
        assert!(document.contains("## Figures"));
        assert!(document.ends_with("![Figure 1](images/figure_001.png)"));
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn test_splice_preserves_order_at_same_offset() {
        let spliced = splice(
            "abc",
            vec![(3, "first".to_string()), (3, "second".to_string())],
        );
        let first = spliced.find("first").unwrap();
        let second = spliced.find("second").unwrap();
        assert!(first < second);
    }
}
