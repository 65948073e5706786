//! Figure extraction and caption matching.

mod extract;
mod matcher;

pub use extract::{ExtractedFigure, FigureExtractor};
pub use matcher::{Anchor, CaptionRef, FigureMatcher, MatchedFigure};
