//! Conversion options and model selection.

use crate::device::DevicePreference;

/// OCR model size.
///
/// The small model is roughly 4x faster; the base model transcribes dense
/// math and multi-column layouts more reliably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelSize {
    #[default]
    Small,
    Base,
}

impl ModelSize {
    /// Checkpoint tag, matching the published model versions.
    pub fn tag(self) -> &'static str {
        match self {
            ModelSize::Small => "0.1.0-small",
            ModelSize::Base => "0.1.0-base",
        }
    }

    /// File name of the TorchScript checkpoint for this size.
    pub fn checkpoint_name(self) -> String {
        format!("nougat-{}.pt", self.tag())
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSize::Small => write!(f, "small"),
            ModelSize::Base => write!(f, "base"),
        }
    }
}

/// Options controlling a conversion run.
///
/// # Example
///
/// ```
/// use paper2epub::{ConvertOptions, ModelSize};
///
/// let options = ConvertOptions::new()
///     .with_model(ModelSize::Base)
///     .with_batch_size(4)
///     .with_figure_min_size(150);
/// assert_eq!(options.figure_min_size, 150);
/// ```
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Which OCR model checkpoint to load.
    pub model: ModelSize,
    /// Requested inference device; `Auto` probes hardware at load time.
    pub device: DevicePreference,
    /// Number of page tensors stacked per model call.
    pub batch_size: usize,
    /// Whether to extract embedded figures from the PDF.
    pub extract_figures: bool,
    /// Minimum figure dimension in pixels; smaller images are dropped.
    pub figure_min_size: u32,
    /// Write the intermediate markdown next to the input PDF.
    pub save_markdown: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            model: ModelSize::Small,
            device: DevicePreference::Auto,
            batch_size: 1,
            extract_figures: true,
            figure_min_size: 100,
            save_markdown: false,
        }
    }
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: ModelSize) -> Self {
        self.model = model;
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    /// Batch size is clamped to at least one page per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_figures(mut self, extract_figures: bool) -> Self {
        self.extract_figures = extract_figures;
        self
    }

    pub fn with_figure_min_size(mut self, min_size: u32) -> Self {
        self.figure_min_size = min_size;
        self
    }

    pub fn with_save_markdown(mut self, save_markdown: bool) -> Self {
        self.save_markdown = save_markdown;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_tags() {
        assert_eq!(ModelSize::Small.tag(), "0.1.0-small");
        assert_eq!(ModelSize::Base.tag(), "0.1.0-base");
        assert_eq!(ModelSize::Small.checkpoint_name(), "nougat-0.1.0-small.pt");
    }

    #[test]
    fn test_default_options() {
        let options = ConvertOptions::default();
        assert_eq!(options.model, ModelSize::Small);
        assert_eq!(options.batch_size, 1);
        assert!(options.extract_figures);
        assert_eq!(options.figure_min_size, 100);
        assert!(!options.save_markdown);
    }

    #[test]
    fn test_batch_size_clamped() {
        let options = ConvertOptions::new().with_batch_size(0);
        assert_eq!(options.batch_size, 1);
    }
}
