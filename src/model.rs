//! OCR model lifecycle and page transcription.
//!
//! The transcription model ships as a TorchScript archive whose
//! `generate` method maps a batch of prepared page tensors to decoded
//! markdown, one string per page. The model is an explicitly owned
//! resource: nothing is loaded until the first transcription, and
//! [`OcrModel::release`] frees the weights (GPU or CPU) once a
//! conversion is done.

use std::path::{Path, PathBuf};

use image::RgbImage;
use image::imageops::FilterType;
use tch::{CModule, Device, IValue, Tensor};
use tracing::{debug, info, warn};

use crate::config::ModelSize;
use crate::device::DevicePreference;
use crate::error::{Error, Result};
use crate::markdown::PageText;
use crate::pdf;

/// Environment variable overriding the checkpoint directory.
pub const MODEL_DIR_ENV: &str = "PAPER2EPUB_MODEL_DIR";

/// Model input dimensions (width x height), fixed by the checkpoint.
const INPUT_WIDTH: u32 = 672;
const INPUT_HEIGHT: u32 = 896;

/// ImageNet channel statistics used to normalize model input.
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Lazily loaded transcription model.
pub struct OcrModel {
    size: ModelSize,
    preference: DevicePreference,
    batch_size: usize,
    module: Option<CModule>,
    device: Device,
}

impl OcrModel {
    pub fn new(size: ModelSize, preference: DevicePreference, batch_size: usize) -> Self {
        Self {
            size,
            preference,
            batch_size: batch_size.max(1),
            module: None,
            device: Device::Cpu,
        }
    }

    /// Whether the checkpoint is currently resident.
    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }

    /// Directory searched for checkpoints: the `PAPER2EPUB_MODEL_DIR`
    /// environment variable when set, otherwise the user cache dir.
    pub fn model_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(MODEL_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("paper2epub")
    }

    /// Full path of the checkpoint for this model size.
    pub fn checkpoint_path(&self) -> PathBuf {
        Self::model_dir().join(self.size.checkpoint_name())
    }

    /// Load the checkpoint if it is not already resident.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.module.is_some() {
            return Ok(());
        }

        let path = self.checkpoint_path();
        if !path.exists() {
            return Err(Error::ModelLoad(format!(
                "checkpoint not found at {}; download the '{}' model or set {}",
                path.display(),
                self.size.tag(),
                MODEL_DIR_ENV
            )));
        }

        self.device = self.preference.resolve();
        info!(
            "Loading '{}' model on {:?} from {}",
            self.size,
            self.device,
            path.display()
        );

        let mut module = CModule::load_on_device(&path, self.device)
            .map_err(|e| Error::ModelLoad(format!("{}: {e}", path.display())))?;
        module.set_eval();
        self.module = Some(module);
        info!("Model '{}' loaded successfully", self.size.tag());
        Ok(())
    }

    /// Release model memory. Safe to call repeatedly; the next
    /// transcription reloads the checkpoint.
    pub fn release(&mut self) {
        if self.module.take().is_some() {
            debug!("Released model memory on {:?}", self.device);
        }
    }

    /// Transcribe every page of a PDF to markdown.
    ///
    /// Pages are rasterized at [`pdf::RENDER_DPI`], normalized, and run
    /// through the model in batches. A page that fails to render or
    /// transcribe is logged and skipped; the document fails only when no
    /// page produced any text.
    pub fn transcribe_document(&mut self, pdf_path: &Path) -> Result<Vec<PageText>> {
        self.ensure_loaded()?;
        let module = self
            .module
            .as_ref()
            .ok_or_else(|| Error::ModelLoad("model not resident after load".to_string()))?;
        let device = self.device;
        let batch_size = self.batch_size;
        let total = pdf::page_count(pdf_path)?;

        let mut pages: Vec<PageText> = Vec::new();
        let mut pending: Vec<(usize, Tensor)> = Vec::new();

        pdf::rasterize_pages(pdf_path, pdf::RENDER_DPI, |index, bitmap| {
            pending.push((index, prepare_input(&bitmap)));
            if pending.len() >= batch_size {
                transcribe_batch(module, device, &mut pending, &mut pages);
                info!("Processed page {}/{total}", index + 1);
            }
            Ok(())
        })?;
        transcribe_batch(module, device, &mut pending, &mut pages);

        if pages.iter().all(|p| p.markdown.trim().is_empty()) {
            return Err(Error::PdfExtraction(format!(
                "no content extracted from {}",
                pdf_path.display()
            )));
        }
        pages.retain(|p| !p.markdown.trim().is_empty());
        Ok(pages)
    }
}

/// Scale a page bitmap to the model input size and normalize it into a
/// CHW float tensor with ImageNet statistics.
fn prepare_input(bitmap: &RgbImage) -> Tensor {
    let resized = image::imageops::resize(bitmap, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);

    let (width, height) = (INPUT_WIDTH as usize, INPUT_HEIGHT as usize);
    let mut buffer = vec![0f32; 3 * width * height];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for channel in 0..3 {
            let value = f32::from(pixel.0[channel]) / 255.0;
            buffer[channel * width * height + y * width + x] =
                (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
        }
    }

    Tensor::from_slice(&buffer).view([3, INPUT_HEIGHT as i64, INPUT_WIDTH as i64])
}

/// Run one batch through the model, draining `pending` into `pages`.
///
/// Inference failures drop the whole batch with a warning; blank
/// predictions drop their page.
fn transcribe_batch(
    module: &CModule,
    device: Device,
    pending: &mut Vec<(usize, Tensor)>,
    pages: &mut Vec<PageText>,
) {
    if pending.is_empty() {
        return;
    }
    let batch: Vec<(usize, Tensor)> = std::mem::take(pending);
    let indices: Vec<usize> = batch.iter().map(|(i, _)| *i).collect();
    let tensors: Vec<Tensor> = batch.into_iter().map(|(_, t)| t).collect();

    let stacked = Tensor::stack(&tensors, 0).to_device(device);
    let output = tch::no_grad(|| module.method_is("generate", &[IValue::Tensor(stacked)]));

    let predictions = match output.map(decode_predictions) {
        Ok(Ok(predictions)) => predictions,
        Ok(Err(e)) | Err(e) => {
            let first = indices.first().map(|i| i + 1).unwrap_or(0);
            let last = indices.last().map(|i| i + 1).unwrap_or(0);
            warn!("Failed to transcribe pages {first}-{last}: {e}");
            return;
        }
    };

    for (index, markdown) in indices.into_iter().zip(predictions) {
        if markdown.trim().is_empty() {
            warn!("Page {} produced no text", index + 1);
            continue;
        }
        pages.push(PageText::new(index, markdown));
    }
}

/// Pull the per-page strings out of the model output.
fn decode_predictions(output: IValue) -> std::result::Result<Vec<String>, tch::TchError> {
    match output {
        IValue::String(s) => Ok(vec![s]),
        IValue::StringList(list) => Ok(list),
        IValue::GenericList(items) => items
            .into_iter()
            .map(|item| match item {
                IValue::String(s) => Ok(s),
                other => Err(tch::TchError::Kind(format!(
                    "expected string prediction, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(tch::TchError::Kind(format!(
            "unexpected model output: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_path_uses_model_name() {
        let model = OcrModel::new(ModelSize::Base, DevicePreference::Cpu, 1);
        let path = model.checkpoint_path();
        assert!(path.ends_with("nougat-0.1.0-base.pt"));
    }

    #[test]
    fn test_release_before_load_is_noop() {
        let mut model = OcrModel::new(ModelSize::Small, DevicePreference::Cpu, 1);
        assert!(!model.is_loaded());
        model.release();
        assert!(!model.is_loaded());
    }

    #[test]
    fn test_missing_checkpoint_is_model_load_error() {
        let mut model = OcrModel::new(ModelSize::Small, DevicePreference::Cpu, 1);
        if model.checkpoint_path().exists() {
            return;
        }
        match model.ensure_loaded() {
            Err(Error::ModelLoad(message)) => assert!(message.contains("0.1.0-small")),
            other => panic!("expected ModelLoad error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_predictions_variants() {
        let one = decode_predictions(IValue::String("# Title".to_string())).unwrap();
        assert_eq!(one, vec!["# Title"]);

        let many = decode_predictions(IValue::StringList(vec![
            "a".to_string(),
            "b".to_string(),
        ]))
        .unwrap();
        assert_eq!(many.len(), 2);

        assert!(decode_predictions(IValue::Int(3)).is_err());
    }
}
