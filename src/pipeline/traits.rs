use std::path::PathBuf;

use candle_core::{Device, Tensor};
use image::DynamicImage;

use crate::config::DatasetConfig;
use crate::error::OcrError;

/// An encoder-decoder recognizer driven one token at a time.
pub trait SequenceModel: Send + Sync {
    /// Runs the image encoder once and returns the memory the decoder attends to.
    fn encode(&self, image: &Tensor) -> Result<Tensor, OcrError>;

    /// Probability distribution over the vocabulary for the token following
    /// `prefix`. The prefix starts with the start-of-sequence id.
    fn next_token_probs(&self, memory: &Tensor, prefix: &[u32]) -> Result<Vec<f32>, OcrError>;

    fn device(&self) -> &Device;

    fn device_label(&self) -> String {
        let device = self.device();
        if device.is_cuda() {
            "cuda".to_string()
        } else if device.is_metal() {
            "metal".to_string()
        } else {
            "cpu".to_string()
        }
    }
}

pub trait ImagePreprocessor: Send + Sync {
    /// Converts an image into a `(1, 3, height, width)` tensor on `device`.
    fn process(
        &self,
        image: &DynamicImage,
        dataset: &DatasetConfig,
        device: &Device,
    ) -> Result<Tensor, OcrError>;
}

pub trait WeightFetcher: Send + Sync {
    /// Resolves a remote identifier to a local file path, downloading if needed.
    fn resolve(&self, identifier: &str) -> Result<PathBuf, OcrError>;
}
