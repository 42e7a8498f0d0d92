use std::path::Path;

use serde::Deserialize;

use crate::error::OcrError;

/// Top-level predictor configuration, deserialized from JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Compute placement selector: `cpu`, `cuda`, `cuda:N` or `metal`.
    pub device: String,
    /// Local checkpoint path or `http(s)://` URL resolved through a weight fetcher.
    pub weights: String,
    /// Character set; each char becomes one token after the reserved specials.
    pub vocab: String,
    pub max_seq_length: usize,
    pub dataset: DatasetConfig,
    pub predictor: PredictorConfig,
    pub model: ModelConfig,
}

impl OcrConfig {
    pub const DEFAULT_MAX_SEQ_LENGTH: usize = 128;

    pub fn from_path(path: &Path) -> Result<Self, OcrError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| OcrError::io("read config file", e))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, OcrError> {
        let config: Self =
            serde_json::from_str(data).map_err(|e| OcrError::json("parse config file", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OcrError> {
        if self.vocab.is_empty() {
            return Err(OcrError::config("vocab must contain at least one character"));
        }
        if self.max_seq_length == 0 {
            return Err(OcrError::config("max_seq_length must be >= 1"));
        }
        self.dataset.validate()?;
        if self.predictor.beam_width == 0 {
            return Err(OcrError::config("predictor.beam_width must be >= 1"));
        }
        self.model.validate()
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            weights: String::new(),
            vocab: String::new(),
            max_seq_length: Self::DEFAULT_MAX_SEQ_LENGTH,
            dataset: DatasetConfig::default(),
            predictor: PredictorConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub image_height: u32,
    pub image_min_width: u32,
    pub image_max_width: u32,
    pub is_padding: bool,
}

impl DatasetConfig {
    fn validate(&self) -> Result<(), OcrError> {
        if self.image_height == 0 {
            return Err(OcrError::config("dataset.image_height must be >= 1"));
        }
        if self.image_min_width == 0 || self.image_min_width > self.image_max_width {
            return Err(OcrError::config(format!(
                "dataset.image_min_width ({}) must be in 1..=image_max_width ({})",
                self.image_min_width, self.image_max_width
            )));
        }
        Ok(())
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            image_height: 32,
            image_min_width: 32,
            image_max_width: 512,
            is_padding: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub beamsearch: bool,
    pub beam_width: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            beamsearch: false,
            beam_width: 4,
        }
    }
}

/// Shape of the bundled CNN + transformer recognizer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Output channels of each 3x3 conv block in the backbone.
    pub cnn_channels: Vec<usize>,
    /// Average-pool (kernel == stride) applied after each conv block, as (height, width).
    pub cnn_pool: Vec<(usize, usize)>,
    pub d_model: usize,
    pub nhead: usize,
    pub num_encoder_layers: usize,
    pub num_decoder_layers: usize,
    pub dim_feedforward: usize,
    pub layer_norm_eps: f64,
}

impl ModelConfig {
    fn validate(&self) -> Result<(), OcrError> {
        if self.cnn_channels.is_empty() {
            return Err(OcrError::config("model.cnn_channels must not be empty"));
        }
        if self.cnn_channels.len() != self.cnn_pool.len() {
            return Err(OcrError::config(format!(
                "model.cnn_pool has {} entries but model.cnn_channels has {}",
                self.cnn_pool.len(),
                self.cnn_channels.len()
            )));
        }
        if self.nhead == 0 || self.d_model % self.nhead != 0 {
            return Err(OcrError::config(format!(
                "model.d_model ({}) must be divisible by model.nhead ({})",
                self.d_model, self.nhead
            )));
        }
        if self.cnn_pool.iter().any(|&(h, w)| h == 0 || w == 0) {
            return Err(OcrError::config("model.cnn_pool entries must be >= 1"));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cnn_channels: vec![64, 128, 256, 256, 512],
            cnn_pool: vec![(2, 2), (2, 2), (2, 1), (2, 1), (1, 1)],
            d_model: 256,
            nhead: 8,
            num_encoder_layers: 6,
            num_decoder_layers: 6,
            dim_feedforward: 2048,
            layer_norm_eps: 1e-5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_config_default() {
        let config = OcrConfig::default();
        assert_eq!(config.device, "cpu");
        assert!(config.weights.is_empty());
        assert_eq!(config.max_seq_length, OcrConfig::DEFAULT_MAX_SEQ_LENGTH);
        assert_eq!(config.dataset.image_height, 32);
        assert!(!config.predictor.beamsearch);
        assert_eq!(config.predictor.beam_width, 4);
    }

    #[test]
    fn from_json_fills_missing_sections_with_defaults() {
        let json = r#"{
            "weights": "weights/transformer.safetensors",
            "vocab": "abc",
            "predictor": { "beamsearch": true }
        }"#;
        let config = OcrConfig::from_json(json).expect("valid config json");
        assert!(config.predictor.beamsearch);
        assert_eq!(config.predictor.beam_width, 4);
        assert_eq!(config.dataset, DatasetConfig::default());
        assert_eq!(config.model.d_model, 256);
    }

    #[test]
    fn from_json_rejects_empty_vocab() {
        let err = OcrConfig::from_json(r#"{ "vocab": "" }"#).unwrap_err();
        assert!(matches!(err, OcrError::Config { .. }));
    }

    #[test]
    fn from_json_rejects_inverted_width_bounds() {
        let json = r#"{
            "vocab": "abc",
            "dataset": { "image_min_width": 600, "image_max_width": 512 }
        }"#;
        let err = OcrConfig::from_json(json).unwrap_err();
        assert!(err.to_string().contains("image_min_width"));
    }

    #[test]
    fn from_json_rejects_mismatched_pool_schedule() {
        let json = r#"{
            "vocab": "abc",
            "model": { "cnn_channels": [8, 16], "cnn_pool": [[2, 2]] }
        }"#;
        let err = OcrConfig::from_json(json).unwrap_err();
        assert!(matches!(err, OcrError::Config { .. }));
    }

    #[test]
    fn from_json_reports_malformed_json() {
        let err = OcrConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, OcrError::Json { .. }));
    }
}
