use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use crate::config::ModelConfig;
use crate::error::OcrError;
use crate::model::checkpoint::{build_from_checkpoint, Checkpoint};
use crate::model::seq2seq::OcrTransformer;
use crate::pipeline::traits::SequenceModel;

/// Maps a device selector (`cpu`, `cuda`, `cuda:N`, `metal`) to a candle device.
pub(crate) fn parse_device(selector: &str) -> Result<Device, OcrError> {
    let init = |kind: &str, result: candle_core::Result<Device>| {
        result.map_err(|e| OcrError::config(format!("cannot initialise {kind} device: {e}")))
    };
    match selector.trim() {
        "" | "cpu" => Ok(Device::Cpu),
        "cuda" => init("cuda", Device::new_cuda(0)),
        "metal" => init("metal", Device::new_metal(0)),
        other => match other.strip_prefix("cuda:") {
            Some(ordinal) => {
                let ordinal: usize = ordinal.parse().map_err(|_| {
                    OcrError::config(format!("invalid cuda ordinal in device '{other}'"))
                })?;
                init("cuda", Device::new_cuda(ordinal))
            }
            None => Err(OcrError::config(format!(
                "unknown device '{other}'; expected cpu, cuda, cuda:N or metal"
            ))),
        },
    }
}

pub(crate) struct CandleSequenceModel {
    model: OcrTransformer,
    device: Device,
}

impl CandleSequenceModel {
    pub(crate) fn load(
        weights: &Path,
        model_cfg: &ModelConfig,
        vocab_size: usize,
        device: Device,
    ) -> Result<Self, OcrError> {
        let checkpoint = Checkpoint::load(weights, &device)?;
        let model = build_from_checkpoint(checkpoint, |tensors| {
            let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
            OcrTransformer::load(model_cfg, vocab_size, vb)
        })?;

        tracing::info!(
            d_model = model_cfg.d_model,
            encoder_layers = model_cfg.num_encoder_layers,
            decoder_layers = model_cfg.num_decoder_layers,
            vocab = vocab_size,
            weights = %weights.display(),
            ?device,
            "OCR transformer loaded"
        );

        Ok(Self { model, device })
    }
}

impl SequenceModel for CandleSequenceModel {
    fn encode(&self, image: &Tensor) -> Result<Tensor, OcrError> {
        self.model
            .encode(image)
            .map_err(|e| OcrError::inference("encoder forward", e))
    }

    fn next_token_probs(&self, memory: &Tensor, prefix: &[u32]) -> Result<Vec<f32>, OcrError> {
        self.model
            .next_token_probs(memory, prefix, &self.device)
            .map_err(|e| OcrError::inference("decoder step", e))
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_device_accepts_cpu_aliases() {
        assert!(parse_device("cpu").unwrap().is_cpu());
        assert!(parse_device("").unwrap().is_cpu());
    }

    #[test]
    fn parse_device_rejects_unknown_selectors() {
        assert!(matches!(parse_device("tpu"), Err(OcrError::Config { .. })));
        assert!(matches!(parse_device("cuda:x"), Err(OcrError::Config { .. })));
    }

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            cnn_channels: vec![4],
            cnn_pool: vec![(2, 2)],
            d_model: 8,
            nhead: 2,
            num_encoder_layers: 1,
            num_decoder_layers: 1,
            dim_feedforward: 16,
            layer_norm_eps: 1e-5,
        }
    }

    fn write_checkpoint(name: &str, prefix: &str, vocab_size: usize) -> std::path::PathBuf {
        let varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        OcrTransformer::load(&tiny_config(), vocab_size, vb).expect("init model");
        let tensors: std::collections::HashMap<String, Tensor> = varmap
            .data()
            .lock()
            .expect("varmap lock")
            .iter()
            .map(|(k, v)| (format!("{prefix}{k}"), v.as_tensor().clone()))
            .collect();
        let path = std::env::temp_dir().join(name);
        candle_core::safetensors::save(&tensors, &path).expect("save checkpoint");
        path
    }

    #[test]
    fn loads_wrapped_and_raw_checkpoints() {
        for (name, prefix) in [
            ("textline_ocr_runtime_wrapped.safetensors", "state_dict."),
            ("textline_ocr_runtime_raw.safetensors", ""),
        ] {
            let path = write_checkpoint(name, prefix, 9);
            let model = CandleSequenceModel::load(&path, &tiny_config(), 9, Device::Cpu)
                .expect("load checkpoint");
            let image = Tensor::zeros((1, 3, 4, 8), DType::F32, &Device::Cpu).unwrap();
            let memory = model.encode(&image).unwrap();
            let probs = model.next_token_probs(&memory, &[1]).unwrap();
            assert_eq!(probs.len(), 9);
            assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn shape_mismatch_is_a_model_load_error() {
        let path = write_checkpoint("textline_ocr_runtime_mismatch.safetensors", "", 9);
        let result = CandleSequenceModel::load(&path, &tiny_config(), 12, Device::Cpu);
        assert!(matches!(result, Err(OcrError::ModelLoad { .. })));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_reports_missing_checkpoint() {
        let path = std::env::temp_dir().join("textline_ocr_missing_weights.safetensors");
        let result = CandleSequenceModel::load(&path, &ModelConfig::default(), 10, Device::Cpu);
        assert!(matches!(result, Err(OcrError::ModelLoad { .. })));
    }
}
