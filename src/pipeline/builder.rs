use std::path::PathBuf;

use crate::config::OcrConfig;
use crate::decoding::DecodingStrategy;
use crate::error::OcrError;
use crate::pipeline::defaults::{CachedHttpFetcher, ResizePreprocessor};
use crate::pipeline::model_runtime::{parse_device, CandleSequenceModel};
use crate::pipeline::runtime::{Predictor, PredictorParts};
use crate::pipeline::traits::{ImagePreprocessor, SequenceModel, WeightFetcher};
use crate::types::WeightSource;
use crate::vocab::Vocab;

pub struct PredictorBuilder {
    config: OcrConfig,
    sequence_model: Option<Box<dyn SequenceModel>>,
    preprocessor: Option<Box<dyn ImagePreprocessor>>,
    weight_fetcher: Option<Box<dyn WeightFetcher>>,
}

impl PredictorBuilder {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            config,
            sequence_model: None,
            preprocessor: None,
            weight_fetcher: None,
        }
    }

    /// Uses `model` instead of loading weights from the configured checkpoint.
    pub fn with_sequence_model(mut self, model: Box<dyn SequenceModel>) -> Self {
        self.sequence_model = Some(model);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Box<dyn ImagePreprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn with_weight_fetcher(mut self, fetcher: Box<dyn WeightFetcher>) -> Self {
        self.weight_fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> Result<Predictor, OcrError> {
        self.config.validate()?;
        let vocab = Vocab::new(&self.config.vocab);

        let model = match self.sequence_model {
            Some(model) => model,
            None => {
                let device = parse_device(&self.config.device)?;
                let weights = resolve_weights(&self.config.weights, self.weight_fetcher)?;
                Box::new(CandleSequenceModel::load(
                    &weights,
                    &self.config.model,
                    vocab.len(),
                    device,
                )?)
            }
        };

        Ok(Predictor::from_parts(PredictorParts {
            model,
            preprocessor: self
                .preprocessor
                .unwrap_or_else(|| Box::new(ResizePreprocessor)),
            vocab,
            dataset: self.config.dataset,
            strategy: DecodingStrategy::from_config(&self.config.predictor),
            max_seq_length: self.config.max_seq_length,
        }))
    }
}

fn resolve_weights(
    identifier: &str,
    fetcher: Option<Box<dyn WeightFetcher>>,
) -> Result<PathBuf, OcrError> {
    if identifier.trim().is_empty() {
        return Err(OcrError::config("weights must name a checkpoint file or URL"));
    }
    match WeightSource::parse(identifier) {
        WeightSource::Local(path) => Ok(path),
        WeightSource::Remote(url) => {
            let fetcher = fetcher.unwrap_or_else(|| Box::new(CachedHttpFetcher::default()));
            fetcher.resolve(&url)
        }
    }
}
