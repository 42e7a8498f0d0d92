use std::path::Path;

use image::DynamicImage;

use crate::config::DatasetConfig;
use crate::decoding::{beam_search_decode, greedy_decode, DecodingStrategy};
use crate::error::OcrError;
use crate::pipeline::traits::{ImagePreprocessor, SequenceModel};
use crate::types::{GreedyOutput, Prediction};
use crate::vocab::{Vocab, FIRST_CHAR_ID};

/// Recognizes the text in a single-line image.
pub struct Predictor {
    model: Box<dyn SequenceModel>,
    preprocessor: Box<dyn ImagePreprocessor>,
    vocab: Vocab,
    dataset: DatasetConfig,
    strategy: DecodingStrategy,
    max_seq_length: usize,
}

pub(crate) struct PredictorParts {
    pub model: Box<dyn SequenceModel>,
    pub preprocessor: Box<dyn ImagePreprocessor>,
    pub vocab: Vocab,
    pub dataset: DatasetConfig,
    pub strategy: DecodingStrategy,
    pub max_seq_length: usize,
}

impl Predictor {
    pub(crate) fn from_parts(parts: PredictorParts) -> Self {
        Self {
            model: parts.model,
            preprocessor: parts.preprocessor,
            vocab: parts.vocab,
            dataset: parts.dataset,
            strategy: parts.strategy,
            max_seq_length: parts.max_seq_length,
        }
    }

    pub fn predict(&self, image: &DynamicImage) -> Result<String, OcrError> {
        self.predict_with_probability(image).map(|p| p.text)
    }

    /// Text plus confidence. The probability is `None` under beam search.
    pub fn predict_with_probability(&self, image: &DynamicImage) -> Result<Prediction, OcrError> {
        let input = self
            .preprocessor
            .process(image, &self.dataset, self.model.device())?;
        let special = self.vocab.special_tokens();

        match self.strategy {
            DecodingStrategy::Greedy => {
                let output = greedy_decode(self.model.as_ref(), &input, special, self.max_seq_length)?;
                let probability = Self::confidence(&output);
                Ok(Prediction {
                    text: self.vocab.decode(&output.tokens),
                    probability: Some(probability),
                })
            }
            DecodingStrategy::BeamSearch { beam_width } => {
                let tokens = beam_search_decode(
                    self.model.as_ref(),
                    &input,
                    special,
                    beam_width,
                    self.max_seq_length,
                )?;
                Ok(Prediction {
                    text: self.vocab.decode(&tokens),
                    probability: None,
                })
            }
        }
    }

    pub fn predict_path(&self, path: &Path) -> Result<Prediction, OcrError> {
        let image = image::open(path).map_err(|e| OcrError::image("open image", e))?;
        self.predict_with_probability(&image)
    }

    pub fn strategy(&self) -> DecodingStrategy {
        self.strategy
    }

    pub fn device_label(&self) -> String {
        self.model.device_label()
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Mean step probability over character tokens, 0 when there are none.
    fn confidence(output: &GreedyOutput) -> f32 {
        let (sum, count) = output
            .tokens
            .iter()
            .zip(&output.step_probabilities)
            .filter(|(&token, _)| token >= FIRST_CHAR_ID)
            .fold((0f32, 0usize), |(sum, count), (_, &p)| (sum + p, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }
}
