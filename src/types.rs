use std::path::PathBuf;

/// Text emitted in place of a prediction when a batch record fails.
pub const SENTINEL_TEXT: &str = "$$$$$";

/// Field separator of annotation input and output files.
pub const ANNOTATION_DELIMITER: &str = "||||";

/// Reserved token ids the decoders need to drive a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub sos: u32,
    pub eos: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GreedyOutput {
    /// Decoded ids, without the start token and without the end token.
    pub tokens: Vec<u32>,
    /// `step_probabilities[i]` is the probability the model assigned to `tokens[i]`.
    pub step_probabilities: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub text: String,
    /// Mean character probability under greedy decoding; `None` under beam search.
    pub probability: Option<f32>,
}

/// One line of an annotation input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub image_path: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub source: String,
    pub text: String,
    pub probability: Option<f32>,
}

impl PredictionRecord {
    pub fn from_prediction(source: impl Into<String>, prediction: Prediction) -> Self {
        Self {
            source: source.into(),
            text: prediction.text,
            probability: prediction.probability,
        }
    }

    pub fn sentinel(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: SENTINEL_TEXT.to_string(),
            probability: Some(0.0),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.text == SENTINEL_TEXT
    }
}

/// One row of the evaluation CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedSample {
    pub id: String,
    pub preds: String,
    pub ground_truth: String,
}

/// Where model weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightSource {
    Local(PathBuf),
    Remote(String),
}

impl WeightSource {
    pub fn parse(identifier: &str) -> Self {
        if identifier.starts_with("http") {
            Self::Remote(identifier.to_string())
        } else {
            Self::Local(PathBuf::from(identifier))
        }
    }
}
