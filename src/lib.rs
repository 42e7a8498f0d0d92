pub mod config;
pub mod decoding;
pub mod error;
pub mod evaluation;
mod model;
pub mod pipeline;
pub mod preprocess;
pub mod types;
pub mod vocab;

pub use config::{DatasetConfig, ModelConfig, OcrConfig, PredictorConfig};
pub use decoding::{beam_search_decode, greedy_decode, DecodingStrategy};
pub use error::OcrError;
pub use evaluation::{
    annotate, annotate_with_progress, compute_accuracy, evaluate, evaluate_with_progress,
    gen_annotations, read_annotation_file, read_annotation_rows, save_predictions,
    write_annotations, AccuracyMode, Evaluation, EvaluationReport, Meta, Metrics,
};
pub use pipeline::builder::PredictorBuilder;
pub use pipeline::defaults::{CachedHttpFetcher, ResizePreprocessor};
pub use pipeline::runtime::Predictor;
pub use pipeline::traits::{ImagePreprocessor, SequenceModel, WeightFetcher};
pub use types::{
    AnnotationRecord, EvaluatedSample, GreedyOutput, Prediction, PredictionRecord, SpecialTokens,
    WeightSource, ANNOTATION_DELIMITER, SENTINEL_TEXT,
};
pub use vocab::Vocab;
