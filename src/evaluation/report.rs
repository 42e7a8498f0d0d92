use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::OcrError;
use crate::evaluation::accuracy::{compute_accuracy, AccuracyMode};
use crate::evaluation::annotate::annotate_one;
use crate::pipeline::runtime::Predictor;
use crate::types::{AnnotationRecord, EvaluatedSample, SENTINEL_TEXT};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub schema_version: u32,
    pub meta: Meta,
    pub metrics: Metrics,
}

impl EvaluationReport {
    pub fn new(meta: Meta, metrics: Metrics) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            meta,
            metrics,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub generated_at: String,
    pub weights: String,
    pub device: String,
    pub beamsearch: bool,
    pub case_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub full_sequence: f64,
    pub per_char: f64,
    pub wer: f64,
}

impl Metrics {
    pub fn compute<S: AsRef<str>, T: AsRef<str>>(
        ground_truth: &[S],
        predictions: &[T],
    ) -> Result<Self, OcrError> {
        Ok(Self {
            full_sequence: compute_accuracy(
                ground_truth,
                predictions,
                true,
                AccuracyMode::FullSequence,
            )?,
            per_char: compute_accuracy(ground_truth, predictions, true, AccuracyMode::PerChar)?,
            wer: compute_accuracy(ground_truth, predictions, true, AccuracyMode::Wer)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub samples: Vec<EvaluatedSample>,
    pub failed_count: usize,
    pub metrics: Metrics,
}

/// Predicts every labelled record and scores the predictions.
///
/// A record that fails to predict is scored with the sentinel text.
pub fn evaluate(
    predictor: &Predictor,
    records: &[AnnotationRecord],
    image_root: &Path,
) -> Result<Evaluation, OcrError> {
    evaluate_with_progress(predictor, records, image_root, |_| {})
}

pub fn evaluate_with_progress<F>(
    predictor: &Predictor,
    records: &[AnnotationRecord],
    image_root: &Path,
    mut on_sample: F,
) -> Result<Evaluation, OcrError>
where
    F: FnMut(&EvaluatedSample),
{
    if let Some(unlabelled) = records.iter().find(|r| r.label.is_none()) {
        return Err(OcrError::invalid_input(format!(
            "record '{}' has no label to evaluate against",
            unlabelled.image_path
        )));
    }

    let mut samples = Vec::with_capacity(records.len());
    let mut failed_count = 0;
    for record in records {
        let preds = match annotate_one(predictor, record, image_root) {
            Ok(prediction) => prediction.text,
            Err(err) => {
                tracing::warn!(path = %record.image_path, error = %err, "evaluation sample failed");
                failed_count += 1;
                SENTINEL_TEXT.to_string()
            }
        };
        let sample = EvaluatedSample {
            id: record.image_path.clone(),
            preds,
            ground_truth: record.label.clone().unwrap_or_default(),
        };
        on_sample(&sample);
        samples.push(sample);
    }

    let ground_truth: Vec<&str> = samples.iter().map(|s| s.ground_truth.as_str()).collect();
    let predictions: Vec<&str> = samples.iter().map(|s| s.preds.as_str()).collect();
    let metrics = Metrics::compute(&ground_truth, &predictions)?;
    tracing::info!(
        cases = samples.len(),
        failed = failed_count,
        full_sequence = metrics.full_sequence,
        per_char = metrics.per_char,
        wer = metrics.wer,
        "evaluation finished"
    );

    Ok(Evaluation {
        samples,
        failed_count,
        metrics,
    })
}

/// Writes `id,preds,ground_truth` rows with RFC 4180 quoting.
pub fn save_predictions(csv_path: &Path, samples: &[EvaluatedSample]) -> Result<(), OcrError> {
    if let Some(parent) = csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| OcrError::io("create csv directory", e))?;
    }
    let file = File::create(csv_path).map_err(|e| OcrError::io("create csv file", e))?;
    let mut writer = BufWriter::new(file);
    let write_err = |e| OcrError::io("write csv file", e);

    writeln!(writer, "id,preds,ground_truth").map_err(write_err)?;
    for sample in samples {
        writeln!(
            writer,
            "{},{},{}",
            csv_field(&sample.id),
            csv_field(&sample.preds),
            csv_field(&sample.ground_truth)
        )
        .map_err(write_err)?;
    }
    writer.flush().map_err(write_err)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_field_quotes_only_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn save_predictions_writes_header_and_rows() {
        let path = std::env::temp_dir().join("textline_ocr_report_preds.csv");
        let samples = vec![
            EvaluatedSample {
                id: "a.png".to_string(),
                preds: "x, y".to_string(),
                ground_truth: "x y".to_string(),
            },
            EvaluatedSample {
                id: "b.png".to_string(),
                preds: SENTINEL_TEXT.to_string(),
                ground_truth: "z".to_string(),
            },
        ];
        save_predictions(&path, &samples).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "id,preds,ground_truth\na.png,\"x, y\",x y\nb.png,$$$$$,z\n"
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn metrics_cover_all_modes() {
        let metrics = Metrics::compute(&["abcd", "hello world"], &["abXd", "hello world"]).unwrap();
        assert!((metrics.full_sequence - 0.5).abs() < 1e-12);
        assert!((metrics.per_char - 0.875).abs() < 1e-12);
        assert!((metrics.wer - 0.5).abs() < 1e-12);
    }

    #[test]
    fn report_serialises_with_schema_version() {
        let report = EvaluationReport::new(
            Meta {
                generated_at: "2026-01-01T00:00:00+00:00".to_string(),
                weights: "w.safetensors".to_string(),
                device: "cpu".to_string(),
                beamsearch: false,
                case_count: 2,
                failed_count: 0,
            },
            Metrics {
                full_sequence: 1.0,
                per_char: 1.0,
                wer: 0.0,
            },
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["meta"]["case_count"], 2);
        assert_eq!(value["metrics"]["wer"], 0.0);
    }
}
