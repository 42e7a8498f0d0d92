use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::OcrError;
use crate::pipeline::runtime::Predictor;
use crate::types::{AnnotationRecord, PredictionRecord, ANNOTATION_DELIMITER};

/// Parses one `path||||label…` line, surrounding whitespace stripped. Blank
/// lines yield `None`.
pub fn parse_annotation_line(line: &str) -> Option<AnnotationRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut fields = line.split(ANNOTATION_DELIMITER);
    let image_path = fields.next()?.to_string();
    Some(AnnotationRecord {
        image_path,
        label: fields.next().map(str::to_string),
    })
}

/// Labelled records for scoring. Blank lines are skipped.
pub fn read_annotation_file(path: &Path) -> Result<Vec<AnnotationRecord>, OcrError> {
    let data = fs::read_to_string(path).map_err(|e| OcrError::io("read annotation file", e))?;
    Ok(data.lines().filter_map(parse_annotation_line).collect())
}

/// One record per input line for batch annotation. A blank line becomes a
/// record with an empty path, which annotates to a sentinel row.
pub fn read_annotation_rows(path: &Path) -> Result<Vec<AnnotationRecord>, OcrError> {
    let data = fs::read_to_string(path).map_err(|e| OcrError::io("read annotation file", e))?;
    Ok(data
        .lines()
        .map(|line| {
            parse_annotation_line(line).unwrap_or_else(|| AnnotationRecord {
                image_path: String::new(),
                label: None,
            })
        })
        .collect())
}

/// Predicts every record. Failures become sentinel records, so the output
/// always has one entry per input.
pub fn annotate(
    predictor: &Predictor,
    records: &[AnnotationRecord],
    image_root: &Path,
) -> Vec<PredictionRecord> {
    annotate_with_progress(predictor, records, image_root, |_, _| {})
}

/// Like [`annotate`], calling `on_record(index, &record)` after each item.
pub fn annotate_with_progress<F>(
    predictor: &Predictor,
    records: &[AnnotationRecord],
    image_root: &Path,
    mut on_record: F,
) -> Vec<PredictionRecord>
where
    F: FnMut(usize, &PredictionRecord),
{
    let mut out = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let result = annotate_one(predictor, record, image_root).unwrap_or_else(|err| {
            tracing::warn!(path = %record.image_path, error = %err, "annotation failed");
            PredictionRecord::sentinel(record.image_path.as_str())
        });
        on_record(index, &result);
        out.push(result);
    }
    out
}

pub(crate) fn annotate_one(
    predictor: &Predictor,
    record: &AnnotationRecord,
    image_root: &Path,
) -> Result<PredictionRecord, OcrError> {
    if record.image_path.is_empty() {
        return Err(OcrError::record("", "blank annotation line"));
    }
    let path = image_root.join(&record.image_path);
    let prediction = predictor
        .predict_path(&path)
        .map_err(|e| OcrError::record(record.image_path.as_str(), e))?;
    Ok(PredictionRecord::from_prediction(
        record.image_path.as_str(),
        prediction,
    ))
}

/// Renders `path||||text||||probability`. The probability always carries a
/// decimal point; a missing one is written as `nan`.
pub fn format_annotation_line(record: &PredictionRecord) -> String {
    let probability = match record.probability {
        Some(p) => format!("{p:?}"),
        None => "nan".to_string(),
    };
    format!(
        "{}{ANNOTATION_DELIMITER}{}{ANNOTATION_DELIMITER}{probability}",
        record.source, record.text
    )
}

pub fn write_annotations(path: &Path, records: &[PredictionRecord]) -> Result<(), OcrError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| OcrError::io("create annotation directory", e))?;
    }
    let file = File::create(path).map_err(|e| OcrError::io("create annotation file", e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        writeln!(writer, "{}", format_annotation_line(record))
            .map_err(|e| OcrError::io("write annotation file", e))?;
    }
    writer
        .flush()
        .map_err(|e| OcrError::io("flush annotation file", e))
}

/// Reads `anno_in`, annotates every line and writes `anno_out` with the same
/// number of lines.
pub fn gen_annotations(
    predictor: &Predictor,
    anno_in: &Path,
    anno_out: &Path,
    image_root: &Path,
) -> Result<Vec<PredictionRecord>, OcrError> {
    let records = read_annotation_rows(anno_in)?;
    let predictions = annotate(predictor, &records, image_root);
    write_annotations(anno_out, &predictions)?;
    let failed = predictions.iter().filter(|p| p.is_sentinel()).count();
    tracing::info!(
        total = predictions.len(),
        failed,
        out = %anno_out.display(),
        "annotations written"
    );
    Ok(predictions)
}
