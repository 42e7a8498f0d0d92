use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use textline_ocr::{
    evaluate, gen_annotations, save_predictions, OcrConfig, OcrError, Predictor,
    PredictorBuilder, SequenceModel, SENTINEL_TEXT,
};

/// Reads "ab" from every image.
struct FixedTextModel {
    device: Device,
}

impl SequenceModel for FixedTextModel {
    fn encode(&self, image: &Tensor) -> Result<Tensor, OcrError> {
        Ok(image.clone())
    }

    fn next_token_probs(&self, _memory: &Tensor, prefix: &[u32]) -> Result<Vec<f32>, OcrError> {
        Ok(match prefix.len() {
            1 => vec![0.0, 0.0, 0.05, 0.0, 0.95, 0.0],
            2 => vec![0.0, 0.0, 0.15, 0.0, 0.0, 0.85],
            _ => vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        })
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

fn predictor() -> Predictor {
    let config = OcrConfig {
        vocab: "ab".to_string(),
        ..OcrConfig::default()
    };
    PredictorBuilder::new(config)
        .with_sequence_model(Box::new(FixedTextModel {
            device: Device::Cpu,
        }))
        .build()
        .expect("build predictor")
}

fn fixture_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("img")).expect("create fixture dir");
    dir
}

fn write_line_image(root: &Path, rel: &str) {
    image::RgbImage::from_pixel(48, 16, image::Rgb([255, 255, 255]))
        .save(root.join(rel))
        .expect("write png");
}

#[test]
fn missing_image_becomes_sentinel_line() {
    let root = fixture_dir("textline_ocr_batch_annotation");
    write_line_image(&root, "img/0.png");
    write_line_image(&root, "img/2.png");
    let anno_in = root.join("anno.txt");
    std::fs::write(&anno_in, "img/0.png||||ab\nimg/1.png||||ab\nimg/2.png||||ba\n")
        .expect("write annotations");
    let anno_out = root.join("out/pred.txt");

    let records = gen_annotations(&predictor(), &anno_in, &anno_out, &root).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records[1].is_sentinel());

    let written = std::fs::read_to_string(&anno_out).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], format!("img/1.png||||{SENTINEL_TEXT}||||0.0"));
    assert!(lines[0].starts_with("img/0.png||||ab||||0.9"));
    assert!(lines[2].starts_with("img/2.png||||ab||||"));

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn output_file_is_written_even_when_every_record_fails() {
    let root = fixture_dir("textline_ocr_batch_all_missing");
    let anno_in = root.join("anno.txt");
    std::fs::write(&anno_in, "img/a.png\nimg/b.png\n").expect("write annotations");
    let anno_out = root.join("pred.txt");

    let records = gen_annotations(&predictor(), &anno_in, &anno_out, &root).unwrap();
    assert!(records.iter().all(|r| r.is_sentinel()));
    let written = std::fs::read_to_string(&anno_out).unwrap();
    assert_eq!(written.lines().count(), 2);

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn evaluation_scores_labels_and_writes_csv() {
    let root = fixture_dir("textline_ocr_batch_evaluation");
    write_line_image(&root, "img/0.png");
    write_line_image(&root, "img/2.png");
    let records = vec![
        textline_ocr::AnnotationRecord {
            image_path: "img/0.png".to_string(),
            label: Some("ab".to_string()),
        },
        textline_ocr::AnnotationRecord {
            image_path: "img/1.png".to_string(),
            label: Some("ab".to_string()),
        },
        textline_ocr::AnnotationRecord {
            image_path: "img/2.png".to_string(),
            label: Some("abba".to_string()),
        },
    ];

    let evaluation = evaluate(&predictor(), &records, &root).unwrap();
    assert_eq!(evaluation.failed_count, 1);
    assert_eq!(evaluation.samples[1].preds, SENTINEL_TEXT);
    assert!((evaluation.metrics.full_sequence - 1.0 / 3.0).abs() < 1e-9);
    // (1 + 0 + 0.5) / 3
    assert!((evaluation.metrics.per_char - 0.5).abs() < 1e-9);

    let csv = root.join("preds.csv");
    save_predictions(&csv, &evaluation.samples).unwrap();
    let written = std::fs::read_to_string(&csv).unwrap();
    assert!(written.starts_with("id,preds,ground_truth\nimg/0.png,ab,ab\n"));
    assert_eq!(written.lines().count(), 4);

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn evaluation_requires_labels() {
    let records = vec![textline_ocr::AnnotationRecord {
        image_path: "img/0.png".to_string(),
        label: None,
    }];
    let err = evaluate(&predictor(), &records, Path::new(".")).unwrap_err();
    assert!(matches!(err, OcrError::InvalidInput { .. }));
}

#[test]
fn blank_input_line_keeps_line_counts_aligned() {
    let root = fixture_dir("textline_ocr_batch_blank_line");
    write_line_image(&root, "img/0.png");
    let anno_in = root.join("anno.txt");
    std::fs::write(&anno_in, "img/0.png||||ab\n\nimg/0.png||||ab\n").expect("write annotations");
    let anno_out = root.join("pred.txt");

    let records = gen_annotations(&predictor(), &anno_in, &anno_out, &root).unwrap();
    assert_eq!(records.len(), 3);
    let written = std::fs::read_to_string(&anno_out).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], format!("||||{SENTINEL_TEXT}||||0.0"));
    assert!(lines[2].starts_with("img/0.png||||ab||||"));

    let _ = std::fs::remove_dir_all(&root);
}
