pub mod accuracy;
pub mod annotate;
pub mod report;

pub use accuracy::{compute_accuracy, AccuracyMode};
pub use annotate::{
    annotate, annotate_with_progress, format_annotation_line, gen_annotations,
    parse_annotation_line, read_annotation_file, read_annotation_rows, write_annotations,
};
pub use report::{
    evaluate, evaluate_with_progress, save_predictions, Evaluation, EvaluationReport, Meta,
    Metrics,
};
