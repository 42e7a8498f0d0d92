use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use textline_ocr::{
    annotate_with_progress, evaluate_with_progress, read_annotation_file, read_annotation_rows,
    save_predictions, write_annotations, EvaluationReport, Meta, OcrConfig, Predictor, PredictorBuilder,
};

#[path = "ocr_report/json_report_formatter.rs"]
mod json_report_formatter;

#[derive(Debug, Parser)]
#[command(name = "ocr_report")]
#[command(about = "Recognize text-line images and score predictions against labels")]
struct Args {
    #[arg(long, global = true, env = "OCR_REPORT_CONFIG", default_value = "config.json")]
    config: PathBuf,
    /// Overrides `device` from the config file.
    #[arg(long, global = true, env = "OCR_REPORT_DEVICE")]
    device: Option<String>,
    /// Overrides `weights` from the config file.
    #[arg(long, global = true, env = "OCR_REPORT_WEIGHTS")]
    weights: Option<String>,
    #[arg(long, global = true, env = "OCR_REPORT_BEAMSEARCH")]
    beamsearch: Option<bool>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the text of one image.
    Predict {
        #[arg(long)]
        image: PathBuf,
    },
    /// Write `path||||text||||probability` for every line of an annotation file.
    Annotate {
        #[arg(long)]
        annotations: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = ".")]
        data_root: PathBuf,
    },
    /// Score predictions against the labels of an annotation file.
    Evaluate {
        #[arg(long)]
        annotations: PathBuf,
        #[arg(long, default_value = ".")]
        data_root: PathBuf,
        #[arg(long)]
        csv_out: Option<PathBuf>,
        #[arg(long)]
        report_out: Option<PathBuf>,
    },
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    require_path_exists(&args.config, "Config file not found.")?;

    let mut config = OcrConfig::from_path(&args.config).map_err(|e| e.to_string())?;
    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if let Some(weights) = &args.weights {
        config.weights = weights.clone();
    }
    if let Some(beamsearch) = args.beamsearch {
        config.predictor.beamsearch = beamsearch;
    }

    let load_started = Instant::now();
    let predictor = PredictorBuilder::new(config.clone())
        .build()
        .map_err(|e| e.to_string())?;
    eprintln!(
        "model_load_elapsed: {}",
        format_duration_hms(load_started.elapsed())
    );

    match args.command {
        Command::Predict { image } => run_predict(&predictor, &image),
        Command::Annotate {
            annotations,
            out,
            data_root,
        } => run_annotate(&predictor, &annotations, &out, &data_root),
        Command::Evaluate {
            annotations,
            data_root,
            csv_out,
            report_out,
        } => run_evaluate(
            &predictor,
            &config,
            &annotations,
            &data_root,
            csv_out.as_deref(),
            report_out.as_deref(),
        ),
    }
}

fn run_predict(predictor: &Predictor, image: &Path) -> Result<(), String> {
    require_path_exists(image, "Image file not found.")?;
    let prediction = predictor.predict_path(image).map_err(|e| e.to_string())?;
    match prediction.probability {
        Some(p) => println!("{}\t{p:.4}", prediction.text),
        None => println!("{}", prediction.text),
    }
    Ok(())
}

fn run_annotate(
    predictor: &Predictor,
    annotations: &Path,
    out: &Path,
    data_root: &Path,
) -> Result<(), String> {
    require_path_exists(annotations, "Annotation file not found.")?;
    let records = read_annotation_rows(annotations).map_err(|e| e.to_string())?;

    let started = Instant::now();
    let progress = progress_bar(records.len());
    let predictions = annotate_with_progress(predictor, &records, data_root, |_, record| {
        progress.set_message(record.source.clone());
        progress.inc(1);
    });
    progress.finish_with_message("annotation pass complete");

    write_annotations(out, &predictions).map_err(|e| e.to_string())?;
    let failed = predictions.iter().filter(|p| p.is_sentinel()).count();
    println!(
        "annotated: {} failed: {} elapsed: {}",
        predictions.len(),
        failed,
        format_duration_hms(started.elapsed())
    );
    println!("{}", out.display());
    Ok(())
}

fn run_evaluate(
    predictor: &Predictor,
    config: &OcrConfig,
    annotations: &Path,
    data_root: &Path,
    csv_out: Option<&Path>,
    report_out: Option<&Path>,
) -> Result<(), String> {
    require_path_exists(annotations, "Annotation file not found.")?;
    let records = read_annotation_file(annotations).map_err(|e| e.to_string())?;

    let started = Instant::now();
    let progress = progress_bar(records.len());
    let evaluation = evaluate_with_progress(predictor, &records, data_root, |sample| {
        progress.set_message(sample.id.clone());
        progress.inc(1);
    })
    .map_err(|e| e.to_string())?;
    progress.finish_with_message("evaluation pass complete");

    let metrics = evaluation.metrics;
    println!(
        "full_sequence: {:.4} per_char: {:.4} wer: {:.4} failed: {} elapsed: {}",
        metrics.full_sequence,
        metrics.per_char,
        metrics.wer,
        evaluation.failed_count,
        format_duration_hms(started.elapsed())
    );

    if let Some(csv_out) = csv_out {
        save_predictions(csv_out, &evaluation.samples).map_err(|e| e.to_string())?;
        println!("{}", csv_out.display());
    }
    if let Some(report_out) = report_out {
        let report = EvaluationReport::new(
            Meta {
                generated_at: Utc::now().to_rfc3339(),
                weights: config.weights.clone(),
                device: predictor.device_label(),
                beamsearch: config.predictor.beamsearch,
                case_count: evaluation.samples.len(),
                failed_count: evaluation.failed_count,
            },
            metrics,
        );
        json_report_formatter::write_report(report_out, &report)?;
        println!("{}", report_out.display());
    }
    Ok(())
}

fn progress_bar(len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress.set_message("starting...");
    progress
}

fn format_duration_hms(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

fn require_path_exists(path: &Path, message: &str) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    Err(format!("{message} Missing path: {}", path.display()))
}
