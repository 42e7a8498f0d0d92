use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use strsim::generic_levenshtein;

use crate::error::OcrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyMode {
    /// Characters matched at the same index, over the label length.
    PerChar,
    /// Share of predictions identical to their label.
    FullSequence,
    /// Word error rate: word edit distance over the label word count.
    Wer,
}

impl AccuracyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerChar => "per_char",
            Self::FullSequence => "full_sequence",
            Self::Wer => "wer",
        }
    }
}

impl fmt::Display for AccuracyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccuracyMode {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_char" => Ok(Self::PerChar),
            "full_sequence" => Ok(Self::FullSequence),
            "wer" => Ok(Self::Wer),
            other => Err(OcrError::config(format!(
                "unknown accuracy mode '{other}'; expected per_char, full_sequence or wer"
            ))),
        }
    }
}

/// Scores `predictions` against `ground_truth` pairwise by index.
///
/// Extra predictions are ignored; fewer predictions than labels is an error.
pub fn compute_accuracy<S, T>(
    ground_truth: &[S],
    predictions: &[T],
    case_sensitive: bool,
    mode: AccuracyMode,
) -> Result<f64, OcrError>
where
    S: AsRef<str>,
    T: AsRef<str>,
{
    if predictions.len() < ground_truth.len() {
        return Err(OcrError::invalid_input(format!(
            "{} predictions for {} ground-truth labels",
            predictions.len(),
            ground_truth.len()
        )));
    }
    if ground_truth.is_empty() {
        return Ok(match mode {
            AccuracyMode::Wer => 0.0,
            _ if predictions.is_empty() => 1.0,
            _ => 0.0,
        });
    }

    let pairs = ground_truth.iter().zip(predictions).map(|(label, pred)| {
        (
            fold_case(label.as_ref(), case_sensitive),
            fold_case(pred.as_ref(), case_sensitive),
        )
    });

    let total: f64 = match mode {
        AccuracyMode::PerChar => pairs.map(|(l, p)| per_char_ratio(&l, &p)).sum(),
        AccuracyMode::FullSequence => pairs.filter(|(l, p)| l == p).count() as f64,
        AccuracyMode::Wer => pairs.map(|(l, p)| word_error_rate(&l, &p)).sum(),
    };
    Ok(total / ground_truth.len() as f64)
}

fn fold_case(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.to_lowercase())
    }
}

fn per_char_ratio(label: &str, prediction: &str) -> f64 {
    let total = label.chars().count();
    if total == 0 {
        return if prediction.is_empty() { 1.0 } else { 0.0 };
    }
    let matched = label
        .chars()
        .zip(prediction.chars())
        .filter(|(l, p)| l == p)
        .count();
    matched as f64 / total as f64
}

fn word_error_rate(label: &str, prediction: &str) -> f64 {
    let reference: Vec<&str> = label.split_whitespace().collect();
    if reference.is_empty() {
        return 0.0;
    }
    let hypothesis: Vec<&str> = prediction.split_whitespace().collect();
    generic_levenshtein(&reference, &hypothesis) as f64 / reference.len() as f64
}
