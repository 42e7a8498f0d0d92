use candle_core::Tensor;

use crate::error::OcrError;
use crate::pipeline::traits::SequenceModel;
use crate::types::{GreedyOutput, SpecialTokens};

/// Autoregressive argmax decoding.
///
/// Stops when the model selects the end token (which is not returned) or once
/// `max_length` tokens have been produced. Ties go to the lowest token id.
pub fn greedy_decode(
    model: &dyn SequenceModel,
    image: &Tensor,
    special: SpecialTokens,
    max_length: usize,
) -> Result<GreedyOutput, OcrError> {
    let memory = model.encode(image)?;

    let mut prefix = vec![special.sos];
    let mut step_probabilities = Vec::new();

    while step_probabilities.len() < max_length {
        let probs = model.next_token_probs(&memory, &prefix)?;
        let (token, prob) =
            argmax(&probs).ok_or_else(|| no_usable_probabilities("greedy step"))?;
        if token == special.eos {
            break;
        }
        prefix.push(token);
        step_probabilities.push(prob);
    }

    prefix.remove(0);
    Ok(GreedyOutput {
        tokens: prefix,
        step_probabilities,
    })
}

pub(crate) fn no_usable_probabilities(context: &'static str) -> OcrError {
    OcrError::inference(context, "model returned no usable probabilities")
}

/// Index and value of the first maximum; NaN entries never win.
pub(crate) fn argmax(probs: &[f32]) -> Option<(u32, f32)> {
    let mut best: Option<(u32, f32)> = None;
    for (idx, &p) in probs.iter().enumerate() {
        if p.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, best_p)| p > best_p) {
            best = Some((idx as u32, p));
        }
    }
    best
}
