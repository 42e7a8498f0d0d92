use candle_core::Tensor;

use crate::error::OcrError;
use crate::decoding::greedy::{argmax, no_usable_probabilities};
use crate::pipeline::traits::SequenceModel;
use crate::types::SpecialTokens;

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    log_prob: f64,
    finished: bool,
}

impl Beam {
    fn root() -> Self {
        Self {
            tokens: Vec::new(),
            log_prob: 0.0,
            finished: false,
        }
    }

    fn extend(&self, token: u32, log_p: f64, eos: u32) -> Self {
        let mut tokens = self.tokens.clone();
        let finished = token == eos;
        if !finished {
            tokens.push(token);
        }
        Self {
            tokens,
            log_prob: self.log_prob + log_p,
            finished,
        }
    }
}

/// Beam search over the model's next-token distributions.
///
/// Every step expands each unfinished beam by every vocabulary token and keeps
/// the global top `beam_width` candidates over the union, ranked by cumulative
/// log-probability with ties resolved by beam order and then token id. Finished
/// beams stay in the pool and keep competing for a slot. Returns the best
/// finished sequence, or the best unfinished one when nothing reached the end
/// token within `max_length` steps.
pub fn beam_search_decode(
    model: &dyn SequenceModel,
    image: &Tensor,
    special: SpecialTokens,
    beam_width: usize,
    max_length: usize,
) -> Result<Vec<u32>, OcrError> {
    let beam_width = beam_width.max(1);
    let memory = model.encode(image)?;

    let mut beams = vec![Beam::root()];
    let mut prefix = Vec::new();

    for step in 0..max_length {
        if beams.iter().all(|beam| beam.finished) {
            break;
        }

        let mut candidates = Vec::new();
        for beam in &beams {
            if beam.finished {
                candidates.push(beam.clone());
                continue;
            }
            prefix.clear();
            prefix.push(special.sos);
            prefix.extend_from_slice(&beam.tokens);

            let probs = model.next_token_probs(&memory, &prefix)?;
            if argmax(&probs).is_none() {
                return Err(no_usable_probabilities("beam step"));
            }
            candidates.reserve(probs.len());
            for (token, &p) in probs.iter().enumerate() {
                candidates.push(beam.extend(token as u32, log_prob(p), special.eos));
            }
        }

        // Stable: equal scores keep beam order, then token order.
        candidates.sort_by(|a, b| b.log_prob.total_cmp(&a.log_prob));
        candidates.truncate(beam_width);
        beams = candidates;

        tracing::debug!(
            step,
            best_log_prob = beams[0].log_prob,
            finished = beams.iter().filter(|beam| beam.finished).count(),
            "beam step"
        );
    }

    let best = best_of(&beams, true).or_else(|| best_of(&beams, false));
    Ok(best.map(|beam| beam.tokens.clone()).unwrap_or_default())
}

fn best_of(beams: &[Beam], finished: bool) -> Option<&Beam> {
    beams
        .iter()
        .filter(|beam| beam.finished == finished)
        .fold(None, |best: Option<&Beam>, beam| match best {
            Some(current) if current.log_prob >= beam.log_prob => Some(current),
            _ => Some(beam),
        })
}

fn log_prob(p: f32) -> f64 {
    if p > 0.0 {
        f64::from(p).ln()
    } else {
        f64::NEG_INFINITY
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use candle_core::{DType, Device};

    use super::*;

    const SPECIAL: SpecialTokens = SpecialTokens { sos: 1, eos: 2 };

    /// Distribution chosen by a closure over the prefix (which starts with sos).
    struct FnModel<F> {
        next: F,
        calls: AtomicUsize,
        device: Device,
    }

    impl<F> FnModel<F>
    where
        F: Fn(&[u32]) -> Vec<f32> + Send + Sync,
    {
        fn new(next: F) -> Self {
            Self {
                next,
                calls: AtomicUsize::new(0),
                device: Device::Cpu,
            }
        }
    }

    impl<F> SequenceModel for FnModel<F>
    where
        F: Fn(&[u32]) -> Vec<f32> + Send + Sync,
    {
        fn encode(&self, image: &Tensor) -> Result<Tensor, OcrError> {
            Ok(image.clone())
        }

        fn next_token_probs(&self, _memory: &Tensor, prefix: &[u32]) -> Result<Vec<f32>, OcrError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok((self.next)(prefix))
        }

        fn device(&self) -> &Device {
            &self.device
        }
    }

    fn image() -> Tensor {
        Tensor::zeros((1, 3, 4, 4), DType::F32, &Device::Cpu).expect("zeros")
    }

    #[test]
    fn immediate_eos_yields_empty_sequence() {
        let model = FnModel::new(|_: &[u32]| vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let out = beam_search_decode(&model, &image(), SPECIAL, 3, 5).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn finished_beams_are_not_expanded() {
        let model = FnModel::new(|_: &[u32]| vec![0.0, 0.0, 1.0, 0.0, 0.0]);
        beam_search_decode(&model, &image(), SPECIAL, 3, 5).unwrap();
        // Root expansion, then at most two unfinished beams per remaining step.
        assert!(model.calls.load(Ordering::Relaxed) <= 1 + 2 * 4);
    }

    #[test]
    fn global_top_k_beats_greedy_path() {
        // Greedy takes token 4 (0.6) and then is stuck with a weak
        // continuation; token 5 (0.4) leads to a certain end.
        let model = FnModel::new(|prefix: &[u32]| match prefix {
            [_] => vec![0.0, 0.0, 0.0, 0.0, 0.6, 0.4],
            [_, 4] => vec![0.0, 0.0, 0.5, 0.0, 0.25, 0.25],
            [_, 5] => vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
            _ => vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        });
        let out = beam_search_decode(&model, &image(), SPECIAL, 2, 5).unwrap();
        assert_eq!(out, vec![5]);
    }

    #[test]
    fn returns_best_unfinished_when_nothing_ends() {
        let model = FnModel::new(|_: &[u32]| vec![0.0, 0.0, 0.0, 0.0, 0.7, 0.3]);
        let out = beam_search_decode(&model, &image(), SPECIAL, 3, 4).unwrap();
        assert_eq!(out, vec![4, 4, 4, 4]);
    }

    #[test]
    fn never_exceeds_max_length() {
        let model = FnModel::new(|_: &[u32]| vec![0.1, 0.1, 0.05, 0.1, 0.35, 0.3]);
        for max_length in 0..6 {
            let out = beam_search_decode(&model, &image(), SPECIAL, 4, max_length).unwrap();
            assert!(out.len() <= max_length);
        }
    }

    #[test]
    fn ties_prefer_lower_token_id() {
        let model = FnModel::new(|prefix: &[u32]| match prefix.len() {
            1 => vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5],
            _ => vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        });
        let out = beam_search_decode(&model, &image(), SPECIAL, 2, 5).unwrap();
        assert_eq!(out, vec![4]);
    }

    #[test]
    fn zero_beam_width_behaves_like_one() {
        let model = FnModel::new(|prefix: &[u32]| match prefix.len() {
            1 => vec![0.0, 0.0, 0.1, 0.0, 0.9],
            _ => vec![0.0, 0.0, 0.9, 0.0, 0.1],
        });
        let zero = beam_search_decode(&model, &image(), SPECIAL, 0, 5).unwrap();
        let one = beam_search_decode(&model, &image(), SPECIAL, 1, 5).unwrap();
        assert_eq!(zero, one);
        assert_eq!(one, vec![4]);
    }

    #[test]
    fn all_nan_distribution_is_an_inference_error() {
        let model = FnModel::new(|_: &[u32]| vec![f32::NAN; 5]);
        let err = beam_search_decode(&model, &image(), SPECIAL, 1, 3).unwrap_err();
        assert!(matches!(err, OcrError::Inference { .. }));
    }

    #[test]
    fn huge_max_length_stops_at_end_token() {
        let model = FnModel::new(|_: &[u32]| vec![0.0, 0.0, 1.0, 0.0]);
        let out = beam_search_decode(&model, &image(), SPECIAL, 3, usize::MAX).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn empty_distribution_is_an_inference_error() {
        let model = FnModel::new(|_: &[u32]| Vec::new());
        let err = beam_search_decode(&model, &image(), SPECIAL, 2, 5).unwrap_err();
        assert!(matches!(err, OcrError::Inference { .. }));
    }
}
