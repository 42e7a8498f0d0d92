pub mod beam;
pub mod greedy;

pub use beam::beam_search_decode;
pub use greedy::greedy_decode;

/// Which search the predictor runs over the model's step distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingStrategy {
    Greedy,
    BeamSearch { beam_width: usize },
}

impl DecodingStrategy {
    pub fn from_config(config: &crate::config::PredictorConfig) -> Self {
        if config.beamsearch {
            Self::BeamSearch {
                beam_width: config.beam_width,
            }
        } else {
            Self::Greedy
        }
    }
}
