use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};

use crate::error::OcrError;

const STATE_DICT_PREFIX: &str = "state_dict.";

/// Tensors read from a safetensors checkpoint.
pub(crate) enum Checkpoint {
    /// Training checkpoint; `state` holds the `state_dict.*` entries with the
    /// prefix stripped. `full` keeps every tensor for the raw fallback.
    Wrapped {
        state: HashMap<String, Tensor>,
        full: HashMap<String, Tensor>,
    },
    /// Plain model state, keyed directly by parameter name.
    Raw(HashMap<String, Tensor>),
}

impl Checkpoint {
    pub(crate) fn load(path: &Path, device: &Device) -> Result<Self, OcrError> {
        let tensors = candle_core::safetensors::load(path, device).map_err(|e| {
            OcrError::model_load(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(Self::from_tensors(tensors))
    }

    pub(crate) fn from_tensors(tensors: HashMap<String, Tensor>) -> Self {
        let state: HashMap<String, Tensor> = tensors
            .iter()
            .filter_map(|(name, t)| {
                name.strip_prefix(STATE_DICT_PREFIX)
                    .map(|inner| (inner.to_string(), t.clone()))
            })
            .collect();
        if state.is_empty() {
            Self::Raw(tensors)
        } else {
            Self::Wrapped {
                state,
                full: tensors,
            }
        }
    }

    /// Tensor maps to try, in order, each labelled for diagnostics.
    pub(crate) fn into_attempts(self) -> Vec<(&'static str, HashMap<String, Tensor>)> {
        match self {
            Self::Wrapped { state, full } => vec![("state_dict", state), ("raw", full)],
            Self::Raw(map) => vec![("raw", map)],
        }
    }
}

/// Builds a model from the first checkpoint variant `build` accepts.
pub(crate) fn build_from_checkpoint<T, F>(checkpoint: Checkpoint, mut build: F) -> Result<T, OcrError>
where
    F: FnMut(HashMap<String, Tensor>) -> candle_core::Result<T>,
{
    let mut failures = Vec::new();
    for (variant, tensors) in checkpoint.into_attempts() {
        match build(tensors) {
            Ok(model) => return Ok(model),
            Err(e) => {
                tracing::debug!(variant, error = %e, "checkpoint variant rejected");
                failures.push(format!("{variant}: {e}"));
            }
        }
    }
    Err(OcrError::model_load(failures.join("; ")))
}
