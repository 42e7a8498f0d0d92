use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("image error while {context}: {source}")]
    Image {
        context: &'static str,
        #[source]
        source: image::ImageError,
    },
    #[error("weight download failed for '{url}': {message}")]
    Fetch { url: String, message: String },
    #[error("invalid configuration: {message}")]
    Config { message: String },
    #[error("failed to load model weights: {message}")]
    ModelLoad { message: String },
    #[error("inference failed during {context}: {message}")]
    Inference {
        context: &'static str,
        message: String,
    },
    #[error("record '{path}' failed: {message}")]
    Record { path: String, message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl OcrError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn image(context: &'static str, source: image::ImageError) -> Self {
        Self::Image { context, source }
    }

    pub(crate) fn fetch(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad {
            message: message.into(),
        }
    }

    /// Wraps a model or tensor failure raised while decoding.
    ///
    /// Public so that external [`SequenceModel`](crate::SequenceModel)
    /// implementations can report step failures the same way the bundled
    /// runtime does.
    pub fn inference(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Inference {
            context,
            message: err.to_string(),
        }
    }

    pub(crate) fn record(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Record {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_error_keeps_context_and_message() {
        let err = OcrError::inference("decoder step", "shape mismatch");
        assert_eq!(
            err.to_string(),
            "inference failed during decoder step: shape mismatch"
        );
    }

    #[test]
    fn record_error_names_the_path() {
        let err = OcrError::record("img/0001.png", "file not found");
        assert_eq!(err.to_string(), "record 'img/0001.png' failed: file not found");
    }
}
