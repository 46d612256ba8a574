use common::recognition::{
    RecognitionResult, DETAIL_DECODE_ERROR, DETAIL_INTERNAL_ERROR, DETAIL_MODELS_NOT_READY,
    DETAIL_NO_PLATE,
};
use thiserror::Error;

/// Reasons a recognition call ends without a plate.
///
/// `Decode`, `NoDetection` and `ModelNotReady` are routine: a bad upload or an
/// empty frame is expected input. `Inference` means two pipeline stages
/// disagree about tensor shapes or vocabulary and points at a deployment bug.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("no plate detected above the confidence threshold")]
    NoDetection,

    #[error("recognition models are not loaded yet")]
    ModelNotReady,

    #[error("inference failed: {0:#}")]
    Inference(#[from] anyhow::Error),
}

impl RecognitionError {
    /// Detail string reported to the caller
    pub fn detail(&self) -> &'static str {
        match self {
            Self::Decode(_) => DETAIL_DECODE_ERROR,
            Self::NoDetection => DETAIL_NO_PLATE,
            Self::ModelNotReady => DETAIL_MODELS_NOT_READY,
            Self::Inference(_) => DETAIL_INTERNAL_ERROR,
        }
    }

    /// Whether the error comes from ordinary input rather than a broken deployment
    pub fn is_routine(&self) -> bool {
        !matches!(self, Self::Inference(_))
    }
}

impl From<RecognitionError> for RecognitionResult {
    fn from(err: RecognitionError) -> Self {
        RecognitionResult::failure(err.detail())
    }
}
