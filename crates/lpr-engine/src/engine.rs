use crate::config::LprConfig;
use crate::detector::PlateDetector;
use crate::error::RecognitionError;
use crate::pipeline::{recognize_plate, LoadedModels, RecognizedPlate};
use crate::recognizer::SequenceRecognizer;
use crate::vocab::Vocabulary;
use anyhow::Result;
use common::{best_match, PlateMatch, RecognitionResult};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{record_outcome, LPR_MODELS_READY, LPR_MODEL_LOAD_DURATION_SECONDS};
use tokio::task::JoinHandle;

/// Shared handle to the recognition engine.
///
/// Creating the handle loads nothing. Models are loaded once by [`warm_up`]
/// (usually through [`spawn_warm_up`] at process start); until then every
/// recognition call answers `models_not_ready` instead of waiting. Clones share
/// the same models and may be used from any thread.
///
/// [`warm_up`]: LprEngine::warm_up
/// [`spawn_warm_up`]: LprEngine::spawn_warm_up
#[derive(Clone)]
pub struct LprEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: LprConfig,
    models: OnceCell<Arc<LoadedModels>>,
}

impl LprEngine {
    pub fn new(config: LprConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                models: OnceCell::new(),
            }),
        }
    }

    /// Build an engine that is ready immediately, from explicit components
    pub fn with_models(
        detector: Box<dyn PlateDetector>,
        recognizer: Box<dyn SequenceRecognizer>,
        vocabulary: Vocabulary,
        config: LprConfig,
    ) -> Self {
        let models = LoadedModels::new(detector, recognizer, vocabulary);
        Self {
            inner: Arc::new(EngineInner {
                config,
                models: OnceCell::with_value(Arc::new(models)),
            }),
        }
    }

    pub fn config(&self) -> &LprConfig {
        &self.inner.config
    }

    pub fn is_ready(&self) -> bool {
        self.inner.models.get().is_some()
    }

    /// Load models if they are not loaded yet. Blocks for the duration of the
    /// load; concurrent callers wait for the same load. A failed load leaves
    /// the engine cold so a later call can retry.
    pub fn warm_up(&self) -> Result<()> {
        self.inner.models.get_or_try_init(|| {
            let started = Instant::now();
            tracing::info!("Loading plate recognition models");

            let models = LoadedModels::load(&self.inner.config).map_err(|e| {
                tracing::error!(error = %format!("{:#}", e), "Failed to load plate recognition models");
                e
            })?;

            let elapsed = started.elapsed();
            LPR_MODEL_LOAD_DURATION_SECONDS.observe(elapsed.as_secs_f64());
            tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                classes = models.vocabulary.len(),
                "Plate recognition models ready"
            );
            Ok::<_, anyhow::Error>(Arc::new(models))
        })?;

        LPR_MODELS_READY.set(1);
        Ok(())
    }

    /// Run [`warm_up`](LprEngine::warm_up) on the blocking thread pool.
    /// Must be called from within a Tokio runtime.
    pub fn spawn_warm_up(&self) -> JoinHandle<Result<()>> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.warm_up())
    }

    /// Recognize the plate in an encoded image.
    ///
    /// Never panics and never waits for models; every failure comes back as a
    /// result with `ok = false` and a `detail` code.
    pub fn recognize(&self, image_bytes: &[u8]) -> RecognitionResult {
        match self.try_recognize(image_bytes) {
            Ok(plate) => {
                record_outcome("success");
                plate.into()
            }
            Err(err) => {
                record_outcome(err.detail());
                if err.is_routine() {
                    tracing::debug!(detail = err.detail(), "Recognition ended without a plate: {}", err);
                } else {
                    tracing::error!(detail = err.detail(), "Recognition failed: {}", err);
                }
                err.into()
            }
        }
    }

    /// Same as [`recognize`](LprEngine::recognize) with the typed error
    pub fn try_recognize(&self, image_bytes: &[u8]) -> Result<RecognizedPlate, RecognitionError> {
        let models = self
            .inner
            .models
            .get()
            .ok_or(RecognitionError::ModelNotReady)?;
        recognize_plate(models, &self.inner.config.pipeline, image_bytes)
    }

    /// Compare a recognized plate with stored plates using the configured threshold
    pub fn match_plate<'a, I>(&self, candidate: &str, stored: I) -> PlateMatch
    where
        I: IntoIterator<Item = &'a str>,
    {
        best_match(candidate, stored, self.inner.config.match_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn missing_models() -> LprConfig {
        let mut config = LprConfig::default();
        config.models.charset_path = PathBuf::from("models/missing_charset.txt");
        config.models.detector_model_path = PathBuf::from("models/missing_detector.onnx");
        config.models.recognizer_model_path = PathBuf::from("models/missing_crnn.onnx");
        config
    }

    #[test]
    fn test_new_engine_is_cold() {
        let engine = LprEngine::new(missing_models());
        assert!(!engine.is_ready());

        let result = engine.recognize(b"anything");
        assert!(!result.ok);
        assert_eq!(result.detail.as_deref(), Some("models_not_ready"));
    }

    #[test]
    fn test_failed_warm_up_stays_cold() {
        let engine = LprEngine::new(missing_models());
        assert!(engine.warm_up().is_err());
        assert!(!engine.is_ready());
        // retry is allowed
        assert!(engine.warm_up().is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let engine = LprEngine::new(missing_models());
        let clone = engine.clone();
        assert!(Arc::ptr_eq(&engine.inner, &clone.inner));
    }

    #[test]
    fn test_match_plate_uses_configured_threshold() {
        let engine = LprEngine::new(LprConfig::default());
        let result = engine.match_plate("51F12345", ["51F12845", "30A99999"]);
        assert!((result.score - 0.875).abs() < 1e-9);
        assert!(result.is_match());

        let result = engine.match_plate("51F12345", ["30A99999"]);
        assert!(!result.is_match());
    }
}
