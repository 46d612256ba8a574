//! The linear recognition pipeline: decode, detect, crop, preprocess,
//! recognize, CTC-decode, normalize. Any stage failing ends the call.

use crate::config::{LprConfig, PipelineConfig};
use crate::ctc::ctc_greedy_decode;
use crate::detector::{OnnxPlateDetector, PlateDetector};
use crate::error::RecognitionError;
use crate::frame::decode_image;
use crate::normalizer::normalize_plate;
use crate::preprocess::{crop_plate, pad_box, preprocess_crop};
use crate::recognizer::{OnnxSequenceRecognizer, SequenceRecognizer};
use crate::vocab::Vocabulary;
use anyhow::{Context, Result};
use common::{BoundingBox, RecognitionResult};
use std::time::Instant;
use telemetry::metrics::observe_stage;

/// Detector, recognizer and charset, loaded together and shared read-only
pub struct LoadedModels {
    pub detector: Box<dyn PlateDetector>,
    pub recognizer: Box<dyn SequenceRecognizer>,
    pub vocabulary: Vocabulary,
}

impl LoadedModels {
    pub fn new(
        detector: Box<dyn PlateDetector>,
        recognizer: Box<dyn SequenceRecognizer>,
        vocabulary: Vocabulary,
    ) -> Self {
        Self {
            detector,
            recognizer,
            vocabulary,
        }
    }

    /// Load the charset and both ONNX models from the configured paths
    pub fn load(config: &LprConfig) -> Result<Self> {
        let models = &config.models;
        let vocabulary = Vocabulary::load(&models.charset_path)?;
        let detector = OnnxPlateDetector::load(models, &config.pipeline)?;
        let recognizer = OnnxSequenceRecognizer::load(models, vocabulary.len())
            .context("Recognizer does not fit the charset")?;

        Ok(Self::new(Box::new(detector), Box::new(recognizer), vocabulary))
    }
}

/// A successful read
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedPlate {
    /// Normalized plate text
    pub text: String,
    /// Decoder output before normalization
    pub raw_text: String,
    pub detection_confidence: f32,
    pub recognition_confidence: Option<f32>,
    /// Padded crop box on the original frame
    pub bounding_box: BoundingBox,
}

impl From<RecognizedPlate> for RecognitionResult {
    fn from(plate: RecognizedPlate) -> Self {
        RecognitionResult::success(
            plate.text,
            plate.detection_confidence,
            plate.recognition_confidence,
            plate.bounding_box.corners(),
        )
    }
}

/// Read the plate in an encoded image
pub fn recognize_plate(
    models: &LoadedModels,
    config: &PipelineConfig,
    image_bytes: &[u8],
) -> Result<RecognizedPlate, RecognitionError> {
    let _span = tracing::info_span!("recognize_plate", bytes = image_bytes.len()).entered();

    let started = Instant::now();
    let frame = decode_image(image_bytes)?;
    observe_stage("decode", started);

    let started = Instant::now();
    let detection = models.detector.detect(&frame)?;
    observe_stage("detect", started);
    let detection = detection.ok_or(RecognitionError::NoDetection)?;

    let padded = pad_box(
        &detection,
        frame.width(),
        frame.height(),
        config.crop_pad_x_frac,
        config.crop_pad_y_frac,
    );
    let crop = crop_plate(&frame, &padded).ok_or(RecognitionError::NoDetection)?;

    let started = Instant::now();
    let tensor = preprocess_crop(
        &crop,
        config.recognition_image_height,
        config.recognition_image_width,
    )?;
    observe_stage("preprocess", started);

    let started = Instant::now();
    let lattice = models.recognizer.recognize(&tensor)?;
    observe_stage("recognize", started);

    let decoded = ctc_greedy_decode(&lattice, &models.vocabulary);
    let text = normalize_plate(&decoded.text);

    tracing::debug!(
        raw = %decoded.text,
        plate = %text,
        detection_confidence = detection.confidence,
        recognition_confidence = ?decoded.score,
        bbox = ?padded.corners(),
        "Plate recognized"
    );

    Ok(RecognizedPlate {
        text,
        raw_text: decoded.text,
        detection_confidence: detection.confidence,
        recognition_confidence: decoded.score,
        bounding_box: padded,
    })
}
