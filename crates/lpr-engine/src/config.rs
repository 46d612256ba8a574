use crate::recognizer::OutputLayout;
use anyhow::{bail, Context, Result};
use common::DEFAULT_MATCH_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Numeric constants of the recognition pipeline.
///
/// The recognizer was trained against the crop geometry below; changing the
/// padding or the tensor size silently degrades accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum detector score for a plate box (0.0 to 1.0)
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence_threshold: f32,

    /// IoU threshold for duplicate-box suppression (0.0 to 1.0)
    #[serde(default = "default_detection_iou")]
    pub detection_iou_threshold: f32,

    /// Horizontal crop padding, as a fraction of box width, each side
    #[serde(default = "default_crop_pad_x")]
    pub crop_pad_x_frac: f64,

    /// Vertical crop padding, as a fraction of box height, each side
    #[serde(default = "default_crop_pad_y")]
    pub crop_pad_y_frac: f64,

    /// Recognizer input height
    #[serde(default = "default_recognition_height")]
    pub recognition_image_height: u32,

    /// Recognizer input width
    #[serde(default = "default_recognition_width")]
    pub recognition_image_width: u32,
}

fn default_detection_confidence() -> f32 {
    0.25
}

fn default_detection_iou() -> f32 {
    0.45
}

fn default_crop_pad_x() -> f64 {
    0.08
}

fn default_crop_pad_y() -> f64 {
    0.20
}

fn default_recognition_height() -> u32 {
    48
}

fn default_recognition_width() -> u32 {
    320
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_confidence_threshold: default_detection_confidence(),
            detection_iou_threshold: default_detection_iou(),
            crop_pad_x_frac: default_crop_pad_x(),
            crop_pad_y_frac: default_crop_pad_y(),
            recognition_image_height: default_recognition_height(),
            recognition_image_width: default_recognition_width(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit_interval(
            "detection_confidence_threshold",
            self.detection_confidence_threshold as f64,
        )?;
        check_unit_interval("detection_iou_threshold", self.detection_iou_threshold as f64)?;
        check_unit_interval("crop_pad_x_frac", self.crop_pad_x_frac)?;
        check_unit_interval("crop_pad_y_frac", self.crop_pad_y_frac)?;

        if self.recognition_image_height == 0 || self.recognition_image_width == 0 {
            bail!(
                "recognition image size must be non-zero, got {}x{}",
                self.recognition_image_width,
                self.recognition_image_height
            );
        }

        Ok(())
    }
}

/// Model files and ONNX Runtime session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the plate detection ONNX model
    #[serde(default = "default_detector_model")]
    pub detector_model_path: PathBuf,

    /// Path to the CRNN recognition ONNX model
    #[serde(default = "default_recognizer_model")]
    pub recognizer_model_path: PathBuf,

    /// Path to the charset table the recognizer was trained with
    #[serde(default = "default_charset")]
    pub charset_path: PathBuf,

    /// Detector input size (square, letterboxed)
    #[serde(default = "default_detection_input_size")]
    pub detection_input_size: u32,

    /// Axis order of the recognizer output tensor
    #[serde(default)]
    pub recognizer_output_layout: OutputLayout,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    /// GPU device ID (0, 1, 2, etc.)
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Number of inter-operation threads
    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_detector_model() -> PathBuf {
    PathBuf::from("models/plate_detector.onnx")
}

fn default_recognizer_model() -> PathBuf {
    PathBuf::from("models/plate_crnn.onnx")
}

fn default_charset() -> PathBuf {
    PathBuf::from("models/charset.txt")
}

fn default_detection_input_size() -> u32 {
    1024
}

fn default_execution_provider() -> String {
    "CUDA".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_model_path: default_detector_model(),
            recognizer_model_path: default_recognizer_model(),
            charset_path: default_charset(),
            detection_input_size: default_detection_input_size(),
            recognizer_output_layout: OutputLayout::default(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.detection_input_size == 0 {
            bail!("detection_input_size must be non-zero");
        }
        if self.intra_threads == 0 || self.inter_threads == 0 {
            bail!("thread counts must be at least 1");
        }
        Ok(())
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LprConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub models: ModelConfig,

    /// Minimum similarity for an exit plate to match a stored plate
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
}

fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

impl Default for LprConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            models: ModelConfig::default(),
            match_threshold: default_match_threshold(),
        }
    }
}

impl LprConfig {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Build the configuration from `LPR_CONFIG` (optional JSON file) and
    /// individual `LPR_*` overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("LPR_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(path) = env::var("LPR_DETECTOR_MODEL") {
            config.models.detector_model_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("LPR_RECOGNIZER_MODEL") {
            config.models.recognizer_model_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("LPR_CHARSET") {
            config.models.charset_path = PathBuf::from(path);
        }
        if let Ok(provider) = env::var("LPR_EXECUTION_PROVIDER") {
            config.models.execution_provider = provider;
        }
        if let Some(device_id) = env_parse("LPR_DEVICE_ID")? {
            config.models.device_id = device_id;
        }
        if let Some(threads) = env_parse("LPR_INTRA_THREADS")? {
            config.models.intra_threads = threads;
        }
        if let Some(size) = env_parse("LPR_DETECTION_INPUT_SIZE")? {
            config.models.detection_input_size = size;
        }
        if let Some(threshold) = env_parse("LPR_DETECTION_CONFIDENCE")? {
            config.pipeline.detection_confidence_threshold = threshold;
        }
        if let Some(threshold) = env_parse("LPR_DETECTION_IOU")? {
            config.pipeline.detection_iou_threshold = threshold;
        }
        if let Some(threshold) = env_parse("LPR_MATCH_THRESHOLD")? {
            config.match_threshold = threshold;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.models.validate()?;
        check_unit_interval("match_threshold", self.match_threshold)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{} must be within [0, 1], got {}", name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.detection_confidence_threshold, 0.25);
        assert_eq!(config.detection_iou_threshold, 0.45);
        assert_eq!(config.crop_pad_x_frac, 0.08);
        assert_eq!(config.crop_pad_y_frac, 0.20);
        assert_eq!(config.recognition_image_height, 48);
        assert_eq!(config.recognition_image_width, 320);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.detection_input_size, 1024);
        assert_eq!(config.execution_provider, "CUDA");
        assert_eq!(config.recognizer_output_layout, OutputLayout::TimeMajor);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: LprConfig = serde_json::from_value(serde_json::json!({
            "pipeline": { "detection_confidence_threshold": 0.4 },
            "models": { "execution_provider": "CPU", "recognizer_output_layout": "batch_major" }
        }))
        .unwrap();

        assert_eq!(config.pipeline.detection_confidence_threshold, 0.4);
        assert_eq!(config.pipeline.detection_iou_threshold, 0.45);
        assert_eq!(config.models.execution_provider, "CPU");
        assert_eq!(config.models.recognizer_output_layout, OutputLayout::BatchMajor);
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "match_threshold": 0.9, "models": {{ "device_id": 1 }} }}"#).unwrap();

        let config = LprConfig::from_file(file.path()).unwrap();
        assert_eq!(config.match_threshold, 0.9);
        assert_eq!(config.models.device_id, 1);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = LprConfig::default();
        config.match_threshold = -0.8;
        assert!(config.validate().is_err());

        let mut config = LprConfig::default();
        config.pipeline.detection_iou_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = LprConfig::default();
        config.pipeline.recognition_image_width = 0;
        assert!(config.validate().is_err());

        let mut config = LprConfig::default();
        config.models.detection_input_size = 0;
        assert!(config.validate().is_err());
    }
}
