/// Sequence recognition stage: CRNN over the preprocessed crop, producing a
/// per-timestep log-probability lattice for CTC decoding.
use crate::config::ModelConfig;
use crate::preprocess::RecognitionTensor;
use crate::session::{create_session, ExecutionProvider};
use anyhow::{bail, Context, Result};
use ndarray::{Array, Array2, ArrayView2, ArrayViewD, Axis, IxDyn};
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Axis order of the recognizer output tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// `[T, 1, C]`
    #[default]
    TimeMajor,
    /// `[1, T, C]`
    BatchMajor,
}

/// Log-probabilities over recognizer classes, one row per timestep
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterLattice {
    log_probs: Array2<f32>,
}

impl CharacterLattice {
    /// Normalize raw scores with a log-softmax over each row
    pub fn from_logits(logits: ArrayView2<f32>) -> Self {
        Self {
            log_probs: log_softmax_rows(logits),
        }
    }

    /// Wrap scores that are already log-probabilities
    pub fn from_log_probs(log_probs: Array2<f32>) -> Self {
        Self { log_probs }
    }

    pub fn timesteps(&self) -> usize {
        self.log_probs.nrows()
    }

    pub fn classes(&self) -> usize {
        self.log_probs.ncols()
    }

    /// Most likely class and its log-probability at every timestep.
    /// Ties go to the lowest class index.
    pub fn argmax_path(&self) -> Vec<(usize, f32)> {
        self.log_probs
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 {
                            (i, v)
                        } else {
                            best
                        }
                    })
            })
            .collect()
    }
}

/// Numerically stable log-softmax of every row
pub fn log_softmax_rows(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !max.is_finite() {
            continue;
        }
        let log_sum = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
        row.mapv_inplace(|v| v - log_sum);
    }
    out
}

/// Reshape a raw recognizer output into a lattice.
///
/// `expected_classes` is the vocabulary size (blank included); any other class
/// count means the model and charset were not trained together.
pub fn lattice_from_output(
    output: &ArrayViewD<f32>,
    layout: OutputLayout,
    expected_classes: usize,
) -> Result<CharacterLattice> {
    let shape = output.shape();
    let logits = match (shape.len(), layout) {
        (2, _) => output.view(),
        (3, OutputLayout::TimeMajor) if shape[1] == 1 => output.index_axis(Axis(1), 0),
        (3, OutputLayout::BatchMajor) if shape[0] == 1 => output.index_axis(Axis(0), 0),
        _ => bail!(
            "Unexpected recognizer output shape {:?} for {:?} layout",
            shape,
            layout
        ),
    };
    let logits = logits
        .into_dimensionality::<ndarray::Ix2>()
        .context("Recognizer output is not a timestep x class matrix")?;

    if logits.ncols() != expected_classes {
        bail!(
            "Recognizer emits {} classes but the charset defines {}",
            logits.ncols(),
            expected_classes
        );
    }

    Ok(CharacterLattice::from_logits(logits))
}

/// Turns a preprocessed plate crop into a character lattice
pub trait SequenceRecognizer: Send + Sync {
    fn recognize(&self, tensor: &RecognitionTensor) -> Result<CharacterLattice>;
}

/// CRNN recognizer running on ONNX Runtime
pub struct OnnxSequenceRecognizer {
    session: Mutex<Session>,
    layout: OutputLayout,
    classes: usize,
    provider: ExecutionProvider,
}

impl OnnxSequenceRecognizer {
    /// Load the recognizer; `classes` is the vocabulary size it must emit
    pub fn load(models: &ModelConfig, classes: usize) -> Result<Self> {
        let (session, provider) = create_session(&models.recognizer_model_path, models)
            .context("Failed to load plate recognizer")?;

        tracing::info!(
            path = %models.recognizer_model_path.display(),
            %provider,
            device = models.device_id,
            classes,
            layout = ?models.recognizer_output_layout,
            "Initialized plate recognizer"
        );

        Ok(Self {
            session: Mutex::new(session),
            layout: models.recognizer_output_layout,
            classes,
            provider,
        })
    }

    pub fn provider(&self) -> ExecutionProvider {
        self.provider
    }
}

impl SequenceRecognizer for OnnxSequenceRecognizer {
    fn recognize(&self, tensor: &RecognitionTensor) -> Result<CharacterLattice> {
        let input_tensor = Value::from_array(tensor.view().to_owned())?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock recognition session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;

        let output_value = outputs
            .get("output")
            .or_else(|| outputs.get("output0"))
            .or_else(|| outputs.get("logits"))
            .or_else(|| outputs.get("log_probs"))
            .context("No recognizer output tensor found (tried: output, output0, logits, log_probs)")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?;

        lattice_from_output(&output.view(), self.layout, self.classes)
    }
}
