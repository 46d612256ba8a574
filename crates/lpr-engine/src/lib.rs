//! Licence-plate recognition for parking gates.
//!
//! One call takes an encoded camera frame and returns the normalized plate
//! text with its detection box and confidences. Detection is a YOLOv8-style
//! ONNX model, reading is a CRNN with greedy CTC decoding, both executed with
//! ONNX Runtime.

pub mod config;
pub mod ctc;
pub mod detector;
pub mod engine;
pub mod error;
pub mod frame;
pub mod normalizer;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod session;
pub mod vocab;

pub use config::{LprConfig, ModelConfig, PipelineConfig};
pub use ctc::{ctc_greedy_decode, ctc_greedy_indices, RawDecodedText};
pub use detector::{OnnxPlateDetector, PlateDetector};
pub use engine::LprEngine;
pub use error::RecognitionError;
pub use frame::{decode_image, DecodedFrame};
pub use normalizer::{is_valid_plate, normalize_plate};
pub use pipeline::{recognize_plate, LoadedModels, RecognizedPlate};
pub use preprocess::{preprocess_crop, RecognitionTensor};
pub use recognizer::{CharacterLattice, OnnxSequenceRecognizer, OutputLayout, SequenceRecognizer};
pub use vocab::Vocabulary;
