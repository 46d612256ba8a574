//! Recognition result contracts for the parking-gate plate reader.
//!
//! These are the only types that cross the boundary between the recognition
//! engine and the service embedding it (HTTP handlers, gate controllers).

use serde::{Deserialize, Serialize};

/// Detail string for frames where no plate cleared the detector threshold
pub const DETAIL_NO_PLATE: &str = "no_plate";

/// Detail string for uploads that are not a decodable JPEG/PNG image
pub const DETAIL_DECODE_ERROR: &str = "decode_error";

/// Detail string for requests that arrive before the models finished loading
pub const DETAIL_MODELS_NOT_READY: &str = "models_not_ready";

/// Detail string for contract violations between pipeline stages
pub const DETAIL_INTERNAL_ERROR: &str = "internal_error";

/// Plate bounding box in frame pixel coordinates.
///
/// Corners satisfy `x1 <= x2` and `y1 <= y2` and lie inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,

    /// Detector confidence (0.0 to 1.0)
    pub confidence: f32,
}

impl BoundingBox {
    /// Build a box, swapping corners if they arrive out of order
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32, confidence: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            confidence,
        }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Corners as `[x1, y1, x2, y2]`
    pub fn corners(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Intersection over Union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = if x2 > x1 && y2 > y1 {
            (u64::from(x2 - x1) * u64::from(y2 - y1)) as f32
        } else {
            0.0
        };

        let union = self.area() as f32 + other.area() as f32 - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Outcome of one recognition call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub ok: bool,

    /// Normalized plate text (empty on failure)
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub detection_confidence: f32,

    /// Mean per-character probability; `None` when nothing was read
    #[serde(default)]
    pub recognition_confidence: Option<f32>,

    #[serde(default)]
    pub n_chars: usize,

    /// Crop region as `[x1, y1, x2, y2]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<[u32; 4]>,

    /// Failure reason (`no_plate`, `decode_error`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RecognitionResult {
    pub fn success(
        text: impl Into<String>,
        detection_confidence: f32,
        recognition_confidence: Option<f32>,
        bounding_box: [u32; 4],
    ) -> Self {
        let text = text.into();
        Self {
            ok: true,
            n_chars: text.chars().count(),
            text,
            detection_confidence,
            recognition_confidence,
            bounding_box: Some(bounding_box),
            detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: String::new(),
            detection_confidence: 0.0,
            recognition_confidence: None,
            n_chars: 0,
            bounding_box: None,
            detail: Some(detail.into()),
        }
    }

    pub fn no_plate() -> Self {
        Self::failure(DETAIL_NO_PLATE)
    }

    pub fn is_no_plate(&self) -> bool {
        !self.ok && self.detail.as_deref() == Some(DETAIL_NO_PLATE)
    }
}
