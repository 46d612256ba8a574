/// Plate detection stage.
///
/// The ONNX detector is a single-class YOLOv8 export. It sees the whole frame
/// letterboxed to a square input and reports candidate boxes; only the single
/// most confident plate survives this stage.
use crate::config::{ModelConfig, PipelineConfig};
use crate::frame::DecodedFrame;
use crate::preprocess::resize_bilinear;
use crate::session::{create_session, ExecutionProvider};
use anyhow::{bail, Context, Result};
use common::BoundingBox;
use image::{Rgb, RgbImage};
use ndarray::{Array, ArrayViewD, IxDyn};
use ort::{session::Session, value::Value};
use std::sync::Mutex;

/// Letterbox padding value used when the detector was trained
const LETTERBOX_FILL: u8 = 114;

/// Finds the plate in a full frame
pub trait PlateDetector: Send + Sync {
    /// Return the highest-confidence plate box, or `None` when nothing clears
    /// the confidence threshold
    fn detect(&self, frame: &DecodedFrame) -> Result<Option<BoundingBox>>;
}

/// Geometry of a letterboxed detector input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_left: f32,
    pub pad_top: f32,
}

impl Letterbox {
    /// Map an input-space coordinate back onto the original frame
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_left) / self.scale, (y - self.pad_top) / self.scale)
    }
}

/// Resize `image` into a `size`x`size` canvas keeping its aspect ratio and
/// return the NCHW tensor (RGB, scaled to [0, 1])
pub fn letterbox(image: &RgbImage, size: u32) -> (Array<f32, IxDyn>, Letterbox) {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);

    let pad_left = ((size - new_w) as f32 / 2.0 - 0.1).round().max(0.0);
    let pad_top = ((size - new_h) as f32 / 2.0 - 0.1).round().max(0.0);

    let resized = resize_bilinear(image, new_w, new_h);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::overlay(&mut canvas, &resized, pad_left as i64, pad_top as i64);

    let side = size as usize;
    let mut input = Array::zeros(IxDyn(&[1, 3, side, side]));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    (
        input,
        Letterbox {
            scale,
            pad_left,
            pad_top,
        },
    )
}

/// Turn a raw YOLOv8 output tensor into plate boxes on the original frame.
///
/// Accepts `[1, 4 + classes, N]` (the usual export) or its transpose
/// `[1, N, 4 + classes]`. The plate score of a candidate is its best class
/// score. Boxes are truncated to whole pixels and clipped to the frame, empty
/// boxes are dropped and the rest go through NMS.
pub fn postprocess_detections(
    output: &ArrayViewD<f32>,
    letterbox: &Letterbox,
    frame_width: u32,
    frame_height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
) -> Result<Vec<BoundingBox>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 {
        bail!("Unexpected detector output shape {:?}", shape);
    }

    let channels_first = shape[1] <= shape[2];
    let (channels, candidates) = if channels_first {
        (shape[1], shape[2])
    } else {
        (shape[2], shape[1])
    };
    if channels < 5 {
        bail!(
            "Detector output has {} channels, expected box + at least one class",
            channels
        );
    }

    let value = |channel: usize, i: usize| {
        if channels_first {
            output[[0, channel, i]]
        } else {
            output[[0, i, channel]]
        }
    };

    let max_x = frame_width as f32;
    let max_y = frame_height as f32;
    let mut boxes = Vec::new();

    for i in 0..candidates {
        let confidence = (4..channels)
            .map(|c| value(c, i))
            .fold(f32::NEG_INFINITY, f32::max);

        if confidence.is_nan() || confidence <= confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (value(0, i), value(1, i), value(2, i), value(3, i));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

        let bbox = BoundingBox::new(
            x1.clamp(0.0, max_x) as u32,
            y1.clamp(0.0, max_y) as u32,
            x2.clamp(0.0, max_x) as u32,
            y2.clamp(0.0, max_y) as u32,
            confidence.min(1.0),
        );

        if !bbox.is_empty() {
            boxes.push(bbox);
        }
    }

    Ok(nms(boxes, iou_threshold))
}

/// Greedy Non-Maximum Suppression, highest confidence first
pub fn nms(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in boxes {
        if keep
            .iter()
            .all(|kept| kept.iou(&candidate) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }

    keep
}

/// Pick the single most confident box.
///
/// Equal confidences keep the earliest box in detector output order, so ties
/// depend on how the model orders its anchors.
pub fn select_best(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    boxes.iter().copied().fold(None, |best, candidate| match best {
        Some(current) if current.confidence >= candidate.confidence => Some(current),
        _ => Some(candidate),
    })
}

/// YOLOv8 plate detector running on ONNX Runtime
pub struct OnnxPlateDetector {
    session: Mutex<Session>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    provider: ExecutionProvider,
}

impl OnnxPlateDetector {
    pub fn load(models: &ModelConfig, pipeline: &PipelineConfig) -> Result<Self> {
        let (session, provider) = create_session(&models.detector_model_path, models)
            .context("Failed to load plate detector")?;

        tracing::info!(
            path = %models.detector_model_path.display(),
            %provider,
            device = models.device_id,
            input_size = models.detection_input_size,
            "Initialized plate detector"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_size: models.detection_input_size,
            confidence_threshold: pipeline.detection_confidence_threshold,
            iou_threshold: pipeline.detection_iou_threshold,
            provider,
        })
    }

    pub fn provider(&self) -> ExecutionProvider {
        self.provider
    }
}

impl PlateDetector for OnnxPlateDetector {
    fn detect(&self, frame: &DecodedFrame) -> Result<Option<BoundingBox>> {
        let (input_array, geometry) = letterbox(frame.as_rgb(), self.input_size);
        let input_tensor = Value::from_array(input_array)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock detection session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;

        // Get detection output - try common YOLO output names
        let output_value = outputs
            .get("output0")
            .or_else(|| outputs.get("output"))
            .or_else(|| outputs.get("boxes"))
            .context("No detection output tensor found (tried: output0, output, boxes)")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?;

        let boxes = postprocess_detections(
            &output.view(),
            &geometry,
            frame.width(),
            frame.height(),
            self.confidence_threshold,
            self.iou_threshold,
        )?;

        tracing::debug!(candidates = boxes.len(), "Plate detector finished");
        Ok(select_best(&boxes))
    }
}
