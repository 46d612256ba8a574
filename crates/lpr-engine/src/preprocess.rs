//! Crop preprocessing for the sequence recognizer.
//!
//! The recognizer was trained on crops prepared as: grayscale, CLAHE (clip
//! limit 2.0 on an 8x8 tile grid), unsharp mask (Gaussian sigma 1.0, weights
//! 1.5 / -0.5), bilinear resize to 320x48 and scaling to [-1, 1]. Each step
//! reproduces the arithmetic of the training-time image library so the tensor
//! matches what the network saw; reordering steps or changing a constant
//! degrades accuracy without any error.

use crate::frame::DecodedFrame;
use anyhow::{bail, Result};
use common::BoundingBox;
use image::{GrayImage, ImageBuffer, Luma, Pixel, RgbImage};
use ndarray::{Array4, ArrayView4};

pub const CLAHE_CLIP_LIMIT: f32 = 2.0;
pub const CLAHE_TILE_GRID: u32 = 8;
pub const SHARPEN_SIGMA: f32 = 1.0;
pub const SHARPEN_IMAGE_WEIGHT: f32 = 1.5;
pub const SHARPEN_BLUR_WEIGHT: f32 = -0.5;

const HIST_BINS: usize = 256;

/// Grow a detected box by a fraction of its size on every side, then clamp
/// it to the frame.
///
/// Padding is truncated to whole pixels. The result never extends past
/// `[0, frame_width] x [0, frame_height]`, even for boxes touching an edge.
pub fn pad_box(
    bbox: &BoundingBox,
    frame_width: u32,
    frame_height: u32,
    pad_x_frac: f64,
    pad_y_frac: f64,
) -> BoundingBox {
    let pad_x = (pad_x_frac * bbox.width() as f64) as u32;
    let pad_y = (pad_y_frac * bbox.height() as f64) as u32;

    BoundingBox::new(
        bbox.x1.saturating_sub(pad_x).min(frame_width),
        bbox.y1.saturating_sub(pad_y).min(frame_height),
        bbox.x2.saturating_add(pad_x).min(frame_width),
        bbox.y2.saturating_add(pad_y).min(frame_height),
        bbox.confidence,
    )
}

/// Copy the pixels under `bbox` out of the frame; `None` for an empty region
pub fn crop_plate(frame: &DecodedFrame, bbox: &BoundingBox) -> Option<RgbImage> {
    let x = bbox.x1.min(frame.width());
    let y = bbox.y1.min(frame.height());
    let width = bbox.x2.min(frame.width()).saturating_sub(x);
    let height = bbox.y2.min(frame.height()).saturating_sub(y);

    if width == 0 || height == 0 {
        return None;
    }

    Some(image::imageops::crop_imm(frame.as_rgb(), x, y, width, height).to_image())
}

/// Single-channel recognizer input, shape `[1, 1, height, width]`, values in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionTensor {
    data: Array4<f32>,
}

impl RecognitionTensor {
    /// Scale a grayscale image with `(p / 255 - 0.5) / 0.5`
    pub fn from_gray(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let data = Array4::from_shape_fn(
            (1, 1, height as usize, width as usize),
            |(_, _, y, x)| {
                let p = image.get_pixel(x as u32, y as u32)[0] as f32;
                (p / 255.0 - 0.5) / 0.5
            },
        );
        Self { data }
    }

    pub fn height(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn width(&self) -> usize {
        self.data.shape()[3]
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }
}

/// Run the full crop preparation chain
pub fn preprocess_crop(crop: &RgbImage, height: u32, width: u32) -> Result<RecognitionTensor> {
    if crop.width() == 0 || crop.height() == 0 {
        bail!("Cannot preprocess an empty crop");
    }
    if height == 0 || width == 0 {
        bail!("Recognizer input size must be non-zero, got {}x{}", width, height);
    }

    let gray = to_grayscale(crop);
    let equalized = clahe(&gray, CLAHE_CLIP_LIMIT, CLAHE_TILE_GRID, CLAHE_TILE_GRID);
    let sharpened = unsharp_mask(&equalized, SHARPEN_SIGMA);
    let resized = resize_bilinear(&sharpened, width, height);

    Ok(RecognitionTensor::from_gray(&resized))
}

/// BT.601 luma in 14-bit fixed point, rounded
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let luma = (u32::from(r) * 4899 + u32::from(g) * 9617 + u32::from(b) * 1868 + 8192) >> 14;
        Luma([luma as u8])
    })
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is logically extended with reflect-101 borders up to a whole
/// number of tiles (a full extra tile row/column when the size is already a
/// multiple in only one axis), one clipped-histogram LUT is built per tile and
/// every pixel bilinearly blends the LUTs of its four nearest tile centres.
pub fn clahe(src: &GrayImage, clip_limit: f32, tiles_x: u32, tiles_y: u32) -> GrayImage {
    let (width, height) = src.dimensions();
    if width == 0 || height == 0 || tiles_x == 0 || tiles_y == 0 {
        return src.clone();
    }

    let (ext_width, ext_height) = if width % tiles_x == 0 && height % tiles_y == 0 {
        (width, height)
    } else {
        (
            width + tiles_x - width % tiles_x,
            height + tiles_y - height % tiles_y,
        )
    };
    let tile_width = ext_width / tiles_x;
    let tile_height = ext_height / tiles_y;
    let tile_area = tile_width * tile_height;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area as f32 / HIST_BINS as f32) as u32).max(1)
    } else {
        0
    };
    let lut_scale = 255.0 / tile_area as f32;

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0u32; HIST_BINS];
            for y in ty * tile_height..(ty + 1) * tile_height {
                let sy = reflect_101(i64::from(y), height);
                for x in tx * tile_width..(tx + 1) * tile_width {
                    let sx = reflect_101(i64::from(x), width);
                    hist[src.get_pixel(sx, sy)[0] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, clip);

            let mut lut = [0u8; HIST_BINS];
            let mut sum = 0u32;
            for (value, count) in lut.iter_mut().zip(hist.iter()) {
                sum += count;
                *value = saturate_u8(sum as f32 * lut_scale);
            }
            luts.push(lut);
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let inv_tile_width = 1.0 / tile_width as f32;
    let inv_tile_height = 1.0 / tile_height as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let (ty1, ty2, ya) = tile_neighbours(y as f32 * inv_tile_height - 0.5, tiles_y);
        let (tx1, tx2, xa) = tile_neighbours(x as f32 * inv_tile_width - 0.5, tiles_x);
        let p = src.get_pixel(x, y)[0] as usize;

        let top = lut_at(tx1, ty1)[p] as f32 * (1.0 - xa) + lut_at(tx2, ty1)[p] as f32 * xa;
        let bottom = lut_at(tx1, ty2)[p] as f32 * (1.0 - xa) + lut_at(tx2, ty2)[p] as f32 * xa;
        Luma([saturate_u8(top * (1.0 - ya) + bottom * ya)])
    })
}

/// Clip a histogram at `limit` and spread the excess over all bins; the
/// remainder goes one count at a time to evenly spaced bins
fn clip_histogram(hist: &mut [u32; HIST_BINS], limit: u32) {
    if limit == 0 {
        return;
    }

    let mut clipped = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            clipped += *count - limit;
            *count = limit;
        }
    }

    let batch = clipped / HIST_BINS as u32;
    let mut residual = clipped - batch * HIST_BINS as u32;
    for count in hist.iter_mut() {
        *count += batch;
    }

    if residual > 0 {
        let step = (HIST_BINS / residual as usize).max(1);
        let mut bin = 0;
        while bin < HIST_BINS && residual > 0 {
            hist[bin] += 1;
            bin += step;
            residual -= 1;
        }
    }
}

/// Neighbouring tile indices and blend weight for a tile-space coordinate.
/// The weight is not adjusted when an index is clamped at the border.
fn tile_neighbours(coord: f32, tiles: u32) -> (u32, u32, f32) {
    let first = coord.floor();
    let weight = coord - first;
    let last_tile = tiles as i64 - 1;
    let lo = (first as i64).clamp(0, last_tile) as u32;
    let hi = (first as i64 + 1).clamp(0, last_tile) as u32;
    (lo, hi, weight)
}

/// Reflect-101 border index (`gfedcb|abcdefgh|gfedcba`)
fn reflect_101(index: i64, len: u32) -> u32 {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (i64::from(len) - 1);
    let m = index.rem_euclid(period);
    if m < i64::from(len) {
        m as u32
    } else {
        (period - m) as u32
    }
}

/// Normalized Gaussian weights over `round(6 * sigma + 1) | 1` taps
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let taps = (sigma * 6.0 + 1.0).round() as usize | 1;
    let center = (taps / 2) as f32;
    let denom = 2.0 * sigma * sigma;

    let weights: Vec<f32> = (0..taps)
        .map(|i| {
            let d = i as f32 - center;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Separable Gaussian blur with reflect-101 borders.
///
/// Both passes accumulate in f32; the result is rounded once at the end.
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || sigma <= 0.0 {
        return image.clone();
    }

    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;
    let row_len = width as usize;

    let mut horizontal = vec![0.0f32; row_len * height as usize];
    for y in 0..height {
        for x in 0..width {
            let acc: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sx = reflect_101(i64::from(x) + k as i64 - radius, width);
                    weight * image.get_pixel(sx, y)[0] as f32
                })
                .sum();
            horizontal[y as usize * row_len + x as usize] = acc;
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let acc: f32 = kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| {
                let sy = reflect_101(i64::from(y) + k as i64 - radius, height);
                weight * horizontal[sy as usize * row_len + x as usize]
            })
            .sum();
        Luma([saturate_u8(acc)])
    })
}

/// Unsharp mask: `saturate(1.5 * image - 0.5 * gaussian(image))`
pub fn unsharp_mask(image: &GrayImage, sigma: f32) -> GrayImage {
    let blurred = gaussian_blur(image, sigma);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let original = image.get_pixel(x, y)[0] as f32;
        let blur = blurred.get_pixel(x, y)[0] as f32;
        Luma([saturate_u8(
            SHARPEN_IMAGE_WEIGHT * original + SHARPEN_BLUR_WEIGHT * blur,
        )])
    })
}

/// Bilinear resize with half-pixel centres and edge clamping, per channel.
/// Used for both the grayscale recognizer crop and the RGB detector input.
pub fn resize_bilinear<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    dst_width: u32,
    dst_height: u32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (src_width, src_height) = src.dimensions();
    let mut dst = ImageBuffer::<P, Vec<u8>>::new(dst_width, dst_height);
    if src_width == 0 || src_height == 0 {
        return dst;
    }

    let channels = usize::from(P::CHANNEL_COUNT);
    let src_stride = src_width as usize * channels;
    let dst_stride = dst_width as usize * channels;
    let scale_x = src_width as f32 / dst_width as f32;
    let scale_y = src_height as f32 / dst_height as f32;
    let columns: Vec<(usize, usize, f32)> = (0..dst_width)
        .map(|dx| {
            let (x0, x1, fx) = source_neighbours(dx, scale_x, src_width);
            (x0 as usize * channels, x1 as usize * channels, fx)
        })
        .collect();

    let input: &[u8] = src;
    let output: &mut [u8] = &mut dst;
    for dy in 0..dst_height as usize {
        let (y0, y1, fy) = source_neighbours(dy as u32, scale_y, src_height);
        let row0 = &input[y0 as usize * src_stride..][..src_stride];
        let row1 = &input[y1 as usize * src_stride..][..src_stride];
        let out_row = &mut output[dy * dst_stride..][..dst_stride];

        for (dx, &(x0, x1, fx)) in columns.iter().enumerate() {
            for c in 0..channels {
                let top = row0[x0 + c] as f32 * (1.0 - fx) + row0[x1 + c] as f32 * fx;
                let bottom = row1[x0 + c] as f32 * (1.0 - fx) + row1[x1 + c] as f32 * fx;
                out_row[dx * channels + c] = saturate_u8(top * (1.0 - fy) + bottom * fy);
            }
        }
    }
    dst
}

fn source_neighbours(dst: u32, scale: f32, len: u32) -> (u32, u32, f32) {
    let pos = (dst as f32 + 0.5) * scale - 0.5;
    let mut base = pos.floor();
    let mut frac = pos - base;
    if base < 0.0 {
        base = 0.0;
        frac = 0.0;
    }

    let base = base as u32;
    if base >= len - 1 {
        return (len - 1, len - 1, 0.0);
    }
    (base, base + 1, frac)
}

/// Round half to even and clamp into `u8`
fn saturate_u8(value: f32) -> u8 {
    value.round_ties_even().clamp(0.0, 255.0) as u8
}
