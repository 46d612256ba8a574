/// Image decoding: raw upload bytes to an RGB frame
use crate::error::RecognitionError;
use image::{metadata::Orientation, DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::io::Cursor;

/// A decoded 8-bit RGB frame, row-major.
///
/// Channel order is RGB throughout the engine; grayscale conversion uses the
/// BT.601 weights so it agrees with a BGR-to-gray conversion of the same image.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    image: RgbImage,
}

impl DecodedFrame {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }
}

/// Decode JPEG/PNG bytes into a frame, upright according to its EXIF
/// orientation tag. An unreadable tag leaves the pixels as stored.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedFrame, RecognitionError> {
    if bytes.is_empty() {
        return Err(RecognitionError::Decode("empty image buffer".to_string()));
    }

    let decode_err = |e: image::ImageError| RecognitionError::Decode(e.to_string());
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RecognitionError::Decode(e.to_string()))?
        .into_decoder()
        .map_err(decode_err)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);

    if img.width() == 0 || img.height() == 0 {
        return Err(RecognitionError::Decode(format!(
            "image has no pixels ({}x{})",
            img.width(),
            img.height()
        )));
    }

    Ok(DecodedFrame::from_rgb(img.to_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn test_decode_png() {
        let img = RgbImage::from_pixel(64, 32, Rgb([10, 200, 30]));
        let frame = decode_image(&encode(&img, ImageFormat::Png)).unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 32);
        assert_eq!(frame.as_rgb().get_pixel(5, 5), &Rgb([10, 200, 30]));
    }

    #[test]
    fn test_decode_jpeg() {
        let img = RgbImage::from_pixel(40, 24, Rgb([128, 128, 128]));
        let frame = decode_image(&encode(&img, ImageFormat::Jpeg)).unwrap();
        assert_eq!((frame.width(), frame.height()), (40, 24));
    }

    /// Insert a big-endian EXIF APP1 segment holding only an Orientation tag
    /// right after the JPEG SOI marker
    fn with_exif_orientation(jpeg: &[u8], orientation: u8) -> Vec<u8> {
        let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(b"MM\0\x2A\0\0\0\x08");
        app1.extend_from_slice(&[0x00, 0x01]);
        app1.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        app1.extend_from_slice(&[0x00, orientation, 0x00, 0x00]);
        app1.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let mut bytes = jpeg[..2].to_vec();
        bytes.extend_from_slice(&app1);
        bytes.extend_from_slice(&jpeg[2..]);
        bytes
    }

    #[test]
    fn test_decode_applies_exif_orientation() {
        // Left half red, right half blue; orientation 6 means rotate 90 clockwise
        let img = RgbImage::from_fn(40, 24, |x, _| {
            if x < 20 {
                Rgb([220, 20, 20])
            } else {
                Rgb([20, 20, 220])
            }
        });
        let bytes = with_exif_orientation(&encode(&img, ImageFormat::Jpeg), 6);

        let frame = decode_image(&bytes).unwrap();
        assert_eq!((frame.width(), frame.height()), (24, 40));

        let top = frame.as_rgb().get_pixel(12, 5);
        let bottom = frame.as_rgb().get_pixel(12, 34);
        assert!(top[0] > 150 && top[2] < 100, "top {:?}", top);
        assert!(bottom[2] > 150 && bottom[0] < 100, "bottom {:?}", bottom);
    }

    #[test]
    fn test_decode_without_exif_keeps_layout() {
        let img = RgbImage::from_fn(40, 24, |x, _| Rgb([if x < 20 { 220 } else { 20 }, 20, 20]));
        let frame = decode_image(&with_exif_orientation(&encode(&img, ImageFormat::Jpeg), 1)).unwrap();
        assert_eq!((frame.width(), frame.height()), (40, 24));
        assert!(frame.as_rgb().get_pixel(5, 12)[0] > 150);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = decode_image(b"definitely not an image");
        assert!(matches!(result, Err(RecognitionError::Decode(_))));
    }

    #[test]
    fn test_empty_is_decode_error() {
        assert!(matches!(decode_image(&[]), Err(RecognitionError::Decode(_))));
    }

    #[test]
    fn test_truncated_png_is_decode_error() {
        let img = RgbImage::from_pixel(64, 64, Rgb([1, 2, 3]));
        let bytes = encode(&img, ImageFormat::Png);
        let result = decode_image(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(RecognitionError::Decode(_))));
    }
}
