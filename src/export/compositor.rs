//! Straight-alpha matte compositing and PNG encoding.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use thiserror::Error;

use crate::segmentation::Mask;

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("mask is {mask:?} but frame is {frame:?}")]
    DimensionMismatch { frame: (u32, u32), mask: (u32, u32) },
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Merge frame color with mask alpha. RGB is copied unmodified wherever
/// alpha > 0 and zeroed elsewhere; no premultiplication.
pub fn composite(frame: &RgbImage, mask: &Mask) -> Result<RgbaImage, CompositeError> {
    if frame.dimensions() != mask.alpha.dimensions() {
        return Err(CompositeError::DimensionMismatch {
            frame: frame.dimensions(),
            mask: mask.alpha.dimensions(),
        });
    }

    let rgba = RgbaImage::from_fn(frame.width(), frame.height(), |x, y| {
        let a = mask.alpha.get_pixel(x, y)[0];
        if a == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            let Rgb([r, g, b]) = *frame.get_pixel(x, y);
            Rgba([r, g, b, a])
        }
    });
    Ok(rgba)
}

/// Encode to PNG in memory. Identical rasters always give identical bytes.
pub fn encode_png(rgba: &RgbaImage) -> Result<Vec<u8>, CompositeError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::MaskOrigin;
    use crate::tracker::Rect;
    use image::{GrayImage, Luma};

    fn frame() -> RgbImage {
        RgbImage::from_fn(4, 2, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 200]))
    }

    #[test]
    fn test_straight_alpha_copy() {
        let alpha = GrayImage::from_fn(4, 2, |x, _| Luma([[0, 64, 128, 255][x as usize]]));
        let mask = Mask {
            alpha,
            origin: MaskOrigin::Model { score: 1.0 },
        };
        let out = composite(&frame(), &mask).unwrap();
        assert_eq!(*out.get_pixel(0, 1), Rgba([0, 0, 0, 0]));
        // soft alpha keeps the source color untouched
        assert_eq!(*out.get_pixel(1, 1), Rgba([10, 10, 200, 64]));
        assert_eq!(*out.get_pixel(3, 0), Rgba([30, 0, 200, 255]));
    }

    #[test]
    fn test_hard_box_composite() {
        let mask = Mask::hard_box(4, 2, &Rect::new(2.0, 0.0, 2.0, 1.0));
        let out = composite(&frame(), &mask).unwrap();
        let opaque = out.pixels().filter(|p| p[3] == 255).count();
        assert_eq!(opaque, 2);
        assert_eq!(*out.get_pixel(2, 0), Rgba([20, 0, 200, 255]));
        assert_eq!(*out.get_pixel(2, 1), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mask = Mask::hard_box(3, 3, &Rect::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(
            composite(&frame(), &mask),
            Err(CompositeError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_png_roundtrip_is_lossless() {
        let mask = Mask::hard_box(4, 2, &Rect::new(1.0, 0.0, 2.0, 2.0));
        let rgba = composite(&frame(), &mask).unwrap();
        let bytes = encode_png(&rgba).unwrap();
        assert_eq!(bytes, encode_png(&rgba).unwrap());
        let decoded = image::load_from_memory(&bytes).unwrap().into_rgba8();
        assert_eq!(decoded, rgba);
    }
}
