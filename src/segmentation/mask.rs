use image::{GrayImage, Luma};

use crate::tracker::Rect;

/// Where a mask came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskOrigin {
    /// Selected model candidate and its score.
    Model { score: f32 },
    /// Rectangular fallback derived from the track's box.
    HardBox,
}

/// Per-frame alpha raster aligned to the frame it was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub alpha: GrayImage,
    pub origin: MaskOrigin,
}

impl Mask {
    /// Fully opaque inside `bbox` (clipped to the raster), transparent elsewhere.
    pub fn hard_box(width: u32, height: u32, bbox: &Rect) -> Self {
        let mut alpha = GrayImage::new(width, height);
        if let Some([x1, y1, x2, y2]) = bbox.pixel_bounds(width, height) {
            for y in y1..y2 {
                for x in x1..x2 {
                    alpha.put_pixel(x, y, Luma([255]));
                }
            }
        }
        Self {
            alpha,
            origin: MaskOrigin::HardBox,
        }
    }

    pub fn width(&self) -> u32 {
        self.alpha.width()
    }

    pub fn height(&self) -> u32 {
        self.alpha.height()
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == MaskOrigin::HardBox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_box_fills_clipped_rect() {
        let mask = Mask::hard_box(8, 6, &Rect::new(6.0, -2.0, 10.0, 4.0));
        assert!(mask.is_fallback());
        let opaque: Vec<(u32, u32)> = mask
            .alpha
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(opaque, vec![(6, 0), (7, 0), (6, 1), (7, 1)]);
    }

    #[test]
    fn test_hard_box_outside_frame_is_empty() {
        let mask = Mask::hard_box(4, 4, &Rect::new(10.0, 10.0, 2.0, 2.0));
        assert!(mask.alpha.pixels().all(|p| p[0] == 0));
    }
}
