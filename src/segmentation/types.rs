use std::sync::Mutex;

use image::{GrayImage, Luma};

use crate::error::SegmentError;
use crate::frame::Frame;
use crate::tracker::Rect;

/// One mask proposed by a segmentation model, with the model's confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskCandidate {
    /// 0 = background, 255 = foreground. Any resolution; the adapter resizes.
    pub alpha: GrayImage,
    pub score: f32,
}

impl MaskCandidate {
    pub fn new(alpha: GrayImage, score: f32) -> Self {
        Self { alpha, score }
    }

    /// Build from a floating-point matte in `[0, 1]`, row-major.
    /// Returns `None` when `matte` does not hold `width * height` values.
    pub fn from_matte(width: u32, height: u32, matte: &[f32], score: f32) -> Option<Self> {
        if matte.len() != (width as usize) * (height as usize) {
            return None;
        }
        let pixels = matte
            .iter()
            .map(|v| {
                let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
                (v * 255.0).round() as u8
            })
            .collect();
        GrayImage::from_raw(width, height, pixels).map(|alpha| Self { alpha, score })
    }

    /// Tight bounding box of non-zero pixels, in the candidate's own resolution.
    pub fn foreground_bounds(&self) -> Option<Rect> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, Luma([v])) in self.alpha.enumerate_pixels() {
            if *v == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
            });
        }
        bounds.map(|(x1, y1, x2, y2)| {
            Rect::from_tlbr(x1 as f32, y1 as f32, (x2 + 1) as f32, (y2 + 1) as f32)
        })
    }

    pub fn foreground_area(&self) -> usize {
        self.alpha.pixels().filter(|p| p[0] > 0).count()
    }
}

/// Segmentation collaborator: masks for the object inside a box prompt.
///
/// Implementations are shared between export workers and must tolerate
/// concurrent calls. Backends that cannot should be wrapped in
/// [`ExclusiveSegmenter`], which serializes access.
pub trait Segmenter: Send + Sync {
    /// Return zero or more candidate masks for the object inside `prompt`.
    fn segment(&self, frame: &Frame, prompt: &Rect) -> Result<Vec<MaskCandidate>, SegmentError>;
}

/// Single-caller segmentation backend, e.g. a model session holding
/// mutable inference state.
pub trait SegmentationSource: Send {
    fn segment(&mut self, frame: &Frame, prompt: &Rect)
    -> Result<Vec<MaskCandidate>, SegmentError>;
}

/// Serializes calls into a [`SegmentationSource`].
pub struct ExclusiveSegmenter<S> {
    inner: Mutex<S>,
}

impl<S: SegmentationSource> ExclusiveSegmenter<S> {
    pub fn new(source: S) -> Self {
        Self {
            inner: Mutex::new(source),
        }
    }

    pub fn into_inner(self) -> Result<S, SegmentError> {
        self.inner
            .into_inner()
            .map_err(|_| SegmentError::Unavailable("backend poisoned by an earlier panic".into()))
    }
}

impl<S: SegmentationSource> Segmenter for ExclusiveSegmenter<S> {
    fn segment(&self, frame: &Frame, prompt: &Rect) -> Result<Vec<MaskCandidate>, SegmentError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SegmentError::Unavailable("backend poisoned by an earlier panic".into()))?;
        inner.segment(frame, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_matte_scales_and_clamps() {
        let c = MaskCandidate::from_matte(2, 2, &[0.0, 0.5, 1.0, 7.0], 0.8).unwrap();
        assert_eq!(c.alpha.as_raw(), &vec![0, 128, 255, 255]);
        assert!(MaskCandidate::from_matte(2, 2, &[0.0], 0.8).is_none());
    }

    #[test]
    fn test_foreground_bounds() {
        let mut alpha = GrayImage::new(10, 10);
        alpha.put_pixel(2, 3, Luma([255]));
        alpha.put_pixel(5, 7, Luma([10]));
        let c = MaskCandidate::new(alpha, 1.0);
        assert_eq!(c.foreground_bounds(), Some(Rect::new(2.0, 3.0, 4.0, 5.0)));
        assert_eq!(c.foreground_area(), 2);
        assert_eq!(MaskCandidate::new(GrayImage::new(3, 3), 1.0).foreground_bounds(), None);
    }

    struct Counting(u32);

    impl SegmentationSource for Counting {
        fn segment(
            &mut self,
            _frame: &Frame,
            _prompt: &Rect,
        ) -> Result<Vec<MaskCandidate>, SegmentError> {
            self.0 += 1;
            Ok(vec![])
        }
    }

    #[test]
    fn test_exclusive_segmenter_serializes_mutable_backend() {
        let segmenter = std::sync::Arc::new(ExclusiveSegmenter::new(Counting(0)));
        let frame = Frame::new(1, image::RgbImage::new(4, 4));
        std::thread::scope(|s| {
            for _ in 0..4 {
                let segmenter = segmenter.clone();
                let frame = frame.clone();
                s.spawn(move || {
                    for _ in 0..10 {
                        segmenter.segment(&frame, &Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
                    }
                });
            }
        });
        let inner = std::sync::Arc::try_unwrap(segmenter).ok().unwrap();
        assert_eq!(inner.into_inner().unwrap().0, 40);
    }
}
