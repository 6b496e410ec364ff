//! Box prompt construction and mask normalization around a [`Segmenter`].

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use image::imageops::{self, FilterType};

use crate::deadline::{WaitError, call_bounded};
use crate::diagnostics::{Diagnostic, Stage};
use crate::frame::Frame;
use crate::segmentation::mask::{Mask, MaskOrigin};
use crate::segmentation::types::{MaskCandidate, Segmenter};
use crate::tracker::Rect;

/// Mask for one frame plus the reason it fell back to a hard box, if it did.
#[derive(Debug, Clone)]
pub struct Segmented {
    pub mask: Mask,
    pub diagnostic: Option<Diagnostic>,
}

#[derive(Clone)]
pub struct SegmentationAdapter {
    segmenter: Arc<dyn Segmenter>,
    padding: f32,
    timeout: Option<Duration>,
}

impl SegmentationAdapter {
    pub fn new(segmenter: Arc<dyn Segmenter>, padding: f32, timeout: Option<Duration>) -> Self {
        Self {
            segmenter,
            padding: padding.max(0.0),
            timeout,
        }
    }

    /// The track box grown by the padding and clamped to the frame.
    pub fn prompt(&self, frame: &Frame, bbox: &Rect) -> Rect {
        let [x1, y1, x2, y2] = bbox.expand(self.padding).to_tlbr();
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Rect::from_tlbr(
            x1.clamp(0.0, w),
            y1.clamp(0.0, h),
            x2.clamp(0.0, w),
            y2.clamp(0.0, h),
        )
    }

    /// Never fails: any collaborator problem degrades to the hard box of `bbox`.
    pub fn segment(&self, frame: &Frame, bbox: &Rect) -> Segmented {
        let prompt = self.prompt(frame, bbox);
        let segmenter = Arc::clone(&self.segmenter);
        let call_frame = frame.clone();
        let outcome = call_bounded("segment", self.timeout, move || {
            segmenter.segment(&call_frame, &prompt)
        });

        let candidates = match outcome {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(err)) => return fallback(frame, bbox, format!("segmentation failed: {err}")),
            Err(WaitError::TimedOut(after)) => {
                return fallback(frame, bbox, format!("segmentation timed out after {after:?}"));
            }
            Err(WaitError::Aborted) => return fallback(frame, bbox, "segmentation call aborted"),
        };

        let offered = candidates.len();
        match select_candidate(candidates, frame.width(), frame.height(), bbox) {
            Some(mask) => Segmented {
                mask,
                diagnostic: None,
            },
            None => fallback(
                frame,
                bbox,
                format!("no usable mask among {offered} candidate(s)"),
            ),
        }
    }
}

fn fallback(frame: &Frame, bbox: &Rect, reason: impl Into<String>) -> Segmented {
    let reason = reason.into();
    Segmented {
        mask: Mask::hard_box(frame.width(), frame.height(), bbox),
        diagnostic: Some(Diagnostic::new(
            frame.index,
            Stage::Segment,
            format!("{reason}; using box mask"),
        )),
    }
}

fn rank_score(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Resize candidates to the frame and keep the best usable one: highest
/// score, then best IoU between its foreground and `bbox`, then largest
/// foreground. Empty candidates are never usable.
pub fn select_candidate(
    candidates: Vec<MaskCandidate>,
    width: u32,
    height: u32,
    bbox: &Rect,
) -> Option<Mask> {
    let mut best: Option<(f32, f32, usize, MaskCandidate)> = None;

    for candidate in candidates {
        if candidate.alpha.width() == 0 || candidate.alpha.height() == 0 {
            continue;
        }
        let candidate = if candidate.alpha.dimensions() == (width, height) {
            candidate
        } else {
            MaskCandidate::new(
                imageops::resize(&candidate.alpha, width, height, FilterType::Triangle),
                candidate.score,
            )
        };
        let Some(bounds) = candidate.foreground_bounds() else {
            continue;
        };
        let key = (
            rank_score(candidate.score),
            bounds.iou(bbox),
            candidate.foreground_area(),
        );

        let better = match &best {
            None => true,
            Some((score, iou, area, _)) => key
                .0
                .total_cmp(score)
                .then(key.1.total_cmp(iou))
                .then(key.2.cmp(area))
                == Ordering::Greater,
        };
        if better {
            best = Some((key.0, key.1, key.2, candidate));
        }
    }

    best.map(|(_, _, _, candidate)| Mask {
        alpha: candidate.alpha,
        origin: MaskOrigin::Model {
            score: candidate.score,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentError;
    use image::{GrayImage, Luma, RgbImage};

    fn block(w: u32, h: u32, x1: u32, y1: u32, x2: u32, y2: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x1..x2).contains(&x) && (y1..y2).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    struct Fixed(Vec<MaskCandidate>);

    impl Segmenter for Fixed {
        fn segment(&self, _: &Frame, _: &Rect) -> Result<Vec<MaskCandidate>, SegmentError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl Segmenter for Failing {
        fn segment(&self, _: &Frame, _: &Rect) -> Result<Vec<MaskCandidate>, SegmentError> {
            Err(SegmentError::Inference("out of memory".into()))
        }
    }

    struct Sleepy;

    impl Segmenter for Sleepy {
        fn segment(&self, _: &Frame, _: &Rect) -> Result<Vec<MaskCandidate>, SegmentError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![])
        }
    }

    fn frame() -> Frame {
        Frame::new(4, RgbImage::new(20, 10))
    }

    #[test]
    fn test_prompt_is_padded_and_clamped() {
        let adapter = SegmentationAdapter::new(Arc::new(Failing), 40.0, None);
        let prompt = adapter.prompt(&frame(), &Rect::new(5.0, 2.0, 4.0, 4.0));
        assert_eq!(prompt, Rect::new(0.0, 0.0, 20.0, 10.0));
        let adapter = SegmentationAdapter::new(Arc::new(Failing), 1.0, None);
        let prompt = adapter.prompt(&frame(), &Rect::new(5.0, 2.0, 4.0, 4.0));
        assert_eq!(prompt, Rect::new(4.0, 1.0, 6.0, 6.0));
    }

    #[test]
    fn test_highest_score_wins_regardless_of_position() {
        let candidates = vec![
            MaskCandidate::new(block(20, 10, 0, 0, 2, 2), 0.4),
            MaskCandidate::new(block(20, 10, 5, 2, 9, 6), 0.9),
            MaskCandidate::new(block(20, 10, 5, 2, 9, 6), 0.6),
        ];
        let mask = select_candidate(candidates, 20, 10, &Rect::new(5.0, 2.0, 4.0, 4.0)).unwrap();
        assert_eq!(mask.origin, MaskOrigin::Model { score: 0.9 });
    }

    #[test]
    fn test_score_tie_broken_by_box_iou() {
        let candidates = vec![
            MaskCandidate::new(block(20, 10, 0, 0, 20, 10), 0.7),
            MaskCandidate::new(block(20, 10, 5, 2, 9, 6), 0.7),
        ];
        let mask = select_candidate(candidates, 20, 10, &Rect::new(5.0, 2.0, 4.0, 4.0)).unwrap();
        assert_eq!(mask.alpha, block(20, 10, 5, 2, 9, 6));
    }

    #[test]
    fn test_candidate_resized_to_frame() {
        let candidates = vec![MaskCandidate::new(block(10, 5, 0, 0, 10, 5), 0.5)];
        let mask = select_candidate(candidates, 20, 10, &Rect::new(0.0, 0.0, 20.0, 10.0)).unwrap();
        assert_eq!(mask.alpha.dimensions(), (20, 10));
    }

    #[test]
    fn test_empty_candidates_fall_back_to_box() {
        let adapter = SegmentationAdapter::new(
            Arc::new(Fixed(vec![MaskCandidate::new(GrayImage::new(20, 10), 0.99)])),
            0.0,
            None,
        );
        let bbox = Rect::new(2.0, 2.0, 3.0, 3.0);
        let out = adapter.segment(&frame(), &bbox);
        assert_eq!(out.mask, Mask::hard_box(20, 10, &bbox));
        let diagnostic = out.diagnostic.unwrap();
        assert_eq!(diagnostic.frame_index, 4);
        assert_eq!(diagnostic.stage, Stage::Segment);
    }

    #[test]
    fn test_error_falls_back_to_box() {
        let adapter = SegmentationAdapter::new(Arc::new(Failing), 40.0, None);
        let bbox = Rect::new(2.0, 2.0, 3.0, 3.0);
        let out = adapter.segment(&frame(), &bbox);
        assert!(out.mask.is_fallback());
        assert!(out.diagnostic.unwrap().message.contains("out of memory"));
    }

    #[test]
    fn test_timeout_falls_back_to_box() {
        let adapter =
            SegmentationAdapter::new(Arc::new(Sleepy), 0.0, Some(Duration::from_millis(10)));
        let out = adapter.segment(&frame(), &Rect::new(2.0, 2.0, 3.0, 3.0));
        assert!(out.mask.is_fallback());
        assert!(out.diagnostic.unwrap().message.contains("timed out"));
    }
}
