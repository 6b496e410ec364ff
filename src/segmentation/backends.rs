//! Segmenters that ship with the crate.

use std::path::{Path, PathBuf};

use crate::error::SegmentError;
use crate::frame::Frame;
use crate::segmentation::mask::Mask;
use crate::segmentation::types::{MaskCandidate, Segmenter};
use crate::tracker::Rect;

/// Returns the prompt rectangle as its only candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxSegmenter;

impl Segmenter for BoxSegmenter {
    fn segment(&self, frame: &Frame, prompt: &Rect) -> Result<Vec<MaskCandidate>, SegmentError> {
        let mask = Mask::hard_box(frame.width(), frame.height(), prompt);
        Ok(vec![MaskCandidate::new(mask.alpha, 1.0)])
    }
}

/// Masks precomputed by an external model, one grayscale image per frame
/// named by zero-padded frame index (`00012.png`).
///
/// Stateless file reads, so concurrent calls are safe.
#[derive(Debug, Clone)]
pub struct MaskDirSegmenter {
    dir: PathBuf,
    index_width: usize,
}

impl MaskDirSegmenter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index_width: 5,
        }
    }

    pub fn with_index_width(mut self, width: usize) -> Self {
        self.index_width = width;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mask_path(&self, frame_index: u64) -> PathBuf {
        self.dir
            .join(format!("{:0width$}.png", frame_index, width = self.index_width))
    }
}

impl Segmenter for MaskDirSegmenter {
    fn segment(&self, frame: &Frame, _prompt: &Rect) -> Result<Vec<MaskCandidate>, SegmentError> {
        let path = self.mask_path(frame.index);
        if !path.is_file() {
            return Err(SegmentError::MissingMask(path));
        }
        let alpha = image::open(&path)
            .map_err(|source| SegmentError::Decode {
                path: path.clone(),
                source,
            })?
            .into_luma8();
        Ok(vec![MaskCandidate::new(alpha, 1.0)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    #[test]
    fn test_box_segmenter_returns_prompt() {
        let frame = Frame::new(1, RgbImage::new(6, 6));
        let out = BoxSegmenter
            .segment(&frame, &Rect::new(1.0, 1.0, 2.0, 2.0))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].foreground_area(), 4);
    }

    #[test]
    fn test_mask_dir_reads_per_frame_png() {
        let dir = tempfile::tempdir().unwrap();
        let segmenter = MaskDirSegmenter::new(dir.path());
        GrayImage::from_pixel(4, 4, Luma([200]))
            .save(segmenter.mask_path(3))
            .unwrap();
        assert!(segmenter.mask_path(3).ends_with("00003.png"));

        let hit = segmenter
            .segment(&Frame::new(3, RgbImage::new(4, 4)), &Rect::default())
            .unwrap();
        assert_eq!(hit[0].alpha.get_pixel(0, 0)[0], 200);

        let miss = segmenter.segment(&Frame::new(4, RgbImage::new(4, 4)), &Rect::default());
        assert!(matches!(miss, Err(SegmentError::MissingMask(_))));
    }
}
