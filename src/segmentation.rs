//! Segmentation collaborators and the adapter that turns a track box into
//! a frame-aligned mask.

mod adapter;
mod backends;
mod mask;
mod types;

pub use adapter::{SegmentationAdapter, Segmented, select_candidate};
pub use backends::{BoxSegmenter, MaskDirSegmenter};
pub use mask::{Mask, MaskOrigin};
pub use types::{ExclusiveSegmenter, MaskCandidate, SegmentationSource, Segmenter};
