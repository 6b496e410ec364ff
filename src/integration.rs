//! Connects detection and segmentation backends to the tracker and the
//! matte exporter.
//!
//! Backends plug in through the [`Detector`] and [`crate::Segmenter`]
//! capabilities, gathered in a [`ModelContext`] that the [`Pipeline`] owns
//! for the duration of its passes.

mod context;
mod detector;
mod handle;
mod pipeline;

pub use context::{ModelContext, ModelContextBuilder};
pub use detector::{
    DEFAULT_MIN_CONFIDENCE, DetectionSource, Detector, ExclusiveDetector, ReplayDetector,
};
pub use handle::PassHandle;
pub use pipeline::Pipeline;
