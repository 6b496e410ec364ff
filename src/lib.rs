//! Track-consistent alpha matte export.
//!
//! An analysis pass runs a detector over every frame and associates the
//! detections into stable track ids (ByteTrack-style two-stage matching
//! with a Kalman motion model). An export pass then takes one id, turns
//! its per-frame boxes into segmentation prompts and writes a densely
//! numbered RGBA PNG sequence plus a manifest mapping output files back to
//! source frames.

pub mod analysis;
pub mod config;
pub mod control;
mod deadline;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod frame;
pub mod integration;
pub mod registry;
pub mod segmentation;
pub mod tracker;

pub use analysis::{Analysis, AnalysisPaths};
pub use config::{ExportConfig, PipelineConfig, TimeoutConfig};
pub use control::{CancellationToken, Pass, PassStatus, Progress, RunControl};
pub use diagnostics::{Diagnostic, Diagnostics, Stage};
pub use error::{
    ConfigError, DetectError, ExportError, PersistError, PipelineError, Result, SegmentError,
    SourceError,
};
pub use export::{ExportManifest, ExportReport, ManifestEntry};
pub use frame::{Frame, FrameSource, ImageSequenceSource, MemorySource};
pub use integration::{
    DetectionSource, Detector, ExclusiveDetector, ModelContext, PassHandle, Pipeline,
    ReplayDetector,
};
pub use registry::{Observation, TrackHistory, TrackMapping, TrackRegistry, TrackSummary};
pub use segmentation::{
    BoxSegmenter, ExclusiveSegmenter, Mask, MaskCandidate, MaskDirSegmenter, SegmentationAdapter,
    SegmentationSource, Segmenter,
};
pub use tracker::{Associator, Detection, Rect, Track, TrackSet, TrackState, Tracker, TrackerConfig};
