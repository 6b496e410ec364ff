//! Detection collaborators.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{DetectError, PersistError};
use crate::frame::Frame;
use crate::tracker::Detection;

/// Object detection backend shared by the analysis pass.
///
/// Called from a prefetch thread while the previous frame is being
/// associated, so implementations must tolerate concurrent calls.
/// Backends that cannot should go through [`ExclusiveDetector`].
///
/// # Example
///
/// ```ignore
/// use trackmatte::{Detection, DetectError, Detector, Frame};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl Detector for MyDetector {
///     fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait Detector: Send + Sync {
    /// Detections for one frame. Stateless across calls.
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;
}

/// Detection backend that needs exclusive access, e.g. a model session
/// with mutable scratch buffers.
pub trait DetectionSource: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;
}

/// Serializes calls into a [`DetectionSource`].
pub struct ExclusiveDetector<S> {
    inner: Mutex<S>,
}

impl<S: DetectionSource> ExclusiveDetector<S> {
    pub fn new(source: S) -> Self {
        Self {
            inner: Mutex::new(source),
        }
    }
}

impl<S: DetectionSource> Detector for ExclusiveDetector<S> {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DetectError::Unavailable("backend poisoned by an earlier panic".into()))?;
        inner.detect(frame)
    }
}

/// Minimum confidence a replayed detection needs to be kept.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;

/// Replays detections recorded by an external detector.
///
/// The file is a JSON array of detections, each tagged with the
/// `frame_index` it belongs to:
///
/// ```json
/// [{"frame_index": 1, "bbox": [10, 20, 40, 80], "label": "dog", "confidence": 0.91}]
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: BTreeMap<u64, Vec<Detection>>,
    min_confidence: f32,
}

impl ReplayDetector {
    pub fn new(detections: impl IntoIterator<Item = Detection>) -> Self {
        let mut frames: BTreeMap<u64, Vec<Detection>> = BTreeMap::new();
        for det in detections {
            frames.entry(det.frame_index).or_default().push(det);
        }
        Self {
            frames,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn from_json(path: &Path) -> Result<Self, PersistError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let detections: Vec<Detection> =
            serde_json::from_str(&contents).map_err(|source| PersistError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(
            path = %path.display(),
            detections = detections.len(),
            "loaded recorded detections"
        );
        Ok(Self::new(detections))
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Frames that have at least one recorded detection.
    pub fn frames(&self) -> impl Iterator<Item = u64> + '_ {
        self.frames.keys().copied()
    }
}

impl Detector for ReplayDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        Ok(self
            .frames
            .get(&frame.index)
            .map(|dets| {
                dets.iter()
                    .filter(|d| d.confidence >= self.min_confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
