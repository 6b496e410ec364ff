//! Loaded model capabilities for one pipeline run.

use std::fmt;
use std::sync::Arc;

use crate::integration::detector::Detector;
use crate::segmentation::Segmenter;

struct Models {
    detector: Option<Arc<dyn Detector>>,
    segmenter: Option<Arc<dyn Segmenter>>,
}

impl Drop for Models {
    fn drop(&mut self) {
        tracing::debug!(
            detector = self.detector.is_some(),
            segmenter = self.segmenter.is_some(),
            "model context released"
        );
    }
}

/// Explicit holder of the detector and segmenter.
///
/// Built once and handed to [`crate::Pipeline`]; clones share the same
/// models, which are released when the last clone goes away.
#[derive(Clone)]
pub struct ModelContext {
    models: Arc<Models>,
}

impl ModelContext {
    pub fn builder() -> ModelContextBuilder {
        ModelContextBuilder::default()
    }

    pub fn detector(&self) -> Option<Arc<dyn Detector>> {
        self.models.detector.clone()
    }

    pub fn segmenter(&self) -> Option<Arc<dyn Segmenter>> {
        self.models.segmenter.clone()
    }
}

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContext")
            .field("detector", &self.models.detector.is_some())
            .field("segmenter", &self.models.segmenter.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct ModelContextBuilder {
    detector: Option<Arc<dyn Detector>>,
    segmenter: Option<Arc<dyn Segmenter>>,
}

impl ModelContextBuilder {
    pub fn detector(self, detector: impl Detector + 'static) -> Self {
        self.shared_detector(Arc::new(detector))
    }

    pub fn shared_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn segmenter(self, segmenter: impl Segmenter + 'static) -> Self {
        self.shared_segmenter(Arc::new(segmenter))
    }

    pub fn shared_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn build(self) -> ModelContext {
        tracing::debug!(
            detector = self.detector.is_some(),
            segmenter = self.segmenter.is_some(),
            "model context ready"
        );
        ModelContext {
            models: Arc::new(Models {
                detector: self.detector,
                segmenter: self.segmenter,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::BoxSegmenter;

    #[test]
    fn test_clones_share_models() {
        let context = ModelContext::builder().segmenter(BoxSegmenter).build();
        let clone = context.clone();
        assert!(context.detector().is_none());
        let (a, b) = (context.segmenter().unwrap(), clone.segmenter().unwrap());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
