//! Single object track.

use crate::tracker::kalman_filter::{KalmanFilter, MotionState};
use crate::tracker::matching::Detection;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Single object track.
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique track identifier, never reused within one run
    pub id: u64,
    /// Current lifecycle state
    pub state: TrackState,
    /// Box of the most recent matched detection
    pub last_bbox: Rect,
    /// Class label of the most recent matched detection
    pub label: String,
    /// Confidence of the most recent matched detection
    pub confidence: f32,
    /// Total number of frames with a matched detection
    pub frames_seen: u32,
    /// Consecutive frames without a matched detection
    pub frames_missed_consecutively: u32,
    /// Consecutive matched frames
    pub hits: u32,
    /// Frame the track was spawned on
    pub start_frame: u64,
    /// Last frame a detection was matched to this track
    pub last_matched_frame: u64,
    motion: MotionState,
    embedding: Option<Vec<f32>>,
}

impl Track {
    pub(crate) fn spawn(
        id: u64,
        detection: &Detection,
        kalman_filter: &KalmanFilter,
        frame_index: u64,
        confirmed: bool,
    ) -> Self {
        Self {
            id,
            state: if confirmed {
                TrackState::Confirmed
            } else {
                TrackState::Tentative
            },
            last_bbox: detection.bbox,
            label: detection.label.clone(),
            confidence: detection.confidence,
            frames_seen: 1,
            frames_missed_consecutively: 0,
            hits: 1,
            start_frame: frame_index,
            last_matched_frame: frame_index,
            motion: kalman_filter.initiate(&detection.bbox),
            embedding: detection.embedding.clone(),
        }
    }

    /// Predicted (or, right after an update, filtered) box for the current frame.
    pub fn predicted_bbox(&self) -> Rect {
        self.motion.rect()
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// True when a detection was matched to this track on `frame_index`.
    pub fn matched_at(&self, frame_index: u64) -> bool {
        self.frames_seen > 0 && self.last_matched_frame == frame_index
    }

    /// True when the track is Confirmed and observed on `frame_index`: the
    /// frames that count towards the registry and are eligible for export.
    pub fn is_eligible_at(&self, frame_index: u64) -> bool {
        self.state == TrackState::Confirmed && self.matched_at(frame_index)
    }

    pub fn is_active(&self) -> bool {
        self.state != TrackState::Deleted
    }

    pub(crate) fn predict(&mut self, kalman_filter: &KalmanFilter) {
        let freeze_height = self.state != TrackState::Confirmed;
        self.motion = kalman_filter.predict(&self.motion, freeze_height);
    }

    /// Fold a matched detection into the track.
    pub(crate) fn update(
        &mut self,
        detection: &Detection,
        kalman_filter: &KalmanFilter,
        frame_index: u64,
        min_confirm_frames: u32,
        embedding_momentum: f32,
    ) {
        self.motion = kalman_filter.update(&self.motion, &detection.bbox);
        self.last_bbox = detection.bbox;
        self.label = detection.label.clone();
        self.confidence = detection.confidence;
        self.frames_seen += 1;
        self.hits += 1;
        self.frames_missed_consecutively = 0;
        self.last_matched_frame = frame_index;
        self.blend_embedding(detection.embedding.as_deref(), embedding_momentum);

        match self.state {
            TrackState::Tentative if self.hits >= min_confirm_frames => {
                self.transition(TrackState::Confirmed);
            }
            TrackState::Lost => {
                tracing::debug!(track = self.id, frame = frame_index, "track recovered");
                self.transition(TrackState::Confirmed);
            }
            _ => {}
        }
    }

    /// Register a frame without a matched detection.
    pub(crate) fn mark_missed(&mut self, max_coast_frames: u32, max_lost_frames: u32) {
        self.frames_missed_consecutively += 1;
        self.hits = 0;
        match self.state {
            TrackState::Tentative => self.transition(TrackState::Deleted),
            TrackState::Confirmed if self.frames_missed_consecutively > max_coast_frames => {
                self.transition(TrackState::Lost);
            }
            _ => {}
        }
        if self.state == TrackState::Lost
            && self.frames_missed_consecutively > max_coast_frames + max_lost_frames
        {
            self.transition(TrackState::Deleted);
        }
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.transition(TrackState::Deleted);
    }

    fn transition(&mut self, next: TrackState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "track {}: illegal transition {:?} -> {:?}",
            self.id,
            self.state,
            next
        );
        self.state = next;
    }

    fn blend_embedding(&mut self, observed: Option<&[f32]>, momentum: f32) {
        let Some(observed) = observed else {
            return;
        };
        match &mut self.embedding {
            Some(current) if current.len() == observed.len() => {
                for (c, o) in current.iter_mut().zip(observed) {
                    *c = momentum * *c + (1.0 - momentum) * o;
                }
            }
            slot => *slot = Some(observed.to_vec()),
        }
    }
}
