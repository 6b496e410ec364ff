//! Frame-to-frame association: the ByteTrack two-stage matcher with an
//! explicit Tentative/Confirmed/Lost/Deleted lifecycle.

use ndarray::Array2;

use crate::diagnostics::{Diagnostic, Stage};
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::track::Track;
use crate::tracker::track_state::TrackState;

/// Configuration for the associator.
///
/// Deserializes field-by-field: a partial JSON object keeps the defaults
/// for every field it omits.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// High-confidence split; also the minimum confidence to start a track.
    pub track_thresh: f32,
    /// Detections at or below this confidence are ignored.
    pub low_thresh: f32,
    /// Maximum cost accepted in the first association.
    pub match_thresh: f32,
    /// Maximum cost accepted when matching low-confidence detections.
    pub low_match_thresh: f32,
    /// Maximum cost accepted when matching Tentative tracks.
    pub tentative_match_thresh: f32,
    /// Consecutive matches needed for Tentative -> Confirmed.
    pub min_confirm_frames: u32,
    /// Tracks born on the first analyzed frame start Confirmed.
    pub confirm_on_first_frame: bool,
    /// Misses a Confirmed track tolerates before it becomes Lost.
    pub max_coast_frames: u32,
    /// Frames a Lost track may stay unmatched before it is Deleted.
    pub max_lost_frames: u32,
    /// IoU above which overlapping boxes are treated as the same object.
    pub duplicate_iou: f32,
    /// Scale IoU similarity by detection confidence.
    pub fuse_score: bool,
    /// Weight of the appearance distance in the association cost.
    pub appearance_weight: f32,
    /// EMA momentum of the per-track embedding.
    pub embedding_momentum: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.5,
            low_thresh: 0.1,
            match_thresh: 0.8,
            low_match_thresh: 0.5,
            tentative_match_thresh: 0.7,
            min_confirm_frames: 2,
            confirm_on_first_frame: true,
            max_coast_frames: 0,
            max_lost_frames: 30,
            duplicate_iou: 0.85,
            fuse_score: true,
            appearance_weight: 0.0,
            embedding_momentum: 0.9,
        }
    }
}

/// Track state carried from one frame to the next.
///
/// Holds every live track plus the tracks deleted on the most recent
/// frame, and the id allocator, so that [`Associator::associate`] is a
/// pure function of its inputs.
#[derive(Debug, Clone)]
pub struct TrackSet {
    tracks: Vec<Track>,
    next_id: u64,
    last_frame: Option<u64>,
}

impl Default for TrackSet {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            last_frame: None,
        }
    }
}

impl TrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Frame index of the last association, if any.
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// Confirmed tracks observed on the last associated frame.
    pub fn eligible(&self) -> impl Iterator<Item = &Track> {
        let frame = self.last_frame;
        self.tracks
            .iter()
            .filter(move |t| frame.is_some_and(|f| t.is_eligible_at(f)))
    }

    /// Number of ids handed out so far.
    pub fn ids_allocated(&self) -> u64 {
        self.next_id - 1
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Result of associating one frame.
#[derive(Debug, Clone)]
pub struct Association {
    pub tracks: TrackSet,
    pub diagnostics: Vec<Diagnostic>,
}

/// Stateless association step. All carried state is in [`TrackSet`].
#[derive(Debug, Clone)]
pub struct Associator {
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
}

impl Associator {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            kalman_filter: KalmanFilter::default(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn associate(
        &self,
        prior: TrackSet,
        detections: &[Detection],
        frame_index: u64,
    ) -> Association {
        let cfg = &self.config;
        let kf = &self.kalman_filter;
        let is_first_frame = prior.last_frame.is_none();
        let mut next_id = prior.next_id;
        let mut diagnostics = Vec::new();

        let mut tracks: Vec<Track> = prior.tracks.into_iter().filter(Track::is_active).collect();
        let mut matched = vec![false; tracks.len()];

        // Step 1: validate and split detections into high-score and low-score
        let mut detections_high: Vec<&Detection> = Vec::new();
        let mut detections_low: Vec<&Detection> = Vec::new();
        for (i, det) in detections.iter().enumerate() {
            if let Err(reason) = det.validate() {
                diagnostics.push(Diagnostic::new(
                    frame_index,
                    Stage::Associate,
                    format!("dropped detection #{i} ({reason})"),
                ));
                continue;
            }
            if det.confidence >= cfg.track_thresh {
                detections_high.push(det);
            } else if det.confidence > cfg.low_thresh {
                detections_low.push(det);
            }
        }

        // Step 2: predict confirmed and lost tracks, first association with high score detections
        let pool: Vec<usize> = (0..tracks.len())
            .filter(|&i| tracks[i].state != TrackState::Tentative)
            .collect();
        for &i in &pool {
            tracks[i].predict(kf);
        }
        let predicted: Vec<Rect> = tracks.iter().map(Track::predicted_bbox).collect();

        let pool_rects: Vec<Rect> = pool.iter().map(|&i| predicted[i]).collect();
        let mut dists = self.motion_cost(&pool_rects, &detections_high);
        let pool_embeddings: Vec<Option<&[f32]>> = pool.iter().map(|&i| tracks[i].embedding()).collect();
        matching::fuse_appearance(
            &mut dists,
            &pool_embeddings,
            &detections_high,
            cfg.appearance_weight,
        );

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, cfg.match_thresh);

        let mut claimed: Vec<Rect> = Vec::new();
        for (itracked, idet) in matches {
            let i = pool[itracked];
            claimed.push(predicted[i]);
            self.apply_match(&mut tracks[i], detections_high[idet], frame_index);
            matched[i] = true;
        }

        // Step 3: second association, low score detections against still-confirmed tracks.
        // Low score boxes sitting on a track that was already claimed are duplicates.
        let detections_second: Vec<&Detection> = detections_low
            .into_iter()
            .filter(|det| {
                !claimed
                    .iter()
                    .any(|rect| rect.iou(&det.bbox) > cfg.duplicate_iou)
            })
            .collect();
        let r_tracked: Vec<usize> = unmatched_tracks
            .iter()
            .map(|&k| pool[k])
            .filter(|&i| tracks[i].state == TrackState::Confirmed)
            .collect();

        let r_rects: Vec<Rect> = r_tracked.iter().map(|&i| predicted[i]).collect();
        let det_low_rects: Vec<Rect> = detections_second.iter().map(|d| d.bbox).collect();
        let dists_second = matching::iou_distance(&r_rects, &det_low_rects);
        let second = matching::linear_assignment(&dists_second, cfg.low_match_thresh);
        for (itracked, idet) in second.matches {
            let i = r_tracked[itracked];
            self.apply_match(&mut tracks[i], detections_second[idet], frame_index);
            matched[i] = true;
        }

        // Deal with tentative tracks, usually tracks with only one beginning frame
        let tentative: Vec<usize> = (0..tracks.len())
            .filter(|&i| tracks[i].state == TrackState::Tentative)
            .collect();
        let detections_rem: Vec<&Detection> = unmatched_detections
            .iter()
            .map(|&j| detections_high[j])
            .collect();
        let tentative_rects: Vec<Rect> = tentative.iter().map(|&i| predicted[i]).collect();
        let dist_tentative = self.motion_cost(&tentative_rects, &detections_rem);
        let third = matching::linear_assignment(&dist_tentative, cfg.tentative_match_thresh);
        for (itracked, idet) in third.matches {
            let i = tentative[itracked];
            self.apply_match(&mut tracks[i], detections_rem[idet], frame_index);
            matched[i] = true;
        }

        // Step 4: everything that was not matched ages
        for (track, &was_matched) in tracks.iter_mut().zip(&matched) {
            if !was_matched {
                let before = track.state;
                track.mark_missed(cfg.max_coast_frames, cfg.max_lost_frames);
                if before != track.state {
                    tracing::debug!(
                        track = track.id,
                        frame = frame_index,
                        from = ?before,
                        to = ?track.state,
                        "track state changed"
                    );
                }
            }
        }

        // Step 5: lost tracks shadowing a confirmed track are dropped
        let confirmed_rects: Vec<Rect> = tracks
            .iter()
            .filter(|t| t.is_eligible_at(frame_index))
            .map(|t| t.last_bbox)
            .collect();
        for track in tracks.iter_mut().filter(|t| t.state == TrackState::Lost) {
            let shadow = track.predicted_bbox();
            if confirmed_rects
                .iter()
                .any(|rect| rect.iou(&shadow) > cfg.duplicate_iou)
            {
                tracing::debug!(track = track.id, frame = frame_index, "dropping duplicate lost track");
                track.mark_deleted();
            }
        }

        // Step 6: init new tracks
        let start_confirmed =
            (is_first_frame && cfg.confirm_on_first_frame) || cfg.min_confirm_frames <= 1;
        for idet in third.unmatched_detections {
            let det = detections_rem[idet];
            if det.confidence < cfg.track_thresh {
                continue;
            }
            let track = Track::spawn(next_id, det, kf, frame_index, start_confirmed);
            tracing::debug!(track = next_id, frame = frame_index, label = %det.label, "track started");
            next_id += 1;
            tracks.push(track);
        }

        Association {
            tracks: TrackSet {
                tracks,
                next_id,
                last_frame: Some(frame_index),
            },
            diagnostics,
        }
    }

    fn motion_cost(&self, track_rects: &[Rect], detections: &[&Detection]) -> Array2<f32> {
        let det_rects: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let mut dists = matching::iou_distance(track_rects, &det_rects);
        if self.config.fuse_score {
            matching::fuse_score(&mut dists, detections);
        }
        dists
    }

    fn apply_match(&self, track: &mut Track, det: &Detection, frame_index: u64) {
        track.update(
            det,
            &self.kalman_filter,
            frame_index,
            self.config.min_confirm_frames,
            self.config.embedding_momentum,
        );
    }
}

/// Stateful convenience wrapper over [`Associator`] and [`TrackSet`].
pub struct Tracker {
    associator: Associator,
    tracks: TrackSet,
    diagnostics: Vec<Diagnostic>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            associator: Associator::new(config),
            tracks: TrackSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Associate one frame and return the tracks eligible on it.
    pub fn update(&mut self, detections: &[Detection], frame_index: u64) -> Vec<Track> {
        let prior = std::mem::take(&mut self.tracks);
        let Association {
            tracks,
            diagnostics,
        } = self.associator.associate(prior, detections, frame_index);
        self.tracks = tracks;
        self.diagnostics.extend(diagnostics);
        self.tracks.eligible().cloned().collect()
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, confidence: f32) -> Detection {
        Detection::from_rect(Rect::new(x, 100.0, 100.0, 100.0), confidence).with_label("car")
    }

    #[test]
    fn test_empty_detections_yield_no_tracks() {
        let associator = Associator::new(TrackerConfig::default());
        let out = associator.associate(TrackSet::new(), &[], 1);
        assert!(out.tracks.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_first_frame_tracks_start_confirmed() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let tracks = tracker.update(&[det(0.0, 0.9), det(400.0, 0.9)], 1);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, 1);
        assert_eq!(tracks[1].id, 2);
    }

    #[test]
    fn test_later_tracks_start_tentative() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.update(&[], 1);
        assert!(tracker.update(&[det(0.0, 0.9)], 2).is_empty());
        assert_eq!(tracker.tracks().tracks()[0].state, TrackState::Tentative);
        let tracks = tracker.update(&[det(2.0, 0.9)], 3);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, 1);
    }

    #[test]
    fn test_malformed_detection_dropped_with_diagnostic() {
        let associator = Associator::new(TrackerConfig::default());
        let bad = Detection::from_rect(Rect::new(0.0, 0.0, -4.0, 10.0), 0.9);
        let out = associator.associate(TrackSet::new(), &[bad, det(0.0, 0.9)], 1);
        assert_eq!(out.tracks.tracks().len(), 1);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].stage, Stage::Associate);
        assert_eq!(out.diagnostics[0].frame_index, 1);
    }

    #[test]
    fn test_low_confidence_does_not_start_track() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        assert!(tracker.update(&[det(0.0, 0.3)], 1).is_empty());
        assert_eq!(tracker.tracks().ids_allocated(), 0);
    }

    #[test]
    fn test_low_confidence_continues_confirmed_track() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let id = tracker.update(&[det(0.0, 0.9)], 1)[0].id;
        let tracks = tracker.update(&[det(1.0, 0.3)], 2);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, id);
    }

    #[test]
    fn test_low_confidence_duplicate_suppressed() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.update(&[det(0.0, 0.9)], 1);
        // The weak duplicate of the matched object must not feed any other track.
        let tracks = tracker.update(&[det(0.0, 0.9), det(1.0, 0.3)], 2);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracker.tracks().ids_allocated(), 1);
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let associator = Associator::new(TrackerConfig::default());
        let frames = [
            vec![det(0.0, 0.9), det(300.0, 0.8)],
            vec![det(3.0, 0.9), det(297.0, 0.8)],
            vec![det(6.0, 0.9)],
        ];
        let run = || {
            let mut set = TrackSet::new();
            let mut out = Vec::new();
            for (i, dets) in frames.iter().enumerate() {
                set = associator.associate(set, dets, i as u64 + 1).tracks;
                out.push(
                    set.tracks()
                        .iter()
                        .map(|t| (t.id, t.state, t.last_bbox))
                        .collect::<Vec<_>>(),
                );
            }
            out
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_config_partial_override() {
        let cfg: TrackerConfig =
            serde_json::from_str(r#"{"max_lost_frames": 3, "track_thresh": 0.6}"#).unwrap();
        assert_eq!(cfg.max_lost_frames, 3);
        assert_eq!(cfg.track_thresh, 0.6);
        assert_eq!(cfg.match_thresh, TrackerConfig::default().match_thresh);
    }
}
