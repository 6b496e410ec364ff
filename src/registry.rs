//! Per-id summaries accumulated over an analysis pass.
//!
//! Only frames in which a track is Confirmed and actually observed are
//! counted, so tracks that never leave Tentative never appear in the
//! finalized mapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tracker::{Rect, Track, TrackSet};

/// One eligible frame of a track: where it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub frame: u64,
    pub bbox: Rect,
}

/// Persisted per-id summary, the contract the selection layer relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub label: String,
    pub frames: u32,
}

/// Id-keyed summaries. Serialized as a JSON object with string keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackMapping(BTreeMap<u64, TrackSummary>);

impl TrackMapping {
    pub fn get(&self, id: u64) -> Option<&TrackSummary> {
        self.0.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.0.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &TrackSummary)> {
        self.0.iter().map(|(id, summary)| (*id, summary))
    }
}

/// Ordered eligible-frame boxes per id; what the export pass consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackHistory(BTreeMap<u64, Vec<Observation>>);

impl TrackHistory {
    pub fn observations(&self, id: u64) -> Option<&[Observation]> {
        self.0.get(&id).map(Vec::as_slice)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.keys().copied()
    }
}

/// Full summary of one track, including its observed span.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub id: u64,
    pub label: String,
    pub frame_count: u32,
    pub first_frame: u64,
    pub last_frame: u64,
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    // first-seen order doubles as the tie-break
    label_votes: Vec<(String, u32)>,
    observations: Vec<Observation>,
}

impl Accumulator {
    fn vote(&mut self, label: &str) {
        match self.label_votes.iter_mut().find(|(l, _)| l == label) {
            Some((_, count)) => *count += 1,
            None => self.label_votes.push((label.to_owned(), 1)),
        }
    }

    fn majority_label(&self) -> String {
        let mut best: Option<&(String, u32)> = None;
        for vote in &self.label_votes {
            if best.is_none_or(|b| vote.1 > b.1) {
                best = Some(vote);
            }
        }
        best.map(|(label, _)| label.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackRegistry {
    tracks: BTreeMap<u64, Accumulator>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one track snapshot for `frame_index`. Snapshots that are not
    /// Confirmed-and-observed on that frame are ignored, as are repeats.
    pub fn observe(&mut self, track: &Track, frame_index: u64) {
        if !track.is_eligible_at(frame_index) {
            return;
        }
        let acc = self.tracks.entry(track.id).or_default();
        if acc
            .observations
            .last()
            .is_some_and(|o| o.frame >= frame_index)
        {
            return;
        }
        acc.vote(&track.label);
        acc.observations.push(Observation {
            frame: frame_index,
            bbox: track.last_bbox,
        });
    }

    /// Observe every track of a freshly associated frame.
    pub fn observe_set(&mut self, tracks: &TrackSet) {
        let Some(frame_index) = tracks.last_frame() else {
            return;
        };
        for track in tracks.tracks() {
            self.observe(track, frame_index);
        }
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.tracks
            .iter()
            .filter_map(|(&id, acc)| {
                let first = acc.observations.first()?;
                let last = acc.observations.last()?;
                Some(RegistryEntry {
                    id,
                    label: acc.majority_label(),
                    frame_count: acc.observations.len() as u32,
                    first_frame: first.frame,
                    last_frame: last.frame,
                })
            })
            .collect()
    }

    /// The id -> `{label, frames}` mapping. Valid at any point of a pass.
    pub fn finalize(&self) -> TrackMapping {
        TrackMapping(
            self.entries()
                .into_iter()
                .map(|e| {
                    (
                        e.id,
                        TrackSummary {
                            label: e.label,
                            frames: e.frame_count,
                        },
                    )
                })
                .collect(),
        )
    }

    pub fn history(&self) -> TrackHistory {
        TrackHistory(
            self.tracks
                .iter()
                .filter(|(_, acc)| !acc.observations.is_empty())
                .map(|(&id, acc)| (id, acc.observations.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{Detection, Tracker, TrackerConfig};

    fn det(label: &str) -> Detection {
        Detection::from_rect(Rect::new(10.0, 10.0, 50.0, 80.0), 0.9).with_label(label)
    }

    fn run(labels: &[&str], config: TrackerConfig) -> TrackRegistry {
        let mut tracker = Tracker::new(config);
        let mut registry = TrackRegistry::new();
        for (i, label) in labels.iter().enumerate() {
            tracker.update(&[det(label)], i as u64 + 1);
            registry.observe_set(tracker.tracks());
        }
        registry
    }

    #[test]
    fn test_majority_label() {
        let registry = run(&["cat", "dog", "dog", "cat", "dog"], TrackerConfig::default());
        let mapping = registry.finalize();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get(1).unwrap().label, "dog");
        assert_eq!(mapping.get(1).unwrap().frames, 5);
    }

    #[test]
    fn test_label_tie_goes_to_first_seen() {
        let registry = run(&["cat", "dog", "dog", "cat"], TrackerConfig::default());
        assert_eq!(registry.finalize().get(1).unwrap().label, "cat");
    }

    #[test]
    fn test_tentative_only_tracks_excluded() {
        let config = TrackerConfig {
            confirm_on_first_frame: false,
            min_confirm_frames: 3,
            ..Default::default()
        };
        let registry = run(&["cat", "cat"], config);
        assert!(registry.finalize().is_empty());
        assert!(registry.history().ids().next().is_none());
    }

    #[test]
    fn test_tentative_frames_not_counted() {
        let config = TrackerConfig {
            confirm_on_first_frame: false,
            min_confirm_frames: 3,
            ..Default::default()
        };
        let registry = run(&["cat"; 5], config);
        let entries = registry.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].frame_count, 3);
        assert_eq!(entries[0].first_frame, 3);
        assert_eq!(entries[0].last_frame, 5);
    }

    #[test]
    fn test_repeat_observation_ignored() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let mut registry = TrackRegistry::new();
        tracker.update(&[det("cat")], 1);
        registry.observe_set(tracker.tracks());
        registry.observe_set(tracker.tracks());
        assert_eq!(registry.finalize().get(1).unwrap().frames, 1);
    }

    #[test]
    fn test_mapping_json_has_string_keys() {
        let registry = run(&["person"; 2], TrackerConfig::default());
        let json = serde_json::to_string(&registry.finalize()).unwrap();
        assert_eq!(json, r#"{"1":{"label":"person","frames":2}}"#);
        let back: TrackMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back, registry.finalize());
    }
}
