//! Matching utilities for multi-object tracking.

use crate::tracker::rect::{Rect, iou_batch};
use ndarray::Array2;

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    /// Frame the detection was produced for
    #[serde(default)]
    pub frame_index: u64,
    /// Bounding box in TLWH format
    pub bbox: Rect,
    /// Class label reported by the detector
    #[serde(default)]
    pub label: String,
    /// Detection confidence in `[0, 1]`
    pub confidence: f32,
    /// Optional appearance embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Why a detection was rejected before association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    NonPositiveBox,
    ConfidenceOutOfRange,
}

impl std::fmt::Display for Malformed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveBox => f.write_str("non-positive or non-finite box"),
            Self::ConfidenceOutOfRange => f.write_str("confidence outside [0, 1]"),
        }
    }
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2), confidence)
    }

    pub fn from_rect(bbox: Rect, confidence: f32) -> Self {
        Self {
            frame_index: 0,
            bbox,
            label: String::new(),
            confidence,
            embedding: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_frame(mut self, frame_index: u64) -> Self {
        self.frame_index = frame_index;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn validate(&self) -> Result<(), Malformed> {
        if !self.bbox.is_well_formed() {
            return Err(Malformed::NonPositiveBox);
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Malformed::ConfidenceOutOfRange);
        }
        Ok(())
    }
}

/// Compute IoU distance matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    iou_batch(track_boxes, det_boxes).mapv(|iou| 1.0 - iou)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost bipartite assignment. Pairs whose cost exceeds `thresh`
/// are reported unmatched rather than accepted.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    // Nothing can be accepted: skip the solver so no arbitrary pairing leaks through.
    if cost_matrix.iter().all(|&c| !(c <= thresh)) {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);

    for i in 0..num_rows {
        for j in 0..num_cols {
            let cost = cost_matrix[[i, j]];
            padded[[i, j]] = if cost.is_finite() { cost as f64 } else { 1e6 };
        }
    }

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask: Vec<bool> = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
                if col_idx < num_cols && cost_matrix[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(err) => {
            tracing::warn!(?err, "assignment solver failed, treating all pairs as unmatched");
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections: Vec<usize> = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| if u { Some(i) } else { None })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

/// Scale IoU similarity by detection confidence.
pub fn fuse_score(cost_matrix: &mut Array2<f32>, detections: &[&Detection]) {
    let (rows, cols) = cost_matrix.dim();
    for i in 0..rows {
        for j in 0..cols {
            let iou_sim = 1.0 - cost_matrix[[i, j]];
            let fused_sim = iou_sim * detections[j].confidence;
            cost_matrix[[i, j]] = 1.0 - fused_sim;
        }
    }
}

/// Cosine distance in `[0, 1]`; `None` if either vector is empty, zero or mismatched.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(((1.0 - dot / (na * nb)) / 2.0).clamp(0.0, 1.0))
}

/// Blend appearance distance into the motion cost where both sides carry an embedding.
pub fn fuse_appearance(
    cost_matrix: &mut Array2<f32>,
    track_embeddings: &[Option<&[f32]>],
    detections: &[&Detection],
    weight: f32,
) {
    if weight <= 0.0 {
        return;
    }
    let (rows, cols) = cost_matrix.dim();
    for i in 0..rows {
        let Some(track_emb) = track_embeddings[i] else {
            continue;
        };
        for j in 0..cols {
            let Some(det_emb) = detections[j].embedding.as_deref() else {
                continue;
            };
            if let Some(app) = cosine_distance(track_emb, det_emb) {
                cost_matrix[[i, j]] = (1.0 - weight) * cost_matrix[[i, j]] + weight * app;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_assignment_prefers_lowest_total_cost() {
        let costs = array![[0.1, 0.3], [0.2, 0.9]];
        let result = linear_assignment(&costs, 0.8);
        let mut matches = result.matches.clone();
        matches.sort();
        assert_eq!(matches, vec![(0, 1), (1, 0)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_assignment_rejects_above_threshold() {
        let costs = array![[0.1, 0.95], [0.95, 0.95]];
        let result = linear_assignment(&costs, 0.8);
        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
        assert_eq!(result.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_degenerate_matrix_yields_no_matches() {
        let costs = array![[0.9, 0.9], [0.9, 0.9]];
        let result = linear_assignment(&costs, 0.8);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
        assert_eq!(result.unmatched_detections, vec![0, 1]);
    }

    #[test]
    fn test_empty_sides() {
        let result = linear_assignment(&Array2::zeros((0, 3)), 0.8);
        assert_eq!(result.unmatched_detections, vec![0, 1, 2]);
        let result = linear_assignment(&Array2::zeros((2, 0)), 0.8);
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
    }

    #[test]
    fn test_rectangular_matrix() {
        let costs = array![[0.2], [0.1], [0.7]];
        let result = linear_assignment(&costs, 0.8);
        assert_eq!(result.matches, vec![(1, 0)]);
        assert_eq!(result.unmatched_tracks, vec![0, 2]);
    }

    #[test]
    fn test_validate() {
        assert!(Detection::new(0.0, 0.0, 10.0, 10.0, 0.5).validate().is_ok());
        assert_eq!(
            Detection::new(0.0, 0.0, 0.0, 10.0, 0.5).validate(),
            Err(Malformed::NonPositiveBox)
        );
        assert_eq!(
            Detection::new(0.0, 0.0, 10.0, 10.0, 1.5).validate(),
            Err(Malformed::ConfidenceOutOfRange)
        );
    }

    #[test]
    fn test_cosine_distance() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]), Some(0.0));
        assert_eq!(cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), None);
    }
}
