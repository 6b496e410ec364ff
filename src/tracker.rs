mod associator;
mod kalman_filter;
mod matching;
mod rect;
mod track;
mod track_state;

pub use associator::{Association, Associator, TrackSet, Tracker, TrackerConfig};
pub use kalman_filter::{KalmanFilter, MotionState};
pub use matching::{
    AssignmentResult, Detection, Malformed, cosine_distance, iou_distance, linear_assignment,
};
pub use rect::{Rect, iou_batch};
pub use track::Track;
pub use track_state::TrackState;
