//! Constant-velocity Kalman filter over XYAH boxes, on nalgebra fixed-size matrices.

use nalgebra::{SMatrix, SVector};

use crate::tracker::rect::Rect;

type Matrix8 = SMatrix<f64, 8, 8>;
type Matrix4 = SMatrix<f64, 4, 4>;
type Matrix4x8 = SMatrix<f64, 4, 8>;
type Vector8 = SVector<f64, 8>;
type Vector4 = SVector<f64, 4>;

/// Filter state carried by one track: `[cx, cy, a, h, vcx, vcy, va, vh]`
/// and its covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    mean: Vector8,
    covariance: Matrix8,
}

impl MotionState {
    /// Box implied by the current mean.
    pub fn rect(&self) -> Rect {
        Rect::from_xyah(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    /// Velocity of the box center in pixels per frame.
    pub fn velocity(&self) -> (f64, f64) {
        (self.mean[4], self.mean[5])
    }
}

fn measurement(rect: &Rect) -> Vector4 {
    let xyah = rect.to_xyah();
    Vector4::new(
        xyah[0] as f64,
        xyah[1] as f64,
        xyah[2] as f64,
        xyah[3] as f64,
    )
}

/// Stateless filter parameters; the per-track state lives in [`MotionState`].
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Matrix8,
    update_mat: Matrix4x8,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = Matrix8::identity();
        for i in 0..4 {
            motion_mat[(i, 4 + i)] = 1.0;
        }

        let mut update_mat = Matrix4x8::zeros();
        for i in 0..4 {
            update_mat[(i, i)] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    pub fn initiate(&self, rect: &Rect) -> MotionState {
        let z = measurement(rect);
        let mut mean = Vector8::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(&z);

        let h = z[3];
        let std = [
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            1e-2,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            1e-5,
            10.0 * self.std_weight_velocity * h,
        ];
        let covariance = Matrix8::from_diagonal(&Vector8::from_iterator(std.iter().map(|s| s * s)));

        MotionState { mean, covariance }
    }

    /// Extrapolate one frame ahead. `freeze_height` zeroes the height
    /// velocity first, which keeps boxes of unconfirmed tracks from drifting in scale.
    pub fn predict(&self, state: &MotionState, freeze_height: bool) -> MotionState {
        let mut mean = state.mean;
        if freeze_height {
            mean[7] = 0.0;
        }

        let h = mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-2,
            self.std_weight_position * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            1e-5,
            self.std_weight_velocity * h,
        ];
        let motion_cov = Matrix8::from_diagonal(&Vector8::from_iterator(std.iter().map(|s| s * s)));

        MotionState {
            mean: self.motion_mat * mean,
            covariance: self.motion_mat * state.covariance * self.motion_mat.transpose()
                + motion_cov,
        }
    }

    fn project(&self, state: &MotionState) -> (Vector4, Matrix4) {
        let h = state.mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-1,
            self.std_weight_position * h,
        ];
        let innovation_cov = Matrix4::from_diagonal(&Vector4::from_iterator(std.iter().map(|s| s * s)));

        let mean = self.update_mat * state.mean;
        let covariance =
            self.update_mat * state.covariance * self.update_mat.transpose() + innovation_cov;
        (mean, covariance)
    }

    /// Correct `state` with an observed box.
    ///
    /// A singular innovation covariance (degenerate, zero-height boxes)
    /// cannot be inverted; the filter then re-initiates from the observation.
    pub fn update(&self, state: &MotionState, observed: &Rect) -> MotionState {
        let (projected_mean, projected_cov) = self.project(state);
        let Some(s_inv) = projected_cov.try_inverse() else {
            tracing::debug!("singular innovation covariance, re-initiating motion state");
            return self.initiate(observed);
        };

        let kalman_gain = state.covariance * self.update_mat.transpose() * s_inv;
        let innovation = measurement(observed) - projected_mean;

        MotionState {
            mean: state.mean + kalman_gain * innovation,
            covariance: state.covariance - kalman_gain * projected_cov * kalman_gain.transpose(),
        }
    }
}
