//! Forward extrapolation of a pose snapshot.

use nalgebra::UnitQuaternion;

use crate::types::PoseState;

/// Longest interval a pose is extrapolated ahead of its snapshot (100 ms).
/// Beyond this the angular velocity is stale and integration only adds
/// error.
pub const MAX_PREDICTION_NS: i64 = 100_000_000;

/// Rotate `state` forward to `timestamp_ns` under its own angular velocity.
///
/// The interval is clamped to `[0, MAX_PREDICTION_NS]`: a query at or
/// before the snapshot returns its rotation unchanged, and a query far in
/// the future advances at most the clamp. With zero angular velocity the
/// rotation is returned as-is, which is what freezes the pose after a
/// zero-velocity sample.
pub fn predict_pose(timestamp_ns: i64, state: &PoseState) -> UnitQuaternion<f64> {
    let ahead_ns = (timestamp_ns - state.timestamp_ns).clamp(0, MAX_PREDICTION_NS);
    if ahead_ns == 0 {
        return state.sensor_from_start;
    }
    let dt = ahead_ns as f64 * 1e-9;
    UnitQuaternion::from_scaled_axis(-state.rotation_velocity * dt) * state.sensor_from_start
}
