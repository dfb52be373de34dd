//! Orientation filter fusing accelerometer and gyroscope streams.
//!
//! [`SensorFusionEkf`] keeps a quaternion `sensor_from_start` mapping
//! start-frame vectors into the sensor frame. Gyroscope samples propagate
//! it forward; accelerometer samples pull the predicted gravity direction
//! back toward the measured one through a Kalman-gain tilt correction.

use std::sync::Mutex;

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::bias::GyroscopeBiasEstimator;
use crate::types::{AccelerometerSample, GyroscopeSample, PoseState, TrackerStatus};

/// Variance added to the orientation covariance per second of gyroscope
/// propagation (rad^2/s).
const GYRO_PROCESS_NOISE: f64 = 1e-5;
/// Measurement variance of the accelerometer-derived tilt (rad^2).
const ACCEL_MEASUREMENT_NOISE: f64 = 1e-3;
/// Gyroscope gaps longer than this are treated as a stream discontinuity
/// and not integrated.
const MAX_GYRO_GAP_SECS: f64 = 0.5;
/// Accelerometer samples shorter than this are unusable as a direction.
const MIN_ACCEL_NORM: f64 = 1e-9;

/// The filter surface the tracker consumes.
///
/// Implementations are shared across delivery threads behind an `Arc`, so
/// every method takes `&self`; interior locking is the implementation's
/// responsibility.
pub trait FusionEngine: Send + Sync {
    fn process_accelerometer_sample(&self, sample: AccelerometerSample);

    fn process_gyroscope_sample(&self, sample: GyroscopeSample);

    /// True once the filter output is trustworthy on its own.
    fn is_fully_initialized(&self) -> bool;

    /// Snapshot of the newest filter output.
    fn latest_pose_state(&self) -> PoseState;

    /// Filter-owned status bits. The default derives everything from
    /// [`FusionEngine::is_fully_initialized`].
    fn status(&self) -> TrackerStatus {
        if self.is_fully_initialized() {
            TrackerStatus::GRAVITY_ALIGNED | TrackerStatus::FULLY_INITIALIZED
        } else {
            TrackerStatus::empty()
        }
    }
}

struct FilterState {
    pose: PoseState,
    covariance: Matrix3<f64>,
    gravity_aligned: bool,
    last_gyro_timestamp_ns: Option<i64>,
    bias: Option<GyroscopeBiasEstimator>,
}

/// EKF-style orientation filter, the default [`FusionEngine`].
pub struct SensorFusionEkf {
    inner: Mutex<FilterState>,
}

impl SensorFusionEkf {
    /// `bias_estimation` enables the online gyroscope bias estimator; its
    /// settled estimate is subtracted from every gyroscope sample on top of
    /// whatever fixed calibration the caller already applied.
    pub fn new(bias_estimation: bool) -> Self {
        Self {
            inner: Mutex::new(FilterState {
                pose: PoseState::default(),
                covariance: Matrix3::identity(),
                gravity_aligned: false,
                last_gyro_timestamp_ns: None,
                bias: bias_estimation.then(GyroscopeBiasEstimator::new),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FilterState> {
        // Sample processing never panics while holding the lock.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SensorFusionEkf {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FusionEngine for SensorFusionEkf {
    fn process_accelerometer_sample(&self, sample: AccelerometerSample) {
        let mut state = self.lock();
        let ts = sample.sensor_timestamp_ns;

        if let Some(bias) = state.bias.as_mut() {
            bias.process_accelerometer(sample.data, ts);
        }

        let norm = sample.data.norm();
        if norm < MIN_ACCEL_NORM {
            log::warn!("Accelerometer sample with near-zero magnitude ignored");
            return;
        }
        let measured_up = sample.data / norm;

        if !state.gravity_aligned {
            // First usable sample fixes the start frame: its +z axis points
            // along the measured up direction.
            state.pose.sensor_from_start =
                UnitQuaternion::rotation_between(&Vector3::z(), &measured_up)
                    .unwrap_or_else(|| {
                        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)
                    });
            state.covariance = Matrix3::identity() * ACCEL_MEASUREMENT_NOISE;
            state.gravity_aligned = true;
            log::debug!("Gravity alignment initialized from first accelerometer sample");
            return;
        }

        let predicted_up = state.pose.sensor_from_start * Vector3::z();
        let cross = predicted_up.cross(&measured_up);
        let cross_norm = cross.norm();
        if cross_norm < 1e-12 {
            // Parallel (nothing to correct) or antiparallel (no unique axis).
            return;
        }
        let angle = cross_norm.atan2(predicted_up.dot(&measured_up));
        let innovation = cross * (angle / cross_norm);

        let measurement = state.covariance + Matrix3::identity() * ACCEL_MEASUREMENT_NOISE;
        let Some(inverse) = measurement.try_inverse() else {
            log::warn!("Accelerometer update skipped: singular innovation covariance");
            return;
        };
        let gain = state.covariance * inverse;
        let correction: Vector3<f64> = gain * innovation;

        state.pose.sensor_from_start =
            UnitQuaternion::from_scaled_axis(correction) * state.pose.sensor_from_start;
        state.covariance = (Matrix3::identity() - gain) * state.covariance;
    }

    fn process_gyroscope_sample(&self, sample: GyroscopeSample) {
        let mut state = self.lock();
        let ts = sample.sensor_timestamp_ns;

        if let Some(bias) = state.bias.as_mut() {
            bias.process_gyroscope(sample.data, ts);
        }
        let residual_bias = match state.bias.as_ref() {
            Some(bias) => bias.estimate(),
            None => Vector3::zeros(),
        };
        let velocity = sample.data - residual_bias;

        if state.gravity_aligned {
            if let Some(last) = state.last_gyro_timestamp_ns {
                let dt = (ts - last) as f64 * 1e-9;
                if dt > MAX_GYRO_GAP_SECS {
                    log::debug!("Gyroscope gap of {:.3} s exceeds propagation limit", dt);
                } else if dt > 0.0 {
                    state.pose.sensor_from_start =
                        UnitQuaternion::from_scaled_axis(-velocity * dt)
                            * state.pose.sensor_from_start;
                    state.covariance += Matrix3::identity() * (GYRO_PROCESS_NOISE * dt);
                }
            }
        }

        state.pose.rotation_velocity = velocity;
        state.pose.timestamp_ns = ts;
        state.last_gyro_timestamp_ns = Some(ts);
    }

    fn is_fully_initialized(&self) -> bool {
        let state = self.lock();
        state.gravity_aligned
            && state.bias.as_ref().map_or(true, |bias| bias.has_estimate())
    }

    fn latest_pose_state(&self) -> PoseState {
        self.lock().pose
    }

    fn status(&self) -> TrackerStatus {
        let state = self.lock();
        let mut status = TrackerStatus::empty();
        if state.gravity_aligned {
            status |= TrackerStatus::GRAVITY_ALIGNED;
        }
        match state.bias.as_ref() {
            Some(bias) => {
                status |= TrackerStatus::BIAS_ESTIMATION;
                if state.gravity_aligned && bias.has_estimate() {
                    status |= TrackerStatus::FULLY_INITIALIZED;
                }
            }
            None => {
                if state.gravity_aligned {
                    status |= TrackerStatus::FULLY_INITIALIZED;
                }
            }
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: i64 = 1_000_000;

    fn accel(x: f64, y: f64, z: f64, ts: i64) -> AccelerometerSample {
        AccelerometerSample {
            data: Vector3::new(x, y, z),
            system_timestamp: ts,
            sensor_timestamp_ns: ts,
        }
    }

    fn gyro(x: f64, y: f64, z: f64, ts: i64) -> GyroscopeSample {
        GyroscopeSample {
            data: Vector3::new(x, y, z),
            system_timestamp: ts,
            sensor_timestamp_ns: ts,
        }
    }

    #[test]
    fn test_first_accelerometer_sample_aligns_gravity() {
        let ekf = SensorFusionEkf::new(false);
        assert!(!ekf.is_fully_initialized());

        ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, 0));
        assert!(ekf.is_fully_initialized());

        // Device resting flat: start frame equals sensor frame.
        let pose = ekf.latest_pose_state();
        assert!(pose.sensor_from_start.angle() < 1e-12);
    }

    #[test]
    fn test_tilted_first_sample_alignment() {
        let ekf = SensorFusionEkf::new(false);
        ekf.process_accelerometer_sample(accel(9.81, 0.0, 0.0, 0));

        let up = ekf.latest_pose_state().sensor_from_start * Vector3::z();
        assert!((up - Vector3::x()).norm() < 1e-12);
    }

    #[test]
    fn test_gyroscope_integration() {
        let ekf = SensorFusionEkf::new(false);
        ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, 0));

        // Constant pi/2 rad/s about x for one second.
        let rate = std::f64::consts::FRAC_PI_2;
        for i in 0..=50 {
            ekf.process_gyroscope_sample(gyro(rate, 0.0, 0.0, i * 20 * MS));
        }

        let expected = UnitQuaternion::from_scaled_axis(Vector3::new(-rate, 0.0, 0.0));
        let pose = ekf.latest_pose_state();
        assert!(pose.sensor_from_start.angle_to(&expected) < 1e-9);
    }

    #[test]
    fn test_accelerometer_corrects_tilt() {
        let ekf = SensorFusionEkf::new(false);
        ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, 0));

        // Integrate a fake rotation to build up 0.2 rad of tilt error, then
        // hold the device still and let gravity pull it back.
        for i in 1..=10 {
            ekf.process_gyroscope_sample(gyro(1.0, 0.0, 0.0, i * 20 * MS));
        }
        let tilted = ekf.latest_pose_state().sensor_from_start * Vector3::z();
        assert!((tilted - Vector3::z()).norm() > 0.1);

        for i in 11..500 {
            let ts = i * 20 * MS;
            ekf.process_gyroscope_sample(gyro(0.0, 0.0, 0.0, ts));
            ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, ts));
        }
        let up = ekf.latest_pose_state().sensor_from_start * Vector3::z();
        assert!((up - Vector3::z()).norm() < 1e-2);
    }

    #[test]
    fn test_velocity_and_timestamp_bookkeeping() {
        let ekf = SensorFusionEkf::new(false);
        ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, 0));
        ekf.process_gyroscope_sample(gyro(0.3, -0.1, 0.05, 7 * MS));

        let pose = ekf.latest_pose_state();
        assert!((pose.rotation_velocity - Vector3::new(0.3, -0.1, 0.05)).norm() < 1e-12);
        assert_eq!(pose.timestamp_ns, 7 * MS);
    }

    #[test]
    fn test_repeated_timestamp_does_not_propagate() {
        let ekf = SensorFusionEkf::new(false);
        ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, 0));
        ekf.process_gyroscope_sample(gyro(0.5, 0.0, 0.0, 10 * MS));
        let before = ekf.latest_pose_state().sensor_from_start;

        // Same timestamp: velocity is recorded but no rotation integrates.
        ekf.process_gyroscope_sample(gyro(0.0, 0.0, 0.0, 10 * MS));
        let after = ekf.latest_pose_state();
        assert!(after.sensor_from_start.angle_to(&before) < 1e-12);
        assert!(after.rotation_velocity.norm() < 1e-12);
    }

    #[test]
    fn test_full_initialization_waits_for_bias_estimate() {
        let ekf = SensorFusionEkf::new(true);
        ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, 0));
        assert!(!ekf.is_fully_initialized());
        assert!(ekf.status().contains(TrackerStatus::GRAVITY_ALIGNED));
        assert!(!ekf.status().contains(TrackerStatus::FULLY_INITIALIZED));

        for i in 1..500 {
            let ts = i * 20 * MS;
            ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, ts));
            ekf.process_gyroscope_sample(gyro(0.004, -0.002, 0.001, ts));
        }
        assert!(ekf.is_fully_initialized());
        assert!(ekf.status().contains(TrackerStatus::FULLY_INITIALIZED));
        assert!(ekf.status().contains(TrackerStatus::BIAS_ESTIMATION));
    }

    #[test]
    fn test_settled_bias_is_subtracted_from_velocity() {
        let ekf = SensorFusionEkf::new(true);
        let drift = Vector3::new(0.006, -0.003, 0.002);
        for i in 0..500 {
            let ts = i * 20 * MS;
            ekf.process_accelerometer_sample(accel(0.0, 0.0, 9.81, ts));
            ekf.process_gyroscope_sample(gyro(drift.x, drift.y, drift.z, ts));
        }
        assert!(ekf.is_fully_initialized());
        // Once the estimator settles, the constant drift largely cancels.
        let velocity = ekf.latest_pose_state().rotation_velocity;
        assert!(velocity.norm() < drift.norm() * 0.2, "velocity = {}", velocity);
    }
}
