//! Runtime gyroscope bias estimation.
//!
//! Watches the smoothed gyroscope and accelerometer streams for stretches
//! where the device is physically still, and low-passes the gyroscope
//! readings from those stretches into a slowly-moving bias estimate.

use nalgebra::Vector3;

use crate::filter::LowPassFilter;

/// Cutoff for smoothing the raw gyroscope and accelerometer streams.
const SIGNAL_LOWPASS_HZ: f64 = 1.0;
/// Cutoff for the bias accumulator. Deliberately sluggish so a brief
/// false stillness detection cannot drag the estimate far.
const BIAS_LOWPASS_HZ: f64 = 0.15;

/// Angular rate above which the device is considered rotating (rad/s).
const STILL_GYRO_NORM: f64 = 0.03;
/// Allowed deviation of a gyroscope sample from its smoothed value (rad/s).
const STILL_GYRO_DEVIATION: f64 = 0.01;
/// Allowed deviation of an accelerometer sample from its smoothed
/// value (m/s^2). Catches translation that the gyroscope cannot see.
const STILL_ACCEL_DEVIATION: f64 = 0.5;

/// Consecutive still gyroscope frames required before samples feed the
/// bias accumulator.
const STILL_FRAMES_REQUIRED: u32 = 10;
/// Accumulated bias samples required before the estimate is trusted.
const SETTLED_SAMPLES: u64 = 30;

pub(crate) struct GyroscopeBiasEstimator {
    gyro_lowpass: LowPassFilter,
    accel_lowpass: LowPassFilter,
    bias_lowpass: LowPassFilter,
    still_frames: u32,
    accel_still: bool,
    settled_logged: bool,
}

impl GyroscopeBiasEstimator {
    pub fn new() -> Self {
        Self {
            gyro_lowpass: LowPassFilter::new(SIGNAL_LOWPASS_HZ),
            accel_lowpass: LowPassFilter::new(SIGNAL_LOWPASS_HZ),
            bias_lowpass: LowPassFilter::new(BIAS_LOWPASS_HZ),
            still_frames: 0,
            accel_still: false,
            settled_logged: false,
        }
    }

    pub fn process_accelerometer(&mut self, sample: Vector3<f64>, timestamp_ns: i64) {
        self.accel_lowpass.add_sample(sample, timestamp_ns);
        let deviation = (sample - self.accel_lowpass.value()).norm();
        self.accel_still = deviation < STILL_ACCEL_DEVIATION;
    }

    pub fn process_gyroscope(&mut self, sample: Vector3<f64>, timestamp_ns: i64) {
        self.gyro_lowpass.add_sample(sample, timestamp_ns);

        let smoothed = self.gyro_lowpass.value();
        let still = smoothed.norm() < STILL_GYRO_NORM
            && (sample - smoothed).norm() < STILL_GYRO_DEVIATION
            && self.accel_still;
        if !still {
            self.still_frames = 0;
            return;
        }

        if self.still_frames < STILL_FRAMES_REQUIRED {
            self.still_frames += 1;
            return;
        }

        self.bias_lowpass.add_sample(sample, timestamp_ns);
        if !self.settled_logged && self.has_estimate() {
            log::info!(
                "Gyroscope bias settled: {:.5?} rad/s",
                self.bias_lowpass.value().as_slice()
            );
            self.settled_logged = true;
        }
    }

    /// True once enough still samples have accumulated for the estimate
    /// to be usable.
    pub fn has_estimate(&self) -> bool {
        self.bias_lowpass.sample_count() >= SETTLED_SAMPLES
    }

    /// Current bias estimate, zero until the estimator has settled.
    pub fn estimate(&self) -> Vector3<f64> {
        if self.has_estimate() {
            self.bias_lowpass.value()
        } else {
            Vector3::zeros()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: i64 = 1_000_000;

    fn feed_still(est: &mut GyroscopeBiasEstimator, bias: Vector3<f64>, frames: usize) {
        for i in 0..frames {
            let ts = (i as i64 + 1) * 20 * MS;
            est.process_accelerometer(Vector3::new(0.0, 0.0, 9.81), ts);
            est.process_gyroscope(bias, ts);
        }
    }

    #[test]
    fn test_no_estimate_before_settling() {
        let mut est = GyroscopeBiasEstimator::new();
        feed_still(&mut est, Vector3::new(0.01, 0.0, 0.0), 5);
        assert!(!est.has_estimate());
        assert!(est.estimate().norm() < 1e-12);
    }

    #[test]
    fn test_settles_on_still_device() {
        let mut est = GyroscopeBiasEstimator::new();
        let bias = Vector3::new(0.012, -0.008, 0.004);
        feed_still(&mut est, bias, 400);
        assert!(est.has_estimate());
        assert!((est.estimate() - bias).norm() < 1e-3);
    }

    #[test]
    fn test_rotation_resets_stillness() {
        let mut est = GyroscopeBiasEstimator::new();
        for i in 0..400 {
            let ts = (i as i64 + 1) * 20 * MS;
            est.process_accelerometer(Vector3::new(0.0, 0.0, 9.81), ts);
            // Well above the stillness threshold the whole time.
            est.process_gyroscope(Vector3::new(0.5, 0.0, 0.0), ts);
        }
        assert!(!est.has_estimate());
    }

    #[test]
    fn test_shaking_accelerometer_blocks_accumulation() {
        let mut est = GyroscopeBiasEstimator::new();
        for i in 0..400 {
            let ts = (i as i64 + 1) * 20 * MS;
            let jitter = if i % 2 == 0 { 3.0 } else { -3.0 };
            est.process_accelerometer(Vector3::new(jitter, 0.0, 9.81), ts);
            est.process_gyroscope(Vector3::new(0.005, 0.0, 0.0), ts);
        }
        assert!(!est.has_estimate());
    }
}
