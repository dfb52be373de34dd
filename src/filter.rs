use nalgebra::Vector3;

/// First-order IIR low-pass filter over a 3-vector signal.
///
/// The smoothing factor is derived per sample from the wall-clock gap
/// between timestamps, so irregular delivery rates keep the same cutoff.
pub(crate) struct LowPassFilter {
    time_constant_secs: f64,
    state: Vector3<f64>,
    last_timestamp_ns: i64,
    samples: u64,
}

impl LowPassFilter {
    pub fn new(cutoff_frequency_hz: f64) -> Self {
        Self {
            time_constant_secs: 1.0 / (2.0 * std::f64::consts::PI * cutoff_frequency_hz),
            state: Vector3::zeros(),
            last_timestamp_ns: 0,
            samples: 0,
        }
    }

    /// Fold one sample into the filter state.
    ///
    /// The first sample initializes the state directly. Samples whose
    /// timestamp does not advance the clock are skipped.
    pub fn add_sample(&mut self, sample: Vector3<f64>, timestamp_ns: i64) {
        if self.samples == 0 {
            self.state = sample;
            self.last_timestamp_ns = timestamp_ns;
            self.samples = 1;
            return;
        }

        let delta_secs = (timestamp_ns - self.last_timestamp_ns) as f64 * 1e-9;
        if delta_secs <= 0.0 {
            log::trace!("Low-pass sample with non-advancing timestamp skipped");
            return;
        }

        let alpha = delta_secs / (self.time_constant_secs + delta_secs);
        self.state += (sample - self.state) * alpha;
        self.last_timestamp_ns = timestamp_ns;
        self.samples += 1;
    }

    pub fn value(&self) -> Vector3<f64> {
        self.state
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: i64 = 1_000_000;

    #[test]
    fn test_first_sample_initializes() {
        let mut lp = LowPassFilter::new(1.0);
        lp.add_sample(Vector3::new(3.0, -1.0, 0.5), 10 * MS);
        assert_eq!(lp.sample_count(), 1);
        assert!((lp.value() - Vector3::new(3.0, -1.0, 0.5)).norm() < 1e-12);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut lp = LowPassFilter::new(1.0);
        let target = Vector3::new(0.2, 0.0, -0.1);
        for i in 0..500 {
            lp.add_sample(target, i * 10 * MS);
        }
        assert!((lp.value() - target).norm() < 1e-6);
    }

    #[test]
    fn test_smooths_a_step() {
        let mut lp = LowPassFilter::new(1.0);
        lp.add_sample(Vector3::zeros(), 0);
        lp.add_sample(Vector3::new(1.0, 0.0, 0.0), 10 * MS);
        // One 10 ms step toward the new value, far from reaching it.
        let x = lp.value().x;
        assert!(x > 0.0 && x < 0.1, "x = {}", x);
    }

    #[test]
    fn test_non_advancing_timestamp_skipped() {
        let mut lp = LowPassFilter::new(1.0);
        lp.add_sample(Vector3::zeros(), 10 * MS);
        lp.add_sample(Vector3::new(100.0, 0.0, 0.0), 10 * MS);
        lp.add_sample(Vector3::new(100.0, 0.0, 0.0), 5 * MS);
        assert_eq!(lp.sample_count(), 1);
        assert!(lp.value().norm() < 1e-12);
    }
}
