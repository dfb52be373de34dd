use nalgebra::Vector3;

/// Student's t values for a 95% two-sided confidence interval.
const T_TABLE: [f64; 37] = [
    12.71, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, //
    2.201, 2.179, 2.160, 2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, //
    2.080, 2.074, 2.069, 2.064, 2.060, 2.056, 2.052, 2.048, 2.045, 2.042, //
    2.021, 2.009, 2.000, 1.990, 1.984, 1.980, 1.960,
];

/// Sample counts (degrees of freedom) matching `T_TABLE`.
const N_TABLE: [usize; 37] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, //
    11, 12, 13, 14, 15, 16, 17, 18, 19, 20, //
    21, 22, 23, 24, 25, 26, 27, 28, 29, 30, //
    40, 50, 60, 80, 100, 120, 200,
];

/// Number of resting gyroscope readings required for a calibration run.
pub const CALIBRATION_SAMPLE_TARGET: usize = N_TABLE[N_TABLE.len() - 1];

/// Gyroscope zero-rate calibration collector.
///
/// Gathers raw gyroscope readings while the device rests and derives the
/// per-axis median, mean, standard deviation and the 95% confidence
/// half-width of the mean. The median vector is the bias handed to
/// [`OrientationTracker::new`](crate::OrientationTracker::new); the other
/// statistics are kept for judging sensor quality.
pub struct CalibrationStats {
    count: usize,
    complete: bool,
    sum: Vector3<f64>,
    sum_sq: Vector3<f64>,
    axes: [Vec<f64>; 3],
    median: Vector3<f64>,
    mean: Vector3<f64>,
    sigma: Vector3<f64>,
    delta: Vector3<f64>,
}

impl CalibrationStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            complete: false,
            sum: Vector3::zeros(),
            sum_sq: Vector3::zeros(),
            axes: [
                Vec::with_capacity(CALIBRATION_SAMPLE_TARGET),
                Vec::with_capacity(CALIBRATION_SAMPLE_TARGET),
                Vec::with_capacity(CALIBRATION_SAMPLE_TARGET),
            ],
            median: Vector3::zeros(),
            mean: Vector3::zeros(),
            sigma: Vector3::zeros(),
            delta: Vector3::zeros(),
        }
    }

    /// Discard everything and prepare for a fresh collection run.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Add one raw gyroscope reading.
    ///
    /// Returns `true` once enough data has been collected; further calls
    /// are no-ops that keep returning `true`. Non-finite readings are
    /// skipped.
    pub fn add(&mut self, reading: Vector3<f64>) -> bool {
        if self.complete {
            return true;
        }
        if reading.iter().any(|v| !v.is_finite()) {
            log::warn!("Ignoring non-finite gyroscope reading during calibration");
            return false;
        }

        for axis in 0..3 {
            self.axes[axis].push(reading[axis]);
        }
        self.sum += reading;
        self.sum_sq += reading.component_mul(&reading);
        self.count += 1;

        if self.count >= CALIBRATION_SAMPLE_TARGET {
            self.compute();
            self.complete = true;
            log::debug!(
                "Gyro calibration complete: median={:.6?} mean={:.6?} sigma={:.6?} delta={:.6?}",
                self.median.as_slice(),
                self.mean.as_slice(),
                self.sigma.as_slice(),
                self.delta.as_slice(),
            );
        }
        self.complete
    }

    /// Whether a full calibration run has been collected.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of readings collected so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Per-axis median of the collected readings; the calibration bias.
    pub fn median(&self) -> Vector3<f64> {
        self.median
    }

    /// Per-axis mean of the collected readings.
    pub fn mean(&self) -> Vector3<f64> {
        self.mean
    }

    /// Per-axis population standard deviation.
    pub fn sigma(&self) -> Vector3<f64> {
        self.sigma
    }

    /// Per-axis half-width of the 95% confidence interval of the mean.
    pub fn delta(&self) -> Vector3<f64> {
        self.delta
    }

    fn compute(&mut self) {
        let n = self.count as f64;
        self.median = Vector3::new(
            median_of(&self.axes[0]),
            median_of(&self.axes[1]),
            median_of(&self.axes[2]),
        );
        self.mean = self.sum / n;

        // Population variance d, sample variance s^2 = d * n / (n - 1).
        let d = self.sum_sq / n - self.mean.component_mul(&self.mean);
        let d = d.map(|v| v.max(0.0));
        self.sigma = d.map(f64::sqrt);
        let s = (d * (n / (n - 1.0))).map(f64::sqrt);
        self.delta = s * (t_value(self.count) / n.sqrt());
    }
}

impl Default for CalibrationStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Student's t for the largest tabulated sample count not exceeding `n`.
fn t_value(n: usize) -> f64 {
    let mut t = T_TABLE[T_TABLE.len() - 1];
    for (i, &entry) in N_TABLE.iter().enumerate().rev() {
        if entry <= n {
            t = T_TABLE[i];
            break;
        }
    }
    t
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completes_at_target() {
        let mut stats = CalibrationStats::new();
        for i in 0..CALIBRATION_SAMPLE_TARGET - 1 {
            assert!(!stats.add(Vector3::new(0.01, -0.02, 0.005)), "at {}", i);
        }
        assert!(stats.add(Vector3::new(0.01, -0.02, 0.005)));
        assert!(stats.is_complete());
        // Further readings are ignored.
        assert!(stats.add(Vector3::new(9.0, 9.0, 9.0)));
        assert_eq!(stats.count(), CALIBRATION_SAMPLE_TARGET);
    }

    #[test]
    fn test_constant_input_statistics() {
        let mut stats = CalibrationStats::new();
        while !stats.add(Vector3::new(0.1, 0.2, -0.3)) {}
        assert!((stats.median() - Vector3::new(0.1, 0.2, -0.3)).norm() < 1e-9);
        assert!((stats.mean() - Vector3::new(0.1, 0.2, -0.3)).norm() < 1e-9);
        assert!(stats.sigma().norm() < 1e-6);
        assert!(stats.delta().norm() < 1e-6);
    }

    #[test]
    fn test_median_robust_to_outlier() {
        let mut stats = CalibrationStats::new();
        // One large spike among otherwise constant readings.
        stats.add(Vector3::new(5.0, 0.0, 0.0));
        while !stats.add(Vector3::new(0.01, 0.0, 0.0)) {}
        assert!((stats.median().x - 0.01).abs() < 1e-9);
        // The mean is pulled by the spike, the median is not.
        assert!(stats.mean().x > 0.03);
    }

    #[test]
    fn test_alternating_input_median() {
        let mut stats = CalibrationStats::new();
        let mut i = 0;
        loop {
            let v = if i % 2 == 0 { 1.0 } else { 3.0 };
            i += 1;
            if stats.add(Vector3::new(v, 0.0, 0.0)) {
                break;
            }
        }
        // Even count of alternating 1s and 3s: median is their midpoint.
        assert!((stats.median().x - 2.0).abs() < 1e-9);
        assert!((stats.mean().x - 2.0).abs() < 1e-9);
        // Population sigma of a 1/3 split is exactly 1.
        assert!((stats.sigma().x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_ignored() {
        let mut stats = CalibrationStats::new();
        stats.add(Vector3::new(f64::NAN, 0.0, 0.0));
        assert_eq!(stats.count(), 0);
        stats.add(Vector3::new(0.0, f64::INFINITY, 0.0));
        assert_eq!(stats.count(), 0);
    }

    #[test]
    fn test_reset_discards_samples() {
        let mut stats = CalibrationStats::new();
        stats.add(Vector3::new(1.0, 1.0, 1.0));
        stats.reset();
        assert_eq!(stats.count(), 0);
        assert!(!stats.is_complete());
    }

    #[test]
    fn test_t_value_lookup() {
        assert!((t_value(1) - 12.71).abs() < 1e-9);
        assert!((t_value(5) - 2.571).abs() < 1e-9);
        // Between table entries: the largest entry not exceeding n.
        assert!((t_value(35) - 2.042).abs() < 1e-9);
        assert!((t_value(200) - 1.960).abs() < 1e-9);
        assert!((t_value(10_000) - 1.960).abs() < 1e-9);
    }
}
