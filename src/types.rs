use nalgebra::{UnitQuaternion, Vector3};

/// Sampling period for the reduced 50 Hz rate, in microseconds.
pub const DATA_RATE_LOW_US: i32 = 20_000;
/// Sampling period for the full 88.9 Hz rate, in microseconds.
pub const DATA_RATE_HIGH_US: i32 = 11_250;

/// One accelerometer reading.
#[derive(Debug, Clone, Copy)]
pub struct AccelerometerSample {
    /// Linear acceleration in the sensor frame, m/s^2.
    pub data: Vector3<f64>,
    /// Host clock at capture time, nanoseconds.
    pub system_timestamp: i64,
    /// Sensor hardware clock, nanoseconds.
    pub sensor_timestamp_ns: i64,
}

/// One gyroscope reading.
///
/// The tracker forwards a bias-corrected copy of this to the fusion
/// engine; both timestamps are preserved unchanged.
#[derive(Debug, Clone, Copy)]
pub struct GyroscopeSample {
    /// Angular velocity in the sensor frame, rad/s.
    pub data: Vector3<f64>,
    /// Host clock at capture time, nanoseconds.
    pub system_timestamp: i64,
    /// Sensor hardware clock, nanoseconds.
    pub sensor_timestamp_ns: i64,
}

/// Snapshot of the fusion engine's orientation state.
#[derive(Debug, Clone, Copy)]
pub struct PoseState {
    /// Rotation taking start-frame vectors into the sensor frame.
    pub sensor_from_start: UnitQuaternion<f64>,
    /// Angular velocity in the sensor frame at `timestamp_ns`, rad/s.
    pub rotation_velocity: Vector3<f64>,
    /// Sensor timestamp of the newest fused sample, nanoseconds.
    pub timestamp_ns: i64,
}

impl Default for PoseState {
    fn default() -> Self {
        Self {
            sensor_from_start: UnitQuaternion::identity(),
            rotation_velocity: Vector3::zeros(),
            timestamp_ns: 0,
        }
    }
}

bitflags::bitflags! {
    /// Tracker status bitmap, also exposed through the C FFI as a u32.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct TrackerStatus: u32 {
        /// Samples are currently being fused (not paused).
        const TRACKING          = 1 << 0;
        /// The filter has aligned its start frame with gravity.
        const GRAVITY_ALIGNED   = 1 << 1;
        /// The filter trusts its own state; pose queries skip prediction.
        const FULLY_INITIALIZED = 1 << 2;
        /// Online gyroscope bias estimation is enabled.
        const BIAS_ESTIMATION   = 1 << 3;
    }
}

/// Flatten a quaternion into (x, y, z, w) order.
///
/// This is the component order used by host-facing surfaces: callbacks,
/// pose queries over the FFI, and the demos. Any sign or axis convention
/// the host needs beyond that is the host's own transform.
pub fn quaternion_to_array(q: &UnitQuaternion<f64>) -> [f64; 4] {
    let c = q.as_ref().coords;
    [c[0], c[1], c[2], c[3]]
}
