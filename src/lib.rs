//! # wearpose - Real-time orientation tracking from IMU samples
//!
//! Fuses accelerometer and gyroscope streams into a 3-D orientation
//! quaternion. Provides:
//! - An EKF-style fusion filter with gravity alignment and online
//!   gyroscope bias estimation
//! - Pause/resume lifecycle that freezes the pose while paused and drops
//!   samples instead of queueing them
//! - Pose queries with prediction fallback before the filter settles
//! - C FFI for integration with platform sensor bridges (Android/JNI,
//!   C/C++ hosts)
//!
//! ## Quick Start
//! ```no_run
//! use nalgebra::Vector3;
//! use wearpose::{AccelerometerSample, DATA_RATE_LOW_US, GyroscopeSample, OrientationTracker};
//!
//! let tracker = OrientationTracker::new(Vector3::zeros(), DATA_RATE_LOW_US).unwrap();
//! tracker.resume().unwrap();
//!
//! let accel = tracker.accelerometer_feed();
//! let gyro = tracker.gyroscope_feed();
//! accel.push(AccelerometerSample {
//!     data: Vector3::new(0.0, 0.0, 9.81),
//!     system_timestamp: 0,
//!     sensor_timestamp_ns: 0,
//! });
//! gyro.push(GyroscopeSample {
//!     data: Vector3::new(0.01, 0.0, 0.0),
//!     system_timestamp: 0,
//!     sensor_timestamp_ns: 0,
//! });
//!
//! let pose = tracker.get_pose(20_000_000);
//! println!("orientation: {:?}", pose);
//! tracker.pause();
//! ```

pub mod error;
pub mod types;
pub mod calibration;
mod filter;
mod bias;
pub mod fusion;
pub mod prediction;
pub mod source;
pub mod tracker;
pub mod ffi;

pub use calibration::CalibrationStats;
pub use error::TrackerError;
pub use fusion::{FusionEngine, SensorFusionEkf};
pub use prediction::{predict_pose, MAX_PREDICTION_NS};
pub use source::{SampleFeed, SampleHandler, SensorEventSource};
pub use tracker::{OrientationTracker, TrackerCallbacks};
pub use types::*;

/// Result type alias for wearpose operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
