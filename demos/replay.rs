//! Replay a synthetic IMU recording through the tracker.
//!
//! Usage: cargo run --example replay
//!
//! Runs a resting calibration pass to measure the zero-rate bias, then
//! simulates the device lying flat for five seconds (long enough for the
//! online bias estimator to settle too) before yawing back and forth
//! about the gravity axis, all at the 50 Hz sampling rate.

use std::time::{Duration, Instant};

use nalgebra::Vector3;
use wearpose::{
    AccelerometerSample, CalibrationStats, DATA_RATE_LOW_US, GyroscopeSample, OrientationTracker,
    TrackerStatus,
};

const REST_SECS: f64 = 5.0;
const TOTAL_SAMPLES: i64 = 1500;

fn main() {
    env_logger::init();

    // Calibration pass: the device rests while the collector measures its
    // zero-rate bias.
    let true_bias = Vector3::new(0.002, -0.001, 0.0005);
    let mut stats = CalibrationStats::new();
    while !stats.add(true_bias) {}
    let calibration = stats.median();
    println!(
        "Calibrated bias over {} samples: {:.5?} rad/s",
        stats.count(),
        calibration.as_slice()
    );

    let tracker = match OrientationTracker::new(calibration, DATA_RATE_LOW_US) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to construct tracker: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = tracker.resume() {
        eprintln!("Failed to resume tracking: {}", e);
        std::process::exit(1);
    }

    let accel_feed = tracker.accelerometer_feed();
    let gyro_feed = tracker.gyroscope_feed();

    println!("Replaying {} samples at 50 Hz...", TOTAL_SAMPLES);

    let period_ns = i64::from(DATA_RATE_LOW_US) * 1_000;
    let start = Instant::now();
    let mut delivered: u64 = 0;
    let mut dropped: u64 = 0;
    let mut initialized_at: Option<f64> = None;

    for i in 0..TOTAL_SAMPLES {
        let ts = i * period_ns;
        let t = ts as f64 * 1e-9;

        // Yawing about the gravity axis keeps the accelerometer reading
        // constant, so the two streams stay physically consistent.
        let true_rate = if t < REST_SECS {
            Vector3::zeros()
        } else {
            Vector3::new(0.0, 0.0, 0.8 * (t - REST_SECS).sin())
        };

        let accel_ok = accel_feed.push(AccelerometerSample {
            data: Vector3::new(0.0, 0.0, 9.81),
            system_timestamp: ts,
            sensor_timestamp_ns: ts,
        });
        let gyro_ok = gyro_feed.push(GyroscopeSample {
            // The sensor reads true rate plus its zero-rate bias.
            data: true_rate + true_bias,
            system_timestamp: ts,
            sensor_timestamp_ns: ts,
        });
        if accel_ok && gyro_ok {
            delivered += 1;
        } else {
            dropped += 1;
        }

        if initialized_at.is_none()
            && tracker.status().contains(TrackerStatus::FULLY_INITIALIZED)
        {
            initialized_at = Some(t);
            println!("--- filter fully initialized at t={:.2}s ---", t);
        }

        if i % 100 == 0 {
            let q = tracker.get_pose(ts);
            let (roll, pitch, yaw) = q.euler_angles();
            println!(
                "t={:6.2}s  quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]  rpy=[{:+6.1}, {:+6.1}, {:+6.1}] deg",
                t,
                q.coords[0],
                q.coords[1],
                q.coords[2],
                q.coords[3],
                roll.to_degrees(),
                pitch.to_degrees(),
                yaw.to_degrees(),
            );
        }

        // Pace the replay so the delivery threads keep up comfortably.
        std::thread::sleep(Duration::from_micros(500));
    }

    tracker.pause();

    let elapsed = start.elapsed().as_secs_f64();
    let final_pose = tracker.get_pose(TOTAL_SAMPLES * period_ns);
    println!();
    println!(
        "Done: {} delivered, {} dropped in {:.1}s ({:.0} samples/s)",
        delivered,
        dropped,
        elapsed,
        delivered as f64 / elapsed
    );
    println!("Status: {:?}", tracker.status());
    println!("Frozen pose: {:?}", final_pose);
}
