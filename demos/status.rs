//! Feed a short still burst and print the tracker status flags.

use std::time::Duration;

use nalgebra::Vector3;
use wearpose::{
    AccelerometerSample, DATA_RATE_HIGH_US, GyroscopeSample, OrientationTracker, TrackerStatus,
};

fn main() {
    env_logger::init();

    let tracker = match OrientationTracker::new(Vector3::zeros(), DATA_RATE_HIGH_US) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = tracker.resume() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let accel_feed = tracker.accelerometer_feed();
    let gyro_feed = tracker.gyroscope_feed();
    let period_ns = i64::from(DATA_RATE_HIGH_US) * 1_000;

    // A device lying still on a desk with a small zero-rate drift.
    for i in 0..400 {
        let ts = i * period_ns;
        accel_feed.push(AccelerometerSample {
            data: Vector3::new(0.0, 0.0, 9.81),
            system_timestamp: ts,
            sensor_timestamp_ns: ts,
        });
        gyro_feed.push(GyroscopeSample {
            data: Vector3::new(0.003, -0.002, 0.001),
            system_timestamp: ts,
            sensor_timestamp_ns: ts,
        });
        std::thread::sleep(Duration::from_micros(200));
    }

    // Give the delivery threads a moment to drain the tail of the burst.
    for _ in 0..100 {
        if tracker.status().contains(TrackerStatus::FULLY_INITIALIZED) {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    let status = tracker.status();
    let pose = tracker.get_pose(400 * period_ns);
    println!("Tracking:          {}", status.contains(TrackerStatus::TRACKING));
    println!("Gravity aligned:   {}", status.contains(TrackerStatus::GRAVITY_ALIGNED));
    println!("Fully initialized: {}", status.contains(TrackerStatus::FULLY_INITIALIZED));
    println!("Bias estimation:   {}", status.contains(TrackerStatus::BIAS_ESTIMATION));
    println!(
        "Pose (x, y, z, w): [{:+.4}, {:+.4}, {:+.4}, {:+.4}]",
        pose.coords[0], pose.coords[1], pose.coords[2], pose.coords[3]
    );

    tracker.pause();
}
