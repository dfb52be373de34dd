//! C FFI layer for wearpose.
//!
//! Provides an opaque handle-based API for C/C++ consumers and for host
//! bridging layers that marshal sensor events in and orientations out.
//! The generated C header is written to `include/wearpose.h` by cbindgen.

use crate::error::LastError;
use crate::tracker::{OrientationTracker, TrackerCallbacks};
use crate::types::{quaternion_to_array, AccelerometerSample, GyroscopeSample};
use nalgebra::Vector3;
use std::ffi::{c_char, c_int, c_void};
use std::sync::Arc;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque tracker handle for C consumers.
pub struct WpTracker(OrientationTracker);

/// Host callback table. Every function pointer is optional; `user_data` is
/// passed back verbatim as the first argument of each call.
///
/// All callbacks run on the tracker's result delivery thread. They must not
/// call `wp_tracker_pause`, `wp_tracker_resume` or `wp_tracker_destroy`
/// (those join that same thread) and should return quickly.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct WpCallbacks {
    /// Opaque host pointer, never dereferenced by the library.
    pub user_data: *mut c_void,
    /// Invoked once when the delivery thread starts.
    pub on_thread_start: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
    /// Invoked once per gyroscope sample; `quaternion` points to 4 doubles
    /// (x, y, z, w) valid only for the duration of the call.
    pub on_orientation:
        Option<unsafe extern "C" fn(user_data: *mut c_void, quaternion: *const f64)>,
    /// Invoked once when the delivery thread stops.
    pub on_thread_stop: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
}

struct CallbackAdapter {
    callbacks: WpCallbacks,
}

// The host contract on wp_tracker_new: the table's function pointers and
// user_data stay usable from the delivery thread until destroy returns.
unsafe impl Send for CallbackAdapter {}
unsafe impl Sync for CallbackAdapter {}

impl TrackerCallbacks for CallbackAdapter {
    fn on_thread_start(&self) {
        if let Some(f) = self.callbacks.on_thread_start {
            unsafe { f(self.callbacks.user_data) };
        }
    }

    fn on_orientation(&self, quaternion: [f64; 4]) {
        if let Some(f) = self.callbacks.on_orientation {
            unsafe { f(self.callbacks.user_data, quaternion.as_ptr()) };
        }
    }

    fn on_thread_stop(&self) {
        if let Some(f) = self.callbacks.on_thread_stop {
            unsafe { f(self.callbacks.user_data) };
        }
    }
}

/// Create a tracker and immediately resume it.
///
/// `calibration` is the fixed gyroscope bias in rad/s; null means zero
/// bias. `sampling_period_us` is the sensor sampling period (20000 for
/// 50 Hz, 11250 for 88.9 Hz). Returns NULL on error (check
/// `wp_last_error()`).
///
/// # Safety
/// `calibration` must point to 3 doubles, or be null. `callbacks`, when
/// non-null, must point to a valid `WpCallbacks` whose function pointers
/// and `user_data` remain usable from any thread until
/// `wp_tracker_destroy` returns; the table is copied, so the pointer
/// itself need not outlive this call.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_new(
    calibration: *const f64,
    sampling_period_us: c_int,
    callbacks: *const WpCallbacks,
) -> *mut WpTracker {
    let bias = if calibration.is_null() {
        Vector3::zeros()
    } else {
        Vector3::new(*calibration, *calibration.add(1), *calibration.add(2))
    };

    let built = if callbacks.is_null() {
        OrientationTracker::new(bias, sampling_period_us)
    } else {
        OrientationTracker::with_callbacks(
            bias,
            sampling_period_us,
            Arc::new(CallbackAdapter {
                callbacks: *callbacks,
            }),
        )
    };

    let tracker = match built {
        Ok(tracker) => tracker,
        Err(e) => {
            LAST_ERROR.set(&e);
            return std::ptr::null_mut();
        }
    };
    if let Err(e) = tracker.resume() {
        LAST_ERROR.set(&e);
        return std::ptr::null_mut();
    }
    Box::into_raw(Box::new(WpTracker(tracker)))
}

/// Destroy a tracker. Pauses it first, so no callback or sample handler
/// runs after this returns.
///
/// # Safety
/// `tracker` must be a pointer returned by `wp_tracker_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_destroy(tracker: *mut WpTracker) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Begin or continue tracking. A no-op when already tracking.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_resume(tracker: *mut WpTracker) -> c_int {
    if tracker.is_null() {
        return -1;
    }
    let tracker = &*tracker;
    match tracker.0.resume() {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Suspend tracking and freeze the pose. A no-op when already paused.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_pause(tracker: *mut WpTracker) {
    if tracker.is_null() {
        return;
    }
    let tracker = &*tracker;
    tracker.0.pause();
}

/// Orientation quaternion for `timestamp_ns`, written to `out_quaternion`
/// as (x, y, z, w). Callable from any thread, including while paused.
/// Returns 0 on success, -1 on null arguments.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null. `out_quaternion`
/// must point to an array of at least 4 doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_get_pose(
    tracker: *const WpTracker,
    timestamp_ns: i64,
    out_quaternion: *mut f64,
) -> c_int {
    if tracker.is_null() || out_quaternion.is_null() {
        return -1;
    }
    let tracker = &*tracker;
    let q = quaternion_to_array(&tracker.0.get_pose(timestamp_ns));
    for (i, component) in q.iter().enumerate() {
        out_quaternion.add(i).write(*component);
    }
    0
}

/// Tracker status bitmap: bit 0 tracking, bit 1 gravity aligned, bit 2
/// fully initialized, bit 3 bias estimation enabled. Returns 0 for null.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_status(tracker: *const WpTracker) -> u32 {
    if tracker.is_null() {
        return 0;
    }
    let tracker = &*tracker;
    tracker.0.status().bits()
}

/// Check whether the tracker is currently tracking.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_is_tracking(tracker: *const WpTracker) -> bool {
    if tracker.is_null() {
        return false;
    }
    let tracker = &*tracker;
    tracker.0.is_tracking()
}

/// Feed one raw accelerometer sample (m/s^2, sensor frame).
/// Returns 0 if the sample was accepted, -1 if it was refused (tracker
/// paused or backlogged) or on null arguments.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null. `data` must point
/// to 3 doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_feed_accelerometer(
    tracker: *const WpTracker,
    data: *const f64,
    system_timestamp: i64,
    sensor_timestamp_ns: i64,
) -> c_int {
    if tracker.is_null() || data.is_null() {
        return -1;
    }
    let tracker = &*tracker;
    let sample = AccelerometerSample {
        data: Vector3::new(*data, *data.add(1), *data.add(2)),
        system_timestamp,
        sensor_timestamp_ns,
    };
    if tracker.0.accelerometer_feed().push(sample) {
        0
    } else {
        -1
    }
}

/// Feed one raw gyroscope sample (rad/s, sensor frame). The fixed
/// calibration passed at construction is subtracted before fusion.
/// Returns 0 if the sample was accepted, -1 if it was refused (tracker
/// paused or backlogged) or on null arguments.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null. `data` must point
/// to 3 doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn wp_tracker_feed_gyroscope(
    tracker: *const WpTracker,
    data: *const f64,
    system_timestamp: i64,
    sensor_timestamp_ns: i64,
) -> c_int {
    if tracker.is_null() || data.is_null() {
        return -1;
    }
    let tracker = &*tracker;
    let sample = GyroscopeSample {
        data: Vector3::new(*data, *data.add(1), *data.add(2)),
        system_timestamp,
        sensor_timestamp_ns,
    };
    if tracker.0.gyroscope_feed().push(sample) {
        0
    } else {
        -1
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next wearpose API call.
#[no_mangle]
pub extern "C" fn wp_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
