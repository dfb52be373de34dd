//! Orientation tracking lifecycle.
//!
//! [`OrientationTracker`] owns one accelerometer and one gyroscope
//! [`SensorEventSource`], feeds their samples into a [`FusionEngine`], and
//! answers pose queries. `resume` and `pause` gate the whole pipeline: while
//! paused every incoming sample is discarded, and pausing freezes the pose
//! by pushing a single zero-angular-velocity sample into the filter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};

use crate::fusion::{FusionEngine, SensorFusionEkf};
use crate::prediction::predict_pose;
use crate::source::{SampleFeed, SampleHandler, SensorEventSource};
use crate::types::{quaternion_to_array, AccelerometerSample, GyroscopeSample, TrackerStatus};
use crate::{Result, TrackerError};

/// Host-side sink for tracking results.
///
/// All three hooks run on the tracker's gyroscope delivery thread, the
/// thread that produces results. Implementations must not call back into
/// `pause`/`resume` (those join the very thread these hooks run on) and
/// should return quickly so sample delivery keeps up.
pub trait TrackerCallbacks: Send + Sync {
    /// The delivery thread has started; runs before the first sample.
    fn on_thread_start(&self) {}

    /// One fused orientation per gyroscope sample, as (x, y, z, w).
    fn on_orientation(&self, quaternion: [f64; 4]);

    /// The delivery thread is exiting; no orientation follows.
    fn on_thread_stop(&self) {}
}

/// State shared between the tracker, its handlers and the delivery threads.
struct TrackerCore<F> {
    engine: F,
    calibration: Vector3<f64>,
    tracking: AtomicBool,
    /// Written by gyroscope ingestion, read by `pause`. Pause stops the
    /// delivery thread before reading, so the lock is never contended; it
    /// exists to make the cross-thread mutation well-typed.
    latest_gyroscope: Mutex<Option<GyroscopeSample>>,
    callbacks: Option<Arc<dyn TrackerCallbacks>>,
}

impl<F: FusionEngine> TrackerCore<F> {
    fn ingest_accelerometer(&self, sample: AccelerometerSample) {
        if !self.tracking.load(Ordering::Relaxed) {
            return;
        }
        self.engine.process_accelerometer_sample(sample);
    }

    /// Apply the fixed calibration and forward. Returns whether the sample
    /// was consumed.
    fn ingest_gyroscope(&self, sample: GyroscopeSample) -> bool {
        let corrected = GyroscopeSample {
            data: sample.data - self.calibration,
            ..sample
        };
        self.ingest_corrected(corrected)
    }

    /// Ingestion downstream of calibration. `pause` enters here directly
    /// with its synthesized zero-velocity sample, which must reach the
    /// engine as-is.
    fn ingest_corrected(&self, sample: GyroscopeSample) -> bool {
        if !self.tracking.load(Ordering::Relaxed) {
            return false;
        }
        *self.lock_latest() = Some(sample);
        self.engine.process_gyroscope_sample(sample);
        true
    }

    fn pose_at(&self, timestamp_ns: i64) -> UnitQuaternion<f64> {
        let state = self.engine.latest_pose_state();
        if self.engine.is_fully_initialized() {
            state.sensor_from_start
        } else {
            predict_pose(timestamp_ns, &state)
        }
    }

    fn latest_gyroscope(&self) -> Option<GyroscopeSample> {
        *self.lock_latest()
    }

    fn lock_latest(&self) -> MutexGuard<'_, Option<GyroscopeSample>> {
        match self.latest_gyroscope.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

struct AccelHandler<F> {
    core: Arc<TrackerCore<F>>,
}

impl<F: FusionEngine> SampleHandler<AccelerometerSample> for AccelHandler<F> {
    fn on_sample(&self, sample: AccelerometerSample) {
        self.core.ingest_accelerometer(sample);
    }
}

/// Gyroscope delivery also carries the host callbacks: results are pushed
/// once per gyroscope sample, so this thread's lifecycle is the one the
/// host observes.
struct GyroHandler<F> {
    core: Arc<TrackerCore<F>>,
}

impl<F: FusionEngine> SampleHandler<GyroscopeSample> for GyroHandler<F> {
    fn on_sample(&self, sample: GyroscopeSample) {
        let timestamp_ns = sample.sensor_timestamp_ns;
        if self.core.ingest_gyroscope(sample) {
            if let Some(callbacks) = &self.core.callbacks {
                let pose = self.core.pose_at(timestamp_ns);
                callbacks.on_orientation(quaternion_to_array(&pose));
            }
        }
    }

    fn on_thread_start(&self) {
        if let Some(callbacks) = &self.core.callbacks {
            callbacks.on_thread_start();
        }
    }

    fn on_thread_stop(&self) {
        if let Some(callbacks) = &self.core.callbacks {
            callbacks.on_thread_stop();
        }
    }
}

struct Sources {
    accelerometer: SensorEventSource<AccelerometerSample>,
    gyroscope: SensorEventSource<GyroscopeSample>,
}

/// Real-time orientation tracker.
///
/// Construct, `resume`, push samples through the feeds (or let a platform
/// bridge do it), and query `get_pose` from any thread. Dropping the
/// tracker pauses it first, so no sample handler runs after drop begins.
pub struct OrientationTracker<F: FusionEngine = SensorFusionEkf> {
    core: Arc<TrackerCore<F>>,
    accel_feed: SampleFeed<AccelerometerSample>,
    gyro_feed: SampleFeed<GyroscopeSample>,
    sources: Mutex<Sources>,
}

impl OrientationTracker<SensorFusionEkf> {
    /// Tracker with the default filter, gyroscope bias estimation enabled.
    ///
    /// `calibration` is the fixed zero-rate bias subtracted from every raw
    /// gyroscope sample; `sampling_period_us` drives both sources (use
    /// [`crate::types::DATA_RATE_LOW_US`] or
    /// [`crate::types::DATA_RATE_HIGH_US`] for the stock rates).
    pub fn new(calibration: Vector3<f64>, sampling_period_us: i32) -> Result<Self> {
        Self::build(SensorFusionEkf::new(true), calibration, sampling_period_us, None)
    }

    /// Same as [`OrientationTracker::new`] with host callbacks wired in.
    pub fn with_callbacks(
        calibration: Vector3<f64>,
        sampling_period_us: i32,
        callbacks: Arc<dyn TrackerCallbacks>,
    ) -> Result<Self> {
        Self::build(
            SensorFusionEkf::new(true),
            calibration,
            sampling_period_us,
            Some(callbacks),
        )
    }
}

impl<F: FusionEngine> OrientationTracker<F> {
    /// Tracker around a caller-supplied filter implementation.
    pub fn with_engine(
        engine: F,
        calibration: Vector3<f64>,
        sampling_period_us: i32,
        callbacks: Option<Arc<dyn TrackerCallbacks>>,
    ) -> Result<Self> {
        Self::build(engine, calibration, sampling_period_us, callbacks)
    }

    fn build(
        engine: F,
        calibration: Vector3<f64>,
        sampling_period_us: i32,
        callbacks: Option<Arc<dyn TrackerCallbacks>>,
    ) -> Result<Self> {
        if sampling_period_us <= 0 {
            return Err(TrackerError::InvalidSamplingPeriod(sampling_period_us));
        }
        if !(calibration.x.is_finite() && calibration.y.is_finite() && calibration.z.is_finite()) {
            return Err(TrackerError::InvalidCalibration);
        }

        let period = Duration::from_micros(sampling_period_us as u64);
        let accelerometer = SensorEventSource::new("accelerometer", period);
        let gyroscope = SensorEventSource::new("gyroscope", period);
        Ok(Self {
            core: Arc::new(TrackerCore {
                engine,
                calibration,
                tracking: AtomicBool::new(false),
                latest_gyroscope: Mutex::new(None),
                callbacks,
            }),
            accel_feed: accelerometer.feed(),
            gyro_feed: gyroscope.feed(),
            sources: Mutex::new(Sources {
                accelerometer,
                gyroscope,
            }),
        })
    }

    /// Producer handle for raw accelerometer samples.
    pub fn accelerometer_feed(&self) -> SampleFeed<AccelerometerSample> {
        self.accel_feed.clone()
    }

    /// Producer handle for raw gyroscope samples.
    pub fn gyroscope_feed(&self) -> SampleFeed<GyroscopeSample> {
        self.gyro_feed.clone()
    }

    pub fn is_tracking(&self) -> bool {
        self.core.tracking.load(Ordering::Relaxed)
    }

    /// Tracking flag plus the filter's own status bits.
    pub fn status(&self) -> TrackerStatus {
        let mut status = self.core.engine.status();
        if self.is_tracking() {
            status |= TrackerStatus::TRACKING;
        }
        status
    }

    /// Orientation for `timestamp_ns`, callable any time from any thread.
    ///
    /// Once the filter is fully initialized this is its fused rotation,
    /// unmodified. Before that the latest state is extrapolated by
    /// [`predict_pose`], whose interval clamp also defines the policy for
    /// stale or out-of-order query timestamps.
    pub fn get_pose(&self, timestamp_ns: i64) -> UnitQuaternion<f64> {
        self.core.pose_at(timestamp_ns)
    }

    /// Suspend tracking. A no-op when already paused.
    ///
    /// Stops both sources first (synchronously, so no handler can run
    /// afterwards), then freezes the pose by ingesting one zero-velocity
    /// gyroscope sample carrying the last-seen sample's timestamps, and
    /// only then clears the tracking flag. With no gyroscope sample ever
    /// ingested there is nothing to freeze and the injection is skipped.
    pub fn pause(&self) {
        if !self.is_tracking() {
            return;
        }
        let mut sources = self.lock_sources();
        if !self.is_tracking() {
            return;
        }

        sources.accelerometer.stop_polling();
        sources.gyroscope.stop_polling();

        if let Some(last) = self.core.latest_gyroscope() {
            let frozen = GyroscopeSample {
                data: Vector3::zeros(),
                system_timestamp: last.system_timestamp,
                sensor_timestamp_ns: last.sensor_timestamp_ns,
            };
            self.core.ingest_corrected(frozen);
        }

        self.core.tracking.store(false, Ordering::Relaxed);
        log::info!("Tracking paused");
    }

    fn lock_sources(&self) -> MutexGuard<'_, Sources> {
        match self.sources.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<F: FusionEngine + 'static> OrientationTracker<F> {
    /// Begin (or continue) tracking. A no-op when already tracking.
    ///
    /// Sets the tracking flag, then starts both sources; each spawns its
    /// named delivery thread. On a spawn failure the flag is rolled back
    /// and nothing polls.
    pub fn resume(&self) -> Result<()> {
        if self.core.tracking.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        let mut sources = self.lock_sources();
        if !self.is_tracking() {
            // Paused again before the lock was acquired.
            return Ok(());
        }

        let accel_handler: Arc<dyn SampleHandler<AccelerometerSample>> = Arc::new(AccelHandler {
            core: self.core.clone(),
        });
        if let Err(e) = sources.accelerometer.start_polling(accel_handler) {
            self.core.tracking.store(false, Ordering::Relaxed);
            return Err(e);
        }

        let gyro_handler: Arc<dyn SampleHandler<GyroscopeSample>> = Arc::new(GyroHandler {
            core: self.core.clone(),
        });
        if let Err(e) = sources.gyroscope.start_polling(gyro_handler) {
            sources.accelerometer.stop_polling();
            self.core.tracking.store(false, Ordering::Relaxed);
            return Err(e);
        }

        log::info!("Tracking resumed");
        Ok(())
    }
}

impl<F: FusionEngine> Drop for OrientationTracker<F> {
    fn drop(&mut self) {
        self.pause();
    }
}
