//! Sample delivery between host feeds and the tracker.
//!
//! A [`SensorEventSource`] owns a bounded channel and a named delivery
//! thread. Hosts push samples through clonable [`SampleFeed`] handles from
//! any thread; the delivery thread hands them one at a time to a
//! [`SampleHandler`]. Stopping is synchronous: once `stop_polling` returns,
//! the handler will not be invoked again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::{Result, TrackerError};

/// Capacity of the channel between feed handles and the delivery thread.
const CHANNEL_CAPACITY: usize = 256;

/// Receiver of samples on the delivery thread.
///
/// `on_sample` runs once per sample, in push order. The lifecycle hooks
/// bracket the thread: `on_thread_start` before the first sample,
/// `on_thread_stop` after the last, both on the delivery thread itself.
pub trait SampleHandler<T>: Send + Sync {
    fn on_sample(&self, sample: T);

    fn on_thread_start(&self) {}

    fn on_thread_stop(&self) {}
}

/// Clonable producer half of a source. Cheap to clone and safe to use from
/// any thread, including C callbacks.
pub struct SampleFeed<T> {
    name: &'static str,
    sender: Sender<T>,
    active: Arc<AtomicBool>,
}

impl<T> Clone for SampleFeed<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
            active: self.active.clone(),
        }
    }
}

impl<T> SampleFeed<T> {
    /// Push one sample toward the delivery thread.
    ///
    /// Returns `false` and discards the sample when the source is stopped
    /// or the channel is full; a stopped source never accumulates a
    /// backlog.
    pub fn push(&self, sample: T) -> bool {
        if !self.active.load(Ordering::Relaxed) {
            return false;
        }
        match self.sender.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("{} feed full, dropping sample", self.name);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// One sensor stream: a channel plus the delivery thread that drains it.
pub struct SensorEventSource<T> {
    name: &'static str,
    poll_timeout: Duration,
    sender: Sender<T>,
    receiver: Receiver<T>,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> SensorEventSource<T> {
    /// `name` labels the delivery thread and log lines. `sampling_period`
    /// sets the delivery loop's poll timeout (floored at 1 ms).
    pub fn new(name: &'static str, sampling_period: Duration) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            name,
            poll_timeout: sampling_period.max(Duration::from_millis(1)),
            sender,
            receiver,
            active: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Producer handle for this source.
    pub fn feed(&self) -> SampleFeed<T> {
        SampleFeed {
            name: self.name,
            sender: self.sender.clone(),
            active: self.active.clone(),
        }
    }

    /// Spawn the delivery thread. A no-op when already polling.
    ///
    /// Samples pushed while the source was stopped were discarded at the
    /// feed; anything that still slipped into the channel is drained here
    /// so a paused interval is never replayed.
    pub fn start_polling(&mut self, handler: Arc<dyn SampleHandler<T>>) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        while self.receiver.try_recv().is_ok() {}

        self.active.store(true, Ordering::Relaxed);
        let active = self.active.clone();
        let receiver = self.receiver.clone();
        let poll_timeout = self.poll_timeout;
        let spawned = std::thread::Builder::new()
            .name(format!("wearpose-{}", self.name))
            .spawn(move || {
                handler.on_thread_start();
                while active.load(Ordering::Relaxed) {
                    match receiver.recv_timeout(poll_timeout) {
                        Ok(sample) => handler.on_sample(sample),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                handler.on_thread_stop();
            });
        match spawned {
            Ok(handle) => {
                log::debug!("{} delivery thread started", self.name);
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.active.store(false, Ordering::Relaxed);
                Err(TrackerError::ThreadSpawn {
                    name: self.name,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Stop the delivery thread and join it. A no-op when not polling.
    ///
    /// Feeds go inactive immediately, so a concurrent `push` cannot land a
    /// sample after this returns.
    pub fn stop_polling(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.active.store(false, Ordering::Relaxed);
        if handle.join().is_err() {
            log::warn!("{} delivery thread panicked", self.name);
        }
        log::debug!("{} delivery thread stopped", self.name);
    }

    pub fn is_polling(&self) -> bool {
        self.worker.is_some()
    }
}

impl<T> Drop for SensorEventSource<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.active.store(false, Ordering::Relaxed);
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        samples: Mutex<Vec<i32>>,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl SampleHandler<i32> for Recorder {
        fn on_sample(&self, sample: i32) {
            self.samples.lock().unwrap().push(sample);
        }

        fn on_thread_start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_thread_stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..deadline_ms {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    #[test]
    fn test_delivers_pushed_samples_in_order() {
        let mut source = SensorEventSource::new("test", Duration::from_millis(5));
        let recorder = Arc::new(Recorder::default());
        source.start_polling(recorder.clone()).unwrap();

        let feed = source.feed();
        assert!(feed.push(1));
        assert!(feed.push(2));
        assert!(feed.push(3));

        assert!(wait_until(2000, || recorder.samples.lock().unwrap().len() == 3));
        assert_eq!(*recorder.samples.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_push_refused_while_stopped() {
        let mut source = SensorEventSource::new("test", Duration::from_millis(5));
        let feed = source.feed();
        assert!(!feed.push(1));

        let recorder = Arc::new(Recorder::default());
        source.start_polling(recorder.clone()).unwrap();
        assert!(feed.push(2));
        source.stop_polling();
        assert!(!feed.push(3));
    }

    #[test]
    fn test_stop_is_synchronous() {
        let mut source = SensorEventSource::new("test", Duration::from_millis(5));
        let recorder = Arc::new(Recorder::default());
        let feed = source.feed();
        source.start_polling(recorder.clone()).unwrap();
        feed.push(1);
        assert!(wait_until(2000, || !recorder.samples.lock().unwrap().is_empty()));

        source.stop_polling();
        assert_eq!(recorder.stops.load(Ordering::SeqCst), 1);
        let delivered = recorder.samples.lock().unwrap().len();

        feed.push(2);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(recorder.samples.lock().unwrap().len(), delivered);
    }

    #[test]
    fn test_double_start_spawns_once() {
        let mut source = SensorEventSource::new("test", Duration::from_millis(5));
        let recorder = Arc::new(Recorder::default());
        source.start_polling(recorder.clone()).unwrap();
        assert!(wait_until(2000, || recorder.starts.load(Ordering::SeqCst) == 1));

        source.start_polling(recorder.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(recorder.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stopped_interval_is_not_replayed() {
        let mut source = SensorEventSource::new("test", Duration::from_millis(5));
        let feed = source.feed();
        let first = Arc::new(Recorder::default());
        source.start_polling(first.clone()).unwrap();
        source.stop_polling();

        // Lost while stopped, not queued for the next start.
        assert!(!feed.push(41));
        assert!(!feed.push(42));

        let second = Arc::new(Recorder::default());
        source.start_polling(second.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(second.samples.lock().unwrap().is_empty());
        source.stop_polling();
    }
}
