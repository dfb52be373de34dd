/// Errors that can occur when constructing or driving an orientation tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Sampling period must be positive, got {0} us")]
    InvalidSamplingPeriod(i32),

    #[error("Calibration bias must be finite on all axes")]
    InvalidCalibration,

    #[error("Failed to spawn {name} delivery thread: {reason}")]
    ThreadSpawn { name: &'static str, reason: String },
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &TrackerError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = format!("{}\0", err);
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
