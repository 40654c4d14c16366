//! Global signalling of failed material points.
use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared flag through which any material point may request that the current global load step
/// be rejected and retried with a smaller step.
///
/// Points never retry locally. Every point of a pass runs to completion, after which the
/// caller inspects the status and decides how to proceed.
#[derive(Debug, Default)]
pub struct LoadStepStatus {
    reduction_requested: AtomicBool,
    failure_count: AtomicUsize,
    first_message: Mutex<Option<String>>,
}

impl LoadStepStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a global load step reduction. Only the first message of a pass is retained.
    pub fn force_load_step_reduction(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("Load step reduction requested: {}", message);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.reduction_requested.store(true, Ordering::Release);
        let mut first = self.first_message.lock();
        if first.is_none() {
            *first = Some(message);
        }
    }

    pub fn reduction_requested(&self) -> bool {
        self.reduction_requested.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn first_message(&self) -> Option<String> {
        self.first_message.lock().clone()
    }

    /// Clears the status before a new (possibly retried) load step.
    pub fn reset(&self) {
        self.reduction_requested.store(false, Ordering::Release);
        self.failure_count.store(0, Ordering::Relaxed);
        *self.first_message.lock() = None;
    }
}
