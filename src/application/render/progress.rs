use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::atomic::{AtomicU8, Ordering},
};

use tracing::warn;

use crate::{application::jobs::JobRegistry, domain::jobs::JobUpdate};

use super::types::ProgressListener;

pub const PROCESSING_STARTED: u8 = 10;
pub const PROJECT_COMPILED: u8 = 30;
pub const COMPOSITION_RESOLVED: u8 = 40;
pub const ENCODE_START: u8 = 40;
pub const ENCODE_SPAN: u8 = 55;

/// Map an encoder fraction onto the job's 0-100 scale (40..=95).
pub fn encode_progress(fraction: f64) -> u8 {
    let fraction = fraction.clamp(0.0, 1.0);
    (f64::from(ENCODE_START) + fraction * f64::from(ENCODE_SPAN)).floor() as u8
}

/// Bridges encoder progress into the job registry.
///
/// Progress written through one reporter never decreases, even if the
/// renderer misreports a fraction.
pub struct ProgressReporter<'a> {
    registry: &'a JobRegistry,
    job_id: &'a str,
    last: AtomicU8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(registry: &'a JobRegistry, job_id: &'a str, current: u8) -> Self {
        Self {
            registry,
            job_id,
            last: AtomicU8::new(current),
        }
    }

    /// Last progress value written to the registry.
    pub fn last(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }

    fn publish(&self, fraction: f64) {
        if fraction.is_nan() {
            warn!(
                target = "application::render::progress",
                job_id = %self.job_id,
                "renderer reported a NaN progress fraction; ignoring"
            );
            return;
        }

        let computed = encode_progress(fraction);
        let previous = self.last.fetch_max(computed, Ordering::AcqRel);
        if computed <= previous {
            return;
        }

        self.registry
            .update(self.job_id, JobUpdate::progress(computed));
    }
}

impl ProgressListener for ProgressReporter<'_> {
    fn report(&self, fraction: f64) {
        contain_panic(self.job_id, fraction, || self.publish(fraction));
    }
}

/// Runs one progress update, logging instead of propagating a panic so the
/// render keeps going.
fn contain_panic(job_id: &str, fraction: f64, update: impl FnOnce()) -> bool {
    let Err(panic) = catch_unwind(AssertUnwindSafe(update)) else {
        return true;
    };
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    warn!(
        target = "application::render::progress",
        job_id = %job_id,
        fraction,
        error = %detail,
        "progress update failed; continuing render"
    );
    false
}
