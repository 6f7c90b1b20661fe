//! Upload counters owned by one handler

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    uploads_created: AtomicU64,
    uploads_finished: AtomicU64,
    uploads_terminated: AtomicU64,
    bytes_received: AtomicU64,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads_created: u64,
    pub uploads_finished: u64,
    pub uploads_terminated: u64,
    pub bytes_received: u64,
}

impl Metrics {
    pub(crate) fn inc_uploads_created(&self) {
        self.uploads_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_uploads_finished(&self) {
        self.uploads_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_uploads_terminated(&self) {
        self.uploads_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_created: self.uploads_created.load(Ordering::Relaxed),
            uploads_finished: self.uploads_finished.load(Ordering::Relaxed),
            uploads_terminated: self.uploads_terminated.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}
