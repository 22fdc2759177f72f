//! Transfer-accounting metrics for record stores.
//!
//! Counters only, monotonic, reset only when the registry is dropped.
//! A registry is injected into stores through
//! [`StoreOptions`](crate::records::StoreOptions) and shared by the caller
//! via `Arc`; there is no process-wide registry.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one or more record stores.
///
/// All counters use atomic operations; `Relaxed` ordering is enough because
/// readers only need eventually-consistent totals.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Bytes read from table files.
    bytes_read: AtomicU64,
    /// Bytes written to table files.
    bytes_written: AtomicU64,
    /// Records appended (buffered or direct).
    records_appended: AtomicU64,
    /// Write-buffer flushes.
    buffer_flushes: AtomicU64,
    /// Read-cache window refills.
    cache_refills: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes read from a table file.
    pub fn add_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add bytes written to a table file.
    pub fn add_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count one appended record.
    pub fn increment_records_appended(&self) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one write-buffer flush.
    pub fn increment_buffer_flushes(&self) {
        self.buffer_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one read-cache refill.
    pub fn increment_cache_refills(&self) {
        self.cache_refills.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Records appended so far.
    pub fn records_appended(&self) -> u64 {
        self.records_appended.load(Ordering::Relaxed)
    }

    /// Buffer flushes so far.
    pub fn buffer_flushes(&self) -> u64 {
        self.buffer_flushes.load(Ordering::Relaxed)
    }

    /// Cache refills so far.
    pub fn cache_refills(&self) -> u64 {
        self.cache_refills.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_read: self.bytes_read(),
            bytes_written: self.bytes_written(),
            records_appended: self.records_appended(),
            buffer_flushes: self.buffer_flushes(),
            cache_refills: self.cache_refills(),
        }
    }
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub records_appended: u64,
    pub buffer_flushes: u64,
    pub cache_refills: u64,
}
