//! Fixed-length record stores over a single flat file.
//!
//! A table file is a raw file with no header or footer: record `i` occupies
//! the byte range `[i * record_size, (i + 1) * record_size)`. Three variants
//! share one surface, the [`RecordStore`] trait:
//!
//! - [`RecordFile`] reads and writes positionally with no caching.
//! - [`BufferedRecords`] coalesces appends in a bounded in-memory tail and
//!   flushes them as one contiguous write.
//! - [`CachedRecords`] adds a sliding read-cache window over the on-file
//!   region on top of the write buffer.
//!
//! Records are opaque byte arrays. An all-zero record means "erased": writing
//! zeros at an interior index erases in place, and erasing the last record
//! shrinks the file, cascading over any trailing erased records. Because of
//! that, the newest record may never be all zero.
//!
//! # Invariants
//!
//! - The logical size is the records on file plus the records buffered in
//!   memory; no index in `[0, size)` is skipped or duplicated.
//! - The file length is an exact multiple of the record size after `close`.
//! - The read-cache window mirrors on-file content only and never overlaps
//!   the buffered tail.

mod buffered;
mod cached;
mod errors;
mod file;
mod store;

pub use buffered::BufferedRecords;
pub use cached::CachedRecords;
pub use errors::{ErrorClass, RecordsError, RecordsErrorCode, RecordsResult};
pub use file::RecordFile;
pub use store::RecordStore;

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Byte budget ceiling the original buffers were sized to.
const DEFAULT_BUDGET_BYTES: usize = 16 * 1024;

/// Sizing and instrumentation knobs shared by all store variants.
///
/// Budgets are byte counts; the per-store capacity in records is
/// `max(1, budget / record_size)`, so a zero or sub-record budget still
/// yields a working store with a one-record buffer.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Byte budget for the write buffer.
    pub write_buffer_bytes: usize,
    /// Byte budget for the read-cache window (CachedRecords only).
    pub read_cache_bytes: usize,
    /// Optional transfer-accounting sink shared with the caller.
    pub metrics: Option<Arc<MetricsRegistry>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            write_buffer_bytes: DEFAULT_BUDGET_BYTES,
            read_cache_bytes: DEFAULT_BUDGET_BYTES,
            metrics: None,
        }
    }
}

impl StoreOptions {
    /// Capacity in records for a byte budget, with a floor of one record.
    pub(crate) fn capacity_records(budget_bytes: usize, record_size: usize) -> usize {
        (budget_bytes / record_size).max(1)
    }
}

/// Returns whether every byte of `buf` is zero.
pub(crate) fn is_zero(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == 0)
}

/// Returns the number of records in the table file at `path`.
///
/// A missing file counts as zero records. Fails with `REC_CORRUPT_LENGTH`
/// if the file length is not a multiple of `record_size`.
pub fn table_size(path: &Path, record_size: usize) -> RecordsResult<u64> {
    if record_size == 0 {
        return Err(RecordsError::zero_record_size());
    }
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(RecordsError::io_failure(
                format!("failed to stat table file: {}", path.display()),
                e,
            ))
        }
    };
    if len % record_size as u64 != 0 {
        return Err(RecordsError::corrupt_length(len, record_size));
    }
    Ok(len / record_size as u64)
}

/// Truncates a damaged table file down to the nearest record multiple.
///
/// A file whose length is not a multiple of the record size was cut off
/// mid-append; the trailing partial record carries no recoverable content,
/// so it is dropped. Returns whether a cut was made. A missing file is left
/// alone.
pub fn fix_table_size(path: &Path, record_size: usize) -> RecordsResult<bool> {
    if record_size == 0 {
        return Err(RecordsError::zero_record_size());
    }
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(RecordsError::io_failure(
                format!("failed to stat table file: {}", path.display()),
                e,
            ))
        }
    };
    let cut = len % record_size as u64;
    if cut == 0 {
        return Ok(false);
    }
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| {
            RecordsError::open_failed(
                format!("failed to open table file for repair: {}", path.display()),
                e,
            )
        })?;
    file.set_len(len - cut).map_err(|e| {
        RecordsError::io_failure(
            format!("failed to truncate table file: {}", path.display()),
            e,
        )
    })?;
    log_event_with_fields(
        Event::TableRepaired,
        &[
            ("file", &path.display().to_string()),
            ("cut_bytes", &cut.to_string()),
        ],
    );
    Ok(true)
}
