//! The base layer: positional record I/O with no caching.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

use super::errors::{RecordsError, RecordsResult};
use super::store::RecordStore;
use super::{is_zero, StoreOptions};

/// A record store that reads and writes the table file directly.
///
/// Every operation turns into at most one seek plus one read or write, so
/// this variant is also the authority the layered variants defer to for
/// on-file content. It is the reference implementation the equivalence
/// tests compare the layered variants against.
#[derive(Debug)]
pub struct RecordFile {
    path: PathBuf,
    file: Option<File>,
    record_size: usize,
    zero: Vec<u8>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl RecordFile {
    /// Opens the table file at `path`, creating it if absent.
    ///
    /// Fails with `REC_CORRUPT_LENGTH` if an existing file's length is not
    /// a multiple of `record_size`; run
    /// [`fix_table_size`](super::fix_table_size) and reopen to repair.
    pub fn open(path: &Path, record_size: usize) -> RecordsResult<Self> {
        Self::open_with(path, record_size, StoreOptions::default())
    }

    /// Opens with explicit options. This variant buffers nothing, so only
    /// the metrics sink in `options` is used.
    pub fn open_with(
        path: &Path,
        record_size: usize,
        options: StoreOptions,
    ) -> RecordsResult<Self> {
        if record_size == 0 {
            return Err(RecordsError::zero_record_size());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| {
                RecordsError::open_failed(
                    format!("failed to open table file: {}", path.display()),
                    e,
                )
            })?;
        let len = file
            .metadata()
            .map_err(|e| RecordsError::io_failure("failed to stat table file", e))?
            .len();
        if len % record_size as u64 != 0 {
            return Err(RecordsError::corrupt_length(len, record_size));
        }
        log_event_with_fields(
            Event::StoreOpened,
            &[
                ("file", &path.display().to_string()),
                ("record_size", &record_size.to_string()),
                ("records", &(len / record_size as u64).to_string()),
            ],
        );
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            record_size,
            zero: vec![0u8; record_size],
            metrics: options.metrics,
        })
    }

    fn handle(&self, op: &str) -> RecordsResult<&File> {
        self.file.as_ref().ok_or_else(|| RecordsError::store_closed(op))
    }

    fn handle_mut(&mut self, op: &str) -> RecordsResult<&mut File> {
        self.file.as_mut().ok_or_else(|| RecordsError::store_closed(op))
    }

    fn check_record_buf(&self, len: usize) -> RecordsResult<()> {
        if len != self.record_size {
            return Err(RecordsError::buffer_mismatch(len, self.record_size));
        }
        Ok(())
    }

    fn offset(&self, index: u64) -> u64 {
        index * self.record_size as u64
    }

    /// Records currently on file, recomputed from the file length.
    pub(crate) fn file_records(&self) -> RecordsResult<u64> {
        let file = self.handle("size")?;
        let len = file
            .metadata()
            .map_err(|e| RecordsError::io_failure("failed to stat table file", e))?
            .len();
        Ok(len / self.record_size as u64)
    }

    /// Reads the on-file record at `index` into `out`. Bounds are the
    /// caller's responsibility.
    pub(crate) fn read_record(&mut self, index: u64, out: &mut [u8]) -> RecordsResult<()> {
        let offset = self.offset(index);
        let record_size = self.record_size;
        let file = self.handle_mut("get")?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| RecordsError::io_failure(format!("seek to record {} failed", index), e))?;
        file.read_exact(&mut out[..record_size])
            .map_err(|e| RecordsError::io_failure(format!("read of record {} failed", index), e))?;
        if let Some(ref metrics) = self.metrics {
            metrics.add_bytes_read(record_size as u64);
        }
        Ok(())
    }

    /// Overwrites the on-file record at `index`. Bounds are the caller's
    /// responsibility.
    pub(crate) fn write_record(&mut self, index: u64, record: &[u8]) -> RecordsResult<()> {
        let offset = self.offset(index);
        let record_size = self.record_size;
        let file = self.handle_mut("put")?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| RecordsError::io_failure(format!("seek to record {} failed", index), e))?;
        file.write_all(record)
            .map_err(|e| RecordsError::io_failure(format!("write of record {} failed", index), e))?;
        if let Some(ref metrics) = self.metrics {
            metrics.add_bytes_written(record_size as u64);
        }
        Ok(())
    }

    /// Appends raw bytes at the end of the file in one write.
    pub(crate) fn append_raw(&mut self, bytes: &[u8]) -> RecordsResult<()> {
        let file = self.handle_mut("add")?;
        let end = file
            .metadata()
            .map_err(|e| RecordsError::io_failure("failed to stat table file", e))?
            .len();
        file.seek(SeekFrom::Start(end))
            .map_err(|e| RecordsError::io_failure("seek to end of table failed", e))?;
        file.write_all(bytes)
            .map_err(|e| RecordsError::io_failure("append to table failed", e))?;
        if let Some(ref metrics) = self.metrics {
            metrics.add_bytes_written(bytes.len() as u64);
        }
        Ok(())
    }

    /// Shrinks the file to exactly `records` records.
    pub(crate) fn truncate_records(&mut self, records: u64) -> RecordsResult<()> {
        let new_len = records * self.record_size as u64;
        let file = self.handle_mut("clean_last")?;
        file.set_len(new_len)
            .map_err(|e| RecordsError::io_failure("truncate of table failed", e))?;
        Ok(())
    }

    /// Returns whether the on-file record at `index` is all zero.
    pub(crate) fn is_clean_on_file(&mut self, index: u64) -> RecordsResult<bool> {
        let mut scratch = vec![0u8; self.record_size];
        self.read_record(index, &mut scratch)?;
        Ok(is_zero(&scratch))
    }

    /// Shared metrics sink, for the layered variants.
    pub(crate) fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    /// Fails with `REC_STORE_CLOSED` if the handle has been released.
    pub(crate) fn ensure_open(&self, op: &str) -> RecordsResult<()> {
        self.handle(op).map(|_| ())
    }

    /// Whether the handle is still held.
    pub(crate) fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Reads `out.len() / record_size` consecutive records starting at
    /// `index` with a single positioned read.
    pub(crate) fn read_span(&mut self, index: u64, out: &mut [u8]) -> RecordsResult<()> {
        let offset = self.offset(index);
        let file = self.handle_mut("get")?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| {
            RecordsError::io_failure(format!("seek to record {} failed", index), e)
        })?;
        file.read_exact(out).map_err(|e| {
            RecordsError::io_failure(format!("bulk read at record {} failed", index), e)
        })?;
        if let Some(ref metrics) = self.metrics {
            metrics.add_bytes_read(out.len() as u64);
        }
        Ok(())
    }

    /// Counts one logical append on behalf of a layered variant.
    pub(crate) fn count_buffered_append(&self) {
        self.count_append();
    }

    fn count_append(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.increment_records_appended();
        }
    }

    /// Removes the last on-file record, optionally copying it into `out`,
    /// without cascading.
    fn remove_last(&mut self, out: Option<&mut [u8]>) -> RecordsResult<()> {
        let records = self.file_records()?;
        if records == 0 {
            return Err(RecordsError::out_of_bounds("clean_last", 0, 0));
        }
        if let Some(out) = out {
            self.read_record(records - 1, out)?;
        }
        self.truncate_records(records - 1)
    }

    /// Keeps removing the last record while it is all zero.
    fn trim_trailing_clean(&mut self) -> RecordsResult<()> {
        loop {
            let records = self.file_records()?;
            if records == 0 || !self.is_clean_on_file(records - 1)? {
                return Ok(());
            }
            self.truncate_records(records - 1)?;
        }
    }
}

impl RecordStore for RecordFile {
    fn size(&self) -> RecordsResult<u64> {
        self.file_records()
    }

    fn get(&mut self, index: u64, out: &mut [u8]) -> RecordsResult<()> {
        self.handle("get")?;
        self.check_record_buf(out.len())?;
        let size = self.file_records()?;
        if index >= size {
            return Err(RecordsError::out_of_bounds("get", index, size));
        }
        self.read_record(index, out)
    }

    fn put(&mut self, index: u64, record: &[u8]) -> RecordsResult<()> {
        self.handle("put")?;
        self.check_record_buf(record.len())?;
        let size = self.file_records()?;
        if index > size {
            return Err(RecordsError::out_of_bounds("put", index, size));
        }
        if is_zero(record) {
            return self.clean(index);
        }
        if index == size {
            self.append_raw(record)?;
            self.count_append();
            return Ok(());
        }
        self.write_record(index, record)
    }

    fn add(&mut self, record: &[u8]) -> RecordsResult<u64> {
        self.handle("add")?;
        self.check_record_buf(record.len())?;
        if is_zero(record) {
            return Err(RecordsError::invalid_append());
        }
        let index = self.file_records()?;
        self.append_raw(record)?;
        self.count_append();
        Ok(index)
    }

    fn clean(&mut self, index: u64) -> RecordsResult<()> {
        self.handle("clean")?;
        let size = self.file_records()?;
        if index > size {
            return Err(RecordsError::out_of_bounds("clean", index, size));
        }
        if index == size {
            // Nothing exists at the append position yet.
            return Ok(());
        }
        if index == size - 1 {
            return self.discard_last();
        }
        let zero = self.zero.clone();
        self.write_record(index, &zero)
    }

    fn clean_last_into(&mut self, out: &mut [u8]) -> RecordsResult<()> {
        self.handle("clean_last")?;
        self.check_record_buf(out.len())?;
        self.remove_last(Some(out))?;
        self.trim_trailing_clean()
    }

    fn discard_last(&mut self) -> RecordsResult<()> {
        self.handle("clean_last")?;
        self.remove_last(None)?;
        self.trim_trailing_clean()
    }

    fn flush(&mut self) -> RecordsResult<()> {
        self.handle("flush")?;
        Ok(())
    }

    fn close(&mut self) -> RecordsResult<()> {
        if self.file.take().is_some() {
            log_event_with_fields(
                Event::StoreClosed,
                &[("file", &self.path.display().to_string())],
            );
        }
        Ok(())
    }

    fn clear(&mut self) -> RecordsResult<()> {
        self.handle("clear")?;
        self.truncate_records(0)?;
        log_event_with_fields(
            Event::StoreCleared,
            &[("file", &self.path.display().to_string())],
        );
        Ok(())
    }

    fn file_path(&self) -> &Path {
        &self.path
    }

    fn record_size(&self) -> usize {
        self.record_size
    }
}

impl Drop for RecordFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
